//! The three inbound wire shapes (`/v2/chat/completions`, `/v2/responses`,
//! `/v2/messages`), each a thin adapter over one shared `RequestCoordinator`
//! call per spec §6/§4.5.

pub mod chat;
pub mod messages;
pub mod responses;

use crate::core::coordinator::{RoutedRequest, RoutedResponse};
use crate::server::state::AppState;
use crate::utils::error::{GatewayError, Result};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/v2/chat/completions", web::post().to(chat::handle));
    cfg.route("/v2/responses", web::post().to(responses::handle));
    cfg.route("/v2/messages", web::post().to(messages::handle));
}

fn wants_streaming(http_req: &HttpRequest, body: &serde_json::Value) -> bool {
    if body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false) {
        return true;
    }
    http_req
        .headers()
        .get(actix_web::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn logical_model_id(body: &serde_json::Value) -> Result<String> {
    body.get("model")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::LogicalModelMissing("<missing 'model' field>".to_string()))
}

fn header_value(http_req: &HttpRequest, name: &str) -> Option<String> {
    http_req
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Shared implementation for all three routes: parse just enough of the
/// body to route, then hand the raw bytes through untouched.
pub(super) async fn dispatch(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    body: web::Bytes,
) -> actix_web::Result<HttpResponse> {
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let logical_model_id = logical_model_id(&parsed)?;
    let streaming = wants_streaming(&http_req, &parsed);
    let conversation_id = header_value(&http_req, "x-session-id");
    let idempotency_key = header_value(&http_req, "idempotency-key");

    let request = RoutedRequest {
        logical_model_id,
        conversation_id,
        idempotency_key,
        payload: body.to_vec(),
        moderation_content: String::from_utf8_lossy(&body).to_string(),
        streaming,
    };

    if streaming {
        respond_streaming(&state, request).await
    } else {
        respond_buffered(&state, request).await
    }
}

async fn respond_buffered(state: &web::Data<AppState>, request: RoutedRequest) -> actix_web::Result<HttpResponse> {
    let RoutedResponse { status, body } = state.coordinator.handle_non_stream(request).await?;
    let status_code = actix_web::http::StatusCode::from_u16(status)
        .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
    Ok(HttpResponse::build(status_code)
        .content_type("application/json")
        .body(body))
}

async fn respond_streaming(state: &web::Data<AppState>, request: RoutedRequest) -> actix_web::Result<HttpResponse> {
    let mut stream = state.coordinator.handle_stream(request).await?;

    match stream.next().await {
        None => Ok(HttpResponse::Ok().content_type("text/event-stream").body(())),
        Some(Err(e)) => Err(e.into()),
        Some(Ok(first_chunk)) => {
            let rest = stream.map(|item| item.map_err(actix_web::Error::from));
            let body = futures_util::stream::once(async move { Ok::<_, actix_web::Error>(first_chunk) }).chain(rest);
            Ok(HttpResponse::Ok()
                .content_type("text/event-stream")
                .streaming(body))
        }
    }
}
