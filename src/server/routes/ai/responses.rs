//! `POST /v2/responses`.

use super::dispatch;
use crate::server::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};

pub async fn handle(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    body: web::Bytes,
) -> actix_web::Result<HttpResponse> {
    dispatch(state, http_req, body).await
}
