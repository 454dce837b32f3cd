//! Gateway error taxonomy and HTTP mapping.
//!
//! One flat `thiserror` enum, following the teacher's `GatewayError` shape:
//! infra errors get a `#[from]` conversion, domain errors carry their own
//! payload. `GatewayError` never leaks a `Debug`-formatted stack to a client;
//! only `Display` plus a request id are returned.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Result type alias used throughout the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cache backend (Redis) failure.
    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Outbound HTTP client failure below the transport layer.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested logical model id is not present in the config store.
    #[error("logical model not found: {0}")]
    LogicalModelMissing(String),

    /// Logical model exists but has no upstreams configured.
    #[error("logical model '{0}' has no upstreams")]
    NoUpstreams(String),

    /// Scheduler's filters eliminated every candidate.
    #[error("no candidates available for logical model '{0}'")]
    NoCandidates(String),

    /// KeyPool could not produce a usable key for this attempt.
    #[error("no available key for provider '{provider_id}': {reason}")]
    NoAvailableKey { provider_id: String, reason: String },

    /// A single upstream dispatch failed (non-streaming).
    #[error("upstream error (status={status:?}): {body}")]
    UpstreamError {
        status: Option<u16>,
        body: String,
        retryable: bool,
    },

    /// A single upstream dispatch failed mid-stream.
    #[error("upstream stream error (status={status:?}): {message}")]
    UpstreamStreamError {
        status: Option<u16>,
        message: String,
    },

    /// Every candidate was exhausted without success.
    #[error(
        "All upstream providers failed for logical model '{logical_model_id}'; skipped={skipped} (in failure cooldown), last_status={last_status:?}, last_error={last_error}"
    )]
    AllProvidersFailed {
        logical_model_id: String,
        last_status: Option<u16>,
        last_error: String,
        skipped: u32,
        tried: u32,
    },

    /// The moderation gate denied the request before any provider was consulted.
    #[error("request denied by moderation: {0}")]
    ModerationDenied(String),

    /// Anything unexpected; never shown to the client beyond a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable tag, used in the JSON error body's `detail`.
    fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config_error",
            GatewayError::Redis(_) => "cache_error",
            GatewayError::HttpClient(_) => "http_client_error",
            GatewayError::Serialization(_) => "serialization_error",
            GatewayError::Io(_) => "io_error",
            GatewayError::LogicalModelMissing(_) => "logical_model_missing",
            GatewayError::NoUpstreams(_) => "no_upstreams",
            GatewayError::NoCandidates(_) => "no_candidates",
            GatewayError::NoAvailableKey { .. } => "no_available_key",
            GatewayError::UpstreamError { .. } => "upstream_error",
            GatewayError::UpstreamStreamError { .. } => "upstream_stream_error",
            GatewayError::AllProvidersFailed { .. } => "all_providers_failed",
            GatewayError::ModerationDenied(_) => "moderation_denied",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    detail: String,
    reason: &'static str,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::LogicalModelMissing(_) => StatusCode::NOT_FOUND,
            GatewayError::NoUpstreams(_) | GatewayError::NoCandidates(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::NoAvailableKey { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamError { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            GatewayError::UpstreamStreamError { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ModerationDenied(_) => StatusCode::BAD_REQUEST,
            GatewayError::Config(_)
            | GatewayError::Redis(_)
            | GatewayError::HttpClient(_)
            | GatewayError::Serialization(_)
            | GatewayError::Io(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
        } else {
            tracing::warn!(error = %self, "request failed");
        }
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody {
            status: status.as_u16(),
            detail,
            reason: self.code(),
        })
    }
}
