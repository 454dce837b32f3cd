//! Liveness endpoint.

use actix_web::{HttpResponse, Responder};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
