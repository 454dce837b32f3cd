//! Route registration.

pub mod ai;
pub mod health;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check));
    ai::configure(cfg);
}
