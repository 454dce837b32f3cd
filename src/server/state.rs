//! Application state shared across HTTP handlers.
//!
//! Grounded on the teacher's `AppState` (one `Arc`-wrapped struct handed to
//! every handler via `web::Data`), narrowed to the one thing every route
//! actually needs: the request coordinator.

use crate::config::GatewayConfig;
use crate::core::coordinator::RequestCoordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub coordinator: Arc<RequestCoordinator>,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>, coordinator: Arc<RequestCoordinator>) -> Self {
        Self { config, coordinator }
    }
}
