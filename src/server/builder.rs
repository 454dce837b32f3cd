//! `run_server`: the process entrypoint, auto-loading configuration the way
//! the teacher's `run_server` does.

use crate::config::{self, GatewayConfig};
use crate::server::server::HttpServer;
use crate::utils::error::Result;
use tracing::info;

pub async fn run_server() -> Result<()> {
    info!("starting gateway");

    let config: GatewayConfig = config::loader::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        providers = config.providers.len(),
        logical_models = config.logical_models.len(),
        "configuration loaded"
    );

    let server = HttpServer::new(&config).await?;
    server.start().await
}
