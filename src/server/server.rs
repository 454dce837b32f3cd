//! HTTP server core implementation: wires a `GatewayConfig` into a running
//! Actix-web app. Grounded on the teacher's `HttpServer::new`/`create_app`
//! split (construct shared state once, build the `App` factory per worker).

use crate::config::{GatewayConfig, ProviderDef};
use crate::core::coordinator::RequestCoordinator;
use crate::core::moderation::NoopModerationGate;
use crate::core::router::health::HealthOracle;
use crate::core::router::keypool::KeyPool;
use crate::core::router::metrics::MetricsStore;
use crate::core::router::provider_selector::ProviderSelector;
use crate::core::router::retry_engine::RetryEngine;
use crate::core::router::session::SessionStore;
use crate::core::router::types::LogicalModel;
use crate::core::transport::HttpTransport;
use crate::core::usage::NoopUsageRecorder;
use crate::server::middleware::request_id::stamp_request_id;
use crate::server::routes;
use crate::server::state::AppState;
use crate::storage::{CacheStore, MemoryCache, RedisCache};
use crate::utils::error::{GatewayError, Result};
use actix_cors::Cors;
use actix_web::{App, HttpServer as ActixHttpServer, middleware::DefaultHeaders, middleware::from_fn, web};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub struct HttpServer {
    host: String,
    port: u16,
    state: AppState,
}

impl HttpServer {
    pub async fn new(config: &GatewayConfig) -> Result<Self> {
        info!("assembling gateway components from configuration");

        let cache: Arc<dyn CacheStore> = match &config.cache.redis_url {
            Some(url) => {
                info!("connecting to redis cache backend");
                Arc::new(RedisCache::connect(url).await?)
            }
            None => {
                info!("no redis_url configured, using in-process cache");
                Arc::new(MemoryCache::new())
            }
        };

        let providers: HashMap<String, ProviderDef> = config
            .providers
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();

        let logical_models: HashMap<String, LogicalModel> = config
            .logical_models
            .iter()
            .map(|def| (def.logical_id.clone(), LogicalModel::from(def)))
            .collect();

        let metrics = Arc::new(MetricsStore::new());
        let health = Arc::new(HealthOracle::new(
            cache.clone(),
            config.router.provider_failure_threshold,
        ));
        let sessions = Arc::new(SessionStore::new(cache.clone()));
        let selector = ProviderSelector::new(
            cache.clone(),
            metrics,
            health,
            sessions.clone(),
            config.router.enable_provider_health_check,
            config.router.latency_cap_ms,
        );
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let retry_engine = Arc::new(RetryEngine::new(
            cache.clone(),
            keypool,
            Arc::new(HttpTransport::new(Duration::from_secs(
                config.router.dispatch_timeout_seconds,
            ))),
            config.router.provider_failure_threshold,
            Duration::from_secs(config.router.provider_failure_cooldown_seconds),
        ));

        let coordinator = Arc::new(RequestCoordinator::new(
            logical_models,
            Arc::new(providers),
            selector,
            retry_engine,
            sessions,
            Arc::new(NoopModerationGate),
            Arc::new(NoopUsageRecorder),
            cache,
        ));

        let state = AppState::new(Arc::new(config.clone()), coordinator);

        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            state,
        })
    }

    fn create_app(
        state: web::Data<AppState>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(state)
            .wrap(Cors::permissive())
            .wrap(from_fn(stamp_request_id))
            .wrap(TracingLogger::default())
            .wrap(DefaultHeaders::new().add(("Server", "gateway")))
            .configure(routes::configure)
    }

    pub async fn start(self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);
        info!(address = %bind_addr, "starting http server");

        let state = web::Data::new(self.state);
        let server = ActixHttpServer::new(move || Self::create_app(state.clone()))
            .bind(&bind_addr)
            .map_err(|e| GatewayError::Internal(format!("failed to bind {bind_addr}: {e}")))?
            .run();

        server
            .await
            .map_err(|e| GatewayError::Internal(format!("server error: {e}")))?;

        info!("http server stopped");
        Ok(())
    }
}
