//! HTTP server: route registration, shared state, and the Actix-web runtime.

pub mod builder;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use builder::run_server;
pub use server::HttpServer;
pub use state::AppState;
