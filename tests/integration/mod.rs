//! Integration tests for the gateway.
//!
//! These build a real `RequestCoordinator` wired to an `HttpTransport`
//! pointed at `wiremock` servers standing in for upstream providers, rather
//! than mocking the `TransportDispatcher` trait directly.

mod failover;
mod sticky_sessions;

mod support;
