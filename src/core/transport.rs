//! C7 TransportDispatcher: the one place an HTTP call actually leaves the
//! process. Grounded on the teacher's `reqwest::Client` usage in its
//! provider adapters, narrowed to a single opaque pass-through call since
//! per-provider wire-format translation is out of scope here.

use crate::core::router::types::SelectedKey;
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// One non-streaming upstream response.
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, GatewayError>> + Send>>;

/// A dispatched streaming response: the status of the initial handshake plus
/// the chunk stream, so the retry engine can latch onto "first byte
/// received" before committing to not retrying further.
pub struct TransportStream {
    pub status: u16,
    pub body: ByteStream,
}

#[async_trait]
pub trait TransportDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        endpoint: &str,
        key: &SelectedKey,
        custom_headers: &std::collections::HashMap<String, String>,
        payload: &[u8],
    ) -> Result<TransportResponse>;

    async fn dispatch_stream(
        &self,
        endpoint: &str,
        key: &SelectedKey,
        custom_headers: &std::collections::HashMap<String, String>,
        payload: &[u8],
    ) -> Result<TransportStream>;
}

/// `reqwest`-backed dispatcher used in production.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` is the total-deadline per spec §5: once exceeded, the
    /// in-flight request fails and is treated as a retryable, status-less
    /// error by the retry engine.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self { client }
    }

    fn build_request(
        &self,
        endpoint: &str,
        key: &SelectedKey,
        custom_headers: &std::collections::HashMap<String, String>,
        payload: &[u8],
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(endpoint)
            .bearer_auth(&key.key)
            .header("content-type", "application/json")
            .body(payload.to_vec());
        for (name, value) in custom_headers {
            req = req.header(name, value);
        }
        req
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl TransportDispatcher for HttpTransport {
    async fn dispatch(
        &self,
        endpoint: &str,
        key: &SelectedKey,
        custom_headers: &std::collections::HashMap<String, String>,
        payload: &[u8],
    ) -> Result<TransportResponse> {
        let response = self
            .build_request(endpoint, key, custom_headers, payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, body })
    }

    async fn dispatch_stream(
        &self,
        endpoint: &str,
        key: &SelectedKey,
        custom_headers: &std::collections::HashMap<String, String>,
        payload: &[u8],
    ) -> Result<TransportStream> {
        let response = self
            .build_request(endpoint, key, custom_headers, payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(GatewayError::from));
        Ok(TransportStream {
            status,
            body: Box::pin(stream),
        })
    }
}
