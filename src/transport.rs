//! HTTP transport used by the EIA client.
//!
//! The client only needs "send a request, get a status and a body back".
//! Keeping that behind a trait lets tests script upstream behaviour without
//! a network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use tracing::debug;

use crate::error::RenewVizError;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request. Implementations must be usable from concurrent tasks.
///
/// Any I/O level failure must come back as `RenewVizError::Transport` so the
/// retry policy treats it as transient. HTTP error statuses are not errors
/// at this level.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse, RenewVizError>;
}

/// reqwest-backed transport sharing one pooled client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, RenewVizError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("renewviz/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RenewVizError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse, RenewVizError> {
        let mut url = Url::parse(url)
            .map_err(|e| RenewVizError::Config(format!("invalid URL {url:?}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        debug!("{} {}", method, url.path());
        let response = self
            .client
            .request(method, url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RenewVizError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| RenewVizError::Transport(e.to_string()))?;

        Ok(RawResponse::new(status, body.to_vec()))
    }
}
