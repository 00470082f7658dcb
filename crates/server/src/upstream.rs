//! Upstream origin client.
//!
//! Resolves a tile coordinate to an origin URL and performs conditional GETs.
//! Failures are classified as [`UpstreamError::Offline`] (no network path) or
//! [`UpstreamError::Rejected`] (the origin answered with an error status after
//! retries). The read path flattens both to `not_found`; the distinction only
//! feeds logs and metrics.

use crate::metrics;
use bytes::Bytes;
use mapvault_core::config::UpstreamConfig;
use mapvault_core::template;
use mapvault_core::{TileCoord, TileJson};
use mapvault_metadata::models::TilesetRow;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use std::time::{Duration, Instant};

/// Longest origin error body kept in a [`UpstreamError::Rejected`] message.
const MAX_ERROR_MESSAGE_CHARS: usize = 256;

/// Result of a successful conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The origin returned a body.
    Fresh { data: Bytes, etag: Option<String> },
    /// The origin confirmed the supplied validator is current.
    NotModified,
}

/// Upstream failure classification.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream offline: {0}")]
    Offline(String),

    #[error("upstream returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl UpstreamError {
    /// Metric label for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offline(_) => "offline",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        // Transport failures are never retried here; they mean "no path to origin".
        Self::Offline(err.to_string())
    }
}

/// Build the origin URL for a tile of `tileset`, if it has any upstream.
pub fn upstream_url_for(tileset: &TilesetRow, coord: &TileCoord) -> Option<String> {
    let templates = tileset.upstream_templates();
    if templates.is_empty() {
        return None;
    }
    let scheme = serde_json::from_str::<TileJson>(&tileset.tilejson)
        .map(|doc| doc.scheme)
        .unwrap_or_default();
    template::upstream_url(&templates, scheme, coord)
}

/// HTTP client for upstream tile origins.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl UpstreamClient {
    /// Create a client from configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Fetch `url`, sending `validator` as `If-None-Match` when present.
    pub async fn fetch(
        &self,
        url: &str,
        validator: Option<&str>,
    ) -> Result<FetchOutcome, UpstreamError> {
        let started = Instant::now();
        let result = self.fetch_with_retries(url, validator).await;
        metrics::UPSTREAM_FETCH_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(FetchOutcome::Fresh { .. }) => metrics::record_upstream_fetch("ok"),
            Ok(FetchOutcome::NotModified) => metrics::record_upstream_fetch("not_modified"),
            Err(e) => metrics::record_upstream_fetch(e.kind()),
        }
        result
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        validator: Option<&str>,
    ) -> Result<FetchOutcome, UpstreamError> {
        let mut attempt = 0u32;
        loop {
            let mut request = self.client.get(url);
            if let Some(validator) = validator {
                request = request.header(IF_NONE_MATCH, validator);
            }
            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchOutcome::NotModified);
            }

            if status.is_success() {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let data = response.bytes().await?;
                return Ok(FetchOutcome::Fresh { data, etag });
            }

            if status.is_server_error() && attempt < self.max_retries {
                attempt += 1;
                tracing::debug!(
                    url = %url,
                    status = status.as_u16(),
                    attempt,
                    "Upstream server error, retrying"
                );
                tokio::time::sleep(self.retry_backoff * attempt).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                body.trim().chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
            };
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
    }
}
