//! HTTP client for the push/pull endpoints.
//!
//! This is how a peer node talks to the rendezvous service named by its
//! `SignalingServerAddr` setting.

use crate::domain::types::{HandshakePayload, RendezvousKey};
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode, Url};
use sshx_conf::Settings;
use tracing::debug;

/// Client-side failures
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport or body decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Base address is not an absolute http(s) URL
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// Key has a `.` or `..` segment, which URL normalization would rewrite
    #[error("key {0} cannot be addressed over HTTP")]
    UnroutableKey(RendezvousKey),

    /// The slot stayed full; retry later
    #[error("slot {0} is full, retry later")]
    SlotFull(RendezvousKey),

    /// Any other non-success status
    #[error("request rejected with status {status}")]
    Rejected { status: StatusCode },
}

/// Rendezvous client
#[derive(Debug, Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SignalingClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing connection pool
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let raw = base_url.into();
        let invalid = |reason: String| ClientError::InvalidBaseUrl {
            url: raw.clone(),
            reason,
        };

        let base_url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }
        Ok(Self { http, base_url })
    }

    /// Client for the service named in a settings snapshot
    pub fn from_settings(settings: &Settings) -> Result<Self, ClientError> {
        Self::new(settings.signaling_server_addr.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/{op}/{key}`, each key segment percent-encoded so the server
    /// decodes exactly `key.as_str()`.
    fn url(&self, op: &str, key: &RendezvousKey) -> Result<Url, ClientError> {
        let segments = key.as_str().split('/');
        if segments.clone().any(|segment| segment == "." || segment == "..") {
            return Err(ClientError::UnroutableKey(key.clone()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            })?
            .pop_if_empty()
            .push(op)
            .extend(segments);
        Ok(url)
    }

    /// Deposit `payload` under `key`
    pub async fn push(
        &self,
        key: &RendezvousKey,
        payload: &HandshakePayload,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("push", key)?)
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                debug!(key = %key, source = %payload.source, "Pushed handshake payload");
                Ok(())
            }
            StatusCode::SERVICE_UNAVAILABLE if is_retryable(&response) => {
                Err(ClientError::SlotFull(key.clone()))
            }
            status => Err(ClientError::Rejected { status }),
        }
    }

    /// Wait for one payload under `key`. `Ok(None)` when the server-side deadline elapsed.
    pub async fn pull(&self, key: &RendezvousKey) -> Result<Option<HandshakePayload>, ClientError> {
        let response = self.http.get(self.url("pull", key)?).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::REQUEST_TIMEOUT => Ok(None),
            status => Err(ClientError::Rejected { status }),
        }
    }

    /// `pull`, repeated after each timeout, at most `attempts` times
    pub async fn pull_with_retry(
        &self,
        key: &RendezvousKey,
        attempts: usize,
    ) -> Result<Option<HandshakePayload>, ClientError> {
        for attempt in 1..=attempts {
            if let Some(payload) = self.pull(key).await? {
                return Ok(Some(payload));
            }
            debug!(key = %key, attempt, attempts, "Pull timed out, retrying");
        }
        Ok(None)
    }
}

/// Full slots answer with `Retry-After`; shutdown does not
fn is_retryable(response: &Response) -> bool {
    response.headers().contains_key(RETRY_AFTER)
}
