//! Signaling error types.
//!
//! Every request-level failure is terminal for that request. None are retried
//! by the service; pull callers retry after a timeout themselves.

use crate::domain::types::RendezvousKey;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

/// Request-level failures, each mapped to one HTTP status
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// Push body does not decode into a handshake payload
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// No payload arrived for the key before the pull deadline
    #[error("no payload for {key} within {}ms", waited.as_millis())]
    Timeout {
        key: RendezvousKey,
        waited: Duration,
    },

    /// Serializing a dequeued payload failed; the payload is lost
    #[error("failed to encode payload for {key}: {source}")]
    EncodingFailure {
        key: RendezvousKey,
        #[source]
        source: serde_json::Error,
    },

    /// Slot stayed at capacity for the whole bounded push wait
    #[error("slot {key} is full ({capacity} pending payloads)")]
    SlotFull { key: RendezvousKey, capacity: usize },

    /// Slot channel closed underneath a request
    #[error("slot {0} is closed")]
    SlotClosed(RendezvousKey),

    /// The service is shutting down
    #[error("shutdown in progress")]
    ShuttingDown,
}

impl SignalingError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::EncodingFailure { .. } | Self::SlotClosed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::SlotFull { .. } | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Timeouts and shutdown carry no body
            Self::Timeout { .. } | Self::ShuttingDown => status.into_response(),
            Self::SlotFull { .. } => (
                status,
                [(header::RETRY_AFTER, "1")],
                status.canonical_reason().unwrap_or_default(),
            )
                .into_response(),
            _ => (status, status.canonical_reason().unwrap_or_default()).into_response(),
        }
    }
}

/// Result type for signaling operations
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Service-level errors (startup and listener, not per request)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Listener failed while serving
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
