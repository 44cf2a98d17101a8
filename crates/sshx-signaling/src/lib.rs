//! sshx signaling - rendezvous service for peers that cannot reach each other yet.
//!
//! Two peers agree on an opaque key. One pushes a handshake payload (offer,
//! answer, candidates) under that key, the other pulls it. Each pushed payload
//! is delivered to exactly one puller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RENDEZVOUS SERVICE                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │   POST /push/{key}        GET /pull/{key}     /health        │
//! │          │                      │              /metrics      │
//! │  ┌───────┴──────────────────────┴────────┐                   │
//! │  │     Middleware: BodyLimit → Tracing    │                   │
//! │  └───────┬──────────────────────┬────────┘                   │
//! │          │ publish (bounded)    │ subscribe (deadline)       │
//! │  ┌───────┴──────────────────────┴────────┐                   │
//! │  │            Slot Registry               │ ← eviction task  │
//! │  │  DashMap<key, bounded queue (64)>      │                   │
//! │  └────────────────────────────────────────┘                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Status Codes
//!
//! - **push**: 200 enqueued, 400 malformed payload, 413 too large, 503 slot full
//! - **pull**: 200 payload, 408 deadline elapsed, 500 encoding failure, 503 shutting down
//!
//! # Usage
//!
//! ```ignore
//! use sshx_signaling::{SignalingConfig, SignalingService};
//!
//! let config = SignalingConfig::load()?;
//! let service = SignalingService::new(config)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod domain;
pub mod middleware;
pub mod service;

// Re-exports for public API
pub use client::{ClientError, SignalingClient};
pub use domain::config::SignalingConfig;
pub use domain::error::{ServiceError, SignalingError, SignalingResult};
pub use domain::registry::SlotRegistry;
pub use domain::types::{HandshakePayload, RendezvousKey};
pub use middleware::SignalingMetrics;
pub use service::SignalingService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
