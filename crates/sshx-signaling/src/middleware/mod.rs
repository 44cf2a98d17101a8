//! Middleware stack for the rendezvous service.
//!
//! Layer order: Request → BodyLimit → Tracing → Handler

pub mod metrics;
pub mod tracing;

pub use metrics::{PullGuard, RequestTimer, SignalingMetrics};
pub use tracing::TracingLayer;
