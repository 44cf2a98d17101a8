//! Domain types for the rendezvous service.
//!
//! Keys, payloads, the slot registry, configuration, and error handling.

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, SignalingConfig};
pub use error::{ServiceError, SignalingError, SignalingResult};
pub use registry::{eviction_task, RegistryStats, SlotLease, SlotRegistry};
pub use types::{HandshakePayload, RendezvousKey};
