//! # sshx-conf
//!
//! Node settings for sshx peers.
//!
//! ## Components
//!
//! - [`Settings`]: the persisted settings record (`.sshx_config.json`)
//! - [`ConfigManager`]: load / default-write / set / show, plus immutable
//!   snapshots published over a `tokio::sync::watch` channel
//! - [`known_hosts`]: prunes stale host keys for the local listen address
//!
//! ## Hot Reload
//!
//! ```text
//! .sshx_config.json ──(mtime poll)──→ watcher task ──reload()──→ watch::Sender<Arc<Settings>>
//!                                                                   │
//!                                            ┌──────────────────────┼──────────────┐
//!                                            ↓                      ↓              ↓
//!                                       consumer A             consumer B      current()
//! ```
//!
//! Consumers never see a half-updated record: each reload parses the whole
//! file into a fresh `Settings` and swaps the snapshot atomically.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
pub mod known_hosts;
mod manager;
mod settings;

pub use error::{ConfError, ConfResult};
pub use manager::{ConfigManager, CONFIG_FILE_NAME};
pub use settings::{IceServer, RtcConfiguration, Settings, DEFAULT_SIGNALING_SERVER_ADDR};
