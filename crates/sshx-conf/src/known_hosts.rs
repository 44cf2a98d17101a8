//! Known-hosts pruning.
//!
//! The forwarded SSH service is reached through the node's local listen
//! address, so every peer shows up in `known_hosts` under that same address.
//! Host keys recorded for it go stale whenever the peer behind it changes.

use crate::error::{ConfError, ConfResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `$HOME/.ssh/known_hosts`, or `None` when `HOME` is unset.
pub fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh").join("known_hosts"))
}

/// The form ssh writes for a non-default port: `127.0.0.1:2222` → `[127.0.0.1]:2222`.
pub fn host_pattern(listen_addr: &str) -> String {
    listen_addr.replacen("127.0.0.1", "[127.0.0.1]", 1)
}

/// Remove every line mentioning `listen_addr` from the known-hosts file.
///
/// Returns the number of lines removed. An empty address removes nothing.
pub fn prune(path: &Path, listen_addr: &str) -> ConfResult<usize> {
    if listen_addr.is_empty() {
        return Ok(0);
    }

    let pattern = host_pattern(listen_addr);
    let input = fs::read_to_string(path).map_err(|e| ConfError::io(path, e))?;

    let kept: Vec<&str> = input
        .split('\n')
        .filter(|line| !line.contains(&pattern))
        .collect();
    let removed = input.split('\n').count() - kept.len();

    if removed > 0 {
        fs::write(path, kept.join("\n")).map_err(|e| ConfError::io(path, e))?;
        debug!(path = %path.display(), pattern = %pattern, removed, "Pruned known hosts");
    }

    Ok(removed)
}
