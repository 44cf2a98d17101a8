//! Rendezvous keys and handshake payloads.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque identifier of one handshake slot.
///
/// Taken verbatim from the request path remainder. Never normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RendezvousKey(String);

impl RendezvousKey {
    /// Wrap a path remainder. Returns `None` for an empty key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RendezvousKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Offer/answer/candidate record exchanged between two peers.
///
/// Only `source` is interpreted (for logging). Every other top-level field is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Identifier of the peer that published the payload, empty when absent
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
    /// Session description, candidates and anything else the peers agree on
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl HandshakePayload {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Builder-style helper for attaching a field
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}
