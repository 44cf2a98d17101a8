//! The persisted node settings record.

use crate::error::{ConfError, ConfResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rendezvous service used when the settings file does not name one.
pub const DEFAULT_SIGNALING_SERVER_ADDR: &str = "http://peer1.cotnetwork.com:8990";

const DEFAULT_STUN_URLS: [&str; 5] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
];

/// Settings for one sshx node.
///
/// JSON field names match the files written by earlier sshx releases, so an
/// existing `.sshx_config.json` keeps loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared secret presented to peers
    #[serde(rename = "Key")]
    pub key: String,
    /// Address of the local SSH daemon being forwarded
    #[serde(rename = "LocalSSHAddr")]
    pub local_ssh_addr: String,
    /// Address the node listens on for forwarded sessions
    #[serde(rename = "LocalListenAddr")]
    pub local_listen_addr: String,
    /// Full nodes accept inbound sessions; limited nodes only dial out
    #[serde(rename = "FullNode")]
    pub full_node: bool,
    /// Node identity, also used as the `source` of handshake payloads
    #[serde(rename = "ID")]
    pub id: String,
    /// Base URL of the rendezvous service
    #[serde(rename = "SignalingServerAddr")]
    pub signaling_server_addr: String,
    /// Peer-connection settings
    #[serde(rename = "RTCConf")]
    pub rtc_conf: RtcConfiguration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            local_ssh_addr: "127.0.0.1:22".to_string(),
            local_listen_addr: "127.0.0.1:2222".to_string(),
            full_node: true,
            id: Uuid::new_v4().to_string(),
            signaling_server_addr: DEFAULT_SIGNALING_SERVER_ADDR.to_string(),
            rtc_conf: RtcConfiguration::default(),
        }
    }
}

impl Settings {
    /// Set a scalar field from its string form.
    ///
    /// Field names are matched case-insensitively against the JSON names
    /// (`key`, `localsshaddr`, `locallistenaddr`, `fullnode`, `id`,
    /// `signalingserveraddr`). `RTCConf` is structured and cannot be set here.
    pub fn set_field(&mut self, field: &str, value: &str) -> ConfResult<()> {
        match field.to_ascii_lowercase().as_str() {
            "key" => self.key = value.to_string(),
            "localsshaddr" => self.local_ssh_addr = value.to_string(),
            "locallistenaddr" => self.local_listen_addr = value.to_string(),
            "fullnode" => {
                self.full_node = value.trim().parse().map_err(|_| ConfError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                })?
            }
            "id" => self.id = value.to_string(),
            "signalingserveraddr" => self.signaling_server_addr = value.to_string(),
            _ => return Err(ConfError::UnknownField(field.to_string())),
        }
        Ok(())
    }
}

/// Peer-connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfiguration {
    /// NAT-traversal helper servers
    #[serde(rename = "ICEServers", alias = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer {
                urls: DEFAULT_STUN_URLS.iter().map(|u| u.to_string()).collect(),
                username: None,
                credential: None,
            }],
        }
    }
}

/// A STUN or TURN server entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.local_listen_addr, "127.0.0.1:2222");
        assert_eq!(settings.local_ssh_addr, "127.0.0.1:22");
        assert!(settings.full_node);
        assert_eq!(settings.signaling_server_addr, DEFAULT_SIGNALING_SERVER_ADDR);
        assert_eq!(settings.rtc_conf.ice_servers.len(), 1);
        assert_eq!(settings.rtc_conf.ice_servers[0].urls.len(), 5);
        assert!(Uuid::parse_str(&settings.id).is_ok());
        assert!(Uuid::parse_str(&settings.key).is_ok());
    }

    #[test]
    fn test_fresh_identities_differ() {
        let a = Settings::default();
        let b = Settings::default();
        assert_ne!(a.id, b.id);
        assert_ne!(a.key, a.id);
    }

    #[test]
    fn test_json_field_names() {
        let settings = Settings::default();
        let json = serde_json::to_value(&settings).unwrap();
        for field in [
            "Key",
            "LocalSSHAddr",
            "LocalListenAddr",
            "FullNode",
            "ID",
            "SignalingServerAddr",
            "RTCConf",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json["RTCConf"]["ICEServers"][0]["urls"].is_array());
        assert!(json["RTCConf"]["ICEServers"][0].get("username").is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"ID":"node-1","FullNode":false,"RTCConf":{"iceServers":[{"urls":["stun:example.org:3478"]}]}}"#,
        )
        .unwrap();
        assert_eq!(settings.id, "node-1");
        assert!(!settings.full_node);
        assert_eq!(settings.local_listen_addr, "127.0.0.1:2222");
        assert_eq!(settings.rtc_conf.ice_servers[0].urls, vec!["stun:example.org:3478"]);
    }

    #[test]
    fn test_set_field() {
        let mut settings = Settings::default();
        settings.set_field("LocalListenAddr", "127.0.0.1:3333").unwrap();
        settings.set_field("fullnode", "false").unwrap();
        settings.set_field("SIGNALINGSERVERADDR", "http://localhost:8080").unwrap();

        assert_eq!(settings.local_listen_addr, "127.0.0.1:3333");
        assert!(!settings.full_node);
        assert_eq!(settings.signaling_server_addr, "http://localhost:8080");
    }

    #[test]
    fn test_set_field_errors() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set_field("rtcconf", "x"),
            Err(ConfError::UnknownField(_))
        ));
        assert!(matches!(
            settings.set_field("FullNode", "maybe"),
            Err(ConfError::InvalidValue { .. })
        ));
        assert!(settings.full_node);
    }
}
