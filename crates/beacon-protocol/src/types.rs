use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// This instance's own state, exactly the payload of every `hello`.
///
/// Serialized as `{ "isMaster", "isMasterEligible", "weight", "address",
/// "advertisement"? }`. Missing fields decode to their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalIdentity {
    pub is_master: bool,
    pub is_master_eligible: bool,
    pub weight: f64,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertisement: Option<Value>,
}

/// A remote instance as seen in the membership table.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerNode {
    /// Instance id.
    pub id: String,
    /// Packet source address.
    pub address: IpAddr,
    pub port: u16,
    pub host_name: String,
    pub weight: f64,
    pub is_master: bool,
    pub is_master_eligible: bool,
    /// Last accepted announcement; never moves backwards.
    pub last_seen: Instant,
    pub advertisement: Option<Value>,
}

/// Lifecycle events observable on [`Discover::events`](crate::Discover::events).
#[derive(Debug, Clone)]
pub enum DiscoverEvent {
    /// The transport is bound and timers are armed.
    Started,
    /// The instance stopped.
    Stopped,
    /// This instance became master.
    Promotion { me: LocalIdentity },
    /// This instance gave up mastership.
    Demotion { me: LocalIdentity },
    /// A peer announced itself for the first time (or after eviction).
    Added { node: PeerNode },
    /// A peer timed out.
    Removed { node: PeerNode },
    /// A peer is newly recognized as master.
    Master { node: PeerNode },
    /// An announcement was accepted.
    HelloReceived {
        node: PeerNode,
        is_new: bool,
        /// Previous master flag; `None` when the peer is new.
        was_master: Option<bool>,
    },
    /// This instance announced itself.
    HelloEmitted,
    /// A check sweep finished.
    Check,
    /// Non-fatal runtime failure (send or receive).
    Error { description: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_payload_field_names() {
        let me = LocalIdentity {
            is_master: true,
            is_master_eligible: true,
            weight: 1.5,
            address: "10.0.0.1".into(),
            advertisement: None,
        };
        let value = serde_json::to_value(&me).unwrap();
        assert_eq!(
            value,
            json!({
                "isMaster": true,
                "isMasterEligible": true,
                "weight": 1.5,
                "address": "10.0.0.1"
            })
        );
    }

    #[test]
    fn partial_payload_uses_defaults() {
        let me: LocalIdentity =
            serde_json::from_value(json!({"isMaster": true, "advertisement": {"http": 80}})).unwrap();
        assert!(me.is_master);
        assert!(!me.is_master_eligible);
        assert_eq!(me.weight, 0.0);
        assert_eq!(me.advertisement, Some(json!({"http": 80})));
    }
}
