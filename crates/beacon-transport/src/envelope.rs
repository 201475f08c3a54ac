use serde::{Deserialize, Serialize};

use crate::identity::Origin;

/// Event tag of the periodic self-announcement.
pub const HELLO_EVENT: &str = "hello";

/// Event tags owned by the discovery engine; never usable as channel names.
pub const RESERVED_EVENTS: [&str; 6] = [
    "promotion",
    "demotion",
    "added",
    "removed",
    "master",
    HELLO_EVENT,
];

/// Whether `event` is one of the engine's reserved tags.
pub fn is_reserved(event: &str) -> bool {
    RESERVED_EVENTS.contains(&event)
}

/// Wire envelope. The only structure that crosses the medium.
///
/// Serialized as `{ "event", "pid", "iid", "hostName", "data"? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event or channel tag.
    pub event: String,

    /// Sender's process id (shared by every instance in that process).
    pub pid: String,

    /// Sender's instance id.
    pub iid: String,

    /// Sender's advertised hostname.
    #[serde(rename = "hostName")]
    pub host_name: String,

    /// Opaque application payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// Create an envelope stamped with the sender's origin.
    pub fn new(event: &str, origin: &Origin, data: Option<serde_json::Value>) -> Self {
        Self {
            event: event.to_string(),
            pid: origin.pid.clone(),
            iid: origin.iid.clone(),
            host_name: origin.host_name.clone(),
            data,
        }
    }

    pub fn is_hello(&self) -> bool {
        self.event == HELLO_EVENT
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
