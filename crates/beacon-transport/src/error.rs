use std::net::Ipv4Addr;

/// Errors returned by the beacon transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind endpoint: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to join multicast group {group}: {source}")]
    MulticastJoin {
        group: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("envelope serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("transport is shut down")]
    Shutdown,

    #[error("invalid configuration: {0}")]
    Config(String),
}
