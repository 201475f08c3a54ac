use std::time::Duration;

/// Errors returned by a discover instance.
///
/// Wraps transport errors and adds the protocol's own failures
/// (configuration, channel misuse, lifecycle).
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("transport error: {0}")]
    Transport(#[from] beacon_transport::TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("'{0}' is a reserved event name")]
    ReservedEvent(String),

    #[error("channel '{0}' is already joined")]
    AlreadyJoined(String),

    #[error("instance is not running")]
    NotRunning,

    #[error("discover instance shut down")]
    Shutdown,
}

/// Settings rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("node_timeout ({node_timeout:?}) must be >= check_interval ({check_interval:?})")]
    NodeTimeoutBelowCheckInterval {
        node_timeout: Duration,
        check_interval: Duration,
    },

    #[error("master_timeout ({master_timeout:?}) must be >= node_timeout ({node_timeout:?})")]
    MasterTimeoutBelowNodeTimeout {
        master_timeout: Duration,
        node_timeout: Duration,
    },

    #[error("masters_required must be at least 1")]
    ZeroMastersRequired,

    #[error("{0} must be non-zero")]
    ZeroInterval(&'static str),
}
