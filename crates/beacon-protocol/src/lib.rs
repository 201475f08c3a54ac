//! Beacon protocol layer.
//!
//! Peer discovery and master election on top of `beacon-transport`.
//! Every instance periodically announces itself with a `hello`, keeps a
//! table of live peers with timeout-based eviction, and runs a pluggable
//! election policy that promotes or demotes it based on peer weights.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use beacon_protocol::{Discover, DiscoverConfig, DiscoverEvent};
//!
//! # async fn example() -> Result<(), beacon_protocol::DiscoverError> {
//! let discover = Discover::new(DiscoverConfig::new().weight(10.0))?;
//! let mut events = discover.events();
//! discover.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         DiscoverEvent::Promotion { .. } => println!("I am master"),
//!         DiscoverEvent::Added { node } => println!("found {} at {}", node.id, node.address),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod election;
pub mod error;
pub mod membership;
pub mod runtime;
pub mod types;

pub use channel::{ChannelMessage, ChannelRegistry};
pub use config::{DiscoverConfig, Leadership, Timing, Weight};
pub use election::{
    BasicLeadershipElection, ElectionDecision, ElectionView, LeadershipElection,
    NoLeadershipElection,
};
pub use error::{ConfigError, DiscoverError};
pub use membership::{MembershipTable, MergeOutcome};
pub use runtime::{Discover, StartOutcome};
pub use types::{DiscoverEvent, LocalIdentity, PeerNode};

pub use beacon_transport::{RelayHub, TransportConfig};
