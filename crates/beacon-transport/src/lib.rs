//! Beacon transport layer.
//!
//! Moves JSON envelopes over one connectionless medium per instance
//! (UDP broadcast, UDP multicast, a fixed unicast list, a Redis pub/sub
//! channel, or an in-process relay hub), with optional shared-key encryption, self-origin
//! suppression and duplicate suppression for `hello` announcements.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use beacon_transport::{Transport, TransportConfig};
//!
//! # async fn example() -> Result<(), beacon_transport::TransportError> {
//! let mut transport = Transport::bind(TransportConfig::new().key("s3cret")).await?;
//! println!("My instance: {}", transport.instance_id());
//!
//! transport.send("jobs", Some(serde_json::json!({"id": 7}))).await?;
//!
//! let delivery = transport.recv().await?;
//! println!("{} from {}: {:?}", delivery.envelope.event, delivery.from, delivery.envelope.data);
//!
//! transport.stop();
//! # Ok(())
//! # }
//! ```

mod cache;
mod codec;
mod config;
mod envelope;
mod error;
mod identity;
mod medium;
mod pubsub;
mod transport;

pub use codec::{Codec, DecodeError};
pub use config::{MediumKind, TransportConfig};
pub use envelope::{is_reserved, Envelope, HELLO_EVENT, RESERVED_EVENTS};
pub use error::TransportError;
pub use identity::{new_instance_id, Origin, ProcessIdentity};
pub use medium::{Medium, RelayHub, RelayMedium, UdpMedium};
pub use pubsub::RedisMedium;
pub use transport::{Delivery, Transport};

/// Largest UDP payload deliverable over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default UDP port shared by all instances of a cluster.
pub const DEFAULT_PORT: u16 = 12345;
