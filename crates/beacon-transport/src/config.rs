use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::cache::DEFAULT_DEDUP_CAPACITY;
use crate::medium::RelayHub;
use crate::pubsub::DEFAULT_REDIS_CHANNEL;
use crate::{DEFAULT_PORT, MAX_DATAGRAM_SIZE};

/// Configuration for a [`Transport`](crate::Transport).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use beacon_transport::TransportConfig;
/// use std::net::Ipv4Addr;
///
/// let config = TransportConfig::new()
///     .port(4000)
///     .multicast(Ipv4Addr::new(239, 0, 0, 7))
///     .multicast_ttl(2)
///     .key("cluster-secret");
/// ```
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local bind address.
    pub(crate) address: IpAddr,
    /// Local bind port, also the destination port for broadcast and multicast.
    pub(crate) port: u16,
    /// Explicit broadcast address (default `255.255.255.255`).
    pub(crate) broadcast: Option<Ipv4Addr>,
    /// Multicast group; takes precedence over broadcast.
    pub(crate) multicast: Option<Ipv4Addr>,
    pub(crate) multicast_ttl: u32,
    /// Interface the group is joined on; defaults to the bind address.
    pub(crate) multicast_interface: Option<Ipv4Addr>,
    /// Fixed peer list; takes precedence over multicast and broadcast.
    pub(crate) unicast: Vec<SocketAddr>,
    /// Redis server URL; takes precedence over every socket medium.
    pub(crate) redis: Option<String>,
    pub(crate) redis_channel: String,
    /// In-process relay hub; takes precedence over every other medium.
    pub(crate) relay: Option<RelayHub>,
    /// Shared secret sealing every packet.
    pub(crate) key: Option<String>,
    pub(crate) reuse_addr: bool,
    /// Drop envelopes sent by any instance of this process.
    pub(crate) ignore_process: bool,
    /// Drop envelopes sent by this instance.
    pub(crate) ignore_instance: bool,
    /// Hostname override; defaults to the process hostname.
    pub(crate) host_name: Option<String>,
    /// Instance id override; a fresh one is generated when unset.
    pub(crate) instance_id: Option<String>,
    pub(crate) max_packet_size: usize,
    pub(crate) dedup_capacity: usize,
}

/// The medium a transport resolves its configuration to.
#[derive(Debug, Clone)]
pub enum MediumKind {
    Broadcast(Ipv4Addr),
    Multicast { group: Ipv4Addr, ttl: u32 },
    Unicast(Vec<SocketAddr>),
    Redis { url: String, channel: String },
    Relay(RelayHub),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    /// Create a new config with defaults: broadcast on `0.0.0.0:12345`.
    pub fn new() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            broadcast: None,
            multicast: None,
            multicast_ttl: 1,
            multicast_interface: None,
            unicast: Vec::new(),
            redis: None,
            redis_channel: DEFAULT_REDIS_CHANNEL.to_string(),
            relay: None,
            key: None,
            reuse_addr: true,
            ignore_process: true,
            ignore_instance: true,
            host_name: None,
            instance_id: None,
            max_packet_size: MAX_DATAGRAM_SIZE,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }

    /// Set the local bind address (default: `0.0.0.0`).
    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Set the port (default: 12345).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Broadcast to a specific address instead of `255.255.255.255`.
    pub fn broadcast(mut self, address: Ipv4Addr) -> Self {
        self.broadcast = Some(address);
        self
    }

    /// Join and send to a multicast group.
    pub fn multicast(mut self, group: Ipv4Addr) -> Self {
        self.multicast = Some(group);
        self
    }

    /// Multicast TTL (default: 1).
    pub fn multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Join the multicast group on this interface rather than the bind
    /// address.
    pub fn multicast_interface(mut self, interface: Ipv4Addr) -> Self {
        self.multicast_interface = Some(interface);
        self
    }

    /// Send to a fixed list of peers.
    pub fn unicast(mut self, peers: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.unicast = peers.into_iter().collect();
        self
    }

    /// Publish through a Redis server's pub/sub channel instead of a socket,
    /// e.g. `redis://10.0.0.5:6379/`.
    pub fn redis(mut self, url: impl Into<String>) -> Self {
        self.redis = Some(url.into());
        self
    }

    /// Redis channel shared by the cluster (default: `beacon`).
    pub fn redis_channel(mut self, channel: impl Into<String>) -> Self {
        self.redis_channel = channel.into();
        self
    }

    /// Publish through an in-process relay hub instead of a socket.
    pub fn relay(mut self, hub: RelayHub) -> Self {
        self.relay = Some(hub);
        self
    }

    /// Seal every packet with a shared secret.
    pub fn key(mut self, secret: impl Into<String>) -> Self {
        self.key = Some(secret.into());
        self
    }

    /// Allow several sockets on one port (default: true).
    pub fn reuse_addr(mut self, enabled: bool) -> Self {
        self.reuse_addr = enabled;
        self
    }

    /// Drop traffic from other instances of this process (default: true).
    pub fn ignore_process(mut self, enabled: bool) -> Self {
        self.ignore_process = enabled;
        self
    }

    /// Drop traffic from this instance (default: true).
    pub fn ignore_instance(mut self, enabled: bool) -> Self {
        self.ignore_instance = enabled;
        self
    }

    /// Advertise a hostname other than the process hostname.
    pub fn host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    /// Use a caller-chosen instance id.
    pub fn instance_id(mut self, iid: impl Into<String>) -> Self {
        self.instance_id = Some(iid.into());
        self
    }

    /// Reject outgoing packets above this size (default: 65507).
    pub fn max_packet_size(mut self, bytes: usize) -> Self {
        self.max_packet_size = bytes;
        self
    }

    /// Number of sender addresses remembered for hello dedup (default: 256).
    pub fn dedup_capacity(mut self, entries: usize) -> Self {
        self.dedup_capacity = entries;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// The instance id set with [`instance_id`](Self::instance_id), if any.
    pub fn instance_id_override(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Resolve the medium: relay > redis > unicast > multicast > broadcast.
    pub fn medium(&self) -> MediumKind {
        if let Some(hub) = &self.relay {
            MediumKind::Relay(hub.clone())
        } else if let Some(url) = &self.redis {
            MediumKind::Redis {
                url: url.clone(),
                channel: self.redis_channel.clone(),
            }
        } else if !self.unicast.is_empty() {
            MediumKind::Unicast(self.unicast.clone())
        } else if let Some(group) = self.multicast {
            MediumKind::Multicast {
                group,
                ttl: self.multicast_ttl,
            }
        } else {
            MediumKind::Broadcast(self.broadcast.unwrap_or(Ipv4Addr::BROADCAST))
        }
    }
}
