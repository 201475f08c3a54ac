/// Connectionless media a transport can publish on.
///
/// A medium moves opaque frames. It knows nothing about envelopes,
/// encryption or identity; everything it receives, including its own
/// frames looped back, is handed to the transport for filtering.
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use crate::config::{MediumKind, TransportConfig};
use crate::pubsub::RedisMedium;
use crate::TransportError;

/// Receive buffer size; one byte above the largest IPv4 datagram.
const RECV_BUFFER: usize = 65_536;

/// First synthetic port handed out by a [`RelayHub`].
const RELAY_BASE_PORT: u16 = 40_000;

/// A one-to-many frame medium.
#[async_trait::async_trait]
pub trait Medium: Send + Sync {
    /// Publish a frame to every destination of the medium.
    async fn send(&self, data: &[u8]) -> io::Result<()>;

    /// Wait for the next frame and its sender address.
    async fn recv(&mut self) -> io::Result<(Vec<u8>, SocketAddr)>;

    /// Address frames from this medium appear to come from.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

/// Open the medium described by `config`.
pub(crate) async fn open(config: &TransportConfig) -> Result<Box<dyn Medium>, TransportError> {
    match config.medium() {
        MediumKind::Relay(hub) => Ok(Box::new(hub.attach())),
        MediumKind::Redis { url, channel } => Ok(Box::new(
            RedisMedium::connect(&url, &channel, config.bind_addr()).await?,
        )),
        kind => Ok(Box::new(UdpMedium::bind(config, kind)?)),
    }
}

// ── UDP ─────────────────────────────────────────────────────────────

/// UDP socket sending every frame to a fixed destination set.
pub struct UdpMedium {
    socket: UdpSocket,
    destinations: Vec<SocketAddr>,
    label: &'static str,
    buf: Vec<u8>,
}

impl std::fmt::Debug for UdpMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpMedium")
            .field("local", &self.socket.local_addr().ok())
            .field("destinations", &self.destinations)
            .field("kind", &self.label)
            .finish()
    }
}

impl UdpMedium {
    /// Bind a socket for a broadcast, multicast or unicast medium.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &TransportConfig, kind: MediumKind) -> Result<Self, TransportError> {
        let bind_addr = config.bind_addr();
        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::Bind)?;

        if config.reuse_addr {
            socket
                .set_reuse_address(true)
                .map_err(TransportError::Bind)?;
        }
        socket.set_nonblocking(true).map_err(TransportError::Bind)?;
        socket
            .bind(&bind_addr.into())
            .map_err(TransportError::Bind)?;

        let (destinations, label) = match kind {
            MediumKind::Broadcast(address) => {
                socket.set_broadcast(true).map_err(TransportError::Bind)?;
                (vec![SocketAddr::new(IpAddr::V4(address), config.port)], "broadcast")
            }
            MediumKind::Multicast { group, ttl } => {
                let interface = match (config.multicast_interface, config.address) {
                    (Some(interface), _) => interface,
                    (None, IpAddr::V4(v4)) => v4,
                    (None, IpAddr::V6(_)) => Ipv4Addr::UNSPECIFIED,
                };
                socket
                    .join_multicast_v4(&group, &interface)
                    .map_err(|source| TransportError::MulticastJoin { group, source })?;
                if !interface.is_unspecified() {
                    socket
                        .set_multicast_if_v4(&interface)
                        .map_err(|source| TransportError::MulticastJoin { group, source })?;
                }
                socket
                    .set_multicast_ttl_v4(ttl)
                    .map_err(TransportError::Bind)?;
                socket
                    .set_multicast_loop_v4(true)
                    .map_err(TransportError::Bind)?;
                (vec![SocketAddr::new(IpAddr::V4(group), config.port)], "multicast")
            }
            MediumKind::Unicast(peers) => (peers, "unicast"),
            MediumKind::Relay(_) | MediumKind::Redis { .. } => {
                return Err(TransportError::Config(
                    "pub/sub medium cannot be bound to a UDP socket".into(),
                ))
            }
        };

        let socket = UdpSocket::from_std(socket.into()).map_err(TransportError::Bind)?;

        tracing::debug!(
            local = ?socket.local_addr().ok(),
            kind = label,
            destinations = destinations.len(),
            "UDP medium bound"
        );

        Ok(Self {
            socket,
            destinations,
            label,
            buf: vec![0u8; RECV_BUFFER],
        })
    }
}

#[async_trait::async_trait]
impl Medium for UdpMedium {
    async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut first_error = None;
        for destination in &self.destinations {
            if let Err(e) = self.socket.send_to(data, destination).await {
                tracing::debug!(%destination, error = %e, "send_to failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn recv(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let (len, from) = self.socket.recv_from(&mut self.buf).await?;
        Ok((self.buf[..len].to_vec(), from))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    fn kind(&self) -> &'static str {
        self.label
    }
}

// ── Relay ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RelayFrame {
    from: SocketAddr,
    data: Bytes,
}

/// In-process publish/subscribe hub.
///
/// Every attached medium receives every frame published on the hub,
/// its own included, exactly like a broadcast socket with loopback.
/// Useful for running whole clusters inside one process.
#[derive(Debug, Clone)]
pub struct RelayHub {
    tx: broadcast::Sender<RelayFrame>,
    next_port: Arc<AtomicU16>,
}

impl RelayHub {
    /// Create a hub buffering up to `capacity` frames per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_port: Arc::new(AtomicU16::new(RELAY_BASE_PORT)),
        }
    }

    /// Attach a new medium with its own synthetic sender address.
    pub fn attach(&self) -> RelayMedium {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        RelayMedium {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        }
    }

    /// Number of media currently attached.
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A medium attached to a [`RelayHub`].
#[derive(Debug)]
pub struct RelayMedium {
    tx: broadcast::Sender<RelayFrame>,
    rx: broadcast::Receiver<RelayFrame>,
    addr: SocketAddr,
}

#[async_trait::async_trait]
impl Medium for RelayMedium {
    async fn send(&self, data: &[u8]) -> io::Result<()> {
        let frame = RelayFrame {
            from: self.addr,
            data: Bytes::copy_from_slice(data),
        };
        self.tx
            .send(frame)
            .map(|_| ())
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "relay hub has no subscribers"))
    }

    async fn recv(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Ok((frame.data.to_vec(), frame.from)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(addr = %self.addr, skipped, "relay subscriber lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "relay hub closed"));
                }
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }

    fn kind(&self) -> &'static str {
        "relay"
    }
}
