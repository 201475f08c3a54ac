use std::net::SocketAddr;

use serde_json::Value;

use crate::cache::{DedupCache, HelloCache};
use crate::codec::Codec;
use crate::config::TransportConfig;
use crate::envelope::{Envelope, HELLO_EVENT};
use crate::identity::{new_instance_id, Origin};
use crate::medium::{self, Medium};
use crate::TransportError;

/// An envelope accepted from the medium.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub envelope: Envelope,
    /// Sender's network address as observed on the medium.
    pub from: SocketAddr,
    /// A `hello` identical to the previous one from the same sender.
    pub repeat: bool,
}

/// A beacon transport: send and receive envelopes on one medium.
///
/// Owns the medium, the codec and the origin stamped on every outgoing
/// envelope. Incoming traffic is filtered before it is returned:
/// undecodable packets are dropped, and envelopes from this process or
/// this instance are suppressed according to the configuration.
pub struct Transport {
    origin: Origin,
    codec: Codec,
    medium: Box<dyn Medium>,
    hello_cache: HelloCache,
    dedup: DedupCache,
    ignore_process: bool,
    ignore_instance: bool,
    max_packet_size: usize,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("origin", &self.origin)
            .field("medium", &self.medium.kind())
            .field("local", &self.medium.local_addr())
            .field("codec", &self.codec)
            .finish()
    }
}

impl Transport {
    /// Open the configured medium and start accepting traffic.
    ///
    /// Uses the configured instance id when one is set, otherwise a fresh
    /// one.
    pub async fn bind(config: TransportConfig) -> Result<Self, TransportError> {
        let medium = medium::open(&config).await?;
        let iid = config.instance_id.clone().unwrap_or_else(new_instance_id);
        let origin = Origin::local(iid, config.host_name.clone());

        tracing::info!(
            iid = %origin.iid,
            medium = medium.kind(),
            local = ?medium.local_addr(),
            sealed = config.has_key(),
            "transport bound"
        );

        Ok(Self {
            origin,
            codec: Codec::from_key(config.key.as_deref()),
            medium,
            hello_cache: HelloCache::default(),
            dedup: DedupCache::new(config.dedup_capacity),
            ignore_process: config.ignore_process,
            ignore_instance: config.ignore_instance,
            max_packet_size: config.max_packet_size,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.origin.iid
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Address peers see this transport's packets coming from.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.medium.local_addr()
    }

    /// Publish `event` with an optional payload to every peer on the medium.
    ///
    /// A `hello` whose payload equals the previous one is re-sent from the
    /// cached frame.
    pub async fn send(&mut self, event: &str, data: Option<Value>) -> Result<(), TransportError> {
        let is_hello = event == HELLO_EVENT;

        if is_hello {
            if let Some(frame) = self.hello_cache.get(&data) {
                return self.medium.send(frame).await.map_err(TransportError::Send);
            }
        }

        let envelope = Envelope::new(event, &self.origin, data);
        let frame = self.codec.encode(&envelope)?;
        if frame.len() > self.max_packet_size {
            return Err(TransportError::MessageTooLarge {
                size: frame.len(),
                max: self.max_packet_size,
            });
        }

        self.medium.send(&frame).await.map_err(TransportError::Send)?;

        if is_hello {
            self.hello_cache.store(envelope.data, frame);
        }
        Ok(())
    }

    /// Force the next `hello` to be re-encoded.
    pub fn invalidate_hello_cache(&mut self) {
        self.hello_cache.invalidate();
    }

    /// Wait for the next accepted envelope.
    ///
    /// Packets that fail to decode or are suppressed are skipped; only
    /// medium errors are returned.
    pub async fn recv(&mut self) -> Result<Delivery, TransportError> {
        loop {
            let (data, from) = self.medium.recv().await.map_err(TransportError::Receive)?;
            if let Some(delivery) = self.ingest(&data, from) {
                return Ok(delivery);
            }
        }
    }

    /// Decode and filter one raw packet.
    fn ingest(&mut self, data: &[u8], from: SocketAddr) -> Option<Delivery> {
        let envelope = match self.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::trace!(%from, len = data.len(), error = %e, "dropping undecodable packet");
                return None;
            }
        };

        if self.ignore_process && envelope.pid == self.origin.pid {
            return None;
        }
        if self.ignore_instance && envelope.iid == self.origin.iid {
            return None;
        }

        let repeat = envelope.is_hello()
            && self
                .dedup
                .observe(from, &envelope.iid, &envelope.host_name, &envelope.data);

        Some(Delivery {
            envelope,
            from,
            repeat,
        })
    }

    /// Release the medium. Further traffic is neither sent nor received.
    pub fn stop(self) {
        tracing::debug!(iid = %self.origin.iid, "transport stopped");
    }
}
