/// Named channels multiplexed over the transport.
///
/// Any non-`hello` envelope whose event matches a joined channel is fanned
/// out to that channel's subscribers. Reserved engine tags can never be
/// joined or sent on.
use std::collections::HashMap;
use std::net::SocketAddr;

use beacon_transport::{is_reserved, Envelope};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::DiscoverError;

/// Messages buffered per channel subscriber.
const CHANNEL_CAPACITY: usize = 256;

/// A message received on a joined channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub envelope: Envelope,
    /// Sender's network address.
    pub from: SocketAddr,
}

impl ChannelMessage {
    pub fn channel(&self) -> &str {
        &self.envelope.event
    }

    pub fn data(&self) -> Option<&Value> {
        self.envelope.data.as_ref()
    }

    /// Sender's instance id.
    pub fn sender(&self) -> &str {
        &self.envelope.iid
    }
}

/// Reject the engine's reserved tags.
pub fn ensure_unreserved(channel: &str) -> Result<(), DiscoverError> {
    if is_reserved(channel) {
        return Err(DiscoverError::ReservedEvent(channel.to_string()));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, broadcast::Sender<ChannelMessage>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start receiving `channel`.
    pub fn join(&mut self, channel: &str) -> Result<broadcast::Receiver<ChannelMessage>, DiscoverError> {
        ensure_unreserved(channel)?;
        if self.channels.contains_key(channel) {
            return Err(DiscoverError::AlreadyJoined(channel.to_string()));
        }
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.channels.insert(channel.to_string(), tx);
        tracing::debug!(channel, "joined channel");
        Ok(rx)
    }

    /// Stop receiving `channel`; subscribers see the stream close.
    pub fn leave(&mut self, channel: &str) -> bool {
        self.channels.remove(channel).is_some()
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Fan `envelope` out to its channel. Returns false if nobody joined it.
    pub fn dispatch(&self, envelope: Envelope, from: SocketAddr) -> bool {
        let Some(tx) = self.channels.get(&envelope.event) else {
            return false;
        };
        // Subscribers may all have dropped their receivers; that is fine.
        let _ = tx.send(ChannelMessage { envelope, from });
        true
    }
}
