/// Redis publish/subscribe medium.
///
/// Every attached instance publishes its frames on one channel and is
/// subscribed to that same channel, so instances on different hosts share
/// a segment through one Redis server. Like the relay hub, an instance
/// hears its own frames.
///
/// Frames carry no sender address. Each received frame is reported as
/// coming from this instance's configured bind address.
use std::io;
use std::net::SocketAddr;

use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::medium::Medium;
use crate::TransportError;

/// Channel used when none is configured.
pub(crate) const DEFAULT_REDIS_CHANNEL: &str = "beacon";

/// A medium publishing and subscribing on one Redis channel.
pub struct RedisMedium {
    publisher: MultiplexedConnection,
    messages: Mutex<BoxStream<'static, redis::Msg>>,
    channel: String,
    reported: SocketAddr,
}

impl std::fmt::Debug for RedisMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMedium")
            .field("channel", &self.channel)
            .field("reported", &self.reported)
            .finish()
    }
}

impl RedisMedium {
    /// Open a publishing connection and a subscription on `channel`.
    ///
    /// An unparsable URL is a configuration error; an unreachable server
    /// is a bind error.
    pub async fn connect(
        url: &str,
        channel: &str,
        reported: SocketAddr,
    ) -> Result<Self, TransportError> {
        let client = redis::Client::open(url)
            .map_err(|e| TransportError::Config(format!("invalid redis url: {e}")))?;

        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connect_error)?;
        let mut subscriber = client.get_async_pubsub().await.map_err(connect_error)?;
        subscriber.subscribe(channel).await.map_err(connect_error)?;

        tracing::debug!(channel, "redis medium subscribed");

        Ok(Self {
            publisher,
            messages: Mutex::new(subscriber.into_on_message().boxed()),
            channel: channel.to_string(),
            reported,
        })
    }
}

fn connect_error(e: redis::RedisError) -> TransportError {
    TransportError::Bind(io::Error::other(e))
}

#[async_trait::async_trait]
impl Medium for RedisMedium {
    async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut conn = self.publisher.clone();
        let _receivers: i64 = conn
            .publish(&self.channel, data)
            .await
            .map_err(io::Error::other)?;
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        match self.messages.get_mut().next().await {
            Some(msg) => Ok((msg.get_payload_bytes().to_vec(), self.reported)),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "redis subscription closed",
            )),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported() -> SocketAddr {
        "0.0.0.0:12345".parse().unwrap()
    }

    #[tokio::test]
    async fn invalid_url_is_a_config_error() {
        let err = RedisMedium::connect("not a url", DEFAULT_REDIS_CHANNEL, reported())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_bind_error() {
        let err = RedisMedium::connect("redis://127.0.0.1:1/", DEFAULT_REDIS_CHANNEL, reported())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Bind(_)));
    }
}
