/// Discover runtime: one actor task per instance.
///
/// The actor owns the transport, the protocol state, both timers and the
/// channel registry. The application drives it through a cloneable
/// [`Discover`] handle and observes it through a broadcast event stream.
mod effect;
mod r#loop;
mod state;

use std::sync::Arc;

use beacon_transport::new_instance_id;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::channel::{ensure_unreserved, ChannelMessage};
use crate::config::DiscoverConfig;
use crate::error::DiscoverError;
use crate::types::{DiscoverEvent, LocalIdentity, PeerNode};

use self::r#loop::Actor;
use self::state::DiscoverState;

/// Pending commands per instance.
const COMMAND_BUFFER: usize = 64;

// ── Commands (app → actor) ───────────────────────────────────────────

pub(crate) enum Command {
    Start {
        reply: oneshot::Sender<Result<StartOutcome, DiscoverError>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    Promote {
        reply: oneshot::Sender<()>,
    },
    Demote {
        permanent: bool,
        reply: oneshot::Sender<()>,
    },
    Advertise {
        advertisement: Option<Value>,
        reply: oneshot::Sender<()>,
    },
    Send {
        channel: String,
        data: Option<Value>,
        reply: oneshot::Sender<Result<(), DiscoverError>>,
    },
    Join {
        channel: String,
        reply: oneshot::Sender<Result<broadcast::Receiver<ChannelMessage>, DiscoverError>>,
    },
    Leave {
        channel: String,
        reply: oneshot::Sender<bool>,
    },
    Nodes {
        reply: oneshot::Sender<Vec<PeerNode>>,
    },
    Me {
        reply: oneshot::Sender<LocalIdentity>,
    },
    IsRunning {
        reply: oneshot::Sender<bool>,
    },
}

/// Result of a successful [`Discover::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

// ── Discover ─────────────────────────────────────────────────────────

/// Handle to a discover instance.
///
/// Cheap to clone; the instance keeps running until it is dropped by every
/// handle.
#[derive(Clone)]
pub struct Discover {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<DiscoverEvent>,
    iid: Arc<str>,
}

impl std::fmt::Debug for Discover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discover").field("iid", &self.iid).finish()
    }
}

impl Discover {
    /// Validate `config` and spawn a stopped instance.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: DiscoverConfig) -> Result<Self, DiscoverError> {
        let resolved = config.resolve()?;

        let iid = resolved
            .transport
            .instance_id_override()
            .map(str::to_string)
            .unwrap_or_else(new_instance_id);
        let transport = resolved.transport.instance_id(iid.clone());

        let state = DiscoverState::new(
            iid.clone(),
            resolved.timing,
            resolved.server,
            resolved.me,
            resolved.weight,
            resolved.policy,
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(resolved.event_capacity);

        let actor = Actor::new(state, transport, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Ok(Self {
            cmd_tx,
            event_tx,
            iid: iid.into(),
        })
    }

    /// Like [`new`](Self::new), then start unless `auto_start` is off.
    pub async fn launch(config: DiscoverConfig) -> Result<Self, DiscoverError> {
        let auto_start = config.auto_start;
        let discover = Self::new(config)?;
        if auto_start {
            discover.start().await?;
        }
        Ok(discover)
    }

    pub fn instance_id(&self) -> &str {
        &self.iid
    }

    /// Subscribe to lifecycle events from now on.
    pub fn events(&self) -> broadcast::Receiver<DiscoverEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DiscoverError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| DiscoverError::Shutdown)?;
        rx.await.map_err(|_| DiscoverError::Shutdown)
    }

    /// Bind the transport and arm the timers.
    pub async fn start(&self) -> Result<StartOutcome, DiscoverError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Disarm timers and release the transport. Returns false if the
    /// instance was not running.
    pub async fn stop(&self) -> bool {
        self.request(|reply| Command::Stop { reply })
            .await
            .unwrap_or(false)
    }

    /// Become master and re-announce immediately.
    pub async fn promote(&self) -> Result<(), DiscoverError> {
        self.request(|reply| Command::Promote { reply }).await
    }

    /// Give up mastership and re-announce immediately; `permanent` also
    /// gives up eligibility.
    pub async fn demote(&self, permanent: bool) -> Result<(), DiscoverError> {
        self.request(|reply| Command::Demote { permanent, reply })
            .await
    }

    /// Replace the advertisement carried by future announcements.
    pub async fn advertise(&self, advertisement: Option<Value>) -> Result<(), DiscoverError> {
        self.request(|reply| Command::Advertise {
            advertisement,
            reply,
        })
        .await
    }

    /// Publish on a named channel, with or without a payload.
    pub async fn send(&self, channel: &str, data: Option<Value>) -> Result<(), DiscoverError> {
        ensure_unreserved(channel)?;
        self.request(|reply| Command::Send {
            channel: channel.to_string(),
            data,
            reply,
        })
        .await?
    }

    /// Subscribe to a named channel.
    pub async fn join(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<ChannelMessage>, DiscoverError> {
        self.request(|reply| Command::Join {
            channel: channel.to_string(),
            reply,
        })
        .await?
    }

    /// Unsubscribe from a named channel.
    pub async fn leave(&self, channel: &str) -> bool {
        self.request(|reply| Command::Leave {
            channel: channel.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Snapshot of the membership table, ordered by instance id.
    pub async fn nodes(&self) -> Vec<PeerNode> {
        self.request(|reply| Command::Nodes { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn each_node(&self, mut f: impl FnMut(&PeerNode)) {
        for node in self.nodes().await {
            f(&node);
        }
    }

    /// Current local identity.
    pub async fn me(&self) -> Result<LocalIdentity, DiscoverError> {
        self.request(|reply| Command::Me { reply }).await
    }

    pub async fn is_running(&self) -> bool {
        self.request(|reply| Command::IsRunning { reply })
            .await
            .unwrap_or(false)
    }
}
