/// The discover event loop.
///
/// A single async task that owns all mutable instance state and
/// multiplexes over application commands, received envelopes and the
/// hello and check timers.
use std::time::Duration;

use beacon_transport::{Delivery, Transport, TransportConfig, TransportError, HELLO_EVENT};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::channel::{ensure_unreserved, ChannelRegistry};
use crate::error::DiscoverError;
use crate::types::DiscoverEvent;

use super::effect::Effect;
use super::state::DiscoverState;
use super::{Command, StartOutcome};

/// Pause after a receive error before polling the medium again.
const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

pub(super) struct Actor {
    state: DiscoverState,
    transport_config: TransportConfig,
    transport: Option<Transport>,
    hello_timer: Option<Interval>,
    check_timer: Option<Interval>,
    channels: ChannelRegistry,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<DiscoverEvent>,
}

impl Actor {
    pub(super) fn new(
        state: DiscoverState,
        transport_config: TransportConfig,
        commands: mpsc::Receiver<Command>,
        events: broadcast::Sender<DiscoverEvent>,
    ) -> Self {
        Self {
            state,
            transport_config,
            transport: None,
            hello_timer: None,
            check_timer: None,
            channels: ChannelRegistry::new(),
            commands,
            events,
        }
    }

    /// Run until every handle is dropped.
    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                // ── 1. Commands from the application ────────────────
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }

                // ── 2. Incoming envelopes ───────────────────────────
                result = recv_next(&mut self.transport) => {
                    self.handle_receive(result).await;
                }

                // ── 3. Hello timer ──────────────────────────────────
                _ = tick_next(&mut self.hello_timer) => {
                    let effect = self.state.hello();
                    self.execute(vec![effect]).await;
                }

                // ── 4. Check timer ──────────────────────────────────
                _ = tick_next(&mut self.check_timer) => {
                    let effects = self.state.tick_check(Instant::now());
                    self.execute(effects).await;
                }
            }
        }

        self.stop();
        tracing::debug!("discover loop exited");
    }

    // ── Commands ─────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { reply } => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Promote { reply } => {
                let effects = self.state.promote();
                self.execute(effects).await;
                let _ = reply.send(());
            }
            Command::Demote { permanent, reply } => {
                let effects = self.state.demote(permanent);
                self.execute(effects).await;
                let _ = reply.send(());
            }
            Command::Advertise {
                advertisement,
                reply,
            } => {
                let effects = self.state.advertise(advertisement);
                self.execute(effects).await;
                let _ = reply.send(());
            }
            Command::Send {
                channel,
                data,
                reply,
            } => {
                let result = self.send(&channel, data).await;
                let _ = reply.send(result);
            }
            Command::Join { channel, reply } => {
                let _ = reply.send(self.channels.join(&channel));
            }
            Command::Leave { channel, reply } => {
                let _ = reply.send(self.channels.leave(&channel));
            }
            Command::Nodes { reply } => {
                let _ = reply.send(self.state.nodes().snapshot());
            }
            Command::Me { reply } => {
                let _ = reply.send(self.state.me().clone());
            }
            Command::IsRunning { reply } => {
                let _ = reply.send(self.transport.is_some());
            }
        }
    }

    async fn start(&mut self) -> Result<StartOutcome, DiscoverError> {
        if self.transport.is_some() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let transport = match Transport::bind(self.transport_config.clone()).await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(error = %e, "start failed");
                return Err(e.into());
            }
        };
        self.transport = Some(transport);

        let timing = *self.state.timing();
        self.check_timer = Some(timer(timing.check_interval));
        if self.state.is_server() {
            self.hello_timer = Some(timer(timing.hello_interval));
        }

        let effects = self.state.start(Instant::now());
        self.execute(effects).await;

        tracing::info!(
            hello_ms = timing.hello_interval.as_millis() as u64,
            check_ms = timing.check_interval.as_millis() as u64,
            announcing = self.state.is_server(),
            "discover started"
        );
        self.emit(DiscoverEvent::Started);
        Ok(StartOutcome::Started)
    }

    fn stop(&mut self) -> bool {
        let Some(transport) = self.transport.take() else {
            return false;
        };
        self.hello_timer = None;
        self.check_timer = None;
        transport.stop();
        self.state.stop();

        tracing::info!("discover stopped");
        self.emit(DiscoverEvent::Stopped);
        true
    }

    async fn send(&mut self, channel: &str, data: Option<Value>) -> Result<(), DiscoverError> {
        ensure_unreserved(channel)?;
        let transport = self.transport.as_mut().ok_or(DiscoverError::NotRunning)?;

        if let Err(e) = transport.send(channel, data).await {
            tracing::warn!(channel, error = %e, "channel send failed");
            self.emit(DiscoverEvent::Error {
                description: format!("send on '{channel}' failed: {e}"),
            });
            return Err(e.into());
        }
        Ok(())
    }

    // ── Inbound ──────────────────────────────────────────────────────

    async fn handle_receive(&mut self, result: Result<Delivery, TransportError>) {
        match result {
            Ok(delivery) if delivery.envelope.is_hello() => {
                let effects = self.state.handle_hello(&delivery, Instant::now());
                self.execute(effects).await;
            }
            Ok(delivery) => {
                if !self.channels.dispatch(delivery.envelope, delivery.from) {
                    tracing::trace!("envelope for unjoined channel dropped");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "receive failed");
                self.emit(DiscoverEvent::Error {
                    description: e.to_string(),
                });
                tokio::time::sleep(RECEIVE_BACKOFF).await;
            }
        }
    }

    // ── Effects ──────────────────────────────────────────────────────

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(event) => self.emit(event),
                Effect::InvalidateHelloCache => {
                    if let Some(transport) = self.transport.as_mut() {
                        transport.invalidate_hello_cache();
                    }
                }
                Effect::SendHello(payload) => self.send_hello(payload).await,
            }
        }
    }

    async fn send_hello(&mut self, payload: Value) {
        let Some(transport) = self.transport.as_mut() else {
            tracing::trace!("not running, hello skipped");
            return;
        };

        match transport.send(HELLO_EVENT, Some(payload)).await {
            Ok(()) => self.emit(DiscoverEvent::HelloEmitted),
            Err(e) => {
                tracing::warn!(error = %e, "hello send failed");
                self.emit(DiscoverEvent::Error {
                    description: format!("hello send failed: {e}"),
                });
            }
        }
    }

    fn emit(&self, event: DiscoverEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// Periodic timer whose first tick is one full period away.
fn timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn recv_next(transport: &mut Option<Transport>) -> Result<Delivery, TransportError> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_next(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}
