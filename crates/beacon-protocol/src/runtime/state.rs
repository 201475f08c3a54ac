/// DiscoverState: pure protocol logic, no I/O.
///
/// Owns the local identity, the membership table and the election policy.
/// Each entry point takes `now` explicitly and returns the effects the
/// event loop must execute, which keeps every decision unit-testable.
use beacon_transport::Delivery;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{Timing, Weight};
use crate::election::{ElectionDecision, ElectionView, LeadershipElection};
use crate::membership::{MembershipTable, MergeOutcome};
use crate::types::{DiscoverEvent, LocalIdentity};

use super::effect::Effect;

pub(crate) struct DiscoverState {
    iid: String,
    timing: Timing,
    server: bool,
    me: LocalIdentity,
    weight: Weight,
    nodes: MembershipTable,
    policy: Box<dyn LeadershipElection>,
}

fn view<'a>(
    me: &'a LocalIdentity,
    nodes: &'a MembershipTable,
    timing: &Timing,
    now: Instant,
) -> ElectionView<'a> {
    ElectionView {
        me,
        nodes,
        masters_required: timing.masters_required,
        master_timeout: timing.master_timeout,
        now,
    }
}

impl DiscoverState {
    pub fn new(
        iid: String,
        timing: Timing,
        server: bool,
        me: LocalIdentity,
        weight: Weight,
        policy: Box<dyn LeadershipElection>,
    ) -> Self {
        Self {
            iid,
            timing,
            server,
            me,
            weight,
            nodes: MembershipTable::new(),
            policy,
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Whether this instance announces itself.
    pub fn is_server(&self) -> bool {
        self.server
    }

    pub fn me(&self) -> &LocalIdentity {
        &self.me
    }

    pub fn nodes(&self) -> &MembershipTable {
        &self.nodes
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Called once the transport is bound.
    pub fn start(&mut self, now: Instant) -> Vec<Effect> {
        self.policy
            .start(&view(&self.me, &self.nodes, &self.timing, now));
        if self.server {
            vec![self.hello()]
        } else {
            Vec::new()
        }
    }

    pub fn stop(&mut self) {
        self.policy.stop();
    }

    // ── Local identity ───────────────────────────────────────────────

    /// Build the next announcement, re-evaluating a dynamic weight.
    pub fn hello(&mut self) -> Effect {
        if let Weight::Dynamic(_) = self.weight {
            self.me.weight = self.weight.value();
        }
        match serde_json::to_value(&self.me) {
            Ok(payload) => Effect::SendHello(payload),
            Err(e) => Effect::Emit(DiscoverEvent::Error {
                description: format!("hello encoding failed: {e}"),
            }),
        }
    }

    pub fn promote(&mut self) -> Vec<Effect> {
        self.me.is_master_eligible = true;
        self.me.is_master = true;
        tracing::info!(iid = %self.iid, weight = self.me.weight, "promoted to master");
        vec![
            Effect::Emit(DiscoverEvent::Promotion {
                me: self.me.clone(),
            }),
            Effect::InvalidateHelloCache,
            self.hello(),
        ]
    }

    /// Give up mastership; `permanent` also drops eligibility.
    pub fn demote(&mut self, permanent: bool) -> Vec<Effect> {
        self.me.is_master_eligible = !permanent;
        self.me.is_master = false;
        tracing::info!(iid = %self.iid, permanent, "demoted");
        vec![
            Effect::Emit(DiscoverEvent::Demotion {
                me: self.me.clone(),
            }),
            Effect::InvalidateHelloCache,
            self.hello(),
        ]
    }

    /// Replace the advertisement carried by the next announcement.
    pub fn advertise(&mut self, advertisement: Option<Value>) -> Vec<Effect> {
        self.me.advertisement = advertisement;
        vec![Effect::InvalidateHelloCache]
    }

    fn apply(&mut self, decision: Option<ElectionDecision>, effects: &mut Vec<Effect>) {
        match decision {
            Some(ElectionDecision::Promote) => effects.extend(self.promote()),
            Some(ElectionDecision::Demote) => effects.extend(self.demote(false)),
            None => {}
        }
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Merge an accepted `hello` into the table.
    pub fn handle_hello(&mut self, delivery: &Delivery, now: Instant) -> Vec<Effect> {
        let envelope = &delivery.envelope;
        if envelope.iid == self.iid {
            return Vec::new();
        }

        // An unchanged hello from a known peer only proves liveness.
        if delivery.repeat && self.nodes.touch(&envelope.iid, now) {
            return Vec::new();
        }

        let Some(data) = &envelope.data else {
            tracing::trace!(iid = %envelope.iid, "hello without payload");
            return Vec::new();
        };
        let hello: LocalIdentity = match serde_json::from_value(data.clone()) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::trace!(iid = %envelope.iid, error = %e, "malformed hello payload");
                return Vec::new();
            }
        };

        let MergeOutcome {
            node,
            is_new,
            was_master,
        } = self
            .nodes
            .merge(&envelope.iid, delivery.from, &envelope.host_name, &hello, now);

        let mut effects = Vec::new();

        if is_new {
            tracing::debug!(iid = %node.id, address = %node.address, "node added");
            effects.push(Effect::Emit(DiscoverEvent::Added { node: node.clone() }));
            let decision = self
                .policy
                .on_node_added(&view(&self.me, &self.nodes, &self.timing, now), &node);
            self.apply(decision, &mut effects);
        }

        effects.push(Effect::Emit(DiscoverEvent::HelloReceived {
            node: node.clone(),
            is_new,
            was_master,
        }));
        let decision = self.policy.hello_received(
            &view(&self.me, &self.nodes, &self.timing, now),
            &node,
            is_new,
            was_master,
        );
        self.apply(decision, &mut effects);

        if node.is_master && (is_new || was_master == Some(false)) {
            tracing::debug!(iid = %node.id, weight = node.weight, "master recognized");
            effects.push(Effect::Emit(DiscoverEvent::Master { node: node.clone() }));
            let decision = self
                .policy
                .on_master_added(&view(&self.me, &self.nodes, &self.timing, now), &node);
            self.apply(decision, &mut effects);
        }

        effects
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Evict silent peers, then run the periodic election check.
    pub fn tick_check(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        let removed = self
            .nodes
            .sweep(now, self.timing.node_timeout, self.timing.master_timeout);
        for node in removed {
            tracing::debug!(iid = %node.id, was_master = node.is_master, "node removed");
            let decision = self
                .policy
                .on_node_removed(&view(&self.me, &self.nodes, &self.timing, now), &node);
            effects.push(Effect::Emit(DiscoverEvent::Removed { node }));
            self.apply(decision, &mut effects);
        }

        effects.push(Effect::Emit(DiscoverEvent::Check));
        let decision = self
            .policy
            .check(&view(&self.me, &self.nodes, &self.timing, now));
        self.apply(decision, &mut effects);

        effects
    }
}
