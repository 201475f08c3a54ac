/// Leadership election policies.
///
/// A policy observes membership lifecycle hooks and answers with an
/// optional decision; the runtime applies it immediately, so the next hook
/// already sees the updated local identity.
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::membership::MembershipTable;
use crate::types::{LocalIdentity, PeerNode};

/// Read-only snapshot handed to every hook.
#[derive(Debug, Clone, Copy)]
pub struct ElectionView<'a> {
    pub me: &'a LocalIdentity,
    pub nodes: &'a MembershipTable,
    pub masters_required: usize,
    pub master_timeout: Duration,
    pub now: Instant,
}

/// What a policy asks the local instance to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionDecision {
    Promote,
    /// Non-permanent demotion; eligibility is kept.
    Demote,
}

/// Pluggable election policy. Every hook defaults to a no-op.
pub trait LeadershipElection: Send + fmt::Debug {
    fn start(&mut self, _view: &ElectionView<'_>) {}

    fn stop(&mut self) {}

    fn on_node_added(&mut self, _view: &ElectionView<'_>, _node: &PeerNode) -> Option<ElectionDecision> {
        None
    }

    fn on_node_removed(&mut self, _view: &ElectionView<'_>, _node: &PeerNode) -> Option<ElectionDecision> {
        None
    }

    fn hello_received(
        &mut self,
        _view: &ElectionView<'_>,
        _node: &PeerNode,
        _is_new: bool,
        _was_master: Option<bool>,
    ) -> Option<ElectionDecision> {
        None
    }

    fn on_master_added(&mut self, _view: &ElectionView<'_>, _node: &PeerNode) -> Option<ElectionDecision> {
        None
    }

    /// Periodic re-evaluation after every sweep.
    fn check(&mut self, _view: &ElectionView<'_>) -> Option<ElectionDecision> {
        None
    }
}

// ── NoLeadershipElection ─────────────────────────────────────────────

/// Never promotes or demotes; mastership is managed by the application.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLeadershipElection;

impl LeadershipElection for NoLeadershipElection {}

// ── BasicLeadershipElection ──────────────────────────────────────────

/// Weighted election.
///
/// Runs the same evaluation on every sweep, every accepted `hello` and
/// every node removal:
/// - demote when at least `masters_required` live masters outweigh me;
/// - promote when fewer than `masters_required` live masters exist, I am
///   eligible, and no heavier eligible non-master peer is known.
///
/// Weight comparisons are strict, so equal weights never take over.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicLeadershipElection;

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    masters_found: usize,
    higher_weight_masters: usize,
    higher_weight_found: bool,
}

impl BasicLeadershipElection {
    fn tally(view: &ElectionView<'_>) -> Tally {
        let mut tally = Tally::default();
        let my_weight = view.me.weight;

        for node in view.nodes.iter() {
            let live = view.now.saturating_duration_since(node.last_seen) <= view.master_timeout;
            if node.is_master && live {
                tally.masters_found += 1;
                if node.weight > my_weight {
                    tally.higher_weight_masters += 1;
                }
            }
            // No liveness filter here; sweeping is left to the table.
            if node.weight > my_weight && node.is_master_eligible && !node.is_master {
                tally.higher_weight_found = true;
            }
        }
        tally
    }

    pub fn evaluate(view: &ElectionView<'_>) -> Option<ElectionDecision> {
        let tally = Self::tally(view);
        let me = view.me;

        if me.is_master && tally.higher_weight_masters >= view.masters_required {
            tracing::debug!(
                higher = tally.higher_weight_masters,
                required = view.masters_required,
                "outweighed by live masters, demoting"
            );
            return Some(ElectionDecision::Demote);
        }

        if !me.is_master
            && tally.masters_found < view.masters_required
            && me.is_master_eligible
            && !tally.higher_weight_found
        {
            tracing::debug!(
                found = tally.masters_found,
                required = view.masters_required,
                "too few masters, promoting"
            );
            return Some(ElectionDecision::Promote);
        }

        None
    }
}

impl LeadershipElection for BasicLeadershipElection {
    fn on_node_removed(&mut self, view: &ElectionView<'_>, _node: &PeerNode) -> Option<ElectionDecision> {
        Self::evaluate(view)
    }

    fn hello_received(
        &mut self,
        view: &ElectionView<'_>,
        _node: &PeerNode,
        _is_new: bool,
        _was_master: Option<bool>,
    ) -> Option<ElectionDecision> {
        Self::evaluate(view)
    }

    fn check(&mut self, view: &ElectionView<'_>) -> Option<ElectionDecision> {
        Self::evaluate(view)
    }
}
