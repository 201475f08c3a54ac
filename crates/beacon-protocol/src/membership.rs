/// MembershipTable: the local view of live peers.
///
/// Pure state: one entry per instance id, merged from accepted
/// announcements and swept by timeout. Callers pass `now` explicitly.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::{LocalIdentity, PeerNode};

/// Result of merging one announcement.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The entry after the merge.
    pub node: PeerNode,
    pub is_new: bool,
    /// Master flag before the merge; `None` for a new entry.
    pub was_master: Option<bool>,
}

#[derive(Debug, Default)]
pub struct MembershipTable {
    nodes: HashMap<String, PeerNode>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the entry for `iid` from a `hello`.
    ///
    /// `last_seen` only moves forward.
    pub fn merge(
        &mut self,
        iid: &str,
        from: SocketAddr,
        host_name: &str,
        hello: &LocalIdentity,
        now: Instant,
    ) -> MergeOutcome {
        match self.nodes.get_mut(iid) {
            Some(node) => {
                let was_master = node.is_master;
                node.address = from.ip();
                node.port = from.port();
                node.host_name = host_name.to_string();
                node.weight = hello.weight;
                node.is_master = hello.is_master;
                node.is_master_eligible = hello.is_master_eligible;
                node.advertisement = hello.advertisement.clone();
                node.last_seen = node.last_seen.max(now);
                MergeOutcome {
                    node: node.clone(),
                    is_new: false,
                    was_master: Some(was_master),
                }
            }
            None => {
                let node = PeerNode {
                    id: iid.to_string(),
                    address: from.ip(),
                    port: from.port(),
                    host_name: host_name.to_string(),
                    weight: hello.weight,
                    is_master: hello.is_master,
                    is_master_eligible: hello.is_master_eligible,
                    last_seen: now,
                    advertisement: hello.advertisement.clone(),
                };
                self.nodes.insert(iid.to_string(), node.clone());
                MergeOutcome {
                    node,
                    is_new: true,
                    was_master: None,
                }
            }
        }
    }

    /// Refresh liveness of a known entry. Returns false if unknown.
    pub fn touch(&mut self, iid: &str, now: Instant) -> bool {
        match self.nodes.get_mut(iid) {
            Some(node) => {
                node.last_seen = node.last_seen.max(now);
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose silence exceeds its budget.
    ///
    /// Budget is `master_timeout` for entries flagged master, else
    /// `node_timeout`. Removed entries are returned ordered by id.
    pub fn sweep(
        &mut self,
        now: Instant,
        node_timeout: Duration,
        master_timeout: Duration,
    ) -> Vec<PeerNode> {
        let expired: Vec<String> = self
            .nodes
            .values()
            .filter(|node| {
                let budget = if node.is_master {
                    master_timeout
                } else {
                    node_timeout
                };
                now.saturating_duration_since(node.last_seen) > budget
            })
            .map(|node| node.id.clone())
            .collect();

        let mut removed: Vec<PeerNode> = expired
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        removed
    }

    pub fn get(&self, iid: &str) -> Option<&PeerNode> {
        self.nodes.get(iid)
    }

    pub fn contains(&self, iid: &str) -> bool {
        self.nodes.contains_key(iid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerNode> {
        self.nodes.values()
    }

    /// Copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<PeerNode> {
        let mut nodes: Vec<PeerNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
