//! Cluster Membership Table
//!
//! Handles:
//! - Bootstrap of the local node entry
//! - Ring-successor selection of gossip partners
//! - Anti-entropy merge of peer snapshots
//! - Tabular status rendering

use crate::clock::Clock;
use crate::error::{Result, TnsError};
use crate::types::{format_timestamp, should_replace, ClusterNode, MergeReport, State};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Ordered table of the servers forming this naming cluster
#[derive(Clone)]
pub struct MembershipTable {
    local_id: u64,
    nodes: Arc<RwLock<BTreeMap<u64, ClusterNode>>>,
    clock: Arc<dyn Clock>,
}

impl MembershipTable {
    pub fn new(local_id: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            local_id,
            nodes: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
        }
    }

    pub fn local_id(&self) -> u64 {
        self.local_id
    }

    /// Inserts the local entry in `Joining` on first call; later calls return
    /// the existing entry untouched.
    pub async fn register_self(&self, host: &str, port: u16, version: &str) -> ClusterNode {
        let mut nodes = self.nodes.write().await;
        nodes
            .entry(self.local_id)
            .or_insert_with(|| {
                let me = ClusterNode::new(self.local_id, host, port, self.clock.now_millis())
                    .with_version(version);
                info!("Registered local cluster node {} at {}", me.id, me.addr());
                me
            })
            .clone()
    }

    pub async fn local(&self) -> Option<ClusterNode> {
        self.nodes.read().await.get(&self.local_id).cloned()
    }

    pub async fn get(&self, id: u64) -> Option<ClusterNode> {
        self.nodes.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Next gossip partner after the local id, wrapping to the lowest id.
    ///
    /// `Leaving`, `Tombstone` and `DOWN` candidates are skipped. A
    /// `Tombstone_1` candidate ends the search with no target.
    pub async fn ring_successor(&self) -> Option<ClusterNode> {
        let nodes = self.nodes.read().await;
        let mut key = self.local_id;

        // one full lap at most, in case the local entry was never registered
        for _ in 0..nodes.len() {
            let next = nodes
                .range((Excluded(key), Unbounded))
                .next()
                .or_else(|| nodes.iter().next())
                .map(|(id, node)| (*id, node))?;

            if next.0 == self.local_id {
                return None;
            }

            match next.1.state {
                State::Joining | State::Up | State::Down1 | State::Down2 => {
                    return Some(next.1.clone());
                }
                State::Leaving | State::Tombstone | State::Down => key = next.0,
                State::Tombstone1 => {
                    debug!("Ring search stopped at Tombstone_1 node {}", next.0);
                    return None;
                }
            }
        }
        None
    }

    /// Nodes currently in `UP`.
    pub async fn list_up(&self) -> Vec<ClusterNode> {
        let nodes = self.nodes.read().await;
        nodes
            .values()
            .filter(|node| node.state == State::Up)
            .cloned()
            .collect()
    }

    /// Every known node, tombstones included so that they keep propagating.
    pub async fn list_all(&self) -> Vec<ClusterNode> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Applies a peer snapshot under one exclusive acquisition.
    pub async fn merge(&self, incoming: Vec<ClusterNode>) -> MergeReport {
        let mut report = MergeReport::default();
        let mut nodes = self.nodes.write().await;

        for node in incoming {
            match nodes.get_mut(&node.id) {
                None => {
                    info!("Discovered cluster node {} ({}) in {}", node.id, node.addr(), node.state);
                    nodes.insert(node.id, node);
                    report.inserted += 1;
                }
                Some(local) if !should_replace(&*local, &node) => {
                    report.ignored += 1;
                }
                Some(local) if node.id == self.local_id && node.state.is_liveness() => {
                    // a peer holds a newer liveness opinion about us; outdate it
                    local.timestamp = self.clock.now_millis().max(node.timestamp.saturating_add(1));
                    debug!("Refuted {} for local node, restamped at {}", node.state, local.timestamp);
                    report.ignored += 1;
                }
                Some(local) => {
                    if local.state != node.state {
                        info!("Cluster node {} {} -> {}", node.id, local.state, node.state);
                    }
                    *local = node;
                    report.replaced += 1;
                }
            }
        }
        report
    }

    /// Single-record announcement from a peer that met us.
    pub async fn up(&self, node: ClusterNode) -> MergeReport {
        self.merge(vec![node]).await
    }

    /// Applies a liveness probe outcome. Returns the resulting state, or
    /// `None` when the node is unknown.
    pub async fn report_probe(&self, id: u64, reachable: bool) -> Option<State> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.get_mut(&id)?;
        let next = node.state.after_probe(reachable);
        if next != node.state {
            info!("Cluster node {} {} -> {}", id, node.state, next);
            node.state = next;
            node.timestamp = self.clock.now_millis();
        }
        Some(next)
    }

    /// Cluster departures only ever arrive through merge.
    pub fn request_tombstone(&self, id: u64) -> Result<()> {
        Err(TnsError::Unauthorized(format!(
            "tombstoning cluster node {} is not operator-triggered",
            id
        )))
    }

    pub async fn cluster_status(&self) -> String {
        let nodes = self.nodes.read().await;
        let mut out = String::with_capacity(500);
        out.push_str(&status_row("STATE", "HOST", "ID", "VERSION", "TIMESTAMP", "TIME"));
        out.push('\n');
        for node in nodes.values() {
            out.push_str(&status_row(
                node.state.as_str(),
                &node.host,
                &node.id.to_string(),
                &node.version,
                &node.timestamp.to_string(),
                &format_timestamp(node.timestamp),
            ));
        }
        out
    }
}

fn status_row(state: &str, host: &str, id: &str, version: &str, ts: &str, time: &str) -> String {
    format!(
        "    {:<20}{:<20}{:<20}{:<20}{:<20}{:<20}\n",
        state, host, id, version, ts, time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn node(id: u64, state: State, ts: u64) -> ClusterNode {
        ClusterNode::new(id, format!("10.0.0.{}", id), 8700, ts).with_state(state)
    }

    async fn ring_of_three(local: u64) -> MembershipTable {
        let table = MembershipTable::new(local, Arc::new(ManualClock::new(1_000)));
        table
            .merge(vec![
                node(1, State::Up, 1),
                node(2, State::Up, 1),
                node(3, State::Up, 1),
            ])
            .await;
        table
    }

    async fn set_state(table: &MembershipTable, id: u64, state: State) {
        table.nodes.write().await.get_mut(&id).unwrap().state = state;
    }

    #[tokio::test]
    async fn test_register_self_is_idempotent() {
        let clock = Arc::new(ManualClock::new(5_000));
        let table = MembershipTable::new(42, clock.clone());
        let first = table.register_self("127.0.0.1", 8700, "1.0").await;
        clock.advance_secs(10);
        let second = table.register_self("other", 1, "2.0").await;
        assert_eq!(first, second);
        assert_eq!(first.state, State::Joining);
        assert_eq!(first.timestamp, 5_000);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_ring_successor_next_and_wrap() {
        let table = ring_of_three(2).await;
        assert_eq!(table.ring_successor().await.map(|n| n.id), Some(3));

        set_state(&table, 3, State::Leaving).await;
        assert_eq!(table.ring_successor().await.map(|n| n.id), Some(1));

        let table = ring_of_three(3).await;
        assert_eq!(table.ring_successor().await.map(|n| n.id), Some(1));
    }

    #[tokio::test]
    async fn test_ring_successor_skips_down_and_departed() {
        let table = ring_of_three(2).await;
        set_state(&table, 3, State::Down).await;
        set_state(&table, 1, State::Tombstone).await;
        assert!(table.ring_successor().await.is_none());

        set_state(&table, 1, State::Down2).await;
        assert_eq!(table.ring_successor().await.map(|n| n.id), Some(1));
    }

    #[tokio::test]
    async fn test_ring_successor_alone_has_no_target() {
        let table = MembershipTable::new(9, Arc::new(ManualClock::new(0)));
        assert!(table.ring_successor().await.is_none());
        table.register_self("h", 1, "v").await;
        assert!(table.ring_successor().await.is_none());
    }

    // Tombstone_1 candidates stop the search instead of being skipped.
    #[tokio::test]
    async fn test_ring_successor_stops_at_tombstone_1() {
        let table = ring_of_three(2).await;
        set_state(&table, 3, State::Tombstone1).await;
        assert!(table.ring_successor().await.is_none());
    }

    #[tokio::test]
    async fn test_merge_lww_and_departure_dominance() {
        let table = MembershipTable::new(1, Arc::new(ManualClock::new(0)));
        table.merge(vec![node(5, State::Up, 100)]).await;

        let report = table.merge(vec![node(5, State::Down1, 99)]).await;
        assert_eq!(report.ignored, 1);
        assert_eq!(table.get(5).await.unwrap().state, State::Up);

        table.merge(vec![node(5, State::Down1, 101)]).await;
        assert_eq!(table.get(5).await.unwrap().state, State::Down1);

        table.merge(vec![node(5, State::Leaving, 1)]).await;
        let merged = table.get(5).await.unwrap();
        assert_eq!(merged.state, State::Leaving);
        assert_eq!(merged.timestamp, 1);
    }

    #[tokio::test]
    async fn test_merge_never_revives_tombstones() {
        let table = MembershipTable::new(1, Arc::new(ManualClock::new(0)));
        table.merge(vec![node(5, State::Tombstone1, 10)]).await;
        for state in [State::Up, State::Joining, State::Leaving, State::Tombstone] {
            table.merge(vec![node(5, state, u64::MAX)]).await;
        }
        assert_eq!(table.get(5).await.unwrap().state, State::Tombstone1);
    }

    #[tokio::test]
    async fn test_merge_refutes_stale_opinion_about_self() {
        let clock = Arc::new(ManualClock::new(1_000));
        let table = MembershipTable::new(1, clock.clone());
        table.register_self("h", 1, "v").await;
        table.report_probe(1, true).await;

        table.merge(vec![node(1, State::Down1, 5_000)]).await;
        let me = table.local().await.unwrap();
        assert_eq!(me.state, State::Up);
        assert!(me.timestamp > 5_000);
    }

    #[tokio::test]
    async fn test_list_all_keeps_tombstones() {
        let table = MembershipTable::new(1, Arc::new(ManualClock::new(0)));
        table
            .merge(vec![node(2, State::Up, 1), node(3, State::Tombstone, 1)])
            .await;
        assert_eq!(table.list_all().await.len(), 2);
        let up: Vec<u64> = table.list_up().await.iter().map(|n| n.id).collect();
        assert_eq!(up, vec![2]);
    }

    #[tokio::test]
    async fn test_request_tombstone_is_rejected() {
        let table = MembershipTable::new(1, Arc::new(ManualClock::new(0)));
        table.merge(vec![node(2, State::Down, 1)]).await;
        assert!(matches!(table.request_tombstone(2), Err(TnsError::Unauthorized(_))));
        assert_eq!(table.get(2).await.unwrap().state, State::Down);
    }

    #[tokio::test]
    async fn test_cluster_status_lists_every_node() {
        let table = ring_of_three(1).await;
        let status = table.cluster_status().await;
        assert!(status.starts_with("    STATE"));
        assert_eq!(status.lines().filter(|l| l.contains("10.0.0.")).count(), 3);
    }
}
