//! Gossip Scheduling
//!
//! Handles:
//! - Periodic push/pull exchange with the ring successor
//! - Periodic tombstone sweep of the service registry
//! - `meet` handshakes with seed peers

use crate::cluster::MembershipTable;
use crate::config::{GossipConfig, RegistryConfig};
use crate::error::{Result, TnsError};
use crate::protocol::{Request, Response};
use crate::registry::ServiceRegistry;
use crate::transport::RpcClient;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives anti-entropy rounds for one node
#[derive(Clone)]
pub struct GossipService {
    table: MembershipTable,
    registry: ServiceRegistry,
    client: RpcClient,
    gossip: GossipConfig,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl GossipService {
    pub fn new(
        table: MembershipTable,
        registry: ServiceRegistry,
        gossip: GossipConfig,
        registry_config: &RegistryConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let client = RpcClient::new(table.local_id(), gossip.connect_timeout(), gossip.io_timeout());
        Self {
            table,
            registry,
            client,
            gossip,
            sweep_interval: registry_config.sweep_interval(),
            shutdown,
        }
    }

    /// Spawns the gossip and sweep loops.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![self.start_gossip_loop(), self.start_sweep_loop()]
    }

    fn start_gossip_loop(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = self.gossip.interval();
        tokio::spawn(async move {
            // spread first rounds so nodes started together do not gossip in lockstep
            let jitter = rand::rng().random_range(0..=period.as_millis() as u64);
            tokio::select! {
                _ = service.shutdown.cancelled() => return,
                _ = time::sleep(Duration::from_millis(jitter)) => {}
            }

            let mut interval = time::interval(period);
            loop {
                tokio::select! {
                    _ = service.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        match service.gossip_round().await {
                            Ok(Some(peer)) => debug!("Gossip round with node {} complete", peer),
                            Ok(None) => debug!("No gossip target available"),
                            Err(e) => warn!("Gossip round failed: {}", e),
                        }
                    }
                }
            }
            debug!("Gossip loop stopped");
        })
    }

    fn start_sweep_loop(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let shutdown = self.shutdown.clone();
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let report = registry.sweep().await;
                        if report.to_tombstone_1 + report.to_tombstone + report.removed > 0 {
                            info!(
                                "Sweep advanced {} to Tombstone_1, {} to Tombstone, removed {}",
                                report.to_tombstone_1, report.to_tombstone, report.removed
                            );
                        }
                    }
                }
            }
            debug!("Sweep loop stopped");
        })
    }

    /// One push/pull exchange with the ring successor. Returns the peer id,
    /// or `None` when no live peer exists. The peer's reachability is fed back
    /// into the membership table.
    pub async fn gossip_round(&self) -> Result<Option<u64>> {
        let Some(target) = self.table.ring_successor().await else {
            return Ok(None);
        };
        let addr = target.addr();

        match self.exchange(&addr).await {
            Ok(()) => {
                self.table.report_probe(target.id, true).await;
                Ok(Some(target.id))
            }
            Err(e) => {
                self.table.report_probe(target.id, false).await;
                Err(e)
            }
        }
    }

    async fn exchange(&self, addr: &str) -> Result<()> {
        let cluster = self.table.list_all().await;
        match self.client.call(addr, Request::PushClusterList(cluster)).await? {
            Response::ClusterList(theirs) => {
                let report = self.table.merge(theirs).await;
                debug!("Merged cluster list from {}: {:?}", addr, report);
            }
            other => return Err(unexpected(addr, &other)),
        }

        let services = self.registry.list_all_for_propagation().await;
        match self.client.call(addr, Request::PushServiceList(services)).await? {
            Response::ServiceList(theirs) => {
                let report = self.registry.merge(theirs).await;
                debug!("Merged service list from {}: {:?}", addr, report);
            }
            other => return Err(unexpected(addr, &other)),
        }
        Ok(())
    }

    /// Announces the local node to `addr` and merges the peer's view in reply.
    pub async fn meet(&self, addr: &str) -> Result<()> {
        let me = self
            .table
            .local()
            .await
            .ok_or_else(|| TnsError::system("local node is not registered"))?;

        match self.client.call(addr, Request::Up(me)).await? {
            Response::ClusterList(theirs) => {
                self.table.merge(theirs).await;
                info!("Met cluster peer at {}", addr);
                Ok(())
            }
            other => Err(unexpected(addr, &other)),
        }
    }

    /// Meets every configured seed, logging failures.
    pub async fn meet_seeds(&self) {
        for seed in &self.gossip.seeds {
            if let Err(e) = self.meet(seed).await {
                warn!("Failed to meet seed {}: {}", seed, e);
            }
        }
    }
}

fn unexpected(addr: &str, response: &Response) -> TnsError {
    TnsError::protocol(format!("unexpected response from {}: {:?}", addr, response))
}
