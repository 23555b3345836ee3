//! Naming Node
//!
//! Wires the membership table, service registry, health checker, gossip
//! scheduler and RPC server of one node together.

use crate::clock::Clock;
use crate::cluster::MembershipTable;
use crate::config::Config;
use crate::error::{Result, TnsError};
use crate::gossip::GossipService;
use crate::health::{HealthMonitor, Prober};
use crate::management::ManagementSurface;
use crate::protocol::{Request, Response};
use crate::registry::ServiceRegistry;
use crate::transport::RpcServer;
use crate::types::ServiceKey;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct NamingNode {
    config: Config,
    table: MembershipTable,
    registry: ServiceRegistry,
    gossip: GossipService,
    prober: Arc<dyn Prober>,
    probe_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServiceKey>>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shutdown: CancellationToken,
}

impl NamingNode {
    pub fn new(config: Config, clock: Arc<dyn Clock>, prober: Arc<dyn Prober>) -> Self {
        let shutdown = CancellationToken::new();
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();

        let table = MembershipTable::new(config.node.id, clock.clone());
        let registry = ServiceRegistry::new(config.registry.clone(), clock).with_probe_queue(probe_tx);
        let gossip = GossipService::new(
            table.clone(),
            registry.clone(),
            config.gossip.clone(),
            &config.registry,
            shutdown.clone(),
        );

        Self {
            config,
            table,
            registry,
            gossip,
            prober,
            probe_rx: Arc::new(Mutex::new(Some(probe_rx))),
            tasks: Arc::new(Mutex::new(Vec::new())),
            shutdown,
        }
    }

    pub fn id(&self) -> u64 {
        self.table.local_id()
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn gossip(&self) -> &GossipService {
        &self.gossip
    }

    pub fn management(&self) -> ManagementSurface {
        ManagementSurface::new(
            self.table.clone(),
            self.registry.clone(),
            self.gossip.clone(),
            self.config.node.port,
        )
    }

    /// Binds the RPC endpoint and starts every background task. Returns the
    /// bound address; the node registers itself under that port.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut pending_rx = self.probe_rx.lock().await;
        if pending_rx.is_none() {
            return Err(TnsError::system("node already started"));
        }
        // a failed bind leaves the node startable
        let server = RpcServer::bind(&self.config.bind_addr()).await?;
        let probe_rx = pending_rx
            .take()
            .ok_or_else(|| TnsError::system("node already started"))?;
        drop(pending_rx);
        let addr = server.local_addr();
        let me = self
            .table
            .register_self(&self.config.node.host, addr.port(), &self.config.node.version)
            .await;
        info!("Node {} starting on {}", me.id, addr);

        let mut tasks = self.tasks.lock().await;

        let node = self.clone();
        let handler = move |request: Request| {
            let node = node.clone();
            async move { node.handle(request).await }
        };
        let shutdown = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(handler, shutdown).await {
                error!("RPC server failed: {}", e);
            }
        }));

        // the endpoint is reachable from here on
        self.table.report_probe(me.id, true).await;

        let monitor = HealthMonitor::new(self.registry.clone(), self.prober.clone(), self.shutdown.clone());
        tasks.push(monitor.start(probe_rx));
        tasks.extend(self.gossip.start());
        drop(tasks);

        self.gossip.meet_seeds().await;
        Ok(addr)
    }

    /// Answers one inbound request.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Up(node) => {
                debug!("Up from node {}", node.id);
                self.table.up(node).await;
                Response::ClusterList(self.table.list_all().await)
            }
            Request::PushClusterList(nodes) => {
                self.table.merge(nodes).await;
                Response::ClusterList(self.table.list_all().await)
            }
            Request::PushServiceList(instances) => {
                self.registry.merge(instances).await;
                Response::ServiceList(self.registry.list_all_for_propagation().await)
            }
            Request::ListUp { service_name } => Response::ServiceList(self.registry.list_up(&service_name).await),
            Request::Manage(command) => Response::Text(self.management().execute(command).await),
        }
    }

    /// Cancels every background task and waits for them to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Task failed during shutdown: {}", e);
            }
        }
        info!("Node {} stopped", self.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::ManageCommand;
    use crate::types::State;
    use futures::future::BoxFuture;

    struct AlwaysUp;

    impl Prober for AlwaysUp {
        fn probe<'a>(&'a self, _host: &'a str, _port: u16) -> BoxFuture<'a, bool> {
            Box::pin(async { true })
        }
    }

    fn test_config(id: u64) -> Config {
        let mut config = Config::default();
        config.node.id = id;
        config.node.port = 0;
        config
    }

    #[tokio::test]
    async fn test_start_registers_self_up() {
        let node = NamingNode::new(test_config(5), Arc::new(ManualClock::new(1_000)), Arc::new(AlwaysUp));
        let addr = tokio_test::assert_ok!(node.start().await);
        let me = node.table().local().await.unwrap();
        assert_eq!(me.port, addr.port());
        assert_eq!(me.state, State::Up);

        assert!(matches!(node.start().await, Err(TnsError::System(_))));
        node.stop().await;
    }

    #[tokio::test]
    async fn test_start_can_be_retried_after_bind_failure() {
        let busy = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config(6);
        config.node.port = busy.local_addr().unwrap().port();
        let node = NamingNode::new(config, Arc::new(ManualClock::new(1_000)), Arc::new(AlwaysUp));

        assert!(matches!(node.start().await, Err(TnsError::Io(_))));
        assert!(node.table().is_empty().await);

        drop(busy);
        let addr = tokio_test::assert_ok!(node.start().await);
        assert_eq!(node.table().local().await.unwrap().port, addr.port());
        node.stop().await;
    }

    #[tokio::test]
    async fn test_handle_dispatch() {
        let node = NamingNode::new(test_config(5), Arc::new(ManualClock::new(1_000)), Arc::new(AlwaysUp));

        let peer = crate::types::ClusterNode::new(9, "10.0.0.9", 8700, 500);
        match node.handle(Request::Up(peer)).await {
            Response::ClusterList(list) => assert!(list.iter().any(|n| n.id == 9)),
            other => panic!("unexpected {:?}", other),
        }

        let reply = node.handle(Request::Manage(ManageCommand::Tombstone { id: 9 })).await;
        assert_eq!(reply, Response::Text("UNALLOWED".to_string()));

        match node.handle(Request::ListUp { service_name: "none".to_string() }).await {
            Response::ServiceList(list) => assert!(list.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
