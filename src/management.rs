//! Management Surface
//!
//! Plain textual operations over the membership table and the service
//! registry. Every result is a string; anything other than `OK !` (or a
//! rendered record/table) is a recoverable failure.

use crate::cluster::MembershipTable;
use crate::gossip::GossipService;
use crate::protocol::ManageCommand;
use crate::registry::{help_offline, help_online, OnlineRequest, ServiceRegistry};
use tracing::info;

pub const OK: &str = "OK !";
pub const FAIL: &str = "FAIL !";
pub const UNALLOWED: &str = "UNALLOWED";

pub fn fail_with(cause: impl std::fmt::Display) -> String {
    format!("FAIL, Exception : {}", cause)
}

#[derive(Clone)]
pub struct ManagementSurface {
    table: MembershipTable,
    registry: ServiceRegistry,
    gossip: GossipService,
    default_port: u16,
}

impl ManagementSurface {
    pub fn new(table: MembershipTable, registry: ServiceRegistry, gossip: GossipService, default_port: u16) -> Self {
        Self {
            table,
            registry,
            gossip,
            default_port,
        }
    }

    pub async fn execute(&self, command: ManageCommand) -> String {
        match command {
            ManageCommand::Meet { host } => self.meet(&host).await,
            ManageCommand::ClusterStatus => self.cluster_status().await,
            ManageCommand::Tombstone { id } => self.tombstone(id),
            ManageCommand::Online {
                service_name,
                host,
                port,
                ping_frequency,
                id,
                v_nodes,
            } => {
                let mut request = OnlineRequest::new(service_name, host, port, ping_frequency);
                if let Some(id) = id {
                    request = request.with_id(id);
                }
                if let Some(v_nodes) = v_nodes {
                    request = request.with_v_nodes(v_nodes);
                }
                self.online(request).await
            }
            ManageCommand::Offline { service_name, id } => self.offline(&service_name, id).await,
            ManageCommand::ServiceStatus => self.service_status().await,
            ManageCommand::ServiceList => self.service_list().await,
            ManageCommand::HelpOnline => help_online(),
            ManageCommand::HelpOffline => help_offline(),
        }
    }

    /// Form a cluster with the node at `host` (`host` or `host:port`).
    pub async fn meet(&self, host: &str) -> String {
        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, self.default_port)
        };
        info!("meet {}", addr);
        match self.gossip.meet(&addr).await {
            Ok(()) => OK.to_string(),
            Err(e) => fail_with(e),
        }
    }

    pub async fn cluster_status(&self) -> String {
        self.table.cluster_status().await
    }

    pub fn tombstone(&self, id: u64) -> String {
        match self.table.request_tombstone(id) {
            Ok(()) => OK.to_string(),
            Err(_) => UNALLOWED.to_string(),
        }
    }

    pub async fn online(&self, request: OnlineRequest) -> String {
        self.registry.online(request).await.to_string()
    }

    pub async fn offline(&self, service_name: &str, id: u64) -> String {
        match self.registry.offline(service_name, id).await {
            Ok(_) => OK.to_string(),
            Err(_) => FAIL.to_string(),
        }
    }

    pub async fn service_status(&self) -> String {
        self.registry.service_status().await
    }

    pub async fn service_list(&self) -> String {
        self.registry.service_list().await
    }
}
