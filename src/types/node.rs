//! Cluster node and service instance records exchanged between peers.

use super::state::{State, Versioned};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default replication weight for a freshly announced service instance
pub const DEFAULT_VNODES: i32 = 1;

/// A server participating in the naming cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Cluster-unique id, fixed at creation
    pub id: u64,
    pub host: String,
    pub port: u16,
    pub state: State,
    /// Wall time (ms) of the last local state change
    pub timestamp: u64,
    /// Build/version tag, informational only
    pub version: String,
}

impl ClusterNode {
    pub fn new(id: u64, host: impl Into<String>, port: u16, timestamp: u64) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            state: State::Joining,
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Versioned for ClusterNode {
    fn state(&self) -> State {
        self.state
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Identity of a service instance within the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub service_name: String,
    pub id: u64,
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_name, self.id)
    }
}

/// An externally registered service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub id: u64,
    pub host: String,
    pub port: u16,
    /// Health-check interval in seconds
    pub ping_frequency: u32,
    pub state: State,
    pub timestamp: u64,
    /// Replication weight for client-side load distribution
    #[serde(default = "default_v_nodes")]
    pub v_nodes: i32,
}

fn default_v_nodes() -> i32 {
    DEFAULT_VNODES
}

impl ServiceInstance {
    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            service_name: self.service_name.clone(),
            id: self.id,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Versioned for ServiceInstance {
    fn state(&self) -> State {
        self.state
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServiceInstance(serviceName:{}, host:{}, port:{}, id:{}, state:{}, timestamp:{}, pingFrequency:{}, vNodes:{})",
            self.service_name,
            self.host,
            self.port,
            self.id,
            self.state,
            self.timestamp,
            self.ping_frequency,
            self.v_nodes
        )
    }
}

/// Renders a millisecond timestamp as local `yyyy-MM-dd HH:mm:ss`.
pub fn format_timestamp(millis: u64) -> String {
    Local
        .timestamp_millis_opt(millis as i64)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_node_defaults_to_joining() {
        let node = ClusterNode::new(7, "10.0.0.1", 8700, 1_000);
        assert_eq!(node.state, State::Joining);
        assert_eq!(node.addr(), "10.0.0.1:8700");
        assert_eq!(node.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_missing_v_nodes_defaults_on_decode() {
        let json = r#"{"service_name":"search","id":1,"host":"h","port":1,
            "ping_frequency":10,"state":"UP","timestamp":5}"#;
        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.v_nodes, DEFAULT_VNODES);
        assert_eq!(instance.key().to_string(), "search/1");
    }

    #[test]
    fn test_format_timestamp_epoch_is_renderable() {
        assert_eq!(format_timestamp(0).len(), "1970-01-01 00:00:00".len());
    }
}
