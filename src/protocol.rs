//! Messages exchanged between naming nodes and their clients.

use crate::error::TnsError;
use crate::types::{ClusterNode, ServiceInstance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator commands of the management surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ManageCommand {
    Meet { host: String },
    ClusterStatus,
    Tombstone { id: u64 },
    Online {
        service_name: String,
        host: String,
        port: u16,
        ping_frequency: u32,
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        v_nodes: Option<i32>,
    },
    Offline { service_name: String, id: u64 },
    ServiceStatus,
    ServiceList,
    HelpOnline,
    HelpOffline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Request {
    /// A peer announces itself after `meet`
    Up(ClusterNode),
    PushClusterList(Vec<ClusterNode>),
    PushServiceList(Vec<ServiceInstance>),
    /// Client discovery of healthy instances
    ListUp { service_name: String },
    Manage(ManageCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    ClusterList(Vec<ClusterNode>),
    ServiceList(Vec<ServiceInstance>),
    Text(String),
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: u64,
    pub sent_at: DateTime<Utc>,
    #[serde(flatten)]
    pub request: Request,
}

impl Envelope {
    pub fn new(sender_id: u64, request: Request) -> Self {
        Self {
            sender_id,
            sent_at: Utc::now(),
            request,
        }
    }

    pub fn validate(&self) -> Result<(), TnsError> {
        match &self.request {
            Request::PushServiceList(list) => {
                if let Some(bad) = list.iter().find(|i| i.service_name.is_empty()) {
                    return Err(TnsError::protocol(format!(
                        "service instance {} has an empty service name",
                        bad.id
                    )));
                }
                Ok(())
            }
            Request::ListUp { service_name } if service_name.is_empty() => {
                Err(TnsError::protocol("service name is required"))
            }
            Request::Manage(ManageCommand::Online { service_name, host, .. })
                if service_name.is_empty() || host.is_empty() =>
            {
                Err(TnsError::protocol("online requires a service name and a host"))
            }
            _ => Ok(()),
        }
    }
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}
