//! CLI Handler for the naming service
//!
//! Provides command-line interface functionality for:
//! - Running a naming node until interrupted
//! - Sending management commands to a running node
//! - Discovering healthy instances of a service

use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::TnsError;
use crate::health::TcpProber;
use crate::logging;
use crate::loadbalancer::WeightedSelector;
use crate::node::NamingNode;
use crate::protocol::{ManageCommand, Request, Response};
use crate::transport::RpcClient;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address of the naming node to manage
    #[arg(short, long, global = true, default_value = "127.0.0.1:8700")]
    pub addr: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run a naming node
    Start,
    /// Form a cluster with another node (`host` or `host:port`)
    Meet { host: String },
    /// Print the cluster membership table
    Status,
    /// Print the service status table
    Services,
    /// Print the service list
    List,
    /// Register a service instance
    Online {
        service_name: String,
        host: String,
        port: u16,
        /// Health-check interval in seconds
        #[arg(long, default_value_t = 10)]
        ping_frequency: u32,
        #[arg(long)]
        id: Option<u64>,
        #[arg(long)]
        v_nodes: Option<i32>,
    },
    /// Take a service instance offline
    Offline { service_name: String, id: u64 },
    /// Request removal of a cluster node
    Tombstone { id: u64 },
    /// List healthy instances of a service, expanded by their weights
    Discover { service_name: String },
    /// Usage of `online`
    HelpOnline,
    /// Usage of `offline`
    HelpOffline,
}

impl Commands {
    /// The management command this subcommand maps to, if any.
    pub fn to_manage(&self) -> Option<ManageCommand> {
        let command = match self.clone() {
            Commands::Meet { host } => ManageCommand::Meet { host },
            Commands::Status => ManageCommand::ClusterStatus,
            Commands::Services => ManageCommand::ServiceStatus,
            Commands::List => ManageCommand::ServiceList,
            Commands::Online {
                service_name,
                host,
                port,
                ping_frequency,
                id,
                v_nodes,
            } => ManageCommand::Online {
                service_name,
                host,
                port,
                ping_frequency,
                id,
                v_nodes,
            },
            Commands::Offline { service_name, id } => ManageCommand::Offline { service_name, id },
            Commands::Tombstone { id } => ManageCommand::Tombstone { id },
            Commands::HelpOnline => ManageCommand::HelpOnline,
            Commands::HelpOffline => ManageCommand::HelpOffline,
            Commands::Start | Commands::Discover { .. } => return None,
        };
        Some(command)
    }
}

pub struct CliHandler {
    config_path: PathBuf,
    addr: String,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>, addr: impl Into<String>) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(Config::get_config_path),
            addr: addr.into(),
        }
    }

    fn client(&self) -> RpcClient {
        RpcClient::new(0, Duration::from_secs(2), Duration::from_secs(10))
    }

    /// Runs one subcommand. `shutdown` fires when the process is interrupted.
    pub async fn run(&self, command: Commands, shutdown: mpsc::Receiver<()>) -> Result<(), TnsError> {
        if command == Commands::Start {
            return self.start(shutdown).await;
        }
        if let Commands::Discover { service_name } = &command {
            return self.discover(service_name).await;
        }
        if let Some(manage) = command.to_manage() {
            println!("{}", self.manage(manage).await?);
        }
        Ok(())
    }

    pub async fn start(&self, mut shutdown: mpsc::Receiver<()>) -> Result<(), TnsError> {
        let config = Config::load(&self.config_path)?;
        logging::init(&config.logging)?;

        let node = NamingNode::new(config, Arc::new(SystemClock), Arc::new(TcpProber::default()));
        let addr = node.start().await?;
        info!("Naming node {} serving on {}", node.id(), addr);

        shutdown.recv().await;
        info!("Shutdown requested");
        node.stop().await;
        Ok(())
    }

    pub async fn manage(&self, command: ManageCommand) -> Result<String, TnsError> {
        match self.client().call(&self.addr, Request::Manage(command)).await? {
            Response::Text(text) => Ok(text),
            other => Err(TnsError::protocol(format!("unexpected response: {:?}", other))),
        }
    }

    pub async fn discover(&self, service_name: &str) -> Result<(), TnsError> {
        let request = Request::ListUp {
            service_name: service_name.to_string(),
        };
        let instances = match self.client().call(&self.addr, request).await? {
            Response::ServiceList(instances) => instances,
            other => return Err(TnsError::protocol(format!("unexpected response: {:?}", other))),
        };

        let selector = WeightedSelector::build(&instances)?;
        if selector.is_empty() {
            println!("{} EMPTY !", service_name);
        }
        for _ in 0..selector.len() {
            if let Some(instance) = selector.next() {
                println!("{}", instance.addr());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_online() {
        let cli = Cli::parse_from([
            "tns", "--addr", "10.0.0.1:8700", "online", "search", "10.0.0.2", "9000", "--v-nodes", "3",
        ]);
        assert_eq!(cli.addr, "10.0.0.1:8700");
        let command = cli.command.unwrap().to_manage().unwrap();
        assert_eq!(
            command,
            ManageCommand::Online {
                service_name: "search".to_string(),
                host: "10.0.0.2".to_string(),
                port: 9000,
                ping_frequency: 10,
                id: None,
                v_nodes: Some(3),
            }
        );
    }

    #[test]
    fn test_start_is_local() {
        let cli = Cli::parse_from(["tns", "start", "--config", "/tmp/tns.yml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/tns.yml")));
        assert_eq!(cli.command, Some(Commands::Start));
        assert!(Commands::Start.to_manage().is_none());
    }

    #[test]
    fn test_status_maps_to_cluster_status() {
        let cli = Cli::parse_from(["tns", "status"]);
        assert_eq!(cli.command.unwrap().to_manage(), Some(ManageCommand::ClusterStatus));
    }
}
