pub mod cli;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod error;
pub mod gossip;
pub mod health;
pub mod loadbalancer;
pub mod logging;
pub mod management;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export common types
pub use cluster::MembershipTable;
pub use config::Config;
pub use error::TnsError;
pub use node::NamingNode;
pub use registry::ServiceRegistry;
