pub mod node;
pub mod state;

pub use node::{format_timestamp, ClusterNode, ServiceInstance, ServiceKey, DEFAULT_VNODES};
pub use state::{should_replace, MergeReport, State, Versioned};
