//! Cluster Membership Module
//!
//! Provides gossip-based cluster membership:
//! - Ordered node table with ring-successor lookup
//! - Last-writer-wins merge with dominant departure states

pub mod membership;

pub use membership::MembershipTable;
pub use crate::types::MergeReport;
