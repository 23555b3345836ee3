//! Client-side load distribution over live service instances.

use crate::error::TnsError;
use crate::types::ServiceInstance;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Repeats each instance `v_nodes` times. Instances with weight zero
/// contribute nothing; a negative weight is refused.
pub fn expand(instances: &[ServiceInstance]) -> Result<Vec<ServiceInstance>, TnsError> {
    let mut total = 0usize;
    for instance in instances {
        let weight = usize::try_from(instance.v_nodes).map_err(|_| {
            TnsError::DataIntegrity(format!(
                "{} reports negative vNodes {}",
                instance.key(),
                instance.v_nodes
            ))
        })?;
        total += weight;
    }

    let mut expanded = Vec::with_capacity(total);
    for instance in instances {
        expanded.extend(std::iter::repeat(instance).take(instance.v_nodes as usize).cloned());
    }
    Ok(expanded)
}

/// Round-robin over an expanded instance sequence.
#[derive(Debug)]
pub struct WeightedSelector {
    index: Vec<ServiceInstance>,
    cursor: AtomicUsize,
}

impl WeightedSelector {
    pub fn build(instances: &[ServiceInstance]) -> Result<Self, TnsError> {
        Ok(Self {
            index: expand(instances)?,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn next(&self) -> Option<&ServiceInstance> {
        if self.index.is_empty() {
            return None;
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.index.len();
        self.index.get(slot)
    }
}
