//! Service Registry
//!
//! Tracks externally registered service instances:
//! - online/offline lifecycle
//! - anti-entropy merge of peer snapshots
//! - periodic sweep advancing and removing tombstones
//! - liveness reports from the health checker

mod render;

pub use render::{help_offline, help_online};

use crate::clock::Clock;
use crate::config::RegistryConfig;
use crate::error::{Result, TnsError};
use crate::types::{should_replace, MergeReport, ServiceInstance, ServiceKey, State, DEFAULT_VNODES};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

type ServiceMap = BTreeMap<String, BTreeMap<u64, ServiceInstance>>;

/// Parameters of an `online` announcement
#[derive(Debug, Clone)]
pub struct OnlineRequest {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub ping_frequency: u32,
    pub id: Option<u64>,
    pub v_nodes: i32,
}

impl OnlineRequest {
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16, ping_frequency: u32) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            ping_frequency,
            id: None,
            v_nodes: DEFAULT_VNODES,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_v_nodes(mut self, v_nodes: i32) -> Self {
        self.v_nodes = v_nodes;
        self
    }
}

/// Outcome counts of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub to_tombstone_1: usize,
    pub to_tombstone: usize,
    pub removed: usize,
}

/// Registry for service instances, keyed by service name then instance id
#[derive(Clone)]
pub struct ServiceRegistry {
    services: Arc<RwLock<ServiceMap>>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    probe_queue: Option<mpsc::UnboundedSender<ServiceKey>>,
}

impl ServiceRegistry {
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            services: Arc::new(RwLock::new(BTreeMap::new())),
            config,
            clock,
            probe_queue: None,
        }
    }

    /// Newly inserted instances are handed to the health checker through this queue.
    pub fn with_probe_queue(mut self, queue: mpsc::UnboundedSender<ServiceKey>) -> Self {
        self.probe_queue = Some(queue);
        self
    }

    fn submit_probe(&self, instance: &ServiceInstance) {
        if let Some(queue) = &self.probe_queue {
            if queue.send(instance.key()).is_err() {
                debug!("Health checker gone, {} not submitted", instance.key());
            }
        }
    }

    /// Announce an instance. A repeated announcement of a known
    /// `(service_name, id)` updates its endpoint instead of inserting.
    pub async fn online(&self, request: OnlineRequest) -> ServiceInstance {
        let now = self.clock.now_millis();
        let ping_frequency = self.config.clamp_ping(request.ping_frequency);
        let id = request.id.unwrap_or(now);

        let mut services = self.services.write().await;
        let bucket = services.entry(request.service_name.clone()).or_default();

        if let Some(existing) = bucket.get_mut(&id) {
            let changed = existing.host != request.host
                || existing.port != request.port
                || existing.ping_frequency != ping_frequency
                || existing.v_nodes != request.v_nodes;
            if existing.state.is_liveness() && changed {
                existing.host = request.host;
                existing.port = request.port;
                existing.ping_frequency = ping_frequency;
                existing.v_nodes = request.v_nodes;
                existing.timestamp = now.max(existing.timestamp.saturating_add(1));
                info!("update [ {} ], success", existing);
            }
            return existing.clone();
        }

        let instance = ServiceInstance {
            service_name: request.service_name,
            id,
            host: request.host,
            port: request.port,
            ping_frequency,
            state: State::Joining,
            timestamp: now,
            v_nodes: request.v_nodes,
        };
        bucket.insert(id, instance.clone());
        info!("add [ {} ], success", instance);
        self.submit_probe(&instance);
        instance
    }

    /// Moves a known instance to `Leaving`, stamped with the local clock.
    pub async fn offline(&self, service_name: &str, id: u64) -> Result<ServiceInstance> {
        let now = self.clock.now_millis();
        let mut services = self.services.write().await;
        let instance = services
            .get_mut(service_name)
            .and_then(|bucket| bucket.get_mut(&id))
            .ok_or_else(|| TnsError::not_found(format!("{}/{}", service_name, id)))?;

        if instance.state.is_liveness() {
            info!("Leaving [ {} ] with timestamp : {}", instance, now);
            instance.state = State::Leaving;
            instance.timestamp = now;
        }
        Ok(instance.clone())
    }

    /// Applies a peer snapshot under one exclusive acquisition.
    ///
    /// A `Leaving` record accepted over a liveness record is restamped with the
    /// local clock so that the local dwell period starts now. Peer ping
    /// frequencies are clamped to the local bounds.
    pub async fn merge(&self, incoming: Vec<ServiceInstance>) -> MergeReport {
        let mut report = MergeReport::default();
        let now = self.clock.now_millis();
        let mut services = self.services.write().await;

        for mut instance in incoming {
            instance.ping_frequency = self.config.clamp_ping(instance.ping_frequency);
            let bucket = services.entry(instance.service_name.clone()).or_default();
            match bucket.get_mut(&instance.id) {
                None => {
                    info!("add [ {} ], success", instance);
                    if instance.state.is_liveness() {
                        self.submit_probe(&instance);
                    }
                    bucket.insert(instance.id, instance);
                    report.inserted += 1;
                }
                Some(local) if !should_replace(&*local, &instance) => {
                    report.ignored += 1;
                }
                Some(local) if instance.state == State::Leaving => {
                    if local.state == State::Leaving {
                        report.ignored += 1;
                    } else {
                        info!("Leaving [ {} ] with timestamp : {}", local, now);
                        local.state = State::Leaving;
                        local.timestamp = now;
                        report.replaced += 1;
                    }
                }
                Some(local) => {
                    *local = instance;
                    report.replaced += 1;
                }
            }
        }
        report
    }

    /// Advances departure states whose dwell time has elapsed and removes
    /// tombstones that have dwelt long enough.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.clock.now_millis();
        let dwell = self.config.tombstone_dwell_secs;
        let mut services = self.services.write().await;

        for bucket in services.values_mut() {
            bucket.retain(|_, instance| {
                if instance.state.is_liveness() {
                    return true;
                }
                let waited = now.saturating_sub(instance.timestamp) / 1000;
                if waited <= dwell {
                    debug!(
                        "checkAndRemove [ {} ], but waitSeconds [ {} ] is less than [ {} ]",
                        instance, waited, dwell
                    );
                    return true;
                }
                match instance.state.next_departure() {
                    Some(next) => {
                        info!("checkAndRemove [ {} ] to [{}], waitSeconds is [ {} ]", instance, next, waited);
                        if next == State::Tombstone1 {
                            report.to_tombstone_1 += 1;
                        } else {
                            report.to_tombstone += 1;
                        }
                        instance.state = next;
                        instance.timestamp = now;
                        true
                    }
                    None => {
                        info!("checkAndRemove [ {} ] removed, waitSeconds is [ {} ]", instance, waited);
                        report.removed += 1;
                        false
                    }
                }
            });
        }
        services.retain(|_, bucket| !bucket.is_empty());
        report
    }

    /// Applies a probe outcome from the health checker. Returns the resulting
    /// state, or `None` when the instance is no longer registered.
    pub async fn report_probe(&self, key: &ServiceKey, reachable: bool) -> Option<State> {
        let mut services = self.services.write().await;
        let instance = services.get_mut(&key.service_name)?.get_mut(&key.id)?;
        let next = instance.state.after_probe(reachable);
        if next != instance.state {
            info!("{} {} -> {}", key, instance.state, next);
            instance.state = next;
            instance.timestamp = self.clock.now_millis();
        }
        Some(next)
    }

    pub async fn get(&self, key: &ServiceKey) -> Option<ServiceInstance> {
        let services = self.services.read().await;
        services.get(&key.service_name)?.get(&key.id).cloned()
    }

    /// Healthy instances of one service.
    pub async fn list_up(&self, service_name: &str) -> Vec<ServiceInstance> {
        let services = self.services.read().await;
        services
            .get(service_name)
            .map(|bucket| {
                bucket
                    .values()
                    .filter(|instance| instance.state == State::Up)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Outbound gossip snapshot. Tombstones are not re-broadcast; sweep
    /// retires them locally.
    pub async fn list_all_for_propagation(&self) -> Vec<ServiceInstance> {
        let services = self.services.read().await;
        services
            .values()
            .flat_map(|bucket| bucket.values())
            .filter(|instance| !instance.state.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn service_names(&self) -> Vec<String> {
        self.services.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        let services = self.services.read().await;
        services.values().map(|bucket| bucket.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn service_status(&self) -> String {
        let services = self.services.read().await;
        render::service_status(&services)
    }

    pub async fn service_list(&self) -> String {
        let services = self.services.read().await;
        render::service_list(&services, self.clock.now_millis())
    }
}
