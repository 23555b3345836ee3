//! Health Checking
//!
//! The health checker is the only driver of liveness transitions for service
//! instances. It never sets a departure state.

use crate::registry::ServiceRegistry;
use crate::types::ServiceKey;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Liveness probe for one endpoint.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, bool>;
}

/// Treats an endpoint as alive when a TCP connection can be opened.
#[derive(Debug, Clone)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl Prober for TcpProber {
    fn probe<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            matches!(
                tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await,
                Ok(Ok(_))
            )
        })
    }
}

/// Runs one probe loop per submitted service instance, at the instance's
/// ping frequency, until it departs or disappears.
pub struct HealthMonitor {
    registry: ServiceRegistry,
    prober: Arc<dyn Prober>,
    active: Arc<Mutex<HashSet<ServiceKey>>>,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    pub fn new(registry: ServiceRegistry, prober: Arc<dyn Prober>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            prober,
            active: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    /// Consumes submissions until the queue closes or shutdown is requested.
    pub fn start(self, mut queue: mpsc::UnboundedReceiver<ServiceKey>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    next = queue.recv() => match next {
                        Some(key) => self.submit(key).await,
                        None => break,
                    },
                }
            }
            debug!("Health monitor stopped");
        })
    }

    async fn submit(&self, key: ServiceKey) {
        if !self.active.lock().await.insert(key.clone()) {
            debug!("{} already monitored", key);
            return;
        }
        let registry = self.registry.clone();
        let prober = self.prober.clone();
        let active = self.active.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            probe_loop(&registry, prober.as_ref(), &key, &shutdown).await;
            active.lock().await.remove(&key);
        });
    }
}

async fn probe_loop(registry: &ServiceRegistry, prober: &dyn Prober, key: &ServiceKey, shutdown: &CancellationToken) {
    info!("Health checking {}", key);
    loop {
        let Some(instance) = registry.get(key).await else {
            break;
        };
        if instance.state.is_departing() {
            break;
        }

        let reachable = prober.probe(&instance.host, instance.port).await;
        match registry.report_probe(key, reachable).await {
            Some(state) if state.is_liveness() => {}
            _ => break,
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(u64::from(instance.ping_frequency))) => {}
        }
    }
    info!("Stopped health checking {}", key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::RegistryConfig;
    use crate::registry::OnlineRequest;
    use crate::types::State;
    use crate::types::ServiceInstance;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct Switch(AtomicBool);

    impl Prober for Switch {
        fn probe<'a>(&'a self, _host: &'a str, _port: u16) -> BoxFuture<'a, bool> {
            let up = self.0.load(Ordering::SeqCst);
            Box::pin(async move { up })
        }
    }

    struct Counting(AtomicUsize);

    impl Prober for Counting {
        fn probe<'a>(&'a self, _host: &'a str, _port: u16) -> BoxFuture<'a, bool> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { true })
        }
    }

    async fn wait_for(registry: &ServiceRegistry, key: &ServiceKey, state: State) -> bool {
        for _ in 0..100 {
            if registry.get(key).await.map(|i| i.state) == Some(state) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_tcp_prober() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = TcpProber::new(Duration::from_millis(500));
        assert!(prober.probe("127.0.0.1", port).await);
        drop(listener);
        assert!(!prober.probe("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_monitor_marks_new_instance_up() {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = ServiceRegistry::new(RegistryConfig::default(), Arc::new(SystemClock)).with_probe_queue(tx);
        let shutdown = CancellationToken::new();
        let prober = Arc::new(Switch(AtomicBool::new(true)));
        HealthMonitor::new(registry.clone(), prober, shutdown.clone()).start(rx);

        let created = registry.online(OnlineRequest::new("search", "127.0.0.1", 1, 10)).await;
        assert!(wait_for(&registry, &created.key(), State::Up).await);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_monitor_marks_unreachable_instance_down_1() {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = ServiceRegistry::new(RegistryConfig::default(), Arc::new(SystemClock)).with_probe_queue(tx);
        let shutdown = CancellationToken::new();
        let prober = Arc::new(Switch(AtomicBool::new(false)));
        HealthMonitor::new(registry.clone(), prober, shutdown.clone()).start(rx);

        let created = registry.online(OnlineRequest::new("search", "127.0.0.1", 1, 10)).await;
        assert!(wait_for(&registry, &created.key(), State::Down1).await);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_merged_zero_ping_frequency_does_not_spin() {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = ServiceRegistry::new(RegistryConfig::default(), Arc::new(SystemClock)).with_probe_queue(tx);
        let shutdown = CancellationToken::new();
        let prober = Arc::new(Counting(AtomicUsize::new(0)));
        HealthMonitor::new(registry.clone(), prober.clone(), shutdown.clone()).start(rx);

        let peer_record = ServiceInstance {
            service_name: "search".to_string(),
            id: 3,
            host: "127.0.0.1".to_string(),
            port: 1,
            ping_frequency: 0,
            state: State::Joining,
            timestamp: 1,
            v_nodes: 1,
        };
        let key = peer_record.key();
        registry.merge(vec![peer_record]).await;
        assert!(wait_for(&registry, &key, State::Up).await);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(prober.0.load(Ordering::SeqCst), 1);
        shutdown.cancel();
    }
}
