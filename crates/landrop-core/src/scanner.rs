//! Periodic and on-demand peer discovery.
//!
//! One scan browses the discovery channel for a bounded window, builds a
//! fresh peer list, and replaces the registry wholesale. Scans are
//! single-flight: a call that lands while another scan is running is a no-op,
//! not queued.

use crate::peer::{Peer, PeerRegistry, STATUS_ONLINE};
use async_trait::async_trait;
use mdns_core::model::DiscoveredService;
use mdns_core::DiscoveryError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The discovery channel the scanner browses. Production is mDNS; tests
/// substitute a stub.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn browse(&self, timeout: Duration) -> Result<Vec<DiscoveredService>, DiscoveryError>;
}

/// mDNS-backed discovery. The browse itself is blocking, so it runs on a
/// blocking task.
pub struct MdnsDiscovery {
    service_type: String,
}

impl MdnsDiscovery {
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
        }
    }
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    async fn browse(&self, timeout: Duration) -> Result<Vec<DiscoveredService>, DiscoveryError> {
        let service_type = self.service_type.clone();
        tokio::task::spawn_blocking(move || {
            mdns_core::discover::browse_within(&service_type, timeout)
        })
        .await
        .map_err(|e| {
            DiscoveryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
        })?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A discovery window ran to completion; the registry now holds `n` peers.
    Completed(usize),
    /// Another scan was already in flight; this call did nothing.
    Skipped,
    /// The discovery layer failed; the registry was left untouched.
    Failed,
}

pub struct PeerScanner {
    registry: Arc<PeerRegistry>,
    discovery: Arc<dyn Discovery>,
    local_id: String,
    scan_timeout: Duration,
    scan_interval: Duration,
    // Guards only the in-flight flag. Kept apart from the registry lock so
    // registry readers are never blocked by scan bookkeeping.
    scanning: AtomicBool,
}

impl PeerScanner {
    pub fn new(
        registry: Arc<PeerRegistry>,
        discovery: Arc<dyn Discovery>,
        local_id: String,
        scan_timeout: Duration,
        scan_interval: Duration,
    ) -> Self {
        Self {
            registry,
            discovery,
            local_id,
            scan_timeout,
            scan_interval,
            scanning: AtomicBool::new(false),
        }
    }

    /// One discovery cycle. A call that lands while another scan is in
    /// flight returns immediately without querying.
    pub async fn scan(&self) -> ScanOutcome {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("scan already in progress, skipping");
            return ScanOutcome::Skipped;
        }

        struct InFlight<'a>(&'a AtomicBool);
        impl Drop for InFlight<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::Release);
            }
        }
        let _guard = InFlight(&self.scanning);

        self.scan_inner().await
    }

    async fn scan_inner(&self) -> ScanOutcome {
        tracing::debug!("discovering peers");
        let services = match self.discovery.browse(self.scan_timeout).await {
            Ok(services) => services,
            Err(e) => {
                // Stale data beats empty data: keep the previous snapshot.
                tracing::warn!("peer discovery failed, keeping previous peer list: {e}");
                return ScanOutcome::Failed;
            }
        };

        let peers = build_peers(&services, &self.local_id);
        let found = peers.len();
        self.registry.replace(peers);
        tracing::info!(found, "peer scan complete");
        ScanOutcome::Completed(found)
    }

    /// Immediate scan, then a fixed-interval loop for the life of the
    /// process.
    pub async fn run_periodic(&self) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        // The first tick fires immediately, giving the startup scan.
        loop {
            ticker.tick().await;
            self.scan().await;
        }
    }
}

/// Turn a browse result into registry entries. Announcements missing a peer
/// id or instance name, carrying no address, duplicating an id already seen
/// this scan, or echoing our own id are dropped.
fn build_peers(services: &[DiscoveredService], local_id: &str) -> Vec<Peer> {
    let mut peers: Vec<Peer> = Vec::new();
    for svc in services {
        let Some(id) = svc.property("peer_id").filter(|id| !id.is_empty()) else {
            continue;
        };
        if id == local_id || svc.instance_name.is_empty() {
            continue;
        }
        let Some(ip) = svc.addresses.first().copied() else {
            continue;
        };
        if peers.iter().any(|p| p.id == id) {
            continue;
        }
        peers.push(Peer {
            id: id.to_string(),
            hostname: svc.instance_name.clone(),
            ip,
            port: svc.port,
            cpu: svc.property("cpu").unwrap_or_default().to_string(),
            ram: svc.property("ram").unwrap_or_default().to_string(),
            os: svc.property("os").unwrap_or_default().to_string(),
            status: STATUS_ONLINE.to_string(),
        });
    }
    peers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct StubDiscovery {
        calls: AtomicUsize,
        delay: Duration,
        services: Vec<DiscoveredService>,
        fail: bool,
    }

    impl StubDiscovery {
        fn returning(services: Vec<DiscoveredService>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                services,
                fail: false,
            })
        }
    }

    #[async_trait]
    impl Discovery for StubDiscovery {
        async fn browse(
            &self,
            _timeout: Duration,
        ) -> Result<Vec<DiscoveredService>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(DiscoveryError::NoInterface);
            }
            Ok(self.services.clone())
        }
    }

    fn svc(instance: &str, id: &str, ip: &str) -> DiscoveredService {
        DiscoveredService {
            instance_name: instance.to_string(),
            host_name: format!("{instance}.local."),
            port: 9002,
            addresses: vec![ip.parse().unwrap()],
            properties: vec![
                ("peer_id".to_string(), id.to_string()),
                ("cpu".to_string(), "8 logical cores".to_string()),
                ("ram".to_string(), "16.00 GB".to_string()),
                ("os".to_string(), "linux x86_64".to_string()),
            ],
        }
    }

    fn scanner_with(discovery: Arc<dyn Discovery>, registry: Arc<PeerRegistry>) -> PeerScanner {
        PeerScanner::new(
            registry,
            discovery,
            "peer_self_00000000".to_string(),
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn scan_filters_malformed_self_and_duplicate_announcements() {
        let mut no_id = svc("no-id", "unused", "192.168.1.30");
        no_id.properties.retain(|(k, _)| k != "peer_id");
        let mut no_addr = svc("no-addr", "peer_no-addr_11111111", "192.168.1.31");
        no_addr.addresses.clear();
        let mut no_name = svc("anon", "peer_anon_22222222", "192.168.1.32");
        no_name.instance_name.clear();

        let services = vec![
            svc("alpha", "peer_alpha_aaaaaaaa", "192.168.1.10"),
            svc("alpha", "peer_alpha_aaaaaaaa", "192.168.1.10"), // resolved twice
            svc("self", "peer_self_00000000", "192.168.1.2"),
            no_id,
            no_addr,
            no_name,
            svc("beta", "peer_beta_bbbbbbbb", "192.168.1.11"),
        ];

        let registry = Arc::new(PeerRegistry::new());
        let scanner = scanner_with(StubDiscovery::returning(services), registry.clone());

        assert_eq!(scanner.scan().await, ScanOutcome::Completed(2));

        let peers = registry.list();
        let ids: Vec<&str> = peers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["peer_alpha_aaaaaaaa", "peer_beta_bbbbbbbb"]);
        assert!(peers.iter().all(|p| p.status == STATUS_ONLINE));
    }

    #[tokio::test]
    async fn concurrent_scans_run_one_discovery_query() {
        let stub = Arc::new(StubDiscovery {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
            services: vec![svc("alpha", "peer_alpha_aaaaaaaa", "192.168.1.10")],
            fail: false,
        });
        let registry = Arc::new(PeerRegistry::new());
        let scanner = Arc::new(scanner_with(stub.clone(), registry));

        let first = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = scanner.scan().await;

        assert_eq!(second, ScanOutcome::Skipped);
        assert_eq!(first.await.unwrap(), ScanOutcome::Completed(1));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_discovery_keeps_the_previous_snapshot() {
        let registry = Arc::new(PeerRegistry::new());
        {
            let seed = scanner_with(
                StubDiscovery::returning(vec![svc("alpha", "peer_alpha_aaaaaaaa", "192.168.1.10")]),
                registry.clone(),
            );
            seed.scan().await;
        }
        assert_eq!(registry.count(), 1);

        let failing = Arc::new(StubDiscovery {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            services: vec![],
            fail: true,
        });
        let scanner = scanner_with(failing, registry.clone());

        assert_eq!(scanner.scan().await, ScanOutcome::Failed);
        assert_eq!(registry.count(), 1);
        assert!(registry.lookup("peer_alpha_aaaaaaaa").is_some());
    }

    #[tokio::test]
    async fn a_later_scan_can_run_after_the_first_finishes() {
        let stub = StubDiscovery::returning(vec![]);
        let registry = Arc::new(PeerRegistry::new());
        let scanner = scanner_with(stub.clone(), registry);

        assert_eq!(scanner.scan().await, ScanOutcome::Completed(0));
        assert_eq!(scanner.scan().await, ScanOutcome::Completed(0));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }
}
