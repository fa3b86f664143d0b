use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

pub const STATUS_ONLINE: &str = "online";

/// A node discovered on the local network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    #[serde(rename = "peer_id")]
    pub id: String,
    pub hostname: String,
    pub ip: IpAddr,
    pub port: u16,
    pub cpu: String,
    pub ram: String,
    pub os: String,
    pub status: String,
}

/// The authoritative set of currently known peers.
///
/// The set is only ever replaced wholesale by a completed scan; entries are
/// never inserted, merged, or removed individually. Readers clone an
/// immutable snapshot reference, so a concurrent replace can never tear a
/// read.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: RwLock<Arc<[Peer]>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self {
            peers: RwLock::new(Vec::new().into()),
        }
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly scanned peer set. Every stored entry is marked
    /// online; the previous snapshot is dropped wholesale.
    pub fn replace(&self, peers: Vec<Peer>) {
        let snapshot: Arc<[Peer]> = peers
            .into_iter()
            .map(|mut p| {
                p.status = STATUS_ONLINE.to_string();
                p
            })
            .collect();
        *self.peers.write() = snapshot;
    }

    /// Immutable snapshot of the current peer set.
    pub fn list(&self) -> Arc<[Peer]> {
        self.peers.read().clone()
    }

    pub fn lookup(&self, id: &str) -> Option<Peer> {
        self.peers.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> Peer {
        Peer {
            id: id.to_string(),
            hostname: format!("host-{id}"),
            ip: "192.168.1.20".parse().unwrap(),
            port: 9002,
            cpu: "8 logical cores".to_string(),
            ram: "16.00 GB".to_string(),
            os: "linux x86_64".to_string(),
            status: String::new(),
        }
    }

    #[test]
    fn replace_marks_everything_online() {
        let registry = PeerRegistry::new();
        registry.replace(vec![peer("a"), peer("b")]);

        assert_eq!(registry.count(), 2);
        assert!(registry.list().iter().all(|p| p.status == STATUS_ONLINE));
    }

    #[test]
    fn lookup_finds_by_id() {
        let registry = PeerRegistry::new();
        registry.replace(vec![peer("a"), peer("b")]);

        assert_eq!(registry.lookup("b").map(|p| p.hostname), Some("host-b".to_string()));
        assert!(registry.lookup("c").is_none());
    }

    #[test]
    fn snapshots_survive_a_replace() {
        let registry = PeerRegistry::new();
        registry.replace(vec![peer("a")]);

        let before = registry.list();
        registry.replace(vec![peer("b"), peer("c")]);

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, "a");
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn replace_is_wholesale_not_a_merge() {
        let registry = PeerRegistry::new();
        registry.replace(vec![peer("a"), peer("b")]);
        registry.replace(vec![peer("b")]);

        assert_eq!(registry.count(), 1);
        assert!(registry.lookup("a").is_none());
    }
}
