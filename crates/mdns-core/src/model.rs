use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A service record to publish on the local network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAnnouncement {
    /// e.g. "_p2pfileshare._tcp.local."
    pub service_type: String,
    /// Instance name shown to other nodes, typically the hostname.
    pub instance_name: String,
    /// e.g. "myhost.local."
    pub host_name: String,
    pub ip_addr: String,
    pub port: u16,
    /// TXT properties published alongside the record.
    pub properties: Vec<(String, String)>,
}

/// One service resolved during a browse window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub instance_name: String,
    pub host_name: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    pub properties: Vec<(String, String)>,
}

impl DiscoveredService {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIp {
    pub name: String,
    pub ip: IpAddr,
    pub is_loopback: bool,
}
