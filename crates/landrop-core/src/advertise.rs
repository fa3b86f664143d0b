//! Presence advertising on the discovery channel.

use crate::config::NodeConfig;
use crate::sysinfo::SystemInfo;
use mdns_core::announce::Announcer;
use mdns_core::model::ServiceAnnouncement;
use mdns_core::net::pick_advertise_ip;
use std::net::IpAddr;
use tokio::sync::watch;

/// Publish this node on the local network and hold the advertisement open
/// until `shutdown` flips to true. Registration failure is logged and the
/// task exits; there is no retry until the process restarts.
pub async fn advertise_presence(
    cfg: &NodeConfig,
    info: &SystemInfo,
    mut shutdown: watch::Receiver<bool>,
) {
    let announcement = match pick_advertise_ip().map(|ip| build_announcement(cfg, info, ip)) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("cannot announce on the local network: {e}");
            return;
        }
    };

    let announcer = match Announcer::register(announcement) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("failed to register mdns service: {e}");
            return;
        }
    };
    tracing::info!(
        fullname = %announcer.fullname(),
        port = cfg.transfer_port,
        "advertising presence"
    );

    // The announcer handle keeps the record alive; hold it until shutdown.
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    tracing::info!("presence advertiser stopping");
}

fn build_announcement(cfg: &NodeConfig, info: &SystemInfo, ip: IpAddr) -> ServiceAnnouncement {
    ServiceAnnouncement {
        service_type: cfg.service_type.clone(),
        instance_name: info.hostname.clone(),
        host_name: format!("{}.local.", info.hostname),
        ip_addr: ip.to_string(),
        port: cfg.transfer_port,
        properties: vec![
            ("peer_id".to_string(), info.peer_id.clone()),
            ("cpu".to_string(), info.cpu.clone()),
            ("ram".to_string(), info.ram.clone()),
            ("os".to_string(), info.os.clone()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_carries_identity_and_transfer_port() {
        let cfg = NodeConfig::default();
        let info = SystemInfo {
            hostname: "box".to_string(),
            cpu: "8 logical cores".to_string(),
            ram: "16.00 GB".to_string(),
            os: "linux x86_64".to_string(),
            peer_id: "peer_box_0a1b2c3d".to_string(),
        };

        let ann = build_announcement(&cfg, &info, "192.168.1.5".parse().unwrap());

        assert_eq!(ann.instance_name, "box");
        assert_eq!(ann.port, cfg.transfer_port);
        assert!(ann
            .properties
            .contains(&("peer_id".to_string(), "peer_box_0a1b2c3d".to_string())));
    }
}
