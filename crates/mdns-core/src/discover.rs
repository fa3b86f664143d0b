use crate::error::DiscoveryError;
use crate::model::DiscoveredService;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::time::{Duration, Instant};

/// Browse for `service_type`, collecting every service resolved before the
/// window closes. Blocking; run on a blocking task from async code.
pub fn browse_within(
    service_type: &str,
    timeout: Duration,
) -> Result<Vec<DiscoveredService>, DiscoveryError> {
    let daemon = ServiceDaemon::new()?;
    let service_type = if service_type.ends_with('.') {
        service_type.to_string()
    } else {
        format!("{}.", service_type)
    };

    let receiver = daemon.browse(&service_type)?;
    let mut out = Vec::new();

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(event) = receiver.recv_timeout(Duration::from_millis(500)) {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let properties = info
                        .get_properties()
                        .iter()
                        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
                        .collect();

                    out.push(DiscoveredService {
                        instance_name: instance_of(info.get_fullname(), &service_type),
                        host_name: info.get_hostname().to_string(),
                        port: info.get_port(),
                        addresses: info.get_addresses().iter().copied().collect(),
                        properties,
                    });
                }
                ServiceEvent::ServiceFound(ty, fullname) => {
                    tracing::debug!(%ty, %fullname, "found service, waiting for resolution");
                }
                _ => {}
            }
        }
    }
    Ok(out)
}

/// "host-a._p2pfileshare._tcp.local." -> "host-a"
fn instance_of(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(fullname)
        .to_string()
}
