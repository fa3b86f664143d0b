use crate::error::DiscoveryError;
use crate::model::ServiceAnnouncement;
use mdns_sd::{ServiceDaemon, ServiceInfo};

/// Handle so the service stays registered while this is alive.
pub struct Announcer {
    _daemon: ServiceDaemon, // Keep daemon alive
    fullname: String,
}

impl Announcer {
    pub fn register(ann: ServiceAnnouncement) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;

        // Ensure trailing dots as mdns-sd expects FQDNs.
        let service_type = ensure_dot(&ann.service_type);
        let host_name = ensure_dot(&ann.host_name);

        let info = ServiceInfo::new(
            &service_type,
            &ann.instance_name,
            &host_name,
            &ann.ip_addr,
            ann.port,
            &ann.properties[..],
        )?;

        daemon.register(info.clone())?;
        tracing::debug!(fullname = %info.get_fullname(), "registered mdns service");
        Ok(Self {
            _daemon: daemon,
            fullname: info.get_fullname().to_string(),
        })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

fn ensure_dot(s: &str) -> String {
    if s.ends_with('.') {
        s.to_string()
    } else {
        format!("{}.", s)
    }
}
