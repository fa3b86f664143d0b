use crate::error::DiscoveryError;
use crate::model::InterfaceIp;
use std::net::IpAddr;

pub fn list_interface_ips() -> Result<Vec<InterfaceIp>, DiscoveryError> {
    let ifs = if_addrs::get_if_addrs()?;

    let mut out: Vec<InterfaceIp> = ifs
        .into_iter()
        .map(|ifa| {
            let ip = ifa.ip();
            InterfaceIp {
                name: ifa.name,
                ip,
                is_loopback: ip.is_loopback(),
            }
        })
        .collect();

    out.sort_by(|a, b| (&a.name, &a.ip).cmp(&(&b.name, &b.ip)));
    out.dedup_by(|a, b| a.name == b.name && a.ip == b.ip);
    Ok(out)
}

/// First non-loopback IPv4: the address other nodes can actually reach.
pub fn pick_advertise_ip() -> Result<IpAddr, DiscoveryError> {
    list_interface_ips()?
        .into_iter()
        .find(|ifa| !ifa.is_loopback && ifa.ip.is_ipv4())
        .map(|ifa| ifa.ip)
        .ok_or(DiscoveryError::NoInterface)
}
