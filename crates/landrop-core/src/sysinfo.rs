//! Local capability probe: who this node is and what it runs on.
//!
//! The record is opaque data to the rest of the system; only the peer id is
//! interpreted (for self-exclusion during scans), so it is persisted to keep
//! it stable across restarts.

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SYSTEM_INFO_FILE: &str = "system_info.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub cpu: String,
    pub ram: String,
    pub os: String,
    pub peer_id: String,
}

impl SystemInfo {
    /// Load the persisted record, or probe the host and persist a fresh one.
    /// The persisted record wins over a new probe so the peer id survives
    /// restarts; a corrupt file falls back to re-probing.
    pub fn load_or_probe(data_dir: &Path) -> std::io::Result<Self> {
        let path = data_dir.join(SYSTEM_INFO_FILE);
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<Self>(&raw) {
                    Ok(info) => {
                        tracing::debug!(peer_id = %info.peer_id, "loaded system info");
                        return Ok(info);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "system info unreadable, re-probing: {e}")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), "system info unreadable, re-probing: {e}")
                }
            }
        }

        let info = Self::probe();
        std::fs::create_dir_all(data_dir)?;
        let body = serde_json::to_string_pretty(&info)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, body)?;
        tracing::info!(peer_id = %info.peer_id, "generated system info");
        Ok(info)
    }

    fn probe() -> Self {
        let hostname = hostname();
        let peer_id = generate_peer_id(&hostname);
        Self {
            cpu: cpu_descriptor(),
            ram: ram_descriptor(),
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            hostname,
            peer_id,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn cpu_descriptor() -> String {
    match std::thread::available_parallelism() {
        Ok(n) => format!("{} logical cores", n),
        Err(_) => "unknown cpu".to_string(),
    }
}

fn ram_descriptor() -> String {
    // MemTotal is reported in kB.
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        for line in meminfo.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                if let Some(kb) = rest
                    .split_whitespace()
                    .next()
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    return format!("{:.2} GB", kb as f64 / 1024.0 / 1024.0);
                }
            }
        }
    }
    "unknown ram".to_string()
}

fn generate_peer_id(hostname: &str) -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    format!("peer_{}_{}", hostname, hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn peer_id_is_stable_across_loads() {
        let temp = TempDir::new().unwrap();
        let first = SystemInfo::load_or_probe(temp.path()).unwrap();
        let second = SystemInfo::load_or_probe(temp.path()).unwrap();

        assert_eq!(first.peer_id, second.peer_id);
        assert!(temp.path().join(SYSTEM_INFO_FILE).exists());
    }

    #[test]
    fn corrupt_record_is_reprobed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SYSTEM_INFO_FILE), "not json").unwrap();

        let info = SystemInfo::load_or_probe(temp.path()).unwrap();
        assert!(info.peer_id.starts_with("peer_"));
    }

    #[test]
    fn generated_ids_carry_the_hostname() {
        let id = generate_peer_id("box");
        assert!(id.starts_with("peer_box_"));
        assert_eq!(id.len(), "peer_box_".len() + 8);
    }
}
