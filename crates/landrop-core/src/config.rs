use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory for node state (identity, config)
    pub data_dir: PathBuf,

    /// Directory where received files land
    pub receive_dir: PathBuf,

    /// mDNS service type announced and browsed
    pub service_type: String,

    /// Port of the HTTP control surface
    pub http_port: u16,

    /// Port the transfer receiver listens on; this is what peers see via mDNS
    pub transfer_port: u16,

    /// Fixed chunk size for outbound transfers (64 KiB)
    pub chunk_size: usize,

    pub scan_timeout_secs: u64,
    pub scan_interval_secs: u64,
    pub transfer_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".landrop");
        Self {
            receive_dir: data_dir.join("downloads"),
            data_dir,
            service_type: "_p2pfileshare._tcp.local.".to_string(),
            http_port: 9001,
            transfer_port: 9002,
            chunk_size: 64 * 1024,
            scan_timeout_secs: 5,
            scan_interval_secs: 10,
            transfer_timeout_secs: 300,
        }
    }
}

impl NodeConfig {
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            receive_dir: data_dir.join("downloads"),
            ..Self::default()
        }
    }

    /// Read `config.json` under `data_dir`; a missing or unreadable file
    /// yields the defaults rooted at that directory.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Self>(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "config unreadable, using defaults: {e}");
                    Self::with_data_dir(data_dir)
                }
            },
            Err(_) => Self::with_data_dir(data_dir),
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.receive_dir)?;
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_root_receive_dir_under_data_dir() {
        let temp = TempDir::new().unwrap();
        let cfg = NodeConfig::load_or_default(temp.path());
        assert_eq!(cfg.data_dir, temp.path());
        assert_eq!(cfg.receive_dir, temp.path().join("downloads"));
        assert_eq!(cfg.chunk_size, 65536);
    }

    #[test]
    fn persisted_config_wins_over_defaults() {
        let temp = TempDir::new().unwrap();
        let mut cfg = NodeConfig::with_data_dir(temp.path());
        cfg.http_port = 8080;
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            serde_json::to_string_pretty(&cfg).unwrap(),
        )
        .unwrap();

        let loaded = NodeConfig::load_or_default(temp.path());
        assert_eq!(loaded.http_port, 8080);
    }
}
