//! Sources of stable machine characteristics

use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;

/// Pluggable source of the characteristics an identity is derived from
pub trait FingerprintSource: Send + Sync {
    /// Stable components describing this machine, in a fixed order
    fn components(&self) -> Result<Vec<String>>;
}

/// Default source: machine id, hostname, OS and architecture
#[derive(Debug, Clone)]
pub struct HostFingerprintSource {
    machine_id_paths: Vec<PathBuf>,
}

impl Default for HostFingerprintSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFingerprintSource {
    pub fn new() -> Self {
        Self {
            machine_id_paths: vec![
                PathBuf::from("/etc/machine-id"),
                PathBuf::from("/var/lib/dbus/machine-id"),
            ],
        }
    }

    /// Read the machine id from custom locations instead of the system ones
    pub fn with_machine_id_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            machine_id_paths: paths,
        }
    }

    fn machine_id(&self) -> Option<String> {
        self.machine_id_paths.iter().find_map(|path| {
            fs::read_to_string(path)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
    }
}

impl FingerprintSource for HostFingerprintSource {
    fn components(&self) -> Result<Vec<String>> {
        let machine_id = self.machine_id();
        let hostname = gethostname::gethostname().to_string_lossy().trim().to_string();

        if machine_id.is_none() && hostname.is_empty() {
            return Err(Error::Other(
                "no machine id or hostname available".to_string(),
            ));
        }

        Ok(vec![
            machine_id.unwrap_or_default(),
            hostname,
            std::env::consts::OS.to_string(),
            std::env::consts::ARCH.to_string(),
        ])
    }
}

/// Fixed components, for pinned deployments
#[derive(Debug, Clone)]
pub struct StaticFingerprintSource(pub Vec<String>);

impl FingerprintSource for StaticFingerprintSource {
    fn components(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
