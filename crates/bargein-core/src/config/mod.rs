//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "BARGEIN_CONFIG_DIR";

/// Bargein configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub interrupt: InterruptConfig,
    pub sweep: SweepConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Ceiling on sessions that are Active or Interrupting
    pub max_sessions: usize,
    pub heartbeat_timeout_secs: u64,
    /// How many terminal sessions are kept for lookups
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Per-module acknowledgment bound
    pub ack_timeout_ms: u64,
    pub max_observers: usize,
    /// Consecutive timeouts before a module is skipped
    pub unhealthy_after: u32,
    pub reprobe_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub store: IdentityStoreKind,
}

/// Backend used to persist the client identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl IdentityStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Keyring => "keyring",
            Self::Memory => "memory",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" => Some(Self::File),
            "keyring" => Some(Self::Keyring),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            heartbeat_timeout_secs: 30,
            history_limit: 256,
        }
    }
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5_000,
            max_observers: 32,
            unhealthy_after: 3,
            reprobe_interval_secs: 60,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

const KEYS: [&str; 9] = [
    "registry.max_sessions",
    "registry.heartbeat_timeout_secs",
    "registry.history_limit",
    "interrupt.ack_timeout_ms",
    "interrupt.max_observers",
    "interrupt.unhealthy_after",
    "interrupt.reprobe_interval_secs",
    "sweep.interval_secs",
    "identity.store",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("bargein")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.registry.max_sessions == 0 {
            return Err(anyhow!("registry.max_sessions must be at least 1"));
        }
        if self.registry.heartbeat_timeout_secs == 0 {
            return Err(anyhow!("registry.heartbeat_timeout_secs must be at least 1"));
        }
        if self.interrupt.ack_timeout_ms == 0 {
            return Err(anyhow!("interrupt.ack_timeout_ms must be at least 1"));
        }
        if self.interrupt.unhealthy_after == 0 {
            return Err(anyhow!("interrupt.unhealthy_after must be at least 1"));
        }
        if self.interrupt.reprobe_interval_secs == 0 {
            return Err(anyhow!("interrupt.reprobe_interval_secs must be at least 1"));
        }
        if self.sweep.interval_secs == 0 {
            return Err(anyhow!("sweep.interval_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.heartbeat_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.interrupt.ack_timeout_ms)
    }

    pub fn reprobe_interval(&self) -> Duration {
        Duration::from_secs(self.interrupt.reprobe_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "registry.max_sessions" => Ok(self.registry.max_sessions.to_string()),
            "registry.heartbeat_timeout_secs" => Ok(self.registry.heartbeat_timeout_secs.to_string()),
            "registry.history_limit" => Ok(self.registry.history_limit.to_string()),
            "interrupt.ack_timeout_ms" => Ok(self.interrupt.ack_timeout_ms.to_string()),
            "interrupt.max_observers" => Ok(self.interrupt.max_observers.to_string()),
            "interrupt.unhealthy_after" => Ok(self.interrupt.unhealthy_after.to_string()),
            "interrupt.reprobe_interval_secs" => Ok(self.interrupt.reprobe_interval_secs.to_string()),
            "sweep.interval_secs" => Ok(self.sweep.interval_secs.to_string()),
            "identity.store" => Ok(self.identity.store.to_string()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `bargein config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "registry.max_sessions" => {
                self.registry.max_sessions = parse_positive(key, value)?;
            }
            "registry.heartbeat_timeout_secs" => {
                self.registry.heartbeat_timeout_secs = parse_positive(key, value)?;
            }
            "registry.history_limit" => {
                self.registry.history_limit = value
                    .parse()
                    .with_context(|| format!("Invalid history_limit value: {}", value))?;
            }
            "interrupt.ack_timeout_ms" => {
                self.interrupt.ack_timeout_ms = parse_positive(key, value)?;
            }
            "interrupt.max_observers" => {
                self.interrupt.max_observers = value
                    .parse()
                    .with_context(|| format!("Invalid max_observers value: {}", value))?;
            }
            "interrupt.unhealthy_after" => {
                self.interrupt.unhealthy_after = parse_positive(key, value)?;
            }
            "interrupt.reprobe_interval_secs" => {
                self.interrupt.reprobe_interval_secs = parse_positive(key, value)?;
            }
            "sweep.interval_secs" => {
                self.sweep.interval_secs = parse_positive(key, value)?;
            }
            "identity.store" => {
                self.identity.store = IdentityStoreKind::from_str(value).ok_or_else(|| {
                    anyhow!(
                        "Invalid identity store: {}. Valid options: file, keyring, memory",
                        value
                    )
                })?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `bargein config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn parse_positive<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parsed: T = value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    if parsed == T::default() {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.registry.max_sessions, 64);
        assert_eq!(config.registry.heartbeat_timeout_secs, 30);
        assert_eq!(config.interrupt.ack_timeout_ms, 5_000);
        assert_eq!(config.sweep.interval_secs, 5);
        assert_eq!(config.identity.store, IdentityStoreKind::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config::default();
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.reprobe_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("registry.max_sessions", "3").expect("set failed");
        config.set("identity.store", "keyring").expect("set failed");

        assert_eq!(config.get("registry.max_sessions").unwrap(), "3");
        assert_eq!(config.get("identity.store").unwrap(), "keyring");
    }

    #[test]
    fn test_set_rejects_zero_and_garbage() {
        let mut config = Config::default();
        assert!(config.set("registry.max_sessions", "0").is_err());
        assert!(config.set("interrupt.ack_timeout_ms", "soon").is_err());
        assert!(config.set("identity.store", "floppy").is_err());
        assert!(config.set("nope.key", "1").is_err());
        assert!(config.set("interrupt.reprobe_interval_secs", "0").is_err());
        assert_eq!(config.registry.max_sessions, 64);
        assert_eq!(config.interrupt.reprobe_interval_secs, 60);
    }

    #[test]
    fn test_list_covers_all_keys() {
        let config = Config::default();
        let listed = config.list().expect("list failed");
        assert_eq!(listed.len(), KEYS.len());
        assert!(listed.iter().any(|(k, v)| k == "sweep.interval_secs" && v == "5"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("interrupt.ack_timeout_ms", "250").unwrap();
        config.save_to(&path).expect("save failed");

        let loaded = Config::load_from(&path).expect("load failed");
        assert_eq!(loaded.interrupt.ack_timeout_ms, 250);
        assert_eq!(loaded.registry.max_sessions, 64);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let loaded = Config::load_from(&temp.path().join("absent.toml")).expect("load failed");
        assert_eq!(loaded.sweep.interval_secs, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[registry]\nmax_sessions = 3\n").unwrap();

        let loaded = Config::load_from(&path).expect("load failed");
        assert_eq!(loaded.registry.max_sessions, 3);
        assert_eq!(loaded.registry.heartbeat_timeout_secs, 30);
        assert_eq!(loaded.interrupt.unhealthy_after, 3);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[sweep]\ninterval_secs = 0\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_reprobe_interval() {
        let mut config = Config::default();
        config.interrupt.reprobe_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
