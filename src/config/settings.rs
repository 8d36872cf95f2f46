use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NODE_ADDR: &str = "localhost:3000";
pub const DEFAULT_BOOTSTRAP_ADDR: &str = "localhost:3000";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const BOOTSTRAP_NODE_KEY: &str = "BOOTSTRAP_NODE";
const DATA_DIR_KEY: &str = "DATA_DIR";
const READ_TIMEOUT_KEY: &str = "READ_TIMEOUT_SECS";

/// Node settings. Missing TOML keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_address: String,
    pub bootstrap_address: String,
    /// Where the chain is persisted. `None` keeps it in memory only.
    pub data_dir: Option<PathBuf>,
    /// Inbound read timeout. `None` waits forever on a silent peer.
    pub read_timeout_secs: Option<u64>,
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_address: String::from(DEFAULT_NODE_ADDR),
            bootstrap_address: String::from(DEFAULT_BOOTSTRAP_ADDR),
            data_dir: None,
            read_timeout_secs: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied.
    pub fn new() -> Result<Config> {
        let mut config = Config::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `lookup`, which maps an environment key to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node_address = addr;
        }
        if let Some(addr) = lookup(BOOTSTRAP_NODE_KEY) {
            self.bootstrap_address = addr;
        }
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = lookup(READ_TIMEOUT_KEY) {
            let secs = secs.parse::<u64>().map_err(|e| {
                BlockchainError::Config(format!("{READ_TIMEOUT_KEY} must be a number: {e}"))
            })?;
            self.read_timeout_secs = Some(secs);
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn is_bootstrap_node(&self) -> bool {
        self.node_address == self.bootstrap_address
    }

    /// Extract node ID from address (e.g., "localhost:3001" -> "3001")
    pub fn extract_node_id_from_addr(&self) -> String {
        match self.node_address.rsplit_once(':') {
            Some((_, port)) if !port.is_empty() => port.to_string(),
            _ => "default".to_string(),
        }
    }

    /// Per-node database directory, so several nodes can share one data dir.
    pub fn node_db_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("node_{}", self.extract_node_id_from_addr())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.node_address, "localhost:3000");
        assert!(config.is_bootstrap_node());
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.node_db_path(), None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NODE_ADDRESS", "localhost:3001"),
            ("DATA_DIR", "/tmp/chain"),
            ("READ_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert!(!config.is_bootstrap_node());
        assert_eq!(config.extract_node_id_from_addr(), "3001");
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.node_db_path(),
            Some(PathBuf::from("/tmp/chain/node_3001"))
        );
    }

    #[test]
    fn test_bad_timeout_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "READ_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            node_address = "127.0.0.1:4000"
            read_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.node_address, "127.0.0.1:4000");
        assert_eq!(config.bootstrap_address, DEFAULT_BOOTSTRAP_ADDR);
        assert_eq!(config.read_timeout_secs, Some(10));

        assert!(Config::from_toml_str("node_address = 5").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "bootstrap_address = \"10.0.0.1:3000\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.bootstrap_address, "10.0.0.1:3000");

        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(BlockchainError::Config(_))
        ));
    }
}
