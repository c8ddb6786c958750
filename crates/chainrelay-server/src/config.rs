//! Server configuration, loaded from YAML.
//!
//! ```yaml
//! listen_addr: "0.0.0.0:8000"
//! rpc:
//!   url: "https://ropsten.example.org/v3/KEY"
//! contract:
//!   address: "0x86D219D65452b013912B2af7b2E65E903fa3777d"
//!   abi_path: "crowdfunding.abi.json"
//! archive:
//!   path: "chainrelay.db"
//! relay:
//!   flush_window_seconds: 300
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use chainrelay_core::RelayConfig;

use crate::tracing_setup::LogConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// JSON-RPC endpoint of the chain node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// The contract whose events are relayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    /// JSON ABI file. Relative paths resolve against the config file's directory.
    pub abi_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// SQLite file path or `sqlite:` URL.
    #[serde(default = "default_archive_path")]
    pub path: String,
}

fn default_archive_path() -> String {
    "chainrelay.db".into()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: default_archive_path(),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub rpc: RpcConfig,
    pub contract: ContractConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".into()
}

impl ServerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from a YAML file and resolve the ABI path against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&yaml)?;
        if config.contract.abi_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.contract.abi_path = dir.join(&config.contract.abi_path);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("listen_addr '{}': {e}", self.listen_addr)))?;

        let rpc = url::Url::parse(&self.rpc.url)
            .map_err(|e| ConfigError::Invalid(format!("rpc.url '{}': {e}", self.rpc.url)))?;
        if !matches!(rpc.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "rpc.url must be http(s), got '{}'",
                rpc.scheme()
            )));
        }
        if self.rpc.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("rpc.request_timeout_seconds must be > 0".into()));
        }

        if !is_address(&self.contract.address) {
            return Err(ConfigError::Invalid(format!(
                "contract.address '{}' is not a 20-byte hex address",
                self.contract.address
            )));
        }

        self.relay
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .map_or(false, |hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
rpc:
  url: "http://localhost:8545"
contract:
  address: "0x86D219D65452b013912B2af7b2E65E903fa3777d"
  abi_path: "crowdfunding.abi.json"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = ServerConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8000");
        assert_eq!(cfg.rpc.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.archive.path, "chainrelay.db");
        assert_eq!(cfg.relay.flush_window_seconds, 300);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn relay_section_overrides() {
        let yaml = format!(
            "{MINIMAL}relay:\n  flush_window_seconds: 60\n  tracked_event_kinds: [Refund, Transfer]\n"
        );
        let cfg = ServerConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(cfg.relay.flush_window_seconds, 60);
        assert_eq!(cfg.relay.tracked_event_kinds.len(), 2);
        assert_eq!(cfg.relay.per_kind_poll_delay_seconds, 3);
    }

    #[test]
    fn rejects_bad_address_and_url() {
        let mut cfg = ServerConfig::from_yaml_str(MINIMAL).unwrap();
        cfg.contract.address = "0x1234".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = ServerConfig::from_yaml_str(MINIMAL).unwrap();
        cfg.rpc.url = "ws://localhost:8546".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ServerConfig::from_yaml_str(MINIMAL).unwrap();
        cfg.rpc.url = "not a url".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn relay_validation_is_applied() {
        let mut cfg = ServerConfig::from_yaml_str(MINIMAL).unwrap();
        cfg.relay.flush_window_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_contract_is_a_parse_error() {
        let err = ServerConfig::from_yaml_str("rpc:\n  url: http://x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_resolves_abi_path_next_to_config() {
        let dir = std::env::temp_dir().join(format!("chainrelay-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("relay.yaml");
        std::fs::write(&path, MINIMAL).unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.contract.abi_path, dir.join("crowdfunding.abi.json"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn shipped_example_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/relay.example.yaml");
        let cfg = ServerConfig::load(&path).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.relay.tracked_event_kinds.len(), 6);
        assert!(cfg.contract.abi_path.ends_with("crowdfunding.abi.json"));
        assert!(cfg.contract.abi_path.exists());
        assert_eq!(cfg.log.components.get("chainrelay-evm").map(String::as_str), Some("info"));
    }
}
