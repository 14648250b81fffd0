//! Configuration for the bundle submitter
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML file, then environment variables / command line flags
//! (see [`ConfigOverrides`]). [`Config::validate`] must pass before any
//! network client is created.

use crate::relay::SubscriptionConfig;
use crate::tx_builder::{BundleError, Result, TipPlacement, DEFAULT_BUNDLE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Block-engine relay
    #[serde(default)]
    pub relay: RelayConfig,

    /// Ledger RPC
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Wallet configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Bundle shape and cycle deadlines
    #[serde(default)]
    pub bundle: BundleConfig,

    /// Logging and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Block engine base URL (`BLOCK_ENGINE_URL`)
    #[serde(default)]
    pub url: String,

    /// HTTP request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Delay between bundle status polls in milliseconds
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,

    /// Result events buffered before the poller blocks
    #[serde(default = "default_result_channel_capacity")]
    pub result_channel_capacity: usize,

    /// Deadline for tip account discovery, in milliseconds (0 = none)
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger JSON-RPC URL (`RPC_URL`)
    #[serde(default)]
    pub rpc_url: String,

    /// Deadline for fetching the recency anchor, in milliseconds (0 = none)
    #[serde(default = "default_anchor_timeout_ms")]
    pub anchor_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file (`AUTH_KEYPAIR_PATH`)
    #[serde(default)]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Maximum transactions per bundle (`BUNDLE_TRANSACTION_LIMIT`)
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Where the tip goes in the bundle
    #[serde(default)]
    pub tip_placement: TipPlacement,

    /// Notes carried by the payload transactions, one transaction each
    #[serde(default = "default_notes")]
    pub notes: Vec<String>,

    /// Deadline for the `sendBundle` call, in milliseconds (0 = none)
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// How long to keep observing results after submission, in milliseconds
    /// (0 = until interrupted)
    #[serde(default = "default_result_timeout_ms")]
    pub result_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Serve Prometheus metrics on this port
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,
}

// Default value functions
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_status_poll_interval_ms() -> u64 { 1_000 }
fn default_result_channel_capacity() -> usize { 64 }
fn default_anchor_timeout_ms() -> u64 { 10_000 }
fn default_discovery_timeout_ms() -> u64 { 10_000 }
fn default_capacity() -> usize { DEFAULT_BUNDLE_CAPACITY }
fn default_notes() -> Vec<String> { vec!["bundle note 1".to_string(), "bundle note 2".to_string()] }
fn default_submit_timeout_ms() -> u64 { 10_000 }
fn default_result_timeout_ms() -> u64 { 60_000 }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
            result_channel_capacity: default_result_channel_capacity(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            anchor_timeout_ms: default_anchor_timeout_ms(),
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            tip_placement: TipPlacement::default(),
            notes: default_notes(),
            submit_timeout_ms: default_submit_timeout_ms(),
            result_timeout_ms: default_result_timeout_ms(),
        }
    }
}

/// Values supplied by the environment or the command line
///
/// Every `Some` replaces the corresponding file/default value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub relay_url: Option<String>,
    pub rpc_url: Option<String>,
    pub keypair_path: Option<String>,
    pub capacity: Option<usize>,
    pub tip_placement: Option<TipPlacement>,
    pub notes: Option<Vec<String>>,
    pub metrics_port: Option<u16>,
    pub log_json: bool,
}

/// Zero means "no deadline"
fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BundleError::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            BundleError::config(format!("failed to parse config {}: {}", path.display(), e))
        })
    }

    /// Apply environment / command line values on top of this configuration
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(url) = overrides.relay_url {
            self.relay.url = url;
        }
        if let Some(url) = overrides.rpc_url {
            self.ledger.rpc_url = url;
        }
        if let Some(path) = overrides.keypair_path {
            self.wallet.keypair_path = path;
        }
        if let Some(capacity) = overrides.capacity {
            self.bundle.capacity = capacity;
        }
        if let Some(placement) = overrides.tip_placement {
            self.bundle.tip_placement = placement;
        }
        if let Some(notes) = overrides.notes.filter(|n| !n.is_empty()) {
            self.bundle.notes = notes;
        }
        if overrides.metrics_port.is_some() {
            self.monitoring.metrics_port = overrides.metrics_port;
        }
        self.monitoring.log_json |= overrides.log_json;
        self
    }

    /// Check every value needed before touching the network
    pub fn validate(&self) -> Result<()> {
        validate_url("relay URL (BLOCK_ENGINE_URL)", &self.relay.url)?;
        validate_url("ledger RPC URL (RPC_URL)", &self.ledger.rpc_url)?;

        if self.wallet.keypair_path.trim().is_empty() {
            return Err(BundleError::config("keypair path (AUTH_KEYPAIR_PATH) is not set"));
        }
        if self.bundle.capacity == 0 {
            return Err(BundleError::config(
                "bundle capacity (BUNDLE_TRANSACTION_LIMIT) must be a positive integer",
            ));
        }
        if self.bundle.notes.is_empty() {
            return Err(BundleError::config("at least one payload note is required"));
        }
        if self.relay.status_poll_interval_ms == 0 {
            return Err(BundleError::config("status poll interval must be positive"));
        }
        if self.relay.result_channel_capacity == 0 {
            return Err(BundleError::config("result channel capacity must be positive"));
        }
        if self.relay.request_timeout_ms == 0 {
            return Err(BundleError::config("relay request timeout must be positive"));
        }
        Ok(())
    }

    pub fn subscription(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            poll_interval: Duration::from_millis(self.relay.status_poll_interval_ms),
            channel_capacity: self.relay.result_channel_capacity,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.request_timeout_ms)
    }

    pub fn anchor_timeout(&self) -> Option<Duration> {
        optional_millis(self.ledger.anchor_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        optional_millis(self.relay.discovery_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Option<Duration> {
        optional_millis(self.bundle.submit_timeout_ms)
    }

    pub fn result_timeout(&self) -> Option<Duration> {
        optional_millis(self.bundle.result_timeout_ms)
    }
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BundleError::config(format!("{} is not set", name)));
    }
    let url = reqwest::Url::parse(value)
        .map_err(|e| BundleError::config(format!("{} '{}' is invalid: {}", name, value, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BundleError::config(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> Config {
        Config::default().with_overrides(ConfigOverrides {
            relay_url: Some("https://relay.example.com".to_string()),
            rpc_url: Some("https://rpc.example.com".to_string()),
            keypair_path: Some("/tmp/id.json".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.bundle.capacity, 5);
        assert_eq!(config.bundle.tip_placement, TipPlacement::Last);
        assert_eq!(config.bundle.notes.len(), 2);
        assert_eq!(config.anchor_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_defaults_fail_validation_without_endpoints() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, BundleError::Configuration(_)));
        assert!(err.to_string().contains("BLOCK_ENGINE_URL"));
    }

    #[test]
    fn test_overrides_produce_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = valid_config();
        config.bundle.capacity = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("BUNDLE_TRANSACTION_LIMIT"));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let mut config = valid_config();
        config.ledger.rpc_url = "ftp://rpc.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_keypair_path_rejected() {
        let mut config = valid_config();
        config.wallet.keypair_path = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_mean_no_deadline() {
        let mut config = valid_config();
        config.bundle.result_timeout_ms = 0;
        config.bundle.submit_timeout_ms = 0;
        config.relay.discovery_timeout_ms = 0;
        assert_eq!(config.result_timeout(), None);
        assert_eq!(config.submit_timeout(), None);
        assert_eq!(config.discovery_timeout(), None);
    }

    #[test]
    fn test_toml_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[relay]
url = "https://file-relay.example.com"
status_poll_interval_ms = 250

[ledger]
rpc_url = "https://file-rpc.example.com"

[wallet]
keypair_path = "/keys/id.json"

[bundle]
capacity = 3
tip_placement = "first"
notes = ["alpha"]
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap().with_overrides(ConfigOverrides {
            relay_url: Some("https://cli-relay.example.com".to_string()),
            ..Default::default()
        });

        assert_eq!(config.relay.url, "https://cli-relay.example.com");
        assert_eq!(config.ledger.rpc_url, "https://file-rpc.example.com");
        assert_eq!(config.relay.status_poll_interval_ms, 250);
        assert_eq!(config.relay.request_timeout_ms, 10_000);
        assert_eq!(config.discovery_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.bundle.capacity, 3);
        assert_eq!(config.bundle.tip_placement, TipPlacement::First);
        assert_eq!(config.bundle.notes, vec!["alpha".to_string()]);
        assert!(config.validate().is_ok());
    }
}
