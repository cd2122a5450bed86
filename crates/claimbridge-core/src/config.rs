//! Configuration for the bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Pending-ticket poller
    #[serde(default)]
    pub poller: PollerConfig,

    /// Facade argument validation
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging configuration (consumed by the host binary)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `CLAIMBRIDGE_*` environment variables (`__` separates sections).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&BridgeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CLAIMBRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// Pending-ticket poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Run the poller at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Period between sweeps in milliseconds
    #[serde(default = "default_check_period")]
    pub check_period_ms: u64,

    /// Maximum probes in flight during one sweep
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl PollerConfig {
    pub fn check_period(&self) -> Duration {
        Duration::from_millis(self.check_period_ms.max(1))
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_period_ms: default_check_period(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

/// Facade argument limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum length of claim request data
    #[serde(default = "default_max_claim_data_len")]
    pub max_claim_data_len: usize,

    /// Maximum length of an identity alias
    #[serde(default = "default_max_alias_len")]
    pub max_alias_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_claim_data_len: default_max_claim_data_len(),
            max_alias_len: default_max_alias_len(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_check_period() -> u64 {
    10_000
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_max_claim_data_len() -> usize {
    16
}

fn default_max_alias_len() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}
