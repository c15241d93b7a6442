//! Centralized console configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables, e.g. `API__BASE_URL`, `HEALTH__MAX_FAILURES`.

use amber_relay_channel::HealthConfig;
use serde::Deserialize;
use std::time::Duration;

/// Console configuration composed from section configs.
#[derive(Debug, Deserialize)]
pub struct ConsoleConfig {
    /// Backend API settings.
    #[serde(default)]
    pub api: ApiSettings,

    /// Channel health polling settings.
    #[serde(default)]
    pub health: HealthSettings,

    /// Whether the variables/tools catalog loads at all.
    #[serde(default = "default_catalog_enabled")]
    pub catalog_enabled: bool,

    /// Ask the health endpoint for delivery metrics.
    #[serde(default)]
    pub include_metrics: bool,

    /// Whether the live log stream connects at all.
    #[serde(default = "default_log_stream_enabled")]
    pub log_stream_enabled: bool,
}

/// Backend endpoint and actor identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Console backend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value for the `X-Actor-Id` header; empty skips the header.
    #[serde(default)]
    pub actor_id: String,

    /// Value for the `X-Actor-Roles` header, comma-separated.
    #[serde(default)]
    pub actor_roles: String,

    /// Value for the `X-Tenant-Id` header.
    #[serde(default)]
    pub tenant_id: String,
}

/// Health polling cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Consecutive failures before polling pauses.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_base_interval_ms() -> u64 {
    30_000
}

fn default_max_interval_ms() -> u64 {
    120_000
}

fn default_max_failures() -> u32 {
    3
}

fn default_catalog_enabled() -> bool {
    true
}

fn default_log_stream_enabled() -> bool {
    true
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            actor_id: String::new(),
            actor_roles: String::new(),
            tenant_id: String::new(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_failures: default_max_failures(),
        }
    }
}

impl HealthSettings {
    /// Converts the settings into the scheduler's config.
    #[must_use]
    pub fn to_health_config(&self) -> HealthConfig {
        HealthConfig {
            base_interval: Duration::from_millis(self.base_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_failures: self.max_failures,
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
