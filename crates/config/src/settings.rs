//! Top-level settings, loaded env > file > built-in defaults via the
//! `config` crate, mirroring the layering the rest of the pipeline expects
//! (production never ships with only hardcoded defaults).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeEnvironment::Production)
    }

    /// Staging and production both run with strict schema/idempotency
    /// checks; development tolerates a missing persistence backend.
    pub fn is_strict(&self) -> bool {
        matches!(self, RuntimeEnvironment::Staging | RuntimeEnvironment::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_dlq_suffix")]
    pub dlq_suffix: String,
    #[serde(default = "default_consumer_group_prefix")]
    pub consumer_group_prefix: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
    /// Partition count for every topic on the in-process broker stand-in;
    /// parallelism comes from multiple partitions.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,
}

fn default_dlq_suffix() -> String {
    ".dlq".to_string()
}
fn default_consumer_group_prefix() -> String {
    "call-audit".to_string()
}
fn default_shutdown_drain_secs() -> u64 {
    30
}
fn default_partition_count() -> u32 {
    8
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            dlq_suffix: default_dlq_suffix(),
            consumer_group_prefix: default_consumer_group_prefix(),
            retry: RetryConfig::default(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
            partition_count: default_partition_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Partial-triple TTL: entries older than this are evicted and
    /// reported as a pipeline gap. Default is 2x the expected end-to-end
    /// per-stage latency budget (~60s), i.e. 120s.
    #[serde(default = "default_partial_triple_ttl_secs")]
    pub partial_triple_ttl_secs: u64,
}

fn default_partial_triple_ttl_secs() -> u64 {
    120
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            partial_triple_ttl_secs: default_partial_triple_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_flush_period_secs")]
    pub flush_period_secs: u64,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
}

fn default_flush_period_secs() -> u64 {
    300
}
fn default_dedup_ttl_secs() -> u64 {
    3600
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            flush_period_secs: default_flush_period_secs(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "call_audit".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Path to the scoring weights/thresholds YAML (see [`crate::scoring`]).
    #[serde(default = "default_scoring_config_path")]
    pub scoring_config_path: String,
    /// Path to the alert rules YAML (see [`crate::alerts`]).
    #[serde(default = "default_alert_config_path")]
    pub alert_config_path: String,
    /// Path to the compliance rule set JSON/YAML (see `callaudit_core::rules`).
    #[serde(default = "default_rules_path")]
    pub rules_path: String,
}

fn default_scoring_config_path() -> String {
    "config/scoring.yaml".to_string()
}
fn default_alert_config_path() -> String {
    "config/alerts.yaml".to_string()
}
fn default_rules_path() -> String {
    "config/compliance_rules.yaml".to_string()
}

impl Settings {
    /// Load from `<env>.toml` layered over built-in defaults, then
    /// environment variables prefixed `CALLAUDIT_` (double underscore as
    /// the nesting separator, e.g. `CALLAUDIT_BROKER__DLQ_SUFFIX`).
    pub fn load(env: Option<&str>) -> Result<Self, ConfigError> {
        let env_name = env
            .map(|s| s.to_string())
            .or_else(|| std::env::var("CALL_AUDIT_ENV").ok())
            .unwrap_or_else(|| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?);

        let file_path = format!("config/{}.toml", env_name);
        if Path::new(&file_path).exists() {
            builder = builder.add_source(config::File::with_name(&file_path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CALL_AUDIT")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "broker.retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.aggregator.flush_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.flush_period_secs must be >= 1".to_string(),
            ));
        }
        if self.persistence.enabled && self.persistence.scylla_hosts.is_empty() {
            return Err(ConfigError::Invalid(
                "persistence.enabled requires at least one scylla host".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn production_is_strict() {
        assert!(RuntimeEnvironment::Production.is_strict());
        assert!(!RuntimeEnvironment::Development.is_strict());
    }
}
