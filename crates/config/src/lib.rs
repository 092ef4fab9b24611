//! Layered configuration for the call quality pipeline.
//!
//! [`Settings`] covers the ambient runtime configuration (environment,
//! broker retry/backoff, correlator TTL, aggregator flush period,
//! persistence backend selection). [`scoring`], [`alerts`] and [`rules`]
//! cover the domain-tunable parts: scoring weights and thresholds, alert
//! thresholds, and the compliance rule set.

pub mod alerts;
pub mod error;
pub mod rules;
pub mod scoring;
pub mod settings;

pub use alerts::AlertConfig;
pub use error::ConfigError;
pub use scoring::ScoringConfig;
pub use settings::{
    AggregatorConfig, BrokerConfig, CorrelatorConfig, PersistenceConfig, RetryConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};
