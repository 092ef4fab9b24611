//! Projection stores for the call quality read models (C3, C5, C6, C7
//! outputs). Every store has a ScyllaDB-backed implementation and an
//! in-memory implementation used by tests and by development environments
//! that run with `persistence.enabled = false`.

pub mod agent_performance;
pub mod audit;
pub mod client;
pub mod error;
pub mod notifications;
pub mod schema;
pub mod sentiments;
pub mod transcriptions;
pub mod voc;

pub use agent_performance::{
    AgentPerformanceStore, BucketObservation, InMemoryAgentPerformanceStore,
    ScyllaAgentPerformanceStore,
};
pub use audit::{AuditStore, InMemoryAuditStore, ScyllaAuditStore};
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use notifications::{InMemoryNotificationStore, NotificationStore, ScyllaNotificationStore};
pub use sentiments::{InMemorySentimentStore, ScyllaSentimentStore, SentimentStore};
pub use transcriptions::{InMemoryTranscriptionStore, ScyllaTranscriptionStore, TranscriptionStore};
pub use voc::{InMemoryVocStore, ScyllaVocStore, VocStore};
