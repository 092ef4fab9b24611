//! Persistence backend selection.
//!
//! Every stage handler is generic over its store trait so it can run
//! against either the in-memory or the ScyllaDB-backed implementation.
//! The backend is chosen once at startup from `persistence.enabled`
//! (with fallback to in-memory on connection failure, see `main.rs`), so
//! each store here is a thin enum dispatching to whichever concrete
//! implementation was constructed, rather than every downstream type
//! needing its own `enabled`-branch.

use async_trait::async_trait;
use callaudit_core::readmodel::{
    AgentPerformance, AuditResult, Notification, SentimentResult, Transcription, VocInsight,
};
use callaudit_persistence::{
    AgentPerformanceStore, AuditStore, BucketObservation, InMemoryAgentPerformanceStore,
    InMemoryAuditStore, InMemoryNotificationStore, InMemorySentimentStore,
    InMemoryTranscriptionStore, InMemoryVocStore, NotificationStore, PersistenceError,
    ScyllaAgentPerformanceStore, ScyllaAuditStore, ScyllaNotificationStore, ScyllaSentimentStore,
    ScyllaTranscriptionStore, ScyllaVocStore, SentimentStore, TranscriptionStore, VocStore,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub enum TranscriptionBackend {
    InMemory(InMemoryTranscriptionStore),
    Scylla(ScyllaTranscriptionStore),
}

#[async_trait]
impl TranscriptionStore for TranscriptionBackend {
    async fn create_if_absent(&self, transcription: Transcription) -> Result<bool, PersistenceError> {
        match self {
            Self::InMemory(s) => s.create_if_absent(transcription).await,
            Self::Scylla(s) => s.create_if_absent(transcription).await,
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<Transcription>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.get(call_id).await,
            Self::Scylla(s) => s.get(call_id).await,
        }
    }
}

pub enum SentimentBackend {
    InMemory(InMemorySentimentStore),
    Scylla(ScyllaSentimentStore),
}

#[async_trait]
impl SentimentStore for SentimentBackend {
    async fn create_if_absent(&self, sentiment: SentimentResult) -> Result<bool, PersistenceError> {
        match self {
            Self::InMemory(s) => s.create_if_absent(sentiment).await,
            Self::Scylla(s) => s.create_if_absent(sentiment).await,
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<SentimentResult>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.get(call_id).await,
            Self::Scylla(s) => s.get(call_id).await,
        }
    }
}

pub enum VocBackend {
    InMemory(InMemoryVocStore),
    Scylla(ScyllaVocStore),
}

#[async_trait]
impl VocStore for VocBackend {
    async fn create_if_absent(&self, insight: VocInsight) -> Result<bool, PersistenceError> {
        match self {
            Self::InMemory(s) => s.create_if_absent(insight).await,
            Self::Scylla(s) => s.create_if_absent(insight).await,
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<VocInsight>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.get(call_id).await,
            Self::Scylla(s) => s.get(call_id).await,
        }
    }
}

pub enum AuditBackend {
    InMemory(InMemoryAuditStore),
    Scylla(ScyllaAuditStore),
}

#[async_trait]
impl AuditStore for AuditBackend {
    async fn create_if_absent(&self, result: AuditResult) -> Result<bool, PersistenceError> {
        match self {
            Self::InMemory(s) => s.create_if_absent(result).await,
            Self::Scylla(s) => s.create_if_absent(result).await,
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<AuditResult>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.get(call_id).await,
            Self::Scylla(s) => s.get(call_id).await,
        }
    }
}

pub enum AgentPerformanceBackend {
    InMemory(InMemoryAgentPerformanceStore),
    Scylla(ScyllaAgentPerformanceStore),
}

#[async_trait]
impl AgentPerformanceStore for AgentPerformanceBackend {
    async fn merge_observation(
        &self,
        agent_id: &str,
        hour_slot: DateTime<Utc>,
        observation: BucketObservation,
    ) -> Result<AgentPerformance, PersistenceError> {
        match self {
            Self::InMemory(s) => s.merge_observation(agent_id, hour_slot, observation).await,
            Self::Scylla(s) => s.merge_observation(agent_id, hour_slot, observation).await,
        }
    }

    async fn get(&self, agent_id: &str, hour_slot: DateTime<Utc>) -> Result<Option<AgentPerformance>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.get(agent_id, hour_slot).await,
            Self::Scylla(s) => s.get(agent_id, hour_slot).await,
        }
    }
}

pub enum NotificationBackend {
    InMemory(InMemoryNotificationStore),
    Scylla(ScyllaNotificationStore),
}

#[async_trait]
impl NotificationStore for NotificationBackend {
    async fn create(&self, notification: Notification) -> Result<(), PersistenceError> {
        match self {
            Self::InMemory(s) => s.create(notification).await,
            Self::Scylla(s) => s.create(notification).await,
        }
    }

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.get(notification_id).await,
            Self::Scylla(s) => s.get(notification_id).await,
        }
    }

    async fn list_for_call(&self, call_id: &str) -> Result<Vec<Notification>, PersistenceError> {
        match self {
            Self::InMemory(s) => s.list_for_call(call_id).await,
            Self::Scylla(s) => s.list_for_call(call_id).await,
        }
    }

    async fn update(&self, notification: Notification) -> Result<(), PersistenceError> {
        match self {
            Self::InMemory(s) => s.update(notification).await,
            Self::Scylla(s) => s.update(notification).await,
        }
    }
}

/// Every read-model store, wired to the same backend decision. Built
/// once in `main.rs` from a single `ScyllaClient` (or omitted entirely
/// for the in-memory path).
pub struct Stores {
    pub transcriptions: TranscriptionBackend,
    pub sentiments: SentimentBackend,
    pub voc: VocBackend,
    pub audit: AuditBackend,
    pub agent_performance: AgentPerformanceBackend,
    pub notifications: NotificationBackend,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            transcriptions: TranscriptionBackend::InMemory(InMemoryTranscriptionStore::new()),
            sentiments: SentimentBackend::InMemory(InMemorySentimentStore::new()),
            voc: VocBackend::InMemory(InMemoryVocStore::new()),
            audit: AuditBackend::InMemory(InMemoryAuditStore::new()),
            agent_performance: AgentPerformanceBackend::InMemory(InMemoryAgentPerformanceStore::new()),
            notifications: NotificationBackend::InMemory(InMemoryNotificationStore::new()),
        }
    }

    pub fn scylla(client: &callaudit_persistence::ScyllaClient) -> Self {
        Self {
            transcriptions: TranscriptionBackend::Scylla(ScyllaTranscriptionStore::new(client.clone())),
            sentiments: SentimentBackend::Scylla(ScyllaSentimentStore::new(client.clone())),
            voc: VocBackend::Scylla(ScyllaVocStore::new(client.clone())),
            audit: AuditBackend::Scylla(ScyllaAuditStore::new(client.clone())),
            agent_performance: AgentPerformanceBackend::Scylla(ScyllaAgentPerformanceStore::new(client.clone())),
            notifications: NotificationBackend::Scylla(ScyllaNotificationStore::new(client.clone())),
        }
    }
}
