//! The canonical event envelope (C1).
//!
//! Every event that crosses a topic boundary is one of these. The envelope
//! is the stable contract; payloads may gain fields over time (readers
//! ignore unknown fields) but the envelope's own fields do not change
//! without a `version` bump.

use crate::error::Error;
use crate::payloads::{CallAudited, CallReceived, CallTranscribed, SentimentAnalyzed, VocAnalyzed};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Discriminant for `EventPayload`, also used to resolve the destination
/// topic (see [`crate::topics::Topic::for_event_type`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CallReceived,
    CallTranscribed,
    SentimentAnalyzed,
    VocAnalyzed,
    CallAudited,
}

/// Tagged union over the five payload shapes. Using a tagged variant here
/// (rather than a payload base class with downcasting) keeps producers and
/// consumers exhaustive-matched at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum EventPayload {
    CallReceived(CallReceived),
    CallTranscribed(CallTranscribed),
    SentimentAnalyzed(SentimentAnalyzed),
    VocAnalyzed(VocAnalyzed),
    CallAudited(CallAudited),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::CallReceived(_) => EventType::CallReceived,
            EventPayload::CallTranscribed(_) => EventType::CallTranscribed,
            EventPayload::SentimentAnalyzed(_) => EventType::SentimentAnalyzed,
            EventPayload::VocAnalyzed(_) => EventType::VocAnalyzed,
            EventPayload::CallAudited(_) => EventType::CallAudited,
        }
    }

    /// The `callId` every payload carries, used as `aggregateId`.
    pub fn call_id(&self) -> &str {
        match self {
            EventPayload::CallReceived(p) => &p.call_id,
            EventPayload::CallTranscribed(p) => &p.call_id,
            EventPayload::SentimentAnalyzed(p) => &p.call_id,
            EventPayload::VocAnalyzed(p) => &p.call_id,
            EventPayload::CallAudited(p) => &p.call_id,
        }
    }
}

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Stamp a brand-new envelope, establishing a fresh correlation id.
    /// Only the ingestion stage (C8) calls this; every other producer
    /// derives its envelope from an input event via [`Self::caused_by`].
    pub fn originate(aggregate_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: "call".to_string(),
            timestamp: chrono::Utc::now(),
            version: CURRENT_SCHEMA_VERSION,
            causation_id: None,
            correlation_id: Uuid::new_v4(),
            metadata: HashMap::new(),
            payload,
        }
    }

    /// Derive a new envelope caused by `self`, inheriting `correlationId`
    /// and stamping `causationId = self.event_id`.
    pub fn caused_by(&self, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: payload.call_id().to_string(),
            aggregate_type: self.aggregate_type.clone(),
            timestamp: chrono::Utc::now(),
            version: CURRENT_SCHEMA_VERSION,
            causation_id: Some(self.event_id),
            correlation_id: self.correlation_id,
            metadata: HashMap::new(),
            payload,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Serialize to the text JSON wire format. Consumer runtimes that
    /// front a real broker (rather than this workspace's in-process
    /// stand-in) deserialize with [`Self::from_json`] as the first step of
    /// the handler protocol.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::EnvelopeParse(e.to_string()))
    }

    /// Parse a raw message body into an envelope. A parse failure is
    /// permanent: the caller routes straight to DLQ rather than retrying.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let envelope: Self = serde_json::from_str(raw).map_err(|e| Error::EnvelopeParse(e.to_string()))?;
        if envelope.version > CURRENT_SCHEMA_VERSION {
            return Err(Error::UnsupportedSchemaVersion {
                found: envelope.version,
                expected: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::CallReceived;

    fn sample_received() -> CallReceived {
        CallReceived {
            call_id: "call-1".into(),
            caller_id: "caller-1".into(),
            agent_id: "agent-1".into(),
            channel: "phone".into(),
            file_handle: "s3://bucket/call-1.wav".into(),
            file_format: "wav".into(),
            file_size_bytes: 1024,
            duration: None,
            start_time: chrono::Utc::now(),
        }
    }

    #[test]
    fn caused_by_inherits_correlation_and_sets_causation() {
        let origin = EventEnvelope::originate("call-1", EventPayload::CallReceived(sample_received()));
        let derived = origin.caused_by(EventPayload::CallReceived(sample_received()));

        assert_eq!(derived.correlation_id, origin.correlation_id);
        assert_eq!(derived.causation_id, Some(origin.event_id));
        assert_ne!(derived.event_id, origin.event_id);
    }

    #[test]
    fn originate_sets_fresh_correlation_id_each_time() {
        let a = EventEnvelope::originate("call-1", EventPayload::CallReceived(sample_received()));
        let b = EventEnvelope::originate("call-2", EventPayload::CallReceived(sample_received()));
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let origin = EventEnvelope::originate("call-1", EventPayload::CallReceived(sample_received()));
        let raw = origin.to_json().unwrap();
        let parsed = EventEnvelope::from_json(&raw).unwrap();
        assert_eq!(parsed.event_id, origin.event_id);
        assert_eq!(parsed.correlation_id, origin.correlation_id);
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = EventEnvelope::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::EnvelopeParse(_)));
    }

    #[test]
    fn from_json_rejects_unsupported_schema_version() {
        let origin = EventEnvelope::originate("call-1", EventPayload::CallReceived(sample_received()));
        let mut raw: serde_json::Value = serde_json::from_str(&origin.to_json().unwrap()).unwrap();
        raw["version"] = serde_json::json!(CURRENT_SCHEMA_VERSION + 1);
        let err = EventEnvelope::from_json(&raw.to_string()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchemaVersion { .. }));
    }
}
