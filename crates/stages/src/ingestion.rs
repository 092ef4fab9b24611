//! The ingestion contract (C8): the entry point that turns a recorded
//! call into the first event on the pipeline. Audio storage is an
//! out-of-scope external collaborator; `AudioBlobStore` is a thin trait
//! standing in for it so the stage has something concrete to depend on.

use std::sync::Arc;

use async_trait::async_trait;
use callaudit_broker::InMemoryBroker;
use callaudit_core::envelope::{EventEnvelope, EventPayload};
use callaudit_core::payloads::CallReceived;
use callaudit_core::topics::Topic;
use dashmap::DashMap;
use tracing::info;

use crate::error::IngestError;

/// Stands in for whatever object store or SAN holds the recorded audio,
/// a collaborator outside the pipeline's scope. The ingestion stage only
/// needs to know a handle exists, not how to retrieve bytes from it.
#[async_trait]
pub trait AudioBlobStore: Send + Sync {
    /// Confirm a file handle resolves to a real blob before the call is
    /// admitted to the pipeline.
    async fn exists(&self, file_handle: &str) -> bool;
}

#[derive(Default)]
pub struct InMemoryAudioBlobStore {
    handles: DashMap<String, ()>,
}

impl InMemoryAudioBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle as present, for tests and for local/dev
    /// deployments that upload straight into this stand-in.
    pub fn put(&self, file_handle: impl Into<String>) {
        self.handles.insert(file_handle.into(), ());
    }
}

#[async_trait]
impl AudioBlobStore for InMemoryAudioBlobStore {
    async fn exists(&self, file_handle: &str) -> bool {
        self.handles.contains_key(file_handle)
    }
}

/// The C8 entry point. Builds a `CallReceived` envelope, originates a
/// fresh correlation id (only ingestion calls `originate`; every other
/// producer derives via `caused_by`), and publishes to `calls.received`
/// keyed by the new `callId`.
pub struct IngestionStage<B: AudioBlobStore> {
    broker: Arc<InMemoryBroker>,
    blobs: Arc<B>,
}

impl<B: AudioBlobStore> IngestionStage<B> {
    pub fn new(broker: Arc<InMemoryBroker>, blobs: Arc<B>) -> Self {
        Self { broker, blobs }
    }

    /// Admit one call recording. Returns the published envelope only
    /// after the broker's publish future has resolved, confirming the
    /// broker has durably accepted it.
    #[allow(clippy::too_many_arguments)]
    pub async fn ingest(
        &self,
        call_id: impl Into<String>,
        caller_id: impl Into<String>,
        agent_id: impl Into<String>,
        channel: impl Into<String>,
        file_handle: impl Into<String>,
        file_format: impl Into<String>,
        file_size_bytes: u64,
        duration: Option<f64>,
        start_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<EventEnvelope, IngestError> {
        let call_id = call_id.into();
        let file_handle = file_handle.into();

        if !self.blobs.exists(&file_handle).await {
            return Err(IngestError::MissingAudio(file_handle));
        }
        if file_size_bytes == 0 {
            return Err(IngestError::EmptyRecording(call_id));
        }

        let payload = CallReceived {
            call_id: call_id.clone(),
            caller_id: caller_id.into(),
            agent_id: agent_id.into(),
            channel: channel.into(),
            file_handle,
            file_format: file_format.into(),
            file_size_bytes,
            duration,
            start_time,
        };

        let envelope = EventEnvelope::originate(call_id.clone(), EventPayload::CallReceived(payload));

        self.broker
            .publish(Topic::CallsReceived, envelope.clone())
            .await
            .map_err(|e| IngestError::Publish(e.to_string()))?;

        info!(call_id = %call_id, "call admitted to pipeline");
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blob_store() -> Arc<InMemoryAudioBlobStore> {
        let store = InMemoryAudioBlobStore::new();
        store.put("s3://bucket/call-1.wav");
        Arc::new(store)
    }

    #[tokio::test]
    async fn ingest_publishes_call_received_with_fresh_correlation_id() {
        let broker = InMemoryBroker::new(4);
        let mut receivers = broker.take_partition_receivers(Topic::CallsReceived);
        let stage = IngestionStage::new(broker.clone(), sample_blob_store());

        let envelope = stage
            .ingest(
                "call-1",
                "caller-1",
                "agent-1",
                "phone",
                "s3://bucket/call-1.wav",
                "wav",
                2048,
                None,
                chrono::Utc::now(),
            )
            .await
            .unwrap();

        assert!(envelope.causation_id.is_none());
        assert_eq!(envelope.aggregate_id, "call-1");

        let mut delivered = false;
        for rx in receivers.iter_mut() {
            if let Ok(msg) = rx.try_recv() {
                assert_eq!(msg.envelope.event_id, envelope.event_id);
                delivered = true;
            }
        }
        assert!(delivered, "call received event must reach a partition");
    }

    #[tokio::test]
    async fn ingest_rejects_unknown_audio_handle() {
        let broker = InMemoryBroker::new(1);
        let stage = IngestionStage::new(broker, sample_blob_store());
        let result = stage
            .ingest(
                "call-2",
                "caller-1",
                "agent-1",
                "phone",
                "s3://bucket/missing.wav",
                "wav",
                2048,
                None,
                chrono::Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(IngestError::MissingAudio(_))));
    }

    #[tokio::test]
    async fn ingest_rejects_empty_recording() {
        let broker = InMemoryBroker::new(1);
        let stage = IngestionStage::new(broker, sample_blob_store());
        let result = stage
            .ingest(
                "call-3",
                "caller-1",
                "agent-1",
                "phone",
                "s3://bucket/call-1.wav",
                "wav",
                0,
                None,
                chrono::Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(IngestError::EmptyRecording(_))));
    }
}
