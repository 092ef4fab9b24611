//! Transcription projection (C3): once-per-call, written by the
//! `CallTranscribed` projector.

use async_trait::async_trait;
use callaudit_core::readmodel::Transcription;
use dashmap::DashMap;
use tracing::info;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait TranscriptionStore: Send + Sync {
    /// Insert `transcription` only if no row exists yet for its `call_id`.
    /// Returns `true` if this call actually inserted a new row, `false` if
    /// a row already existed (replay, handled as a clean no-op by the
    /// caller).
    async fn create_if_absent(&self, transcription: Transcription) -> Result<bool, PersistenceError>;

    async fn get(&self, call_id: &str) -> Result<Option<Transcription>, PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryTranscriptionStore {
    rows: DashMap<String, Transcription>,
}

impl InMemoryTranscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptionStore for InMemoryTranscriptionStore {
    async fn create_if_absent(&self, transcription: Transcription) -> Result<bool, PersistenceError> {
        use dashmap::mapref::entry::Entry;
        match self.rows.entry(transcription.call_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(transcription);
                Ok(true)
            }
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<Transcription>, PersistenceError> {
        Ok(self.rows.get(call_id).map(|r| r.clone()))
    }
}

pub struct ScyllaTranscriptionStore {
    client: ScyllaClient,
}

impl ScyllaTranscriptionStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriptionStore for ScyllaTranscriptionStore {
    async fn create_if_absent(&self, transcription: Transcription) -> Result<bool, PersistenceError> {
        if self.get(&transcription.call_id).await?.is_some() {
            info!(call_id = %transcription.call_id, "transcription already processed, skipping");
            return Ok(false);
        }

        let segments_json = serde_json::to_string(&transcription.segments)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let query = format!(
            "INSERT INTO {}.transcriptions (call_id, full_text, language, confidence, word_count, segments_json, created_at) VALUES (?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &transcription.call_id,
                    &transcription.full_text,
                    &transcription.language,
                    transcription.confidence,
                    transcription.word_count as i32,
                    segments_json,
                    transcription.created_at,
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        info!(call_id = %transcription.call_id, "transcription persisted");
        Ok(true)
    }

    async fn get(&self, call_id: &str) -> Result<Option<Transcription>, PersistenceError> {
        let query = format!(
            "SELECT call_id, full_text, language, confidence, word_count, segments_json, created_at FROM {}.transcriptions WHERE call_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (call_id,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let rows = result.into_rows_result().map_err(|e| PersistenceError::Query(e.to_string()))?;
        for row in rows.rows::<(String, String, String, f64, i32, String, chrono::DateTime<chrono::Utc>)>()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?
        {
            let (call_id, full_text, language, confidence, word_count, segments_json, created_at) =
                row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            let segments = serde_json::from_str(&segments_json)
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            return Ok(Some(Transcription {
                call_id,
                full_text,
                language,
                confidence,
                word_count: word_count as u32,
                segments,
                created_at,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(call_id: &str) -> Transcription {
        Transcription {
            call_id: call_id.to_string(),
            full_text: "hello world".into(),
            language: "en".into(),
            confidence: 0.95,
            word_count: 2,
            segments: vec![],
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let store = InMemoryTranscriptionStore::new();
        assert!(store.create_if_absent(sample("c1")).await.unwrap());
        for _ in 0..4 {
            assert!(!store.create_if_absent(sample("c1")).await.unwrap());
        }
        assert_eq!(store.get("c1").await.unwrap().unwrap().call_id, "c1");
    }
}
