//! Sentiment projection (C3): once-per-call, written by the
//! `SentimentAnalyzed` projector.

use async_trait::async_trait;
use callaudit_core::readmodel::SentimentResult;
use dashmap::DashMap;
use tracing::info;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait SentimentStore: Send + Sync {
    async fn create_if_absent(&self, sentiment: SentimentResult) -> Result<bool, PersistenceError>;
    async fn get(&self, call_id: &str) -> Result<Option<SentimentResult>, PersistenceError>;
}

#[derive(Default)]
pub struct InMemorySentimentStore {
    rows: DashMap<String, SentimentResult>,
}

impl InMemorySentimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SentimentStore for InMemorySentimentStore {
    async fn create_if_absent(&self, sentiment: SentimentResult) -> Result<bool, PersistenceError> {
        use dashmap::mapref::entry::Entry;
        match self.rows.entry(sentiment.call_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(sentiment);
                Ok(true)
            }
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<SentimentResult>, PersistenceError> {
        Ok(self.rows.get(call_id).map(|r| r.clone()))
    }
}

pub struct ScyllaSentimentStore {
    client: ScyllaClient,
}

impl ScyllaSentimentStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SentimentStore for ScyllaSentimentStore {
    async fn create_if_absent(&self, sentiment: SentimentResult) -> Result<bool, PersistenceError> {
        if self.get(&sentiment.call_id).await?.is_some() {
            info!(call_id = %sentiment.call_id, "sentiment already processed, skipping");
            return Ok(false);
        }

        let segment_sentiments_json = serde_json::to_string(&sentiment.segment_sentiments)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
        let overall_sentiment = serde_json::to_value(sentiment.overall_sentiment)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        let query = format!(
            "INSERT INTO {}.sentiments (call_id, overall_sentiment, sentiment_score, escalation_detected, segment_sentiments_json, created_at) VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &sentiment.call_id,
                    overall_sentiment,
                    sentiment.sentiment_score,
                    sentiment.escalation_detected,
                    segment_sentiments_json,
                    sentiment.created_at,
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(true)
    }

    async fn get(&self, call_id: &str) -> Result<Option<SentimentResult>, PersistenceError> {
        let query = format!(
            "SELECT call_id, overall_sentiment, sentiment_score, escalation_detected, segment_sentiments_json, created_at FROM {}.sentiments WHERE call_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (call_id,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let rows = result.into_rows_result().map_err(|e| PersistenceError::Query(e.to_string()))?;
        for row in rows
            .rows::<(String, String, f64, bool, String, chrono::DateTime<chrono::Utc>)>()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?
        {
            let (call_id, overall_sentiment, sentiment_score, escalation_detected, segment_sentiments_json, created_at) =
                row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            let overall_sentiment = serde_json::from_value(serde_json::Value::String(overall_sentiment))
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            let segment_sentiments = serde_json::from_str(&segment_sentiments_json)
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            return Ok(Some(SentimentResult {
                call_id,
                overall_sentiment,
                sentiment_score,
                escalation_detected,
                segment_sentiments,
                created_at,
            }));
        }
        Ok(None)
    }
}
