//! VoC insight projection (C3): once-per-call, written by the
//! `VocAnalyzed` projector.

use async_trait::async_trait;
use callaudit_core::readmodel::VocInsight;
use dashmap::DashMap;
use tracing::info;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait VocStore: Send + Sync {
    async fn create_if_absent(&self, insight: VocInsight) -> Result<bool, PersistenceError>;
    async fn get(&self, call_id: &str) -> Result<Option<VocInsight>, PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryVocStore {
    rows: DashMap<String, VocInsight>,
}

impl InMemoryVocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VocStore for InMemoryVocStore {
    async fn create_if_absent(&self, insight: VocInsight) -> Result<bool, PersistenceError> {
        use dashmap::mapref::entry::Entry;
        match self.rows.entry(insight.call_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(insight);
                Ok(true)
            }
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<VocInsight>, PersistenceError> {
        Ok(self.rows.get(call_id).map(|r| r.clone()))
    }
}

pub struct ScyllaVocStore {
    client: ScyllaClient,
}

impl ScyllaVocStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VocStore for ScyllaVocStore {
    async fn create_if_absent(&self, insight: VocInsight) -> Result<bool, PersistenceError> {
        if self.get(&insight.call_id).await?.is_some() {
            info!(call_id = %insight.call_id, "voc insight already processed, skipping");
            return Ok(false);
        }

        let primary_intent = serde_json::to_value(insight.primary_intent)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();
        let customer_satisfaction = serde_json::to_value(insight.customer_satisfaction)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        let query = format!(
            "INSERT INTO {}.voc_insights (call_id, primary_intent, topics, keywords, customer_satisfaction, predicted_churn_risk, actionable_items, summary, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &insight.call_id,
                    primary_intent,
                    &insight.topics,
                    &insight.keywords,
                    customer_satisfaction,
                    insight.predicted_churn_risk,
                    &insight.actionable_items,
                    &insight.summary,
                    insight.created_at,
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(true)
    }

    async fn get(&self, call_id: &str) -> Result<Option<VocInsight>, PersistenceError> {
        let query = format!(
            "SELECT call_id, primary_intent, topics, keywords, customer_satisfaction, predicted_churn_risk, actionable_items, summary, created_at FROM {}.voc_insights WHERE call_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (call_id,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let rows = result.into_rows_result().map_err(|e| PersistenceError::Query(e.to_string()))?;
        #[allow(clippy::type_complexity)]
        for row in rows
            .rows::<(String, String, Vec<String>, Vec<String>, String, f64, Vec<String>, String, chrono::DateTime<chrono::Utc>)>()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?
        {
            let (call_id, primary_intent, topics, keywords, customer_satisfaction, predicted_churn_risk, actionable_items, summary, created_at) =
                row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            return Ok(Some(VocInsight {
                call_id,
                primary_intent: serde_json::from_value(serde_json::Value::String(primary_intent))
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
                topics,
                keywords,
                customer_satisfaction: serde_json::from_value(serde_json::Value::String(customer_satisfaction))
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
                predicted_churn_risk,
                actionable_items,
                summary,
                created_at,
            }));
        }
        Ok(None)
    }
}
