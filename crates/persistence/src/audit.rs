//! Audit result projection (C5 output): once-per-call row plus its
//! linked violations.

use async_trait::async_trait;
use callaudit_core::readmodel::AuditResult;
use dashmap::DashMap;
use tracing::info;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert the audit row and its violations only if no row exists yet
    /// for `call_id`. Returns `true` if newly inserted.
    async fn create_if_absent(&self, result: AuditResult) -> Result<bool, PersistenceError>;
    async fn get(&self, call_id: &str) -> Result<Option<AuditResult>, PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    rows: DashMap<String, AuditResult>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create_if_absent(&self, result: AuditResult) -> Result<bool, PersistenceError> {
        use dashmap::mapref::entry::Entry;
        match self.rows.entry(result.call_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(result);
                Ok(true)
            }
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<AuditResult>, PersistenceError> {
        Ok(self.rows.get(call_id).map(|r| r.clone()))
    }
}

pub struct ScyllaAuditStore {
    client: ScyllaClient,
}

impl ScyllaAuditStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuditStore for ScyllaAuditStore {
    async fn create_if_absent(&self, result: AuditResult) -> Result<bool, PersistenceError> {
        if self.get(&result.call_id).await?.is_some() {
            info!(call_id = %result.call_id, "audit result already processed, skipping");
            return Ok(false);
        }

        let compliance_status = serde_json::to_value(result.compliance_status)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        let audit_query = format!(
            "INSERT INTO {}.audit_results (call_id, audit_result_id, overall_score, compliance_status, script_adherence, customer_service, resolution_effectiveness, flags_for_review, review_reason, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                audit_query,
                (
                    &result.call_id,
                    result.audit_result_id,
                    result.overall_score as i8,
                    compliance_status,
                    result.script_adherence as i8,
                    result.customer_service as i8,
                    result.resolution_effectiveness as i8,
                    result.flags_for_review,
                    &result.review_reason,
                    result.created_at,
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let violation_query = format!(
            "INSERT INTO {}.compliance_violations (audit_result_id, violation_id, rule_id, rule_name, severity, description, timestamp_in_call, evidence) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        for violation in &result.violations {
            let severity = serde_json::to_value(violation.severity)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            self.client
                .session()
                .query_unpaged(
                    violation_query.clone(),
                    (
                        violation.audit_result_id,
                        violation.violation_id,
                        &violation.rule_id,
                        &violation.rule_name,
                        severity,
                        &violation.description,
                        violation.timestamp_in_call,
                        &violation.evidence,
                    ),
                )
                .await
                .map_err(|e| PersistenceError::Query(e.to_string()))?;
        }

        Ok(true)
    }

    async fn get(&self, call_id: &str) -> Result<Option<AuditResult>, PersistenceError> {
        let query = format!(
            "SELECT call_id, audit_result_id, overall_score, compliance_status, script_adherence, customer_service, resolution_effectiveness, flags_for_review, review_reason, created_at FROM {}.audit_results WHERE call_id = ?",
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
            .rows::<(String, uuid::Uuid, i8, String, i8, i8, i8, bool, Option<String>, chrono::DateTime<chrono::Utc>)>()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?
        {
            let (call_id, audit_result_id, overall_score, compliance_status, script_adherence, customer_service, resolution_effectiveness, flags_for_review, review_reason, created_at) =
                row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

            let violations = self.get_violations(audit_result_id).await?;

            return Ok(Some(AuditResult {
                audit_result_id,
                call_id,
                overall_score: overall_score as u8,
                compliance_status: serde_json::from_value(serde_json::Value::String(compliance_status))
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
                script_adherence: script_adherence as u8,
                customer_service: customer_service as u8,
                resolution_effectiveness: resolution_effectiveness as u8,
                flags_for_review,
                review_reason,
                violations,
                created_at,
            }));
        }
        Ok(None)
    }
}

impl ScyllaAuditStore {
    async fn get_violations(
        &self,
        audit_result_id: uuid::Uuid,
    ) -> Result<Vec<callaudit_core::readmodel::StoredViolation>, PersistenceError> {
        let query = format!(
            "SELECT audit_result_id, violation_id, rule_id, rule_name, severity, description, timestamp_in_call, evidence FROM {}.compliance_violations WHERE audit_result_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (audit_result_id,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let rows = result.into_rows_result().map_err(|e| PersistenceError::Query(e.to_string()))?;

        let mut violations = Vec::new();
        #[allow(clippy::type_complexity)]
        for row in rows
            .rows::<(uuid::Uuid, uuid::Uuid, String, String, String, String, Option<f64>, Option<String>)>()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?
        {
            let (audit_result_id, violation_id, rule_id, rule_name, severity, description, timestamp_in_call, evidence) =
                row.map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            violations.push(callaudit_core::readmodel::StoredViolation {
                violation_id,
                audit_result_id,
                rule_id,
                rule_name,
                severity: serde_json::from_value(serde_json::Value::String(severity))
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?,
                description,
                timestamp_in_call,
                evidence,
            });
        }
        Ok(violations)
    }
}
