//! Read-model row shapes persisted by the projectors (C3), the correlator's
//! audit output (C4/C5), the aggregator (C6), and the alert dispatcher
//! (C7). These are storage-agnostic; `callaudit-persistence` maps them onto
//! ScyllaDB tables or an in-memory fallback.

use crate::payloads::{
    Intent, SatisfactionLevel, Segment, SegmentSentiment, Sentiment, Severity, Violation,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub call_id: String,
    pub full_text: String,
    pub language: String,
    pub confidence: f64,
    pub word_count: u32,
    pub segments: Vec<Segment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub call_id: String,
    pub overall_sentiment: Sentiment,
    pub sentiment_score: f64,
    pub escalation_detected: bool,
    pub segment_sentiments: Vec<SegmentSentiment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocInsight {
    pub call_id: String,
    pub primary_intent: Intent,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub customer_satisfaction: SatisfactionLevel,
    pub predicted_churn_risk: f64,
    pub actionable_items: Vec<String>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredViolation {
    pub violation_id: Uuid,
    pub audit_result_id: Uuid,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub description: String,
    pub timestamp_in_call: Option<f64>,
    pub evidence: Option<String>,
}

impl StoredViolation {
    pub fn from_violation(audit_result_id: Uuid, v: &Violation) -> Self {
        Self {
            violation_id: Uuid::new_v4(),
            audit_result_id,
            rule_id: v.rule_id.clone(),
            rule_name: v.rule_name.clone(),
            severity: v.severity,
            description: v.description.clone(),
            timestamp_in_call: v.timestamp_in_call,
            evidence: v.evidence.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub audit_result_id: Uuid,
    pub call_id: String,
    pub overall_score: u8,
    pub compliance_status: crate::payloads::ComplianceStatus,
    pub script_adherence: u8,
    pub customer_service: u8,
    pub resolution_effectiveness: u8,
    pub flags_for_review: bool,
    pub review_reason: Option<String>,
    pub violations: Vec<StoredViolation>,
    pub created_at: DateTime<Utc>,
}

/// Time-bucketed performance series, one row per `(agentId, hourSlot)`.
/// Count and average update atomically together via a null-safe
/// associative merge, enforced by the aggregator, not by this shape itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub agent_id: String,
    pub hour_slot: DateTime<Utc>,
    pub count: u64,
    pub avg_quality: Option<f64>,
    pub quality_count: u64,
    pub avg_sentiment: Option<f64>,
    pub sentiment_count: u64,
    pub avg_satisfaction: Option<f64>,
    pub satisfaction_count: u64,
    pub avg_compliance_pass_rate: Option<f64>,
    pub compliance_pass_count: u64,
    pub avg_churn_risk: Option<f64>,
    pub churn_risk_count: u64,
}

impl AgentPerformance {
    pub fn empty(agent_id: impl Into<String>, hour_slot: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            hour_slot,
            count: 0,
            avg_quality: None,
            quality_count: 0,
            avg_sentiment: None,
            sentiment_count: 0,
            avg_satisfaction: None,
            satisfaction_count: 0,
            avg_compliance_pass_rate: None,
            compliance_pass_count: 0,
            avg_churn_risk: None,
            churn_risk_count: 0,
        }
    }

    /// Merges two partial averages with their own counts: `(a1*n1 + a2*n2) / (n1+n2)`.
    /// A `None` average with zero weight is the merge identity.
    pub fn merge_avg(a: Option<f64>, n_a: u64, b: Option<f64>, n_b: u64) -> Option<f64> {
        match (a, b) {
            (None, None) => None,
            (Some(v), None) => Some(v),
            (None, Some(v)) => Some(v),
            (Some(va), Some(vb)) => {
                let total = n_a + n_b;
                if total == 0 {
                    None
                } else {
                    Some((va * n_a as f64 + vb * n_b as f64) / total as f64)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Chat,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub call_id: String,
    pub notification_type: String,
    pub recipient: String,
    pub channel: NotificationChannel,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new_pending(
        call_id: impl Into<String>,
        notification_type: impl Into<String>,
        recipient: impl Into<String>,
        channel: NotificationChannel,
        subject: impl Into<String>,
        body: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            call_id: call_id.into(),
            notification_type: notification_type.into(),
            recipient: recipient.into(),
            channel,
            subject: subject.into(),
            body: body.into(),
            priority,
            status: NotificationStatus::Pending,
            sent_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_sent(&mut self) {
        self.status = NotificationStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = NotificationStatus::Failed;
        self.error_message = Some(reason.into());
    }

    /// Reset to `pending` for a re-attempt.
    pub fn reset_for_resend(&mut self) {
        self.status = NotificationStatus::Pending;
        self.error_message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_avg_is_null_safe_identity() {
        assert_eq!(AgentPerformance::merge_avg(None, 0, Some(0.9), 2), Some(0.9));
        assert_eq!(AgentPerformance::merge_avg(Some(0.9), 2, None, 0), Some(0.9));
        assert_eq!(AgentPerformance::merge_avg(None, 0, None, 0), None);
    }

    #[test]
    fn merge_avg_matches_worked_example() {
        // two observations 0.80 and 1.00 -> avg 0.90, n=2
        let merged = AgentPerformance::merge_avg(Some(0.80), 1, Some(1.00), 1).unwrap();
        assert!((merged - 0.90).abs() < 1e-9);

        // add a third observation 0.70 in a later flush
        let merged2 = AgentPerformance::merge_avg(Some(merged), 2, Some(0.70), 1).unwrap();
        assert!((merged2 - 0.8333333333).abs() < 1e-6);
    }
}
