//! Type-specific payload bodies for each event in the pipeline.
//!
//! Field names and enum variants here are part of the wire contract and
//! must not be renamed without a schema version bump.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Customer,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Complaint,
    Inquiry,
    Compliment,
    Request,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatisfactionLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Passed,
    ReviewRequired,
    Failed,
}

/// `CallReceived` payload, produced by the ingestion stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReceived {
    pub call_id: String,
    pub caller_id: String,
    pub agent_id: String,
    pub channel: String,
    pub file_handle: String,
    pub file_format: String,
    pub file_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

/// A single speaker-attributed segment of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub speaker: Speaker,
    /// Seconds from call start, millisecond resolution.
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTranscribed {
    pub call_id: String,
    pub full_text: String,
    pub language: String,
    pub confidence: f64,
    pub word_count: u32,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationDetails {
    pub max_drop: f64,
    pub from_score: f64,
    pub to_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSentiment {
    pub start_time: f64,
    pub end_time: f64,
    pub sentiment: Sentiment,
    pub score: f64,
    #[serde(default)]
    pub emotions: std::collections::HashMap<String, f64>,
    pub speaker: Speaker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAnalyzed {
    pub call_id: String,
    pub overall_sentiment: Sentiment,
    pub sentiment_score: f64,
    pub escalation_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_details: Option<EscalationDetails>,
    pub segment_sentiments: Vec<SegmentSentiment>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocAnalyzed {
    pub call_id: String,
    pub primary_intent: Intent,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub customer_satisfaction: SatisfactionLevel,
    pub predicted_churn_risk: f64,
    pub actionable_items: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_in_call: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAudited {
    pub call_id: String,
    /// 0..100 integer composite score.
    pub overall_score: u8,
    pub compliance_status: ComplianceStatus,
    pub script_adherence: u8,
    pub customer_service: u8,
    pub resolution_effectiveness: u8,
    pub flags_for_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
    pub violations: Vec<Violation>,
    pub processing_time_ms: u64,
}
