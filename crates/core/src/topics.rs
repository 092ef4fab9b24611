//! Fixed topic names and the partition key rule.
//!
//! Topic names are part of the wire contract: consumer groups, DLQ topics,
//! and tooling all derive their names from these constants rather than
//! hardcoding strings at each call site.

use crate::envelope::EventType;
use std::fmt;

/// One of the five fixed topics in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    CallsReceived,
    CallsTranscribed,
    CallsSentimentAnalyzed,
    CallsVocAnalyzed,
    CallsAudited,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::CallsReceived,
        Topic::CallsTranscribed,
        Topic::CallsSentimentAnalyzed,
        Topic::CallsVocAnalyzed,
        Topic::CallsAudited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CallsReceived => "calls.received",
            Topic::CallsTranscribed => "calls.transcribed",
            Topic::CallsSentimentAnalyzed => "calls.sentiment-analyzed",
            Topic::CallsVocAnalyzed => "calls.voc-analyzed",
            Topic::CallsAudited => "calls.audited",
        }
    }

    /// The dead-letter topic paired with this topic.
    pub fn dlq(&self) -> String {
        format!("{}.dlq", self.as_str())
    }

    pub fn for_event_type(event_type: EventType) -> Topic {
        match event_type {
            EventType::CallReceived => Topic::CallsReceived,
            EventType::CallTranscribed => Topic::CallsTranscribed,
            EventType::SentimentAnalyzed => Topic::CallsSentimentAnalyzed,
            EventType::VocAnalyzed => Topic::CallsVocAnalyzed,
            EventType::CallAudited => Topic::CallsAudited,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The partition key rule: every event is partitioned by the string form of
/// its `aggregateId` (the `callId`). Keeping this as a free function avoids
/// two producers picking different key derivations.
pub fn partition_key(aggregate_id: &str) -> String {
    aggregate_id.to_string()
}
