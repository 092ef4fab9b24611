//! Event envelope, topic contract, and read-model types shared by every
//! stage of the call quality pipeline.
//!
//! This crate is deliberately inert: it defines the shapes that cross
//! process boundaries (events) and the shapes that stages persist (read
//! models), plus the error type threaded through the pipeline. It does not
//! talk to a broker or a database; see `callaudit-broker` and
//! `callaudit-persistence` for that.

pub mod envelope;
pub mod error;
pub mod payloads;
pub mod readmodel;
pub mod rules;
pub mod topics;

pub use envelope::{EventEnvelope, EventPayload, EventType};
pub use error::{Error, Result};
pub use payloads::{
    CallAudited, CallReceived, CallTranscribed, EscalationDetails, Segment, SegmentSentiment,
    SentimentAnalyzed, Speaker, VocAnalyzed, Violation,
};
pub use readmodel::{
    AgentPerformance, AuditResult, Notification, NotificationChannel, NotificationStatus,
    Priority, SentimentResult, StoredViolation, Transcription, VocInsight,
};
pub use rules::{Rule, RuleDefinition, RuleSet, TimeWindow};
pub use topics::Topic;
