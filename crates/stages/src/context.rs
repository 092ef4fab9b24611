//! The fused per-call context the correlator (C4) assembles and the
//! scorer (C5) consumes.

use callaudit_core::payloads::{CallTranscribed, SentimentAnalyzed, VocAnalyzed};
use uuid::Uuid;

/// One call's complete triple, released by the correlator once all three
/// producers have reported in.
#[derive(Debug, Clone)]
pub struct FusedContext {
    pub call_id: String,
    pub correlation_id: Uuid,
    pub transcription: CallTranscribed,
    pub sentiment: SentimentAnalyzed,
    pub voc: VocAnalyzed,
}
