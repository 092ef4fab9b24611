use thiserror::Error;

/// Errors surfaced by the ingestion contract (C8), kept separate from
/// `HandlerOutcome` because ingestion is called directly by a producer
/// rather than driven by the consumer runtime.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("audio handle not found: {0}")]
    MissingAudio(String),

    #[error("recording for call {0} has zero bytes")]
    EmptyRecording(String),

    #[error("failed to publish call received event: {0}")]
    Publish(String),
}
