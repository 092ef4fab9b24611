//! Crate-wide error type.
//!
//! This is deliberately small: it covers malformed envelopes/payloads and
//! unsupported schema versions, the two failure modes that are permanent
//! and route straight to the DLQ rather than being retried. Transient
//! infrastructure errors belong to `callaudit-broker` and
//! `callaudit-persistence`, which define their own error types and convert
//! into this one at the stage boundary only when a handler needs to
//! report a permanent failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("envelope parse error: {0}")]
    EnvelopeParse(String),

    #[error("unsupported schema version {found}, expected {expected}")]
    UnsupportedSchemaVersion { found: u32, expected: u32 },

    #[error("malformed rule definition: {0}")]
    MalformedRule(String),

    #[error("unknown event type tag: {0}")]
    UnknownEventType(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// All variants of this type are permanent; this exists so callers
    /// don't have to match on variants to decide.
    pub fn is_permanent(&self) -> bool {
        true
    }
}
