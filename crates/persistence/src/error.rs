use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("scylla connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("invalid row data: {0}")]
    InvalidData(String),

    #[error("not found")]
    NotFound,
}

impl PersistenceError {
    /// Projection-store failures are transient infrastructure errors,
    /// retried then routed to the DLQ, unless they are a data-shape bug,
    /// which is effectively permanent since retrying won't fix a
    /// malformed row.
    pub fn is_transient(&self) -> bool {
        !matches!(self, PersistenceError::InvalidData(_))
    }
}
