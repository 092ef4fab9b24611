use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("topic {0} is not registered")]
    UnknownTopic(String),

    #[error("send failed: broker is shutting down")]
    Closed,

    #[error("transient broker error: {0}")]
    Transient(String),
}
