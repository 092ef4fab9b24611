//! In-process partitioned broker and stage consumer runtime (C2).
//!
//! A real broker deployment is an out-of-scope external collaborator;
//! this crate provides an in-process stand-in with the same contract the
//! rest of the pipeline is written against (manual ack, per-partition
//! order, DLQ, retry/backoff), so the pipeline can run and be tested
//! without a real broker deployment.

pub mod circuit_breaker;
pub mod consumer;
pub mod error;
pub mod in_memory;
pub mod message;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use consumer::{ConsumerRuntime, Handler, HandlerOutcome};
pub use error::BrokerError;
pub use in_memory::InMemoryBroker;
pub use message::BrokerMessage;
