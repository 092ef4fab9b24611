//! Stage handlers for the call quality pipeline.
//!
//! `callaudit-broker` provides the consumer runtime (C2) and
//! `callaudit-persistence` the read-model stores; this crate is where the
//! two meet the event shapes from `callaudit-core` to realize the
//! remaining components: the projectors (C3), the audit correlation
//! engine (C4), the compliance scorer and rule engine (C5), the metrics
//! aggregator (C6), the alert engine and dispatcher (C7), and the
//! ingestion contract (C8).

pub mod aggregator;
pub mod alerts;
pub mod context;
pub mod correlator;
pub mod error;
pub mod ingestion;
pub mod projectors;
pub mod rules;
pub mod scoring;

pub use aggregator::AggregatorHandler;
pub use alerts::{AlertDispatcher, AlertEngine, NotificationChannelSender, PlannedNotification};
pub use context::FusedContext;
pub use correlator::{CorrelatorHandler, PartialTriple};
pub use error::IngestError;
pub use ingestion::{AudioBlobStore, InMemoryAudioBlobStore, IngestionStage};
pub use projectors::{SentimentProjector, TranscriptionProjector, VocProjector};
pub use scoring::Scorer;
