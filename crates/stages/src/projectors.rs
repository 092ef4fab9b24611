//! Read-model projectors (C3). Each turns one event into a once-per-call
//! row via `create_if_absent`; a row that already exists is a clean replay,
//! not an error.

use std::sync::Arc;

use async_trait::async_trait;
use callaudit_broker::{BrokerMessage, Handler, HandlerOutcome};
use callaudit_core::envelope::EventPayload;
use callaudit_core::readmodel::{SentimentResult, Transcription, VocInsight};
use callaudit_persistence::{PersistenceError, SentimentStore, TranscriptionStore, VocStore};
use tracing::{debug, info};

fn outcome_for_store_error(err: PersistenceError) -> HandlerOutcome {
    if err.is_transient() {
        HandlerOutcome::Retry(err.to_string())
    } else {
        HandlerOutcome::Permanent(err.to_string())
    }
}

pub struct TranscriptionProjector<S: TranscriptionStore> {
    store: Arc<S>,
}

impl<S: TranscriptionStore> TranscriptionProjector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: TranscriptionStore + 'static> Handler for TranscriptionProjector<S> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        let payload = match &message.envelope.payload {
            EventPayload::CallTranscribed(p) => p,
            other => {
                return HandlerOutcome::Permanent(format!(
                    "transcription projector received unexpected payload: {:?}",
                    other.event_type()
                ))
            }
        };

        let row = Transcription {
            call_id: payload.call_id.clone(),
            full_text: payload.full_text.clone(),
            language: payload.language.clone(),
            confidence: payload.confidence,
            word_count: payload.word_count,
            segments: payload.segments.clone(),
            created_at: message.envelope.timestamp,
        };

        match self.store.create_if_absent(row).await {
            Ok(true) => {
                info!(call_id = %payload.call_id, "transcription projected");
                HandlerOutcome::Ack
            }
            Ok(false) => {
                debug!(call_id = %payload.call_id, "transcription already processed, skipping");
                HandlerOutcome::Ack
            }
            Err(e) => outcome_for_store_error(e),
        }
    }
}

pub struct SentimentProjector<S: SentimentStore> {
    store: Arc<S>,
}

impl<S: SentimentStore> SentimentProjector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: SentimentStore + 'static> Handler for SentimentProjector<S> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        let payload = match &message.envelope.payload {
            EventPayload::SentimentAnalyzed(p) => p,
            other => {
                return HandlerOutcome::Permanent(format!(
                    "sentiment projector received unexpected payload: {:?}",
                    other.event_type()
                ))
            }
        };

        let row = SentimentResult {
            call_id: payload.call_id.clone(),
            overall_sentiment: payload.overall_sentiment,
            sentiment_score: payload.sentiment_score,
            escalation_detected: payload.escalation_detected,
            segment_sentiments: payload.segment_sentiments.clone(),
            created_at: message.envelope.timestamp,
        };

        match self.store.create_if_absent(row).await {
            Ok(true) => {
                info!(call_id = %payload.call_id, "sentiment projected");
                HandlerOutcome::Ack
            }
            Ok(false) => {
                debug!(call_id = %payload.call_id, "sentiment already processed, skipping");
                HandlerOutcome::Ack
            }
            Err(e) => outcome_for_store_error(e),
        }
    }
}

pub struct VocProjector<S: VocStore> {
    store: Arc<S>,
}

impl<S: VocStore> VocProjector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: VocStore + 'static> Handler for VocProjector<S> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        let payload = match &message.envelope.payload {
            EventPayload::VocAnalyzed(p) => p,
            other => {
                return HandlerOutcome::Permanent(format!(
                    "voc projector received unexpected payload: {:?}",
                    other.event_type()
                ))
            }
        };

        let row = VocInsight {
            call_id: payload.call_id.clone(),
            primary_intent: payload.primary_intent,
            topics: payload.topics.clone(),
            keywords: payload.keywords.clone(),
            customer_satisfaction: payload.customer_satisfaction,
            predicted_churn_risk: payload.predicted_churn_risk,
            actionable_items: payload.actionable_items.clone(),
            summary: payload.summary.clone(),
            created_at: message.envelope.timestamp,
        };

        match self.store.create_if_absent(row).await {
            Ok(true) => {
                info!(call_id = %payload.call_id, "voc insight projected");
                HandlerOutcome::Ack
            }
            Ok(false) => {
                debug!(call_id = %payload.call_id, "voc insight already processed, skipping");
                HandlerOutcome::Ack
            }
            Err(e) => outcome_for_store_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_core::envelope::EventEnvelope;
    use callaudit_core::payloads::{CallTranscribed, Segment, Speaker};
    use callaudit_persistence::InMemoryTranscriptionStore;

    fn transcribed_message(call_id: &str) -> BrokerMessage {
        let envelope = EventEnvelope::originate(
            call_id,
            EventPayload::CallTranscribed(CallTranscribed {
                call_id: call_id.to_string(),
                full_text: "hello there".into(),
                language: "en".into(),
                confidence: 0.9,
                word_count: 2,
                segments: vec![Segment {
                    speaker: Speaker::Agent,
                    start_time: 0.0,
                    end_time: 1.0,
                    text: "hello there".into(),
                    confidence: Some(0.9),
                }],
            }),
        );
        BrokerMessage {
            envelope,
            partition: 0,
            offset: 0,
            delivery_count: 1,
        }
    }

    #[tokio::test]
    async fn replaying_the_same_event_five_times_keeps_one_row() {
        let store = Arc::new(InMemoryTranscriptionStore::new());
        let projector = TranscriptionProjector::new(store.clone());
        let msg = transcribed_message("call-1");

        for _ in 0..5 {
            assert!(matches!(projector.handle(&msg).await, HandlerOutcome::Ack));
        }

        let row = store.get("call-1").await.unwrap().unwrap();
        assert_eq!(row.segments.len(), 1);
    }
}
