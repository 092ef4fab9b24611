//! The audit correlation engine (C4): fuses three independent streams
//! (transcription, sentiment, VoC) for the same call before the scorer
//! (C5) can run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use callaudit_broker::{BrokerMessage, Handler, HandlerOutcome, InMemoryBroker};
use callaudit_config::{CorrelatorConfig, ScoringConfig};
use callaudit_core::envelope::{EventEnvelope, EventPayload};
use callaudit_core::payloads::{CallTranscribed, SentimentAnalyzed, VocAnalyzed};
use callaudit_core::rules::RuleSet;
use callaudit_core::topics::Topic;
use callaudit_persistence::{AuditStore, PersistenceError};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::FusedContext;
use crate::scoring::Scorer;

/// A partially-filled triple for one call. Slots fill in arbitrary order
/// because the three producers are independent, parallel stages.
#[derive(Debug, Clone, Default)]
pub struct PartialTriple {
    pub transcription: Option<CallTranscribed>,
    pub sentiment: Option<SentimentAnalyzed>,
    pub voc: Option<VocAnalyzed>,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub first_seen: Option<Instant>,
}

impl PartialTriple {
    fn is_complete(&self) -> bool {
        self.transcription.is_some() && self.sentiment.is_some() && self.voc.is_some()
    }

    fn into_fused(self, call_id: String) -> Option<FusedContext> {
        Some(FusedContext {
            call_id,
            correlation_id: self.correlation_id?,
            transcription: self.transcription?,
            sentiment: self.sentiment?,
            voc: self.voc?,
        })
    }
}

/// Handler for all three input topics of the audit stage. The same
/// instance is registered against `calls.transcribed`,
/// `calls.sentiment-analyzed` and `calls.voc-analyzed`; each message it
/// receives is routed by payload tag into the right slot of the call's
/// partial entry.
pub struct CorrelatorHandler<A: AuditStore> {
    partials: Arc<DashMap<String, PartialTriple>>,
    audit_store: Arc<A>,
    scorer: Scorer,
    rules: RuleSet,
    broker: Arc<InMemoryBroker>,
    ttl: Duration,
}

impl<A: AuditStore + 'static> CorrelatorHandler<A> {
    pub fn new(
        audit_store: Arc<A>,
        scoring: ScoringConfig,
        rules: RuleSet,
        broker: Arc<InMemoryBroker>,
        correlator_config: &CorrelatorConfig,
    ) -> Self {
        Self {
            partials: Arc::new(DashMap::new()),
            audit_store,
            scorer: Scorer::new(scoring),
            rules,
            broker,
            ttl: Duration::from_secs(correlator_config.partial_triple_ttl_secs),
        }
    }

    /// Spawn the background eviction sweep that keeps the partial map
    /// leak-free. Runs every quarter of the TTL, evicting partials older
    /// than the TTL and reporting each as a pipeline gap. Returns a
    /// shutdown handle paired with the same cooperative-shutdown pattern
    /// the consumer runtime uses.
    pub fn spawn_sweep(self: &Arc<Self>) -> watch::Sender<bool> {
        let (tx, mut rx) = watch::channel(false);
        let partials = self.partials.clone();
        let ttl = self.ttl;
        let interval = (ttl / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
                let now = Instant::now();
                let mut gaps = 0u64;
                partials.retain(|call_id, partial| {
                    let expired = partial
                        .first_seen
                        .map(|seen| now.duration_since(seen) >= ttl)
                        .unwrap_or(false);
                    if expired {
                        gaps += 1;
                        warn!(call_id, "correlator partial triple expired, pipeline gap");
                    }
                    !expired
                });
                if gaps > 0 {
                    metrics::counter!("pipeline_gap_total").increment(gaps);
                }
            }
        });

        tx
    }

    async fn release_if_complete(&self, call_id: &str) -> HandlerOutcome {
        let is_complete = self
            .partials
            .get(call_id)
            .map(|p| p.is_complete())
            .unwrap_or(false);
        if !is_complete {
            return HandlerOutcome::Ack;
        }

        // At most one audit per call: bail out if the row already exists.
        match self.audit_store.get(call_id).await {
            Ok(Some(_)) => {
                self.partials.remove(call_id);
                return HandlerOutcome::Ack;
            }
            Ok(None) => {}
            Err(e) => return outcome_for_store_error(e),
        }

        let Some((_, partial)) = self.partials.remove(call_id) else {
            return HandlerOutcome::Ack;
        };
        let causation_id = partial.causation_id;
        let Some(fused) = partial.into_fused(call_id.to_string()) else {
            return HandlerOutcome::Ack;
        };

        let outcome = self.scorer.score(&fused, &self.rules);

        let audit_result_id = Uuid::new_v4();
        let audit_row = callaudit_core::readmodel::AuditResult {
            audit_result_id,
            call_id: fused.call_id.clone(),
            overall_score: outcome.overall_score,
            compliance_status: outcome.compliance_status,
            script_adherence: outcome.script_adherence,
            customer_service: outcome.customer_service,
            resolution_effectiveness: outcome.resolution_effectiveness,
            flags_for_review: outcome.flags_for_review,
            review_reason: outcome.review_reason.clone(),
            violations: outcome
                .violations
                .iter()
                .map(|v| callaudit_core::readmodel::StoredViolation::from_violation(audit_result_id, v))
                .collect(),
            created_at: chrono::Utc::now(),
        };

        match self.audit_store.create_if_absent(audit_row).await {
            Ok(_) => {}
            Err(e) => return outcome_for_store_error(e),
        }

        let origin = EventEnvelope {
            event_id: Uuid::new_v4(),
            aggregate_id: fused.call_id.clone(),
            aggregate_type: "call".to_string(),
            timestamp: chrono::Utc::now(),
            version: callaudit_core::envelope::CURRENT_SCHEMA_VERSION,
            causation_id,
            correlation_id: fused.correlation_id,
            metadata: Default::default(),
            payload: EventPayload::CallAudited(callaudit_core::payloads::CallAudited {
                call_id: fused.call_id.clone(),
                overall_score: outcome.overall_score,
                compliance_status: outcome.compliance_status,
                script_adherence: outcome.script_adherence,
                customer_service: outcome.customer_service,
                resolution_effectiveness: outcome.resolution_effectiveness,
                flags_for_review: outcome.flags_for_review,
                review_reason: outcome.review_reason.clone(),
                violations: outcome.violations.clone(),
                processing_time_ms: outcome.processing_time_ms,
            }),
        };

        if let Err(e) = self.broker.publish(Topic::CallsAudited, origin).await {
            warn!(call_id, %e, "failed to publish CallAudited; audit row is authoritative, retry emission");
            return HandlerOutcome::Retry(e.to_string());
        }

        info!(call_id, "call audited");
        HandlerOutcome::Ack
    }
}

fn outcome_for_store_error(err: PersistenceError) -> HandlerOutcome {
    if err.is_transient() {
        HandlerOutcome::Retry(err.to_string())
    } else {
        HandlerOutcome::Permanent(err.to_string())
    }
}

#[async_trait]
impl<A: AuditStore + 'static> Handler for CorrelatorHandler<A> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        let call_id = message.envelope.payload.call_id().to_string();
        let correlation_id = message.envelope.correlation_id;
        let causation_id = message.envelope.event_id;

        {
            let mut entry = self.partials.entry(call_id.clone()).or_default();
            if entry.first_seen.is_none() {
                entry.first_seen = Some(Instant::now());
            }
            entry.correlation_id = Some(correlation_id);
            entry.causation_id = Some(causation_id);
            match &message.envelope.payload {
                EventPayload::CallTranscribed(p) => entry.transcription = Some(p.clone()),
                EventPayload::SentimentAnalyzed(p) => entry.sentiment = Some(p.clone()),
                EventPayload::VocAnalyzed(p) => entry.voc = Some(p.clone()),
                other => {
                    return HandlerOutcome::Permanent(format!(
                        "correlator received unexpected payload: {:?}",
                        other.event_type()
                    ))
                }
            }
        }

        self.release_if_complete(&call_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_config::rules::default_rules;
    use callaudit_core::payloads::{
        CallTranscribed, Intent, SatisfactionLevel, Segment, SegmentSentiment, Sentiment, Speaker,
        VocAnalyzed,
    };
    use callaudit_persistence::InMemoryAuditStore;

    fn msg(call_id: &str, correlation_id: Uuid, payload: EventPayload) -> BrokerMessage {
        let mut envelope = EventEnvelope::originate(call_id, payload);
        envelope.correlation_id = correlation_id;
        BrokerMessage {
            envelope,
            partition: 0,
            offset: 0,
            delivery_count: 1,
        }
    }

    fn transcribed(call_id: &str) -> EventPayload {
        EventPayload::CallTranscribed(CallTranscribed {
            call_id: call_id.to_string(),
            full_text: "thank you for calling, how can i help".into(),
            language: "en".into(),
            confidence: 0.9,
            word_count: 8,
            segments: vec![Segment {
                speaker: Speaker::Agent,
                start_time: 0.0,
                end_time: 2.0,
                text: "thank you for calling, how can i help".into(),
                confidence: Some(0.9),
            }],
        })
    }

    fn sentiment(call_id: &str) -> EventPayload {
        EventPayload::SentimentAnalyzed(SentimentAnalyzed {
            call_id: call_id.to_string(),
            overall_sentiment: Sentiment::Positive,
            sentiment_score: 0.8,
            escalation_detected: false,
            escalation_details: None,
            segment_sentiments: vec![SegmentSentiment {
                start_time: 0.0,
                end_time: 2.0,
                sentiment: Sentiment::Positive,
                score: 0.8,
                emotions: Default::default(),
                speaker: Speaker::Agent,
            }],
            processing_time_ms: 10,
        })
    }

    fn voc(call_id: &str) -> EventPayload {
        EventPayload::VocAnalyzed(VocAnalyzed {
            call_id: call_id.to_string(),
            primary_intent: Intent::Inquiry,
            topics: vec!["billing".into()],
            keywords: vec!["invoice".into()],
            customer_satisfaction: SatisfactionLevel::High,
            predicted_churn_risk: 0.2,
            actionable_items: vec![],
            summary: "routine billing inquiry".into(),
        })
    }

    async fn build() -> (Arc<CorrelatorHandler<InMemoryAuditStore>>, Arc<InMemoryBroker>) {
        let broker = InMemoryBroker::new(1);
        broker.take_partition_receivers(Topic::CallsAudited);
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let handler = Arc::new(CorrelatorHandler::new(
            audit_store,
            ScoringConfig::default(),
            default_rules(),
            broker.clone(),
            &CorrelatorConfig::default(),
        ));
        (handler, broker)
    }

    #[tokio::test]
    async fn releases_exactly_once_when_all_three_arrive() {
        let (handler, _broker) = build().await;
        let correlation_id = Uuid::new_v4();
        assert!(matches!(
            handler.handle(&msg("c1", correlation_id, transcribed("c1"))).await,
            HandlerOutcome::Ack
        ));
        assert!(matches!(
            handler.handle(&msg("c1", correlation_id, sentiment("c1"))).await,
            HandlerOutcome::Ack
        ));
        assert!(matches!(
            handler.handle(&msg("c1", correlation_id, voc("c1"))).await,
            HandlerOutcome::Ack
        ));
        assert!(handler.audit_store.get("c1").await.unwrap().is_some());
        assert!(handler.partials.get("c1").is_none());
    }

    #[tokio::test]
    async fn withholding_one_event_produces_no_audit() {
        let (handler, _broker) = build().await;
        let correlation_id = Uuid::new_v4();
        handler.handle(&msg("c2", correlation_id, transcribed("c2"))).await;
        handler.handle(&msg("c2", correlation_id, sentiment("c2"))).await;
        assert!(handler.audit_store.get("c2").await.unwrap().is_none());
        assert!(handler.partials.get("c2").unwrap().voc.is_none());
    }
}
