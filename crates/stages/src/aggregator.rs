//! The metrics aggregator (C6): write-buffered rolling aggregation of
//! post-analysis events into the `AgentPerformance` time series. Observed
//! per-event metrics are buffered by `(agentId, hourKey)` and flushed
//! periodically. The inline per-event path is not wired up; mixing it
//! with the buffered path for the same metric would double-count.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callaudit_broker::{BrokerMessage, Handler, HandlerOutcome};
use callaudit_config::AggregatorConfig;
use callaudit_core::envelope::EventPayload;
use callaudit_core::payloads::{ComplianceStatus, SatisfactionLevel};
use callaudit_persistence::{AgentPerformanceStore, BucketObservation, PersistenceError};
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One metric observation extracted from a single event. Any field left
/// `None` contributes nothing to that metric's average (null-safe merge).
#[derive(Debug, Clone, Default)]
struct Observation {
    quality: Option<f64>,
    sentiment: Option<f64>,
    satisfaction: Option<f64>,
    compliance_pass: Option<f64>,
    churn_risk: Option<f64>,
}

fn hour_key(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn satisfaction_to_f64(level: SatisfactionLevel) -> f64 {
    match level {
        SatisfactionLevel::Low => 0.0,
        SatisfactionLevel::Medium => 0.5,
        SatisfactionLevel::High => 1.0,
    }
}

fn observation_for(payload: &EventPayload) -> Option<Observation> {
    match payload {
        EventPayload::SentimentAnalyzed(p) => Some(Observation {
            // rescale [-1,1] to [0,1]
            sentiment: Some((p.sentiment_score + 1.0) / 2.0),
            ..Default::default()
        }),
        EventPayload::VocAnalyzed(p) => Some(Observation {
            satisfaction: Some(satisfaction_to_f64(p.customer_satisfaction)),
            churn_risk: Some(p.predicted_churn_risk),
            ..Default::default()
        }),
        EventPayload::CallAudited(p) => Some(Observation {
            quality: Some(p.overall_score as f64 / 100.0),
            compliance_pass: Some(if p.compliance_status == ComplianceStatus::Passed {
                1.0
            } else {
                0.0
            }),
            ..Default::default()
        }),
        _ => None,
    }
}

/// Consumer handler for `calls.sentiment-analyzed`, `calls.voc-analyzed`,
/// `calls.audited`. Buffers observations; a separate periodic task (see
/// [`AggregatorHandler::spawn_flush`]) drains the buffer into the
/// persisted series.
pub struct AggregatorHandler<S: AgentPerformanceStore> {
    store: Arc<S>,
    buffer: Arc<DashMap<(String, DateTime<Utc>), Vec<Observation>>>,
    seen_event_ids: Arc<DashMap<Uuid, std::time::Instant>>,
    dedup_ttl: Duration,
    flush_period: Duration,
}

impl<S: AgentPerformanceStore + 'static> AggregatorHandler<S> {
    pub fn new(store: Arc<S>, config: &AggregatorConfig) -> Self {
        Self {
            store,
            buffer: Arc::new(DashMap::new()),
            seen_event_ids: Arc::new(DashMap::new()),
            dedup_ttl: Duration::from_secs(config.dedup_ttl_secs),
            flush_period: Duration::from_secs(config.flush_period_secs),
        }
    }

    /// Spawn the periodic flush task. Each tick locally aggregates every
    /// buffered bucket into a `BucketObservation` and merges it into the
    /// persisted row via the null-safe associative averaging formula.
    pub fn spawn_flush(self: &Arc<Self>) -> watch::Sender<bool> {
        let (tx, mut rx) = watch::channel(false);
        let buffer = self.buffer.clone();
        let seen = self.seen_event_ids.clone();
        let store = self.store.clone();
        let period = self.flush_period;
        let dedup_ttl = self.dedup_ttl;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
                flush_once(&buffer, &store).await;
                let now = std::time::Instant::now();
                seen.retain(|_, seen_at| now.duration_since(*seen_at) < dedup_ttl);
            }
        });

        tx
    }

    fn is_duplicate(&self, event_id: Uuid) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.seen_event_ids.entry(event_id) {
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                slot.insert(std::time::Instant::now());
                false
            }
        }
    }
}

async fn flush_once<S: AgentPerformanceStore>(
    buffer: &DashMap<(String, DateTime<Utc>), Vec<Observation>>,
    store: &Arc<S>,
) {
    let keys: Vec<_> = buffer.iter().map(|e| e.key().clone()).collect();
    for key in keys {
        let Some((_, observations)) = buffer.remove(&key) else {
            continue;
        };
        if observations.is_empty() {
            continue;
        }
        let (agent_id, hour_slot) = key;
        let bucket = locally_aggregate(&observations);
        match store.merge_observation(&agent_id, hour_slot, bucket).await {
            Ok(merged) => {
                info!(agent_id, count = merged.count, "agent performance bucket flushed");
            }
            Err(e) => {
                warn!(agent_id, %e, "failed to flush agent performance bucket; observations are lost for this tick");
            }
        }
    }
}

fn locally_aggregate(observations: &[Observation]) -> BucketObservation {
    fn mean(values: impl Iterator<Item = f64>) -> (Option<f64>, u64) {
        let mut sum = 0.0;
        let mut n = 0u64;
        for v in values {
            sum += v;
            n += 1;
        }
        if n == 0 {
            (None, 0)
        } else {
            (Some(sum / n as f64), n)
        }
    }

    let (avg_quality, quality_count) = mean(observations.iter().filter_map(|o| o.quality));
    let (avg_sentiment, sentiment_count) = mean(observations.iter().filter_map(|o| o.sentiment));
    let (avg_satisfaction, satisfaction_count) = mean(observations.iter().filter_map(|o| o.satisfaction));
    let (avg_compliance_pass_rate, compliance_pass_count) =
        mean(observations.iter().filter_map(|o| o.compliance_pass));
    let (avg_churn_risk, churn_risk_count) = mean(observations.iter().filter_map(|o| o.churn_risk));

    BucketObservation {
        count: observations.len() as u64,
        avg_quality,
        quality_count,
        avg_sentiment,
        sentiment_count,
        avg_satisfaction,
        satisfaction_count,
        avg_compliance_pass_rate,
        compliance_pass_count,
        avg_churn_risk,
        churn_risk_count,
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
impl<S: AgentPerformanceStore + 'static> Handler for AggregatorHandler<S> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        if self.is_duplicate(message.envelope.event_id) {
            debug!(event_id = %message.envelope.event_id, "duplicate event, skipping aggregation");
            return HandlerOutcome::Ack;
        }

        let Some(agent_id) = message.envelope.metadata.get("agentId") else {
            debug!(call_id = %message.envelope.payload.call_id(), "no agentId in metadata, skipping aggregation");
            return HandlerOutcome::Ack;
        };

        let Some(observation) = observation_for(&message.envelope.payload) else {
            return HandlerOutcome::Ack;
        };

        let hour = hour_key(message.envelope.timestamp);
        self.buffer
            .entry((agent_id.clone(), hour))
            .or_default()
            .push(observation);

        HandlerOutcome::Ack
    }
}

// `outcome_for_store_error` is retained for the direct/inline alternate
// path a deployment could wire in place of the buffered flush; the
// buffered path above does not need it since flush failures are handled
// by `flush_once` without failing an already-acknowledged message.
#[allow(dead_code)]
fn _unused_store_error_helper() -> fn(PersistenceError) -> HandlerOutcome {
    outcome_for_store_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_core::envelope::EventEnvelope;
    use callaudit_core::payloads::{CallAudited, ComplianceStatus, Sentiment, SentimentAnalyzed};
    use callaudit_persistence::InMemoryAgentPerformanceStore;

    fn sentiment_message(call_id: &str, agent_id: &str, score: f64) -> BrokerMessage {
        let envelope = EventEnvelope::originate(
            call_id,
            EventPayload::SentimentAnalyzed(SentimentAnalyzed {
                call_id: call_id.to_string(),
                overall_sentiment: Sentiment::Positive,
                sentiment_score: score,
                escalation_detected: false,
                escalation_details: None,
                segment_sentiments: vec![],
                processing_time_ms: 5,
            }),
        )
        .with_metadata("agentId", agent_id);
        BrokerMessage {
            envelope,
            partition: 0,
            offset: 0,
            delivery_count: 1,
        }
    }

    fn audited_message(call_id: &str, agent_id: &str, overall_score: u8) -> BrokerMessage {
        let envelope = EventEnvelope::originate(
            call_id,
            EventPayload::CallAudited(CallAudited {
                call_id: call_id.to_string(),
                overall_score,
                compliance_status: ComplianceStatus::Passed,
                script_adherence: 90,
                customer_service: 90,
                resolution_effectiveness: 90,
                flags_for_review: false,
                review_reason: None,
                violations: vec![],
                processing_time_ms: 5,
            }),
        )
        .with_metadata("agentId", agent_id);
        BrokerMessage {
            envelope,
            partition: 0,
            offset: 0,
            delivery_count: 1,
        }
    }

    #[tokio::test]
    async fn missing_agent_id_is_skipped_cleanly() {
        let store = Arc::new(InMemoryAgentPerformanceStore::new());
        let handler = AggregatorHandler::new(store.clone(), &AggregatorConfig::default());
        let envelope = EventEnvelope::originate(
            "c1",
            EventPayload::CallAudited(CallAudited {
                call_id: "c1".into(),
                overall_score: 80,
                compliance_status: ComplianceStatus::Passed,
                script_adherence: 80,
                customer_service: 80,
                resolution_effectiveness: 80,
                flags_for_review: false,
                review_reason: None,
                violations: vec![],
                processing_time_ms: 1,
            }),
        );
        let msg = BrokerMessage {
            envelope,
            partition: 0,
            offset: 0,
            delivery_count: 1,
        };
        assert!(matches!(handler.handle(&msg).await, HandlerOutcome::Ack));
        assert!(handler.buffer.is_empty());
    }

    #[tokio::test]
    async fn duplicate_event_id_is_counted_once() {
        let store = Arc::new(InMemoryAgentPerformanceStore::new());
        let handler = AggregatorHandler::new(store, &AggregatorConfig::default());
        let msg = audited_message("c1", "A1", 80);

        handler.handle(&msg).await;
        handler.handle(&msg).await;

        let hour = hour_key(msg.envelope.timestamp);
        let buffered = handler.buffer.get(&("A1".to_string(), hour)).unwrap();
        assert_eq!(buffered.len(), 1);
    }

    #[tokio::test]
    async fn flush_merges_worked_example() {
        let store = Arc::new(InMemoryAgentPerformanceStore::new());
        let handler = Arc::new(AggregatorHandler::new(store.clone(), &AggregatorConfig::default()));

        handler.handle(&audited_message("c1", "A1", 80)).await;
        handler.handle(&audited_message("c2", "A1", 100)).await;
        flush_once(&handler.buffer, &store).await;

        let hour = hour_key(chrono::Utc::now());
        let row = store.get("A1", hour).await.unwrap().unwrap();
        assert_eq!(row.count, 2);
        assert!((row.avg_quality.unwrap() - 0.90).abs() < 1e-9);

        handler.handle(&audited_message("c3", "A1", 70)).await;
        flush_once(&handler.buffer, &store).await;
        let row = store.get("A1", hour).await.unwrap().unwrap();
        assert_eq!(row.count, 3);
        assert!((row.avg_quality.unwrap() - 0.8333333333).abs() < 1e-6);
    }

    #[tokio::test]
    async fn flush_with_mixed_metrics_averages_each_metric_independently() {
        let store = Arc::new(InMemoryAgentPerformanceStore::new());
        let handler = Arc::new(AggregatorHandler::new(store.clone(), &AggregatorConfig::default()));

        // First flush window: one sentiment event, one audit event.
        handler.handle(&sentiment_message("c1", "A1", 0.0)).await;
        handler.handle(&audited_message("c2", "A1", 80)).await;
        flush_once(&handler.buffer, &store).await;

        let hour = hour_key(chrono::Utc::now());
        let row = store.get("A1", hour).await.unwrap().unwrap();
        assert_eq!(row.count, 2);
        assert!((row.avg_quality.unwrap() - 0.80).abs() < 1e-9);
        assert!((row.avg_sentiment.unwrap() - 0.5).abs() < 1e-9);

        // Second flush window: one more audit event, no sentiment event.
        handler.handle(&audited_message("c3", "A1", 100)).await;
        flush_once(&handler.buffer, &store).await;

        let row = store.get("A1", hour).await.unwrap().unwrap();
        assert_eq!(row.count, 3);
        // The mean of the two quality observations (0.80, 1.00) is 0.90; it
        // must not be weighted by the three total events across both flushes.
        assert!((row.avg_quality.unwrap() - 0.90).abs() < 1e-9);
        assert!((row.avg_sentiment.unwrap() - 0.5).abs() < 1e-9);
    }
}
