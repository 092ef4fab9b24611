//! Stage consumer runtime (C2): subscribes to a topic's partitions, runs
//! one handler per message with manual ack, retries transient failures
//! with bounded exponential backoff, and routes permanent/exhausted
//! failures to the topic's DLQ. Cooperative shutdown stops pulling new
//! messages and waits (bounded) for in-flight handlers to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callaudit_config::RetryConfig;
use callaudit_core::topics::Topic;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::in_memory::InMemoryBroker;
use crate::message::BrokerMessage;

/// Outcome of handling one message. Handlers never throw past the
/// runtime: every code path returns one of these three tags, which the
/// runtime maps onto ack / retry / DLQ.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Durable write (and any derived produce) succeeded; acknowledge.
    Ack,
    /// A transient failure (store unavailable, downstream timeout); retry
    /// with backoff up to the configured bound, then DLQ.
    Retry(String),
    /// A permanent failure (parse error, unsupported schema version,
    /// malformed rule); route straight to DLQ.
    Permanent(String),
}

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome;
}

pub struct ConsumerRuntime {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    drain: Duration,
}

impl ConsumerRuntime {
    /// Spawn one task per partition of `topic`, each running `handler`
    /// serially over its partition's messages: one message from one
    /// partition is processed at a time.
    pub fn spawn<H: Handler>(
        broker: Arc<InMemoryBroker>,
        topic: Topic,
        handler: Arc<H>,
        retry: RetryConfig,
        drain: Duration,
    ) -> Self {
        let receivers = broker.take_partition_receivers(topic);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let circuit_breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(30)));

        let tasks = receivers
            .into_iter()
            .enumerate()
            .map(|(partition, mut rx)| {
                let broker = broker.clone();
                let handler = handler.clone();
                let retry = retry.clone();
                let mut shutdown_rx = shutdown_rx.clone();
                let circuit_breaker = circuit_breaker.clone();
                let dlq_topic = topic.dlq();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                            maybe_msg = rx.recv() => {
                                match maybe_msg {
                                    Some(msg) => {
                                        process_one(
                                            &broker,
                                            &dlq_topic,
                                            &*handler,
                                            msg,
                                            &retry,
                                            &circuit_breaker,
                                            partition,
                                        )
                                        .await;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            shutdown_tx,
            tasks,
            drain,
        }
    }

    /// Stop pulling new messages and wait up to the configured drain
    /// bound for in-flight handlers to finish. Unacknowledged messages
    /// are redelivered on restart; idempotency handles the duplicates.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let drain = tokio::time::timeout(self.drain, futures::future::join_all(self.tasks)).await;
        if drain.is_err() {
            warn!("consumer runtime drain timed out after {:?}", self.drain);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_one<H: Handler + ?Sized>(
    broker: &Arc<InMemoryBroker>,
    dlq_topic: &str,
    handler: &H,
    mut message: BrokerMessage,
    retry: &RetryConfig,
    circuit_breaker: &CircuitBreaker,
    partition: usize,
) {
    loop {
        if !circuit_breaker.allow() {
            warn!(partition, "circuit open, routing message straight to DLQ");
            route_to_dlq(broker, dlq_topic, message, "circuit_open").await;
            return;
        }

        match handler.handle(&message).await {
            HandlerOutcome::Ack => {
                circuit_breaker.record_success();
                return;
            }
            HandlerOutcome::Permanent(reason) => {
                info!(partition, %reason, "permanent failure, routing to DLQ");
                route_to_dlq(broker, dlq_topic, message, &reason).await;
                return;
            }
            HandlerOutcome::Retry(reason) => {
                circuit_breaker.record_failure();
                if message.delivery_count >= retry.max_attempts {
                    warn!(partition, %reason, attempts = message.delivery_count, "retry budget exhausted, routing to DLQ");
                    route_to_dlq(broker, dlq_topic, message, &reason).await;
                    return;
                }
                let backoff = backoff_for(retry, message.delivery_count);
                tokio::time::sleep(backoff).await;
                message.delivery_count += 1;
            }
        }
    }
}

fn backoff_for(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = retry.base_backoff_ms.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(retry.max_backoff_ms))
}

async fn route_to_dlq(broker: &Arc<InMemoryBroker>, dlq_topic: &str, message: BrokerMessage, reason: &str) {
    let mut envelope = message.envelope;
    envelope
        .metadata
        .insert("dlqReason".to_string(), reason.to_string());
    if let Err(err) = broker.publish_named(dlq_topic, envelope).await {
        warn!(%err, dlq_topic, "failed to publish to DLQ; message is lost from this process's view");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_core::envelope::{EventEnvelope, EventPayload};
    use callaudit_core::payloads::CallReceived;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        outcome_after: usize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _message: &BrokerMessage) -> HandlerOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.outcome_after {
                HandlerOutcome::Retry("not yet".into())
            } else {
                HandlerOutcome::Ack
            }
        }
    }

    fn sample_envelope() -> EventEnvelope {
        EventEnvelope::originate(
            "call-1",
            EventPayload::CallReceived(CallReceived {
                call_id: "call-1".into(),
                caller_id: "caller".into(),
                agent_id: "agent".into(),
                channel: "phone".into(),
                file_handle: "h".into(),
                file_format: "wav".into(),
                file_size_bytes: 1,
                duration: None,
                start_time: chrono::Utc::now(),
            }),
        )
    }

    #[tokio::test]
    async fn retries_then_acks_within_budget() {
        let broker = InMemoryBroker::new(1);
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            outcome_after: 2,
        });
        let retry = RetryConfig {
            max_attempts: 5,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
        };
        let runtime = ConsumerRuntime::spawn(
            broker.clone(),
            Topic::CallsReceived,
            handler.clone(),
            retry,
            Duration::from_secs(1),
        );
        broker
            .publish(Topic::CallsReceived, sample_envelope())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        runtime.shutdown().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    struct AlwaysPermanent;

    #[async_trait]
    impl Handler for AlwaysPermanent {
        async fn handle(&self, _message: &BrokerMessage) -> HandlerOutcome {
            HandlerOutcome::Permanent("bad envelope".into())
        }
    }

    #[tokio::test]
    async fn permanent_failure_routes_to_dlq() {
        let broker = InMemoryBroker::new(1);
        let mut dlq_rx = broker.take_partition_receivers_named(&Topic::CallsReceived.dlq());
        let handler = Arc::new(AlwaysPermanent);
        let retry = RetryConfig {
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
        };
        let runtime = ConsumerRuntime::spawn(
            broker.clone(),
            Topic::CallsReceived,
            handler,
            retry,
            Duration::from_secs(1),
        );
        broker
            .publish(Topic::CallsReceived, sample_envelope())
            .await
            .unwrap();

        let dlq_msg = tokio::time::timeout(Duration::from_millis(200), dlq_rx[0].recv())
            .await
            .expect("dlq message")
            .expect("channel open");
        assert_eq!(
            dlq_msg.envelope.metadata.get("dlqReason").unwrap(),
            "bad envelope"
        );
        runtime.shutdown().await;
    }
}
