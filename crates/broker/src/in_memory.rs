//! An in-process, partitioned broker standing in for a real broker
//! deployment, which is an out-of-scope external collaborator. It
//! reproduces the one property the rest of the pipeline depends on: all
//! messages for a given partition key are delivered, in production order,
//! to exactly one consumer task at a time. Multiple partitions and
//! multiple consumer tasks are where parallelism comes from.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use callaudit_core::envelope::EventEnvelope;
use callaudit_core::topics::Topic;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::BrokerError;
use crate::message::BrokerMessage;

const CHANNEL_CAPACITY: usize = 1024;

struct PartitionChannel {
    sender: mpsc::Sender<BrokerMessage>,
    receiver: Mutex<Option<mpsc::Receiver<BrokerMessage>>>,
    next_offset: AtomicU64,
}

struct TopicChannels {
    partitions: Vec<PartitionChannel>,
}

impl TopicChannels {
    fn new(partition_count: u32) -> Self {
        let partitions = (0..partition_count)
            .map(|_| {
                let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                PartitionChannel {
                    sender: tx,
                    receiver: Mutex::new(Some(rx)),
                    next_offset: AtomicU64::new(0),
                }
            })
            .collect();
        Self { partitions }
    }
}

/// In-memory stand-in for the broker. One instance is shared (via `Arc`)
/// across all producers and consumer runtimes in a process.
pub struct InMemoryBroker {
    partition_count: u32,
    topics: DashMap<String, TopicChannels>,
}

impl InMemoryBroker {
    pub fn new(partition_count: u32) -> Arc<Self> {
        Arc::new(Self {
            partition_count: partition_count.max(1),
            topics: DashMap::new(),
        })
    }

    fn topic_entry(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, TopicChannels> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| TopicChannels::new(self.partition_count));
        self.topics.get(name).expect("just inserted")
    }

    fn partition_for(&self, aggregate_id: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        aggregate_id.hash(&mut hasher);
        (hasher.finish() % self.partition_count as u64) as u32
    }

    /// Publish to a fixed topic, partitioned by the envelope's
    /// `aggregateId`.
    pub async fn publish(self: &Arc<Self>, topic: Topic, envelope: EventEnvelope) -> Result<(), BrokerError> {
        self.publish_named(topic.as_str(), envelope).await
    }

    /// Publish to an arbitrary named topic (used for DLQ topics, which are
    /// derived names rather than `Topic` variants).
    pub async fn publish_named(
        self: &Arc<Self>,
        topic_name: &str,
        envelope: EventEnvelope,
    ) -> Result<(), BrokerError> {
        let partition = self.partition_for(&envelope.aggregate_id);
        let channels = self.topic_entry(topic_name);
        let part = &channels.partitions[partition as usize % channels.partitions.len()];
        let offset = part.next_offset.fetch_add(1, Ordering::SeqCst);
        let message = BrokerMessage {
            envelope,
            partition,
            offset,
            delivery_count: 1,
        };
        part.sender
            .send(message)
            .await
            .map_err(|_| BrokerError::Closed)
    }

    /// Re-publish a message bumping its delivery count, used by the
    /// consumer runtime to requeue after a transient failure within the
    /// retry budget.
    pub async fn requeue(self: &Arc<Self>, topic_name: &str, mut message: BrokerMessage) -> Result<(), BrokerError> {
        message.delivery_count += 1;
        let channels = self.topic_entry(topic_name);
        let part = &channels.partitions[message.partition as usize % channels.partitions.len()];
        part.sender.send(message).await.map_err(|_| BrokerError::Closed)
    }

    /// Take ownership of every partition's receiver for a topic. Only one
    /// consumer group is modeled per topic; calling this twice for the
    /// same topic returns `None` for already-taken partitions.
    pub fn take_partition_receivers(&self, topic: Topic) -> Vec<mpsc::Receiver<BrokerMessage>> {
        self.take_partition_receivers_named(topic.as_str())
    }

    pub fn take_partition_receivers_named(&self, topic_name: &str) -> Vec<mpsc::Receiver<BrokerMessage>> {
        let channels = self.topic_entry(topic_name);
        channels
            .partitions
            .iter()
            .filter_map(|p| p.receiver.lock().take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_core::envelope::EventPayload;
    use callaudit_core::payloads::CallReceived;

    fn sample_envelope(call_id: &str) -> EventEnvelope {
        EventEnvelope::originate(
            call_id,
            EventPayload::CallReceived(CallReceived {
                call_id: call_id.to_string(),
                caller_id: "caller".into(),
                agent_id: "agent".into(),
                channel: "phone".into(),
                file_handle: "handle".into(),
                file_format: "wav".into(),
                file_size_bytes: 10,
                duration: None,
                start_time: chrono::Utc::now(),
            }),
        )
    }

    #[tokio::test]
    async fn same_aggregate_id_always_lands_on_same_partition() {
        let broker = InMemoryBroker::new(8);
        let mut receivers = broker.take_partition_receivers(Topic::CallsReceived);

        for _ in 0..5 {
            broker
                .publish(Topic::CallsReceived, sample_envelope("call-42"))
                .await
                .unwrap();
        }

        let mut hit_partitions = vec![];
        for (i, rx) in receivers.iter_mut().enumerate() {
            if rx.try_recv().is_ok() {
                hit_partitions.push(i);
                while rx.try_recv().is_ok() {}
            }
        }
        assert_eq!(hit_partitions.len(), 1, "all messages for one call must land on one partition");
    }

    #[tokio::test]
    async fn requeue_increments_delivery_count() {
        let broker = InMemoryBroker::new(1);
        let mut receivers = broker.take_partition_receivers(Topic::CallsReceived);
        broker
            .publish(Topic::CallsReceived, sample_envelope("call-1"))
            .await
            .unwrap();
        let msg = receivers[0].recv().await.unwrap();
        assert_eq!(msg.delivery_count, 1);

        broker
            .requeue(Topic::CallsReceived.as_str(), msg)
            .await
            .unwrap();
        let redelivered = receivers[0].recv().await.unwrap();
        assert_eq!(redelivered.delivery_count, 2);
    }
}
