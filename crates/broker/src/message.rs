//! A delivered message and its delivery bookkeeping.

use callaudit_core::envelope::EventEnvelope;

#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub envelope: EventEnvelope,
    pub partition: u32,
    pub offset: u64,
    /// Incremented on each redelivery (crash before ack, or explicit retry).
    pub delivery_count: u32,
}
