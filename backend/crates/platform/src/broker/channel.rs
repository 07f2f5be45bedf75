//! Broker transport abstraction
//!
//! The producer and the consumers talk to the message broker only through
//! these traits. A channel is owned by exactly one task at a time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::error::BrokerError;

/// Header carrying the number of redeliveries a message went through
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

pub const CONTENT_TYPE_JSON: &str = "application/json";

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Int(i64),
    Str(String),
}

pub type Headers = BTreeMap<String, HeaderValue>;

/// Read `x-retry-count`; absent or non-integer counts as 0
pub fn retry_count(headers: &Headers) -> i64 {
    match headers.get(RETRY_COUNT_HEADER) {
        Some(HeaderValue::Int(n)) => *n,
        Some(HeaderValue::Str(s)) => s.parse().unwrap_or(0),
        None => 0,
    }
}

/// Message handed to `PublishChannel::publish`
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub body: Vec<u8>,
    pub content_type: String,
    /// Delivery mode 2
    pub persistent: bool,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    /// Ask the broker to return the message when no queue is bound
    pub mandatory: bool,
    pub headers: Headers,
}

/// Asynchronous notifications on a publish channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Publisher confirm; `multiple` covers every tag up to `delivery_tag`
    Confirm {
        delivery_tag: u64,
        multiple: bool,
        ack: bool,
    },
    /// Mandatory message was unroutable
    Return {
        message_id: String,
        reply_code: u16,
        reply_text: String,
    },
}

// ============================================================================
// Topology
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub durable: bool,
}

impl ExchangeSpec {
    /// Durable topic exchange
    pub fn durable_topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }
}

/// Queue declaration and binding for one consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub exchange: ExchangeSpec,
    pub queue: String,
    pub routing_pattern: String,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    pub prefetch: u16,
}

// ============================================================================
// Producer side
// ============================================================================

/// Connection able to open publish channels
#[trait_variant::make(BrokerConnection: Send)]
pub trait LocalBrokerConnection {
    type Channel: PublishChannel + Send + 'static;

    /// Open a channel, declare `exchange` (idempotent) and enable
    /// publisher confirms and return notifications on it
    async fn open_publish_channel(&self, exchange: &ExchangeSpec)
    -> Result<Self::Channel, BrokerError>;
}

#[trait_variant::make(PublishChannel: Send)]
pub trait LocalPublishChannel {
    /// Delivery tag the next `publish` will be confirmed with
    fn next_publish_seq_no(&self) -> u64;

    async fn publish(
        &mut self,
        routing_key: &str,
        message: OutgoingMessage,
    ) -> Result<(), BrokerError>;

    /// Next confirm or return; `None` once the channel is closed
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// The channel can no longer be used and must be discarded
    fn is_broken(&self) -> bool;

    async fn close(&mut self);
}

// ============================================================================
// Consumer side
// ============================================================================

#[trait_variant::make(ConsumerConnection: Send)]
pub trait LocalConsumerConnection {
    type Consumer: MessageConsumer + Send + 'static;

    /// Declare exchange, queue and binding, set QoS and start consuming
    /// with manual acknowledgements
    async fn open_consumer(&self, topology: &QueueTopology)
    -> Result<Self::Consumer, BrokerError>;
}

#[trait_variant::make(MessageConsumer: Send)]
pub trait LocalMessageConsumer {
    type Item: Delivery + Send + 'static;

    /// Wait for the next delivery; `None` once the consumer is closed
    ///
    /// Cancel safe: dropping the future never loses a message.
    async fn next_delivery(&mut self) -> Option<Self::Item>;

    async fn close(&mut self);
}

/// A message received with manual acknowledgement
///
/// Exactly one of the settling methods consumes the delivery.
#[trait_variant::make(Delivery: Send)]
pub trait LocalDelivery {
    fn body(&self) -> &[u8];

    fn headers(&self) -> &Headers;

    async fn ack(self) -> Result<(), BrokerError>;

    /// `requeue = false` dead-letters the message when the queue has a
    /// dead-letter exchange, otherwise drops it
    async fn nack(self, requeue: bool) -> Result<(), BrokerError>;

    /// Put the message back on its queue with `x-retry-count` set to
    /// `retry_count`
    async fn requeue_with_retry(self, retry_count: i64) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_count_defaults_to_zero() {
        let mut headers = Headers::new();
        assert_eq!(retry_count(&headers), 0);

        headers.insert(RETRY_COUNT_HEADER.to_string(), HeaderValue::Int(2));
        assert_eq!(retry_count(&headers), 2);

        headers.insert(
            RETRY_COUNT_HEADER.to_string(),
            HeaderValue::Str("garbage".to_string()),
        );
        assert_eq!(retry_count(&headers), 0);
    }
}
