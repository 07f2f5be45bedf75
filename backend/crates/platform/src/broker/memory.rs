//! In-process message broker
//!
//! Implements both sides of the broker abstraction with the semantics the
//! producer and the consumers rely on: durable topic exchanges, queues with
//! dead-letter routing, publisher confirms, mandatory returns and manual
//! acknowledgement. Used by single-process deployments and by tests, which
//! also drive the operator controls (`set_available`, `reject_publishes`).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::{Notify, mpsc};

use super::channel::{
    BrokerConnection, ChannelEvent, ConsumerConnection, Delivery, ExchangeSpec, HeaderValue,
    Headers, MessageConsumer, OutgoingMessage, PublishChannel, QueueTopology, RETRY_COUNT_HEADER,
};
use super::error::BrokerError;
use super::topic;

/// AMQP reply code for unroutable mandatory messages
const NO_ROUTE: u16 = 312;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Stored messages and queues
// ============================================================================

/// A message sitting in a queue
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub headers: Headers,
    pub message_id: Option<String>,
    pub content_type: Option<String>,
    pub persistent: bool,
    pub redelivered: bool,
}

impl StoredMessage {
    fn new(routing_key: &str, body: Vec<u8>, headers: Headers) -> Self {
        Self {
            routing_key: routing_key.to_string(),
            body,
            headers,
            message_id: None,
            content_type: None,
            persistent: false,
            redelivered: false,
        }
    }
}

struct MemoryQueue {
    messages: Mutex<VecDeque<StoredMessage>>,
    notify: Notify,
    dead_letter_exchange: Option<String>,
    dead_letter_routing_key: Option<String>,
}

impl MemoryQueue {
    fn push_back(&self, message: StoredMessage) {
        lock(&self.messages).push_back(message);
        self.notify.notify_one();
    }

    fn push_front(&self, message: StoredMessage) {
        lock(&self.messages).push_front(message);
        self.notify.notify_one();
    }
}

struct Binding {
    exchange: String,
    queue: String,
    pattern: String,
}

#[derive(Default)]
struct Topology {
    exchanges: HashSet<String>,
    queues: HashMap<String, Arc<MemoryQueue>>,
    bindings: Vec<Binding>,
}

struct Inner {
    topology: Mutex<Topology>,
    available: AtomicBool,
    reject_publishes: AtomicBool,
    published: AtomicU64,
}

// ============================================================================
// Broker
// ============================================================================

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                topology: Mutex::new(Topology::default()),
                available: AtomicBool::new(true),
                reject_publishes: AtomicBool::new(false),
                published: AtomicU64::new(0),
            }),
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    // --- operator controls ---------------------------------------------------

    /// Simulate an outage: while unavailable no channel can be opened and
    /// publish channels break on their next publish
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        tracing::info!(available, "Memory broker availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Nack every publish while enabled
    pub fn reject_publishes(&self, reject: bool) {
        self.inner.reject_publishes.store(reject, Ordering::SeqCst);
    }

    /// Messages accepted by `publish` so far
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::SeqCst)
    }

    // --- topology -------------------------------------------------------------

    pub fn declare_exchange(&self, exchange: &ExchangeSpec) {
        lock(&self.inner.topology)
            .exchanges
            .insert(exchange.name.clone());
    }

    /// Declare exchange and queue and bind them. Idempotent.
    pub fn declare_queue(&self, topology: &QueueTopology) {
        let mut topo = lock(&self.inner.topology);
        topo.exchanges.insert(topology.exchange.name.clone());
        topo.queues
            .entry(topology.queue.clone())
            .or_insert_with(|| {
                Arc::new(MemoryQueue {
                    messages: Mutex::new(VecDeque::new()),
                    notify: Notify::new(),
                    dead_letter_exchange: topology.dead_letter_exchange.clone(),
                    dead_letter_routing_key: topology.dead_letter_routing_key.clone(),
                })
            });
        let bound = topo.bindings.iter().any(|b| {
            b.exchange == topology.exchange.name
                && b.queue == topology.queue
                && b.pattern == topology.routing_pattern
        });
        if !bound {
            topo.bindings.push(Binding {
                exchange: topology.exchange.name.clone(),
                queue: topology.queue.clone(),
                pattern: topology.routing_pattern.clone(),
            });
        }
    }

    /// Ready messages in `queue` (0 for an unknown queue)
    pub fn queue_len(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| lock(&q.messages).len())
            .unwrap_or(0)
    }

    /// Remove and return every ready message of `queue`
    pub fn drain(&self, queue: &str) -> Vec<StoredMessage> {
        self.queue(queue)
            .map(|q| lock(&q.messages).drain(..).collect())
            .unwrap_or_default()
    }

    /// Route a raw message without confirms, as another producer would
    pub fn publish_raw(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Vec<u8>>,
        headers: Headers,
    ) -> Result<usize, BrokerError> {
        self.route(
            exchange,
            routing_key,
            StoredMessage::new(routing_key, body.into(), headers),
        )
    }

    fn queue(&self, name: &str) -> Option<Arc<MemoryQueue>> {
        lock(&self.inner.topology).queues.get(name).cloned()
    }

    /// Push `message` to every queue bound to `exchange` whose pattern
    /// matches; returns the number of queues reached
    fn route(
        &self,
        exchange: &str,
        routing_key: &str,
        message: StoredMessage,
    ) -> Result<usize, BrokerError> {
        let targets: Vec<Arc<MemoryQueue>> = {
            let topo = lock(&self.inner.topology);
            if !topo.exchanges.contains(exchange) {
                return Err(BrokerError::Topology(format!(
                    "no exchange '{exchange}'"
                )));
            }
            let mut seen = HashSet::new();
            topo.bindings
                .iter()
                .filter(|b| b.exchange == exchange && topic::matches(&b.pattern, routing_key))
                .filter(|b| seen.insert(b.queue.as_str()))
                .filter_map(|b| topo.queues.get(&b.queue).cloned())
                .collect()
        };

        for queue in &targets {
            queue.push_back(message.clone());
        }
        Ok(targets.len())
    }

    fn dead_letter(&self, queue: &MemoryQueue, message: StoredMessage) {
        let Some(exchange) = queue.dead_letter_exchange.as_deref() else {
            tracing::debug!(routing_key = %message.routing_key, "Message dropped (no dead-letter exchange)");
            return;
        };
        let routing_key = queue
            .dead_letter_routing_key
            .clone()
            .unwrap_or_else(|| message.routing_key.clone());
        match self.route(exchange, &routing_key, message) {
            Ok(0) => tracing::warn!(exchange, %routing_key, "Dead-letter message unroutable"),
            Ok(_) => tracing::debug!(exchange, %routing_key, "Message dead-lettered"),
            Err(e) => tracing::warn!(exchange, error = %e, "Dead-lettering failed"),
        }
    }
}

// ============================================================================
// Publish channel
// ============================================================================

pub struct MemoryPublishChannel {
    broker: MemoryBroker,
    exchange: String,
    next_seq: u64,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    broken: bool,
}

impl BrokerConnection for MemoryBroker {
    type Channel = MemoryPublishChannel;

    async fn open_publish_channel(
        &self,
        exchange: &ExchangeSpec,
    ) -> Result<Self::Channel, BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::Unavailable);
        }
        self.declare_exchange(exchange);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(MemoryPublishChannel {
            broker: self.clone(),
            exchange: exchange.name.clone(),
            next_seq: 1,
            events_tx,
            events_rx,
            broken: false,
        })
    }
}

impl MemoryPublishChannel {
    fn emit(&self, event: ChannelEvent) {
        // the receiver lives in self
        let _ = self.events_tx.send(event);
    }
}

impl PublishChannel for MemoryPublishChannel {
    fn next_publish_seq_no(&self) -> u64 {
        self.next_seq
    }

    async fn publish(
        &mut self,
        routing_key: &str,
        message: OutgoingMessage,
    ) -> Result<(), BrokerError> {
        if self.broken || !self.broker.is_available() {
            self.broken = true;
            return Err(BrokerError::ChannelClosed);
        }

        let delivery_tag = self.next_seq;
        self.next_seq += 1;

        if self.broker.inner.reject_publishes.load(Ordering::SeqCst) {
            self.emit(ChannelEvent::Confirm {
                delivery_tag,
                multiple: false,
                ack: false,
            });
            return Ok(());
        }

        let message_id = message.message_id.clone();
        let stored = StoredMessage {
            routing_key: routing_key.to_string(),
            body: message.body,
            headers: message.headers,
            message_id: Some(message.message_id),
            content_type: Some(message.content_type),
            persistent: message.persistent,
            redelivered: false,
        };

        match self.broker.route(&self.exchange, routing_key, stored) {
            Ok(0) if message.mandatory => self.emit(ChannelEvent::Return {
                message_id,
                reply_code: NO_ROUTE,
                reply_text: "NO_ROUTE".to_string(),
            }),
            Ok(_) => {
                self.broker.inner.published.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                self.broken = true;
                return Err(e);
            }
        }

        self.emit(ChannelEvent::Confirm {
            delivery_tag,
            multiple: false,
            ack: true,
        });
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.broken {
            return self.events_rx.try_recv().ok();
        }
        self.events_rx.recv().await
    }

    fn is_broken(&self) -> bool {
        self.broken || !self.broker.is_available()
    }

    async fn close(&mut self) {
        self.broken = true;
        self.events_rx.close();
    }
}

// ============================================================================
// Consumer
// ============================================================================

pub struct MemoryConsumer {
    broker: MemoryBroker,
    queue: Arc<MemoryQueue>,
    closed: bool,
}

impl ConsumerConnection for MemoryBroker {
    type Consumer = MemoryConsumer;

    async fn open_consumer(&self, topology: &QueueTopology) -> Result<Self::Consumer, BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::Unavailable);
        }
        self.declare_queue(topology);
        let queue = self
            .queue(&topology.queue)
            .ok_or_else(|| BrokerError::Topology(format!("no queue '{}'", topology.queue)))?;
        Ok(MemoryConsumer {
            broker: self.clone(),
            queue,
            closed: false,
        })
    }
}

impl MessageConsumer for MemoryConsumer {
    type Item = MemoryDelivery;

    async fn next_delivery(&mut self) -> Option<Self::Item> {
        loop {
            if self.closed {
                return None;
            }
            let notified = self.queue.notify.notified();
            let next = lock(&self.queue.messages).pop_front();
            if let Some(message) = next {
                return Some(MemoryDelivery {
                    broker: self.broker.clone(),
                    queue: Arc::clone(&self.queue),
                    message: Some(message),
                });
            }
            notified.await;
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// Unsettled delivery; dropping it requeues the message
pub struct MemoryDelivery {
    broker: MemoryBroker,
    queue: Arc<MemoryQueue>,
    message: Option<StoredMessage>,
}

impl MemoryDelivery {
    fn take(mut self) -> Result<(StoredMessage, Arc<MemoryQueue>), BrokerError> {
        let message = self.message.take().ok_or(BrokerError::ChannelClosed)?;
        Ok((message, Arc::clone(&self.queue)))
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        if let Some(mut message) = self.message.take() {
            message.redelivered = true;
            self.queue.push_front(message);
        }
    }
}

static EMPTY_BODY: [u8; 0] = [];
static EMPTY_HEADERS: OnceLock<Headers> = OnceLock::new();

impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        self.message
            .as_ref()
            .map(|m| m.body.as_slice())
            .unwrap_or(&EMPTY_BODY)
    }

    fn headers(&self) -> &Headers {
        self.message
            .as_ref()
            .map(|m| &m.headers)
            .unwrap_or_else(|| EMPTY_HEADERS.get_or_init(Headers::new))
    }

    async fn ack(self) -> Result<(), BrokerError> {
        self.take().map(|_| ())
    }

    async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        let broker = self.broker.clone();
        let (mut message, queue) = self.take()?;
        if requeue {
            message.redelivered = true;
            queue.push_front(message);
        } else {
            broker.dead_letter(&queue, message);
        }
        Ok(())
    }

    async fn requeue_with_retry(self, retry_count: i64) -> Result<(), BrokerError> {
        let (mut message, queue) = self.take()?;
        message
            .headers
            .insert(RETRY_COUNT_HEADER.to_string(), HeaderValue::Int(retry_count));
        message.redelivered = true;
        queue.push_back(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::channel::retry_count;

    fn topology(queue: &str, pattern: &str) -> QueueTopology {
        QueueTopology {
            exchange: ExchangeSpec::durable_topic("test.events"),
            queue: queue.to_string(),
            routing_pattern: pattern.to_string(),
            dead_letter_exchange: Some("test.dlx".to_string()),
            dead_letter_routing_key: Some("dead".to_string()),
            prefetch: 1,
        }
    }

    fn dead_letter_queue(broker: &MemoryBroker) {
        broker.declare_queue(&QueueTopology {
            exchange: ExchangeSpec::durable_topic("test.dlx"),
            queue: "dlq".to_string(),
            routing_pattern: "#".to_string(),
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            prefetch: 1,
        });
    }

    #[tokio::test]
    async fn test_routing_by_pattern() {
        let broker = MemoryBroker::new();
        broker.declare_queue(&topology("verify", "email.verify"));
        broker.declare_queue(&topology("all", "email.#"));

        broker
            .publish_raw("test.events", "email.verify", "a", Headers::new())
            .unwrap();
        broker
            .publish_raw("test.events", "email.reset.password", "b", Headers::new())
            .unwrap();

        assert_eq!(broker.queue_len("verify"), 1);
        assert_eq!(broker.queue_len("all"), 2);
    }

    #[tokio::test]
    async fn test_publish_unknown_exchange_fails() {
        let broker = MemoryBroker::new();
        assert!(matches!(
            broker.publish_raw("nope", "k", "a", Headers::new()),
            Err(BrokerError::Topology(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_and_return() {
        let broker = MemoryBroker::new();
        broker.declare_queue(&topology("verify", "email.verify"));
        let mut channel = broker
            .open_publish_channel(&ExchangeSpec::durable_topic("test.events"))
            .await
            .unwrap();

        let message = |id: &str| OutgoingMessage {
            body: b"{}".to_vec(),
            content_type: "application/json".to_string(),
            persistent: true,
            message_id: id.to_string(),
            timestamp: chrono::Utc::now(),
            mandatory: true,
            headers: Headers::new(),
        };

        assert_eq!(channel.next_publish_seq_no(), 1);
        channel.publish("email.verify", message("m1")).await.unwrap();
        assert_eq!(
            channel.next_event().await,
            Some(ChannelEvent::Confirm {
                delivery_tag: 1,
                multiple: false,
                ack: true
            })
        );

        channel.publish("nobody.listens", message("m2")).await.unwrap();
        assert!(matches!(
            channel.next_event().await,
            Some(ChannelEvent::Return { message_id, .. }) if message_id == "m2"
        ));
        assert!(matches!(
            channel.next_event().await,
            Some(ChannelEvent::Confirm { delivery_tag: 2, ack: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_outage_breaks_channels() {
        let broker = MemoryBroker::new();
        let exchange = ExchangeSpec::durable_topic("test.events");
        let channel = broker.open_publish_channel(&exchange).await.unwrap();

        broker.set_available(false);
        assert!(channel.is_broken());
        assert!(broker.open_publish_channel(&exchange).await.is_err());

        broker.set_available(true);
        assert!(broker.open_publish_channel(&exchange).await.is_ok());
    }

    #[tokio::test]
    async fn test_ack_nack_and_dead_letter() {
        let broker = MemoryBroker::new();
        dead_letter_queue(&broker);
        let mut consumer = broker
            .open_consumer(&topology("verify", "email.verify"))
            .await
            .unwrap();

        broker
            .publish_raw("test.events", "email.verify", "one", Headers::new())
            .unwrap();

        let delivery = consumer.next_delivery().await.unwrap();
        assert_eq!(delivery.body(), b"one");
        delivery.nack(true).await.unwrap();
        assert_eq!(broker.queue_len("verify"), 1);

        let delivery = consumer.next_delivery().await.unwrap();
        delivery.requeue_with_retry(1).await.unwrap();

        let delivery = consumer.next_delivery().await.unwrap();
        assert_eq!(retry_count(delivery.headers()), 1);
        delivery.nack(false).await.unwrap();

        assert_eq!(broker.queue_len("verify"), 0);
        let dead = broker.drain("dlq");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].routing_key, "dead");
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_requeued() {
        let broker = MemoryBroker::new();
        let mut consumer = broker
            .open_consumer(&topology("verify", "email.verify"))
            .await
            .unwrap();
        broker
            .publish_raw("test.events", "email.verify", "x", Headers::new())
            .unwrap();

        drop(consumer.next_delivery().await.unwrap());
        assert_eq!(broker.queue_len("verify"), 1);

        let delivery = consumer.next_delivery().await.unwrap();
        delivery.ack().await.unwrap();
        assert_eq!(broker.queue_len("verify"), 0);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let broker = MemoryBroker::new();
        let mut consumer = broker
            .open_consumer(&topology("verify", "email.verify"))
            .await
            .unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher
                .publish_raw("test.events", "email.verify", "late", Headers::new())
                .unwrap();
        });

        let delivery = consumer.next_delivery().await.unwrap();
        assert_eq!(delivery.body(), b"late");
        delivery.ack().await.unwrap();
    }
}
