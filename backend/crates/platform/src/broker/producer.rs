//! Event Bus Producer
//!
//! Publishes envelopes to a durable topic exchange over a bounded pool of
//! confirm-enabled channels. A channel is held exclusively for one publish
//! so that confirm sequence numbers stay coherent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use kernel::event::EventEnvelope;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::channel::{
    BrokerConnection, CONTENT_TYPE_JSON, ChannelEvent, ExchangeSpec, Headers, OutgoingMessage,
    PublishChannel,
};
use super::error::PublishError;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub exchange: String,
    /// Maximum number of publish channels; values `<= 0` mean 1
    pub pool_size: i64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            exchange: "social.events".to_string(),
            pool_size: 4,
        }
    }
}

impl EventBusConfig {
    pub fn effective_pool_size(&self) -> usize {
        if self.pool_size <= 0 {
            1
        } else {
            self.pool_size as usize
        }
    }
}

// ============================================================================
// Publisher seam
// ============================================================================

/// Publishes events; what the core depends on
#[trait_variant::make(EventPublisher: Send)]
pub trait LocalEventPublisher {
    /// Publish `envelope` under `routing_key` and wait for the broker's
    /// verdict, or for `cancel`
    async fn publish<T: Serialize + Sync>(
        &self,
        cancel: &CancellationToken,
        routing_key: &str,
        envelope: &EventEnvelope<T>,
    ) -> Result<(), PublishError>;
}

// ============================================================================
// EventBus
// ============================================================================

pub struct EventBus<B: BrokerConnection> {
    connection: Arc<B>,
    exchange: ExchangeSpec,
    slots: Semaphore,
    idle: Mutex<Vec<B::Channel>>,
    closed: AtomicBool,
}

impl<B: BrokerConnection + Send + Sync + 'static> EventBus<B> {
    pub fn new(connection: Arc<B>, config: &EventBusConfig) -> Self {
        let pool_size = config.effective_pool_size();
        tracing::info!(
            exchange = %config.exchange,
            pool_size,
            "Event bus producer created"
        );
        Self {
            connection,
            exchange: ExchangeSpec::durable_topic(config.exchange.clone()),
            slots: Semaphore::new(pool_size),
            idle: Mutex::new(Vec::with_capacity(pool_size)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange.name
    }

    /// Channels currently parked in the pool
    pub async fn idle_channels(&self) -> usize {
        self.idle.lock().await.len()
    }

    /// Free pool slots
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop accepting publishes and close idle channels. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.slots.close();
        let mut idle = self.idle.lock().await;
        for mut channel in idle.drain(..) {
            channel.close().await;
        }
        tracing::info!(exchange = %self.exchange.name, "Event bus producer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) async fn slots_for_test(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.slots.acquire().await.unwrap()
    }

    async fn checkout(&self) -> Result<B::Channel, PublishError> {
        if let Some(channel) = self.idle.lock().await.pop() {
            return Ok(channel);
        }
        tracing::debug!(exchange = %self.exchange.name, "Opening publish channel");
        Ok(self.connection.open_publish_channel(&self.exchange).await?)
    }

    async fn checkin(&self, mut channel: B::Channel) {
        if channel.is_broken() || self.is_closed() {
            tracing::debug!(exchange = %self.exchange.name, "Discarding publish channel");
            channel.close().await;
            return;
        }
        self.idle.lock().await.push(channel);
    }

    async fn publish_on(
        &self,
        channel: &mut B::Channel,
        cancel: &CancellationToken,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<(), PublishError> {
        let seq = channel.next_publish_seq_no();
        let message_id = Uuid::new_v4().to_string();
        let message = OutgoingMessage {
            body,
            content_type: CONTENT_TYPE_JSON.to_string(),
            persistent: true,
            message_id: message_id.clone(),
            timestamp: Utc::now(),
            mandatory: true,
            headers: Headers::new(),
        };

        channel.publish(routing_key, message).await?;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                event = channel.next_event() => event,
            };

            match event {
                None => return Err(PublishError::ChannelClosed),
                Some(ChannelEvent::Return {
                    message_id: returned,
                    reply_code,
                    reply_text,
                }) if returned == message_id => {
                    return Err(PublishError::NoRoute {
                        reply_code,
                        reply_text,
                    });
                }
                Some(ChannelEvent::Confirm {
                    delivery_tag, ack, ..
                }) if delivery_tag >= seq => {
                    return if ack {
                        Ok(())
                    } else {
                        Err(PublishError::PublishRejected)
                    };
                }
                // stale confirm or return from an earlier publish
                Some(_) => continue,
            }
        }
    }
}

impl<B: BrokerConnection + Send + Sync + 'static> EventPublisher for EventBus<B> {
    async fn publish<T: Serialize + Sync>(
        &self,
        cancel: &CancellationToken,
        routing_key: &str,
        envelope: &EventEnvelope<T>,
    ) -> Result<(), PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        if self.is_closed() {
            return Err(PublishError::Closed);
        }

        let body = serde_json::to_vec(envelope)?;

        let _slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PublishError::Cancelled),
            slot = self.slots.acquire() => slot.map_err(|_| PublishError::Closed)?,
        };

        let mut channel = self.checkout().await?;
        let result = self.publish_on(&mut channel, cancel, routing_key, body).await;
        self.checkin(channel).await;

        match &result {
            Ok(()) => tracing::debug!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                routing_key,
                "Event published"
            ),
            Err(e) => tracing::warn!(
                event_id = %envelope.event_id,
                routing_key,
                error = %e,
                "Event publish failed"
            ),
        }
        result
    }
}
