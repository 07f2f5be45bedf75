//! Email Dispatcher
//!
//! One worker per email kind. Each consumes its queue with prefetch 1 and
//! manual acknowledgements:
//!
//! - body that is not an envelope of the expected type: dead-lettered
//! - event id already marked processed: acked without sending
//! - sent: processed marker written, then acked
//! - send failed: requeued with `x-retry-count + 1` until `max_retry`,
//!   then dead-lettered
//!
//! Shutdown is observed between messages; a message being handled is
//! always settled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kernel::event::{EMAIL_RESET_PASSWORD, EMAIL_VERIFY, EmailEventData, EventEnvelope};
use platform::broker::channel::retry_count;
use platform::broker::{BrokerError, ConsumerConnection, Delivery, MessageConsumer, QueueTopology};
use platform::cache::{self, EMAIL_PROCESSED_PREFIX, TokenStore};
use platform::supervisor::{Worker, WorkerError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::MailerConfig;
use crate::error::MailerError;
use crate::sender::{EmailMessage, EmailSender};
use crate::template;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Verify,
    ResetPassword,
}

impl EmailKind {
    pub fn event_type(self) -> &'static str {
        match self {
            EmailKind::Verify => EMAIL_VERIFY,
            EmailKind::ResetPassword => EMAIL_RESET_PASSWORD,
        }
    }

    pub fn worker_name(self) -> &'static str {
        match self {
            EmailKind::Verify => "email-verify-dispatcher",
            EmailKind::ResetPassword => "email-reset-dispatcher",
        }
    }
}

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Sent,
    Duplicate,
    /// Back on the queue with this retry count
    Requeued(i64),
    DeadLettered,
    Malformed,
}

pub struct EmailDispatcher<C, S, K>
where
    C: ConsumerConnection + Send + Sync + 'static,
    S: EmailSender + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
{
    kind: EmailKind,
    connection: Arc<C>,
    sender: Arc<S>,
    store: Arc<K>,
    topology: QueueTopology,
    max_retry: i64,
    processed_ttl: Duration,
    consumer: Mutex<Option<C::Consumer>>,
}

impl<C, S, K> EmailDispatcher<C, S, K>
where
    C: ConsumerConnection + Send + Sync + 'static,
    S: EmailSender + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
{
    pub fn new(
        kind: EmailKind,
        connection: Arc<C>,
        sender: Arc<S>,
        store: Arc<K>,
        config: &MailerConfig,
    ) -> Self {
        Self {
            kind,
            connection,
            sender,
            store,
            topology: config.topology(kind),
            max_retry: config.max_retry,
            processed_ttl: config.processed_ttl,
            consumer: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> EmailKind {
        self.kind
    }

    /// Process and settle one delivery
    pub async fn handle<D: Delivery + Send>(&self, delivery: D) -> Disposition {
        let envelope = match self.decode(delivery.body()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    queue = %self.topology.queue,
                    error = %e,
                    "Rejecting malformed email event"
                );
                settle(delivery.nack(false).await);
                return Disposition::Malformed;
            }
        };
        let attempts = retry_count(delivery.headers());
        let event_id = envelope.event_id;
        let marker = cache::key(EMAIL_PROCESSED_PREFIX, &event_id.to_string());

        let result = match self.store.exists(&marker).await {
            Ok(true) => {
                tracing::info!(event_id = %event_id, "Email event already processed");
                settle(delivery.ack().await);
                return Disposition::Duplicate;
            }
            Ok(false) => self.deliver(&envelope).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                // a lost marker only risks a duplicate mail; the send itself succeeded
                if let Err(e) = self
                    .store
                    .put(&marker, &envelope.event_type, self.processed_ttl)
                    .await
                {
                    tracing::error!(event_id = %event_id, error = %e, "Writing processed marker failed");
                }
                settle(delivery.ack().await);
                tracing::info!(event_id = %event_id, event_type = %envelope.event_type, "Email sent");
                Disposition::Sent
            }
            Err(e) if attempts < self.max_retry => {
                let next = attempts + 1;
                tracing::warn!(event_id = %event_id, retry = next, error = %e, "Email send failed, requeueing");
                settle(delivery.requeue_with_retry(next).await);
                Disposition::Requeued(next)
            }
            Err(e) => {
                tracing::error!(event_id = %event_id, attempts, error = %e, "Email send failed, dead-lettering");
                settle(delivery.nack(false).await);
                Disposition::DeadLettered
            }
        }
    }

    fn decode(&self, body: &[u8]) -> Result<EventEnvelope<EmailEventData>, MailerError> {
        let envelope: EventEnvelope<EmailEventData> = serde_json::from_slice(body)?;
        if envelope.event_type != self.kind.event_type() {
            return Err(MailerError::UnexpectedEvent(envelope.event_type));
        }
        Ok(envelope)
    }

    async fn deliver(&self, envelope: &EventEnvelope<EmailEventData>) -> Result<(), MailerError> {
        let rendered = template::render(self.kind, &envelope.data)?;
        let message = EmailMessage {
            to: envelope.data.email.clone(),
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
        };
        self.sender.send(&message).await
    }
}

fn settle(result: Result<(), BrokerError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Settling delivery failed");
    }
}

#[async_trait]
impl<C, S, K> Worker for EmailDispatcher<C, S, K>
where
    C: ConsumerConnection + Send + Sync + 'static,
    S: EmailSender + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.kind.worker_name()
    }

    async fn start(&self) -> Result<(), WorkerError> {
        let consumer = self
            .connection
            .open_consumer(&self.topology)
            .await
            .map_err(|e| WorkerError::start_failed(self.name(), e))?;
        *self.consumer.lock().await = Some(consumer);

        tracing::info!(
            queue = %self.topology.queue,
            routing_pattern = %self.topology.routing_pattern,
            "Email dispatcher consuming"
        );
        Ok(())
    }

    async fn run(&self, shutdown: CancellationToken) {
        let Some(mut consumer) = self.consumer.lock().await.take() else {
            tracing::error!(worker = self.name(), "Dispatcher run without a consumer");
            return;
        };

        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = consumer.next_delivery() => match next {
                    Some(delivery) => delivery,
                    None => {
                        tracing::warn!(queue = %self.topology.queue, "Consumer closed by broker");
                        break;
                    }
                },
            };
            self.handle(delivery).await;
        }

        consumer.close().await;
        tracing::info!(queue = %self.topology.queue, "Email dispatcher stopped");
    }
}
