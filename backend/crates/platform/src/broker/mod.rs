//! Message Broker
//!
//! - `channel` - transport traits for publish channels and consumers
//! - `producer` - `EventBus`, the confirm-aware channel-pool publisher
//! - `memory` - in-process broker implementing both sides
//! - `topic` - topic routing-key matching

pub mod channel;
pub mod error;
pub mod memory;
pub mod producer;
pub mod topic;

pub use channel::{
    BrokerConnection, ConsumerConnection, Delivery, ExchangeSpec, MessageConsumer, QueueTopology,
};
pub use error::{BrokerError, PublishError};
pub use memory::MemoryBroker;
pub use producer::{EventBus, EventBusConfig, EventPublisher};
