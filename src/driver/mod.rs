//! Drivers - pluggable transports between the messenger and a broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Messenger                            │
//! │  registry (topic → handler) · dispatch loop · publish        │
//! └──────────────────────────────────────────────────────────────┘
//!          │ consume(topic, group)   ▲ receive()     │ dispatch(msg)
//!          ▼                         │               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Driver trait                            │
//! │  one task per consume() ──push──▶ Inbox ──▶ single reader    │
//! └──────────────────────────────────────────────────────────────┘
//!          │                                  │
//!          ▼                                  ▼
//! ┌─────────────────┐               ┌─────────────────────┐
//! │ InMemoryDriver  │               │    KafkaDriver      │
//! │   (included)    │               │ (feature "kafka")   │
//! └─────────────────┘               └─────────────────────┘
//! ```

mod in_memory;
mod inbox;
#[cfg(feature = "kafka")]
mod kafka;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;
use crate::message::Message;

pub use in_memory::InMemoryDriver;
pub use inbox::Inbox;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaDriver};

/// Transport used by the messenger to reach a broker.
///
/// All subscriptions opened through one driver feed the same inbound stream,
/// which the messenger's dispatch loop drains through [`Driver::receive`].
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Subscribe to `topic` as a member of consumer group `service_id`.
    ///
    /// Runs until `token` is cancelled. Every record received is decoded and
    /// pushed to the inbound stream. Transient broker errors are logged and
    /// absorbed; an `Err` is only returned when the subscription cannot be
    /// set up at all.
    async fn consume(
        &self,
        topic: &str,
        service_id: &str,
        token: CancellationToken,
    ) -> Result<(), DriverError>;

    /// Hand a message to the broker for asynchronous delivery.
    ///
    /// Success means the message was accepted for sending, not that the
    /// broker acknowledged it.
    async fn dispatch(&self, message: &Message) -> Result<(), DriverError>;

    /// Next inbound message, or `None` once the stream is closed.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn receive(&self) -> Option<Message>;
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Arc<D> {
    async fn consume(
        &self,
        topic: &str,
        service_id: &str,
        token: CancellationToken,
    ) -> Result<(), DriverError> {
        (**self).consume(topic, service_id, token).await
    }

    async fn dispatch(&self, message: &Message) -> Result<(), DriverError> {
        (**self).dispatch(message).await
    }

    async fn receive(&self) -> Option<Message> {
        (**self).receive().await
    }
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Box<D> {
    async fn consume(
        &self,
        topic: &str,
        service_id: &str,
        token: CancellationToken,
    ) -> Result<(), DriverError> {
        (**self).consume(topic, service_id, token).await
    }

    async fn dispatch(&self, message: &Message) -> Result<(), DriverError> {
        (**self).dispatch(message).await
    }

    async fn receive(&self) -> Option<Message> {
        (**self).receive().await
    }
}
