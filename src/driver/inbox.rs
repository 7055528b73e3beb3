//! Inbound channel shared by all subscriptions of one driver.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;
use crate::message::Message;

/// Bounded many-writer / single-reader queue of inbound messages.
///
/// Subscription tasks push through [`Inbox::push`] or [`Inbox::push_until`];
/// the dispatch loop drains it with [`Inbox::recv`]. A full inbox makes writers wait, which is how
/// broker reads are throttled to the pace of the handlers.
#[derive(Debug)]
pub struct Inbox {
    tx: mpsc::Sender<Message>,
    rx: Mutex<mpsc::Receiver<Message>>,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl Inbox {
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create an inbox holding up to `capacity` undelivered messages.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Push a message, waiting for room if the inbox is full.
    pub async fn push(&self, message: Message) -> Result<(), DriverError> {
        self.tx.send(message).await.map_err(|_| DriverError::Closed)
    }

    /// Push a message unless `token` is cancelled while waiting for room.
    ///
    /// Returns `Ok(false)` when the push was abandoned because of cancellation.
    pub async fn push_until(
        &self,
        message: Message,
        token: &CancellationToken,
    ) -> Result<bool, DriverError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(false),
            sent = self.tx.send(message) => sent.map(|_| true).map_err(|_| DriverError::Closed),
        }
    }

    /// Receive the next message.
    pub async fn recv(&self) -> Option<Message> {
        self.rx.lock().await.recv().await
    }

    /// Number of messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
