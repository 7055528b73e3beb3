//! In-memory driver for testing and single-process scenarios.
//!
//! Acts as a tiny broker living inside the process:
//! - Unit and integration testing without a running Kafka
//! - Single-process applications wiring services through topics
//! - Development and prototyping

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Driver, Inbox};
use crate::error::DriverError;
use crate::message::Message;

/// topic → consumer group → live member count
type Groups = HashMap<String, HashMap<String, usize>>;

/// In-process broker implementing [`Driver`].
///
/// Features:
/// - Cheap to clone; clones share the same state
/// - Consumer groups: a dispatched message is delivered once per group
///   subscribed to its topic, however many members the group has
/// - Every dispatched message is kept in a log for inspection
/// - [`InMemoryDriver::inject`] simulates a broker delivery directly
///
/// ## Example
///
/// ```
/// use messenger::driver::{Driver, InMemoryDriver};
/// use messenger::Message;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let driver = InMemoryDriver::new();
/// driver.dispatch(&Message::empty("orders").unwrap()).await.unwrap();
/// assert_eq!(driver.dispatched_topics(), vec!["orders"]);
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryDriver {
    /// Shared inbound stream
    inbox: Arc<Inbox>,
    /// Live consumer groups per topic
    groups: Arc<Mutex<Groups>>,
    /// Every message accepted by `dispatch`, in order
    dispatched: Arc<Mutex<Vec<Message>>>,
    /// Topics passed to `consume`, in call order
    consumed: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDriver {
    /// Create a driver with the default inbox capacity.
    pub fn new() -> Self {
        Self::with_capacity(Inbox::DEFAULT_CAPACITY)
    }

    /// Create a driver whose inbox holds up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inbox: Arc::new(Inbox::new(capacity)),
            groups: Arc::new(Mutex::new(HashMap::new())),
            dispatched: Arc::new(Mutex::new(Vec::new())),
            consumed: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push a message straight onto the inbound stream, as if the broker had
    /// delivered it to one of this driver's subscriptions.
    pub async fn inject(&self, message: Message) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.inbox.push(message).await
    }

    /// All dispatched messages, oldest first.
    pub fn dispatched(&self) -> Vec<Message> {
        self.dispatched.lock().clone()
    }

    /// Topics of all dispatched messages, oldest first.
    pub fn dispatched_topics(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .iter()
            .map(|m| m.topic().to_string())
            .collect()
    }

    /// Number of times `consume` has been called.
    pub fn consume_calls(&self) -> usize {
        self.consumed.lock().len()
    }

    /// Topics passed to `consume`, in call order.
    pub fn consumed_topics(&self) -> Vec<String> {
        self.consumed.lock().clone()
    }

    /// Consumer groups currently subscribed to `topic`, sorted.
    pub fn active_groups(&self, topic: &str) -> Vec<String> {
        let mut groups: Vec<String> = self
            .groups
            .lock()
            .get(topic)
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default();
        groups.sort();
        groups
    }

    /// Number of messages waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.inbox.pending()
    }

    /// Refuse further dispatches and subscriptions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Forget dispatched messages and consume calls (useful for test cleanup).
    pub fn clear(&self) {
        self.dispatched.lock().clear();
        self.consumed.lock().clear();
    }

    fn join(&self, topic: &str, group: &str) -> Membership {
        *self
            .groups
            .lock()
            .entry(topic.to_string())
            .or_default()
            .entry(group.to_string())
            .or_insert(0) += 1;
        Membership {
            groups: Arc::clone(&self.groups),
            topic: topic.to_string(),
            group: group.to_string(),
        }
    }
}

/// Leaves the consumer group when dropped, including when the consuming
/// future is dropped before its token fires.
struct Membership {
    groups: Arc<Mutex<Groups>>,
    topic: String,
    group: String,
}

impl Drop for Membership {
    fn drop(&mut self) {
        let mut groups = self.groups.lock();
        let Some(topic_groups) = groups.get_mut(&self.topic) else {
            return;
        };
        if let Some(members) = topic_groups.get_mut(&self.group) {
            *members -= 1;
            if *members == 0 {
                topic_groups.remove(&self.group);
            }
        }
        if topic_groups.is_empty() {
            groups.remove(&self.topic);
        }
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn consume(
        &self,
        topic: &str,
        service_id: &str,
        token: CancellationToken,
    ) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.consumed.lock().push(topic.to_string());

        let _membership = self.join(topic, service_id);
        tracing::debug!(topic = %topic, group = %service_id, "in-memory subscription joined");
        token.cancelled().await;
        tracing::debug!(topic = %topic, group = %service_id, "in-memory subscription left");
        Ok(())
    }

    async fn dispatch(&self, message: &Message) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.dispatched.lock().push(message.clone());

        let deliveries = self
            .groups
            .lock()
            .get(message.topic())
            .map(|g| g.len())
            .unwrap_or(0);
        for _ in 0..deliveries {
            self.inbox.push(message.clone()).await?;
        }
        Ok(())
    }

    async fn receive(&self) -> Option<Message> {
        self.inbox.recv().await
    }
}
