//! Subscription records and the handle returned for spawned consumers.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::Handler;

/// A live association of topic, consumer group, handler and cancel token.
pub(crate) struct Subscription {
    /// Distinguishes successive registrations of the same (topic, name).
    pub(crate) id: u64,
    pub(crate) topic: String,
    pub(crate) service_id: String,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) token: CancellationToken,
}

impl Subscription {
    pub(crate) fn handler_name(&self) -> &str {
        self.handler.name()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("service_id", &self.service_id)
            .field("handler", &self.handler_name())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Handle to a consumer running on its own task.
///
/// Dropping the handle does not stop the consumer; use [`cancel`](Self::cancel),
/// [`stop`](Self::stop) or one of the messenger's `stop_*` methods.
pub struct ConsumerHandle {
    topic: String,
    handler_name: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub(crate) fn new(
        topic: String,
        handler_name: String,
        token: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            topic,
            handler_name,
            token,
            task,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// The subscription's own token, a child of the parent passed at registration.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Signal the subscription to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the consumer task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the subscription and wait for its task to exit.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(topic = %self.topic, handler = %self.handler_name, error = %e, "consumer task failed");
        }
    }

    /// Wait for the consumer task to exit without cancelling it.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(topic = %self.topic, handler = %self.handler_name, error = %e, "consumer task failed");
        }
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("topic", &self.topic)
            .field("handler", &self.handler_name)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
