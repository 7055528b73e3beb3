//! Loggers observe every inbound message before it is routed to handlers.
//!
//! Logging is a side channel: the dispatch loop awaits [`Logger::log`] but
//! never inspects its outcome, so a failing sink cannot affect routing.

#[cfg(feature = "index-logger")]
mod index;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::message::Message;

#[cfg(feature = "index-logger")]
pub use index::{IndexDocument, IndexLogger};

/// Observer invoked once per inbound message.
///
/// `token` is the dispatch loop's root token; long-running sinks should give
/// up when it is cancelled.
#[async_trait]
pub trait Logger: Send + Sync + 'static {
    async fn log(&self, message: &Message, token: &CancellationToken);
}

#[async_trait]
impl<L: Logger + ?Sized> Logger for Arc<L> {
    async fn log(&self, message: &Message, token: &CancellationToken) {
        (**self).log(message, token).await
    }
}

#[async_trait]
impl<L: Logger + ?Sized> Logger for Box<L> {
    async fn log(&self, message: &Message, token: &CancellationToken) {
        (**self).log(message, token).await
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl NoopLogger {
    pub fn new() -> Self {
        NoopLogger
    }
}

#[async_trait]
impl Logger for NoopLogger {
    async fn log(&self, _message: &Message, _token: &CancellationToken) {}
}

/// Emits one `tracing` event per message at `INFO`, target `messenger::inbound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        TracingLogger
    }
}

#[async_trait]
impl Logger for TracingLogger {
    async fn log(&self, message: &Message, _token: &CancellationToken) {
        let payload = serde_json::to_string(message.payload()).unwrap_or_default();
        tracing::info!(
            target: "messenger::inbound",
            topic = %message.topic(),
            payload = %payload,
            "message received"
        );
    }
}

/// Forwards each message to several loggers in order.
#[derive(Default, Clone)]
pub struct MultiLogger {
    loggers: Vec<Arc<dyn Logger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger to the chain.
    pub fn with(mut self, logger: impl Logger) -> Self {
        self.loggers.push(Arc::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

#[async_trait]
impl Logger for MultiLogger {
    async fn log(&self, message: &Message, token: &CancellationToken) {
        for logger in &self.loggers {
            if token.is_cancelled() {
                break;
            }
            logger.log(message, token).await;
        }
    }
}
