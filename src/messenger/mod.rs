//! Routes inbound messages to handlers and publishes outbound ones.
//!
//! `Messenger<D, L>` owns a [`Driver`] and a [`Logger`] for its whole life and
//! keeps a registry of topic → handler subscriptions.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use messenger::driver::InMemoryDriver;
//! use messenger::logger::NoopLogger;
//! use messenger::{handler_fn, Message, Messenger};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let messenger = Arc::new(Messenger::new(InMemoryDriver::new(), NoopLogger));
//! let root = CancellationToken::new();
//!
//! // One consumer task per subscription, one dispatch loop in total.
//! let consumer = messenger.spawn_consumer(
//!     "hello_world",
//!     "hello-world",
//!     handler_fn("hello_world_handler", |msg| {
//!         println!("{}", msg.topic());
//!         Ok(())
//!     }),
//!     &root,
//! );
//! let dispatcher = messenger.spawn_dispatcher(root.clone());
//!
//! messenger.dispatch(&Message::empty("hello_world").unwrap()).await.unwrap();
//!
//! consumer.stop().await;
//! root.cancel();
//! dispatcher.await.unwrap().unwrap();
//! # }
//! ```

mod boundary;
mod registry;
mod subscription;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::driver::Driver;
use crate::error::{DriverError, MessengerError};
use crate::handler::Handler;
use crate::logger::Logger;
use crate::message::Message;

use registry::Registry;
use subscription::Subscription;

pub use boundary::{DispatchStats, HandlerFailure};
pub use subscription::ConsumerHandle;

const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Message-bus client: handler registry, dispatch loop and publishing.
///
/// Typical wiring: share it behind `Arc`, call [`spawn_consumer`](Self::spawn_consumer)
/// once per (topic, handler), run exactly one [`start`](Self::start) loop, and
/// publish with [`dispatch`](Self::dispatch).
pub struct Messenger<D, L> {
    driver: D,
    logger: L,
    registry: Mutex<Registry>,
    running: AtomicBool,
    next_id: AtomicU64,
    failures: broadcast::Sender<HandlerFailure>,
}

/// Clears the running flag when the dispatch loop exits or its future is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cancels a subscription and drops its registry entry when the consuming
/// future finishes or is dropped early.
struct Unsubscribe<'a> {
    registry: &'a Mutex<Registry>,
    topic: &'a str,
    handler_name: &'a str,
    id: u64,
    token: CancellationToken,
}

impl Drop for Unsubscribe<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        self.registry
            .lock()
            .remove_if_current(self.topic, self.handler_name, self.id);
    }
}

impl<D: Driver, L: Logger> Messenger<D, L> {
    pub fn new(driver: D, logger: L) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            driver,
            logger,
            registry: Mutex::new(Registry::new()),
            running: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            failures,
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register `handler` on `topic` and run the driver subscription until it ends.
    ///
    /// The subscription gets a child of `parent`; cancelling either stops it.
    /// Long-running: call it on its own task, or use
    /// [`spawn_consumer`](Self::spawn_consumer). Driver failures are logged,
    /// not returned. When the subscription ends, or this future is dropped
    /// early, its token is cancelled and its registry entry is removed unless
    /// it has already been replaced by a newer registration.
    pub async fn consume(
        &self,
        topic: &str,
        service_id: &str,
        handler: Arc<dyn Handler>,
        parent: &CancellationToken,
    ) {
        let name = handler.name().to_string();
        let (id, token) = self.register(topic, service_id, handler, parent);
        self.run_subscription(topic, service_id, &name, id, token).await;
    }

    /// Register `handler` on `topic` and run the driver subscription on a new task.
    ///
    /// The registration is visible as soon as this returns. Must be called
    /// from within a tokio runtime.
    pub fn spawn_consumer(
        self: &Arc<Self>,
        topic: &str,
        service_id: &str,
        handler: Arc<dyn Handler>,
        parent: &CancellationToken,
    ) -> ConsumerHandle {
        let name = handler.name().to_string();
        let (id, token) = self.register(topic, service_id, handler, parent);

        let messenger = Arc::clone(self);
        let task = {
            let topic = topic.to_string();
            let service_id = service_id.to_string();
            let name = name.clone();
            let token = token.clone();
            tokio::spawn(async move {
                messenger
                    .run_subscription(&topic, &service_id, &name, id, token)
                    .await;
            })
        };

        ConsumerHandle::new(topic.to_string(), name, token, task)
    }

    fn register(
        &self,
        topic: &str,
        service_id: &str,
        handler: Arc<dyn Handler>,
        parent: &CancellationToken,
    ) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        let subscription = Subscription {
            id,
            topic: topic.to_string(),
            service_id: service_id.to_string(),
            handler,
            token: token.clone(),
        };

        let replaced = self.registry.lock().insert(subscription);
        if let Some(old) = replaced {
            tracing::info!(
                topic = %topic,
                handler = %old.handler_name(),
                "replaced existing subscription"
            );
        }
        (id, token)
    }

    async fn run_subscription(
        &self,
        topic: &str,
        service_id: &str,
        handler_name: &str,
        id: u64,
        token: CancellationToken,
    ) {
        tracing::info!(
            topic = %topic,
            group = %service_id,
            handler = %handler_name,
            "subscription started"
        );

        let cleanup = Unsubscribe {
            registry: &self.registry,
            topic,
            handler_name,
            id,
            token: token.clone(),
        };
        if let Err(e) = self.driver.consume(topic, service_id, token).await {
            tracing::warn!(
                topic = %topic,
                group = %service_id,
                error = %e,
                "driver subscription failed"
            );
        }
        drop(cleanup);

        tracing::info!(
            topic = %topic,
            group = %service_id,
            handler = %handler_name,
            "subscription ended"
        );
    }

    /// Stop every subscription on `topic`, including `handler_name`'s.
    ///
    /// Cancels each subscription's token and clears the topic from the
    /// registry. Returns the number of subscriptions stopped; an unknown topic
    /// is a no-op returning 0. Use [`stop_handler`](Self::stop_handler) to
    /// stop a single handler.
    pub fn stop_consumer(&self, topic: &str, handler_name: &str) -> usize {
        let stopped = self.registry.lock().remove_topic(topic);
        if stopped.is_empty() {
            return 0;
        }
        for subscription in &stopped {
            subscription.cancel();
        }
        tracing::info!(
            topic = %topic,
            handler = %handler_name,
            stopped = stopped.len(),
            "consumer stopped"
        );
        stopped.len()
    }

    /// Stop only `handler_name`'s subscription on `topic`.
    pub fn stop_handler(&self, topic: &str, handler_name: &str) -> bool {
        let Some(subscription) = self.registry.lock().remove_handler(topic, handler_name) else {
            return false;
        };
        subscription.cancel();
        tracing::info!(topic = %topic, handler = %handler_name, "handler stopped");
        true
    }

    /// Stop every subscription on `topic`.
    pub fn stop_topic(&self, topic: &str) -> usize {
        let stopped = self.registry.lock().remove_topic(topic);
        for subscription in &stopped {
            subscription.cancel();
        }
        if !stopped.is_empty() {
            tracing::info!(topic = %topic, stopped = stopped.len(), "topic stopped");
        }
        stopped.len()
    }

    /// Stop every subscription.
    pub fn stop_all(&self) -> usize {
        let stopped = self.registry.lock().drain();
        for subscription in &stopped {
            subscription.cancel();
        }
        stopped.len()
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    /// Run the dispatch loop until `root` is cancelled or the driver's
    /// inbound stream closes.
    ///
    /// For each inbound message: log it, then call every handler registered
    /// for its topic, one after another, before reading the next message.
    /// Handler errors and panics are reported through
    /// [`failures`](Self::failures) and never stop the loop.
    ///
    /// Only one loop may run at a time; a second concurrent call returns
    /// [`MessengerError::AlreadyStarted`]. Cancelling `root` does not stop
    /// subscriptions.
    pub async fn start(&self, root: CancellationToken) -> Result<DispatchStats, MessengerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MessengerError::AlreadyStarted);
        }
        let _running = RunningGuard(&self.running);

        tracing::info!("dispatch loop started");
        let mut stats = DispatchStats::default();

        loop {
            let message = tokio::select! {
                biased;
                _ = root.cancelled() => break,
                received = self.driver.receive() => match received {
                    Some(message) => message,
                    None => {
                        tracing::info!("driver inbound stream closed");
                        break;
                    }
                },
            };
            stats.received += 1;
            self.route(&message, &root, &mut stats).await;
        }

        tracing::info!(
            received = stats.received,
            handled = stats.handled,
            failed = stats.failed,
            "dispatch loop stopped"
        );
        Ok(stats)
    }

    /// Run [`start`](Self::start) on a new task.
    pub fn spawn_dispatcher(
        self: &Arc<Self>,
        root: CancellationToken,
    ) -> JoinHandle<Result<DispatchStats, MessengerError>> {
        let messenger = Arc::clone(self);
        tokio::spawn(async move { messenger.start(root).await })
    }

    async fn route(&self, message: &Message, root: &CancellationToken, stats: &mut DispatchStats) {
        self.logger.log(message, root).await;

        let handlers = self.registry.lock().handlers_for(message.topic());
        if handlers.is_empty() {
            tracing::debug!(topic = %message.topic(), "no handlers for message");
            stats.unrouted += 1;
            return;
        }

        for handler in handlers {
            match boundary::invoke(handler.as_ref(), message) {
                Ok(()) => stats.handled += 1,
                Err(error) => {
                    stats.failed += 1;
                    self.report(HandlerFailure {
                        topic: message.topic().to_string(),
                        handler: handler.name().to_string(),
                        error: Arc::new(error),
                    });
                }
            }
        }
    }

    fn report(&self, failure: HandlerFailure) {
        tracing::error!(
            topic = %failure.topic,
            handler = %failure.handler,
            error = %failure.error,
            "handler failed"
        );
        // No receivers is fine.
        let _ = self.failures.send(failure);
    }

    /// Subscribe to handler failure reports from the dispatch loop.
    pub fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.failures.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Publish `message` through the driver. Driver errors are returned as-is.
    pub async fn dispatch(&self, message: &Message) -> Result<(), DriverError> {
        self.driver.dispatch(message).await.inspect_err(|e| {
            tracing::warn!(topic = %message.topic(), error = %e, "dispatch failed");
        })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Topics with at least one subscription.
    pub fn topics(&self) -> Vec<String> {
        self.registry.lock().topics()
    }

    /// Handler names subscribed to `topic`.
    pub fn handler_names(&self, topic: &str) -> Vec<String> {
        self.registry.lock().handler_names(topic)
    }

    pub fn is_subscribed(&self, topic: &str, handler_name: &str) -> bool {
        self.registry.lock().contains(topic, handler_name)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.registry.lock().contains_topic(topic)
    }

    /// Total number of (topic, handler) subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }
}
