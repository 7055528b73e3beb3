//! Handler contract and a closure adapter.

use std::fmt;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::message::Message;

/// Receives messages routed to the topics it is registered on.
///
/// Handlers are stateless by convention and shared behind `Arc`; the
/// messenger only references them. `name()` is the registry key, so it must
/// be unique among the handlers registered on one topic.
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

/// A handler backed by a closure.
pub struct FnHandler<F> {
    name: String,
    handle: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        (self.handle)(message)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// Wrap a closure as a shareable handler.
///
/// ```
/// use messenger::{handler_fn, Handler, Message};
///
/// let handler = handler_fn("print_topic", |msg: &Message| {
///     println!("{}", msg.topic());
///     Ok(())
/// });
/// assert_eq!(handler.name(), "print_topic");
/// ```
pub fn handler_fn<F>(name: impl Into<String>, handle: F) -> Arc<FnHandler<F>>
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        handle,
    })
}
