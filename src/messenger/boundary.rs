//! Failure boundary around handler calls.
//!
//! A handler that returns an error or panics must not take the dispatch loop
//! down with it. Each call is wrapped in `catch_unwind` and any failure is
//! turned into a [`HandlerFailure`] report.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::message::Message;

/// A handler failure observed by the dispatch loop.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub topic: String,
    pub handler: String,
    /// Shared because one report is broadcast to every failure receiver.
    pub error: Arc<HandlerError>,
}

impl HandlerFailure {
    pub fn is_panic(&self) -> bool {
        matches!(*self.error, HandlerError::Panicked(_))
    }
}

/// Counters returned when the dispatch loop exits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages read from the driver.
    pub received: usize,
    /// Successful handler invocations.
    pub handled: usize,
    /// Handler invocations that returned an error or panicked.
    pub failed: usize,
    /// Messages whose topic had no registered handler.
    pub unrouted: usize,
}

/// Call `handler` with `message`, converting a panic into `HandlerError::Panicked`.
pub(crate) fn invoke(handler: &dyn Handler, message: &Message) -> Result<(), HandlerError> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
