//! A small message-bus client.
//!
//! A [`Messenger`] sits between application handlers and a message broker.
//! Handlers register per topic, a single dispatch loop pulls messages from the
//! [`driver::Driver`] and fans them out, and outbound messages are published
//! through the same driver. Every inbound message is passed to a
//! [`logger::Logger`] first.
//!
//! Brokers plug in behind the `Driver` trait. An in-memory driver ships by
//! default and Kafka is available behind the `kafka` feature.

pub mod config;
pub mod driver;
mod error;
mod handler;
pub mod logger;
mod message;
mod messenger;
pub mod probe;

pub use error::{ConfigError, DriverError, HandlerError, MessageError, MessengerError};
pub use handler::{handler_fn, FnHandler, Handler};
pub use message::{decode_payload, encode_payload, Message, Payload};
pub use messenger::{ConsumerHandle, DispatchStats, HandlerFailure, Messenger};
