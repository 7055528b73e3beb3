use thiserror::Error;

/// Error building a [`Message`](crate::Message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message topic must not be empty")]
    EmptyTopic,
}

/// Error reported by a [`Driver`](crate::driver::Driver).
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver has been shut down and accepts no more work.
    #[error("driver closed")]
    Closed,
    /// The payload could not be serialized for the wire.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// The producer refused to enqueue the record.
    #[error("producer rejected message for topic {topic}: {reason}")]
    Enqueue { topic: String, reason: String },
    /// The broker could not be reached or the client could not be created.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The broker-side subscription could not be established.
    #[error("consume failed for topic {topic}: {reason}")]
    Consume { topic: String, reason: String },
}

/// Error raised by a [`Handler`](crate::Handler) while handling a message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the message.
    #[error("handler failed: {0}")]
    Failed(String),
    /// The payload did not have the shape the handler expected.
    #[error("payload decode failed: {0}")]
    Decode(String),
    /// The handler panicked; the panic was caught by the dispatch loop.
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Decode(err.to_string())
    }
}

/// Error returned by [`Messenger`](crate::Messenger) lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    #[error("dispatch loop already running")]
    AlreadyStarted,
}

/// Error loading [`Settings`](crate::config::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
