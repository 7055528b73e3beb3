//! Message value type and the JSON payload codec shared by drivers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HandlerError, MessageError};

/// Payload carried by a message: an unordered mapping of string keys to JSON values.
pub type Payload = Map<String, Value>;

/// A domain message addressed to a topic.
///
/// Messages are immutable once built. Application code creates them for
/// outbound dispatch; drivers create them when records arrive from the broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    topic: String,
    payload: Payload,
}

/// Unchecked wire shape; deserialization goes through [`Message::new`].
#[derive(Deserialize)]
struct RawMessage {
    topic: String,
    #[serde(default)]
    payload: Payload,
}

impl TryFrom<RawMessage> for Message {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        Message::new(raw.topic, raw.payload)
    }
}

impl Message {
    /// Create a message for `topic` carrying `payload`.
    pub fn new(topic: impl Into<String>, payload: Payload) -> Result<Self, MessageError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(MessageError::EmptyTopic);
        }
        Ok(Self { topic, payload })
    }

    /// Create a message with an empty payload.
    pub fn empty(topic: impl Into<String>) -> Result<Self, MessageError> {
        Self::new(topic, Payload::new())
    }

    /// Create a message whose payload is the JSON object form of `value`.
    ///
    /// Values that do not serialize to a JSON object produce an empty payload.
    pub fn encode<T: Serialize>(
        topic: impl Into<String>,
        value: &T,
    ) -> Result<Self, MessageError> {
        let payload = match serde_json::to_value(value) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        };
        Self::new(topic, payload)
    }

    /// Build a message from wire bytes, decoding the payload leniently.
    pub fn from_wire(topic: impl Into<String>, bytes: &[u8]) -> Result<Self, MessageError> {
        Self::new(topic, decode_payload(bytes))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Look up a single payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Look up a payload field holding a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Deserialize the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let value = Value::Object(self.payload.clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize the payload to its wire form.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        encode_payload(&self.payload)
    }
}

/// Encode a payload as a JSON object.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(payload)
}

/// Decode wire bytes into a payload.
///
/// Malformed JSON and JSON that is not an object both yield an empty payload;
/// broker records are never rejected for their contents.
pub fn decode_payload(bytes: &[u8]) -> Payload {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!(kind = %json_kind(&other), "non-object payload, using empty map");
            Payload::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "malformed payload, using empty map");
            Payload::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
