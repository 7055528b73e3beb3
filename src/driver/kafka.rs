//! Kafka-backed driver.
//!
//! Requires the `kafka` feature. Uses rdkafka: a single threaded producer
//! shared by all dispatches, and one stream consumer per subscription with
//! the subscription's service id as consumer group.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{Driver, Inbox};
use crate::error::DriverError;
use crate::message::{decode_payload, Message};

/// Connection settings for [`KafkaDriver`].
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap brokers, e.g. `["kafka:9092"]`.
    pub brokers: Vec<String>,
    /// Extra librdkafka properties applied to both producer and consumers.
    #[serde(default)]
    pub client_properties: HashMap<String, String>,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_inbox_capacity() -> usize {
    Inbox::DEFAULT_CAPACITY
}

impl KafkaConfig {
    pub fn new<I, S>(brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            brokers: brokers.into_iter().map(Into::into).collect(),
            client_properties: HashMap::new(),
            inbox_capacity: default_inbox_capacity(),
        }
    }

    /// Set an extra librdkafka property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_properties.insert(key.into(), value.into());
        self
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", self.brokers.join(","));
        for (key, value) in &self.client_properties {
            config.set(key, value);
        }
        config
    }
}

/// Logs failed deliveries reported by the producer's background thread.
struct DeliveryLogger;

impl ClientContext for DeliveryLogger {}

impl ProducerContext for DeliveryLogger {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        if let Err((e, record)) = result {
            tracing::warn!(topic = %record.topic(), error = %e, "kafka delivery failed");
        }
    }
}

/// [`Driver`] speaking to a Kafka-compatible broker.
pub struct KafkaDriver {
    config: KafkaConfig,
    producer: ThreadedProducer<DeliveryLogger>,
    inbox: Inbox,
}

impl KafkaDriver {
    /// Create the driver and its producer. Consumers are created per
    /// subscription in [`Driver::consume`].
    pub fn new(config: KafkaConfig) -> Result<Self, DriverError> {
        if config.brokers.is_empty() {
            return Err(DriverError::Connection("no brokers configured".into()));
        }
        let producer = config
            .client_config()
            .create_with_context(DeliveryLogger)
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        tracing::info!(brokers = %config.brokers.join(","), "kafka driver created");
        Ok(Self {
            inbox: Inbox::new(config.inbox_capacity),
            config,
            producer,
        })
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    /// Wait for queued records to be delivered, up to `timeout`.
    pub fn flush(&self, timeout: Duration) -> Result<(), DriverError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| DriverError::Connection(e.to_string()))
    }

    fn consumer(&self, topic: &str, service_id: &str) -> Result<StreamConsumer, DriverError> {
        let consumer: StreamConsumer = self
            .config
            .client_config()
            .set("group.id", service_id)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| DriverError::Consume {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        consumer.subscribe(&[topic]).map_err(|e| DriverError::Consume {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        Ok(consumer)
    }
}

/// Translate a Kafka record; records without a payload get an empty one.
fn inbound_message<M: KafkaMessage>(record: &M) -> Option<Message> {
    let payload = record.payload().map(decode_payload).unwrap_or_default();
    match Message::new(record.topic(), payload) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(error = %e, "dropping kafka record");
            None
        }
    }
}

#[async_trait]
impl Driver for KafkaDriver {
    async fn consume(
        &self,
        topic: &str,
        service_id: &str,
        token: CancellationToken,
    ) -> Result<(), DriverError> {
        let consumer = self.consumer(topic, service_id)?;
        tracing::info!(topic = %topic, group = %service_id, "kafka subscription started");

        loop {
            let message = {
                let received = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    received = consumer.recv() => received,
                };
                match received {
                    Ok(record) => inbound_message(&record),
                    Err(e) => {
                        tracing::warn!(topic = %topic, error = %e, "kafka consumer error");
                        None
                    }
                }
            };

            if let Some(message) = message {
                if !self.inbox.push_until(message, &token).await? {
                    break;
                }
            }
        }

        tracing::info!(topic = %topic, group = %service_id, "kafka subscription stopped");
        Ok(())
    }

    async fn dispatch(&self, message: &Message) -> Result<(), DriverError> {
        let bytes = message.to_wire()?;
        self.producer
            .send(BaseRecord::<(), Vec<u8>>::to(message.topic()).payload(&bytes))
            .map_err(|(e, _)| DriverError::Enqueue {
                topic: message.topic().to_string(),
                reason: e.to_string(),
            })
    }

    async fn receive(&self) -> Option<Message> {
        self.inbox.recv().await
    }
}
