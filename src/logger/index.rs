//! Search-index sink for inbound messages.
//!
//! Requires the `index-logger` feature. Each message becomes one document
//! `{ "topic", "payload", "success" }` posted to `{host}/{index}/{doc_type}`,
//! the document API of Elasticsearch-compatible stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::Logger;
use crate::message::{Message, Payload};

/// Document written for each inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub topic: String,
    pub payload: Payload,
    /// Whether the message was delivered and decoded by the driver. Loggers
    /// run before routing, so this never reflects handler outcomes; documents
    /// built from a [`Message`] always carry `true`.
    pub success: bool,
}

impl From<&Message> for IndexDocument {
    fn from(message: &Message) -> Self {
        Self {
            topic: message.topic().to_string(),
            payload: message.payload().clone(),
            success: true,
        }
    }
}

/// [`Logger`] writing messages to a search index over HTTP.
///
/// Indexing failures are logged with `tracing` and otherwise ignored.
pub struct IndexLogger {
    client: reqwest::Client,
    endpoint: String,
}

impl IndexLogger {
    pub fn new(host: &str, index: &str, doc_type: &str) -> Self {
        Self::with_client(reqwest::Client::new(), host, index, doc_type)
    }

    pub fn with_client(client: reqwest::Client, host: &str, index: &str, doc_type: &str) -> Self {
        let host = host.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        Self {
            client,
            endpoint: format!("{base}/{index}/{doc_type}"),
        }
    }

    /// URL documents are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn index(&self, document: &IndexDocument) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .json(document)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Logger for IndexLogger {
    async fn log(&self, message: &Message, token: &CancellationToken) {
        let document = IndexDocument::from(message);
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(topic = %document.topic, "index write abandoned");
            }
            result = self.index(&document) => {
                if let Err(e) = result {
                    tracing::warn!(topic = %document.topic, error = %e, "index write failed");
                }
            }
        }
    }
}
