//! Settings for wiring a messenger from files and environment.
//!
//! Sources, later ones overriding earlier ones:
//! 1. `config/default.*` (optional)
//! 2. `config/local.*` (optional, not tracked)
//! 3. `MESSENGER_*` environment variables, `__` between nested keys,
//!    e.g. `MESSENGER_DRIVER__KIND=kafka`, `MESSENGER_DRIVER__BROKERS=kafka:9092`

use std::collections::HashMap;
use std::sync::Arc;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::driver::{Driver, InMemoryDriver};
use crate::error::ConfigError;
use crate::logger::{Logger, NoopLogger, TracingLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerKind {
    Noop,
    #[default]
    Tracing,
    Index,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverSettings {
    #[serde(default)]
    pub kind: DriverKind,
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
    /// Extra client properties passed to the broker library.
    #[serde(default)]
    pub client_properties: HashMap<String, String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            kind: DriverKind::default(),
            brokers: Vec::new(),
            inbox_capacity: default_inbox_capacity(),
            client_properties: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerSettings {
    #[serde(default)]
    pub kind: LoggerKind,
    /// Search-index host, required for `kind = "index"`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            kind: LoggerKind::default(),
            host: None,
            index: default_index(),
            doc_type: default_doc_type(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub logger: LoggerSettings,
    #[serde(default = "default_service_id")]
    pub service_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            driver: DriverSettings::default(),
            logger: LoggerSettings::default(),
            service_id: default_service_id(),
        }
    }
}

fn default_inbox_capacity() -> usize {
    crate::driver::Inbox::DEFAULT_CAPACITY
}

fn default_index() -> String {
    "log".to_string()
}

fn default_doc_type() -> String {
    "message".to_string()
}

fn default_service_id() -> String {
    "messenger".to_string()
}

impl Settings {
    /// Load from the default file locations and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("MESSENGER")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("driver.brokers")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    /// Deserialize and validate an already-built configuration.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_id.is_empty() {
            return Err(ConfigError::Invalid("service_id must not be empty".into()));
        }
        if self.driver.kind == DriverKind::Kafka && self.driver.brokers.is_empty() {
            return Err(ConfigError::Invalid(
                "driver.brokers is required for the kafka driver".into(),
            ));
        }
        if self.logger.kind == LoggerKind::Index && self.logger.host.is_none() {
            return Err(ConfigError::Invalid(
                "logger.host is required for the index logger".into(),
            ));
        }
        Ok(())
    }
}

impl DriverSettings {
    /// Build the configured driver.
    pub fn build(&self) -> Result<Arc<dyn Driver>, ConfigError> {
        match self.kind {
            DriverKind::Memory => Ok(Arc::new(InMemoryDriver::with_capacity(
                self.inbox_capacity,
            ))),
            DriverKind::Kafka => self.build_kafka(),
        }
    }

    /// First broker address, for reachability probing.
    pub fn primary_broker(&self) -> Option<&str> {
        self.brokers.first().map(String::as_str)
    }

    #[cfg(feature = "kafka")]
    fn build_kafka(&self) -> Result<Arc<dyn Driver>, ConfigError> {
        let driver = crate::driver::KafkaDriver::new(crate::driver::KafkaConfig::from(self))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Arc::new(driver))
    }

    #[cfg(not(feature = "kafka"))]
    fn build_kafka(&self) -> Result<Arc<dyn Driver>, ConfigError> {
        Err(ConfigError::Invalid(
            "kafka driver requested but the `kafka` feature is disabled".into(),
        ))
    }
}

#[cfg(feature = "kafka")]
impl From<&DriverSettings> for crate::driver::KafkaConfig {
    fn from(settings: &DriverSettings) -> Self {
        Self {
            brokers: settings.brokers.clone(),
            client_properties: settings.client_properties.clone(),
            inbox_capacity: settings.inbox_capacity,
        }
    }
}

impl LoggerSettings {
    /// Build the configured logger.
    pub fn build(&self) -> Result<Arc<dyn Logger>, ConfigError> {
        match self.kind {
            LoggerKind::Noop => Ok(Arc::new(NoopLogger)),
            LoggerKind::Tracing => Ok(Arc::new(TracingLogger)),
            LoggerKind::Index => self.build_index(),
        }
    }

    #[cfg(feature = "index-logger")]
    fn build_index(&self) -> Result<Arc<dyn Logger>, ConfigError> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("logger.host is required".into()))?;
        Ok(Arc::new(crate::logger::IndexLogger::new(
            host,
            &self.index,
            &self.doc_type,
        )))
    }

    #[cfg(not(feature = "index-logger"))]
    fn build_index(&self) -> Result<Arc<dyn Logger>, ConfigError> {
        Err(ConfigError::Invalid(
            "index logger requested but the `index-logger` feature is disabled".into(),
        ))
    }
}
