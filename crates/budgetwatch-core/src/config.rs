//! Configuration management for budgetwatch

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Broker configuration
    pub broker: BrokerConfig,

    /// Publisher configuration
    pub publisher: PublisherConfig,

    /// Consumer configuration
    pub consumer: ConsumerConfig,

    /// Notification channel configuration
    pub channels: ChannelsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional TOML file plus environment
    /// overrides (`BUDGETWATCH_BROKER__TOPIC=...`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BUDGETWATCH")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::config(e.to_string()))
    }
}

/// Broker connection and topic configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Topic that alert events are published to
    pub topic: String,
    /// Number of topic partitions
    pub partitions: u32,
    /// Replication factor (1 for single-broker deployments)
    pub replication_factor: u32,
    /// Consumer group id for the notification pipeline
    pub group_id: String,
    /// Require idempotent producer semantics from the broker client
    pub idempotent_producer: bool,
    /// Require full acknowledgment before a send is reported successful
    pub acks_all: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic: "budget-alerts".to_string(),
            partitions: 3,
            replication_factor: 1,
            group_id: "notification-service-group".to_string(),
            idempotent_producer: true,
            acks_all: true,
        }
    }
}

/// Publisher (outbox + drain task) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Capacity of the bounded outbox queue
    pub outbox_capacity: usize,
    /// Maximum send attempts per event before it is dropped
    pub max_retries: u32,
    /// Base backoff between retries
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Maximum number of users tracked for per-user timestamp ordering
    pub timestamp_cache_capacity: usize,
    /// How long an idle user stays in the timestamp cache
    #[serde(with = "humantime_serde")]
    pub timestamp_cache_ttl: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 1024,
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            timestamp_cache_capacity: 10_000,
            timestamp_cache_ttl: Duration::from_secs(60 * 60 * 24),
        }
    }
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Maximum number of event ids held in the dedup cache per partition
    pub dedup_capacity: usize,
    /// How long a seen event id suppresses redelivery
    #[serde(with = "humantime_serde")]
    pub dedup_ttl: Duration,
    /// Maximum records fetched per poll
    pub fetch_max_records: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 10_000,
            dedup_ttl: Duration::from_secs(24 * 60 * 60),
            fetch_max_records: 100,
        }
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Email gateway endpoint; unset disables the email channel
    pub email_gateway_url: Option<String>,
    /// Domain used to derive a recipient address from a user id
    pub email_domain: String,
    /// Push gateway endpoint; unset disables the push channel
    pub push_gateway_url: Option<String>,
    /// HTTP timeout for gateway requests
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            email_gateway_url: None,
            email_domain: "example.com".to_string(),
            push_gateway_url: None,
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
