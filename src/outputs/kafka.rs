//! Kafka output.
//!
//! Each captured story becomes a `{"url": ...}` JSON record on the configured
//! topic. The message key is the hex SHA-1 of the normalized URL, so a given
//! URL always lands on the same partition, across runs as well as within
//! one, and consumers can deduplicate on it.

use super::Sink;
use crate::config::KafkaConfig;
use crate::error::{HarvestError, Result};
use crate::models::{OutputRecord, Story};
use ::kafka::producer::{Producer, Record, RequiredAcks};
use async_trait::async_trait;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, instrument};

/// Synchronous producer behind the [`Sink`] interface.
///
/// Each send blocks until the broker acknowledges it. On a multi-thread
/// runtime the send runs under `block_in_place`; on a current-thread
/// runtime it runs inline and stalls the loop for the round trip.
pub struct KafkaSink {
    producer: Producer,
    topic: String,
}

impl KafkaSink {
    /// Connect to the brokers and fetch topic metadata.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] when no broker can be reached.
    #[instrument(level = "info", skip_all, fields(brokers = ?config.brokers, topic = %config.topic))]
    pub fn connect(config: &KafkaConfig) -> Result<Self> {
        let producer = Producer::from_hosts(config.brokers.clone())
            .with_ack_timeout(Duration::from_secs(1))
            .with_required_acks(RequiredAcks::One)
            .create()
            .map_err(|e| {
                HarvestError::config(format!(
                    "cannot connect to Kafka brokers {:?}: {e}",
                    config.brokers
                ))
            })?;

        info!("Kafka producer connected");
        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }
}

/// Key and value bytes of the Kafka message for `story`.
///
/// The key is `key` as UTF-8 (the hex partition key), the value the
/// `{"url": ...}` record.
///
/// # Errors
///
/// [`HarvestError::Publish`] when the story has no usable URL.
pub fn encode_record(story: &Story, key: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let record = OutputRecord::from_story(story)
        .ok_or_else(|| HarvestError::publish("kafka", "story has no URL"))?;
    Ok((key.as_bytes().to_vec(), serde_json::to_vec(&record)?))
}

/// Run a blocking call without panicking on a current-thread runtime.
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

#[async_trait(?Send)]
impl Sink for KafkaSink {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn deliver(&mut self, story: &Story, key: &str) -> Result<()> {
        let (key_bytes, value) = encode_record(story, key)?;

        let topic = self.topic.as_str();
        let producer = &mut self.producer;
        run_blocking(|| producer.send(&Record::from_key_value(topic, key_bytes, value)))
            .map_err(|e| HarvestError::publish("kafka", e))?;

        debug!(id = story.id, key, "Sent to Kafka");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Sends are acknowledged synchronously, nothing is buffered.
        Ok(())
    }
}
