//! Output fan-out for captured stories.
//!
//! A [`Publisher`] owns every configured [`Sink`] and hands each captured
//! story to all of them, in capture order.
//!
//! # Submodules
//!
//! - [`json`]: Appends the raw story object to a newline-delimited JSON log
//! - [`kafka`]: Sends `{"url": ...}` records keyed by the SHA-1 of the URL
//!   (only with the `kafka` feature)
//!
//! # Failure policy
//!
//! Opening a sink is fatal: [`Publisher::open`] fails before the harvest
//! loop starts. A failed delivery is logged and counted but never stops the
//! other sinks or the loop, and is not retried.

pub mod json;
#[cfg(feature = "kafka")]
pub mod kafka;

use crate::config::HarvestConfig;
use crate::error::Result;
#[cfg(not(feature = "kafka"))]
use crate::error::HarvestError;
use crate::models::Story;
use crate::utils::partition_key;
use async_trait::async_trait;
use tracing::{error, info, instrument};

/// A destination for captured stories.
#[async_trait(?Send)]
pub trait Sink {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Deliver one story. `key` is the stable partition key of its URL.
    async fn deliver(&mut self, story: &Story, key: &str) -> Result<()>;

    /// Flush and release the sink. Called once, after the last delivery.
    async fn close(&mut self) -> Result<()>;
}

/// Outcome of publishing one story to every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    pub attempted: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct Publisher {
    sinks: Vec<Box<dyn Sink>>,
}

impl Publisher {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Open every output named in the configuration.
    ///
    /// # Errors
    ///
    /// Any sink that cannot be opened aborts the whole run before it starts.
    #[instrument(level = "info", skip_all)]
    pub async fn open(config: &HarvestConfig) -> Result<Self> {
        let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

        if let Some(kafka_config) = config.kafka() {
            #[cfg(feature = "kafka")]
            sinks.push(Box::new(self::kafka::KafkaSink::connect(kafka_config)?));
            #[cfg(not(feature = "kafka"))]
            return Err(HarvestError::config(format!(
                "Kafka brokers {:?} configured but built without the `kafka` feature",
                kafka_config.brokers
            )));
        }

        if let Some(path) = config.output_json() {
            sinks.push(Box::new(json::JsonLogSink::open(path).await?));
        }

        let publisher = Self::new(sinks);
        info!(sinks = ?publisher.sink_names(), "Outputs ready");
        Ok(publisher)
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `story` to every sink, continuing past failures.
    pub async fn publish(&mut self, story: &Story, normalized_url: &str) -> Delivery {
        let key = partition_key(normalized_url);
        let mut delivery = Delivery::default();

        for sink in self.sinks.iter_mut() {
            delivery.attempted += 1;
            if let Err(e) = sink.deliver(story, &key).await {
                delivery.failed += 1;
                error!(sink = sink.name(), id = story.id, url = %normalized_url, error = %e, "Delivery failed");
            }
        }
        delivery
    }

    /// Close every sink, logging (not propagating) failures.
    pub async fn close(mut self) {
        for sink in self.sinks.iter_mut() {
            match sink.close().await {
                Ok(()) => info!(sink = sink.name(), "Output closed"),
                Err(e) => error!(sink = sink.name(), error = %e, "Failed to close output"),
            }
        }
    }
}
