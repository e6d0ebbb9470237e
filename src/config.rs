//! Run configuration.
//!
//! [`HarvestConfig`] is built once from the command line (and an optional
//! YAML file of defaults), validated, and then handed to the harvester by
//! value. Nothing downstream mutates it.
//!
//! # YAML file
//!
//! Every key is optional and uses the long flag name with underscores:
//!
//! ```yaml
//! query: "climate change"
//! lang: en
//! since_date: 2024-01-01
//! until_date: 2024-01-07
//! rows: 200
//! kafka_brokers: "kafka-1:9092,kafka-2:9092"
//! topic: ingest.news
//! output_json: /var/lib/mediacloud/stories.jsonl
//! ```

use crate::cli::Cli;
use crate::error::{HarvestError, Result};
use crate::harvest::window::Direction;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const DEFAULT_API_URL: &str = "https://api.mediacloud.org/api/v2";
pub const DEFAULT_TOPIC: &str = "ingest.news";
pub const DEFAULT_ROWS: u32 = 500;
const DATE_FORMAT: &str = "%Y-%m-%d";

static LANGUAGE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{2}$").unwrap());

/// What the resume cursor starts at when a new date window begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorPolicy {
    /// Every window starts from the run's initial resume ID.
    #[default]
    ResetPerWindow,
    /// Each window starts where the previous one stopped.
    CarryForward,
}

/// Kafka destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
}

/// Validated, immutable configuration for one harvest run.
///
/// Only [`HarvestConfig::from_sources`] builds one; fields are read through
/// accessors so a validated value cannot be altered afterwards.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    query: String,
    language: Option<String>,
    since: NaiveDate,
    until: NaiveDate,
    initial_cursor: u64,
    limit: u64,
    page_size: u32,
    api_key: String,
    api_url: String,
    kafka: Option<KafkaConfig>,
    output_json: Option<PathBuf>,
    cursor_policy: CursorPolicy,
    direction: Direction,
}

/// Optional defaults read from a YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub query: Option<String>,
    pub lang: Option<String>,
    pub since_date: Option<String>,
    pub until_date: Option<String>,
    pub last_id: Option<u64>,
    pub limit: Option<u64>,
    pub rows: Option<u32>,
    pub kafka_brokers: Option<String>,
    pub topic: Option<String>,
    pub mediacloud_key: Option<String>,
    pub api_url: Option<String>,
    pub output_json: Option<PathBuf>,
    #[serde(default)]
    pub carry_cursor: bool,
    #[serde(default)]
    pub forward: bool,
}

impl FileConfig {
    #[instrument(level = "info")]
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            HarvestError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let file = serde_yaml::from_str(&text)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(file)
    }
}

impl HarvestConfig {
    /// Build and validate the run configuration.
    ///
    /// CLI values win over file values. `today` is the fallback for a
    /// missing since date; a missing until date falls back to the since date.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] for a missing query or API key, malformed
    /// dates, `since > until`, a zero page size, a malformed language code,
    /// or an empty broker list/topic.
    pub fn from_sources(cli: Cli, file: FileConfig, today: NaiveDate) -> Result<Self> {
        let query = cli
            .query
            .or(file.query)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| HarvestError::config("a query is required"))?;

        let api_key = cli
            .mediacloud_key
            .or(file.mediacloud_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                HarvestError::config("a MediaCloud key is required (--mediacloud-key or MEDIACLOUD_KEY)")
            })?;

        let since = match cli.since_date.or(file.since_date) {
            Some(s) => parse_date("since date", &s)?,
            None => today,
        };
        let until = match cli.until_date.or(file.until_date) {
            Some(s) => parse_date("until date", &s)?,
            None => since,
        };
        if since > until {
            return Err(HarvestError::config(format!(
                "since date {since} is after until date {until}"
            )));
        }

        let page_size = cli.rows.or(file.rows).unwrap_or(DEFAULT_ROWS);
        if page_size == 0 {
            return Err(HarvestError::config("rows must be at least 1"));
        }

        let language = match cli.lang.or(file.lang) {
            Some(lang) if LANGUAGE_CODE.is_match(&lang) => Some(lang.to_ascii_lowercase()),
            Some(lang) => {
                return Err(HarvestError::config(format!(
                    "language must be a 2-letter code, got '{lang}'"
                )));
            }
            None => None,
        };

        let topic = cli
            .topic
            .or(file.topic)
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let kafka = match cli.kafka_brokers.or(file.kafka_brokers) {
            Some(list) => Some(parse_kafka(&list, topic)?),
            None => None,
        };

        let carry = cli.carry_cursor || file.carry_cursor;
        let forward = cli.forward || file.forward;

        Ok(Self {
            query,
            language,
            since,
            until,
            initial_cursor: cli.last_id.or(file.last_id).unwrap_or(0),
            limit: cli.limit.or(file.limit).unwrap_or(0),
            page_size,
            api_key,
            api_url: cli
                .api_url
                .or(file.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            kafka,
            output_json: cli.output_json.or(file.output_json),
            cursor_policy: if carry {
                CursorPolicy::CarryForward
            } else {
                CursorPolicy::ResetPerWindow
            },
            direction: if forward {
                Direction::Forward
            } else {
                Direction::Backward
            },
        })
    }

    /// Free-text Solr query.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Lower-cased 2-letter language filter.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn since(&self) -> NaiveDate {
        self.since
    }

    pub fn until(&self) -> NaiveDate {
        self.until
    }

    /// Resume ID the first window (or every window) starts from.
    pub fn initial_cursor(&self) -> u64 {
        self.initial_cursor
    }

    /// Capture limit, 0 for unbounded.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Stories requested per page, at least 1.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn kafka(&self) -> Option<&KafkaConfig> {
        self.kafka.as_ref()
    }

    pub fn output_json(&self) -> Option<&Path> {
        self.output_json.as_deref()
    }

    pub fn cursor_policy(&self) -> CursorPolicy {
        self.cursor_policy
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

fn parse_date(what: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        HarvestError::config(format!("{what} '{value}' is not YYYY-MM-DD: {e}"))
    })
}

fn parse_kafka(list: &str, topic: String) -> Result<KafkaConfig> {
    let brokers: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect();
    if brokers.is_empty() {
        return Err(HarvestError::config("kafka broker list is empty"));
    }
    if topic.trim().is_empty() {
        return Err(HarvestError::config("kafka topic is empty"));
    }
    Ok(KafkaConfig { brokers, topic })
}
