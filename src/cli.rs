//! Command-line interface definitions for MediaCloud Stream.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and broker addresses can also come from environment variables,
//! and any option may be given a default through a YAML file (`--config`).

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the MediaCloud Stream application.
///
/// Values given here take precedence over the YAML configuration file.
/// Validation happens when they are folded into
/// [`HarvestConfig`](crate::config::HarvestConfig).
///
/// # Examples
///
/// ```sh
/// # Harvest one day of stories into a JSON log
/// mediacloud_stream -q 'climate' --since-date 2024-01-01 -o stories.jsonl
///
/// # Stream a week of English stories to Kafka, stopping after 1000
/// mediacloud_stream -q 'climate' -l en \
///     --since-date 2024-01-01 --until-date 2024-01-07 \
///     -b kafka-1:9092,kafka-2:9092 --limit 1000
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Solr query sent to MediaCloud (required here or in the config file)
    #[arg(short, long)]
    pub query: Option<String>,

    /// 2-letter language code to keep (e.g. 'en' for English)
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Start gathering stories from this date (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub since_date: Option<String>,

    /// Continue gathering stories until this date (YYYY-MM-DD, default: since date)
    #[arg(long)]
    pub until_date: Option<String>,

    /// Oldest processed story ID to resume from
    #[arg(long)]
    pub last_id: Option<u64>,

    /// Maximum number of stories to capture (0 = unbounded)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Batch size to request from MediaCloud
    #[arg(long)]
    pub rows: Option<u32>,

    /// Comma-separated list of Kafka brokers
    #[arg(short = 'b', long, env = "KAFKA_BROKERS")]
    pub kafka_brokers: Option<String>,

    /// Kafka topic to publish to
    #[arg(short, long)]
    pub topic: Option<String>,

    /// MediaCloud user application key
    #[arg(short = 'k', long, env = "MEDIACLOUD_KEY", hide_env_values = true)]
    pub mediacloud_key: Option<String>,

    /// MediaCloud API base URL
    #[arg(long, env = "MEDIACLOUD_API_URL")]
    pub api_url: Option<String>,

    /// Append captured stories to this newline-delimited JSON file
    #[arg(short, long)]
    pub output_json: Option<PathBuf>,

    /// Keep the resume ID from the previous day instead of resetting it
    #[arg(long)]
    pub carry_cursor: bool,

    /// Walk days oldest first instead of newest first
    #[arg(long)]
    pub forward: bool,

    /// Optional path to a YAML file providing defaults for the options above
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
