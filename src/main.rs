//! # MediaCloud Stream
//!
//! Command-line entry point: query MediaCloud for stories day by day and
//! stream the unique ones to Kafka and/or a JSON log.
//!
//! ## Usage
//!
//! ```sh
//! MEDIACLOUD_KEY=... mediacloud_stream -q 'climate' \
//!     --since-date 2024-01-01 --until-date 2024-01-07 \
//!     -b localhost:9092 -o stories.jsonl
//! ```
//!
//! ## Flow
//!
//! 1. **Configure**: parse flags, merge the optional YAML file, validate
//! 2. **Open outputs**: connect to Kafka and open the JSON log (fatal on failure)
//! 3. **Harvest**: walk the date range, page, deduplicate, publish
//! 4. **Close outputs**: always, however the harvest ended

use chrono::Local;
use clap::Parser;
use mediacloud_stream::api::MediaCloudClient;
use mediacloud_stream::cli::Cli;
use mediacloud_stream::config::{FileConfig, HarvestConfig};
use mediacloud_stream::harvest;
use mediacloud_stream::outputs::Publisher;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("mediacloud_stream starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.output_json, "Parsed CLI arguments");

    // ---- Configuration ----
    let file = match &args.config {
        Some(path) => FileConfig::load(path).await?,
        None => FileConfig::default(),
    };
    let config = match HarvestConfig::from_sources(args, file, Local::now().date_naive()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    // ---- Outputs ----
    let api = MediaCloudClient::new(config.api_url(), config.api_key())?;
    let publisher = Publisher::open(&config).await?;
    if publisher.is_empty() {
        info!("No output configured; stories will only be counted");
    }

    // ---- Harvest (outputs closed on every exit) ----
    let report = harvest::run_and_close(&api, publisher, config).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        captured = report.counters.captured,
        termination = ?report.termination,
        "Execution complete"
    );

    Ok(())
}
