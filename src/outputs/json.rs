//! Newline-delimited JSON log of captured stories.
//!
//! Each captured story is written as the raw object MediaCloud returned, on
//! a line of its own, in capture order. The file is opened for appending so
//! successive runs accumulate into the same log.
//!
//! ```text
//! {"processed_stories_id":1001,"url":"https://…","language":"en",…}
//! {"processed_stories_id":1003,"url":"https://…","language":"en",…}
//! ```

use super::Sink;
use crate::error::{HarvestError, Result};
use crate::models::Story;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, instrument};

pub struct JsonLogSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLogSink {
    /// Open (creating if needed) the log for appending.
    ///
    /// Missing parent directories are created.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(dir = %parent.display(), error = %e, "Failed to create JSON log dir");
                return Err(e.into());
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                HarvestError::config(format!("cannot open JSON log {}: {e}", path.display()))
            })?;

        info!("JSON log opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait(?Send)]
impl Sink for JsonLogSink {
    fn name(&self) -> &str {
        "json"
    }

    /// Write and flush one line. A write error fails this delivery only.
    async fn deliver(&mut self, story: &Story, _key: &str) -> Result<()> {
        let mut line = serde_json::to_vec(&story.raw)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| HarvestError::publish("json", e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| HarvestError::publish("json", e))
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        info!(path = %self.path.display(), "JSON log flushed");
        Ok(())
    }
}
