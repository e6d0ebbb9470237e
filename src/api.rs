//! MediaCloud search API access.
//!
//! The harvest loop only needs one call, [`StoryApi::story_list`]: "give me
//! up to `rows` stories matching this query and filter whose
//! `processed_stories_id` is above this cursor". [`MediaCloudClient`]
//! implements it against the public `stories_public/list` endpoint; tests
//! implement it with scripted responses.
//!
//! # Errors
//!
//! Nothing here retries. Transport failures, non-success statuses and
//! undecodable bodies are all returned to the caller, which abandons the
//! current date window.

use crate::error::{HarvestError, Result};
use crate::models::Story;
use crate::utils::truncate_for_log;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Source of story pages.
pub trait StoryApi {
    /// Fetch up to `rows` stories matching `query` and `filter` with an
    /// identifier strictly greater than `last_processed_stories_id`,
    /// ordered by ascending identifier.
    async fn story_list(
        &self,
        query: &str,
        filter: &str,
        last_processed_stories_id: u64,
        rows: u32,
    ) -> Result<Vec<Story>>;
}

/// HTTP client for the MediaCloud v2 API.
pub struct MediaCloudClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl MediaCloudClient {
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.mediacloud.org/api/v2`
    /// * `key` - User application key, sent as the `key` query parameter
    pub fn new(base_url: &str, key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/stories_public/list", self.base_url)
    }
}

// Keep the key out of logs.
impl fmt::Debug for MediaCloudClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCloudClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl StoryApi for MediaCloudClient {
    #[instrument(level = "debug", skip(self, query))]
    async fn story_list(
        &self,
        query: &str,
        filter: &str,
        last_processed_stories_id: u64,
        rows: u32,
    ) -> Result<Vec<Story>> {
        let t0 = Instant::now();
        let response = self
            .http
            .get(self.endpoint())
            .query(&[
                ("q", query),
                ("fq", filter),
                ("sort", "processed_stories_id"),
                ("key", self.key.as_str()),
            ])
            .query(&[
                ("last_processed_stories_id", last_processed_stories_id.to_string()),
                ("rows", rows.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(%status, elapsed_ms = dt.as_millis() as u64, "MediaCloud request failed");
            return Err(HarvestError::fetch(format!(
                "MediaCloud returned {status}: {}",
                truncate_for_log(&body, 300)
            )));
        }

        let stories = parse_story_list(&body)?;
        debug!(count = stories.len(), elapsed_ms = dt.as_millis() as u64, "MediaCloud page received");
        Ok(stories)
    }
}

/// Decode a `stories_public/list` response body.
///
/// The endpoint answers with a JSON array of story objects. Error payloads
/// come back as an object with an `error` field.
pub fn parse_story_list(body: &str) -> Result<Vec<Story>> {
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => items.into_iter().map(Story::from_json).collect(),
        Value::Object(obj) => {
            let reason = obj
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unexpected object response");
            Err(HarvestError::fetch(format!("MediaCloud error: {reason}")))
        }
        other => Err(HarvestError::fetch(format!(
            "unexpected response: {}",
            truncate_for_log(&other.to_string(), 300)
        ))),
    }
}
