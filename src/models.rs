//! Data models for harvested stories and the records forwarded downstream.
//!
//! - [`Story`]: one story as returned by the MediaCloud `stories_public/list`
//!   endpoint, with the original JSON object kept verbatim
//! - [`OutputRecord`]: the minimal record sent to the message queue

use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A story retrieved from the search backend.
///
/// The typed fields are the ones the harvest loop reasons about; everything
/// the API returned is kept in `raw` so the JSON log can reproduce it
/// unchanged.
///
/// # Fields
///
/// * `id` - MediaCloud `processed_stories_id`, ascending within a window
/// * `url` - Story URL, may be absent or empty
/// * `language` - Two-letter language code as detected by MediaCloud
/// * `publish_date` - Publication timestamp as formatted by the backend
/// * `raw` - The full JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub id: u64,
    pub url: Option<String>,
    pub language: Option<String>,
    pub publish_date: Option<String>,
    pub raw: Map<String, Value>,
}

impl Story {
    /// Build a story from one element of the API response.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Fetch`] when the element is not an object or
    /// carries no numeric `processed_stories_id`.
    pub fn from_json(value: Value) -> Result<Self> {
        let raw = match value {
            Value::Object(map) => map,
            other => {
                return Err(HarvestError::fetch(format!(
                    "expected story object, got {other}"
                )));
            }
        };

        let id = raw
            .get("processed_stories_id")
            .and_then(id_from_value)
            .ok_or_else(|| HarvestError::fetch("story without processed_stories_id"))?;

        Ok(Self {
            id,
            url: string_field(&raw, "url"),
            language: string_field(&raw, "language"),
            publish_date: string_field(&raw, "publish_date"),
            raw,
        })
    }

    /// The URL, trimmed, if it is present and non-empty.
    pub fn valid_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

// Older API versions return ids as strings.
fn id_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

/// The record forwarded to the message queue for each captured story.
///
/// Only the URL is guaranteed downstream; consumers re-fetch anything else
/// they need.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputRecord {
    pub url: String,
}

impl OutputRecord {
    pub fn from_story(story: &Story) -> Option<Self> {
        story.valid_url().map(|url| Self {
            url: url.to_string(),
        })
    }
}
