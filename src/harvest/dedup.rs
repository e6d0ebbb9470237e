//! Run-scoped duplicate suppression keyed on normalized story URLs.

use crate::models::Story;
use crate::utils::{normalize_url, truncate_for_log};
use std::collections::HashSet;
use tracing::{debug, error};

/// How a story should be treated by the harvest loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// First sighting of this URL; carries the normalized URL.
    Novel(String),
    /// URL already published during this run.
    Duplicate,
    /// No usable URL.
    Invalid,
    /// Language filter mismatch. Not remembered.
    WrongLanguage,
}

/// Classifies stories against the set of URLs already seen in this run.
///
/// The set only grows. Stories rejected by the language filter or lacking a
/// URL never enter it.
#[derive(Debug, Default)]
pub struct Deduplicator {
    language: Option<String>,
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new(language: Option<String>) -> Self {
        Self {
            language: language.map(|l| l.to_ascii_lowercase()),
            seen: HashSet::new(),
        }
    }

    pub fn classify(&mut self, story: &Story) -> Verdict {
        if let Some(wanted) = &self.language {
            let matches = story
                .language
                .as_deref()
                .is_some_and(|lang| lang.eq_ignore_ascii_case(wanted));
            if !matches {
                return Verdict::WrongLanguage;
            }
        }

        let Some(url) = story.valid_url() else {
            let payload = serde_json::to_string(&story.raw).unwrap_or_default();
            error!(id = story.id, story = %truncate_for_log(&payload, 300), "Found invalid story without URL");
            return Verdict::Invalid;
        };

        let normalized = normalize_url(url);
        if self.seen.insert(normalized.clone()) {
            Verdict::Novel(normalized)
        } else {
            debug!(id = story.id, url = %normalized, "Skipping duplicate story");
            Verdict::Duplicate
        }
    }

    pub fn should_publish(&mut self, story: &Story) -> bool {
        matches!(self.classify(story), Verdict::Novel(_))
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
