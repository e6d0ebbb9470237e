//! Per-window pagination state.
//!
//! A [`PageFetcher`] lives for exactly one [`DateWindow`]. It remembers the
//! resume cursor and the previous page so it can tell the harvest loop when
//! the window has nothing more to give.

use super::window::DateWindow;
use crate::api::StoryApi;
use crate::error::HarvestError;
use crate::models::Story;
use tracing::{debug, instrument};

/// Why a window stopped yielding pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfWindow {
    /// The backend returned no stories.
    Empty,
    /// The backend returned the same page twice in a row.
    Repeated,
    /// Two pages in a row carried no identifier above the cursor.
    NoProgress,
}

/// Result of one page request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Stories sorted by ascending identifier.
    Batch(Vec<Story>),
    Exhausted(EndOfWindow),
    /// Transport, backend or decoding failure. Ends the window.
    Failed(HarvestError),
}

#[derive(Debug)]
pub struct PageFetcher {
    window: DateWindow,
    filter: String,
    cursor: u64,
    previous: Option<Vec<Story>>,
    stalled: u32,
}

impl PageFetcher {
    pub fn for_window(window: DateWindow, initial_cursor: u64) -> Self {
        Self {
            filter: window.filter(),
            window,
            cursor: initial_cursor,
            previous: None,
            stalled: 0,
        }
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Highest identifier processed so far in this window.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Record that the story with `id` was processed. Never moves backward.
    pub fn advance(&mut self, id: u64) {
        self.cursor = self.cursor.max(id);
    }

    /// Request the page after the current cursor.
    #[instrument(level = "debug", skip(self, api, query), fields(filter = %self.filter, cursor = self.cursor))]
    pub async fn fetch<A: StoryApi>(&mut self, api: &A, query: &str, page_size: u32) -> FetchOutcome {
        let mut batch = match api
            .story_list(query, &self.filter, self.cursor, page_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => return FetchOutcome::Failed(e),
        };

        if batch.is_empty() {
            return FetchOutcome::Exhausted(EndOfWindow::Empty);
        }

        batch.sort_by_key(|story| story.id);

        if self.previous.as_ref() == Some(&batch) {
            return FetchOutcome::Exhausted(EndOfWindow::Repeated);
        }

        let newest = batch.last().map(|story| story.id).unwrap_or_default();
        if newest <= self.cursor {
            self.stalled += 1;
            if self.stalled >= 2 {
                return FetchOutcome::Exhausted(EndOfWindow::NoProgress);
            }
        } else {
            self.stalled = 0;
        }

        debug!(count = batch.len(), first = batch[0].id, last = newest, "Fetched page");
        self.previous = Some(batch.clone());
        FetchOutcome::Batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    fn story(id: u64, url: &str) -> Story {
        Story::from_json(json!({"processed_stories_id": id, "url": url})).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
    }

    /// Hands out queued responses and records the cursor of each call.
    struct Queue {
        responses: Mutex<Vec<Result<Vec<Story>>>>,
        cursors: Mutex<Vec<u64>>,
    }

    impl Queue {
        fn new(mut responses: Vec<Result<Vec<Story>>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    impl StoryApi for Queue {
        async fn story_list(&self, _query: &str, _filter: &str, cursor: u64, _rows: u32) -> Result<Vec<Story>> {
            self.cursors.lock().unwrap().push(cursor);
            self.responses.lock().unwrap().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[tokio::test]
    async fn test_batch_is_sorted_and_cursor_forwarded() {
        let api = Queue::new(vec![Ok(vec![story(5, "b"), story(3, "a")]), Ok(vec![])]);
        let mut fetcher = PageFetcher::for_window(window(), 2);

        let FetchOutcome::Batch(batch) = fetcher.fetch(&api, "q", 10).await else {
            panic!("expected a batch");
        };
        assert_eq!(batch.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 5]);
        for s in &batch {
            fetcher.advance(s.id);
        }
        assert!(matches!(
            fetcher.fetch(&api, "q", 10).await,
            FetchOutcome::Exhausted(EndOfWindow::Empty)
        ));
        assert_eq!(*api.cursors.lock().unwrap(), vec![2, 5]);
    }

    #[tokio::test]
    async fn test_repeated_page_ends_window() {
        let page = vec![story(1, "a"), story(2, "b")];
        let api = Queue::new(vec![Ok(page.clone()), Ok(page)]);
        let mut fetcher = PageFetcher::for_window(window(), 0);

        assert!(matches!(fetcher.fetch(&api, "q", 10).await, FetchOutcome::Batch(_)));
        assert!(matches!(
            fetcher.fetch(&api, "q", 10).await,
            FetchOutcome::Exhausted(EndOfWindow::Repeated)
        ));
    }

    #[tokio::test]
    async fn test_two_stalled_pages_end_window() {
        let api = Queue::new(vec![
            Ok(vec![story(1, "a")]),
            Ok(vec![story(2, "b")]),
        ]);
        let mut fetcher = PageFetcher::for_window(window(), 10);

        assert!(matches!(fetcher.fetch(&api, "q", 10).await, FetchOutcome::Batch(_)));
        assert!(matches!(
            fetcher.fetch(&api, "q", 10).await,
            FetchOutcome::Exhausted(EndOfWindow::NoProgress)
        ));
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let api = Queue::new(vec![Err(HarvestError::fetch("backend down"))]);
        let mut fetcher = PageFetcher::for_window(window(), 0);
        assert!(matches!(fetcher.fetch(&api, "q", 10).await, FetchOutcome::Failed(_)));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut fetcher = PageFetcher::for_window(window(), 7);
        fetcher.advance(3);
        assert_eq!(fetcher.cursor(), 7);
        fetcher.advance(9);
        assert_eq!(fetcher.cursor(), 9);
        assert_eq!(fetcher.filter(), window().filter());
    }
}
