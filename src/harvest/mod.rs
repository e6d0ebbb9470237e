//! The harvest loop.
//!
//! A run walks the configured date range one day at a time and pages
//! through each day with a resume cursor:
//!
//! ```text
//! WindowSelect ─► PageFetch ─► Classify ─┬─► PageFetch            (page done)
//!      ▲              │                   └─► StopLimitReached     (terminal)
//!      │              ▼
//!      └──── WindowExhausted  (empty / repeated / stalled page, fetch error)
//!
//! WindowSelect with no day left ─► StopRangeExhausted             (terminal)
//! ```
//!
//! Every story advances the cursor whether or not it is published, so
//! filtered and duplicate stories never stall pagination. A failed fetch
//! abandons only the current day; the run moves on to the next one.
//!
//! All run state (seen URLs, counters, status timer) lives in [`Harvester`].

pub mod dedup;
pub mod fetcher;
pub mod window;

use crate::api::StoryApi;
use crate::config::{CursorPolicy, HarvestConfig};
use crate::error::Result;
use crate::models::Story;
use crate::outputs::Publisher;
use dedup::{Deduplicator, Verdict};
use fetcher::{EndOfWindow, FetchOutcome, PageFetcher};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use window::DateWindowCursor;

/// Minimum wall-clock time between two progress reports.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The capture limit was hit.
    LimitReached,
    /// Every day in the range was visited.
    RangeExhausted,
}

/// Counters kept for the lifetime of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub captured: u64,
    pub duplicates: u64,
    pub invalid: u64,
    pub skipped_language: u64,
    /// Individual sink deliveries that failed.
    pub failed_deliveries: u64,
    pub pages: u64,
    pub windows_visited: u64,
    /// Windows abandoned because a fetch failed.
    pub windows_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub counters: RunCounters,
    pub termination: Termination,
}

/// How a single window ended.
#[derive(Debug)]
enum WindowEnd {
    Exhausted(EndOfWindow),
    Failed,
    LimitReached,
}

/// Emits a running total at most once per interval.
#[derive(Debug)]
struct StatusTimer {
    interval: Duration,
    last: Instant,
}

impl StatusTimer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    fn due(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Run a harvest over `publisher`, then close it.
///
/// The outputs are closed however the run ends: limit reached, range
/// exhausted, or an error out of the loop.
///
/// # Errors
///
/// Whatever [`Harvester::run`] returns, after the outputs are closed.
pub async fn run_and_close<A: StoryApi>(
    api: &A,
    mut publisher: Publisher,
    config: HarvestConfig,
) -> Result<HarvestReport> {
    let result = Harvester::new(api, &mut publisher, config).run().await;
    publisher.close().await;
    result
}

/// One harvest run: configuration, collaborators and run-scoped state.
pub struct Harvester<'a, A> {
    api: &'a A,
    publisher: &'a mut Publisher,
    config: HarvestConfig,
    dedup: Deduplicator,
    counters: RunCounters,
    status: StatusTimer,
}

impl<'a, A: StoryApi> Harvester<'a, A> {
    /// The publisher is borrowed, not owned, so the caller can close it
    /// whatever way the run ends.
    pub fn new(api: &'a A, publisher: &'a mut Publisher, config: HarvestConfig) -> Self {
        Self {
            api,
            publisher,
            dedup: Deduplicator::new(config.language().map(str::to_string)),
            config,
            counters: RunCounters::default(),
            status: StatusTimer::new(STATUS_INTERVAL),
        }
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status = StatusTimer::new(interval);
        self
    }

    /// Run to completion.
    ///
    /// # Errors
    ///
    /// Only configuration errors (an inverted date range). Fetch and
    /// delivery failures are absorbed and show up in the counters.
    #[instrument(
        level = "info",
        skip_all,
        fields(query = %self.config.query(), since = %self.config.since(), until = %self.config.until())
    )]
    pub async fn run(mut self) -> Result<HarvestReport> {
        let mut windows = DateWindowCursor::new(
            self.config.since(),
            self.config.until(),
            self.config.direction(),
        )?;
        info!(
            windows = windows.total(),
            limit = self.config.limit(),
            rows = self.config.page_size(),
            initial_cursor = self.config.initial_cursor(),
            "Starting harvest"
        );

        let mut carried = self.config.initial_cursor();
        let termination = loop {
            let Some(window) = windows.next() else {
                break Termination::RangeExhausted;
            };

            let start = match self.config.cursor_policy() {
                CursorPolicy::ResetPerWindow => self.config.initial_cursor(),
                CursorPolicy::CarryForward => carried,
            };
            let mut fetcher = PageFetcher::for_window(window, start);
            self.counters.windows_visited += 1;
            info!(filter = %fetcher.filter(), cursor = start, "Collecting {}...", window);

            let end = self.harvest_window(&mut fetcher).await;
            carried = fetcher.cursor();

            match end {
                WindowEnd::LimitReached => break Termination::LimitReached,
                WindowEnd::Failed => self.counters.windows_failed += 1,
                WindowEnd::Exhausted(reason) => {
                    debug!(%window, ?reason, cursor = carried, "Window exhausted");
                }
            }
        };

        info!(
            captured = self.counters.captured,
            duplicates = self.counters.duplicates,
            invalid = self.counters.invalid,
            skipped_language = self.counters.skipped_language,
            failed_deliveries = self.counters.failed_deliveries,
            windows = self.counters.windows_visited,
            failed_windows = self.counters.windows_failed,
            unique_urls = self.dedup.seen_count(),
            ?termination,
            "Total of {} captured stories",
            self.counters.captured
        );

        Ok(HarvestReport {
            counters: self.counters,
            termination,
        })
    }

    async fn harvest_window(&mut self, fetcher: &mut PageFetcher) -> WindowEnd {
        loop {
            let batch = match fetcher
                .fetch(self.api, self.config.query(), self.config.page_size())
                .await
            {
                FetchOutcome::Batch(batch) => batch,
                FetchOutcome::Exhausted(reason) => return WindowEnd::Exhausted(reason),
                FetchOutcome::Failed(e) => {
                    warn!(window = %fetcher.window(), cursor = fetcher.cursor(), error = %e, "Fetch failed; abandoning window");
                    return WindowEnd::Failed;
                }
            };
            self.counters.pages += 1;

            for story in &batch {
                fetcher.advance(story.id);

                if self.capture(story).await && self.limit_reached() {
                    return WindowEnd::LimitReached;
                }

                if self.status.due() {
                    info!(captured = self.counters.captured, "Captured {} stories", self.counters.captured);
                }
            }
        }
    }

    /// Classify one story and publish it if it is novel. Returns whether it
    /// was captured.
    async fn capture(&mut self, story: &Story) -> bool {
        match self.dedup.classify(story) {
            Verdict::Novel(url) => {
                let delivery = self.publisher.publish(story, &url).await;
                self.counters.failed_deliveries += delivery.failed as u64;
                self.counters.captured += 1;
                true
            }
            Verdict::Duplicate => {
                self.counters.duplicates += 1;
                false
            }
            Verdict::Invalid => {
                self.counters.invalid += 1;
                false
            }
            Verdict::WrongLanguage => {
                self.counters.skipped_language += 1;
                false
            }
        }
    }

    fn limit_reached(&self) -> bool {
        self.config.limit() > 0 && self.counters.captured >= self.config.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::testing;
    use crate::error::HarvestError;
    use crate::outputs::testing::RecordingSink;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn filter(s: &str) -> String {
        window::DateWindow::new(day(s)).filter()
    }

    fn story(id: u64, url: &str) -> Story {
        Story::from_json(json!({"processed_stories_id": id, "url": url, "language": "en"})).unwrap()
    }

    fn config(since: &str, until: &str) -> HarvestConfig {
        testing::build(testing::args(since, until))
    }

    fn config_with(since: &str, until: &str, tweak: impl FnOnce(&mut Cli)) -> HarvestConfig {
        let mut args = testing::args(since, until);
        tweak(&mut args);
        testing::build(args)
    }

    /// Backend holding a fixed set of stories per day filter. Honors the
    /// cursor and page size, records every call.
    #[derive(Default)]
    struct ScriptedApi {
        days: HashMap<String, Vec<Story>>,
        failing: HashSet<String>,
        calls: RefCell<Vec<(String, u64)>>,
    }

    impl ScriptedApi {
        fn with_day(mut self, date: &str, stories: Vec<Story>) -> Self {
            self.days.insert(filter(date), stories);
            self
        }

        fn failing_on(mut self, date: &str) -> Self {
            self.failing.insert(filter(date));
            self
        }

        fn filters_called(&self) -> Vec<String> {
            let mut seen = Vec::new();
            for (f, _) in self.calls.borrow().iter() {
                if seen.last() != Some(f) {
                    seen.push(f.clone());
                }
            }
            seen
        }

        fn cursors_for(&self, date: &str) -> Vec<u64> {
            let f = filter(date);
            self.calls
                .borrow()
                .iter()
                .filter(|(called, _)| *called == f)
                .map(|(_, cursor)| *cursor)
                .collect()
        }
    }

    impl StoryApi for ScriptedApi {
        async fn story_list(&self, _query: &str, filter: &str, cursor: u64, rows: u32) -> Result<Vec<Story>> {
            self.calls.borrow_mut().push((filter.to_string(), cursor));
            if self.failing.contains(filter) {
                return Err(HarvestError::fetch("connection reset"));
            }
            Ok(self
                .days
                .get(filter)
                .map(|stories| {
                    stories
                        .iter()
                        .filter(|s| s.id > cursor)
                        .take(rows as usize)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    /// Backend with an endless supply of unique stories.
    struct EndlessApi;

    impl StoryApi for EndlessApi {
        async fn story_list(&self, _query: &str, filter: &str, cursor: u64, rows: u32) -> Result<Vec<Story>> {
            Ok((cursor + 1..=cursor + rows as u64)
                .map(|id| story(id, &format!("https://news.example/{}/{id}", filter.len())))
                .collect())
        }
    }

    /// Backend that ignores the cursor and always answers with the same page.
    struct EchoApi;

    impl StoryApi for EchoApi {
        async fn story_list(&self, _query: &str, _filter: &str, _cursor: u64, _rows: u32) -> Result<Vec<Story>> {
            Ok(vec![story(1, "https://a.com/1"), story(2, "https://a.com/2")])
        }
    }

    #[tokio::test]
    async fn test_scenario_limit_stops_inside_first_window() {
        let api = ScriptedApi::default()
            .with_day("2024-01-02", vec![story(1, "a"), story(2, "a"), story(3, "b")])
            .with_day("2024-01-01", vec![story(4, "c")]);
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(sink.clone())]);
        let cfg = config_with("2024-01-01", "2024-01-02", |a| a.limit = Some(2));

        let report = Harvester::new(&api, &mut publisher, cfg).run().await.unwrap();

        assert_eq!(report.termination, Termination::LimitReached);
        assert_eq!(report.counters.captured, 2);
        assert_eq!(report.counters.duplicates, 1);
        assert_eq!(sink.urls(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(api.filters_called(), vec![filter("2024-01-02")]);
    }

    #[tokio::test]
    async fn test_empty_backend_visits_every_window() {
        let api = ScriptedApi::default();
        let mut publisher = Publisher::default();

        let report = Harvester::new(&api, &mut publisher, config("2024-01-01", "2024-01-05"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::RangeExhausted);
        assert_eq!(report.counters.captured, 0);
        assert_eq!(report.counters.windows_visited, 5);
        assert_eq!(
            api.filters_called(),
            ["2024-01-05", "2024-01-04", "2024-01-03", "2024-01-02", "2024-01-01"]
                .iter()
                .map(|d| filter(d))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_limit_is_exact() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(sink.clone())]);
        let cfg = config_with("2024-01-01", "2024-01-31", |a| {
            a.limit = Some(7);
            a.rows = Some(3);
        });

        let report = Harvester::new(&EndlessApi, &mut publisher, cfg).run().await.unwrap();

        assert_eq!(report.termination, Termination::LimitReached);
        assert_eq!(report.counters.captured, 7);
        assert_eq!(report.counters.pages, 3);
        assert_eq!(sink.urls().len(), 7);
    }

    #[tokio::test]
    async fn test_duplicates_across_windows_are_published_once() {
        let api = ScriptedApi::default()
            .with_day("2024-01-02", vec![story(1, "https://a.com/x"), story(2, "https://a.com/y")])
            .with_day("2024-01-01", vec![story(1, "https://a.com/y"), story(5, "https://a.com/x#top"), story(6, "https://a.com/z")]);
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(sink.clone())]);

        let report = Harvester::new(&api, &mut publisher, config("2024-01-01", "2024-01-02"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::RangeExhausted);
        assert_eq!(report.counters.captured, 3);
        assert_eq!(report.counters.duplicates, 2);
        assert_eq!(
            sink.urls(),
            vec!["https://a.com/x".to_string(), "https://a.com/y".to_string(), "https://a.com/z".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cursor_never_falls_behind_previous_page() {
        let stories: Vec<_> = (1..=7).map(|id| story(id * 10, &format!("https://a.com/{id}"))).collect();
        let api = ScriptedApi::default().with_day("2024-01-01", stories);
        let mut publisher = Publisher::default();
        let cfg = config_with("2024-01-01", "2024-01-01", |a| a.rows = Some(3));

        Harvester::new(&api, &mut publisher, cfg).run().await.unwrap();

        assert_eq!(api.cursors_for("2024-01-01"), vec![0, 30, 60, 70]);
    }

    #[tokio::test]
    async fn test_invalid_story_is_skipped() {
        let api = ScriptedApi::default().with_day(
            "2024-01-01",
            vec![story(1, "https://a.com/1"), story(2, ""), story(3, "https://a.com/3")],
        );
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(sink.clone())]);

        let report = Harvester::new(&api, &mut publisher, config("2024-01-01", "2024-01-01"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.counters.invalid, 1);
        assert_eq!(report.counters.captured, 2);
        assert_eq!(sink.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_abandons_only_that_window() {
        let api = ScriptedApi::default()
            .with_day("2024-01-03", vec![story(1, "https://a.com/1")])
            .failing_on("2024-01-02")
            .with_day("2024-01-01", vec![story(2, "https://a.com/2")]);
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(sink.clone())]);

        let report = Harvester::new(&api, &mut publisher, config("2024-01-01", "2024-01-03"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::RangeExhausted);
        assert_eq!(report.counters.windows_failed, 1);
        assert_eq!(report.counters.windows_visited, 3);
        assert_eq!(report.counters.captured, 2);
        assert_eq!(api.cursors_for("2024-01-02"), vec![0]);
    }

    #[tokio::test]
    async fn test_delivery_failures_do_not_stop_the_run() {
        let api = ScriptedApi::default().with_day(
            "2024-01-01",
            vec![story(1, "https://a.com/1"), story(2, "https://a.com/2")],
        );
        let good = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(RecordingSink::failing()), Box::new(good.clone())]);

        let report = Harvester::new(&api, &mut publisher, config("2024-01-01", "2024-01-01"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.counters.captured, 2);
        assert_eq!(report.counters.failed_deliveries, 2);
        assert_eq!(good.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_language_filter_skips_without_counting() {
        let de = Story::from_json(json!({"processed_stories_id": 2, "url": "https://a.com/de", "language": "de"})).unwrap();
        let api = ScriptedApi::default().with_day("2024-01-01", vec![story(1, "https://a.com/en"), de]);
        let mut publisher = Publisher::default();
        let cfg = config_with("2024-01-01", "2024-01-01", |a| a.lang = Some("EN".into()));

        let report = Harvester::new(&api, &mut publisher, cfg).run().await.unwrap();

        assert_eq!(report.counters.captured, 1);
        assert_eq!(report.counters.skipped_language, 1);
        assert_eq!(report.counters.duplicates, 0);
        // The skipped story still moved the cursor.
        assert_eq!(api.cursors_for("2024-01-01"), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_cursor_policy_between_windows() {
        let build = || {
            ScriptedApi::default()
                .with_day("2024-01-02", vec![story(40, "https://a.com/1")])
                .with_day("2024-01-01", vec![story(50, "https://a.com/2")])
        };

        let api = build();
        let mut publisher = Publisher::default();
        let cfg = config_with("2024-01-01", "2024-01-02", |a| a.last_id = Some(5));
        assert_eq!(cfg.cursor_policy(), CursorPolicy::ResetPerWindow);
        Harvester::new(&api, &mut publisher, cfg).run().await.unwrap();
        assert_eq!(api.cursors_for("2024-01-01")[0], 5);

        let api = build();
        let cfg = config_with("2024-01-01", "2024-01-02", |a| {
            a.last_id = Some(5);
            a.carry_cursor = true;
        });
        Harvester::new(&api, &mut publisher, cfg).run().await.unwrap();
        assert_eq!(api.cursors_for("2024-01-01")[0], 40);
    }

    #[tokio::test]
    async fn test_echoing_backend_ends_window() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(vec![Box::new(sink.clone())]);

        let report = Harvester::new(&EchoApi, &mut publisher, config("2024-01-01", "2024-01-02"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::RangeExhausted);
        assert_eq!(report.counters.pages, 2);
        assert_eq!(report.counters.captured, 2);
        assert_eq!(report.counters.duplicates, 2);
    }

    #[tokio::test]
    async fn test_forward_direction() {
        let api = ScriptedApi::default();
        let mut publisher = Publisher::default();
        let cfg = config_with("2024-01-01", "2024-01-02", |a| a.forward = true);

        Harvester::new(&api, &mut publisher, cfg)
            .with_status_interval(Duration::ZERO)
            .run()
            .await
            .unwrap();

        assert_eq!(api.filters_called(), vec![filter("2024-01-01"), filter("2024-01-02")]);
    }

    #[tokio::test]
    async fn test_outputs_closed_when_limit_reached() {
        let sink = RecordingSink::default();
        let publisher = Publisher::new(vec![Box::new(sink.clone())]);
        let cfg = config_with("2024-01-01", "2024-01-03", |a| a.limit = Some(1));

        let report = run_and_close(&EndlessApi, publisher, cfg).await.unwrap();

        assert_eq!(report.termination, Termination::LimitReached);
        assert!(*sink.closed.borrow());
    }

    #[tokio::test]
    async fn test_outputs_closed_when_range_exhausted() {
        let sink = RecordingSink::default();
        let publisher = Publisher::new(vec![Box::new(sink.clone())]);

        let report = run_and_close(&ScriptedApi::default(), publisher, config("2024-01-01", "2024-01-02"))
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::RangeExhausted);
        assert!(*sink.closed.borrow());
    }

    #[tokio::test]
    async fn test_outputs_closed_when_last_window_fails() {
        let api = ScriptedApi::default()
            .with_day("2024-01-02", vec![story(1, "https://a.com/1")])
            .failing_on("2024-01-01");
        let sink = RecordingSink::default();
        let failing = RecordingSink::failing();
        let publisher = Publisher::new(vec![Box::new(sink.clone()), Box::new(failing.clone())]);

        let report = run_and_close(&api, publisher, config("2024-01-01", "2024-01-02")).await.unwrap();

        assert_eq!(report.counters.windows_failed, 1);
        assert_eq!(report.counters.failed_deliveries, 1);
        assert!(*sink.closed.borrow());
        assert!(*failing.closed.borrow());
    }

    #[test]
    fn test_status_timer() {
        let mut timer = StatusTimer::new(Duration::from_secs(3600));
        assert!(!timer.due());
        let mut timer = StatusTimer::new(Duration::ZERO);
        assert!(timer.due());
        assert!(timer.due());
    }
}
