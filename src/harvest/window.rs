//! Daily date windows.
//!
//! A `[since, until]` range is walked one day at a time. Each
//! [`DateWindow`] is the half-open interval `[start, start + 1 day)` and is
//! rendered into the Solr filter MediaCloud applies on `publish_date`.

use crate::error::{HarvestError, Result};
use chrono::{Days, NaiveDate};
use std::fmt;

/// Order in which days are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// `until` first, then one day back at a time down to `since`.
    #[default]
    Backward,
    /// `since` first, up to `until`.
    Forward,
}

/// One day of the harvest range, `[start, start + 1 day)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate) -> Self {
        Self { start }
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> NaiveDate {
        self.start
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Solr range predicate on `publish_date`, start inclusive, end exclusive.
    pub fn filter(&self) -> String {
        format!(
            "publish_date:[{} TO {}}}",
            self.start.format("%Y-%m-%dT00:00:00Z"),
            self.end().format("%Y-%m-%dT00:00:00Z")
        )
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Lazy, restartable sequence of [`DateWindow`]s covering `[since, until]`.
///
/// Only the next day to hand out is stored; windows are produced on demand.
#[derive(Debug, Clone)]
pub struct DateWindowCursor {
    since: NaiveDate,
    until: NaiveDate,
    direction: Direction,
    next: Option<NaiveDate>,
}

impl DateWindowCursor {
    /// # Errors
    ///
    /// [`HarvestError::Config`] when `since` is after `until`.
    pub fn new(since: NaiveDate, until: NaiveDate, direction: Direction) -> Result<Self> {
        if since > until {
            return Err(HarvestError::config(format!(
                "since date {since} is after until date {until}"
            )));
        }
        let mut cursor = Self {
            since,
            until,
            direction,
            next: None,
        };
        cursor.restart();
        Ok(cursor)
    }

    /// Rewind to the first window.
    pub fn restart(&mut self) {
        self.next = Some(match self.direction {
            Direction::Backward => self.until,
            Direction::Forward => self.since,
        });
    }

    /// Total number of windows in the range.
    pub fn total(&self) -> usize {
        (self.until - self.since).num_days() as usize + 1
    }
}

impl Iterator for DateWindowCursor {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let day = self.next?;
        self.next = match self.direction {
            Direction::Backward if day > self.since => day.pred_opt(),
            Direction::Forward if day < self.until => day.succ_opt(),
            _ => None,
        };
        Some(DateWindow::new(day))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next {
            None => 0,
            Some(day) => match self.direction {
                Direction::Backward => (day - self.since).num_days() as usize + 1,
                Direction::Forward => (self.until - day).num_days() as usize + 1,
            },
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DateWindowCursor {}
