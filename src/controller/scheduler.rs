use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::ForecastKind;

/// Task status tracking
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl TaskStatus {
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.last_success = Some(now);
        self.last_error = None;
        self.run_count += 1;
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        self.last_run = Some(now);
        self.last_error = Some(error.into());
        self.run_count += 1;
        self.error_count += 1;
    }

    /// The most recent attempt failed.
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

/// When a prediction pipeline is next due.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub kind: ForecastKind,
    pub interval: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn new(kind: ForecastKind, interval: Duration) -> Self {
        Self {
            kind,
            interval,
            last_run: None,
        }
    }

    /// Due when never run successfully, or once `interval` has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_run.map_or(true, |last| now - last >= self.interval)
    }

    pub fn mark_run(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
    }
}

/// Retraining cadence and the history window each training run reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrainPolicy {
    pub interval: Duration,
    pub window: Duration,
    pub end_offset: Duration,
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::hours(24),
            window: Duration::days(60),
            end_offset: Duration::hours(1),
        }
    }
}

impl RetrainPolicy {
    /// Untrained models are always due; trained ones once strictly older
    /// than the interval.
    pub fn is_due(&self, last_trained: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_trained.map_or(true, |t| now - t > self.interval)
    }

    /// `[now - window, now - end_offset]`; the end offset keeps the current,
    /// still filling hour out of the training data.
    pub fn history_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.window, now - self.end_offset)
    }
}
