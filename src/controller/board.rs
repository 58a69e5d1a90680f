use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::scheduler::TaskStatus;
use crate::domain::{ForecastKind, ForecastSeries};

/// Where finished forecasts go. The coordinator is the only caller.
#[cfg_attr(test, mockall::automock)]
pub trait ForecastSink: Send + Sync {
    /// Replaces the published series for `kind` in one step.
    fn publish(&self, kind: ForecastKind, series: Arc<ForecastSeries>);

    /// A pipeline run failed; the previously published series stays in place.
    fn report_failure(&self, _kind: ForecastKind, _error: &str) {}

    fn record_status(&self, _task: &str, _status: &TaskStatus) {}
}

#[derive(Debug, Default)]
struct Slot {
    series: Option<Arc<ForecastSeries>>,
    last_error: Option<String>,
}

/// Latest forecast per kind, read by the HTTP layer.
#[derive(Debug, Default)]
pub struct ForecastBoard {
    slots: RwLock<BTreeMap<ForecastKind, Slot>>,
    tasks: RwLock<BTreeMap<String, TaskStatus>>,
}

impl ForecastBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, kind: ForecastKind) -> Option<Arc<ForecastSeries>> {
        self.slots.read().get(&kind).and_then(|s| s.series.clone())
    }

    /// Error of the most recent failed run, cleared by the next publish.
    pub fn last_error(&self, kind: ForecastKind) -> Option<String> {
        self.slots.read().get(&kind).and_then(|s| s.last_error.clone())
    }

    pub fn is_complete(&self) -> bool {
        let slots = self.slots.read();
        ForecastKind::ALL
            .iter()
            .all(|k| slots.get(k).is_some_and(|s| s.series.is_some()))
    }

    pub fn task_statuses(&self) -> BTreeMap<String, TaskStatus> {
        self.tasks.read().clone()
    }
}

impl ForecastSink for ForecastBoard {
    fn publish(&self, kind: ForecastKind, series: Arc<ForecastSeries>) {
        debug!(%kind, points = series.len(), "forecast published");
        let mut slots = self.slots.write();
        let slot = slots.entry(kind).or_default();
        slot.series = Some(series);
        slot.last_error = None;
    }

    fn report_failure(&self, kind: ForecastKind, error: &str) {
        self.slots.write().entry(kind).or_default().last_error = Some(error.to_string());
    }

    fn record_status(&self, task: &str, status: &TaskStatus) {
        self.tasks.write().insert(task.to_string(), status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelNames, ForecastPoint};
    use chrono::{TimeZone, Utc};

    fn series(value: f64) -> Arc<ForecastSeries> {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Arc::new(ForecastSeries::new(
            vec![ForecastPoint::single(t.fixed_offset(), value)],
            ChannelNames::SOLAR,
            t,
        ))
    }

    #[test]
    fn test_failure_keeps_previous_series() {
        let board = ForecastBoard::new();
        board.publish(ForecastKind::Solar, series(1.0));
        board.report_failure(ForecastKind::Solar, "weather: timed out");

        assert_eq!(board.latest(ForecastKind::Solar).unwrap().points()[0].med, 1.0);
        assert_eq!(board.last_error(ForecastKind::Solar).as_deref(), Some("weather: timed out"));

        board.publish(ForecastKind::Solar, series(2.0));
        assert!(board.last_error(ForecastKind::Solar).is_none());
        assert_eq!(board.latest(ForecastKind::Solar).unwrap().points()[0].med, 2.0);
    }

    #[test]
    fn test_complete_once_every_kind_published() {
        let board = ForecastBoard::new();
        for kind in [ForecastKind::Solar, ForecastKind::Consumption, ForecastKind::Battery] {
            board.publish(kind, series(0.0));
        }
        assert!(!board.is_complete());
        board.report_failure(ForecastKind::Grid, "boom");
        assert!(!board.is_complete());
        board.publish(ForecastKind::Grid, series(0.0));
        assert!(board.is_complete());
    }
}
