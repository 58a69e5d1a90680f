use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::Serialize;

use super::kind::ForecastKind;
use super::series::{rest_of_today, today, ForecastSeries};

/// Med-channel statistics for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub min: f64,
    pub min_time: DateTime<FixedOffset>,
    pub max: f64,
    pub max_time: DateTime<FixedOffset>,
    pub average: f64,
    pub sum: f64,
    pub points: usize,
}

pub fn daily_summaries(series: &ForecastSeries, tz: Tz) -> Vec<DailySummary> {
    series
        .points()
        .iter()
        .chunk_by(|p| p.time.with_timezone(&tz).date_naive())
        .into_iter()
        .filter_map(|(date, group)| {
            let points: Vec<_> = group.collect();
            let lowest = points.iter().min_by(|a, b| a.med.total_cmp(&b.med))?;
            let highest = points.iter().max_by(|a, b| a.med.total_cmp(&b.med))?;
            let sum: f64 = points.iter().map(|p| p.med).sum();
            Some(DailySummary {
                date,
                min: lowest.med,
                min_time: lowest.time,
                max: highest.med,
                max_time: highest.time,
                average: sum / points.len() as f64,
                sum,
                points: points.len(),
            })
        })
        .collect()
}

/// Display values derived from a published series at `now`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    /// Value of the point in effect right now
    pub current: Option<f64>,
    /// Remaining energy today (Wh), or the peak capacity (%) for the battery
    pub rest_of_today: Option<f64>,
    pub today_total: Option<f64>,
    pub unit: &'static str,
}

pub fn headline(kind: ForecastKind, series: &ForecastSeries, now: DateTime<Tz>) -> Headline {
    let (rest, total) = match kind {
        // 15-minute watts to watt-hours
        ForecastKind::Solar => (
            Some(series.sum_over(rest_of_today(now)) / 4.0),
            Some(series.sum_over(today(now)) / 4.0),
        ),
        ForecastKind::Consumption | ForecastKind::Grid => (
            Some(series.sum_over(rest_of_today(now))),
            Some(series.sum_over(today(now))),
        ),
        ForecastKind::Battery => (series.max_over(rest_of_today(now)), None),
    };
    Headline {
        current: series.nearest_at_or_before(&now),
        rest_of_today: rest,
        today_total: total,
        unit: kind.unit(),
    }
}
