//! Timestamp-indexed forecast series shared by every producer, simulator and
//! the presentation layer.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::scenario::{Bands, Scenario};
use super::time::{floor_to_hour, local_datetime};
use crate::error::{ForecastError, ForecastResult};

/// One forecast point. `min`/`max` are absent for single-scenario series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub time: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    pub med: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ForecastPoint {
    pub fn single(time: DateTime<FixedOffset>, value: f64) -> Self {
        Self {
            time,
            min: None,
            med: value,
            max: None,
        }
    }

    pub fn banded(time: DateTime<FixedOffset>, bands: Bands<f64>) -> Self {
        Self {
            time,
            min: Some(bands.min),
            med: bands.med,
            max: Some(bands.max),
        }
    }

    /// Channel value for a scenario. Single-scenario points answer every
    /// scenario with `med`.
    pub fn value(&self, scenario: Scenario) -> f64 {
        match scenario {
            Scenario::Min => self.min.unwrap_or(self.med),
            Scenario::Med => self.med,
            Scenario::Max => self.max.unwrap_or(self.med),
        }
    }

    pub fn bands(&self) -> Bands<f64> {
        Bands::from_fn(|s| self.value(s))
    }
}

/// Names under which a series publishes its three channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelNames {
    pub min: Option<&'static str>,
    pub med: &'static str,
    pub max: Option<&'static str>,
}

impl ChannelNames {
    pub const SOLAR: ChannelNames = ChannelNames {
        min: None,
        med: "power",
        max: None,
    };
    pub const BANDED: ChannelNames = ChannelNames {
        min: Some("min"),
        med: "med",
        max: Some("max"),
    };
}

/// Reduction applied inside each aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Average,
}

impl FromStr for Aggregation {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Self::Sum),
            "average" => Ok(Self::Average),
            other => Err(ForecastError::InvalidArgument(format!(
                "unknown aggregation function '{other}', expected 'sum' or 'average'"
            ))),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: usize,
    min: Option<f64>,
    med: f64,
    max: Option<f64>,
}

impl Accumulator {
    fn push(&mut self, point: &ForecastPoint) {
        self.count += 1;
        self.med += point.med;
        if let Some(v) = point.min {
            *self.min.get_or_insert(0.0) += v;
        }
        if let Some(v) = point.max {
            *self.max.get_or_insert(0.0) += v;
        }
    }

    fn finish(&self, mode: Aggregation) -> (Option<f64>, f64, Option<f64>) {
        let divisor = match mode {
            Aggregation::Sum => 1.0,
            Aggregation::Average => self.count.max(1) as f64,
        };
        (self.min.map(|v| v / divisor), self.med / divisor, self.max.map(|v| v / divisor))
    }
}

/// Immutable, time-ordered forecast. Superseded wholesale on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    points: Vec<ForecastPoint>,
    produced_at: DateTime<Utc>,
    channels: ChannelNames,
}

impl ForecastSeries {
    pub fn new(mut points: Vec<ForecastPoint>, channels: ChannelNames, produced_at: DateTime<Utc>) -> Self {
        points.sort_by_key(|p| p.time);
        Self {
            points,
            produced_at,
            channels,
        }
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    pub fn channels(&self) -> ChannelNames {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Med value of the last point at or before `now`.
    pub fn nearest_at_or_before<T: chrono::TimeZone>(&self, now: &DateTime<T>) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.time <= *now);
        idx.checked_sub(1).map(|i| self.points[i].med)
    }

    pub fn sum_over(&self, predicate: impl Fn(&DateTime<FixedOffset>) -> bool) -> f64 {
        self.points.iter().filter(|p| predicate(&p.time)).map(|p| p.med).sum()
    }

    pub fn average_over(&self, predicate: impl Fn(&DateTime<FixedOffset>) -> bool) -> Option<f64> {
        let (count, sum) = self
            .points
            .iter()
            .filter(|p| predicate(&p.time))
            .fold((0usize, 0.0), |(n, s), p| (n + 1, s + p.med));
        (count > 0).then(|| sum / count as f64)
    }

    pub fn max_over(&self, predicate: impl Fn(&DateTime<FixedOffset>) -> bool) -> Option<f64> {
        self.points
            .iter()
            .filter(|p| predicate(&p.time))
            .map(|p| p.med)
            .reduce(f64::max)
    }

    /// Buckets points into consecutive windows of `interval` starting at the
    /// first point. Each bucket is labelled at local noon of the calendar day
    /// holding its midpoint. The trailing bucket is kept even when short.
    pub fn aggregate_by_interval(
        &self,
        mode: Aggregation,
        interval: Duration,
        tz: Tz,
        post_process: Option<&dyn Fn(f64) -> f64>,
    ) -> ForecastResult<ForecastSeries> {
        if interval <= Duration::zero() {
            return Err(ForecastError::InvalidArgument(format!(
                "aggregation interval must be positive, got {interval}"
            )));
        }

        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        let emit = |start: DateTime<FixedOffset>, acc: &Accumulator| -> ForecastResult<ForecastPoint> {
            let midpoint = start.checked_add_signed(interval / 2).ok_or_else(|| {
                ForecastError::InvalidArgument(format!("aggregation interval {interval} overflows from {start}"))
            })?;
            let label = local_datetime(tz, midpoint.with_timezone(&tz).date_naive(), noon).fixed_offset();
            let (min, med, max) = acc.finish(mode);
            let post = |v: f64| post_process.map_or(v, |f| f(v));
            Ok(ForecastPoint {
                time: label,
                min: min.map(post),
                med: post(med),
                max: max.map(post),
            })
        };

        let mut out = Vec::new();
        let mut bucket: Option<(DateTime<FixedOffset>, Accumulator)> = None;
        for point in &self.points {
            match bucket.as_mut() {
                Some((start, acc)) if point.time - *start < interval => acc.push(point),
                _ => {
                    if let Some((start, acc)) = bucket.take() {
                        out.push(emit(start, &acc)?);
                    }
                    let mut acc = Accumulator::default();
                    acc.push(point);
                    bucket = Some((point.time, acc));
                }
            }
        }
        if let Some((start, acc)) = bucket {
            out.push(emit(start, &acc)?);
        }

        Ok(ForecastSeries::new(out, self.channels, self.produced_at))
    }

    /// Per-channel mean of the points falling into each local clock hour,
    /// keyed by the hour's start instant.
    pub fn hourly_average(&self, tz: Tz) -> BTreeMap<DateTime<Utc>, Bands<f64>> {
        let mut buckets: BTreeMap<DateTime<Utc>, (usize, Bands<f64>)> = BTreeMap::new();
        for point in &self.points {
            let entry = buckets
                .entry(floor_to_hour(&point.time, tz))
                .or_insert((0, Bands::uniform(0.0)));
            entry.0 += 1;
            entry.1.min += point.value(Scenario::Min);
            entry.1.med += point.value(Scenario::Med);
            entry.1.max += point.value(Scenario::Max);
        }
        buckets
            .into_iter()
            .map(|(hour, (n, sum))| {
                let n = n as f64;
                (hour, Bands::from_fn(|s| sum.get(s) / n))
            })
            .collect()
    }

    /// The last point in each local clock hour, keyed by the hour's start
    /// instant. Points sharing a timestamp keep their insertion order, so a
    /// later point wins.
    pub fn hourly_last(&self, tz: Tz) -> BTreeMap<DateTime<Utc>, Bands<f64>> {
        self.points
            .iter()
            .map(|p| (floor_to_hour(&p.time, tz), p.bands()))
            .collect()
    }
}

/// Points on the same local calendar day as `now`.
pub fn today(now: DateTime<Tz>) -> impl Fn(&DateTime<FixedOffset>) -> bool {
    let tz = now.timezone();
    let date = now.date_naive();
    move |t| t.with_timezone(&tz).date_naive() == date
}

/// Points after `now` on the same local calendar day.
pub fn rest_of_today(now: DateTime<Tz>) -> impl Fn(&DateTime<FixedOffset>) -> bool {
    let same_day = today(now);
    move |t| *t > now && same_day(t)
}
