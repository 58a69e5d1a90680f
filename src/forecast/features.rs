//! Feature engineering for the forecasting models
//!
//! Raw telemetry arrives at whatever rate the sensor reports. It is bucketed
//! to the model's granularity (15 minutes for solar, one hour for consumption)
//! and duplicates within a bucket are averaged before any feature is derived.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

use super::weather::{WeatherRecord, WEATHER_FEATURES};
use crate::domain::time::{floor_to_hour, floor_to_quarter};
use crate::ml::TrainingDataset;
use crate::error::ForecastResult;

pub const CONSUMPTION_FEATURES: [&str; 2] = ["hour", "day_of_week"];

/// Calendar features of a local timestamp: hour of day (0-23) and day of week
/// (0 = Monday).
pub fn calendar_features(t: &DateTime<Tz>) -> Vec<f64> {
    vec![t.hour() as f64, t.weekday().num_days_from_monday() as f64]
}

fn bucket_means(
    samples: &[(DateTime<Utc>, f64)],
    floor: impl Fn(&DateTime<Utc>) -> DateTime<Utc>,
) -> BTreeMap<DateTime<Utc>, f64> {
    let mut sums: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for (t, v) in samples {
        let entry = sums.entry(floor(t)).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    sums.into_iter().map(|(t, (sum, n))| (t, sum / n as f64)).collect()
}

/// Mean power per 15-minute slot, keeping only producing slots.
pub fn quarter_hour_power(samples: &[(DateTime<Utc>, f64)]) -> BTreeMap<DateTime<Utc>, f64> {
    let mut means = bucket_means(samples, |t| floor_to_quarter(t));
    means.retain(|_, power| *power > 0.0);
    means
}

/// Mean value per local clock hour.
pub fn hourly_means(samples: &[(DateTime<Utc>, f64)], tz: Tz) -> BTreeMap<DateTime<Utc>, f64> {
    bucket_means(samples, |t| floor_to_hour(t, tz))
}

/// Inner join of weather records and measured power on the slot start.
pub fn solar_training_set(
    weather: &[WeatherRecord],
    power: &BTreeMap<DateTime<Utc>, f64>,
) -> ForecastResult<TrainingDataset> {
    let (rows, targets): (Vec<_>, Vec<_>) = weather
        .iter()
        .filter_map(|w| power.get(&w.time).map(|p| (w.features(), *p)))
        .unzip();
    TrainingDataset::new(rows, targets, WEATHER_FEATURES.iter().map(|s| s.to_string()).collect())
}

pub fn consumption_training_set(hourly: &BTreeMap<DateTime<Utc>, f64>, tz: Tz) -> ForecastResult<TrainingDataset> {
    let (rows, targets): (Vec<_>, Vec<_>) = hourly
        .iter()
        .map(|(t, v)| (calendar_features(&t.with_timezone(&tz)), *v))
        .unzip();
    TrainingDataset::new(rows, targets, CONSUMPTION_FEATURES.iter().map(|s| s.to_string()).collect())
}
