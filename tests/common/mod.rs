//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Europe::Prague;
use chrono_tz::Tz;
use std::collections::HashMap;

use solar_forecast_ml::forecast::{ForecastSettings, RawSample, TelemetrySource, WeatherRecord, WeatherSource};
use solar_forecast_ml::{ForecastError, ForecastResult};

pub const PV_ENTITY: &str = "sensor.pv_power";
pub const CONSUMPTION_ENTITY: &str = "sensor.house_consumption";
pub const LATITUDE: f64 = 50.08;
pub const LONGITUDE: f64 = 14.42;

#[derive(Default)]
pub struct FakeTelemetry {
    pub history: HashMap<String, Vec<RawSample>>,
    pub states: HashMap<String, String>,
}

#[async_trait]
impl TelemetrySource for FakeTelemetry {
    async fn query(&self, entity_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<Vec<RawSample>> {
        Ok(self
            .history
            .get(entity_id)
            .map(|s| s.iter().filter(|r| r.time >= start && r.time <= end).cloned().collect())
            .unwrap_or_default())
    }

    async fn current_state(&self, entity_id: &str) -> ForecastResult<Option<String>> {
        Ok(self.states.get(entity_id).cloned())
    }
}

pub struct FakeWeather {
    pub records: Vec<WeatherRecord>,
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> ForecastResult<Vec<WeatherRecord>> {
        let records: Vec<_> = self
            .records
            .iter()
            .filter(|r| {
                let date = r.time.with_timezone(&Prague).date_naive();
                date >= start && date <= end
            })
            .copied()
            .collect();
        if records.is_empty() {
            return Err(ForecastError::UpstreamUnavailable(format!("weather: no records for {start}..{end}")));
        }
        Ok(records)
    }
}

pub fn settings() -> ForecastSettings {
    ForecastSettings {
        latitude: LATITUDE,
        longitude: LONGITUDE,
        timezone: Prague,
        min_soc_pct: 10.0,
        max_soc_pct: 90.0,
        max_battery_charge_power_w: 3_000.0,
        max_battery_energy_wh: 10_000.0,
    }
}

pub fn tz() -> Tz {
    Prague
}

fn radiation(t: DateTime<Utc>) -> f64 {
    let local = t.with_timezone(&Prague);
    let hour = local.hour() as f64 + local.minute() as f64 / 60.0;
    (800.0 - 60.0 * (hour - 13.0).powi(2)).max(0.0)
}

/// Quarter-hour weather from `start` for `days` days, clear sky every day.
pub fn weather(start: DateTime<Utc>, days: i64) -> Vec<WeatherRecord> {
    (0..days * 96)
        .map(|q| {
            let time = start + Duration::minutes(15 * q);
            let r = radiation(time);
            WeatherRecord {
                time,
                temperature_2m: 15.0 + r / 100.0,
                direct_radiation: r,
                diffuse_radiation: r / 5.0,
                direct_normal_irradiance: r * 1.2,
            }
        })
        .collect()
}

/// Measured panel power matching `weather`, plus a few unavailable readings.
pub fn pv_history(start: DateTime<Utc>, days: i64) -> Vec<RawSample> {
    let mut samples: Vec<RawSample> = (0..days * 96)
        .map(|q| {
            let time = start + Duration::minutes(15 * q);
            RawSample::new(time + Duration::minutes(2), format!("{:.1}", radiation(time) * 4.0))
        })
        .collect();
    samples.push(RawSample::new(start + Duration::hours(3), "unavailable"));
    samples
}

/// Hourly household draw, higher in the evening.
pub fn consumption_history(start: DateTime<Utc>, days: i64) -> Vec<RawSample> {
    (0..days * 24)
        .map(|h| {
            let time = start + Duration::hours(h);
            let hour = time.with_timezone(&Prague).hour();
            let draw = if (17..22).contains(&hour) { 900.0 } else { 300.0 };
            RawSample::new(time + Duration::minutes(10), format!("{draw}"))
        })
        .collect()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Prague.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().with_timezone(&Utc)
}
