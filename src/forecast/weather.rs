//! Weather features from Open-Meteo
//!
//! The solar model is trained and evaluated on 15-minute irradiance and
//! temperature records. Both historical and forecast days come from the same
//! endpoint, so training and prediction see identically shaped features.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ForecastError, ForecastResult};

/// Parameter names, identical in the API request and in the feature vector.
pub const WEATHER_FEATURES: [&str; 4] = [
    "temperature_2m",
    "direct_radiation",
    "diffuse_radiation",
    "direct_normal_irradiance",
];

/// One 15-minute weather record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub time: DateTime<Utc>,
    pub temperature_2m: f64,
    pub direct_radiation: f64,
    pub diffuse_radiation: f64,
    pub direct_normal_irradiance: f64,
}

impl WeatherRecord {
    /// Feature vector in `WEATHER_FEATURES` order.
    pub fn features(&self) -> Vec<f64> {
        vec![
            self.temperature_2m,
            self.direct_radiation,
            self.diffuse_radiation,
            self.direct_normal_irradiance,
        ]
    }
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Records for the inclusive local date range, ordered by time.
    async fn fetch(&self, start_date: NaiveDate, end_date: NaiveDate) -> ForecastResult<Vec<WeatherRecord>>;
}

/// Open-Meteo forecast API client
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, latitude: f64, longitude: f64, timeout: Duration) -> ForecastResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| ForecastError::upstream("weather client", e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            latitude,
            longitude,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn fetch(&self, start_date: NaiveDate, end_date: NaiveDate) -> ForecastResult<Vec<WeatherRecord>> {
        if end_date < start_date {
            return Err(ForecastError::InvalidArgument(format!(
                "weather range ends ({end_date}) before it starts ({start_date})"
            )));
        }
        let url = format!("{}/v1/forecast", self.base_url);
        debug!(%start_date, %end_date, "fetching weather from Open-Meteo");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("minutely_15", WEATHER_FEATURES.join(",")),
                ("start_date", start_date.format("%Y-%m-%d").to_string()),
                ("end_date", end_date.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await
            .map_err(|e| ForecastError::upstream("weather request", e))?;

        if !response.status().is_success() {
            return Err(ForecastError::UpstreamUnavailable(format!(
                "Open-Meteo returned {}",
                response.status()
            )));
        }

        let body: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| ForecastError::upstream("weather payload", e))?;
        let records = parse_minutely(body.minutely_15.unwrap_or_default());
        if records.is_empty() {
            return Err(ForecastError::UpstreamUnavailable(format!(
                "Open-Meteo returned no records for {start_date}..{end_date}"
            )));
        }

        info!(records = records.len(), %start_date, %end_date, "weather fetched");
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    minutely_15: Option<Minutely15>,
}

#[derive(Debug, Default, Deserialize)]
struct Minutely15 {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    direct_radiation: Vec<Option<f64>>,
    #[serde(default)]
    diffuse_radiation: Vec<Option<f64>>,
    #[serde(default)]
    direct_normal_irradiance: Vec<Option<f64>>,
}

fn parse_minutely(data: Minutely15) -> Vec<WeatherRecord> {
    let column = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();
    let mut skipped = 0usize;
    let records: Vec<WeatherRecord> = data
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let record = (|| {
                let time = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").ok()?.and_utc();
                Some(WeatherRecord {
                    time,
                    temperature_2m: column(&data.temperature_2m, i)?,
                    direct_radiation: column(&data.direct_radiation, i)?,
                    diffuse_radiation: column(&data.diffuse_radiation, i)?,
                    direct_normal_irradiance: column(&data.direct_normal_irradiance, i)?,
                })
            })();
            if record.is_none() {
                skipped += 1;
            }
            record
        })
        .collect();
    if skipped > 0 {
        warn!(skipped, "dropped incomplete weather records");
    }
    records
}
