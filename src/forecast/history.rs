//! Telemetry history from Home Assistant.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{ForecastError, ForecastResult};

/// A recorded entity state, value still unparsed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSample {
    #[serde(rename = "last_updated")]
    pub time: DateTime<Utc>,
    #[serde(rename = "state")]
    pub value: Option<String>,
}

impl RawSample {
    pub fn new(time: DateTime<Utc>, value: impl Into<String>) -> Self {
        Self {
            time,
            value: Some(value.into()),
        }
    }
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Recorded states of `entity_id` in `[start, end]`, oldest first.
    async fn query(&self, entity_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<Vec<RawSample>>;

    /// Current raw state, `None` if the entity does not exist.
    async fn current_state(&self, entity_id: &str) -> ForecastResult<Option<String>>;
}

/// Parses a raw state, rejecting the host's placeholder values.
pub fn parse_state(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw {
        "" | "unavailable" | "unknown" | "null" | "None" => None,
        _ => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

pub fn numeric_samples(samples: &[RawSample]) -> Vec<(DateTime<Utc>, f64)> {
    samples
        .iter()
        .filter_map(|s| {
            let parsed = s.value.as_deref().and_then(parse_state);
            if parsed.is_none() {
                trace!(time = %s.time, state = ?s.value, "skipping non-numeric state");
            }
            parsed.map(|v| (s.time, v))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct EntityState {
    state: String,
}

/// Home Assistant REST API client.
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> ForecastResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForecastError::upstream("home assistant client", e))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }
}

#[async_trait]
impl TelemetrySource for HomeAssistantClient {
    async fn query(&self, entity_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<Vec<RawSample>> {
        let url = format!(
            "{}/api/history/period/{}",
            self.base_url,
            start.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let end_time = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!(entity_id, %start, %end, "fetching history");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("filter_entity_id", entity_id),
                ("end_time", end_time.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ForecastError::upstream("history request", e))?;

        match response.status() {
            StatusCode::OK => {
                let history: Vec<Vec<RawSample>> = response
                    .json()
                    .await
                    .map_err(|e| ForecastError::upstream("history payload", e))?;
                let samples = history.into_iter().next().unwrap_or_default();
                info!(entity_id, samples = samples.len(), "history retrieved");
                Ok(samples)
            }
            status => Err(ForecastError::UpstreamUnavailable(format!(
                "history for {entity_id} returned {status}"
            ))),
        }
    }

    async fn current_state(&self, entity_id: &str) -> ForecastResult<Option<String>> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ForecastError::upstream("state request", e))?;

        match response.status() {
            StatusCode::OK => {
                let state: EntityState = response
                    .json()
                    .await
                    .map_err(|e| ForecastError::upstream("state payload", e))?;
                Ok(Some(state.state))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ForecastError::UpstreamUnavailable(format!(
                "state of {entity_id} returned {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_numeric_samples_drop_placeholders() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let samples = vec![
            RawSample::new(t, "12.5"),
            RawSample::new(t, "unavailable"),
            RawSample::new(t, "unknown"),
            RawSample { time: t, value: None },
            RawSample::new(t, "n/a"),
            RawSample::new(t, " 3 "),
        ];
        assert_eq!(numeric_samples(&samples), vec![(t, 12.5), (t, 3.0)]);
    }

    #[tokio::test]
    async fn test_query_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/history/period/2024-06-01T00:00:00Z"))
            .and(query_param("filter_entity_id", "sensor.pv_power"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[
                {"state": "1200", "last_updated": "2024-06-01T10:00:00+00:00"},
                {"state": "unavailable", "last_updated": "2024-06-01T10:05:00+00:00"}
            ]])))
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(server.uri(), "secret", Duration::from_secs(2)).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let samples = client
            .query("sensor.pv_power", start, start + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(numeric_samples(&samples).len(), 1);
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(server.uri(), "secret", Duration::from_secs(2)).unwrap();
        let now = Utc::now();
        let err = client.query("sensor.x", now, now).await.unwrap_err();
        assert!(matches!(err, ForecastError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_current_state_missing_entity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/sensor.battery_soc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "57"})))
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(server.uri(), "secret", Duration::from_secs(2)).unwrap();
        assert_eq!(client.current_state("sensor.battery_soc").await.unwrap().as_deref(), Some("57"));
        assert_eq!(client.current_state("sensor.other").await.unwrap(), None);
    }
}
