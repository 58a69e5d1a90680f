//! Solar power producer: weather features to panel power.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

use super::daylight::DaylightFilter;
use super::features::{quarter_hour_power, solar_training_set};
use super::history::{numeric_samples, TelemetrySource};
use super::weather::WeatherSource;
use crate::domain::{ChannelNames, ForecastPoint, ForecastSeries};
use crate::error::{ForecastError, ForecastResult, MIN_TRAINING_ROWS};
use crate::ml::{load_artifact, save_artifact, FeatureScaler, ModelMetadata, ModelStore, SmartcoreRandomForest};
use crate::worker::run_blocking;

pub const SOLAR_MODEL: &str = "solar_model.bin";
pub const SOLAR_SCALER: &str = "solar_scaler.bin";

pub struct SolarForecaster {
    telemetry: Arc<dyn TelemetrySource>,
    weather: Arc<dyn WeatherSource>,
    store: Arc<dyn ModelStore>,
    entity_id: String,
    tz: Tz,
    daylight: DaylightFilter,
}

impl SolarForecaster {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        weather: Arc<dyn WeatherSource>,
        store: Arc<dyn ModelStore>,
        entity_id: impl Into<String>,
        daylight: DaylightFilter,
        tz: Tz,
    ) -> Self {
        Self {
            telemetry,
            weather,
            store,
            entity_id: entity_id.into(),
            tz,
            daylight,
        }
    }

    pub fn last_trained(&self) -> Option<DateTime<Utc>> {
        self.store.modified_at(SOLAR_MODEL)
    }

    /// Fits the model on measured power joined with the weather of the same
    /// 15-minute slots. Night records are kept.
    pub async fn train(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<ModelMetadata> {
        let raw = self.telemetry.query(&self.entity_id, start, end).await?;
        let power = quarter_hour_power(&numeric_samples(&raw));
        if power.is_empty() {
            return Err(ForecastError::insufficient("solar training", 0));
        }

        let weather = self
            .weather
            .fetch(
                start.with_timezone(&self.tz).date_naive(),
                end.with_timezone(&self.tz).date_naive(),
            )
            .await?;
        let dataset = solar_training_set(&weather, &power)?;
        if dataset.len() < MIN_TRAINING_ROWS {
            return Err(ForecastError::insufficient("solar training", dataset.len()));
        }
        info!(rows = dataset.len(), slots = power.len(), "training solar model");

        let store = self.store.clone();
        run_blocking("solar training", move || {
            let scaler = FeatureScaler::fit(&dataset.rows)?;
            let scaled = crate::ml::TrainingDataset::new(
                scaler.transform(&dataset.rows)?,
                dataset.targets.clone(),
                dataset.feature_names.clone(),
            )?;
            let model = SmartcoreRandomForest::train(&scaled, SmartcoreRandomForest::default_parameters())?;
            save_artifact(store.as_ref(), SOLAR_MODEL, &model)?;
            save_artifact(store.as_ref(), SOLAR_SCALER, &scaler)?;
            info!(
                model_id = %model.metadata.model_id,
                mae = model.metadata.validation_metrics.mae,
                r2 = model.metadata.validation_metrics.r2,
                "solar model trained"
            );
            Ok(model.metadata)
        })
        .await
    }

    /// One point per daylight weather record in `[from, to]`. The model is
    /// loaded from the store on every call.
    pub async fn predict(&self, from: DateTime<Tz>, to: DateTime<Tz>) -> ForecastResult<ForecastSeries> {
        if to < from {
            return Err(ForecastError::InvalidArgument(format!("prediction window ends ({to}) before it starts ({from})")));
        }
        if !self.store.exists(SOLAR_MODEL) || !self.store.exists(SOLAR_SCALER) {
            return Err(ForecastError::StaleModelMissing("solar"));
        }

        let records: Vec<_> = self
            .weather
            .fetch(from.date_naive(), to.date_naive())
            .await?
            .into_iter()
            .filter(|r| r.time >= from && r.time <= to && self.daylight.is_daytime(&r.time))
            .collect();
        if records.is_empty() {
            warn!(%from, %to, "no daylight weather records in prediction window");
        }

        let store = self.store.clone();
        let tz = self.tz;
        run_blocking("solar prediction", move || {
            let model: SmartcoreRandomForest = load_artifact(store.as_ref(), SOLAR_MODEL)?;
            let scaler: FeatureScaler = load_artifact(store.as_ref(), SOLAR_SCALER)?;
            let rows: Vec<Vec<f64>> = records.iter().map(|r| r.features()).collect();
            let predictions = model.predict(&scaler.transform(&rows)?)?;
            let points = records
                .iter()
                .zip(predictions)
                .map(|(r, power)| ForecastPoint::single(r.time.with_timezone(&tz).fixed_offset(), power.max(0.0)))
                .collect();
            Ok(ForecastSeries::new(points, ChannelNames::SOLAR, Utc::now()))
        })
        .await
    }
}
