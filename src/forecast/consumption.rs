//! Household consumption producer: calendar features to three quantile bands.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;

use super::features::{calendar_features, consumption_training_set, hourly_means};
use super::history::{numeric_samples, TelemetrySource};
use crate::domain::time::local_datetime;
use crate::domain::{Bands, ChannelNames, ForecastPoint, ForecastSeries};
use crate::error::{ForecastError, ForecastResult, MIN_TRAINING_ROWS};
use crate::ml::quantile::QuantileBoostingParameters;
use crate::ml::{
    load_artifact, save_artifact, FeatureScaler, ModelMetadata, ModelStore, QuantileBoostingRegressor, TrainingDataset,
};
use crate::worker::run_blocking;

pub const CONSUMPTION_SCALER: &str = "consumption_scaler.bin";

/// Quantile levels backing the min, med and max channels.
pub const QUANTILES: Bands<(f64, &str)> = Bands {
    min: (0.05, "consumption_model_low.bin"),
    med: (0.50, "consumption_model_med.bin"),
    max: (0.95, "consumption_model_high.bin"),
};

pub struct ConsumptionForecaster {
    telemetry: Arc<dyn TelemetrySource>,
    store: Arc<dyn ModelStore>,
    entity_id: String,
    tz: Tz,
}

impl ConsumptionForecaster {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        store: Arc<dyn ModelStore>,
        entity_id: impl Into<String>,
        tz: Tz,
    ) -> Self {
        Self {
            telemetry,
            store,
            entity_id: entity_id.into(),
            tz,
        }
    }

    pub fn last_trained(&self) -> Option<DateTime<Utc>> {
        self.store.modified_at(QUANTILES.med.1)
    }

    fn is_trained(&self) -> bool {
        [QUANTILES.min.1, QUANTILES.med.1, QUANTILES.max.1, CONSUMPTION_SCALER]
            .iter()
            .all(|name| self.store.exists(name))
    }

    pub async fn train(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<Vec<ModelMetadata>> {
        let raw = self.telemetry.query(&self.entity_id, start, end).await?;
        let hourly = hourly_means(&numeric_samples(&raw), self.tz);
        let dataset = consumption_training_set(&hourly, self.tz)?;
        if dataset.len() < MIN_TRAINING_ROWS {
            return Err(ForecastError::insufficient("consumption training", dataset.len()));
        }
        info!(rows = dataset.len(), "training consumption models");

        let store = self.store.clone();
        run_blocking("consumption training", move || {
            let scaler = FeatureScaler::fit(&dataset.rows)?;
            let scaled = TrainingDataset::new(
                scaler.transform(&dataset.rows)?,
                dataset.targets.clone(),
                dataset.feature_names.clone(),
            )?;

            let mut trained = Vec::with_capacity(3);
            for (alpha, artifact) in [QUANTILES.min, QUANTILES.max, QUANTILES.med] {
                let model = QuantileBoostingRegressor::train(&scaled, QuantileBoostingParameters::for_quantile(alpha))?;
                info!(
                    alpha,
                    model_id = %model.metadata.model_id,
                    pinball = model.metadata.validation_metrics.pinball,
                    "consumption quantile model trained"
                );
                trained.push((artifact, model));
            }
            // median last: its mtime marks a complete set
            save_artifact(store.as_ref(), CONSUMPTION_SCALER, &scaler)?;
            for (artifact, model) in &trained {
                save_artifact(store.as_ref(), artifact, model)?;
            }
            Ok(trained.into_iter().map(|(_, m)| m.metadata).collect())
        })
        .await
    }

    /// 24 hourly points per local date in `[from_date, to_date]`.
    pub async fn predict(&self, from_date: NaiveDate, to_date: NaiveDate) -> ForecastResult<ForecastSeries> {
        if to_date < from_date {
            return Err(ForecastError::InvalidArgument(format!(
                "prediction range ends ({to_date}) before it starts ({from_date})"
            )));
        }
        if !self.is_trained() {
            return Err(ForecastError::StaleModelMissing("consumption"));
        }

        let hours: Vec<DateTime<Tz>> = from_date
            .iter_days()
            .take_while(|d| *d <= to_date)
            .flat_map(|d| (0..24).filter_map(move |h| Some((d, NaiveTime::from_hms_opt(h, 0, 0)?))))
            .map(|(d, t)| local_datetime(self.tz, d, t))
            .collect();

        let store = self.store.clone();
        run_blocking("consumption prediction", move || {
            let scaler: FeatureScaler = load_artifact(store.as_ref(), CONSUMPTION_SCALER)?;
            let rows = scaler.transform(&hours.iter().map(calendar_features).collect::<Vec<_>>())?;
            let predict = |artifact: &str| -> ForecastResult<Vec<f64>> {
                let model: QuantileBoostingRegressor = load_artifact(store.as_ref(), artifact)?;
                model.predict(&rows)
            };
            let low = predict(QUANTILES.min.1)?;
            let med = predict(QUANTILES.med.1)?;
            let high = predict(QUANTILES.max.1)?;

            let points = hours
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    ForecastPoint::banded(
                        t.fixed_offset(),
                        Bands {
                            min: low[i],
                            med: med[i],
                            max: high[i],
                        },
                    )
                })
                .collect();
            Ok(ForecastSeries::new(points, ChannelNames::BANDED, Utc::now()))
        })
        .await
    }
}
