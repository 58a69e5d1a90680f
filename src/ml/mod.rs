//! Machine Learning Module
//!
//! Regression models behind the solar and consumption producers:
//! - Random forest regression of panel power on weather features
//! - Quantile gradient boosting of household draw on calendar features
//! - Feature standardisation shared between training and prediction
//! - Artifact persistence with modification-time based staleness

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

pub mod quantile;
pub mod smartcore;
pub mod store;
pub mod training;

pub use self::quantile::QuantileBoostingRegressor;
pub use self::smartcore::SmartcoreRandomForest;
pub use store::{load_artifact, save_artifact, FileModelStore, MemoryModelStore, ModelStore};
pub use training::{calculate_metrics, pinball_loss, TrainingDataset};

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    RandomForest,
    QuantileGradientBoosting,
}

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    pub validation_metrics: ValidationMetrics,
    pub feature_names: Vec<String>,
}

impl ModelMetadata {
    pub fn new(
        prefix: &str,
        model_type: ModelType,
        training_samples: usize,
        validation_metrics: ValidationMetrics,
        feature_names: Vec<String>,
    ) -> Self {
        Self {
            model_id: format!("{prefix}_{}", uuid::Uuid::new_v4()),
            model_type,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples,
            validation_metrics,
            feature_names,
        }
    }
}

/// Validation Metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
    /// Pinball loss, set for quantile models
    pub pinball: Option<f64>,
}

/// Per-feature z-score standardisation fitted on the training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl FeatureScaler {
    pub fn fit(rows: &[Vec<f64>]) -> ForecastResult<Self> {
        let n_features = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| ForecastError::Model("cannot fit scaler on empty dataset".into()))?;
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(ForecastError::Model("all feature rows must have the same length".into()));
        }

        let n = rows.len() as f64;
        let means: Vec<f64> = (0..n_features)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let stds = (0..n_features)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                var.sqrt()
            })
            .collect();
        Ok(Self { means, stds })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> ForecastResult<Vec<f64>> {
        if row.len() != self.means.len() {
            return Err(ForecastError::Model(format!(
                "scaler expects {} features, got {}",
                self.means.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(f, (mean, std))| {
                if std.abs() < 1e-10 {
                    0.0 // constant feature
                } else {
                    (f - mean) / std
                }
            })
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> ForecastResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
