//! SmartCore RandomForest wrapper used by the solar producer.
//!
//! Conservative parameters keep training on a small edge device under a
//! couple of minutes: limited depth, a moderate number of trees and no
//! retained samples.

use ::smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use ::smartcore::linalg::basic::matrix::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::training::{calculate_metrics, to_matrix, TrainingDataset};
use super::{ModelMetadata, ModelType};
use crate::error::{ForecastError, ForecastResult};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreRandomForest {
    pub metadata: ModelMetadata,
    model: Forest,
    pub n_trees: usize,
    pub max_depth: Option<u16>,
}

impl SmartcoreRandomForest {
    pub fn default_parameters() -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(10),
            min_samples_leaf: 2,
            min_samples_split: 5,
            n_trees: 50,
            m: None,
            keep_samples: false,
            seed: 42,
        }
    }

    pub fn custom_parameters(
        n_trees: usize,
        max_depth: Option<u16>,
        min_samples_split: usize,
    ) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth,
            min_samples_leaf: 2,
            min_samples_split,
            n_trees,
            m: None,
            keep_samples: false,
            seed: 42,
        }
    }

    pub fn train(dataset: &TrainingDataset, params: RandomForestRegressorParameters) -> ForecastResult<Self> {
        if dataset.is_empty() {
            return Err(ForecastError::Model("cannot train on empty dataset".into()));
        }

        let n_trees = params.n_trees;
        let max_depth = params.max_depth;
        let x = to_matrix(&dataset.rows)?;
        let model = Forest::fit(&x, &dataset.targets, params)
            .map_err(|e| ForecastError::Model(format!("random forest training failed: {e:?}")))?;

        let predictions = model
            .predict(&x)
            .map_err(|e| ForecastError::Model(format!("prediction failed during validation: {e:?}")))?;
        let metrics = calculate_metrics(&predictions, &dataset.targets)?;
        debug!(samples = dataset.len(), n_trees, mae = metrics.mae, r2 = metrics.r2, "random forest fitted");

        let metadata = ModelMetadata::new(
            "smartcore_rf",
            ModelType::RandomForest,
            dataset.len(),
            metrics,
            dataset.feature_names.clone(),
        );

        Ok(Self {
            metadata,
            model,
            n_trees,
            max_depth,
        })
    }

    /// Predicts one value per (already scaled) feature row.
    pub fn predict(&self, rows: &[Vec<f64>]) -> ForecastResult<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = to_matrix(rows)?;
        self.model
            .predict(&x)
            .map_err(|e| ForecastError::Model(format!("random forest prediction failed: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_dataset() -> TrainingDataset {
        // y = 2x1 + 3x2
        let rows: Vec<Vec<f64>> = (1..=4)
            .flat_map(|a| (1..=4).map(move |b| vec![a as f64, b as f64]))
            .collect();
        let targets = rows.iter().map(|r| 2.0 * r[0] + 3.0 * r[1]).collect();
        TrainingDataset::new(rows, targets, vec!["x1".into(), "x2".into()]).unwrap()
    }

    #[test]
    fn test_random_forest_parameters() {
        let params = SmartcoreRandomForest::default_parameters();
        assert_eq!(params.n_trees, 50);
        assert_eq!(params.max_depth, Some(10));
        assert_eq!(params.min_samples_split, 5);
        assert!(!params.keep_samples);
    }

    #[test]
    fn test_train_and_predict() {
        let params = SmartcoreRandomForest::custom_parameters(20, Some(5), 2);
        let model = SmartcoreRandomForest::train(&linear_dataset(), params).unwrap();
        assert_eq!(model.metadata.training_samples, 16);
        assert_eq!(model.n_trees, 20);

        let pred = model.predict(&[vec![1.0, 1.0], vec![4.0, 4.0]]).unwrap();
        assert!(pred[0] < pred[1]);
        assert!(pred[1] > 12.0 && pred[1] <= 20.0);
    }

    #[test]
    fn test_bincode_round_trip_reproduces_predictions() {
        let params = SmartcoreRandomForest::custom_parameters(10, Some(4), 2);
        let model = SmartcoreRandomForest::train(&linear_dataset(), params).unwrap();
        let input = vec![vec![2.5, 3.5], vec![1.0, 4.0]];

        let bytes = bincode::serialize(&model).unwrap();
        let restored: SmartcoreRandomForest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(model.predict(&input).unwrap(), restored.predict(&input).unwrap());
    }

    #[test]
    fn test_train_rejects_empty_dataset() {
        let empty = TrainingDataset::new(vec![], vec![], vec!["x".into()]).unwrap();
        let params = SmartcoreRandomForest::default_parameters();
        assert!(SmartcoreRandomForest::train(&empty, params).is_err());
    }
}
