//! Quantile gradient boosting over smartcore decision trees.
//!
//! Each stage fits a shallow regression tree to the negative gradient of the
//! pinball loss, then replaces every leaf's output with the alpha-quantile of
//! the residuals that landed in it. smartcore does not expose leaf indices, so
//! leaves are identified by the value the tree predicts for them.

use ::smartcore::linalg::basic::matrix::DenseMatrix;
use ::smartcore::tree::decision_tree_regressor::{DecisionTreeRegressor, DecisionTreeRegressorParameters};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::training::{calculate_metrics, pinball_loss, to_matrix, TrainingDataset};
use super::{ModelMetadata, ModelType};
use crate::error::{ForecastError, ForecastResult};

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileBoostingParameters {
    pub alpha: f64,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
}

impl QuantileBoostingParameters {
    pub fn for_quantile(alpha: f64) -> Self {
        Self {
            alpha,
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Stage {
    tree: Tree,
    /// Sorted (tree output bits, leaf update) pairs
    leaves: Vec<(u64, f64)>,
}

impl Stage {
    fn update_for(&self, tree_output: f64) -> f64 {
        self.leaves
            .binary_search_by_key(&tree_output.to_bits(), |(bits, _)| *bits)
            .map(|i| self.leaves[i].1)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuantileBoostingRegressor {
    pub metadata: ModelMetadata,
    pub params: QuantileBoostingParameters,
    init: f64,
    stages: Vec<Stage>,
}

impl QuantileBoostingRegressor {
    pub fn train(dataset: &TrainingDataset, params: QuantileBoostingParameters) -> ForecastResult<Self> {
        if dataset.is_empty() {
            return Err(ForecastError::Model("cannot train on empty dataset".into()));
        }
        if !(params.alpha > 0.0 && params.alpha < 1.0) {
            return Err(ForecastError::InvalidArgument(format!(
                "quantile must lie strictly between 0 and 1, got {}",
                params.alpha
            )));
        }

        let x = to_matrix(&dataset.rows)?;
        let y = &dataset.targets;
        let init = quantile(y, params.alpha);
        let mut fitted = vec![init; y.len()];
        let mut stages = Vec::with_capacity(params.n_estimators);
        let tree_params = DecisionTreeRegressorParameters::default().with_max_depth(params.max_depth);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();
            let gradient: Vec<f64> = residuals
                .iter()
                .map(|r| if *r > 0.0 { params.alpha } else { params.alpha - 1.0 })
                .collect();

            let tree = Tree::fit(&x, &gradient, tree_params.clone())
                .map_err(|e| ForecastError::Model(format!("boosting stage fit failed: {e:?}")))?;
            let outputs = tree
                .predict(&x)
                .map_err(|e| ForecastError::Model(format!("boosting stage predict failed: {e:?}")))?;

            let mut by_leaf: HashMap<u64, Vec<f64>> = HashMap::new();
            for (out, r) in outputs.iter().zip(&residuals) {
                by_leaf.entry(out.to_bits()).or_default().push(*r);
            }
            let mut leaves: Vec<(u64, f64)> = by_leaf
                .into_iter()
                .map(|(bits, rs)| (bits, quantile(&rs, params.alpha)))
                .collect();
            leaves.sort_by_key(|(bits, _)| *bits);

            let stage = Stage { tree, leaves };
            for (f, out) in fitted.iter_mut().zip(&outputs) {
                *f += params.learning_rate * stage.update_for(*out);
            }
            stages.push(stage);
        }

        let mut metrics = calculate_metrics(&fitted, y)?;
        metrics.pinball = Some(pinball_loss(&fitted, y, params.alpha));
        debug!(
            alpha = params.alpha,
            samples = dataset.len(),
            pinball = metrics.pinball,
            "quantile boosting fitted"
        );

        let metadata = ModelMetadata::new(
            "quantile_gbr",
            ModelType::QuantileGradientBoosting,
            dataset.len(),
            metrics,
            dataset.feature_names.clone(),
        );
        Ok(Self {
            metadata,
            params,
            init,
            stages,
        })
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> ForecastResult<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = to_matrix(rows)?;
        let mut out = vec![self.init; rows.len()];
        for stage in &self.stages {
            let outputs = stage
                .tree
                .predict(&x)
                .map_err(|e| ForecastError::Model(format!("boosting stage predict failed: {e:?}")))?;
            for (o, t) in out.iter_mut().zip(&outputs) {
                *o += self.params.learning_rate * stage.update_for(*t);
            }
        }
        Ok(out)
    }
}

/// Linear-interpolated quantile, matching numpy's default.
fn quantile(values: &[f64], alpha: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = alpha * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
