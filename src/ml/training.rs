//! Training datasets and evaluation metrics.

use ::smartcore::linalg::basic::matrix::DenseMatrix;

use super::ValidationMetrics;
use crate::error::{ForecastError, ForecastResult};

/// Feature rows with their targets, ready for fitting.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl TrainingDataset {
    pub fn new(rows: Vec<Vec<f64>>, targets: Vec<f64>, feature_names: Vec<String>) -> ForecastResult<Self> {
        if rows.len() != targets.len() {
            return Err(ForecastError::Model(format!(
                "feature and target count mismatch: {} rows, {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != feature_names.len()) {
            return Err(ForecastError::Model(format!(
                "row has {} features, expected {}",
                bad.len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            rows,
            targets,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Row-major rows to a smartcore matrix.
pub(crate) fn to_matrix(rows: &[Vec<f64>]) -> ForecastResult<DenseMatrix<f64>> {
    let n_features = rows
        .first()
        .map(Vec::len)
        .ok_or_else(|| ForecastError::Model("cannot build matrix from empty rows".into()))?;
    let mut flat = Vec::with_capacity(rows.len() * n_features);
    for row in rows {
        if row.len() != n_features {
            return Err(ForecastError::Model("all feature rows must have the same length".into()));
        }
        flat.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(rows.len(), n_features, flat, false))
}

pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> ForecastResult<ValidationMetrics> {
    if predictions.len() != targets.len() {
        return Err(ForecastError::Model("prediction and target count mismatch".into()));
    }
    if predictions.is_empty() {
        return Err(ForecastError::Model("no predictions to evaluate".into()));
    }

    let n = predictions.len() as f64;
    let pairs = || predictions.iter().zip(targets.iter());

    let mae = pairs().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
    let rmse = (pairs().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n).sqrt();
    let mape = pairs()
        .filter(|(_, t)| t.abs() > 1e-10)
        .map(|(p, t)| ((p - t) / t).abs() * 100.0)
        .sum::<f64>()
        / n;

    let mean_target = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = pairs().map(|(p, t)| (t - p).powi(2)).sum();
    let r2 = if ss_tot.abs() < 1e-10 { 0.0 } else { 1.0 - ss_res / ss_tot };

    Ok(ValidationMetrics {
        mae,
        rmse,
        mape,
        r2,
        pinball: None,
    })
}

/// Mean pinball loss of `predictions` at quantile `alpha`.
pub fn pinball_loss(predictions: &[f64], targets: &[f64], alpha: f64) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| {
            let diff = t - p;
            if diff >= 0.0 {
                alpha * diff
            } else {
                (alpha - 1.0) * diff
            }
        })
        .sum::<f64>()
        / predictions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_calculate_metrics_perfect_fit() {
        let targets = vec![1.0, 2.0, 3.0];
        let metrics = calculate_metrics(&targets, &targets).unwrap();
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_relative_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn test_calculate_metrics_rejects_mismatch() {
        assert!(calculate_metrics(&[1.0], &[1.0, 2.0]).is_err());
        assert!(calculate_metrics(&[], &[]).is_err());
    }

    #[test]
    fn test_pinball_loss_is_asymmetric() {
        // under-prediction costs alpha, over-prediction costs 1 - alpha
        assert_relative_eq!(pinball_loss(&[0.0], &[10.0], 0.95), 9.5);
        assert_relative_eq!(pinball_loss(&[10.0], &[0.0], 0.95), 0.5);
    }

    #[test]
    fn test_dataset_validates_shape() {
        let names = vec!["hour".to_string()];
        assert!(TrainingDataset::new(vec![vec![1.0]], vec![1.0, 2.0], names.clone()).is_err());
        assert!(TrainingDataset::new(vec![vec![1.0, 2.0]], vec![1.0], names.clone()).is_err());
        assert_eq!(TrainingDataset::new(vec![vec![1.0]], vec![1.0], names).unwrap().len(), 1);
    }
}
