use thiserror::Error;

use crate::domain::ForecastKind;

/// Minimum number of joined rows a training step needs before fitting.
pub const MIN_TRAINING_ROWS: usize = 10;

/// Errors raised by the forecasting pipeline.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data for {stage}: {rows} usable rows, need at least {required}")]
    InsufficientData {
        stage: &'static str,
        rows: usize,
        required: usize,
    },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("no trained model available for {0}")]
    StaleModelMissing(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("model serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("forecasts not ready: {kind} failed before every forecast was produced")]
    NotReady {
        kind: ForecastKind,
        #[source]
        source: Box<ForecastError>,
    },
}

impl ForecastError {
    pub fn insufficient(stage: &'static str, rows: usize) -> Self {
        Self::InsufficientData {
            stage,
            rows,
            required: MIN_TRAINING_ROWS,
        }
    }

    pub fn upstream(context: &str, cause: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable(format!("{context}: {cause}"))
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

pub type ForecastResult<T> = Result<T, ForecastError>;
