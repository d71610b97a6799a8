use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external::price_source::PriceSourceError;
use crate::services::forecast_model::ModelError;
use crate::services::prediction_store::StoreError;
use crate::services::scaler::ScalerError;
use crate::services::windower::WindowError;

/// Run-level failures. Anything in here aborts the batch.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Price source error: {0}")]
    Source(#[from] PriceSourceError),
    #[error("Prediction store error: {0}")]
    Store(#[from] StoreError),
    #[error("Scheduler error: {0}")]
    Scheduler(String),
    #[error("External error: {0}")]
    External(String),
}

/// Why a ticker was left out of the prediction table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DataUnavailable,
    InsufficientHistory,
    TrainingFailure,
    Timeout,
}

impl SkipReason {
    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::DataUnavailable => "raw price history missing, empty or unreadable",
            SkipReason::InsufficientHistory => "not enough history to build a single window",
            SkipReason::TrainingFailure => "model training or inference failed",
            SkipReason::Timeout => "ticker exceeded its processing deadline",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SkipReason::DataUnavailable => "data_unavailable",
            SkipReason::InsufficientHistory => "insufficient_history",
            SkipReason::TrainingFailure => "training_failure",
            SkipReason::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Per-ticker failures. These never escape the ticker boundary of the batch job.
#[derive(Debug, Error)]
pub enum TickerError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),
    #[error("Insufficient history: {length} rows, need more than {lookback}")]
    InsufficientHistory { length: usize, lookback: usize },
    #[error("Training failure: {0}")]
    TrainingFailure(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl TickerError {
    pub fn reason(&self) -> SkipReason {
        match self {
            TickerError::DataUnavailable(_) => SkipReason::DataUnavailable,
            TickerError::InsufficientHistory { .. } => SkipReason::InsufficientHistory,
            TickerError::TrainingFailure(_) => SkipReason::TrainingFailure,
            TickerError::Timeout(_) => SkipReason::Timeout,
        }
    }
}

impl From<PriceSourceError> for TickerError {
    fn from(value: PriceSourceError) -> Self {
        TickerError::DataUnavailable(value.to_string())
    }
}

impl From<WindowError> for TickerError {
    fn from(value: WindowError) -> Self {
        match value {
            WindowError::InsufficientData { length, lookback } => {
                TickerError::InsufficientHistory { length, lookback }
            }
            other => TickerError::TrainingFailure(other.to_string()),
        }
    }
}

impl From<ScalerError> for TickerError {
    fn from(value: ScalerError) -> Self {
        match value {
            ScalerError::Empty => TickerError::DataUnavailable(value.to_string()),
            other => TickerError::TrainingFailure(other.to_string()),
        }
    }
}

impl From<ModelError> for TickerError {
    fn from(value: ModelError) -> Self {
        TickerError::TrainingFailure(value.to_string())
    }
}
