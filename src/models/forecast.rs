use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SkipReason;

/// One row of the persisted prediction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Predicted_Close")]
    pub predicted_close: f64,
}

/// Sequence regressor used for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Lstm,
    Linear,
}

impl ModelKind {
    pub fn description(&self) -> &'static str {
        match self {
            ModelKind::Lstm => {
                "Single-layer LSTM over the scaled close window with a dense residual head"
            }
            ModelKind::Linear => {
                "Recency-weighted linear autoregression over the scaled close window"
            }
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lstm" => Ok(ModelKind::Lstm),
            "linear" | "recency" => Ok(ModelKind::Linear),
            other => Err(format!("Unknown model kind: {}", other)),
        }
    }
}

/// Where a ticker is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerStage {
    Discovered,
    Loaded,
    Windowed,
    Trained,
    Predicted,
    Recorded,
}

impl std::fmt::Display for TickerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TickerStage::Discovered => "discovered",
            TickerStage::Loaded => "loaded",
            TickerStage::Windowed => "windowed",
            TickerStage::Trained => "trained",
            TickerStage::Predicted => "predicted",
            TickerStage::Recorded => "recorded",
        };
        f.write_str(label)
    }
}

/// A ticker that did not make it into the table, with the last stage it reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub stage: TickerStage,
    pub reason: SkipReason,
    pub detail: String,
}

/// Per-run report of what was predicted and what was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub model: ModelKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tickers_discovered: usize,
    pub predictions_written: usize,
    pub skipped: Vec<SkippedTicker>,
}

impl BatchSummary {
    pub fn skipped_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parses_case_insensitively() {
        assert_eq!("LSTM".parse::<ModelKind>(), Ok(ModelKind::Lstm));
        assert_eq!("linear".parse::<ModelKind>(), Ok(ModelKind::Linear));
        assert!("transformer".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_prediction_row_uses_table_column_names() {
        let row = PredictionRow {
            ticker: "ABC".to_string(),
            predicted_close: 170.5,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["Ticker"], "ABC");
        assert_eq!(json["Predicted_Close"], 170.5);
    }

    #[test]
    fn test_skipped_by_reason_counts() {
        let skip = |ticker: &str, reason| SkippedTicker {
            ticker: ticker.to_string(),
            stage: TickerStage::Discovered,
            reason,
            detail: String::new(),
        };
        let now = Utc::now();
        let summary = BatchSummary {
            run_id: Uuid::new_v4(),
            model: ModelKind::Lstm,
            started_at: now,
            finished_at: now,
            tickers_discovered: 4,
            predictions_written: 1,
            skipped: vec![
                skip("A", SkipReason::InsufficientHistory),
                skip("B", SkipReason::InsufficientHistory),
                skip("C", SkipReason::DataUnavailable),
            ],
        };

        let counts = summary.skipped_by_reason();
        assert_eq!(counts[&SkipReason::InsufficientHistory], 2);
        assert_eq!(counts[&SkipReason::DataUnavailable], 1);
        assert!(!counts.contains_key(&SkipReason::TrainingFailure));
    }
}
