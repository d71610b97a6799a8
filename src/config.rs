use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{ModelKind, SentimentFormat};

/// Settings for one batch forecast run.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub price_data_dir: PathBuf,
    pub sentiment_path: Option<PathBuf>,
    pub sentiment_format: SentimentFormat,
    pub output_path: PathBuf,
    pub summary_path: Option<PathBuf>,
    pub lookback: usize,
    pub model: ModelKind,
    pub training: TrainingConfig,
    pub max_concurrency: usize,
    pub ticker_timeout: Option<Duration>,
}

/// Hyperparameters shared by every model kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_size: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 15,
            batch_size: 32,
            hidden_size: 32,
            learning_rate: 0.001,
            seed: None,
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            price_data_dir: PathBuf::from("data/prices"),
            sentiment_path: None,
            sentiment_format: SentimentFormat::Aggregate,
            output_path: PathBuf::from("predictions/predicted_vs_actual_stock_prices.csv"),
            summary_path: None,
            lookback: 60,
            model: ModelKind::Lstm,
            training: TrainingConfig::default(),
            max_concurrency: default_concurrency(),
            ticker_timeout: None,
        }
    }
}

impl ForecastConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let training_defaults = TrainingConfig::default();

        Self {
            price_data_dir: std::env::var("PRICE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.price_data_dir),
            sentiment_path: std::env::var("SENTIMENT_PATH").ok().map(PathBuf::from),
            sentiment_format: env_or("SENTIMENT_FORMAT", defaults.sentiment_format),
            output_path: std::env::var("PREDICTION_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            summary_path: std::env::var("RUN_SUMMARY_PATH").ok().map(PathBuf::from),
            lookback: env_or("FORECAST_LOOKBACK", defaults.lookback),
            model: env_or("FORECAST_MODEL", defaults.model),
            training: TrainingConfig {
                epochs: env_or("FORECAST_EPOCHS", training_defaults.epochs),
                batch_size: env_or("FORECAST_BATCH_SIZE", training_defaults.batch_size),
                hidden_size: env_or("FORECAST_HIDDEN_SIZE", training_defaults.hidden_size),
                learning_rate: env_or("FORECAST_LEARNING_RATE", training_defaults.learning_rate),
                seed: std::env::var("FORECAST_SEED").ok().and_then(|s| s.parse().ok()),
            },
            max_concurrency: env_or("FORECAST_MAX_CONCURRENCY", defaults.max_concurrency),
            ticker_timeout: std::env::var("FORECAST_TICKER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lookback == 0 {
            return Err("FORECAST_LOOKBACK must be at least 1".to_string());
        }
        if self.training.epochs == 0 {
            return Err("FORECAST_EPOCHS must be at least 1".to_string());
        }
        if self.training.batch_size == 0 {
            return Err("FORECAST_BATCH_SIZE must be at least 1".to_string());
        }
        if self.training.hidden_size == 0 {
            return Err("FORECAST_HIDDEN_SIZE must be at least 1".to_string());
        }
        if !self.training.learning_rate.is_finite() || self.training.learning_rate <= 0.0 {
            return Err(format!(
                "FORECAST_LEARNING_RATE must be a positive number, got {}",
                self.training.learning_rate
            ));
        }
        if self.max_concurrency == 0 {
            return Err("FORECAST_MAX_CONCURRENCY must be at least 1".to_string());
        }
        Ok(())
    }
}

/// How the binary drives the batch job.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    Once,
    Scheduled { schedule: String },
}

impl RunMode {
    pub fn from_env() -> Self {
        let mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "once".to_string());
        match mode.to_lowercase().as_str() {
            "scheduled" => RunMode::Scheduled {
                schedule: std::env::var("FORECAST_SCHEDULE")
                    .unwrap_or_else(|_| "0 0 4 * * *".to_string()),
            },
            _ => RunMode::Once,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_job() {
        let config = ForecastConfig::default();
        assert_eq!(config.lookback, 60);
        assert_eq!(config.training.epochs, 15);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.model, ModelKind::Lstm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_lookback() {
        let config = ForecastConfig {
            lookback: 0,
            ..ForecastConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_learning_rate() {
        let mut config = ForecastConfig::default();
        config.training.learning_rate = f64::NAN;
        assert!(config.validate().is_err());

        config.training.learning_rate = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FORECAST_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("FORECAST_TEST_ENV_OR", 7usize), 7);

        std::env::set_var("FORECAST_TEST_ENV_OR", " 12 ");
        assert_eq!(env_or("FORECAST_TEST_ENV_OR", 7usize), 12);
        std::env::remove_var("FORECAST_TEST_ENV_OR");
    }
}
