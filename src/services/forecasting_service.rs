use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn, Instrument, Span};

use crate::config::ForecastConfig;
use crate::errors::TickerError;
use crate::external::price_source::PriceSource;
use crate::models::{MergedSeries, PredictionRow, SkippedTicker, TickerStage};
use crate::services::forecast_model::{train_model, Deadline, ModelError, TrainingReport};
use crate::services::scaler::ScaledRange;
use crate::services::sentiment_service::SentimentTable;
use crate::services::series_loader::load_merged_series;
use crate::services::windower::build_windows;

/// A ticker's successful forecast plus what went into it.
#[derive(Debug, Clone, Serialize)]
pub struct TickerForecast {
    pub row: PredictionRow,
    pub history_rows: usize,
    pub windows: usize,
    pub last_close: f64,
    pub scaled_prediction: f64,
    pub range: ScaledRange,
    pub training: TrainingReport,
}

/// Failure annotated with the last stage the ticker completed.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: TickerStage,
    pub error: TickerError,
}

impl StageFailure {
    fn at(stage: TickerStage, error: impl Into<TickerError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[derive(Debug)]
pub enum TickerOutcome {
    Predicted(Box<TickerForecast>),
    Skipped(SkippedTicker),
}

/// Scale, window, train and predict on an already loaded series.
///
/// CPU bound; the batch job runs it on the blocking pool. The fitted range is used
/// for both the forward transform and the final inverse. Training stops with a
/// timeout once `deadline` passes.
pub fn forecast_series(
    series: &MergedSeries,
    config: &ForecastConfig,
    deadline: Deadline,
) -> Result<TickerForecast, StageFailure> {
    let closes = series.closes();
    let lookback = config.lookback;

    if closes.len() <= lookback {
        return Err(StageFailure::at(
            TickerStage::Loaded,
            TickerError::InsufficientHistory {
                length: closes.len(),
                lookback,
            },
        ));
    }

    let range = ScaledRange::fit(&closes).map_err(|e| StageFailure::at(TickerStage::Loaded, e))?;
    if range.is_degenerate() {
        debug!("{}: flat series at {}, using constant scaling", series.ticker, range.min());
    }

    let scaled = range.transform_all(&closes);
    let set = build_windows(&scaled, lookback).map_err(|e| StageFailure::at(TickerStage::Loaded, e))?;
    debug!("{}: stage windowed ({} windows)", series.ticker, set.len());

    let model = train_model(config.model, &set, &config.training, deadline).map_err(|e| match e {
        ModelError::DeadlineExceeded { .. } => StageFailure::at(
            TickerStage::Windowed,
            TickerError::Timeout(config.ticker_timeout.unwrap_or_default()),
        ),
        other => StageFailure::at(TickerStage::Windowed, other),
    })?;
    debug!(
        "{}: stage trained (final loss {:.6})",
        series.ticker,
        model.report.final_loss().unwrap_or(f64::NAN)
    );

    let scaled_prediction = model
        .predict_next(set.latest_view())
        .map_err(|e| StageFailure::at(TickerStage::Trained, e))?;

    let predicted_close = range.inverse(scaled_prediction);
    if !predicted_close.is_finite() {
        return Err(StageFailure::at(
            TickerStage::Trained,
            TickerError::TrainingFailure(format!("inverse-scaled prediction {}", predicted_close)),
        ));
    }
    debug!("{}: stage predicted ({:.4})", series.ticker, predicted_close);

    Ok(TickerForecast {
        row: PredictionRow {
            ticker: series.ticker.clone(),
            predicted_close,
        },
        history_rows: series.len(),
        windows: set.len(),
        last_close: closes[closes.len() - 1],
        scaled_prediction,
        range,
        training: model.report,
    })
}

/// Runs one ticker from discovery to a prediction or a skip. Never returns an error.
pub async fn forecast_ticker(
    source: &dyn PriceSource,
    ticker: &str,
    sentiment: &SentimentTable,
    config: Arc<ForecastConfig>,
) -> TickerOutcome {
    let span = tracing::info_span!("ticker", ticker = %ticker);
    run_pipeline(source, ticker, sentiment, config)
        .instrument(span)
        .await
}

async fn run_pipeline(
    source: &dyn PriceSource,
    ticker: &str,
    sentiment: &SentimentTable,
    config: Arc<ForecastConfig>,
) -> TickerOutcome {
    let started = std::time::Instant::now();
    debug!("{}: stage discovered", ticker);

    let series = match load_merged_series(source, ticker, sentiment).await {
        Ok(series) => series,
        Err(error) => return skipped(ticker, StageFailure::at(TickerStage::Discovered, error)),
    };
    debug!(
        "{}: stage loaded ({} rows, {} with sentiment)",
        ticker,
        series.len(),
        series.sentiment_days()
    );

    let timeout = config.ticker_timeout;
    let outcome = run_guarded(timeout, move |deadline| forecast_series(&series, &config, deadline)).await;

    match outcome {
        Ok(forecast) => {
            info!(
                "✅ {}: predicted close {:.4} from {} windows (last close {:.4}) in {:.2}s",
                ticker,
                forecast.row.predicted_close,
                forecast.windows,
                forecast.last_close,
                started.elapsed().as_secs_f64()
            );
            TickerOutcome::Predicted(Box::new(forecast))
        }
        Err(failure) => skipped(ticker, failure),
    }
}

/// Runs `work` on the blocking pool, bounded by `timeout` when one is set.
///
/// `work` receives a deadline that expires with the timeout, so a ticker that is given
/// up on also stops training at its next mini-batch. A panic inside `work` becomes a
/// training failure for this ticker only.
pub async fn run_guarded<T, F>(timeout: Option<Duration>, work: F) -> Result<T, StageFailure>
where
    T: Send + 'static,
    F: FnOnce(Deadline) -> Result<T, StageFailure> + Send + 'static,
{
    let deadline = Deadline::from_limit(timeout);
    let span = Span::current();
    let handle = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        work(deadline)
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(StageFailure::at(TickerStage::Loaded, TickerError::Timeout(limit)));
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|join_error| {
        Err(StageFailure::at(
            TickerStage::Loaded,
            TickerError::TrainingFailure(format!("training task aborted: {}", join_error)),
        ))
    })
}

fn skipped(ticker: &str, failure: StageFailure) -> TickerOutcome {
    let reason = failure.error.reason();
    warn!(
        "⚠️ Skipping {} after stage {} ({}): {}",
        ticker, failure.stage, reason, failure.error
    );
    TickerOutcome::Skipped(SkippedTicker {
        ticker: ticker.to_string(),
        stage: failure.stage,
        reason,
        detail: failure.error.to_string(),
    })
}
