//! Batch Forecast Job
//!
//! One run produces a fresh next-close prediction for every ticker the price
//! source knows about and replaces the prediction table with them.
//!
//! # Processing Strategy
//!
//! 1. Discover tickers (a failure here aborts the run)
//! 2. Load the daily sentiment table (a failure here only drops the join)
//! 3. Forecast tickers with bounded concurrency; a ticker that fails is skipped
//! 4. Replace the prediction table with the successful rows, in discovery order
//! 5. Log the run summary, optionally write it as JSON, and keep it in run history

use crate::errors::AppError;
use crate::models::{BatchSummary, PredictionRow, SkippedTicker};
use crate::services::forecasting_service::{forecast_ticker, TickerOutcome};
use crate::services::job_scheduler_service::{JobContext, JobResult};
use crate::services::sentiment_service::SentimentTable;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Main entry point for the batch forecast job.
pub async fn run_batch_forecast(ctx: JobContext) -> Result<JobResult, AppError> {
    run_batch_forecast_with_summary(&ctx)
        .await
        .map(|summary| JobResult {
            items_processed: summary.predictions_written,
            items_failed: summary.skipped.len(),
        })
}

/// Same as [`run_batch_forecast`] but hands back the full summary.
pub async fn run_batch_forecast_with_summary(ctx: &JobContext) -> Result<BatchSummary, AppError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let config = ctx.config.clone();

    info!(
        "🔮 Starting batch forecast {} ({}, lookback {}, {} epochs)",
        run_id,
        config.model.description(),
        config.lookback,
        config.training.epochs
    );

    let previous = ctx.run_history.latest();
    if let Some(previous) = &previous {
        info!(
            "Previous run {} wrote {} predictions at {}",
            previous.run_id, previous.predictions_written, previous.finished_at
        );
    }

    let tickers = ctx.price_source.discover_tickers().await.map_err(|e| {
        error!("❌ Ticker discovery failed: {}", e);
        AppError::Source(e)
    })?;

    if tickers.is_empty() {
        warn!("No tickers found, writing an empty prediction table");
    } else {
        info!("Found {} tickers to process", tickers.len());
    }

    let sentiment = Arc::new(load_sentiment(ctx).await);

    let outcomes: Vec<TickerOutcome> = stream::iter(tickers.iter().cloned())
        .map(|ticker| {
            let source = ctx.price_source.clone();
            let sentiment = sentiment.clone();
            let config = config.clone();
            async move { forecast_ticker(source.as_ref(), &ticker, &sentiment, config).await }
        })
        .buffered(config.max_concurrency.max(1))
        .collect()
        .await;

    let (rows, skipped) = partition_outcomes(outcomes);

    ctx.prediction_store.replace_all(&rows).await.map_err(|e| {
        error!("❌ Failed to write prediction table: {}", e);
        AppError::Store(e)
    })?;

    let summary = BatchSummary {
        run_id,
        model: config.model,
        started_at,
        finished_at: Utc::now(),
        tickers_discovered: tickers.len(),
        predictions_written: rows.len(),
        skipped,
    };

    log_summary(&summary);
    if let Some(delta) = prediction_delta(previous.as_ref(), &summary) {
        if delta != 0 {
            warn!("Prediction table changed size by {:+} rows since the previous run", delta);
        }
    }

    if let Some(path) = &config.summary_path {
        if let Err(e) = write_summary(path, &summary).await {
            warn!("Failed to write run summary to {}: {}", path.display(), e);
        }
    }

    ctx.run_history.record(summary.clone());
    Ok(summary)
}

async fn load_sentiment(ctx: &JobContext) -> SentimentTable {
    match ctx.sentiment_source.load_daily().await {
        Ok(points) => {
            let table = SentimentTable::from_points(points);
            if !table.is_empty() {
                info!("📰 Loaded sentiment for {} tickers", table.ticker_count());
            }
            table
        }
        Err(e) => {
            warn!("Sentiment unavailable, continuing without it: {}", e);
            SentimentTable::default()
        }
    }
}

/// Splits outcomes into table rows and skip records, both in discovery order.
fn partition_outcomes(outcomes: Vec<TickerOutcome>) -> (Vec<PredictionRow>, Vec<SkippedTicker>) {
    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for outcome in outcomes {
        match outcome {
            TickerOutcome::Predicted(forecast) => rows.push(forecast.row),
            TickerOutcome::Skipped(skip) => skipped.push(skip),
        }
    }

    (rows, skipped)
}

fn log_summary(summary: &BatchSummary) {
    info!(
        "Batch forecast {} completed: {} predicted, {} skipped of {} tickers in {}ms",
        summary.run_id,
        summary.predictions_written,
        summary.skipped.len(),
        summary.tickers_discovered,
        summary.duration_ms()
    );

    for (reason, count) in summary.skipped_by_reason() {
        info!("   {} skipped: {}", count, reason.description());
    }
}

/// Change in written rows relative to the previous run, if there was one.
fn prediction_delta(previous: Option<&BatchSummary>, current: &BatchSummary) -> Option<i64> {
    previous.map(|p| current.predictions_written as i64 - p.predictions_written as i64)
}

async fn write_summary(path: &Path, summary: &BatchSummary) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SkipReason;
    use crate::models::{ModelKind, TickerStage};

    fn skip(ticker: &str) -> TickerOutcome {
        TickerOutcome::Skipped(SkippedTicker {
            ticker: ticker.to_string(),
            stage: TickerStage::Loaded,
            reason: SkipReason::InsufficientHistory,
            detail: "short".to_string(),
        })
    }

    #[test]
    fn test_partition_keeps_order_of_each_side() {
        let (rows, skipped) = partition_outcomes(vec![skip("B"), skip("A")]);
        assert!(rows.is_empty());
        let names: Vec<_> = skipped.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    fn summary(written: usize) -> BatchSummary {
        let now = Utc::now();
        BatchSummary {
            run_id: Uuid::new_v4(),
            model: ModelKind::Linear,
            started_at: now,
            finished_at: now,
            tickers_discovered: 3,
            predictions_written: written,
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_prediction_delta_against_previous_run() {
        assert_eq!(prediction_delta(None, &summary(2)), None);
        assert_eq!(prediction_delta(Some(&summary(3)), &summary(2)), Some(-1));
        assert_eq!(prediction_delta(Some(&summary(2)), &summary(2)), Some(0));
    }
}
