use std::sync::Arc;

use smartinvest_forecast::config::{ForecastConfig, RunMode};
use smartinvest_forecast::errors::AppError;
use smartinvest_forecast::external::csv_price_source::CsvDirectorySource;
use smartinvest_forecast::external::sentiment_source::{
    CsvSentimentSource, NoSentiment, SentimentSource,
};
use smartinvest_forecast::jobs::batch_forecast_job;
use smartinvest_forecast::logging::{init_logging, LoggingConfig};
use smartinvest_forecast::services::job_scheduler_service::{
    execute_job_with_tracking, JobContext, JobSchedulerService,
};
use smartinvest_forecast::services::prediction_store::CsvPredictionStore;
use smartinvest_forecast::state::RunHistory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(&LoggingConfig::from_env())?;

    let config = ForecastConfig::from_env();
    config.validate().map_err(AppError::Config)?;

    let context = build_context(config)?;

    match RunMode::from_env() {
        RunMode::Once => {
            let job = Arc::new(batch_forecast_job::run_batch_forecast);
            if execute_job_with_tracking("batch_forecast", context, job).await.is_none() {
                return Err(AppError::External("batch forecast run failed".to_string()).into());
            }
        }
        RunMode::Scheduled { schedule } => {
            let mut scheduler = JobSchedulerService::new(context).await?;
            scheduler.start(&schedule).await?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("Received shutdown signal");
            scheduler.stop().await?;
        }
    }

    Ok(())
}

fn build_context(config: ForecastConfig) -> Result<JobContext, AppError> {
    let price_source = CsvDirectorySource::new(&config.price_data_dir)?;
    tracing::info!("📂 Reading price histories from {}", config.price_data_dir.display());

    let sentiment_source: Arc<dyn SentimentSource> = match &config.sentiment_path {
        Some(path) => {
            tracing::info!("📰 Reading {:?} sentiment from {}", config.sentiment_format, path.display());
            Arc::new(CsvSentimentSource::new(path, config.sentiment_format))
        }
        None => {
            tracing::info!("📰 No sentiment feed configured");
            Arc::new(NoSentiment)
        }
    };

    let prediction_store = CsvPredictionStore::new(&config.output_path);

    Ok(JobContext {
        config: Arc::new(config),
        price_source: Arc::new(price_source),
        sentiment_source,
        prediction_store: Arc::new(prediction_store),
        run_history: Arc::new(RunHistory::default()),
    })
}
