use crate::config::ForecastConfig;
use crate::errors::AppError;
use crate::external::price_source::PriceSource;
use crate::external::sentiment_source::SentimentSource;
use crate::jobs::batch_forecast_job;
use crate::services::prediction_store::PredictionStore;
use crate::state::RunHistory;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<ForecastConfig>,
    pub price_source: Arc<dyn PriceSource>,
    pub sentiment_source: Arc<dyn SentimentSource>,
    pub prediction_store: Arc<dyn PredictionStore>,
    pub run_history: Arc<RunHistory>,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Registers the batch forecast on `schedule` (sec min hour day month weekday) and starts ticking.
    pub async fn start(&mut self, schedule: &str) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");

        self.schedule_job(
            schedule,
            "batch_forecast",
            "Per-ticker next-close forecast",
            batch_forecast_job::run_batch_forecast,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started successfully");
        Ok(())
    }

    /// Stop the scheduler gracefully
    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);
        let running = Arc::new(Mutex::new(()));

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            let running = running.clone();
            Box::pin(async move {
                // A tick that lands while the previous run is still going is dropped.
                let Ok(_guard) = running.try_lock() else {
                    warn!("⏭️  Skipping {}: previous run still in progress", job_name);
                    return;
                };
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

/// Runs a job once, logging its outcome and duration.
pub async fn execute_job_with_tracking<F, Fut>(
    job_name: &str,
    context: JobContext,
    job_fn: Arc<F>,
) -> Option<JobResult>
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    let result = job_fn(context).await;

    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );
            Some(job_result)
        }
        Err(e) => {
            error!("❌ Job failed: {} - {} (duration: {}ms)", job_name, e, duration_ms);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: usize,
    pub items_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::price_source::PriceSourceError;
    use crate::external::sentiment_source::NoSentiment;
    use crate::models::RawPriceRecord;
    use crate::services::prediction_store::CsvPredictionStore;
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl PriceSource for EmptySource {
        async fn discover_tickers(&self) -> Result<Vec<String>, PriceSourceError> {
            Ok(Vec::new())
        }

        async fn fetch_history(&self, ticker: &str) -> Result<Vec<RawPriceRecord>, PriceSourceError> {
            Err(PriceSourceError::NotFound(ticker.to_string()))
        }
    }

    fn context() -> JobContext {
        let output = std::env::temp_dir()
            .join(format!("scheduler-{}", uuid::Uuid::new_v4()))
            .join("predictions.csv");
        JobContext {
            config: Arc::new(ForecastConfig::default()),
            price_source: Arc::new(EmptySource),
            sentiment_source: Arc::new(NoSentiment),
            prediction_store: Arc::new(CsvPredictionStore::new(output)),
            run_history: Arc::new(RunHistory::default()),
        }
    }

    #[tokio::test]
    async fn test_tracking_returns_result_on_success() {
        let job = Arc::new(|_ctx: JobContext| async {
            Ok::<_, AppError>(JobResult {
                items_processed: 3,
                items_failed: 1,
            })
        });

        let result = execute_job_with_tracking("test_job", context(), job).await;
        assert_eq!(
            result,
            Some(JobResult {
                items_processed: 3,
                items_failed: 1
            })
        );
    }

    #[tokio::test]
    async fn test_tracking_swallows_failure() {
        let job = Arc::new(|_ctx: JobContext| async {
            Err::<JobResult, _>(AppError::External("boom".to_string()))
        });

        assert!(execute_job_with_tracking("failing_job", context(), job).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_cron_expression_is_rejected() {
        let mut service = JobSchedulerService::new(context()).await.unwrap();
        let err = service.start("not a schedule").await.unwrap_err();
        assert!(matches!(err, AppError::Scheduler(_)));
    }
}
