//! Tracing setup for the forecast service.
//!
//! Events always go to the console. With the `loki` feature built in and
//! `LOKI_ENABLED` set, they are also shipped to Loki labelled with the service
//! name and environment.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `smartinvest_forecast=debug,warn`.
    pub filter: String,
    pub service_name: String,
    pub environment: String,
    pub show_target: bool,
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            service_name: "smartinvest-forecast".to_string(),
            environment: "development".to_string(),
            show_target: false,
            loki_enabled: false,
            loki_url: None,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("RUST_LOG").unwrap_or(defaults.filter),
            service_name: std::env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            show_target: env_flag("LOG_SHOW_TARGET"),
            loki_enabled: env_flag("LOKI_ENABLED"),
            loki_url: std::env::var("LOKI_URL").ok().filter(|s| !s.trim().is_empty()),
        }
    }

    /// Where log events are shipped, if anywhere.
    pub fn loki_endpoint(&self) -> Result<Option<Url>, AppError> {
        if !self.loki_enabled {
            return Ok(None);
        }
        let raw = self.loki_url.as_deref().ok_or_else(|| {
            AppError::Config("LOKI_ENABLED is set but LOKI_URL is missing".to_string())
        })?;
        Url::parse(raw)
            .map(Some)
            .map_err(|e| AppError::Config(format!("LOKI_URL {:?} is not a valid URL: {}", raw, e)))
    }

    fn env_filter(&self) -> Result<EnvFilter, AppError> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| AppError::Config(format!("invalid RUST_LOG {:?}: {}", self.filter, e)))
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Installs the global subscriber. Must be called from inside the tokio runtime
/// when Loki shipping is enabled.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    let filter = config.env_filter()?;
    let endpoint = config.loki_endpoint()?;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(config.show_target));

    #[cfg(feature = "loki")]
    let subscriber = subscriber.with(loki_layer(config, endpoint.clone())?);

    subscriber
        .try_init()
        .map_err(|e| AppError::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!(
        "📊 Forecast logging ready for {} ({}), filter {:?}",
        config.service_name,
        config.environment,
        config.filter
    );

    match endpoint {
        Some(url) if cfg!(feature = "loki") => tracing::info!("📤 Shipping logs to Loki at {}", url),
        Some(_) => tracing::warn!("LOKI_ENABLED is set but this build has no loki feature"),
        None => {}
    }

    Ok(())
}

#[cfg(feature = "loki")]
fn loki_layer(
    config: &LoggingConfig,
    endpoint: Option<Url>,
) -> Result<Option<tracing_loki::Layer>, AppError> {
    let Some(url) = endpoint else {
        return Ok(None);
    };

    let loki_error = |e: tracing_loki::Error| AppError::Config(format!("Loki setup failed: {}", e));
    let (layer, task) = tracing_loki::builder()
        .label("service", config.service_name.as_str())
        .map_err(loki_error)?
        .label("environment", config.environment.as_str())
        .map_err(loki_error)?
        .build_url(url)
        .map_err(loki_error)?;

    tokio::spawn(task);
    Ok(Some(layer))
}
