use async_trait::async_trait;
use thiserror::Error;

use crate::models::RawPriceRecord;

#[derive(Debug, Error)]
pub enum PriceSourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("malformed history: {0}")]
    Malformed(String),

    #[error("empty history: {0}")]
    Empty(String),
}

/// Where raw per-ticker price histories come from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Tickers with history available, in processing order, without duplicates.
    async fn discover_tickers(&self) -> Result<Vec<String>, PriceSourceError>;

    /// Raw (date, close) rows for one ticker, in whatever order the source holds them.
    async fn fetch_history(&self, ticker: &str) -> Result<Vec<RawPriceRecord>, PriceSourceError>;
}
