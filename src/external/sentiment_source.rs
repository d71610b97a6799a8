use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::ReaderBuilder;
use thiserror::Error;
use tracing::warn;

use crate::external::csv_fields::{find_column, parse_date, parse_timestamp};
use crate::models::{ArticleSentiment, SentimentFormat, SentimentPoint};
use crate::services::sentiment_service;

#[derive(Debug, Error)]
pub enum SentimentSourceError {
    #[error("sentiment file not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("malformed sentiment table: {0}")]
    Malformed(String),
}

/// Supplies the daily sentiment aggregate for every ticker.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn load_daily(&self) -> Result<Vec<SentimentPoint>, SentimentSourceError>;
}

/// Used when no sentiment feed is configured.
pub struct NoSentiment;

#[async_trait]
impl SentimentSource for NoSentiment {
    async fn load_daily(&self) -> Result<Vec<SentimentPoint>, SentimentSourceError> {
        Ok(Vec::new())
    }
}

pub struct CsvSentimentSource {
    path: PathBuf,
    format: SentimentFormat,
}

impl CsvSentimentSource {
    pub fn new(path: impl Into<PathBuf>, format: SentimentFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

#[async_trait]
impl SentimentSource for CsvSentimentSource {
    async fn load_daily(&self) -> Result<Vec<SentimentPoint>, SentimentSourceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SentimentSourceError::NotFound(self.path.display().to_string()));
            }
            Err(e) => {
                return Err(SentimentSourceError::Io(format!("{}: {}", self.path.display(), e)));
            }
        };

        let (points, skipped) = match self.format {
            SentimentFormat::Aggregate => parse_daily_aggregate(&content),
            SentimentFormat::Articles => parse_articles(&content)
                .map(|(articles, skipped)| (sentiment_service::aggregate_daily(&articles), skipped)),
        }
        .map_err(|e| SentimentSourceError::Malformed(format!("{}: {:#}", self.path.display(), e)))?;

        if skipped > 0 {
            warn!(
                "Skipped {} unusable rows in sentiment file {}",
                skipped,
                self.path.display()
            );
        }

        Ok(points)
    }
}

/// Parses `ticker,date,avg_sentiment,article_count` rows.
pub fn parse_daily_aggregate(content: &str) -> Result<(Vec<SentimentPoint>, usize)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().context("Failed to read header row")?.clone();
    let ticker_idx = find_column(&headers, "ticker").context("Missing ticker column")?;
    let date_idx = find_column(&headers, "date").context("Missing date column")?;
    let avg_idx = find_column(&headers, "avg_sentiment").context("Missing avg_sentiment column")?;
    let count_idx = find_column(&headers, "article_count").context("Missing article_count column")?;

    let mut points = Vec::new();
    let mut skipped = 0;

    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Line {}: invalid CSV row", line_num + 2))?;

        let ticker = record.get(ticker_idx).map(str::trim).unwrap_or_default();
        let date = record.get(date_idx).and_then(parse_date);
        let avg = record
            .get(avg_idx)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        let count = record.get(count_idx).and_then(|v| v.trim().parse::<u32>().ok());

        match (ticker.is_empty(), date, avg, count) {
            (false, Some(date), Some(avg_sentiment), Some(article_count)) => {
                points.push(SentimentPoint {
                    ticker: ticker.to_string(),
                    date,
                    avg_sentiment,
                    article_count,
                });
            }
            _ => skipped += 1,
        }
    }

    Ok((points, skipped))
}

/// Parses `ticker,published_at,sentiment_score` rows.
pub fn parse_articles(content: &str) -> Result<(Vec<ArticleSentiment>, usize)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().context("Failed to read header row")?.clone();
    let ticker_idx = find_column(&headers, "ticker").context("Missing ticker column")?;
    let published_idx = find_column(&headers, "published_at").context("Missing published_at column")?;
    let score_idx = find_column(&headers, "sentiment_score").context("Missing sentiment_score column")?;

    let mut articles = Vec::new();
    let mut skipped = 0;

    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Line {}: invalid CSV row", line_num + 2))?;

        let ticker = record.get(ticker_idx).map(str::trim).unwrap_or_default();
        let published_at = record.get(published_idx).and_then(parse_timestamp);
        let score = record
            .get(score_idx)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());

        match (ticker.is_empty(), published_at, score) {
            (false, Some(published_at), Some(sentiment_score)) => articles.push(ArticleSentiment {
                ticker: ticker.to_string(),
                published_at,
                sentiment_score,
            }),
            _ => skipped += 1,
        }
    }

    Ok((articles, skipped))
}
