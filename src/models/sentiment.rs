use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily sentiment aggregate for one ticker, as produced by the news analytics job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPoint {
    pub ticker: String,
    pub date: NaiveDate,
    pub avg_sentiment: f64,
    pub article_count: u32,
}

/// A single scored news article, before daily aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSentiment {
    pub ticker: String,
    pub published_at: DateTime<Utc>,
    pub sentiment_score: f64,
}

/// Sentiment fields carried on a merged row once the ticker is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySentiment {
    pub avg_sentiment: f64,
    pub article_count: u32,
}

impl From<&SentimentPoint> for DailySentiment {
    fn from(point: &SentimentPoint) -> Self {
        Self {
            avg_sentiment: point.avg_sentiment,
            article_count: point.article_count,
        }
    }
}

/// Layout of the sentiment input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentFormat {
    /// ticker, date, avg_sentiment, article_count
    Aggregate,
    /// ticker, published_at, sentiment_score
    Articles,
}

impl FromStr for SentimentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggregate" | "daily" => Ok(SentimentFormat::Aggregate),
            "articles" | "article" => Ok(SentimentFormat::Articles),
            other => Err(format!("Unknown sentiment format: {}", other)),
        }
    }
}
