mod forecast;
mod merged_series;
mod price_point;
mod sentiment;

pub use forecast::{BatchSummary, ModelKind, PredictionRow, SkippedTicker, TickerStage};
pub use merged_series::{MergedRow, MergedSeries};
pub use price_point::{PricePoint, RawPriceRecord};
pub use sentiment::{ArticleSentiment, DailySentiment, SentimentFormat, SentimentPoint};
