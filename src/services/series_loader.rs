use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::errors::TickerError;
use crate::external::price_source::PriceSource;
use crate::models::{MergedRow, MergedSeries, RawPriceRecord};
use crate::services::sentiment_service::SentimentTable;

/// Loads one ticker's history from the source and left-joins its daily sentiment.
pub async fn load_merged_series(
    source: &dyn PriceSource,
    ticker: &str,
    sentiment: &SentimentTable,
) -> Result<MergedSeries, TickerError> {
    let records = source.fetch_history(ticker).await?;
    merge_history(ticker, records, sentiment)
}

/// Sorts raw rows by date, drops rows without a close, and attaches sentiment by date.
///
/// Repeated dates keep the last row in source order. Days without sentiment carry
/// `None`, never a zero score.
pub fn merge_history(
    ticker: &str,
    records: Vec<RawPriceRecord>,
    sentiment: &SentimentTable,
) -> Result<MergedSeries, TickerError> {
    let raw_rows = records.len();
    let mut missing_close = 0;
    let mut duplicate_dates = 0;
    let mut closes: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for record in records {
        match record.into_price_point() {
            Some(point) => {
                if closes.insert(point.date, point.close_price).is_some() {
                    duplicate_dates += 1;
                }
            }
            None => missing_close += 1,
        }
    }

    if duplicate_dates > 0 {
        warn!("{}: {} duplicate dates, kept the last row for each", ticker, duplicate_dates);
    }

    if closes.is_empty() {
        return Err(TickerError::DataUnavailable(format!(
            "{} of {} rows had no close price",
            missing_close, raw_rows
        )));
    }

    let rows: Vec<MergedRow> = closes
        .into_iter()
        .map(|(date, close)| MergedRow {
            date,
            close,
            sentiment: sentiment.get(ticker, date),
        })
        .collect();

    let series = MergedSeries {
        ticker: ticker.to_string(),
        rows,
    };

    debug!(
        "{}: {} rows merged ({} without close dropped), sentiment on {} days",
        ticker,
        series.len(),
        missing_close,
        series.sentiment_days()
    );

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SkipReason;
    use crate::models::SentimentPoint;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn raw(d: u32, close: Option<f64>) -> RawPriceRecord {
        RawPriceRecord { date: date(d), close }
    }

    #[test]
    fn test_sorts_and_drops_missing_closes() {
        let records = vec![raw(5, Some(12.0)), raw(3, None), raw(1, Some(10.0)), raw(2, Some(11.0))];
        let series = merge_history("ABC", records, &SentimentTable::default()).unwrap();

        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
        assert_eq!(series.first_date(), Some(date(1)));
        assert_eq!(series.last_date(), Some(date(5)));
    }

    #[test]
    fn test_duplicate_dates_keep_last() {
        let records = vec![raw(1, Some(10.0)), raw(1, Some(10.5)), raw(2, Some(11.0))];
        let series = merge_history("ABC", records, &SentimentTable::default()).unwrap();

        assert_eq!(series.closes(), vec![10.5, 11.0]);
    }

    #[test]
    fn test_left_join_leaves_missing_sentiment_absent() {
        let table = SentimentTable::from_points(vec![
            SentimentPoint {
                ticker: "ABC".to_string(),
                date: date(2),
                avg_sentiment: 0.3,
                article_count: 2,
            },
            SentimentPoint {
                ticker: "XYZ".to_string(),
                date: date(1),
                avg_sentiment: -0.9,
                article_count: 5,
            },
        ]);
        let records = vec![raw(1, Some(10.0)), raw(2, Some(11.0)), raw(3, Some(12.0))];
        let series = merge_history("ABC", records, &table).unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.rows[0].sentiment, None);
        assert_eq!(series.rows[1].sentiment.map(|s| s.article_count), Some(2));
        assert_eq!(series.rows[2].sentiment, None);
        assert_eq!(series.sentiment_days(), 1);
    }

    #[test]
    fn test_all_closes_missing_is_data_unavailable() {
        let records = vec![raw(1, None), raw(2, None)];
        let err = merge_history("ABC", records, &SentimentTable::default()).unwrap_err();
        assert_eq!(err.reason(), SkipReason::DataUnavailable);
    }
}
