use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::{ArticleSentiment, DailySentiment, SentimentPoint};

/// Aggregates scored articles into one point per (ticker, UTC publication date).
///
/// The result is ordered by date, then ticker.
pub fn aggregate_daily(articles: &[ArticleSentiment]) -> Vec<SentimentPoint> {
    let mut groups: BTreeMap<(NaiveDate, String), (f64, u32)> = BTreeMap::new();

    for article in articles {
        let key = (article.published_at.date_naive(), article.ticker.clone());
        let entry = groups.entry(key).or_insert((0.0, 0));
        entry.0 += article.sentiment_score;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((date, ticker), (sum, count))| SentimentPoint {
            ticker,
            date,
            avg_sentiment: sum / count as f64,
            article_count: count,
        })
        .collect()
}

/// Read-only lookup of daily sentiment by ticker and date, shared by every ticker task.
#[derive(Debug, Clone, Default)]
pub struct SentimentTable {
    by_ticker: HashMap<String, BTreeMap<NaiveDate, DailySentiment>>,
}

impl SentimentTable {
    /// Builds the table, collapsing repeated (ticker, date) points so the price join
    /// never fans out. Averages are weighted by article count, counts are summed.
    pub fn from_points(points: Vec<SentimentPoint>) -> Self {
        let mut merged: HashMap<String, BTreeMap<NaiveDate, (f64, f64, u32)>> = HashMap::new();

        for point in points {
            let weight = point.article_count.max(1) as f64;
            let slot = merged
                .entry(point.ticker)
                .or_default()
                .entry(point.date)
                .or_insert((0.0, 0.0, 0));
            slot.0 += point.avg_sentiment * weight;
            slot.1 += weight;
            slot.2 = slot.2.saturating_add(point.article_count);
        }

        let by_ticker = merged
            .into_iter()
            .map(|(ticker, days)| {
                let days = days
                    .into_iter()
                    .map(|(date, (weighted, weight, count))| {
                        (
                            date,
                            DailySentiment {
                                avg_sentiment: weighted / weight,
                                article_count: count,
                            },
                        )
                    })
                    .collect();
                (ticker, days)
            })
            .collect();

        Self { by_ticker }
    }

    pub fn get(&self, ticker: &str, date: NaiveDate) -> Option<DailySentiment> {
        self.by_ticker
            .get(ticker)
            .and_then(|days| days.get(&date))
            .copied()
    }

    pub fn ticker_count(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn days_for(&self, ticker: &str) -> usize {
        self.by_ticker.get(ticker).map(|days| days.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn article(ticker: &str, day: u32, hour: u32, score: f64) -> ArticleSentiment {
        ArticleSentiment {
            ticker: ticker.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
            sentiment_score: score,
        }
    }

    #[test]
    fn test_aggregate_daily_groups_by_ticker_and_date() {
        let articles = vec![
            article("ABC", 2, 9, 0.2),
            article("ABC", 2, 15, 0.6),
            article("XYZ", 2, 10, -1.0),
            article("ABC", 3, 8, 0.1),
        ];

        let points = aggregate_daily(&articles);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].ticker, "ABC");
        assert_eq!(points[0].date, date(2));
        assert!((points[0].avg_sentiment - 0.4).abs() < 1e-12);
        assert_eq!(points[0].article_count, 2);
        assert_eq!(points[1].ticker, "XYZ");
        assert_eq!(points[2].date, date(3));
    }

    #[test]
    fn test_table_collapses_duplicate_days() {
        let table = SentimentTable::from_points(vec![
            SentimentPoint {
                ticker: "ABC".to_string(),
                date: date(2),
                avg_sentiment: 1.0,
                article_count: 3,
            },
            SentimentPoint {
                ticker: "ABC".to_string(),
                date: date(2),
                avg_sentiment: -1.0,
                article_count: 1,
            },
        ]);

        let day = table.get("ABC", date(2)).unwrap();
        assert!((day.avg_sentiment - 0.5).abs() < 1e-12);
        assert_eq!(day.article_count, 4);
        assert_eq!(table.days_for("ABC"), 1);
    }

    #[test]
    fn test_unknown_ticker_has_no_sentiment() {
        let table = SentimentTable::default();
        assert!(table.is_empty());
        assert_eq!(table.get("ABC", date(2)), None);
        assert_eq!(table.days_for("ABC"), 0);
    }
}
