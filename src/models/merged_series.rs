use chrono::NaiveDate;
use serde::Serialize;

use super::sentiment::DailySentiment;

/// One trading day after the price/sentiment left join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRow {
    pub date: NaiveDate,
    pub close: f64,
    /// `None` when no sentiment was published for the day.
    pub sentiment: Option<DailySentiment>,
}

/// A ticker's price history, date-sorted ascending, with sentiment attached where available.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedSeries {
    pub ticker: String,
    pub rows: Vec<MergedRow>,
}

impl MergedSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The close column, which is the only feature fed to the windower.
    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.close).collect()
    }

    pub fn sentiment_days(&self) -> usize {
        self.rows.iter().filter(|row| row.sentiment.is_some()).count()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|row| row.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|row| row.date)
    }
}
