use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// One usable close price for a ticker on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close_price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close_price: f64) -> Self {
        Self { date, close_price }
    }
}

// A row as it came out of the raw history file. Close may be missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPriceRecord {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

impl RawPriceRecord {
    pub fn into_price_point(self) -> Option<PricePoint> {
        self.close.map(|close| PricePoint::new(self.date, close))
    }
}
