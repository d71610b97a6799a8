use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::ReaderBuilder;
use regex::Regex;
use tracing::{debug, warn};

use crate::external::csv_fields::{find_column, parse_date, parse_price};
use crate::external::price_source::{PriceSource, PriceSourceError};
use crate::models::RawPriceRecord;

const HISTORY_FILE_PATTERN: &str = r"^([^_]+)_(?:.*_)?Historical_Data\.csv$";

/// Reads `<TICKER>_Historical_Data.csv` files from a local directory.
pub struct CsvDirectorySource {
    dir: PathBuf,
    pattern: Regex,
}

/// Result of parsing one history file.
#[derive(Debug, Default)]
pub struct ParsedHistory {
    pub records: Vec<RawPriceRecord>,
    pub unparseable_rows: usize,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PriceSourceError> {
        let pattern = Regex::new(HISTORY_FILE_PATTERN)
            .map_err(|e| PriceSourceError::Malformed(format!("bad file pattern: {}", e)))?;
        Ok(Self {
            dir: dir.into(),
            pattern,
        })
    }

    fn ticker_for(&self, file_name: &str) -> Option<String> {
        self.pattern
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// One history file per ticker, in file name order.
    ///
    /// When several files map to the same ticker the first by name wins, for both
    /// discovery and fetching.
    async fn history_files(&self) -> Result<Vec<(String, PathBuf)>, PriceSourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            PriceSourceError::Io(format!("cannot read {}: {}", self.dir.display(), e))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PriceSourceError::Io(e.to_string()))?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }

        // Directory iteration order is platform dependent.
        names.sort();

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for file_name in names {
            let Some(ticker) = self.ticker_for(&file_name) else {
                continue;
            };
            if seen.insert(ticker.clone()) {
                files.push((ticker, self.dir.join(file_name)));
            } else {
                warn!("Ignoring {} - ticker {} already has a history file", file_name, ticker);
            }
        }

        Ok(files)
    }

    async fn resolve_path(&self, ticker: &str) -> Result<PathBuf, PriceSourceError> {
        self.history_files()
            .await?
            .into_iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, path)| path)
            .ok_or_else(|| PriceSourceError::NotFound(format!("no history file for {}", ticker)))
    }
}

#[async_trait]
impl PriceSource for CsvDirectorySource {
    async fn discover_tickers(&self) -> Result<Vec<String>, PriceSourceError> {
        let tickers: Vec<String> = self
            .history_files()
            .await?
            .into_iter()
            .map(|(ticker, _)| ticker)
            .collect();

        debug!("Discovered {} tickers in {}", tickers.len(), self.dir.display());
        Ok(tickers)
    }

    async fn fetch_history(&self, ticker: &str) -> Result<Vec<RawPriceRecord>, PriceSourceError> {
        let path = self.resolve_path(ticker).await?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PriceSourceError::Io(format!("{}: {}", path.display(), e)))?;

        let parsed = parse_price_history(&content)
            .map_err(|e| PriceSourceError::Malformed(format!("{}: {:#}", path.display(), e)))?;

        if parsed.unparseable_rows > 0 {
            warn!(
                "{}: dropped {} rows with unparseable dates",
                ticker, parsed.unparseable_rows
            );
        }

        if parsed.records.is_empty() {
            return Err(PriceSourceError::Empty(format!(
                "{} has no dated rows",
                path.display()
            )));
        }

        Ok(parsed.records)
    }
}

/// Parses a daily history export. Only the `Date` and `Close` columns are used.
pub fn parse_price_history(content: &str) -> Result<ParsedHistory> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().context("Failed to read header row")?.clone();
    let date_idx = find_column(&headers, "date").context("Missing Date column")?;
    let close_idx = find_column(&headers, "close").context("Missing Close column")?;

    let mut parsed = ParsedHistory::default();

    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Line {}: invalid CSV row", line_num + 2))?;

        let Some(date) = record.get(date_idx).and_then(parse_date) else {
            parsed.unparseable_rows += 1;
            continue;
        };

        parsed.records.push(RawPriceRecord {
            date,
            close: record.get(close_idx).and_then(parse_price),
        });
    }

    Ok(parsed)
}
