use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{ReaderBuilder, WriterBuilder};
use thiserror::Error;
use tracing::info;

use crate::models::PredictionRow;

pub const TICKER_COLUMN: &str = "Ticker";
pub const PREDICTED_CLOSE_COLUMN: &str = "Predicted_Close";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Table of predictions read by the downstream recommender.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Replaces the whole table with `rows`, in the given order.
    async fn replace_all(&self, rows: &[PredictionRow]) -> Result<(), StoreError>;

    async fn load_all(&self) -> Result<Vec<PredictionRow>, StoreError>;
}

/// `Ticker,Predicted_Close` CSV file, rewritten through a temp file and rename.
pub struct CsvPredictionStore {
    path: PathBuf,
}

impl CsvPredictionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path, err: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

pub fn encode_rows(rows: &[PredictionRow]) -> Result<Vec<u8>, StoreError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());

    // Header written explicitly so an empty run still produces a valid table.
    writer.write_record([TICKER_COLUMN, PREDICTED_CLOSE_COLUMN])?;
    for row in rows {
        let close = row.predicted_close.to_string();
        writer.write_record([row.ticker.as_str(), close.as_str()])?;
    }

    writer
        .into_inner()
        .map_err(|e| StoreError::Csv(e.into_error().into()))
}

pub fn decode_rows(content: &[u8]) -> Result<Vec<PredictionRow>, StoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let rows = reader
        .deserialize::<PredictionRow>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[async_trait]
impl PredictionStore for CsvPredictionStore {
    async fn replace_all(&self, rows: &[PredictionRow]) -> Result<(), StoreError> {
        let encoded = encode_rows(rows)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &encoded)
            .await
            .map_err(|e| Self::io_error(&temp, e))?;

        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(Self::io_error(&self.path, e));
        }

        info!("💾 Wrote {} predictions to {}", rows.len(), self.path.display());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PredictionRow>, StoreError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Self::io_error(&self.path, e))?;
        decode_rows(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("prediction-store-{}", uuid::Uuid::new_v4()))
    }

    fn row(ticker: &str, close: f64) -> PredictionRow {
        PredictionRow {
            ticker: ticker.to_string(),
            predicted_close: close,
        }
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let encoded = String::from_utf8(encode_rows(&[]).unwrap()).unwrap();
        assert_eq!(encoded, "Ticker,Predicted_Close\n");
    }

    #[test]
    fn test_rows_keep_insertion_order() {
        let encoded = encode_rows(&[row("ZZZ", 1.5), row("AAA", 2.25)]).unwrap();
        let decoded = decode_rows(&encoded).unwrap();
        assert_eq!(decoded, vec![row("ZZZ", 1.5), row("AAA", 2.25)]);
    }

    #[tokio::test]
    async fn test_replace_all_overwrites_previous_table() {
        let dir = scratch_dir();
        let store = CsvPredictionStore::new(dir.join("nested").join("predictions.csv"));

        store.replace_all(&[row("ABC", 10.0), row("XYZ", 20.0)]).await.unwrap();
        store.replace_all(&[row("QQQ", 30.0)]).await.unwrap();

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows, vec![row("QQQ", 30.0)]);
        assert!(!store.temp_path().exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_unwritable_location_fails() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let store = CsvPredictionStore::new(blocker.join("predictions.csv"));
        let err = store.replace_all(&[row("ABC", 1.0)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));

        let _ = std::fs::remove_dir_all(dir);
    }
}
