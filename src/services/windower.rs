use ndarray::{Array1, Array2, ArrayView1};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("insufficient data: {length} values, lookback {lookback}")]
    InsufficientData { length: usize, lookback: usize },
    #[error("lookback must be at least 1")]
    ZeroLookback,
    #[error("window shape error: {0}")]
    Shape(String),
}

/// Lookback windows and their next-value labels, index aligned.
#[derive(Debug, Clone)]
pub struct WindowSet {
    /// `[n_windows, lookback]`
    pub windows: Array2<f64>,
    /// `labels[k]` is the value immediately after `windows[k]`.
    pub labels: Array1<f64>,
    /// The last `lookback` values of the series, the input for the next-value forecast.
    pub latest: Array1<f64>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn lookback(&self) -> usize {
        self.windows.ncols()
    }

    pub fn latest_view(&self) -> ArrayView1<'_, f64> {
        self.latest.view()
    }
}

/// Slides a `lookback`-long window over `series`.
///
/// Window `k` is `series[k..k + lookback]` and its label is `series[k + lookback]`,
/// giving `series.len() - lookback` pairs. A series no longer than `lookback`
/// cannot produce a single labelled window and is reported as insufficient.
pub fn build_windows(series: &[f64], lookback: usize) -> Result<WindowSet, WindowError> {
    if lookback == 0 {
        return Err(WindowError::ZeroLookback);
    }
    if series.len() <= lookback {
        return Err(WindowError::InsufficientData {
            length: series.len(),
            lookback,
        });
    }

    let count = series.len() - lookback;
    let mut flat = Vec::with_capacity(count * lookback);
    let mut labels = Vec::with_capacity(count);

    for i in lookback..series.len() {
        flat.extend_from_slice(&series[i - lookback..i]);
        labels.push(series[i]);
    }

    let windows = Array2::from_shape_vec((count, lookback), flat)
        .map_err(|e| WindowError::Shape(e.to_string()))?;

    Ok(WindowSet {
        windows,
        labels: Array1::from(labels),
        latest: Array1::from(series[series.len() - lookback..].to_vec()),
    })
}
