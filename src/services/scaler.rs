use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scaled value used for every point of a flat series.
pub const DEGENERATE_SCALED_VALUE: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum ScalerError {
    #[error("cannot fit a range on an empty series")]
    Empty,
    #[error("non-finite value {value} at index {index}")]
    NonFinite { index: usize, value: f64 },
}

/// Min-max range fit once per ticker on its close prices.
///
/// Every transform and inverse for that ticker goes through the same instance.
/// A flat series (`min == max`) scales to [`DEGENERATE_SCALED_VALUE`] and any
/// scaled value inverts back to that single price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledRange {
    min: f64,
    max: f64,
}

impl ScaledRange {
    pub fn fit(values: &[f64]) -> Result<Self, ScalerError> {
        if values.is_empty() {
            return Err(ScalerError::Empty);
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(ScalerError::NonFinite { index, value });
            }
            min = min.min(value);
            max = max.max(value);
        }

        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn is_degenerate(&self) -> bool {
        self.max == self.min
    }

    pub fn transform(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return DEGENERATE_SCALED_VALUE;
        }
        (value - self.min) / (self.max - self.min)
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        if self.is_degenerate() {
            return self.min;
        }
        self.min + scaled * (self.max - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_finds_min_and_max() {
        let range = ScaledRange::fit(&[105.0, 100.0, 169.0, 120.0]).unwrap();
        assert_eq!(range.min(), 100.0);
        assert_eq!(range.max(), 169.0);
        assert!(!range.is_degenerate());
    }

    #[test]
    fn test_transform_maps_to_unit_interval() {
        let range = ScaledRange::fit(&[100.0, 200.0]).unwrap();
        assert_eq!(range.transform(100.0), 0.0);
        assert_eq!(range.transform(200.0), 1.0);
        assert_eq!(range.transform(150.0), 0.5);
    }

    #[test]
    fn test_round_trip_within_range() {
        let values: Vec<f64> = (0..50).map(|i| 37.25 + i as f64 * 1.37).collect();
        let range = ScaledRange::fit(&values).unwrap();

        for &v in &values {
            let restored = range.inverse(range.transform(v));
            assert!((restored - v).abs() < 1e-9, "{} -> {}", v, restored);
        }
    }

    #[test]
    fn test_flat_series_uses_safe_constant() {
        let range = ScaledRange::fit(&[50.0; 65]).unwrap();

        assert!(range.is_degenerate());
        assert_eq!(range.transform(50.0), DEGENERATE_SCALED_VALUE);
        assert_eq!(range.inverse(DEGENERATE_SCALED_VALUE), 50.0);
        assert_eq!(range.inverse(0.93), 50.0);
    }

    #[test]
    fn test_inverse_extrapolates_outside_range() {
        let range = ScaledRange::fit(&[10.0, 20.0]).unwrap();
        assert_eq!(range.inverse(1.5), 25.0);
    }

    #[test]
    fn test_fit_rejects_empty_and_non_finite() {
        assert_eq!(ScaledRange::fit(&[]), Err(ScalerError::Empty));
        assert!(matches!(
            ScaledRange::fit(&[1.0, f64::NAN]),
            Err(ScalerError::NonFinite { index: 1, .. })
        ));
    }
}
