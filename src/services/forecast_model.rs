//! Per-ticker sequence regressors.
//!
//! A model is built fresh for every ticker, trained for a fixed number of epochs on
//! that ticker's windows, asked for one next-value prediction and then dropped.
//! Nothing is shared across tickers.

use std::time::{Duration, Instant};

use ndarray::{Array, ArrayView1, Dimension, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;

use crate::config::TrainingConfig;
use crate::models::ModelKind;
use crate::services::linear_regressor::LinearRegressor;
use crate::services::lstm_regressor::LstmRegressor;
use crate::services::windower::WindowSet;

/// Global-norm bound applied to each mini-batch gradient.
pub const GRADIENT_CLIP_NORM: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("no training samples")]
    NoSamples,
    #[error("window length {actual} does not match lookback {expected}")]
    WindowLength { expected: usize, actual: usize },
    #[error("training loss became non-finite at epoch {epoch}")]
    NonFiniteLoss { epoch: usize },
    #[error("prediction is not finite: {0}")]
    NonFinitePrediction(f64),
    #[error("training deadline passed during epoch {epoch}")]
    DeadlineExceeded { epoch: usize },
}

/// Wall-clock limit on training, checked before every mini-batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(limit: Duration) -> Self {
        Self(Instant::now().checked_add(limit))
    }

    pub fn from_limit(limit: Option<Duration>) -> Self {
        limit.map(Self::after).unwrap_or_default()
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    pub(crate) fn check(&self, epoch: usize) -> Result<(), ModelError> {
        if self.expired() {
            Err(ModelError::DeadlineExceeded { epoch })
        } else {
            Ok(())
        }
    }
}

/// Loss trace of one training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub samples: usize,
    /// Mean squared error per epoch, in scaled units.
    pub loss_history: Vec<f64>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

pub trait SequenceRegressor: Send {
    fn kind(&self) -> ModelKind;

    fn lookback(&self) -> usize;

    fn fit(
        &mut self,
        set: &WindowSet,
        config: &TrainingConfig,
        rng: &mut StdRng,
        deadline: Deadline,
    ) -> Result<TrainingReport, ModelError>;

    /// Scaled next value following `window`.
    fn predict_next(&self, window: ArrayView1<'_, f64>) -> Result<f64, ModelError>;
}

/// A trained regressor together with how its training went.
pub struct TrainedModel {
    model: Box<dyn SequenceRegressor>,
    pub report: TrainingReport,
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    pub fn predict_next(&self, window: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        self.model.predict_next(window)
    }
}

/// Trains a fresh model of `kind` on `set`, giving up once `deadline` passes.
pub fn train_model(
    kind: ModelKind,
    set: &WindowSet,
    config: &TrainingConfig,
    deadline: Deadline,
) -> Result<TrainedModel, ModelError> {
    if set.is_empty() {
        return Err(ModelError::NoSamples);
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut model: Box<dyn SequenceRegressor> = match kind {
        ModelKind::Lstm => Box::new(LstmRegressor::new(set.lookback(), config.hidden_size, &mut rng)),
        ModelKind::Linear => Box::new(LinearRegressor::new(set.lookback())),
    };

    let report = model.fit(set, config, &mut rng, deadline)?;

    Ok(TrainedModel { model, report })
}

pub(crate) fn check_window(expected: usize, window: &ArrayView1<'_, f64>) -> Result<(), ModelError> {
    if window.len() != expected {
        return Err(ModelError::WindowLength {
            expected,
            actual: window.len(),
        });
    }
    Ok(())
}

pub(crate) fn finite_prediction(value: f64) -> Result<f64, ModelError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::NonFinitePrediction(value))
    }
}

/// Adam hyperparameters, Keras defaults apart from the learning rate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AdamParams {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl AdamParams {
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    /// Bias-corrected step size for update number `step` (1-based).
    pub fn step_size(&self, step: i32) -> f64 {
        self.learning_rate * (1.0 - self.beta2.powi(step)).sqrt() / (1.0 - self.beta1.powi(step))
    }
}

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
pub(crate) struct AdamMoments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> AdamMoments<D> {
    pub fn like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    pub fn update(
        &mut self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        params: &AdamParams,
        step_size: f64,
    ) {
        let (b1, b2, eps) = (params.beta1, params.beta2, params.epsilon);
        Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                *p -= step_size * *m / (v.sqrt() + eps);
            });
    }
}

/// Rescales `norm_sq` worth of gradient to at most `max_norm`; returns the factor to apply.
pub(crate) fn clip_factor(norm_sq: f64, max_norm: f64) -> f64 {
    let norm = norm_sq.sqrt();
    if norm.is_finite() && norm > max_norm {
        max_norm / norm
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::windower::build_windows;
    use ndarray::Array1;

    fn config(seed: u64) -> TrainingConfig {
        TrainingConfig {
            epochs: 5,
            batch_size: 4,
            hidden_size: 6,
            learning_rate: 0.01,
            seed: Some(seed),
        }
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn test_same_seed_same_prediction() {
        let set = build_windows(&ramp(30), 10).unwrap();

        let first = train_model(ModelKind::Lstm, &set, &config(11), Deadline::none()).unwrap();
        let second = train_model(ModelKind::Lstm, &set, &config(11), Deadline::none()).unwrap();

        let a = first.predict_next(set.latest_view()).unwrap();
        let b = second.predict_next(set.latest_view()).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.report.loss_history, second.report.loss_history);
    }

    #[test]
    fn test_report_has_one_loss_per_epoch() {
        let set = build_windows(&ramp(30), 10).unwrap();
        for kind in [ModelKind::Lstm, ModelKind::Linear] {
            let trained = train_model(kind, &set, &config(3), Deadline::none()).unwrap();
            assert_eq!(trained.kind(), kind);
            assert_eq!(trained.report.loss_history.len(), 5);
            assert_eq!(trained.report.samples, 20);
            assert!(trained.report.final_loss().unwrap().is_finite());
        }
    }

    #[test]
    fn test_wrong_window_length_rejected() {
        let set = build_windows(&ramp(30), 10).unwrap();
        let trained = train_model(ModelKind::Linear, &set, &config(1), Deadline::none()).unwrap();
        let short = Array1::from(vec![0.5; 4]);

        assert_eq!(
            trained.predict_next(short.view()).unwrap_err(),
            ModelError::WindowLength { expected: 10, actual: 4 }
        );
    }

    #[test]
    fn test_adam_step_moves_against_gradient() {
        let mut param = Array1::from(vec![1.0, -1.0]);
        let grad = Array1::from(vec![0.5, -0.5]);
        let params = AdamParams::with_learning_rate(0.1);
        let mut moments = AdamMoments::like(&param);

        moments.update(&mut param, &grad, &params, params.step_size(1));

        assert!(param[0] < 1.0);
        assert!(param[1] > -1.0);
        // First bias-corrected Adam step is roughly the learning rate.
        assert!((1.0 - param[0] - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_expired_deadline_stops_training() {
        let set = build_windows(&ramp(30), 10).unwrap();
        let passed = Deadline::after(Duration::ZERO);

        for kind in [ModelKind::Lstm, ModelKind::Linear] {
            let err = train_model(kind, &set, &config(2), passed).err().unwrap();
            assert_eq!(err, ModelError::DeadlineExceeded { epoch: 0 });
        }
    }

    #[test]
    fn test_deadline_without_limit_never_expires() {
        assert!(!Deadline::none().expired());
        assert!(!Deadline::from_limit(None).expired());
        assert!(!Deadline::from_limit(Some(Duration::from_secs(3600))).expired());
    }

    #[test]
    fn test_clip_factor() {
        assert_eq!(clip_factor(0.25, 1.0), 1.0);
        assert!((clip_factor(16.0, 1.0) - 0.25).abs() < 1e-12);
        assert_eq!(clip_factor(f64::NAN, 1.0), 1.0);
    }
}
