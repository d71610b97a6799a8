use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::TrainingConfig;
use crate::models::ModelKind;
use crate::services::forecast_model::{
    check_window, clip_factor, finite_prediction, AdamMoments, AdamParams, Deadline, ModelError,
    SequenceRegressor, TrainingReport, GRADIENT_CLIP_NORM,
};
use crate::services::windower::WindowSet;

/// Linear autoregression over the window, `y = w · x + b`.
///
/// Weights start as a normalised exponential recency profile so the untrained model
/// is an exponentially weighted average leaning on the newest values.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    weights: Array1<f64>,
    bias: Array1<f64>,
}

impl LinearRegressor {
    pub fn new(lookback: usize) -> Self {
        Self {
            weights: recency_profile(lookback),
            bias: Array1::zeros(1),
        }
    }

    fn output(&self, window: ArrayView1<'_, f64>) -> f64 {
        self.weights.dot(&window) + self.bias[0]
    }
}

/// `w_k ∝ exp(-(L - 1 - k) / τ)` with `τ = L / 4`, summing to one.
fn recency_profile(lookback: usize) -> Array1<f64> {
    let tau = (lookback as f64 / 4.0).max(1.0);
    let raw = Array1::from_shape_fn(lookback, |k| (-((lookback - 1 - k) as f64) / tau).exp());
    let total = raw.sum();
    raw / total
}

impl SequenceRegressor for LinearRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn lookback(&self) -> usize {
        self.weights.len()
    }

    fn fit(
        &mut self,
        set: &WindowSet,
        config: &TrainingConfig,
        rng: &mut StdRng,
        deadline: Deadline,
    ) -> Result<TrainingReport, ModelError> {
        let samples = set.len();
        if samples == 0 {
            return Err(ModelError::NoSamples);
        }

        let batch_size = config.batch_size.clamp(1, samples);
        let adam = AdamParams::with_learning_rate(config.learning_rate);
        let mut weight_moments = AdamMoments::like(&self.weights);
        let mut bias_moments = AdamMoments::like(&self.bias);

        let mut order: Vec<usize> = (0..samples).collect();
        let mut loss_history = Vec::with_capacity(config.epochs);
        let mut step = 0;

        for epoch in 0..config.epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                deadline.check(epoch)?;
                let mut grad_w = Array1::<f64>::zeros(self.weights.len());
                let mut grad_b = Array1::<f64>::zeros(1);

                for &idx in batch {
                    let window = set.windows.row(idx);
                    let error = self.output(window) - set.labels[idx];
                    epoch_loss += error * error;

                    let dy = 2.0 * error / batch.len() as f64;
                    grad_w.scaled_add(dy, &window);
                    grad_b[0] += dy;
                }

                let norm_sq = grad_w.dot(&grad_w) + grad_b[0] * grad_b[0];
                let factor = clip_factor(norm_sq, GRADIENT_CLIP_NORM);
                grad_w *= factor;
                grad_b *= factor;

                step += 1;
                let step_size = adam.step_size(step);
                weight_moments.update(&mut self.weights, &grad_w, &adam, step_size);
                bias_moments.update(&mut self.bias, &grad_b, &adam, step_size);
            }

            let mean_loss = epoch_loss / samples as f64;
            if !mean_loss.is_finite() {
                return Err(ModelError::NonFiniteLoss { epoch });
            }
            loss_history.push(mean_loss);
        }

        Ok(TrainingReport {
            epochs: config.epochs,
            samples,
            loss_history,
        })
    }

    fn predict_next(&self, window: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        check_window(self.weights.len(), &window)?;
        finite_prediction(self.output(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::windower::build_windows;
    use rand::SeedableRng;

    #[test]
    fn test_recency_profile_sums_to_one_and_favours_recent() {
        let profile = recency_profile(60);
        assert!((profile.sum() - 1.0).abs() < 1e-12);
        assert!(profile[59] > profile[58]);
        assert!(profile[58] > profile[0]);
    }

    #[test]
    fn test_constant_series_predicts_constant() {
        let set = build_windows(&[0.5; 20], 5).unwrap();
        let config = TrainingConfig {
            epochs: 10,
            batch_size: 4,
            hidden_size: 1,
            learning_rate: 0.01,
            seed: Some(1),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = LinearRegressor::new(5);

        let report = model.fit(&set, &config, &mut rng, Deadline::none()).unwrap();

        assert!(report.loss_history.iter().all(|&loss| loss < 1e-20));
        let prediction = model.predict_next(set.latest_view()).unwrap();
        assert!((prediction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_untrained_model_is_order_sensitive() {
        let model = LinearRegressor::new(4);
        let rising = Array1::from(vec![0.1, 0.2, 0.3, 0.4]);
        let falling = Array1::from(vec![0.4, 0.3, 0.2, 0.1]);

        let up = model.predict_next(rising.view()).unwrap();
        let down = model.predict_next(falling.view()).unwrap();
        assert!(up > down);
    }
}
