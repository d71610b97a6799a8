use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::TrainingConfig;
use crate::models::ModelKind;
use crate::services::forecast_model::{
    check_window, clip_factor, finite_prediction, AdamMoments, AdamParams, Deadline, ModelError,
    SequenceRegressor, TrainingReport, GRADIENT_CLIP_NORM,
};
use crate::services::windower::WindowSet;

/// Single-layer LSTM reading one scaled close per step.
///
/// Gates are packed `[input, forget, candidate, output]` along the first axis of the
/// weights. The head is `w_out · h_T + b_out` added to the last value of the window,
/// so an untrained network starts out close to a persistence forecast.
#[derive(Debug, Clone)]
pub struct LstmRegressor {
    lookback: usize,
    hidden: usize,
    w_x: Array1<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
    w_out: Array1<f64>,
    b_out: Array1<f64>,
}

#[derive(Debug, Clone)]
struct StepCache {
    x: f64,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
    h: Array1<f64>,
}

#[derive(Debug, Clone)]
struct LstmGradients {
    w_x: Array1<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
    w_out: Array1<f64>,
    b_out: Array1<f64>,
}

impl LstmGradients {
    fn zeros(hidden: usize) -> Self {
        Self {
            w_x: Array1::zeros(4 * hidden),
            w_h: Array2::zeros((4 * hidden, hidden)),
            b: Array1::zeros(4 * hidden),
            w_out: Array1::zeros(hidden),
            b_out: Array1::zeros(1),
        }
    }

    fn norm_sq(&self) -> f64 {
        let sq = |v: f64| v * v;
        self.w_x.iter().copied().map(sq).sum::<f64>()
            + self.w_h.iter().copied().map(sq).sum::<f64>()
            + self.b.iter().copied().map(sq).sum::<f64>()
            + self.w_out.iter().copied().map(sq).sum::<f64>()
            + self.b_out.iter().copied().map(sq).sum::<f64>()
    }

    fn scale(&mut self, factor: f64) {
        self.w_x *= factor;
        self.w_h *= factor;
        self.b *= factor;
        self.w_out *= factor;
        self.b_out *= factor;
    }
}

struct LstmMoments {
    w_x: AdamMoments<ndarray::Ix1>,
    w_h: AdamMoments<ndarray::Ix2>,
    b: AdamMoments<ndarray::Ix1>,
    w_out: AdamMoments<ndarray::Ix1>,
    b_out: AdamMoments<ndarray::Ix1>,
}

impl LstmRegressor {
    pub fn new(lookback: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let out_limit = 1.0 / hidden as f64;

        let w_x = Array1::from_shape_fn(4 * hidden, |_| rng.random_range(-limit..limit));
        let w_h = Array2::from_shape_fn((4 * hidden, hidden), |_| rng.random_range(-limit..limit));
        let w_out = Array1::from_shape_fn(hidden, |_| rng.random_range(-out_limit..out_limit));

        let mut b = Array1::zeros(4 * hidden);
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            lookback,
            hidden,
            w_x,
            w_h,
            b,
            w_out,
            b_out: Array1::zeros(1),
        }
    }

    fn forward(&self, window: ArrayView1<'_, f64>, mut cache: Option<&mut Vec<StepCache>>) -> f64 {
        let hid = self.hidden;
        let mut h = Array1::<f64>::zeros(hid);
        let mut c = Array1::<f64>::zeros(hid);

        for &x in window.iter() {
            let z = &self.w_x * x + self.w_h.dot(&h) + &self.b;

            let i = z.slice(s![0..hid]).mapv(sigmoid);
            let f = z.slice(s![hid..2 * hid]).mapv(sigmoid);
            let g = z.slice(s![2 * hid..3 * hid]).mapv(f64::tanh);
            let o = z.slice(s![3 * hid..4 * hid]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            if let Some(steps) = cache.as_deref_mut() {
                steps.push(StepCache {
                    x,
                    h_prev: h.clone(),
                    c_prev: c.clone(),
                    i,
                    f,
                    g,
                    o,
                    tanh_c,
                    h: h_next.clone(),
                });
            }

            h = h_next;
            c = c_next;
        }

        let last = window.iter().next_back().copied().unwrap_or(0.0);
        self.w_out.dot(&h) + self.b_out[0] + last
    }

    /// Backpropagation through time for one sample with output gradient `dy`.
    fn backward(&self, steps: &[StepCache], dy: f64, grads: &mut LstmGradients) {
        let hid = self.hidden;
        let Some(last) = steps.last() else {
            return;
        };

        grads.w_out.scaled_add(dy, &last.h);
        grads.b_out[0] += dy;

        let seq_len = steps.len();
        let mut dzs = Array2::<f64>::zeros((seq_len, 4 * hid));
        let mut h_prevs = Array2::<f64>::zeros((seq_len, hid));
        let mut xs = Array1::<f64>::zeros(seq_len);

        let mut dh = &self.w_out * dy;
        let mut dc = Array1::<f64>::zeros(hid);

        for (t, step) in steps.iter().enumerate().rev() {
            let d_o = &dh * &step.tanh_c;
            dc = dc + &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v);

            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;

            let mut dz = dzs.row_mut(t);
            dz.slice_mut(s![0..hid]).assign(&(d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![hid..2 * hid]).assign(&(d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * hid..3 * hid]).assign(&(d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * hid..4 * hid]).assign(&(d_o * &step.o.mapv(|v| v * (1.0 - v))));

            h_prevs.row_mut(t).assign(&step.h_prev);
            xs[t] = step.x;

            dh = self.w_h.t().dot(&dzs.row(t));
            dc = dc * &step.f;
        }

        grads.w_h += &dzs.t().dot(&h_prevs);
        grads.w_x += &dzs.t().dot(&xs);
        grads.b += &dzs.sum_axis(Axis(0));
    }

    fn apply(&mut self, grads: &LstmGradients, moments: &mut LstmMoments, adam: &AdamParams, step: i32) {
        let step_size = adam.step_size(step);
        moments.w_x.update(&mut self.w_x, &grads.w_x, adam, step_size);
        moments.w_h.update(&mut self.w_h, &grads.w_h, adam, step_size);
        moments.b.update(&mut self.b, &grads.b, adam, step_size);
        moments.w_out.update(&mut self.w_out, &grads.w_out, adam, step_size);
        moments.b_out.update(&mut self.b_out, &grads.b_out, adam, step_size);
    }
}

impl SequenceRegressor for LstmRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::Lstm
    }

    fn lookback(&self) -> usize {
        self.lookback
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
        let mut moments = LstmMoments {
            w_x: AdamMoments::like(&self.w_x),
            w_h: AdamMoments::like(&self.w_h),
            b: AdamMoments::like(&self.b),
            w_out: AdamMoments::like(&self.w_out),
            b_out: AdamMoments::like(&self.b_out),
        };

        let mut order: Vec<usize> = (0..samples).collect();
        let mut loss_history = Vec::with_capacity(config.epochs);
        let mut step = 0;
        let mut steps = Vec::with_capacity(self.lookback);

        for epoch in 0..config.epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                deadline.check(epoch)?;
                let mut grads = LstmGradients::zeros(self.hidden);

                for &idx in batch {
                    steps.clear();
                    let prediction = self.forward(set.windows.row(idx), Some(&mut steps));
                    let error = prediction - set.labels[idx];
                    epoch_loss += error * error;
                    self.backward(&steps, 2.0 * error / batch.len() as f64, &mut grads);
                }

                grads.scale(clip_factor(grads.norm_sq(), GRADIENT_CLIP_NORM));
                step += 1;
                self.apply(&grads, &mut moments, &adam, step);
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
        check_window(self.lookback, &window)?;
        finite_prediction(self.forward(window, None))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
