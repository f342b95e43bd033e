//! A small linear-regression unit trained with plain SGD.
//!
//! Fits `y = w * x + b` on noisy samples drawn from a fixed line. It gives the
//! CLI a real unit to drive without pulling in a tensor library.

use epochwise_core::{EvalUnit, HookResult, State, TrainUnit, TrainingMode, Unit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

pub type Sample = (f64, f64);
pub type Batch = Vec<Sample>;

const TRUE_WEIGHT: f64 = 2.5;
const TRUE_BIAS: f64 = -1.0;
const NOISE: f64 = 0.1;

/// Draw `samples` points on the reference line with uniform noise, chunked
/// into batches of `batch_size`.
pub fn synthetic_batches(samples: usize, batch_size: usize, seed: u64) -> Vec<Batch> {
    let mut rng = StdRng::seed_from_u64(seed);
    let points: Vec<Sample> = (0..samples)
        .map(|_| {
            let x = rng.gen_range(-1.0..1.0);
            let noise = rng.gen_range(-NOISE..NOISE);
            (x, TRUE_WEIGHT * x + TRUE_BIAS + noise)
        })
        .collect();
    points
        .chunks(batch_size.max(1))
        .map(<[Sample]>::to_vec)
        .collect()
}

/// Parameters of the line, with a train/eval mode flag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinearModel {
    pub weight: f64,
    pub bias: f64,
    #[serde(skip)]
    training: bool,
}

impl LinearModel {
    fn predict(&self, x: f64) -> f64 {
        self.weight * x + self.bias
    }

    /// Mean squared error over `batch`, with gradients for weight and bias.
    fn loss_and_grads(&self, batch: &[Sample]) -> (f64, f64, f64) {
        let n = batch.len().max(1) as f64;
        let (mut loss, mut grad_w, mut grad_b) = (0.0, 0.0, 0.0);
        for &(x, y) in batch {
            let err = self.predict(x) - y;
            loss += err * err;
            grad_w += 2.0 * err * x;
            grad_b += 2.0 * err;
        }
        (loss / n, grad_w / n, grad_b / n)
    }
}

impl TrainingMode for LinearModel {
    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

/// Trains [`LinearModel`] on train batches and reports mean eval loss.
pub struct RegressionUnit {
    pub model: LinearModel,
    learning_rate: f64,
    eval_loss_sum: f64,
    eval_batches: usize,
    last_eval_loss: Option<f64>,
}

impl RegressionUnit {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            model: LinearModel::default(),
            learning_rate,
            eval_loss_sum: 0.0,
            eval_batches: 0,
            last_eval_loss: None,
        }
    }

    /// Mean loss of the most recent evaluation.
    pub fn last_eval_loss(&self) -> Option<f64> {
        self.last_eval_loss
    }
}

impl Unit for RegressionUnit {
    fn name(&self) -> &'static str {
        "regression"
    }

    fn tracked_modules(&mut self) -> Vec<&mut dyn TrainingMode> {
        vec![&mut self.model as &mut dyn TrainingMode]
    }
}

impl TrainUnit for RegressionUnit {
    type Batch = Batch;
    type Output = f64;

    fn train_step(&mut self, _state: &mut State, batch: Batch) -> anyhow::Result<f64> {
        let (loss, grad_w, grad_b) = self.model.loss_and_grads(&batch);
        if self.model.is_training() {
            self.model.weight -= self.learning_rate * grad_w;
            self.model.bias -= self.learning_rate * grad_b;
        }
        if !loss.is_finite() {
            anyhow::bail!("training diverged: loss is {loss}");
        }
        Ok(loss)
    }

    fn on_train_epoch_end(&mut self, state: &mut State) -> HookResult {
        let epoch = state
            .train_state()
            .map(|s| s.progress().num_epochs_completed + 1)
            .unwrap_or_default();
        debug!(epoch, weight = self.model.weight, bias = self.model.bias, "Model parameters");
        Ok(())
    }
}

impl EvalUnit for RegressionUnit {
    type Batch = Batch;
    type Output = f64;

    fn on_eval_start(&mut self, _state: &mut State) -> HookResult {
        self.eval_loss_sum = 0.0;
        self.eval_batches = 0;
        Ok(())
    }

    fn eval_step(&mut self, _state: &mut State, batch: Batch) -> anyhow::Result<f64> {
        let (loss, _, _) = self.model.loss_and_grads(&batch);
        self.eval_loss_sum += loss;
        self.eval_batches += 1;
        Ok(loss)
    }

    fn on_eval_end(&mut self, _state: &mut State) -> HookResult {
        if self.eval_batches > 0 {
            self.last_eval_loss = Some(self.eval_loss_sum / self.eval_batches as f64);
        }
        Ok(())
    }
}
