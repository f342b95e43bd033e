//! Early stopping on an evaluation metric.

use super::{Callback, Mode};
use crate::error::HookResult;
use crate::state::{PhaseState, State};
use crate::unit::Unit;
use tracing::info;

/// Reads the monitored value from the eval step output inside `on_eval_step_end`.
pub type MetricFn = fn(&PhaseState) -> Option<f64>;

fn float_step_output(phase: &PhaseState) -> Option<f64> {
    phase
        .step_output::<f64>()
        .copied()
        .or_else(|| phase.step_output::<f32>().map(|v| f64::from(*v)))
}

/// Requests a stop once the mean eval metric has not improved for `patience`
/// consecutive evaluations.
///
/// By default the metric is the eval step output itself when it is an `f64`
/// or `f32` (a loss, typically).
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    mode: Mode,
    metric: MetricFn,
    sum: f64,
    count: usize,
    best: Option<f64>,
    evals_without_improvement: usize,
    stopped: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            mode: Mode::Min,
            metric: float_step_output,
            sum: 0.0,
            count: 0,
            best: None,
            evals_without_improvement: 0,
            stopped: false,
        }
    }

    pub fn min_delta(mut self, delta: f64) -> Self {
        self.min_delta = delta;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn metric(mut self, metric: MetricFn) -> Self {
        self.metric = metric;
        self
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    fn is_improvement(&self, current: f64, best: f64) -> bool {
        match self.mode {
            Mode::Min => current < best - self.min_delta,
            Mode::Max => current > best + self.min_delta,
        }
    }
}

impl Callback for EarlyStopping {
    fn on_eval_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.sum = 0.0;
        self.count = 0;
        Ok(())
    }

    fn on_eval_step_end(&mut self, state: &mut State, _unit: &dyn Unit) -> HookResult {
        if let Some(value) = state.eval_state().and_then(self.metric) {
            self.sum += value;
            self.count += 1;
        }
        Ok(())
    }

    fn on_eval_end(&mut self, state: &mut State, _unit: &dyn Unit) -> HookResult {
        if self.count == 0 {
            return Ok(());
        }
        let current = self.sum / self.count as f64;

        match self.best {
            Some(best) if !self.is_improvement(current, best) => {
                self.evals_without_improvement += 1;
                if self.evals_without_improvement >= self.patience {
                    info!(
                        best,
                        current,
                        patience = self.patience,
                        "Early stopping: metric stopped improving"
                    );
                    self.stopped = true;
                    state.stop();
                }
            }
            _ => {
                self.best = Some(current);
                self.evals_without_improvement = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Unit for Noop {}

    fn run_eval(cb: &mut EarlyStopping, state: &mut State, losses: &[f64]) {
        cb.on_eval_start(state, &Noop).unwrap();
        for &loss in losses {
            state.eval_state_mut().unwrap().set_step_output(Box::new(loss));
            cb.on_eval_step_end(state, &Noop).unwrap();
            state.eval_state_mut().unwrap().clear_step_output();
        }
        cb.on_eval_end(state, &Noop).unwrap();
    }

    #[test]
    fn test_stops_after_patience() {
        let mut cb = EarlyStopping::new(2).min_delta(0.01);
        let mut state = State::for_evaluate(PhaseState::new());

        run_eval(&mut cb, &mut state, &[0.5, 0.7]); // best = 0.6
        run_eval(&mut cb, &mut state, &[0.4, 0.4]); // improves: best = 0.4
        assert!(!state.should_stop());
        run_eval(&mut cb, &mut state, &[0.4, 0.4]); // 1 without improvement
        assert!(!state.should_stop());
        run_eval(&mut cb, &mut state, &[0.395]); // within min_delta: 2
        assert!(state.should_stop());
        assert!(cb.stopped());
        assert_eq!(cb.best(), Some(0.4));
    }

    #[test]
    fn test_max_mode() {
        let mut cb = EarlyStopping::new(1).mode(Mode::Max);
        let mut state = State::for_evaluate(PhaseState::new());
        run_eval(&mut cb, &mut state, &[0.8]);
        run_eval(&mut cb, &mut state, &[0.9]);
        assert!(!state.should_stop());
        run_eval(&mut cb, &mut state, &[0.85]);
        assert!(state.should_stop());
    }

    #[test]
    fn test_ignores_non_float_outputs() {
        let mut cb = EarlyStopping::new(1);
        let mut state = State::for_evaluate(PhaseState::new());
        cb.on_eval_start(&mut state, &Noop).unwrap();
        state
            .eval_state_mut()
            .unwrap()
            .set_step_output(Box::new("not a number"));
        cb.on_eval_step_end(&mut state, &Noop).unwrap();
        cb.on_eval_end(&mut state, &Noop).unwrap();
        assert_eq!(cb.best(), None);
    }
}
