//! Periodic progress logging through `tracing`.

use super::Callback;
use crate::error::HookResult;
use crate::state::{Phase, State};
use crate::unit::Unit;
use tracing::info;

/// Logs train progress every `every_n_steps` steps and at every epoch end.
pub struct ProgressLogger {
    every_n_steps: usize,
    lines: usize,
}

impl ProgressLogger {
    pub fn new(every_n_steps: usize) -> Self {
        Self {
            every_n_steps,
            lines: 0,
        }
    }

    /// Number of progress lines emitted so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    fn log_epoch(&mut self, state: &State, unit: &dyn Unit, phase: Phase) {
        let Some(phase_state) = state.phase_state(phase) else {
            return;
        };
        let progress = phase_state.progress();
        info!(
            phase = %phase,
            unit = unit.name(),
            epoch = progress.num_epochs_completed + 1,
            steps_in_epoch = progress.num_steps_completed_in_epoch,
            total_steps = progress.num_steps_completed,
            "Epoch finished"
        );
        self.lines += 1;
    }
}

impl Default for ProgressLogger {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Callback for ProgressLogger {
    fn on_train_step_end(&mut self, state: &mut State, unit: &dyn Unit) -> HookResult {
        if self.every_n_steps == 0 {
            return Ok(());
        }
        let Some(train) = state.train_state() else {
            return Ok(());
        };
        // The step being finished is not counted yet.
        let step = train.progress().num_steps_completed + 1;
        if step % self.every_n_steps == 0 {
            info!(
                unit = unit.name(),
                epoch = train.progress().num_epochs_completed + 1,
                step,
                "Train step"
            );
            self.lines += 1;
        }
        Ok(())
    }

    fn on_train_epoch_end(&mut self, state: &mut State, unit: &dyn Unit) -> HookResult {
        self.log_epoch(state, unit, Phase::Train);
        Ok(())
    }

    fn on_eval_epoch_end(&mut self, state: &mut State, unit: &dyn Unit) -> HookResult {
        self.log_epoch(state, unit, Phase::Eval);
        Ok(())
    }
}
