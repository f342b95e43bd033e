//! The unit contract: what a caller implements to be driven by the loops.
//!
//! A unit opts in to a phase by implementing [`TrainUnit`] and/or
//! [`EvalUnit`]. Every hook has a no-op default, so a unit only writes the
//! step function plus whatever hooks it cares about. Hooks receive the run
//! [`State`] and may call [`State::stop`] to end the run cooperatively.

use crate::error::{HookResult, LoopError};
use crate::state::State;
use std::any::Any;

/// A stateful component with a train/eval mode switch (dropout, batch norm, ...).
pub trait TrainingMode {
    fn is_training(&self) -> bool;
    fn set_training(&mut self, training: bool);
}

/// How the driver feeds a step function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepMode {
    /// The driver pulls one batch and passes it to the step function.
    #[default]
    Batch,
    /// The step function receives the epoch iterator and pulls what it needs.
    Iterator,
}

/// Capabilities shared by every unit regardless of phase.
pub trait Unit {
    /// Name used in timer keys and log fields. Defaults to the type name.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Components whose mode the driver switches for the phase and restores afterwards.
    fn tracked_modules(&mut self) -> Vec<&mut dyn TrainingMode> {
        Vec::new()
    }

    /// Called when a step or hook fails, before the error is returned to the caller.
    fn on_exception(&mut self, _state: &mut State, _error: &LoopError) {}
}

/// The train surface of a unit.
pub trait TrainUnit: Unit {
    type Batch;
    type Output: Any;

    /// Decided when the unit is constructed; read once per epoch.
    fn train_step_mode(&self) -> StepMode {
        StepMode::Batch
    }

    fn on_train_start(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_train_epoch_start(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_train_step_start(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn train_step(&mut self, state: &mut State, batch: Self::Batch) -> anyhow::Result<Self::Output>;

    /// Step on the raw epoch iterator. Used when [`TrainUnit::train_step_mode`]
    /// is [`StepMode::Iterator`]; `Ok(None)` signals the data is exhausted.
    fn train_step_from_iter(
        &mut self,
        state: &mut State,
        data: &mut dyn Iterator<Item = Self::Batch>,
    ) -> anyhow::Result<Option<Self::Output>> {
        match data.next() {
            Some(batch) => self.train_step(state, batch).map(Some),
            None => Ok(None),
        }
    }

    fn on_train_step_end(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_train_epoch_end(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_train_end(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }
}

/// The evaluate surface of a unit.
pub trait EvalUnit: Unit {
    type Batch;
    type Output: Any;

    fn eval_step_mode(&self) -> StepMode {
        StepMode::Batch
    }

    fn on_eval_start(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_eval_epoch_start(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_eval_step_start(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn eval_step(&mut self, state: &mut State, batch: Self::Batch) -> anyhow::Result<Self::Output>;

    /// Iterator counterpart of [`EvalUnit::eval_step`]; see [`TrainUnit::train_step_from_iter`].
    fn eval_step_from_iter(
        &mut self,
        state: &mut State,
        data: &mut dyn Iterator<Item = Self::Batch>,
    ) -> anyhow::Result<Option<Self::Output>> {
        match data.next() {
            Some(batch) => self.eval_step(state, batch).map(Some),
            None => Ok(None),
        }
    }

    fn on_eval_step_end(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_eval_epoch_end(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }

    fn on_eval_end(&mut self, _state: &mut State) -> HookResult {
        Ok(())
    }
}

/// Strip the module path and generic arguments from a type name.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Switch every tracked component to `training`, run `body`, then restore the
/// modes the components had before, whether `body` succeeded or not.
pub fn with_training_mode<U, T>(unit: &mut U, training: bool, body: impl FnOnce(&mut U) -> T) -> T
where
    U: Unit + ?Sized,
{
    let prior: Vec<bool> = unit
        .tracked_modules()
        .into_iter()
        .map(|module| {
            let was_training = module.is_training();
            module.set_training(training);
            was_training
        })
        .collect();

    let out = body(unit);

    let mut modules = unit.tracked_modules();
    if modules.len() != prior.len() {
        tracing::warn!(
            before = prior.len(),
            after = modules.len(),
            "Tracked module count changed during the loop; restoring the common prefix"
        );
    }
    for (module, was_training) in modules.iter_mut().zip(prior) {
        module.set_training(was_training);
    }
    out
}
