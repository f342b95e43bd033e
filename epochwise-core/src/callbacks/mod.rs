//! Callback system: observers invoked with the same named hooks as the unit.
//!
//! Callbacks run in registration order, strictly after the unit's own hook, so
//! they observe the unit's updated state. A callback only overrides the hooks
//! it needs; the rest are no-ops.

mod early_stopping;
mod progress_logger;

pub use early_stopping::EarlyStopping;
pub use progress_logger::ProgressLogger;

use crate::error::{HookResult, LoopError};
use crate::state::{Phase, State};
use crate::unit::{Unit, short_type_name};
use std::time::Instant;

/// Whether a monitored value should go down or up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Min,
    Max,
}

/// Lifecycle points at which the runtime calls units and callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    TrainStart,
    TrainEpochStart,
    TrainStepStart,
    TrainStepEnd,
    TrainEpochEnd,
    TrainEnd,
    EvalStart,
    EvalEpochStart,
    EvalStepStart,
    EvalStepEnd,
    EvalEpochEnd,
    EvalEnd,
}

impl Hook {
    /// Method name of the hook, used in timer keys.
    pub fn name(&self) -> &'static str {
        match self {
            Hook::TrainStart => "on_train_start",
            Hook::TrainEpochStart => "on_train_epoch_start",
            Hook::TrainStepStart => "on_train_step_start",
            Hook::TrainStepEnd => "on_train_step_end",
            Hook::TrainEpochEnd => "on_train_epoch_end",
            Hook::TrainEnd => "on_train_end",
            Hook::EvalStart => "on_eval_start",
            Hook::EvalEpochStart => "on_eval_epoch_start",
            Hook::EvalStepStart => "on_eval_step_start",
            Hook::EvalStepEnd => "on_eval_step_end",
            Hook::EvalEpochEnd => "on_eval_epoch_end",
            Hook::EvalEnd => "on_eval_end",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Hook::TrainStart
            | Hook::TrainEpochStart
            | Hook::TrainStepStart
            | Hook::TrainStepEnd
            | Hook::TrainEpochEnd
            | Hook::TrainEnd => Phase::Train,
            _ => Phase::Eval,
        }
    }

    pub fn start(phase: Phase) -> Self {
        match phase {
            Phase::Train => Hook::TrainStart,
            Phase::Eval => Hook::EvalStart,
        }
    }

    pub fn epoch_start(phase: Phase) -> Self {
        match phase {
            Phase::Train => Hook::TrainEpochStart,
            Phase::Eval => Hook::EvalEpochStart,
        }
    }

    pub fn step_start(phase: Phase) -> Self {
        match phase {
            Phase::Train => Hook::TrainStepStart,
            Phase::Eval => Hook::EvalStepStart,
        }
    }

    pub fn step_end(phase: Phase) -> Self {
        match phase {
            Phase::Train => Hook::TrainStepEnd,
            Phase::Eval => Hook::EvalStepEnd,
        }
    }

    pub fn epoch_end(phase: Phase) -> Self {
        match phase {
            Phase::Train => Hook::TrainEpochEnd,
            Phase::Eval => Hook::EvalEpochEnd,
        }
    }

    pub fn end(phase: Phase) -> Self {
        match phase {
            Phase::Train => Hook::TrainEnd,
            Phase::Eval => Hook::EvalEnd,
        }
    }
}

/// An observer of the loop lifecycle.
pub trait Callback {
    /// Name used in timer keys. Defaults to the type name.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn on_train_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_train_epoch_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_train_step_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_train_step_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_train_epoch_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_train_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_eval_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_eval_epoch_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_eval_step_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_eval_step_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_eval_epoch_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    fn on_eval_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        Ok(())
    }

    /// Called after the unit's own `on_exception`, before the error reaches the caller.
    fn on_exception(&mut self, _state: &mut State, _unit: &dyn Unit, _error: &LoopError) {}
}

fn call(callback: &mut dyn Callback, hook: Hook, state: &mut State, unit: &dyn Unit) -> HookResult {
    match hook {
        Hook::TrainStart => callback.on_train_start(state, unit),
        Hook::TrainEpochStart => callback.on_train_epoch_start(state, unit),
        Hook::TrainStepStart => callback.on_train_step_start(state, unit),
        Hook::TrainStepEnd => callback.on_train_step_end(state, unit),
        Hook::TrainEpochEnd => callback.on_train_epoch_end(state, unit),
        Hook::TrainEnd => callback.on_train_end(state, unit),
        Hook::EvalStart => callback.on_eval_start(state, unit),
        Hook::EvalEpochStart => callback.on_eval_epoch_start(state, unit),
        Hook::EvalStepStart => callback.on_eval_step_start(state, unit),
        Hook::EvalStepEnd => callback.on_eval_step_end(state, unit),
        Hook::EvalEpochEnd => callback.on_eval_epoch_end(state, unit),
        Hook::EvalEnd => callback.on_eval_end(state, unit),
    }
}

/// Invoke `hook` on every callback in registration order.
///
/// Each call is timed under `callback.<name>.<hook>`. The first failing
/// callback aborts the dispatch and its error is returned.
pub(crate) fn dispatch(
    callbacks: &mut [Box<dyn Callback>],
    hook: Hook,
    state: &mut State,
    unit: &dyn Unit,
) -> Result<(), LoopError> {
    for callback in callbacks.iter_mut() {
        let key = format!("callback.{}.{}", callback.name(), hook.name());
        let started = Instant::now();
        let result = call(callback.as_mut(), hook, state, unit);
        state.timer_mut().record(&key, started.elapsed());
        result?;
    }
    Ok(())
}

/// Notify every callback of a failure. Never fails itself.
pub(crate) fn dispatch_exception(
    callbacks: &mut [Box<dyn Callback>],
    state: &mut State,
    unit: &dyn Unit,
    error: &LoopError,
) {
    for callback in callbacks.iter_mut() {
        callback.on_exception(state, unit, error);
    }
}
