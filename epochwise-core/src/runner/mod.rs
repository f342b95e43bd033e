//! Loop drivers and entry points.
//!
//! Train and evaluate share one epoch skeleton ([`run_epoch`]); the phase
//! specific parts (which unit methods to call) come from a [`PhaseOps`]
//! implementation. `fit` reuses the train driver and plugs evaluation into it
//! through [`Interleave`].

mod evaluate;
mod fit;
mod train;

pub use evaluate::{evaluate, run_evaluate};
pub use fit::{fit, run_fit};
pub use train::{run_train, train};

use crate::callbacks::{self, Callback, Hook};
use crate::data::DataSource;
use crate::error::{HookResult, Result};
use crate::state::{Phase, State};
use crate::unit::{EvalUnit, StepMode, TrainUnit, Unit};
use std::any::Any;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Phase specific access to a unit's hooks and step function.
pub(crate) trait PhaseOps<U> {
    const PHASE: Phase;
    type Batch;
    type Output: Any;

    fn step_mode(unit: &U) -> StepMode;
    fn hook(unit: &mut U, hook: Hook, state: &mut State) -> HookResult;
    fn step(unit: &mut U, state: &mut State, batch: Self::Batch) -> anyhow::Result<Self::Output>;
    fn step_from_iter(
        unit: &mut U,
        state: &mut State,
        data: &mut dyn Iterator<Item = Self::Batch>,
    ) -> anyhow::Result<Option<Self::Output>>;
}

pub(crate) struct TrainOps;

impl<U: TrainUnit> PhaseOps<U> for TrainOps {
    const PHASE: Phase = Phase::Train;
    type Batch = U::Batch;
    type Output = U::Output;

    fn step_mode(unit: &U) -> StepMode {
        unit.train_step_mode()
    }

    fn hook(unit: &mut U, hook: Hook, state: &mut State) -> HookResult {
        match hook {
            Hook::TrainStart => unit.on_train_start(state),
            Hook::TrainEpochStart => unit.on_train_epoch_start(state),
            Hook::TrainStepStart => unit.on_train_step_start(state),
            Hook::TrainStepEnd => unit.on_train_step_end(state),
            Hook::TrainEpochEnd => unit.on_train_epoch_end(state),
            Hook::TrainEnd => unit.on_train_end(state),
            other => unreachable!("{} is not a train hook", other.name()),
        }
    }

    fn step(unit: &mut U, state: &mut State, batch: U::Batch) -> anyhow::Result<U::Output> {
        unit.train_step(state, batch)
    }

    fn step_from_iter(
        unit: &mut U,
        state: &mut State,
        data: &mut dyn Iterator<Item = U::Batch>,
    ) -> anyhow::Result<Option<U::Output>> {
        unit.train_step_from_iter(state, data)
    }
}

pub(crate) struct EvalOps;

impl<U: EvalUnit> PhaseOps<U> for EvalOps {
    const PHASE: Phase = Phase::Eval;
    type Batch = U::Batch;
    type Output = U::Output;

    fn step_mode(unit: &U) -> StepMode {
        unit.eval_step_mode()
    }

    fn hook(unit: &mut U, hook: Hook, state: &mut State) -> HookResult {
        match hook {
            Hook::EvalStart => unit.on_eval_start(state),
            Hook::EvalEpochStart => unit.on_eval_epoch_start(state),
            Hook::EvalStepStart => unit.on_eval_step_start(state),
            Hook::EvalStepEnd => unit.on_eval_step_end(state),
            Hook::EvalEpochEnd => unit.on_eval_epoch_end(state),
            Hook::EvalEnd => unit.on_eval_end(state),
            other => unreachable!("{} is not an eval hook", other.name()),
        }
    }

    fn step(unit: &mut U, state: &mut State, batch: U::Batch) -> anyhow::Result<U::Output> {
        unit.eval_step(state, batch)
    }

    fn step_from_iter(
        unit: &mut U,
        state: &mut State,
        data: &mut dyn Iterator<Item = U::Batch>,
    ) -> anyhow::Result<Option<U::Output>> {
        unit.eval_step_from_iter(state, data)
    }
}

/// Extra work the train driver performs at step and epoch boundaries.
pub(crate) trait Interleave<U> {
    fn after_train_step(
        &mut self,
        _state: &mut State,
        _unit: &mut U,
        _callbacks: &mut [Box<dyn Callback>],
    ) -> Result<()> {
        Ok(())
    }

    fn after_train_epoch(
        &mut self,
        _state: &mut State,
        _unit: &mut U,
        _callbacks: &mut [Box<dyn Callback>],
    ) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct NoInterleave;

impl<U> Interleave<U> for NoInterleave {}

/// Run `f`, recording its duration under `key`.
fn timed<T>(state: &mut State, key: &str, f: impl FnOnce(&mut State) -> T) -> T {
    let started = Instant::now();
    let out = f(state);
    state.timer_mut().record(key, started.elapsed());
    out
}

/// Invoke `hook` on the unit, then on every callback.
pub(crate) fn fire<U, P>(
    state: &mut State,
    unit: &mut U,
    callbacks: &mut [Box<dyn Callback>],
    hook: Hook,
) -> Result<()>
where
    U: Unit,
    P: PhaseOps<U>,
{
    let key = format!("{}.{}.{}", P::PHASE, unit.name(), hook.name());
    timed(state, &key, |state| P::hook(unit, hook, state))?;
    callbacks::dispatch(callbacks, hook, state, &*unit)
}

/// Run one epoch of phase `P` over `data`.
///
/// Epoch-start hooks are skipped when the phase is resuming mid-epoch. The
/// step loop ends on a stop request, a step cap, or data exhaustion, and the
/// epoch-end hooks fire in every one of those cases. `after_step` runs after
/// each completed step, before the stop flag and caps are checked again.
pub(crate) fn run_epoch<U, P, D, F>(
    state: &mut State,
    unit: &mut U,
    callbacks: &mut [Box<dyn Callback>],
    data: &D,
    mut after_step: F,
) -> Result<()>
where
    U: Unit,
    P: PhaseOps<U>,
    D: DataSource<Batch = P::Batch> + ?Sized,
    F: FnMut(&mut State, &mut U, &mut [Box<dyn Callback>]) -> Result<()>,
{
    let phase = P::PHASE;
    let steps_before = state.require(phase)?.progress().num_steps_completed_in_epoch;
    if steps_before == 0 {
        fire::<U, P>(state, unit, callbacks, Hook::epoch_start(phase))?;
    }

    let step_mode = P::step_mode(unit);
    let data_key = format!("{phase}.data_iter_next");
    let step_key = format!("{phase}.{}.{phase}_step", unit.name());
    let mut data_iter = data.iter();

    while !(state.should_stop() || state.require(phase)?.is_epoch_done()) {
        let output = match step_mode {
            StepMode::Batch => {
                let Some(batch) = timed(state, &data_key, |_| data_iter.next()) else {
                    break;
                };
                fire::<U, P>(state, unit, callbacks, Hook::step_start(phase))?;
                timed(state, &step_key, |state| P::step(unit, state, batch))?
            }
            StepMode::Iterator => {
                fire::<U, P>(state, unit, callbacks, Hook::step_start(phase))?;
                let output = timed(state, &step_key, |state| {
                    P::step_from_iter(unit, state, &mut data_iter)
                })?;
                match output {
                    Some(output) => output,
                    None => break,
                }
            }
        };

        state.require_mut(phase)?.set_step_output(Box::new(output));
        let step_end = fire::<U, P>(state, unit, callbacks, Hook::step_end(phase));
        let phase_state = state.require_mut(phase)?;
        phase_state.clear_step_output();
        step_end?;
        phase_state.progress_mut().increment_step();

        after_step(state, unit, callbacks)?;
    }

    let steps_after = state.require(phase)?.progress().num_steps_completed_in_epoch;
    if steps_after == steps_before {
        warn!(phase = %phase, unit = unit.name(), "No steps completed during {phase} epoch!");
    }

    fire::<U, P>(state, unit, callbacks, Hook::epoch_end(phase))?;
    state.require_mut(phase)?.progress_mut().increment_epoch();
    Ok(())
}

/// Log the outcome of an entry point and run the exception hooks on failure.
///
/// The unit's `on_exception` runs first, then each callback's, and the
/// original error is handed back unchanged.
pub(crate) fn finish<U: Unit>(
    state: &mut State,
    unit: &mut U,
    callbacks: &mut [Box<dyn Callback>],
    label: &str,
    result: Result<()>,
) -> Result<()> {
    match result {
        Ok(()) => {
            info!(entry_point = %state.entry_point(), "Finished {label}");
            debug!("Timer summary:\n{}", state.timer().summary());
            Ok(())
        }
        Err(err) => {
            info!(entry_point = %state.entry_point(), error = %err, "{label} failed");
            unit.on_exception(state, &err);
            callbacks::dispatch_exception(callbacks, state, &*unit, &err);
            Err(err)
        }
    }
}

/// Warn when a phase has no epoch or step cap.
pub(crate) fn warn_if_unbounded(phase: Phase, max_epochs: Option<usize>, max_steps: Option<usize>) {
    if max_epochs.is_none() && max_steps.is_none() {
        warn!(
            phase = %phase,
            "Neither max_epochs nor max_steps is set; the loop only ends on stop()"
        );
    }
}

