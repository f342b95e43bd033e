//! The `evaluate` entry point and eval loop driver.

use super::{EvalOps, finish, fire, run_epoch};
use crate::callbacks::{Callback, Hook};
use crate::config::EvaluateOptions;
use crate::data::DataSource;
use crate::error::Result;
use crate::state::{Phase, State};
use crate::unit::{EvalUnit, with_training_mode};
use tracing::info;

/// Run one evaluation epoch of `unit` over `data` and return the final [`State`].
pub fn evaluate<U, D>(
    unit: &mut U,
    data: &D,
    callbacks: &mut [Box<dyn Callback>],
    options: &EvaluateOptions,
) -> Result<State>
where
    U: EvalUnit,
    D: DataSource<Batch = U::Batch> + ?Sized,
{
    let mut state = State::for_evaluate(options.phase_state());
    run_evaluate(&mut state, unit, data, callbacks)?;
    Ok(state)
}

/// Evaluate on a caller-owned [`State`], continuing from its current progress.
pub fn run_evaluate<U, D>(
    state: &mut State,
    unit: &mut U,
    data: &D,
    callbacks: &mut [Box<dyn Callback>],
) -> Result<()>
where
    U: EvalUnit,
    D: DataSource<Batch = U::Batch> + ?Sized,
{
    let eval_state = state.require(Phase::Eval)?;
    info!(
        unit = unit.name(),
        max_steps_per_epoch = ?eval_state.max_steps_per_epoch,
        "Started evaluate"
    );

    let result = eval_loop(state, unit, callbacks, data);
    finish(state, unit, callbacks, "evaluation", result)
}

/// One full evaluation: start hooks, a single epoch, end hooks.
///
/// Tracked modules are switched to eval mode and restored afterwards, so this
/// can run nested inside a train loop.
pub(crate) fn eval_loop<U, D>(
    state: &mut State,
    unit: &mut U,
    callbacks: &mut [Box<dyn Callback>],
    data: &D,
) -> Result<()>
where
    U: EvalUnit,
    D: DataSource<Batch = U::Batch> + ?Sized,
{
    with_training_mode(unit, false, |unit| {
        fire::<U, EvalOps>(state, unit, callbacks, Hook::EvalStart)?;
        run_epoch::<U, EvalOps, D, _>(state, unit, callbacks, data, |_, _, _| Ok(()))?;
        fire::<U, EvalOps>(state, unit, callbacks, Hook::EvalEnd)
    })
}
