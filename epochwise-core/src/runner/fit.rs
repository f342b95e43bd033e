//! The `fit` entry point: training with periodic evaluation.

use super::evaluate::eval_loop;
use super::train::train_loop;
use super::{Interleave, finish, warn_if_unbounded};
use crate::callbacks::Callback;
use crate::config::{FitOptions, validate_eval_interval};
use crate::data::DataSource;
use crate::error::Result;
use crate::state::{Phase, State};
use crate::unit::{EvalUnit, TrainUnit};
use tracing::{debug, info};

/// Train `unit` on `train_data`, evaluating on `eval_data` every N epochs or
/// every N steps, and return the final [`State`].
///
/// The schedule is validated before any hook runs. Each evaluation is a full
/// eval start / epoch / end cycle. A step-scheduled evaluation that lands on
/// the last step of a train epoch runs before that epoch's end hooks.
pub fn fit<U, TD, ED>(
    unit: &mut U,
    train_data: &TD,
    eval_data: &ED,
    callbacks: &mut [Box<dyn Callback>],
    options: &FitOptions,
) -> Result<State>
where
    U: TrainUnit + EvalUnit,
    TD: DataSource<Batch = <U as TrainUnit>::Batch> + ?Sized,
    ED: DataSource<Batch = <U as EvalUnit>::Batch> + ?Sized,
{
    options.validate()?;
    let mut state = State::for_fit(options.train_phase_state(), options.eval_phase_state());
    run_fit(&mut state, unit, train_data, eval_data, callbacks)?;
    Ok(state)
}

/// Fit on a caller-owned [`State`] holding both phase states.
pub fn run_fit<U, TD, ED>(
    state: &mut State,
    unit: &mut U,
    train_data: &TD,
    eval_data: &ED,
    callbacks: &mut [Box<dyn Callback>],
) -> Result<()>
where
    U: TrainUnit + EvalUnit,
    TD: DataSource<Batch = <U as TrainUnit>::Batch> + ?Sized,
    ED: DataSource<Batch = <U as EvalUnit>::Batch> + ?Sized,
{
    state.require(Phase::Eval)?;
    let train_state = state.require(Phase::Train)?;
    validate_eval_interval(
        train_state.evaluate_every_n_epochs,
        train_state.evaluate_every_n_steps,
    )?;
    info!(
        unit = unit.name(),
        max_epochs = ?train_state.max_epochs,
        max_train_steps = ?train_state.max_steps,
        evaluate_every_n_epochs = ?train_state.evaluate_every_n_epochs,
        evaluate_every_n_steps = ?train_state.evaluate_every_n_steps,
        "Started fit"
    );
    warn_if_unbounded(Phase::Train, train_state.max_epochs, train_state.max_steps);

    let mut interleave = EvaluateEvery { eval_data };
    let result = train_loop(state, unit, callbacks, train_data, &mut interleave);
    finish(state, unit, callbacks, "fit", result)
}

/// Runs a full evaluation whenever the train progress hits the configured interval.
struct EvaluateEvery<'d, ED: ?Sized> {
    eval_data: &'d ED,
}

impl<'d, U, ED> Interleave<U> for EvaluateEvery<'d, ED>
where
    U: TrainUnit + EvalUnit,
    ED: DataSource<Batch = <U as EvalUnit>::Batch> + ?Sized,
{
    fn after_train_step(
        &mut self,
        state: &mut State,
        unit: &mut U,
        callbacks: &mut [Box<dyn Callback>],
    ) -> Result<()> {
        let train_state = state.require(Phase::Train)?;
        let Some(every) = train_state.evaluate_every_n_steps.filter(|n| *n > 0) else {
            return Ok(());
        };
        // Counted within the epoch so a partial tail never carries into the next one.
        let steps_in_epoch = train_state.progress().num_steps_completed_in_epoch;
        if steps_in_epoch % every == 0 {
            debug!(
                train_steps = train_state.progress().num_steps_completed,
                steps_in_epoch,
                "Running step-scheduled evaluation"
            );
            eval_loop(state, unit, callbacks, self.eval_data)?;
        }
        Ok(())
    }

    fn after_train_epoch(
        &mut self,
        state: &mut State,
        unit: &mut U,
        callbacks: &mut [Box<dyn Callback>],
    ) -> Result<()> {
        let train_state = state.require(Phase::Train)?;
        let Some(every) = train_state.evaluate_every_n_epochs.filter(|n| *n > 0) else {
            return Ok(());
        };
        let epochs = train_state.progress().num_epochs_completed;
        if epochs % every == 0 {
            debug!(train_epochs = epochs, "Running epoch-scheduled evaluation");
            eval_loop(state, unit, callbacks, self.eval_data)?;
        }
        Ok(())
    }
}
