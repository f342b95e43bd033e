//! The `train` entry point and train loop driver.

use super::{
    Interleave, NoInterleave, TrainOps, finish, fire, run_epoch, warn_if_unbounded,
};
use crate::callbacks::{Callback, Hook};
use crate::config::TrainOptions;
use crate::data::DataSource;
use crate::error::Result;
use crate::state::{Phase, State};
use crate::unit::{TrainUnit, with_training_mode};
use tracing::info;

/// Train `unit` on `data` and return the final [`State`].
///
/// The unit's tracked modules are put in training mode for the duration of
/// the call and restored afterwards.
pub fn train<U, D>(
    unit: &mut U,
    data: &D,
    callbacks: &mut [Box<dyn Callback>],
    options: &TrainOptions,
) -> Result<State>
where
    U: TrainUnit,
    D: DataSource<Batch = U::Batch> + ?Sized,
{
    let mut state = State::for_train(options.phase_state());
    run_train(&mut state, unit, data, callbacks)?;
    Ok(state)
}

/// Train on a caller-owned [`State`], continuing from its current progress.
///
/// Use this to resume from restored progress, or to keep the state
/// inspectable when the run fails.
pub fn run_train<U, D>(
    state: &mut State,
    unit: &mut U,
    data: &D,
    callbacks: &mut [Box<dyn Callback>],
) -> Result<()>
where
    U: TrainUnit,
    D: DataSource<Batch = U::Batch> + ?Sized,
{
    let train_state = state.require(Phase::Train)?;
    info!(
        unit = unit.name(),
        max_epochs = ?train_state.max_epochs,
        max_steps = ?train_state.max_steps,
        max_steps_per_epoch = ?train_state.max_steps_per_epoch,
        "Started train"
    );
    warn_if_unbounded(Phase::Train, train_state.max_epochs, train_state.max_steps);

    let result = train_loop(state, unit, callbacks, data, &mut NoInterleave);
    finish(state, unit, callbacks, "train", result)
}

/// Run train epochs until the epoch or step cap is reached or a stop is requested.
pub(crate) fn train_loop<U, D, I>(
    state: &mut State,
    unit: &mut U,
    callbacks: &mut [Box<dyn Callback>],
    data: &D,
    interleave: &mut I,
) -> Result<()>
where
    U: TrainUnit,
    D: DataSource<Batch = U::Batch> + ?Sized,
    I: Interleave<U>,
{
    with_training_mode(unit, true, |unit| {
        fire::<U, TrainOps>(state, unit, callbacks, Hook::TrainStart)?;

        while !(state.should_stop() || state.require(Phase::Train)?.is_done()) {
            run_epoch::<U, TrainOps, D, _>(state, unit, callbacks, data, |state, unit, callbacks| {
                interleave.after_train_step(state, unit, callbacks)
            })?;
            interleave.after_train_epoch(state, unit, callbacks)?;
        }

        fire::<U, TrainOps>(state, unit, callbacks, Hook::TrainEnd)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HookResult, LoopError};
    use crate::unit::{TrainingMode, Unit};

    #[derive(Default)]
    struct Counter {
        steps: usize,
        epoch_starts: usize,
        epoch_ends: usize,
        starts: usize,
        ends: usize,
        seen: Vec<u32>,
    }

    impl Unit for Counter {}

    impl TrainUnit for Counter {
        type Batch = u32;
        type Output = f64;

        fn on_train_start(&mut self, _state: &mut State) -> HookResult {
            self.starts += 1;
            Ok(())
        }

        fn on_train_epoch_start(&mut self, _state: &mut State) -> HookResult {
            self.epoch_starts += 1;
            Ok(())
        }

        fn train_step(&mut self, _state: &mut State, batch: u32) -> anyhow::Result<f64> {
            self.steps += 1;
            self.seen.push(batch);
            Ok(f64::from(batch) * 0.5)
        }

        fn on_train_epoch_end(&mut self, _state: &mut State) -> HookResult {
            self.epoch_ends += 1;
            Ok(())
        }

        fn on_train_end(&mut self, _state: &mut State) -> HookResult {
            self.ends += 1;
            Ok(())
        }
    }

    #[test]
    fn test_train_epochs_and_steps() {
        let mut unit = Counter::default();
        let data: Vec<u32> = (0..5).collect();
        let state = train(&mut unit, &data, &mut [], &TrainOptions::new().max_epochs(3)).unwrap();

        let progress = state.train_state().unwrap().progress();
        assert_eq!(progress.num_epochs_completed, 3);
        assert_eq!(progress.num_steps_completed, 15);
        assert_eq!(progress.num_steps_completed_in_epoch, 0);
        assert_eq!(unit.steps, 15);
        assert_eq!(unit.starts, 1);
        assert_eq!(unit.ends, 1);
        assert_eq!(unit.epoch_starts, 3);
        assert_eq!(unit.epoch_ends, 3);
        assert_eq!(&unit.seen[..5], &[0, 1, 2, 3, 4]);
        assert_eq!(&unit.seen[5..10], &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_max_steps_spans_epochs() {
        let mut unit = Counter::default();
        let data: Vec<u32> = (0..4).collect();
        let state = train(&mut unit, &data, &mut [], &TrainOptions::new().max_steps(6)).unwrap();

        let progress = state.train_state().unwrap().progress();
        assert_eq!(progress.num_steps_completed, 6);
        // the second epoch was cut short by max_steps, but still counts
        assert_eq!(progress.num_epochs_completed, 2);
        assert_eq!(unit.epoch_ends, 2);
    }

    #[test]
    fn test_zero_epochs_still_fires_start_and_end() {
        let mut unit = Counter::default();
        let data: Vec<u32> = vec![1, 2];
        let state = train(&mut unit, &data, &mut [], &TrainOptions::new().max_epochs(0)).unwrap();
        assert_eq!(state.train_state().unwrap().progress().num_steps_completed, 0);
        assert_eq!(unit.starts, 1);
        assert_eq!(unit.ends, 1);
        assert_eq!(unit.epoch_starts, 0);
    }

    #[test]
    fn test_timer_records_hooks_and_steps() {
        let mut unit = Counter::default();
        let data: Vec<u32> = (0..3).collect();
        let state = train(&mut unit, &data, &mut [], &TrainOptions::new().max_epochs(2)).unwrap();

        let timer = state.timer();
        assert_eq!(timer.count("train.Counter.train_step"), 6);
        assert_eq!(timer.count("train.Counter.on_train_start"), 1);
        assert_eq!(timer.count("train.Counter.on_train_epoch_end"), 2);
        // three batches plus the exhausted pull, per epoch
        assert_eq!(timer.count("train.data_iter_next"), 8);
    }

    #[test]
    fn test_run_train_requires_train_state() {
        let mut unit = Counter::default();
        let mut state = State::for_evaluate(crate::state::PhaseState::new());
        let err = run_train(&mut state, &mut unit, &vec![1u32], &mut []).unwrap_err();
        assert!(matches!(err, LoopError::MissingPhaseState { phase: Phase::Train }));
        assert_eq!(unit.starts, 0);
    }

    struct Layer {
        training: bool,
    }

    impl TrainingMode for Layer {
        fn is_training(&self) -> bool {
            self.training
        }

        fn set_training(&mut self, training: bool) {
            self.training = training;
        }
    }

    struct ModeProbe {
        layer: Layer,
        seen_training: Vec<bool>,
    }

    impl Unit for ModeProbe {
        fn tracked_modules(&mut self) -> Vec<&mut dyn TrainingMode> {
            vec![&mut self.layer as &mut dyn TrainingMode]
        }
    }

    impl TrainUnit for ModeProbe {
        type Batch = u32;
        type Output = ();

        fn train_step(&mut self, _state: &mut State, _batch: u32) -> anyhow::Result<()> {
            self.seen_training.push(self.layer.training);
            Ok(())
        }
    }

    #[test]
    fn test_train_sets_and_restores_mode() {
        let mut unit = ModeProbe {
            layer: Layer { training: false },
            seen_training: Vec::new(),
        };
        train(&mut unit, &vec![1u32, 2], &mut [], &TrainOptions::new().max_epochs(1)).unwrap();
        assert_eq!(unit.seen_training, vec![true, true]);
        assert!(!unit.layer.training);
    }
}
