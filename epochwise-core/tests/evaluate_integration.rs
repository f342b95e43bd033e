//! Integration tests for the `evaluate` entry point.

mod common;

use common::{RecordingCallback, RecordingUnit, batches, count, new_log};
use epochwise_core::{Callback, EvaluateOptions, LoopError, PhaseState, State, evaluate, run_evaluate};
use pretty_assertions::assert_eq;

#[test]
fn test_evaluate_runs_one_epoch() {
    let log = new_log();
    let mut unit = RecordingUnit::new(&log);
    let mut callbacks: Vec<Box<dyn Callback>> = vec![RecordingCallback::boxed(&log, "cb")];

    let state = evaluate(&mut unit, &batches(6, 2), &mut callbacks, &EvaluateOptions::new()).unwrap();
    let eval = state.eval_state().unwrap();

    assert_eq!(eval.progress().num_epochs_completed, 1);
    assert_eq!(eval.progress().num_steps_completed, 3);
    assert!(!eval.has_step_output());
    assert!(state.train_state().is_none());
    assert_eq!(
        *log.borrow(),
        [
            "unit:on_eval_start",
            "cb:on_eval_start",
            "unit:on_eval_epoch_start",
            "unit:eval_step",
            "cb:on_eval_step_end(Some(2.0))",
            "unit:eval_step",
            "cb:on_eval_step_end(Some(2.0))",
            "unit:eval_step",
            "cb:on_eval_step_end(Some(2.0))",
            "unit:on_eval_epoch_end",
            "unit:on_eval_end",
            "cb:on_eval_end",
        ]
    );
}

#[test]
fn test_evaluate_honors_step_cap() {
    let log = new_log();
    let mut unit = RecordingUnit::new(&log);
    let options = EvaluateOptions::new().max_steps_per_epoch(2);

    let state = evaluate(&mut unit, &batches(20, 2), &mut [], &options).unwrap();

    assert_eq!(state.eval_state().unwrap().progress().num_steps_completed, 2);
    assert_eq!(unit.eval_steps, 2);
}

#[test]
fn test_evaluate_restores_training_mode() {
    let log = new_log();
    let mut unit = RecordingUnit::new(&log);
    unit.layer.training = true;

    evaluate(&mut unit, &batches(4, 2), &mut [], &EvaluateOptions::new()).unwrap();

    assert_eq!(unit.modes_seen, [("eval", false), ("eval", false)]);
    assert!(unit.layer.training);
}

#[test]
fn test_repeated_evaluate_on_shared_state() {
    let log = new_log();
    let mut unit = RecordingUnit::new(&log);
    let mut state = State::for_evaluate(PhaseState::new());
    let data = batches(4, 2);

    run_evaluate(&mut state, &mut unit, &data, &mut []).unwrap();
    run_evaluate(&mut state, &mut unit, &data, &mut []).unwrap();

    let progress = state.eval_state().unwrap().progress();
    assert_eq!(progress.num_epochs_completed, 2);
    assert_eq!(progress.num_steps_completed, 4);
    assert_eq!(count(&log, "unit:on_eval_start"), 2);
    assert_eq!(count(&log, "unit:on_eval_end"), 2);
}

#[test]
fn test_run_evaluate_without_eval_state() {
    let log = new_log();
    let mut unit = RecordingUnit::new(&log);
    let mut state = State::for_train(PhaseState::new());

    let err = run_evaluate(&mut state, &mut unit, &batches(4, 2), &mut []).unwrap_err();

    assert!(matches!(err, LoopError::MissingPhaseState { .. }));
    assert!(log.borrow().is_empty());
    assert!(unit.exceptions.is_empty());
}
