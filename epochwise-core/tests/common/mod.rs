//! Shared fixtures for the loop integration tests.
#![allow(dead_code)]

use epochwise_core::{Callback, EvalUnit, HookResult, LoopError, State, TrainUnit, TrainingMode, Unit};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Run `f` with warnings and above written here instead of stdout.
    pub fn capture_warnings<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Split `len` samples into batches of `batch_size`, like a data loader would.
pub fn batches(len: usize, batch_size: usize) -> Vec<Vec<u32>> {
    (0..len as u32)
        .collect::<Vec<_>>()
        .chunks(batch_size)
        .map(<[u32]>::to_vec)
        .collect()
}

#[derive(Debug, thiserror::Error)]
#[error("step {step} exploded")]
pub struct StepFailure {
    pub step: usize,
}

pub struct Layer {
    pub training: bool,
}

impl TrainingMode for Layer {
    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

/// A unit that records every hook it sees and can be told to stop or fail.
pub struct RecordingUnit {
    pub log: Log,
    pub layer: Layer,
    pub train_steps: usize,
    pub eval_steps: usize,
    /// Call `stop()` when this many steps of the current train epoch are done.
    pub stop_after_train_steps_in_epoch: Option<usize>,
    /// Fail inside the train step with this (1-based, global) index.
    pub fail_at_train_step: Option<usize>,
    /// Mode of `layer` observed by each step, in order.
    pub modes_seen: Vec<(&'static str, bool)>,
    pub exceptions: Vec<String>,
}

impl RecordingUnit {
    pub fn new(log: &Log) -> Self {
        Self {
            log: Rc::clone(log),
            layer: Layer { training: false },
            train_steps: 0,
            eval_steps: 0,
            stop_after_train_steps_in_epoch: None,
            fail_at_train_step: None,
            modes_seen: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    fn push(&self, event: &str) {
        self.log.borrow_mut().push(format!("unit:{event}"));
    }
}

impl Unit for RecordingUnit {
    fn tracked_modules(&mut self) -> Vec<&mut dyn TrainingMode> {
        vec![&mut self.layer as &mut dyn TrainingMode]
    }

    fn on_exception(&mut self, _state: &mut State, error: &LoopError) {
        self.push("on_exception");
        self.exceptions.push(error.to_string());
    }
}

impl TrainUnit for RecordingUnit {
    type Batch = Vec<u32>;
    type Output = f32;

    fn on_train_start(&mut self, _state: &mut State) -> HookResult {
        self.push("on_train_start");
        Ok(())
    }

    fn on_train_epoch_start(&mut self, _state: &mut State) -> HookResult {
        self.push("on_train_epoch_start");
        Ok(())
    }

    fn on_train_step_start(&mut self, _state: &mut State) -> HookResult {
        self.push("on_train_step_start");
        Ok(())
    }

    fn train_step(&mut self, state: &mut State, batch: Vec<u32>) -> anyhow::Result<f32> {
        self.push("train_step");
        self.train_steps += 1;
        self.modes_seen.push(("train", self.layer.training));
        if self.fail_at_train_step == Some(self.train_steps) {
            return Err(StepFailure {
                step: self.train_steps,
            }
            .into());
        }
        if let Some(limit) = self.stop_after_train_steps_in_epoch {
            let done_in_epoch = state
                .train_state()
                .map(|s| s.progress().num_steps_completed_in_epoch)
                .unwrap_or(0);
            if done_in_epoch + 1 == limit {
                state.stop();
            }
        }
        Ok(batch.iter().sum::<u32>() as f32)
    }

    fn on_train_step_end(&mut self, _state: &mut State) -> HookResult {
        self.push("on_train_step_end");
        Ok(())
    }

    fn on_train_epoch_end(&mut self, _state: &mut State) -> HookResult {
        self.push("on_train_epoch_end");
        Ok(())
    }

    fn on_train_end(&mut self, _state: &mut State) -> HookResult {
        self.push("on_train_end");
        Ok(())
    }
}

impl EvalUnit for RecordingUnit {
    type Batch = Vec<u32>;
    type Output = f64;

    fn on_eval_start(&mut self, _state: &mut State) -> HookResult {
        self.push("on_eval_start");
        Ok(())
    }

    fn on_eval_epoch_start(&mut self, _state: &mut State) -> HookResult {
        self.push("on_eval_epoch_start");
        Ok(())
    }

    fn eval_step(&mut self, _state: &mut State, batch: Vec<u32>) -> anyhow::Result<f64> {
        self.push("eval_step");
        self.eval_steps += 1;
        self.modes_seen.push(("eval", self.layer.training));
        Ok(f64::from(batch.len() as u32))
    }

    fn on_eval_epoch_end(&mut self, _state: &mut State) -> HookResult {
        self.push("on_eval_epoch_end");
        Ok(())
    }

    fn on_eval_end(&mut self, _state: &mut State) -> HookResult {
        self.push("on_eval_end");
        Ok(())
    }
}

/// A callback that records the hooks it receives, plus the step outputs it can see.
pub struct RecordingCallback {
    pub log: Log,
    pub tag: &'static str,
}

impl RecordingCallback {
    pub fn boxed(log: &Log, tag: &'static str) -> Box<dyn Callback> {
        Box::new(Self {
            log: Rc::clone(log),
            tag,
        })
    }

    fn push(&self, event: &str) {
        self.log.borrow_mut().push(format!("{}:{event}", self.tag));
    }
}

impl Callback for RecordingCallback {
    fn on_train_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_train_start");
        Ok(())
    }

    fn on_train_epoch_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_train_epoch_start");
        Ok(())
    }

    fn on_train_step_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_train_step_start");
        Ok(())
    }

    fn on_train_step_end(&mut self, state: &mut State, _unit: &dyn Unit) -> HookResult {
        let output = state.train_state().and_then(|s| s.step_output::<f32>().copied());
        self.push(&format!("on_train_step_end({output:?})"));
        Ok(())
    }

    fn on_train_epoch_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_train_epoch_end");
        Ok(())
    }

    fn on_train_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_train_end");
        Ok(())
    }

    fn on_eval_start(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_eval_start");
        Ok(())
    }

    fn on_eval_step_end(&mut self, state: &mut State, _unit: &dyn Unit) -> HookResult {
        let output = state.eval_state().and_then(|s| s.step_output::<f64>().copied());
        self.push(&format!("on_eval_step_end({output:?})"));
        Ok(())
    }

    fn on_eval_end(&mut self, _state: &mut State, _unit: &dyn Unit) -> HookResult {
        self.push("on_eval_end");
        Ok(())
    }

    fn on_exception(&mut self, _state: &mut State, unit: &dyn Unit, error: &LoopError) {
        self.push(&format!("on_exception({}: {error})", unit.name()));
    }
}

/// Events in `log` with the given prefix, prefix stripped.
pub fn events(log: &Log, prefix: &str) -> Vec<String> {
    log.borrow()
        .iter()
        .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
        .collect()
}

pub fn count(log: &Log, event: &str) -> usize {
    log.borrow().iter().filter(|e| e.as_str() == event).count()
}
