//! Run state: per-phase configuration and progress plus the shared run context.

use crate::error::LoopError;
use crate::progress::Progress;
use crate::timer::Timer;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// The entry point that created a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Train,
    Evaluate,
    Fit,
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::Train => write!(f, "train"),
            EntryPoint::Evaluate => write!(f, "evaluate"),
            EntryPoint::Fit => write!(f, "fit"),
        }
    }
}

/// A loop phase. Each phase has its own [`PhaseState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Train,
    Eval,
}

impl Phase {
    /// Prefix used for timer names and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Eval => "eval",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits and progress for one phase of a run.
#[derive(Debug, Default)]
pub struct PhaseState {
    /// Stop the phase after this many epochs (train only).
    pub max_epochs: Option<usize>,
    /// Cap on `num_steps_completed` across the whole run.
    pub max_steps: Option<usize>,
    /// Cap on steps within a single epoch.
    pub max_steps_per_epoch: Option<usize>,
    /// Under `fit`: evaluate after every N completed train epochs.
    pub evaluate_every_n_epochs: Option<usize>,
    /// Under `fit`: evaluate after every N completed train steps.
    pub evaluate_every_n_steps: Option<usize>,
    progress: Progress,
    step_output: Option<Box<dyn Any>>,
}

impl PhaseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_epochs(mut self, max_epochs: Option<usize>) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_steps_per_epoch(mut self, max_steps_per_epoch: Option<usize>) -> Self {
        self.max_steps_per_epoch = max_steps_per_epoch;
        self
    }

    pub fn with_evaluate_every_n_epochs(mut self, n: Option<usize>) -> Self {
        self.evaluate_every_n_epochs = n;
        self
    }

    pub fn with_evaluate_every_n_steps(mut self, n: Option<usize>) -> Self {
        self.evaluate_every_n_steps = n;
        self
    }

    /// Start from previously persisted progress instead of zero.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut Progress {
        &mut self.progress
    }

    /// Output of the step currently inside its hook window, if it is a `T`.
    ///
    /// Always `None` outside `on_*_step_end`: the output is dropped as soon as
    /// the step's end hooks have run.
    pub fn step_output<T: Any>(&self) -> Option<&T> {
        self.step_output.as_ref()?.downcast_ref::<T>()
    }

    pub fn has_step_output(&self) -> bool {
        self.step_output.is_some()
    }

    pub(crate) fn set_step_output(&mut self, output: Box<dyn Any>) {
        self.step_output = Some(output);
    }

    pub(crate) fn clear_step_output(&mut self) {
        self.step_output = None;
    }

    /// Whether the current epoch has hit a step cap.
    pub fn is_epoch_done(&self) -> bool {
        let p = &self.progress;
        self.max_steps.is_some_and(|max| p.num_steps_completed >= max)
            || self
                .max_steps_per_epoch
                .is_some_and(|max| p.num_steps_completed_in_epoch >= max)
    }

    /// Whether the phase has hit its epoch or total step cap.
    pub fn is_done(&self) -> bool {
        let p = &self.progress;
        self.max_epochs.is_some_and(|max| p.num_epochs_completed >= max)
            || self.max_steps.is_some_and(|max| p.num_steps_completed >= max)
    }
}

/// Context shared by every hook of a run.
#[derive(Debug)]
pub struct State {
    entry_point: EntryPoint,
    train_state: Option<PhaseState>,
    eval_state: Option<PhaseState>,
    should_stop: bool,
    timer: Timer,
}

impl State {
    pub fn new(
        entry_point: EntryPoint,
        train_state: Option<PhaseState>,
        eval_state: Option<PhaseState>,
    ) -> Self {
        Self {
            entry_point,
            train_state,
            eval_state,
            should_stop: false,
            timer: Timer::new(),
        }
    }

    pub fn for_train(train_state: PhaseState) -> Self {
        Self::new(EntryPoint::Train, Some(train_state), None)
    }

    pub fn for_evaluate(eval_state: PhaseState) -> Self {
        Self::new(EntryPoint::Evaluate, None, Some(eval_state))
    }

    pub fn for_fit(train_state: PhaseState, eval_state: PhaseState) -> Self {
        Self::new(EntryPoint::Fit, Some(train_state), Some(eval_state))
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry_point
    }

    pub fn train_state(&self) -> Option<&PhaseState> {
        self.train_state.as_ref()
    }

    pub fn train_state_mut(&mut self) -> Option<&mut PhaseState> {
        self.train_state.as_mut()
    }

    pub fn eval_state(&self) -> Option<&PhaseState> {
        self.eval_state.as_ref()
    }

    pub fn eval_state_mut(&mut self) -> Option<&mut PhaseState> {
        self.eval_state.as_mut()
    }

    pub fn phase_state(&self, phase: Phase) -> Option<&PhaseState> {
        match phase {
            Phase::Train => self.train_state(),
            Phase::Eval => self.eval_state(),
        }
    }

    pub fn phase_state_mut(&mut self, phase: Phase) -> Option<&mut PhaseState> {
        match phase {
            Phase::Train => self.train_state_mut(),
            Phase::Eval => self.eval_state_mut(),
        }
    }

    /// The phase state, or a configuration error when the entry point did not create it.
    pub(crate) fn require(&self, phase: Phase) -> Result<&PhaseState, LoopError> {
        self.phase_state(phase)
            .ok_or(LoopError::MissingPhaseState { phase })
    }

    pub(crate) fn require_mut(&mut self, phase: Phase) -> Result<&mut PhaseState, LoopError> {
        self.phase_state_mut(phase)
            .ok_or(LoopError::MissingPhaseState { phase })
    }

    /// Ask every active loop to stop at its next step boundary.
    pub fn stop(&mut self) {
        self.should_stop = true;
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub(crate) fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    /// Capture the progress of every phase for later resumption.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            entry_point: self.entry_point,
            train: self.train_state.as_ref().map(|s| s.progress),
            eval: self.eval_state.as_ref().map(|s| s.progress),
        }
    }

    /// Restore progress captured by [`State::snapshot`].
    ///
    /// Every phase present in the snapshot must exist on this state.
    pub fn restore(&mut self, snapshot: &RunSnapshot) -> Result<(), LoopError> {
        if snapshot.entry_point != self.entry_point {
            return Err(LoopError::config(format!(
                "snapshot was taken from a {} run, cannot restore into a {} run",
                snapshot.entry_point, self.entry_point
            )));
        }
        if let Some(progress) = snapshot.train {
            self.require_mut(Phase::Train)?.progress = progress;
        }
        if let Some(progress) = snapshot.eval {
            self.require_mut(Phase::Eval)?.progress = progress;
        }
        Ok(())
    }
}

/// Serializable progress of a run, used to resume mid-epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub entry_point: EntryPoint,
    #[serde(default)]
    pub train: Option<Progress>,
    #[serde(default)]
    pub eval: Option<Progress>,
}
