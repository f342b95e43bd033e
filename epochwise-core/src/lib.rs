//! # epochwise-core
//!
//! A training-loop runtime. Given a unit that implements step functions and
//! lifecycle hooks, the runtime drives epochs of steps for `train`,
//! `evaluate` and `fit` (train with periodic evaluation), tracks progress,
//! calls hooks and callbacks in a fixed order, honors step and epoch caps and
//! cooperative stop requests, and can resume mid-epoch from saved progress.

pub mod callbacks;
pub mod config;
pub mod data;
pub mod error;
pub mod progress;
pub mod runner;
pub mod state;
pub mod timer;
pub mod unit;

// Re-export commonly used types at the crate root.
pub use callbacks::{Callback, EarlyStopping, Hook, Mode, ProgressLogger};
pub use config::{
    ConfigOverrides, EvaluateOptions, FitOptions, LogConfig, RunConfig, TrainOptions, load_config,
};
pub use data::{DataSource, FromFn, from_fn};
pub use error::{HookResult, LoopError, Result};
pub use progress::Progress;
pub use runner::{evaluate, fit, run_evaluate, run_fit, run_train, train};
pub use state::{EntryPoint, Phase, PhaseState, RunSnapshot, State};
pub use timer::{Timer, TimerEntry, TimerSummary};
pub use unit::{EvalUnit, StepMode, TrainUnit, TrainingMode, Unit, with_training_mode};
