//! Entry point options and layered run configuration.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment (`EPOCHWISE_` prefix, `__` nesting) ->
//! explicit overrides.

use crate::error::LoopError;
use crate::state::PhaseState;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Limits for the `train` entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Number of epochs to run. `None` runs until `max_steps` or a stop request.
    #[serde(default)]
    pub max_epochs: Option<usize>,
    /// Cap on train steps across the whole run.
    #[serde(default)]
    pub max_steps: Option<usize>,
    /// Cap on train steps within one epoch.
    #[serde(default)]
    pub max_steps_per_epoch: Option<usize>,
}

impl TrainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = Some(epochs);
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn max_steps_per_epoch(mut self, steps: usize) -> Self {
        self.max_steps_per_epoch = Some(steps);
        self
    }

    pub fn phase_state(&self) -> PhaseState {
        PhaseState::new()
            .with_max_epochs(self.max_epochs)
            .with_max_steps(self.max_steps)
            .with_max_steps_per_epoch(self.max_steps_per_epoch)
    }
}

/// Limits for the `evaluate` entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateOptions {
    /// Cap on eval steps. `None` evaluates until the data is exhausted.
    #[serde(default)]
    pub max_steps_per_epoch: Option<usize>,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps_per_epoch(mut self, steps: usize) -> Self {
        self.max_steps_per_epoch = Some(steps);
        self
    }

    pub fn phase_state(&self) -> PhaseState {
        PhaseState::new().with_max_steps_per_epoch(self.max_steps_per_epoch)
    }
}

/// Limits and evaluation schedule for the `fit` entry point.
///
/// Exactly one of `evaluate_every_n_epochs` and `evaluate_every_n_steps` must
/// be a positive number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitOptions {
    #[serde(default)]
    pub max_epochs: Option<usize>,
    #[serde(default)]
    pub max_train_steps: Option<usize>,
    #[serde(default)]
    pub evaluate_every_n_epochs: Option<usize>,
    #[serde(default)]
    pub evaluate_every_n_steps: Option<usize>,
    #[serde(default)]
    pub max_train_steps_per_epoch: Option<usize>,
    #[serde(default)]
    pub max_eval_steps_per_epoch: Option<usize>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_epochs: None,
            max_train_steps: None,
            evaluate_every_n_epochs: None,
            evaluate_every_n_steps: None,
            max_train_steps_per_epoch: None,
            max_eval_steps_per_epoch: None,
        }
        .with_default_schedule()
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = Some(epochs);
        self
    }

    pub fn max_train_steps(mut self, steps: usize) -> Self {
        self.max_train_steps = Some(steps);
        self
    }

    /// Evaluate after every `n` train epochs (clears any step interval).
    pub fn evaluate_every_n_epochs(mut self, n: usize) -> Self {
        self.evaluate_every_n_epochs = Some(n);
        self.evaluate_every_n_steps = None;
        self
    }

    /// Evaluate after every `n` train steps (clears any epoch interval).
    pub fn evaluate_every_n_steps(mut self, n: usize) -> Self {
        self.evaluate_every_n_steps = Some(n);
        self.evaluate_every_n_epochs = None;
        self
    }

    pub fn max_train_steps_per_epoch(mut self, steps: usize) -> Self {
        self.max_train_steps_per_epoch = Some(steps);
        self
    }

    pub fn max_eval_steps_per_epoch(mut self, steps: usize) -> Self {
        self.max_eval_steps_per_epoch = Some(steps);
        self
    }

    /// Evaluate after every epoch when no interval has been chosen at all.
    ///
    /// An explicit `Some(0)` counts as a choice and is left alone.
    pub fn with_default_schedule(mut self) -> Self {
        if self.evaluate_every_n_epochs.is_none() && self.evaluate_every_n_steps.is_none() {
            self.evaluate_every_n_epochs = Some(1);
        }
        self
    }

    pub fn validate(&self) -> Result<(), LoopError> {
        validate_eval_interval(self.evaluate_every_n_epochs, self.evaluate_every_n_steps)
    }

    pub fn train_phase_state(&self) -> PhaseState {
        PhaseState::new()
            .with_max_epochs(self.max_epochs)
            .with_max_steps(self.max_train_steps)
            .with_max_steps_per_epoch(self.max_train_steps_per_epoch)
            .with_evaluate_every_n_epochs(self.evaluate_every_n_epochs)
            .with_evaluate_every_n_steps(self.evaluate_every_n_steps)
    }

    pub fn eval_phase_state(&self) -> PhaseState {
        PhaseState::new().with_max_steps_per_epoch(self.max_eval_steps_per_epoch)
    }
}

/// Exactly one of the two intervals must be set to a positive value.
pub(crate) fn validate_eval_interval(
    every_n_epochs: Option<usize>,
    every_n_steps: Option<usize>,
) -> Result<(), LoopError> {
    let active = |n: Option<usize>| n.is_some_and(|n| n > 0);
    match (active(every_n_epochs), active(every_n_steps)) {
        (true, false) | (false, true) => Ok(()),
        (false, false) => Err(LoopError::config(format!(
            "one of evaluate_every_n_epochs or evaluate_every_n_steps must be a positive number \
             (got evaluate_every_n_epochs={every_n_epochs:?}, evaluate_every_n_steps={every_n_steps:?})"
        ))),
        (true, true) => Err(LoopError::config(format!(
            "only one of evaluate_every_n_epochs or evaluate_every_n_steps may be set \
             (got evaluate_every_n_epochs={every_n_epochs:?}, evaluate_every_n_steps={every_n_steps:?})"
        ))),
    }
}

/// Logging settings consumed by front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Emit a progress line every N train steps (0 disables step lines).
    #[serde(default = "default_log_every_n_steps")]
    pub every_n_steps: usize,
    /// Directory for the JSON log file. No file is written when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            every_n_steps: default_log_every_n_steps(),
            directory: None,
        }
    }
}

fn default_log_every_n_steps() -> usize {
    50
}

/// Full configuration for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub train: TrainOptions,
    #[serde(default)]
    pub evaluate: EvaluateOptions,
    #[serde(default)]
    pub fit: FitOptions,
    #[serde(default)]
    pub log: LogConfig,
}

/// Path of the per-user config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "epochwise", "epochwise")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Explicit `key = value` settings applied on top of every other source,
/// typically built from command-line flags.
///
/// Keys are dotted paths into [`RunConfig`], such as `fit.max_epochs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    values: Vec<(String, usize)>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: usize) -> Self {
        self.values.push((key.into(), value));
        self
    }

    /// Like [`ConfigOverrides::set`], skipped when `value` is `None`.
    pub fn set_opt(self, key: impl Into<String>, value: Option<usize>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Choose the epoch interval for `fit` and switch the step interval off.
    pub fn evaluate_every_n_epochs(self, n: usize) -> Self {
        self.set("fit.evaluate_every_n_epochs", n)
            .set("fit.evaluate_every_n_steps", 0)
    }

    /// Choose the step interval for `fit` and switch the epoch interval off.
    pub fn evaluate_every_n_steps(self, n: usize) -> Self {
        self.set("fit.evaluate_every_n_steps", n)
            .set("fit.evaluate_every_n_epochs", 0)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (`EPOCHWISE_FIT__MAX_EPOCHS`, ...)
/// 3. `config_file`, when given
/// 4. User config (`~/.config/epochwise/config.toml` or platform equivalent)
/// 5. Built-in defaults
///
/// The `fit` schedule falls back to one evaluation per epoch only when no
/// layer picks an interval.
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<RunConfig, Box<figment::Error>> {
    let mut defaults = RunConfig::default();
    defaults.fit.evaluate_every_n_epochs = None;
    let mut figment = Figment::from(Serialized::defaults(defaults));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("EPOCHWISE_").split("__"));

    if let Some(overrides) = overrides {
        for (key, value) in &overrides.values {
            figment = figment.merge(Serialized::default(key, *value));
        }
    }

    let mut config: RunConfig = figment.extract().map_err(Box::new)?;
    config.fit = config.fit.with_default_schedule();
    Ok(config)
}
