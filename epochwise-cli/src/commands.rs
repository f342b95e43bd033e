//! CLI subcommand handlers.

use crate::regression::{RegressionUnit, synthetic_batches};
use crate::{Commands, ConfigAction, DataArgs};
use epochwise_core::config::user_config_path;
use epochwise_core::{
    Callback, ConfigOverrides, EarlyStopping, EntryPoint, EvaluateOptions, FitOptions, Progress,
    ProgressLogger, RunConfig, State, TrainOptions, evaluate, fit, train,
};
use serde::Serialize;

/// Final outcome of a run, printed as text or JSON.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub entry_point: EntryPoint,
    pub train: Option<Progress>,
    pub eval: Option<Progress>,
    pub stopped_early: bool,
    pub weight: f64,
    pub bias: f64,
    pub eval_loss: Option<f64>,
}

impl RunReport {
    fn new(state: &State, unit: &RegressionUnit) -> Self {
        let snapshot = state.snapshot();
        Self {
            entry_point: snapshot.entry_point,
            train: snapshot.train,
            eval: snapshot.eval,
            stopped_early: state.should_stop(),
            weight: unit.model.weight,
            bias: unit.model.bias,
            eval_loss: unit.last_eval_loss(),
        }
    }

    fn print(&self, json: bool) -> anyhow::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }
        println!("Finished {}", self.entry_point);
        for (label, progress) in [("train", self.train), ("eval", self.eval)] {
            if let Some(p) = progress {
                println!(
                    "  {label}: {} epochs, {} steps",
                    p.num_epochs_completed, p.num_steps_completed
                );
            }
        }
        if self.stopped_early {
            println!("  stopped early");
        }
        println!("  model: y = {:.4} * x + {:.4}", self.weight, self.bias);
        if let Some(loss) = self.eval_loss {
            println!("  eval loss: {loss:.6}");
        }
        Ok(())
    }
}

/// Config overrides carried by the flags of a subcommand.
pub fn config_overrides(command: &Commands) -> ConfigOverrides {
    match command {
        Commands::Train {
            epochs,
            max_steps,
            max_steps_per_epoch,
            ..
        } => ConfigOverrides::new()
            .set_opt("train.max_epochs", *epochs)
            .set_opt("train.max_steps", *max_steps)
            .set_opt("train.max_steps_per_epoch", *max_steps_per_epoch),
        Commands::Evaluate {
            max_steps_per_epoch,
            ..
        } => ConfigOverrides::new().set_opt("evaluate.max_steps_per_epoch", *max_steps_per_epoch),
        Commands::Fit {
            epochs,
            max_train_steps,
            every_n_epochs,
            every_n_steps,
            max_train_steps_per_epoch,
            max_eval_steps_per_epoch,
            ..
        } => {
            let mut overrides = ConfigOverrides::new()
                .set_opt("fit.max_epochs", *epochs)
                .set_opt("fit.max_train_steps", *max_train_steps)
                .set_opt("fit.max_train_steps_per_epoch", *max_train_steps_per_epoch)
                .set_opt("fit.max_eval_steps_per_epoch", *max_eval_steps_per_epoch);
            if let Some(n) = every_n_epochs {
                overrides = overrides.evaluate_every_n_epochs(*n);
            }
            if let Some(n) = every_n_steps {
                overrides = overrides.evaluate_every_n_steps(*n);
            }
            overrides
        }
        Commands::Config { .. } => ConfigOverrides::new(),
    }
}

/// Handle a CLI subcommand. Flag values are already merged into `config`.
pub fn handle_command(command: Commands, config: RunConfig, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Train { data, .. } => {
            let report = run_train(&bounded_train(config.train), &data, config.log.every_n_steps)?;
            report.print(json)
        }
        Commands::Evaluate { data, .. } => {
            let report = run_evaluate(&config.evaluate, &data)?;
            report.print(json)
        }
        Commands::Fit { patience, data, .. } => {
            let report = run_fit(&config.fit, &data, patience, config.log.every_n_steps)?;
            report.print(json)
        }
        Commands::Config { action } => handle_config(action, &config),
    }
}

/// Never loop forever from the command line.
fn bounded_train(options: TrainOptions) -> TrainOptions {
    if options.max_epochs.is_none() && options.max_steps.is_none() {
        options.max_epochs(1)
    } else {
        options
    }
}

fn run_train(options: &TrainOptions, data: &DataArgs, log_every: usize) -> anyhow::Result<RunReport> {
    let batches = synthetic_batches(data.samples, data.batch_size, data.seed);
    let mut unit = RegressionUnit::new(data.learning_rate);
    let mut callbacks: Vec<Box<dyn Callback>> = vec![Box::new(ProgressLogger::new(log_every))];

    let state = train(&mut unit, &batches, &mut callbacks, options)?;
    Ok(RunReport::new(&state, &unit))
}

fn run_evaluate(options: &EvaluateOptions, data: &DataArgs) -> anyhow::Result<RunReport> {
    let batches = synthetic_batches(data.eval_samples, data.batch_size, eval_seed(data.seed));
    let mut unit = RegressionUnit::new(data.learning_rate);
    let mut callbacks: Vec<Box<dyn Callback>> = vec![Box::new(ProgressLogger::default())];

    let state = evaluate(&mut unit, &batches, &mut callbacks, options)?;
    Ok(RunReport::new(&state, &unit))
}

fn run_fit(
    options: &FitOptions,
    data: &DataArgs,
    patience: Option<usize>,
    log_every: usize,
) -> anyhow::Result<RunReport> {
    let mut options = options.clone();
    if options.max_epochs.is_none() && options.max_train_steps.is_none() {
        options = options.max_epochs(1);
    }
    let train_batches = synthetic_batches(data.samples, data.batch_size, data.seed);
    let eval_batches = synthetic_batches(data.eval_samples, data.batch_size, eval_seed(data.seed));
    let mut unit = RegressionUnit::new(data.learning_rate);
    let mut callbacks: Vec<Box<dyn Callback>> = vec![Box::new(ProgressLogger::new(log_every))];
    if let Some(patience) = patience {
        callbacks.push(Box::new(EarlyStopping::new(patience).min_delta(1e-6)));
    }

    let state = fit(&mut unit, &train_batches, &eval_batches, &mut callbacks, &options)?;
    Ok(RunReport::new(&state, &unit))
}

/// Held-out data is drawn from a different stream than the training data.
fn eval_seed(seed: u64) -> u64 {
    seed.wrapping_add(1)
}

fn handle_config(action: ConfigAction, config: &RunConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = user_config_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine a config directory"))?;
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&RunConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
