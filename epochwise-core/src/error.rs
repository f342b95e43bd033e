//! Error types for the loop runtime.
//!
//! Configuration problems are reported before any hook runs. Failures raised by
//! a unit or callback are carried through [`LoopError::Unit`] untouched, so the
//! caller can downcast to its own error type.

use crate::state::Phase;

/// Top-level error returned by the `train`, `evaluate` and `fit` entry points.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Expected {phase} state to be initialized")]
    MissingPhaseState { phase: Phase },

    #[error(transparent)]
    Unit(#[from] anyhow::Error),
}

impl LoopError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error was raised by the runtime's own validation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingPhaseState { .. })
    }

    /// The error raised by a unit or callback, if that is where it came from.
    pub fn as_unit_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Unit(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of a unit or callback hook.
pub type HookResult = anyhow::Result<()>;

/// Convenience result type for the runtime.
pub type Result<T> = std::result::Result<T, LoopError>;
