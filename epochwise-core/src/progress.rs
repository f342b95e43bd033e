//! Step and epoch counters for a single phase.

use serde::{Deserialize, Serialize};

/// Counters for completed steps and epochs.
///
/// `num_steps_completed_in_epoch` only returns to zero through
/// [`Progress::increment_epoch`], so a non-zero value means the phase is in
/// the middle of an epoch (for example after resuming from a snapshot).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub num_epochs_completed: usize,
    pub num_steps_completed: usize,
    pub num_steps_completed_in_epoch: usize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed step.
    pub fn increment_step(&mut self) {
        self.num_steps_completed += 1;
        self.num_steps_completed_in_epoch += 1;
    }

    /// Record one completed epoch and reset the in-epoch step counter.
    pub fn increment_epoch(&mut self) {
        self.num_epochs_completed += 1;
        self.num_steps_completed_in_epoch = 0;
    }

    /// Whether the phase is partway through an epoch.
    pub fn is_mid_epoch(&self) -> bool {
        self.num_steps_completed_in_epoch > 0
    }
}
