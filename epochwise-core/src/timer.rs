//! Named timer registry used to instrument hooks, steps and data loading.
//!
//! A [`Timer`] lives on the run [`State`](crate::State) and is created fresh
//! for every entry point call. Durations are recorded per name; the
//! [`TimerSummary`] aggregates them for a report at the end of the run.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

/// Registry of recorded durations keyed by name.
#[derive(Debug, Default)]
pub struct Timer {
    recorded: HashMap<String, Vec<Duration>>,
    running: HashMap<String, Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing `name`. Starting a timer that is already running restarts it.
    pub fn start(&mut self, name: impl Into<String>) {
        self.running.insert(name.into(), Instant::now());
    }

    /// Stop timing `name` and record the elapsed duration.
    ///
    /// Returns `None` (and logs a warning) when `name` was never started.
    pub fn stop(&mut self, name: &str) -> Option<Duration> {
        let Some(started) = self.running.remove(name) else {
            warn!(timer = name, "Timer stopped without being started");
            return None;
        };
        let elapsed = started.elapsed();
        self.record(name, elapsed);
        Some(elapsed)
    }

    /// Record a duration measured elsewhere.
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        match self.recorded.get_mut(name) {
            Some(durations) => durations.push(elapsed),
            None => {
                self.recorded.insert(name.to_string(), vec![elapsed]);
            }
        }
    }

    /// Run `f` and record how long it took under `name`.
    pub fn time<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(name, started.elapsed());
        out
    }

    /// All durations recorded under `name`, in recording order.
    pub fn durations(&self, name: &str) -> &[Duration] {
        self.recorded.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of times `name` was recorded.
    pub fn count(&self, name: &str) -> usize {
        self.durations(name).len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Drop everything recorded so far.
    pub fn reset(&mut self) {
        self.recorded.clear();
        self.running.clear();
    }

    /// Aggregate the recorded durations, most expensive first.
    pub fn summary(&self) -> TimerSummary {
        let mut entries: Vec<TimerEntry> = self
            .recorded
            .iter()
            .map(|(name, durations)| {
                let total: Duration = durations.iter().sum();
                let max = durations.iter().max().copied().unwrap_or_default();
                let mean = total / durations.len().max(1) as u32;
                TimerEntry {
                    name: name.clone(),
                    count: durations.len(),
                    total,
                    mean,
                    max,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        TimerSummary { entries }
    }
}

/// Aggregated timings for one name.
#[derive(Debug, Clone, Serialize)]
pub struct TimerEntry {
    pub name: String,
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub max: Duration,
}

/// Snapshot of a [`Timer`], sorted by total time descending.
#[derive(Debug, Clone, Serialize)]
pub struct TimerSummary {
    pub entries: Vec<TimerEntry>,
}

impl TimerSummary {
    pub fn get(&self, name: &str) -> Option<&TimerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl fmt::Display for TimerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(0)
            .max("name".len());
        writeln!(
            f,
            "{:<width$}  {:>7}  {:>12}  {:>12}  {:>12}",
            "name", "count", "total", "mean", "max"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "{:<width$}  {:>7}  {:>12}  {:>12}  {:>12}",
                e.name,
                e.count,
                format!("{:.3?}", e.total),
                format!("{:.3?}", e.mean),
                format!("{:.3?}", e.max),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_records() {
        let mut timer = Timer::new();
        timer.start("train.step");
        assert!(timer.is_running("train.step"));
        let elapsed = timer.stop("train.step");
        assert!(elapsed.is_some());
        assert!(!timer.is_running("train.step"));
        assert_eq!(timer.count("train.step"), 1);
    }

    #[test]
    fn test_stop_without_start_is_ignored() {
        let mut timer = Timer::new();
        assert!(timer.stop("never").is_none());
        assert!(timer.is_empty());
    }

    #[test]
    fn test_time_returns_closure_value() {
        let mut timer = Timer::new();
        let v = timer.time("compute", || 21 * 2);
        assert_eq!(v, 42);
        assert_eq!(timer.count("compute"), 1);
    }

    #[test]
    fn test_summary_sorted_by_total() {
        let mut timer = Timer::new();
        timer.record("fast", Duration::from_millis(1));
        timer.record("slow", Duration::from_millis(30));
        timer.record("slow", Duration::from_millis(10));

        let summary = timer.summary();
        assert_eq!(summary.entries[0].name, "slow");
        let slow = summary.get("slow").unwrap();
        assert_eq!(slow.count, 2);
        assert_eq!(slow.total, Duration::from_millis(40));
        assert_eq!(slow.mean, Duration::from_millis(20));
        assert_eq!(slow.max, Duration::from_millis(30));

        let table = summary.to_string();
        assert!(table.starts_with("name"));
        assert!(table.contains("fast"));
    }

    #[test]
    fn test_reset() {
        let mut timer = Timer::new();
        timer.record("a", Duration::from_millis(1));
        timer.start("b");
        timer.reset();
        assert!(timer.is_empty());
        assert!(!timer.is_running("b"));
    }
}
