//! Progress reporting shared across rayon workers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Progress update handed to the caller's callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub current_symbol: String,
    pub percent: f64,
    pub elapsed_secs: f64,
    /// `None` until at least one unit is done.
    pub eta_secs: Option<f64>,
}

/// Callback type accepted by scans and backtests. Called from worker threads.
pub type ProgressCallback<'a> = &'a (dyn Fn(&Progress) + Sync);

/// Atomic completed-unit counter with percentage and ETA.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Mark one unit done and return the resulting snapshot.
    pub fn advance(&self, symbol: &str) -> Progress {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.snapshot_at(completed, symbol)
    }

    pub fn snapshot(&self) -> Progress {
        self.snapshot_at(self.completed(), "")
    }

    fn snapshot_at(&self, completed: usize, symbol: &str) -> Progress {
        let elapsed = self.started.elapsed().as_secs_f64();
        Progress {
            completed,
            total: self.total,
            current_symbol: symbol.to_string(),
            percent: percent(completed, self.total),
            elapsed_secs: elapsed,
            eta_secs: eta(completed, self.total, elapsed),
        }
    }
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (completed.min(total) as f64 / total as f64) * 100.0
    }
}

/// Linear extrapolation from the average time per completed unit.
fn eta(completed: usize, total: usize, elapsed_secs: f64) -> Option<f64> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as f64;
    Some(elapsed_secs / completed as f64 * remaining)
}
