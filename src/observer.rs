// src/observer.rs

use crate::bending::BendOutcome;
use log::{info, warn};

/// Snapshot handed to observers after every completed iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationProgress {
    /// Iterations completed so far (1-based).
    pub iteration: usize,
    pub max_iter: usize,
    /// Non-positive eigenvalues left in the working matrix.
    pub non_positive_count: usize,
    pub smallest_eigenvalue: f64,
}

/// Progress side channel for the bending loop.
///
/// Observers cannot influence control flow; both hooks default to no-ops.
pub trait BendObserver {
    fn on_iteration(&mut self, _progress: &IterationProgress) {}

    fn on_finish(&mut self, _outcome: &BendOutcome) {}
}

/// Discards all progress.
impl BendObserver for () {}

/// Reports progress through the `log` facade every `interval` iterations and once
/// at completion.
#[derive(Debug, Clone, Copy)]
pub struct LoggingObserver {
    interval: usize,
}

impl LoggingObserver {
    /// `interval` of 0 is treated as 1.
    pub fn new(interval: usize) -> Self {
        Self { interval: interval.max(1) }
    }

    fn reports(&self, iteration: usize) -> bool {
        iteration % self.interval == 0
    }
}

impl BendObserver for LoggingObserver {
    fn on_iteration(&mut self, progress: &IterationProgress) {
        if self.reports(progress.iteration) {
            info!(
                "Iteration {}/{}: {} non-positive eigenvalue(s), smallest {:e}",
                progress.iteration, progress.max_iter, progress.non_positive_count, progress.smallest_eigenvalue
            );
        }
    }

    fn on_finish(&mut self, outcome: &BendOutcome) {
        match outcome {
            BendOutcome::AlreadyPositiveDefinite => {
                info!("Matrix is already positive definite; no action needed.")
            }
            BendOutcome::Converged { iterations } => {
                info!("Bending converged after {} iteration(s).", iterations)
            }
            BendOutcome::Exhausted { iterations } => warn!(
                "Bending did not converge within {} iteration(s); returning the last working matrix. \
                 Inspect the final eigenvalues before use.",
                iterations
            ),
        }
    }
}

/// Keeps every progress event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub iterations: Vec<IterationProgress>,
    pub outcome: Option<BendOutcome>,
}

impl BendObserver for RecordingObserver {
    fn on_iteration(&mut self, progress: &IterationProgress) {
        self.iterations.push(*progress);
    }

    fn on_finish(&mut self, outcome: &BendOutcome) {
        self.outcome = Some(*outcome);
    }
}
