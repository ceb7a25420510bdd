//! Probabilistic sensitivity analysis outputs
//!
//! A `SimulationDraw` is one Monte Carlo iteration's realized parameter
//! values plus the discounted outcomes of every strategy under them. The
//! draw collection is the unit every downstream calculator (decision
//! metrics, value of information) consumes in bulk.

use serde::{Deserialize, Serialize};

/// Discounted lifetime outcomes for one strategy under one draw
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub cost: f64,
    pub qalys: f64,
}

impl StrategyOutcome {
    /// Net monetary benefit at a willingness-to-pay threshold
    #[must_use]
    pub fn nmb(&self, wtp: f64) -> f64 {
        wtp * self.qalys - self.cost
    }
}

/// One Monte Carlo iteration: realized parameter values (registry order)
/// and per-strategy outcomes (registry order)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationDraw {
    pub iteration: u64,
    pub values: Vec<f64>,
    pub outcomes: Vec<StrategyOutcome>,
}

/// An iteration skipped under the skip-and-count failure policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedIteration {
    pub iteration: u64,
    pub reason: String,
}

/// Completed probabilistic sensitivity analysis.
///
/// Draws are sorted by iteration index, so aggregate statistics are
/// invariant to the order in which worker threads finished them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsaResult {
    pub draws: Vec<SimulationDraw>,
    pub skipped: Vec<SkippedIteration>,
}

impl PsaResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Mean cost and QALYs per strategy across all draws
    #[must_use]
    pub fn mean_outcomes(&self) -> Vec<StrategyOutcome> {
        let Some(first) = self.draws.first() else {
            return Vec::new();
        };
        let n_strategies = first.outcomes.len();
        let mut sums = vec![StrategyOutcome { cost: 0.0, qalys: 0.0 }; n_strategies];
        for draw in &self.draws {
            for (sum, outcome) in sums.iter_mut().zip(&draw.outcomes) {
                sum.cost += outcome.cost;
                sum.qalys += outcome.qalys;
            }
        }
        let n = self.draws.len() as f64;
        for sum in &mut sums {
            sum.cost /= n;
            sum.qalys /= n;
        }
        sums
    }
}

/// A resumable snapshot of a partially completed analysis.
///
/// Carries enough of the run configuration to detect a resume against a
/// different setup, which would otherwise double-count or misattribute
/// draws.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsaCheckpoint {
    pub base_seed: u64,
    pub horizon_cycles: usize,
    pub total_iterations: u64,
    pub draws: Vec<SimulationDraw>,
    pub skipped: Vec<SkippedIteration>,
}

/// Outcome of a resumable run: either everything finished, or cancellation
/// left a checkpoint holding the completed draws
#[derive(Debug, Clone)]
pub enum PsaRun {
    Complete(PsaResult),
    Interrupted(PsaCheckpoint),
}
