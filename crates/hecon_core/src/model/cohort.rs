//! Cohort occupancy vectors, transition matrices and background mortality

use serde::{Deserialize, Serialize};

use crate::error::{InvalidTransitionError, ValidationError};

/// Tolerance for the row-stochastic invariant
pub const ROW_SUM_EPSILON: f64 = 1e-9;

/// Entries below this are treated as genuinely negative rather than
/// floating-point noise
const NEGATIVE_EPSILON: f64 = -1e-12;

/// A dense row-major transition matrix for one cycle
#[derive(Debug, Clone)]
pub struct TransitionMatrix {
    n: usize,
    data: Vec<f64>,
}

impl TransitionMatrix {
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            data.extend(row);
        }
        Self { n, data }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// Check every row against the row-stochastic invariant, clamping
    /// floating-point noise and rejecting real violations.
    pub fn validate(&mut self, strategy: &str, cycle: usize) -> Result<(), InvalidTransitionError> {
        for i in 0..self.n {
            let row = &mut self.data[i * self.n..(i + 1) * self.n];
            let mut sum = 0.0;
            for p in row.iter_mut() {
                if *p < NEGATIVE_EPSILON {
                    return Err(InvalidTransitionError {
                        strategy: strategy.to_string(),
                        cycle,
                        row: i,
                        row_sum: *p,
                        reason: "negative transition probability",
                    });
                }
                if *p < 0.0 {
                    *p = 0.0;
                }
                sum += *p;
            }
            if (sum - 1.0).abs() > ROW_SUM_EPSILON {
                return Err(InvalidTransitionError {
                    strategy: strategy.to_string(),
                    cycle,
                    row: i,
                    row_sum: sum,
                    reason: "row does not sum to 1",
                });
            }
        }
        Ok(())
    }

    /// `out = state × M`
    pub fn apply(&self, state: &[f64], out: &mut [f64]) {
        debug_assert_eq!(state.len(), self.n);
        debug_assert_eq!(out.len(), self.n);
        out.fill(0.0);
        for (i, &mass) in state.iter().enumerate() {
            if mass == 0.0 {
                continue;
            }
            let row = self.row(i);
            for (j, &p) in row.iter().enumerate() {
                out[j] += mass * p;
            }
        }
    }
}

/// Occupancy fractions over the declared states for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CohortState {
    occupancy: Vec<f64>,
}

impl CohortState {
    /// All mass in the entry state
    #[must_use]
    pub fn seeded(n_states: usize, entry: usize) -> Self {
        let mut occupancy = vec![0.0; n_states];
        occupancy[entry] = 1.0;
        Self { occupancy }
    }

    #[must_use]
    pub fn occupancy(&self) -> &[f64] {
        &self.occupancy
    }

    pub fn occupancy_mut(&mut self) -> &mut [f64] {
        &mut self.occupancy
    }

    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.occupancy.iter().sum()
    }
}

/// Per-cycle occupancy over the declared states.
///
/// One trace exists per strategy per iteration and is dropped as soon as the
/// aggregator has consumed it, so memory does not grow with iteration count.
#[derive(Debug, Clone)]
pub struct CohortTrace {
    occupancy: Vec<Vec<f64>>,
}

impl CohortTrace {
    #[must_use]
    pub fn with_capacity(cycles: usize) -> Self {
        Self {
            occupancy: Vec::with_capacity(cycles),
        }
    }

    pub fn push(&mut self, occupancy: Vec<f64>) {
        self.occupancy.push(occupancy);
    }

    /// Number of recorded cycles
    #[must_use]
    pub fn cycles(&self) -> usize {
        self.occupancy.len()
    }

    /// Occupancy during cycle `c` (state held while the cycle elapses)
    #[must_use]
    pub fn at(&self, cycle: usize) -> &[f64] {
        &self.occupancy[cycle]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.occupancy.iter()
    }
}

/// Age-indexed annual background mortality probabilities.
///
/// `annual_probability[k]` applies to attained age `start_age + k`; ages past
/// the end of the table hold the last value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MortalityTable {
    pub start_age: u32,
    pub annual_probability: Vec<f64>,
}

impl MortalityTable {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (k, p) in self.annual_probability.iter().enumerate() {
            if !(0.0..=1.0).contains(p) {
                return Err(ValidationError::Config(format!(
                    "mortality probability {p} at age {} outside [0, 1]",
                    self.start_age as usize + k
                )));
            }
        }
        Ok(())
    }

    /// Annual death probability at an attained (fractional) age
    #[must_use]
    pub fn annual_at(&self, age_years: f64) -> f64 {
        if self.annual_probability.is_empty() {
            return 0.0;
        }
        let offset = (age_years - f64::from(self.start_age)).max(0.0) as usize;
        let idx = offset.min(self.annual_probability.len() - 1);
        self.annual_probability[idx]
    }

    /// Per-cycle death probability at an attained age, from the annual
    /// probability compounded at the cycle frequency
    #[must_use]
    pub fn cycle_probability(&self, age_years: f64, cycles_per_year: f64) -> f64 {
        let annual = self.annual_at(age_years);
        1.0 - (1.0 - annual).powf(1.0 / cycles_per_year)
    }
}

/// Multiplicative blend of background and excess mortality:
/// `1 - (1 - background)(1 - excess)`
#[must_use]
pub fn blend_mortality(background: f64, excess: f64) -> f64 {
    1.0 - (1.0 - background) * (1.0 - excess)
}
