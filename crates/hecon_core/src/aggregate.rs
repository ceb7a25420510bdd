//! Economic aggregation: discounted lifetime cost and QALYs
//!
//! Converts a cohort trace into two scalars per strategy per iteration.
//! Discounting compounds the jurisdiction's annual rate at the cycle
//! frequency; annual utilities are converted to the cycle length; one-time
//! costs land at the cycle they occur, scaled by the fraction of the cohort
//! still alive there.

use crate::model::{CohortTrace, StateSpace, StrategyArm, StrategyOutcome};

/// Precomputed per-cycle discount factors.
///
/// `factor(c) = (1 + annual_rate)^(-c / cycles_per_year)` — monthly
/// compounding of the annual rate for the default 12-cycle year.
#[derive(Debug, Clone)]
pub struct DiscountCurve {
    factors: Vec<f64>,
}

impl DiscountCurve {
    #[must_use]
    pub fn new(annual_rate: f64, cycles_per_year: f64, horizon_cycles: usize) -> Self {
        let factors = (0..horizon_cycles)
            .map(|c| (1.0 + annual_rate).powf(-(c as f64) / cycles_per_year))
            .collect();
        Self { factors }
    }

    #[must_use]
    pub fn factor(&self, cycle: usize) -> f64 {
        self.factors[cycle]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// Accumulate a cohort trace into discounted lifetime cost and QALYs
#[must_use]
pub fn aggregate(
    trace: &CohortTrace,
    strategy: &StrategyArm,
    states: &StateSpace,
    values: &[f64],
    discount: &DiscountCurve,
    cycles_per_year: f64,
) -> StrategyOutcome {
    let n_states = states.len();
    let death = states.death();

    // Per-state quantities are draw-constant, so evaluate them once
    let state_costs: Vec<f64> = strategy
        .per_cycle_costs
        .iter()
        .map(|v| v.eval(values))
        .collect();
    let cycle_utilities: Vec<f64> = strategy
        .annual_utilities
        .iter()
        .map(|v| v.eval(values) / cycles_per_year)
        .collect();

    let mut cost = 0.0;
    let mut qalys = 0.0;
    for (cycle, occupancy) in trace.iter().enumerate() {
        let factor = discount.factor(cycle);
        let mut cycle_cost = 0.0;
        let mut cycle_qaly = 0.0;
        for state in 0..n_states {
            cycle_cost += occupancy[state] * state_costs[state];
            cycle_qaly += occupancy[state] * cycle_utilities[state];
        }
        cost += factor * cycle_cost;
        qalys += factor * cycle_qaly;
    }

    for (cycle, amount) in &strategy.one_time_costs {
        if *cycle < trace.cycles() {
            let alive = 1.0 - trace.at(*cycle)[death];
            cost += discount.factor(*cycle) * amount.eval(values) * alive;
        }
    }

    StrategyOutcome { cost, qalys }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_curve_monthly_compounding() {
        let curve = DiscountCurve::new(0.05, 12.0, 25);
        assert!((curve.factor(0) - 1.0).abs() < 1e-12);
        // Twelve cycles out equals one full year of discounting
        assert!((curve.factor(12) - 1.0 / 1.05).abs() < 1e-12);
        assert!((curve.factor(24) - 1.0 / (1.05 * 1.05)).abs() < 1e-12);
    }
}
