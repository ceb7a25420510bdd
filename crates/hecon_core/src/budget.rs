//! Budget impact projection
//!
//! Composes the deterministic per-patient costs with multi-year adoption
//! curves: population cost per year and strategy, the delta against the
//! pre-adoption baseline mix, and the cumulative impact. The configuration
//! is validated in full before any projection runs.

use serde::{Deserialize, Serialize};

use crate::config::ModelRegistry;
use crate::error::{AdoptionOverflowError, Result, ValidationError};
use crate::model::StrategyOutcome;

/// Tolerance when checking that yearly shares do not exceed 1
const SHARE_EPSILON: f64 = 1e-9;

/// Per-strategy market shares across the projection years
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionCurve {
    pub strategy: String,
    /// Market-share fraction per projection year, each in [0, 1]
    pub by_year: Vec<f64>,
}

/// Complete budget-impact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionSchedule {
    /// Eligible patients per projection year
    pub eligible_population: Vec<f64>,
    pub curves: Vec<AdoptionCurve>,
    /// Strategy holding the whole market before adoption; any share not
    /// captured by the curves in a given year stays here
    pub baseline_strategy: String,
}

impl AdoptionSchedule {
    #[must_use]
    pub fn years(&self) -> usize {
        self.eligible_population.len()
    }

    /// Validate shares, lengths and strategy references.
    ///
    /// Shares summing past 1 in any year reject the configuration outright
    /// rather than being silently renormalized.
    pub fn validate(&self, registry: &ModelRegistry) -> Result<()> {
        let years = self.years();
        if years == 0 {
            return Err(ValidationError::Config(
                "budget impact requires at least one projection year".to_string(),
            )
            .into());
        }
        if registry.strategy_by_name(&self.baseline_strategy).is_none() {
            return Err(ValidationError::UnknownStrategy(self.baseline_strategy.clone()).into());
        }
        for curve in &self.curves {
            if registry.strategy_by_name(&curve.strategy).is_none() {
                return Err(ValidationError::UnknownStrategy(curve.strategy.clone()).into());
            }
            if curve.by_year.len() != years {
                return Err(ValidationError::Config(format!(
                    "adoption curve for {:?} covers {} years, expected {}",
                    curve.strategy,
                    curve.by_year.len(),
                    years
                ))
                .into());
            }
            for (year, share) in curve.by_year.iter().enumerate() {
                if !(0.0..=1.0).contains(share) {
                    return Err(ValidationError::Config(format!(
                        "adoption share {share} for {:?} in year {year} outside [0, 1]",
                        curve.strategy
                    ))
                    .into());
                }
            }
        }
        for year in 0..years {
            let total: f64 = self.curves.iter().map(|c| c.by_year[year]).sum();
            if total > 1.0 + SHARE_EPSILON {
                return Err(AdoptionOverflowError {
                    year,
                    total_share: total,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// One projection year of the budget-impact table
#[derive(Debug, Clone, Serialize)]
pub struct BudgetImpactRow {
    pub year: usize,
    /// Population cost per curve strategy, plus the residual baseline share,
    /// in curve order followed by the baseline entry
    pub strategy_costs: Vec<f64>,
    pub total_cost: f64,
    /// Cost of the pre-adoption mix (everyone on the baseline strategy)
    pub baseline_cost: f64,
    pub impact: f64,
    pub cumulative_impact: f64,
}

/// Project population-level budget impact across the schedule's years.
///
/// Uses the deterministic per-patient costs, not the PSA draws.
pub fn project(
    registry: &ModelRegistry,
    deterministic: &[StrategyOutcome],
    schedule: &AdoptionSchedule,
) -> Result<Vec<BudgetImpactRow>> {
    schedule.validate(registry)?;
    if deterministic.len() != registry.strategies.len() {
        return Err(ValidationError::Config(format!(
            "{} deterministic outcomes for {} strategies",
            deterministic.len(),
            registry.strategies.len()
        ))
        .into());
    }

    let cost_of = |name: &str| -> f64 {
        let idx = registry
            .strategy_by_name(name)
            .map(|s| s.id.index())
            .unwrap_or(0);
        deterministic[idx].cost
    };
    let baseline_per_patient = cost_of(&schedule.baseline_strategy);

    let mut rows = Vec::with_capacity(schedule.years());
    let mut cumulative = 0.0;
    for year in 0..schedule.years() {
        let population = schedule.eligible_population[year];

        let mut strategy_costs: Vec<f64> = schedule
            .curves
            .iter()
            .map(|curve| population * curve.by_year[year] * cost_of(&curve.strategy))
            .collect();

        // Market share not captured by the curves stays on the baseline mix
        let adopted: f64 = schedule.curves.iter().map(|c| c.by_year[year]).sum();
        let residual = (1.0 - adopted).max(0.0);
        strategy_costs.push(population * residual * baseline_per_patient);

        let total_cost: f64 = strategy_costs.iter().sum();
        let baseline_cost = population * baseline_per_patient;
        let impact = total_cost - baseline_cost;
        cumulative += impact;

        rows.push(BudgetImpactRow {
            year,
            strategy_costs,
            total_cost,
            baseline_cost,
            impact,
            cumulative_impact: cumulative,
        });
    }

    Ok(rows)
}
