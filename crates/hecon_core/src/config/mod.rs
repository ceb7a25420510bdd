//! Run and model configuration
//!
//! Everything the engine needs is loaded into explicit immutable structs
//! before any simulation starts: the `ModelSpec` (states, parameters,
//! strategies) compiles into a `ModelRegistry`, and the `RunConfig` carries
//! iteration counts, seeds, horizons and jurisdiction-specific discount
//! rates. Validation is eager; a malformed configuration never reaches the
//! cycle loop.
//!
//! # Builder DSL
//!
//! For embedding code and tests, the fluent builder assembles a model
//! without writing the spec structs by hand:
//!
//! ```ignore
//! use hecon_core::config::{ModelBuilder, StrategyBuilder};
//! use hecon_core::model::{Distribution, RelapseProfile, ValueRef};
//!
//! let registry = ModelBuilder::new()
//!     .parameter("p_remission_esk", Distribution::Beta { alpha: 48.0, beta: 52.0 })
//!     .parameter("c_esketamine", Distribution::Gamma { shape: 16.0, scale: 50.0 })
//!     .strategy(
//!         StrategyBuilder::new("Esketamine")
//!             .remission(ValueRef::param("p_remission_esk"))
//!             .relapse_waning(ValueRef::constant(0.08), ValueRef::constant(0.02), 6)
//!             .excess_mortality(ValueRef::constant(0.0005))
//!             .state_costs([ValueRef::param("c_esketamine"), ValueRef::constant(40.0),
//!                           ValueRef::constant(0.0)])
//!             .state_utilities([ValueRef::constant(0.57), ValueRef::constant(0.81),
//!                               ValueRef::constant(0.0)]),
//!     )
//!     .reference("Esketamine")
//!     .build()?;
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{
    MortalityTable, ParameterRegistry, ParameterSpec, StateSpace, StrategyArm, StrategyArmSpec,
    StrategyId,
};

pub mod builder;

pub use builder::{ModelBuilder, StrategyBuilder};

fn default_cycles_per_year() -> u32 {
    12
}

fn default_voi_cv_threshold() -> f64 {
    0.1
}

fn default_voi_min_iterations() -> usize {
    30
}

/// Willingness-to-pay grid specification: lower bound, upper bound, step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WtpGridSpec {
    pub lower: f64,
    pub upper: f64,
    pub step: f64,
}

impl WtpGridSpec {
    /// Expand to the ordered threshold sequence, bounds inclusive
    pub fn expand(&self) -> Result<WtpGrid, ValidationError> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.step.is_finite()) {
            return Err(ValidationError::Config(
                "WTP grid bounds and step must be finite".to_string(),
            ));
        }
        if self.lower < 0.0 || self.upper < self.lower || self.step <= 0.0 {
            return Err(ValidationError::Config(format!(
                "invalid WTP grid: lower {}, upper {}, step {}",
                self.lower, self.upper, self.step
            )));
        }
        let n = ((self.upper - self.lower) / self.step).floor() as usize + 1;
        let values = (0..n).map(|i| self.lower + self.step * i as f64).collect();
        Ok(WtpGrid { values })
    }
}

/// Ordered willingness-to-pay thresholds, shared read-only across every
/// metric computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WtpGrid {
    values: Vec<f64>,
}

impl WtpGrid {
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Grid point closest to a target threshold
    #[must_use]
    pub fn nearest(&self, wtp: f64) -> Option<usize> {
        if self.values.is_empty() {
            return None;
        }
        let mut best = 0;
        let mut best_dist = (self.values[0] - wtp).abs();
        for (i, &w) in self.values.iter().enumerate().skip(1) {
            let dist = (w - wtp).abs();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        Some(best)
    }
}

/// What to do when a single iteration fails mid-run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IterationFailurePolicy {
    /// Abort the whole run on the first failing iteration
    #[default]
    Abort,
    /// Record the failure and continue, aborting only when the failed
    /// fraction exceeds the tolerance
    SkipAndCount { max_failed_fraction: f64 },
}

/// EVPPI estimator choice.
///
/// The binned estimator reuses the existing draw collection (no extra
/// simulation) but only supports single-parameter groups and biases toward
/// zero as bins thin out; nested Monte Carlo re-simulates an inner loop per
/// outer draw, trading quadratic cost for vanishing bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvppiMethod {
    Binned { bins: usize },
    NestedMonteCarlo { outer: usize, inner: usize },
}

impl Default for EvppiMethod {
    fn default() -> Self {
        EvppiMethod::Binned { bins: 20 }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Monte Carlo iteration count
    pub iterations: u64,
    /// Base seed; iteration `i` runs on `base_seed + i`
    pub seed: u64,
    /// Time horizon in cycles (months)
    pub horizon_cycles: usize,
    #[serde(default = "default_cycles_per_year")]
    pub cycles_per_year: u32,
    /// Annual discount rate per jurisdiction (e.g. "US" -> 0.03, "UK" -> 0.035)
    pub discount_rates: HashMap<String, f64>,
    /// Jurisdiction whose discount rate applies to this run
    pub jurisdiction: String,
    pub wtp: WtpGridSpec,
    /// Policy-relevant threshold for population value-of-information
    pub policy_wtp: f64,
    /// Patients eligible for treatment per year
    pub eligible_population: f64,
    #[serde(default)]
    pub failure_policy: IterationFailurePolicy,
    #[serde(default)]
    pub evppi_method: EvppiMethod,
    /// Coefficient-of-variation ceiling before a value-of-information
    /// estimate is flagged low precision
    #[serde(default = "default_voi_cv_threshold")]
    pub voi_cv_threshold: f64,
    #[serde(default = "default_voi_min_iterations")]
    pub voi_min_iterations: usize,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.iterations == 0 {
            return Err(ValidationError::Config(
                "iteration count must be positive".to_string(),
            ));
        }
        if self.horizon_cycles == 0 {
            return Err(ValidationError::Config(
                "time horizon must be at least one cycle".to_string(),
            ));
        }
        if self.cycles_per_year == 0 {
            return Err(ValidationError::Config(
                "cycles per year must be positive".to_string(),
            ));
        }
        if self.eligible_population < 0.0 {
            return Err(ValidationError::Config(
                "eligible population must be non-negative".to_string(),
            ));
        }
        if let IterationFailurePolicy::SkipAndCount { max_failed_fraction } = self.failure_policy
            && !(0.0..=1.0).contains(&max_failed_fraction)
        {
            return Err(ValidationError::Config(
                "failure tolerance must lie in [0, 1]".to_string(),
            ));
        }
        self.discount_rate()?;
        self.wtp.expand()?;
        Ok(())
    }

    /// Annual discount rate for the configured jurisdiction
    pub fn discount_rate(&self) -> Result<f64, ValidationError> {
        self.discount_rates
            .get(&self.jurisdiction)
            .copied()
            .ok_or_else(|| {
                ValidationError::Config(format!(
                    "no discount rate declared for jurisdiction {:?}",
                    self.jurisdiction
                ))
            })
    }
}

fn default_entry_state() -> usize {
    0
}

fn default_start_age() -> f64 {
    40.0
}

/// Declared model: states, demographics, parameters and strategy arms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub states: Vec<String>,
    pub death_state: usize,
    /// State the cohort starts in (all mass at cycle 0)
    #[serde(default = "default_entry_state")]
    pub entry_state: usize,
    /// Cohort age at cycle 0, for background mortality lookups
    #[serde(default = "default_start_age")]
    pub start_age: f64,
    pub mortality: MortalityTable,
    pub parameters: Vec<ParameterSpec>,
    pub strategies: Vec<StrategyArmSpec>,
    /// Name of the reference strategy for incremental analysis
    pub reference: String,
}

/// The compiled, validated model: built once at configuration-load time and
/// shared read-only across the parallel region
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    pub states: StateSpace,
    pub entry_state: usize,
    pub start_age: f64,
    pub mortality: MortalityTable,
    pub parameters: ParameterRegistry,
    pub strategies: Vec<StrategyArm>,
    pub reference: StrategyId,
}

impl ModelRegistry {
    /// Validate the declared model and compile every strategy arm.
    ///
    /// Completeness is checked here — every strategy has transition, cost
    /// and utility definitions covering the declared states, every
    /// referenced parameter exists, every parameter owner names a declared
    /// strategy — so nothing fails after simulation work begins.
    pub fn build(spec: &ModelSpec) -> Result<Self, ValidationError> {
        let states = StateSpace::new(spec.states.clone(), spec.death_state)?;
        if spec.entry_state >= states.len() {
            return Err(ValidationError::InvalidStateSpace(format!(
                "entry state index {} out of range for {} states",
                spec.entry_state,
                states.len()
            )));
        }
        if !spec.start_age.is_finite() || spec.start_age < 0.0 {
            return Err(ValidationError::Config(format!(
                "cohort start age {} must be non-negative and finite",
                spec.start_age
            )));
        }
        spec.mortality.validate()?;

        let parameters = ParameterRegistry::from_specs(&spec.parameters)?;

        for param in parameters.iter() {
            if let crate::model::ParameterOwner::Strategy { name } = &param.owner
                && !spec.strategies.iter().any(|s| &s.name == name)
            {
                return Err(ValidationError::UnknownStrategy(name.clone()));
            }
        }

        let mut strategies = Vec::with_capacity(spec.strategies.len());
        for (i, arm_spec) in spec.strategies.iter().enumerate() {
            if spec.strategies[..i].iter().any(|s| s.name == arm_spec.name) {
                return Err(ValidationError::DuplicateStrategy(arm_spec.name.clone()));
            }
            strategies.push(StrategyArm::compile(
                StrategyId(i as u16),
                arm_spec,
                &states,
                &parameters,
            )?);
        }
        if strategies.is_empty() {
            return Err(ValidationError::Config(
                "at least one strategy required".to_string(),
            ));
        }

        let reference = strategies
            .iter()
            .find(|s| s.name == spec.reference)
            .map(|s| s.id)
            .ok_or_else(|| ValidationError::UnknownStrategy(spec.reference.clone()))?;

        Ok(Self {
            states,
            entry_state: spec.entry_state,
            start_age: spec.start_age,
            mortality: spec.mortality.clone(),
            parameters,
            strategies,
            reference,
        })
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name.clone()).collect()
    }

    #[must_use]
    pub fn strategy_by_name(&self, name: &str) -> Option<&StrategyArm> {
        self.strategies.iter().find(|s| s.name == name)
    }

    /// Index of the reference strategy in registry order
    #[must_use]
    pub fn reference_index(&self) -> usize {
        self.reference.index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wtp_grid_expansion() {
        let grid = WtpGridSpec {
            lower: 0.0,
            upper: 100_000.0,
            step: 25_000.0,
        }
        .expand()
        .unwrap();
        assert_eq!(
            grid.values(),
            &[0.0, 25_000.0, 50_000.0, 75_000.0, 100_000.0]
        );
        assert_eq!(grid.nearest(60_000.0), Some(2));
    }

    #[test]
    fn test_wtp_grid_rejects_bad_spec() {
        assert!(
            WtpGridSpec {
                lower: 0.0,
                upper: 1_000.0,
                step: 0.0,
            }
            .expand()
            .is_err()
        );
        assert!(
            WtpGridSpec {
                lower: 5_000.0,
                upper: 1_000.0,
                step: 100.0,
            }
            .expand()
            .is_err()
        );
    }
}
