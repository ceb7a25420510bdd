//! Fluent builders for assembling models
//!
//! The builders resolve names and fill defaults at `build()` time, so a test
//! or embedding application can declare a model in a few chained calls
//! without constructing the spec structs by hand.

use crate::config::{ModelRegistry, ModelSpec};
use crate::error::ValidationError;
use crate::model::{
    CostSpec, Distribution, MortalityTable, OneTimeCost, ParameterOwner, ParameterSpec,
    RelapseProfile, StateSpace, StrategyArmSpec, TransitionSpec, UtilitySpec, ValueRef,
};

/// Builder for one strategy arm
#[derive(Debug, Clone)]
pub struct StrategyBuilder {
    name: String,
    remission: Option<ValueRef>,
    relapse: Option<RelapseProfile>,
    excess_mortality: Option<ValueRef>,
    matrix: Option<Vec<Vec<ValueRef>>>,
    per_cycle_costs: Vec<ValueRef>,
    one_time: Vec<OneTimeCost>,
    utilities: Vec<ValueRef>,
}

impl StrategyBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remission: None,
            relapse: None,
            excess_mortality: None,
            matrix: None,
            per_cycle_costs: Vec::new(),
            one_time: Vec::new(),
            utilities: Vec::new(),
        }
    }

    /// Per-cycle probability of moving from active illness to remission
    #[must_use]
    pub fn remission(mut self, value: ValueRef) -> Self {
        self.remission = Some(value);
        self
    }

    /// Flat per-cycle relapse hazard out of remission
    #[must_use]
    pub fn relapse(mut self, hazard: ValueRef) -> Self {
        self.relapse = Some(RelapseProfile::Constant { hazard });
        self
    }

    /// Elevated relapse hazard for the first `window_cycles` months since
    /// remission, dropping to `late` afterward
    #[must_use]
    pub fn relapse_waning(mut self, early: ValueRef, late: ValueRef, window_cycles: usize) -> Self {
        self.relapse = Some(RelapseProfile::Waning {
            early,
            late,
            window_cycles,
        });
        self
    }

    /// Excess disease mortality per cycle while in the active-illness state
    #[must_use]
    pub fn excess_mortality(mut self, value: ValueRef) -> Self {
        self.excess_mortality = Some(value);
        self
    }

    /// Explicit transition matrix over the declared states; overrides the
    /// illness/remission structure
    #[must_use]
    pub fn matrix(mut self, rows: Vec<Vec<ValueRef>>) -> Self {
        self.matrix = Some(rows);
        self
    }

    /// Per-cycle cost for each declared state, in state order
    #[must_use]
    pub fn state_costs(mut self, costs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.per_cycle_costs = costs.into_iter().collect();
        self
    }

    /// One-time cost applied at a specific cycle
    #[must_use]
    pub fn one_time_cost(mut self, cycle: usize, amount: ValueRef) -> Self {
        self.one_time.push(OneTimeCost { cycle, amount });
        self
    }

    /// Annual utility for each declared state, in state order
    #[must_use]
    pub fn state_utilities(mut self, utilities: impl IntoIterator<Item = ValueRef>) -> Self {
        self.utilities = utilities.into_iter().collect();
        self
    }

    fn into_spec(self) -> Result<StrategyArmSpec, ValidationError> {
        let transition = if let Some(rows) = self.matrix {
            TransitionSpec::Matrix { rows }
        } else {
            let remission = self.remission.ok_or_else(|| {
                ValidationError::Config(format!(
                    "strategy {:?}: remission probability not declared",
                    self.name
                ))
            })?;
            let relapse = self.relapse.ok_or_else(|| {
                ValidationError::Config(format!(
                    "strategy {:?}: relapse profile not declared",
                    self.name
                ))
            })?;
            let excess_mortality = self
                .excess_mortality
                .unwrap_or(ValueRef::Const { value: 0.0 });
            TransitionSpec::IllnessRemission {
                remission,
                relapse,
                excess_mortality,
            }
        };
        Ok(StrategyArmSpec {
            name: self.name,
            transition,
            costs: CostSpec {
                per_cycle: self.per_cycle_costs,
                one_time: self.one_time,
            },
            utilities: UtilitySpec {
                annual: self.utilities,
            },
        })
    }
}

/// Builder for a complete model specification
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    states: Vec<String>,
    death_state: usize,
    entry_state: usize,
    start_age: f64,
    mortality: MortalityTable,
    parameters: Vec<ParameterSpec>,
    strategies: Vec<StrategyBuilder>,
    reference: Option<String>,
}

impl ModelBuilder {
    /// Start from the default depression state space with no background
    /// mortality
    #[must_use]
    pub fn new() -> Self {
        let states = StateSpace::depression();
        Self {
            death_state: states.death(),
            states: states.names().to_vec(),
            entry_state: 0,
            start_age: 40.0,
            mortality: MortalityTable {
                start_age: 0,
                annual_probability: Vec::new(),
            },
            parameters: Vec::new(),
            strategies: Vec::new(),
            reference: None,
        }
    }

    /// Replace the declared state space
    #[must_use]
    pub fn states(mut self, names: &[&str], death_state: usize) -> Self {
        self.states = names.iter().map(|s| (*s).to_string()).collect();
        self.death_state = death_state;
        self
    }

    #[must_use]
    pub fn entry_state(mut self, state: usize) -> Self {
        self.entry_state = state;
        self
    }

    #[must_use]
    pub fn start_age(mut self, age: f64) -> Self {
        self.start_age = age;
        self
    }

    #[must_use]
    pub fn mortality(mut self, table: MortalityTable) -> Self {
        self.mortality = table;
        self
    }

    /// Declare a shared parameter
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, distribution: Distribution) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            owner: ParameterOwner::Shared,
            distribution,
            correlation_group: None,
            jurisdiction: None,
        });
        self
    }

    /// Declare a parameter owned by one strategy
    #[must_use]
    pub fn strategy_parameter(
        mut self,
        name: impl Into<String>,
        strategy: impl Into<String>,
        distribution: Distribution,
    ) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            owner: ParameterOwner::Strategy {
                name: strategy.into(),
            },
            distribution,
            correlation_group: None,
            jurisdiction: None,
        });
        self
    }

    /// Declare a parameter whose draws share a uniform with every other
    /// member of `group`, preserving rank correlation
    #[must_use]
    pub fn correlated_parameter(
        mut self,
        name: impl Into<String>,
        distribution: Distribution,
        group: impl Into<String>,
    ) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            owner: ParameterOwner::Shared,
            distribution,
            correlation_group: Some(group.into()),
            jurisdiction: None,
        });
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: StrategyBuilder) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Name the reference strategy for incremental analysis; defaults to the
    /// first declared strategy
    #[must_use]
    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.reference = Some(name.into());
        self
    }

    /// Assemble the declared model spec
    pub fn spec(self) -> Result<ModelSpec, ValidationError> {
        let reference = match self.reference {
            Some(name) => name,
            None => self
                .strategies
                .first()
                .map(|s| s.name.clone())
                .ok_or_else(|| {
                    ValidationError::Config("at least one strategy required".to_string())
                })?,
        };
        let strategies: Result<Vec<_>, _> = self
            .strategies
            .into_iter()
            .map(StrategyBuilder::into_spec)
            .collect();
        Ok(ModelSpec {
            states: self.states,
            death_state: self.death_state,
            entry_state: self.entry_state,
            start_age: self.start_age,
            mortality: self.mortality,
            parameters: self.parameters,
            strategies: strategies?,
            reference,
        })
    }

    /// Assemble and compile into a validated registry
    pub fn build(self) -> Result<ModelRegistry, ValidationError> {
        ModelRegistry::build(&self.spec()?)
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
