//! Treatment strategy arms: transition structure, costs and utilities
//!
//! Strategy definitions are declared as data (closed tagged enums resolved
//! against the parameter registry), then compiled into index-based forms
//! before simulation so that name lookups never happen in the cycle loop.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::ids::{ParameterId, StrategyId};
use crate::model::parameters::ParameterRegistry;

/// The declared health states of the cohort model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSpace {
    names: Vec<String>,
    death: usize,
}

impl StateSpace {
    pub fn new(names: Vec<String>, death: usize) -> Result<Self, ValidationError> {
        if names.len() < 2 {
            return Err(ValidationError::InvalidStateSpace(
                "at least two states required".to_string(),
            ));
        }
        if death >= names.len() {
            return Err(ValidationError::InvalidStateSpace(format!(
                "death state index {death} out of range for {} states",
                names.len()
            )));
        }
        Ok(Self { names, death })
    }

    /// The default depression model: active illness, remission, death
    #[must_use]
    pub fn depression() -> Self {
        Self {
            names: vec![
                "Depressed".to_string(),
                "Remission".to_string(),
                "Death".to_string(),
            ],
            death: 2,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn death(&self) -> usize {
        self.death
    }

    #[must_use]
    pub fn name(&self, state: usize) -> &str {
        &self.names[state]
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A model quantity that is either a constant or derived from a sampled
/// parameter. The analog of an amount expression: resolved by name once at
/// registry-build time, evaluated against the draw's value vector after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValueRef {
    Const { value: f64 },
    Param { name: String },
    /// `factor * inner`, e.g. unit cost times a resource-use multiplier
    Scaled { factor: f64, inner: Box<ValueRef> },
    /// `1 - inner`, handy for transition-row remainders
    Complement { inner: Box<ValueRef> },
}

impl ValueRef {
    #[must_use]
    pub fn constant(value: f64) -> Self {
        ValueRef::Const { value }
    }

    #[must_use]
    pub fn param(name: impl Into<String>) -> Self {
        ValueRef::Param { name: name.into() }
    }

    #[must_use]
    pub fn scaled(factor: f64, inner: ValueRef) -> Self {
        ValueRef::Scaled {
            factor,
            inner: Box::new(inner),
        }
    }

    #[must_use]
    pub fn complement(inner: ValueRef) -> Self {
        ValueRef::Complement {
            inner: Box::new(inner),
        }
    }

    /// Resolve parameter names to registry indices
    pub fn resolve(
        &self,
        registry: &ParameterRegistry,
        strategy: &str,
    ) -> Result<ResolvedValue, ValidationError> {
        match self {
            ValueRef::Const { value } => Ok(ResolvedValue::Const(*value)),
            ValueRef::Param { name } => registry
                .id_of(name)
                .map(ResolvedValue::Param)
                .ok_or_else(|| ValidationError::UnknownParameter {
                    reference: name.clone(),
                    strategy: strategy.to_string(),
                }),
            ValueRef::Scaled { factor, inner } => Ok(ResolvedValue::Scaled(
                *factor,
                Box::new(inner.resolve(registry, strategy)?),
            )),
            ValueRef::Complement { inner } => Ok(ResolvedValue::Complement(Box::new(
                inner.resolve(registry, strategy)?,
            ))),
        }
    }
}

/// Index-resolved form of `ValueRef`, evaluated in the hot loop
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    Const(f64),
    Param(ParameterId),
    Scaled(f64, Box<ResolvedValue>),
    Complement(Box<ResolvedValue>),
}

impl ResolvedValue {
    #[must_use]
    pub fn eval(&self, values: &[f64]) -> f64 {
        match self {
            ResolvedValue::Const(v) => *v,
            ResolvedValue::Param(id) => values[id.index()],
            ResolvedValue::Scaled(factor, inner) => factor * inner.eval(values),
            ResolvedValue::Complement(inner) => 1.0 - inner.eval(values),
        }
    }
}

/// How the per-cycle relapse hazard behaves after remission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelapseProfile {
    /// Same hazard at every month since remission
    Constant { hazard: ValueRef },
    /// Elevated hazard for the first `window_cycles` months since remission,
    /// dropping to `late` thereafter. Realized with tunnel compartments that
    /// track months since remission.
    Waning {
        early: ValueRef,
        late: ValueRef,
        window_cycles: usize,
    },
}

/// Transition-probability structure of one strategy arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransitionSpec {
    /// Explicit row-stochastic matrix over the declared states. Background
    /// mortality is blended multiplicatively into the death column each
    /// cycle, with the remaining entries rescaled to keep rows stochastic.
    Matrix { rows: Vec<Vec<ValueRef>> },
    /// Active illness / remission / death recurrence: per-cycle remission
    /// probability out of the ill state, a relapse profile out of remission,
    /// and excess disease mortality applied while ill. Requires a
    /// three-state declared space with death last.
    IllnessRemission {
        remission: ValueRef,
        relapse: RelapseProfile,
        excess_mortality: ValueRef,
    },
}

/// A one-time cost applied at a specific cycle (e.g. an acute treatment
/// course), never smeared across the horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneTimeCost {
    pub cycle: usize,
    pub amount: ValueRef,
}

/// Per-state per-cycle costs plus one-time costs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSpec {
    /// One entry per declared state, cost accrued each cycle of occupancy
    pub per_cycle: Vec<ValueRef>,
    #[serde(default)]
    pub one_time: Vec<OneTimeCost>,
}

/// Per-state annual utilities; the aggregator converts them to cycle length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilitySpec {
    pub annual: Vec<ValueRef>,
}

/// One row of the strategy input table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyArmSpec {
    pub name: String,
    pub transition: TransitionSpec,
    pub costs: CostSpec,
    pub utilities: UtilitySpec,
}

/// Compiled relapse profile with parameter indices resolved
#[derive(Debug, Clone)]
pub enum CompiledRelapse {
    Constant(ResolvedValue),
    Waning {
        early: ResolvedValue,
        late: ResolvedValue,
        window_cycles: usize,
    },
}

/// Compiled transition structure
#[derive(Debug, Clone)]
pub enum CompiledTransition {
    Matrix {
        rows: Vec<Vec<ResolvedValue>>,
    },
    IllnessRemission {
        remission: ResolvedValue,
        relapse: CompiledRelapse,
        excess_mortality: ResolvedValue,
    },
}

/// A fully compiled strategy arm, ready for the simulator
#[derive(Debug, Clone)]
pub struct StrategyArm {
    pub id: StrategyId,
    pub name: String,
    pub transition: CompiledTransition,
    pub per_cycle_costs: Vec<ResolvedValue>,
    pub one_time_costs: Vec<(usize, ResolvedValue)>,
    pub annual_utilities: Vec<ResolvedValue>,
}

impl StrategyArm {
    /// Compile a declared arm against the registry and state space.
    ///
    /// Every lookup failure or shape mismatch is raised here, before any
    /// simulation runs.
    pub fn compile(
        id: StrategyId,
        spec: &StrategyArmSpec,
        states: &StateSpace,
        registry: &ParameterRegistry,
    ) -> Result<Self, ValidationError> {
        let n = states.len();
        let name = &spec.name;

        let transition = match &spec.transition {
            TransitionSpec::Matrix { rows } => {
                if rows.len() != n {
                    return Err(ValidationError::ShapeMismatch {
                        strategy: name.clone(),
                        what: "transition matrix rows",
                        expected: n,
                        found: rows.len(),
                    });
                }
                let mut resolved_rows = Vec::with_capacity(n);
                for row in rows {
                    if row.len() != n {
                        return Err(ValidationError::ShapeMismatch {
                            strategy: name.clone(),
                            what: "transition matrix columns",
                            expected: n,
                            found: row.len(),
                        });
                    }
                    let resolved: Result<Vec<_>, _> =
                        row.iter().map(|v| v.resolve(registry, name)).collect();
                    resolved_rows.push(resolved?);
                }
                CompiledTransition::Matrix {
                    rows: resolved_rows,
                }
            }
            TransitionSpec::IllnessRemission {
                remission,
                relapse,
                excess_mortality,
            } => {
                if n != 3 || states.death() != 2 {
                    return Err(ValidationError::InvalidStateSpace(format!(
                        "strategy {name:?} uses the illness/remission structure, which requires \
                         exactly three states with death last"
                    )));
                }
                let relapse = match relapse {
                    RelapseProfile::Constant { hazard } => {
                        CompiledRelapse::Constant(hazard.resolve(registry, name)?)
                    }
                    RelapseProfile::Waning {
                        early,
                        late,
                        window_cycles,
                    } => {
                        if *window_cycles == 0 {
                            return Err(ValidationError::Config(format!(
                                "strategy {name:?}: waning relapse window must be at least one cycle"
                            )));
                        }
                        CompiledRelapse::Waning {
                            early: early.resolve(registry, name)?,
                            late: late.resolve(registry, name)?,
                            window_cycles: *window_cycles,
                        }
                    }
                };
                CompiledTransition::IllnessRemission {
                    remission: remission.resolve(registry, name)?,
                    relapse,
                    excess_mortality: excess_mortality.resolve(registry, name)?,
                }
            }
        };

        if spec.costs.per_cycle.len() != n {
            return Err(ValidationError::ShapeMismatch {
                strategy: name.clone(),
                what: "per-cycle costs",
                expected: n,
                found: spec.costs.per_cycle.len(),
            });
        }
        if spec.utilities.annual.len() != n {
            return Err(ValidationError::ShapeMismatch {
                strategy: name.clone(),
                what: "annual utilities",
                expected: n,
                found: spec.utilities.annual.len(),
            });
        }

        let per_cycle_costs: Result<Vec<_>, _> = spec
            .costs
            .per_cycle
            .iter()
            .map(|v| v.resolve(registry, name))
            .collect();
        let annual_utilities: Result<Vec<_>, _> = spec
            .utilities
            .annual
            .iter()
            .map(|v| v.resolve(registry, name))
            .collect();
        let one_time_costs: Result<Vec<_>, _> = spec
            .costs
            .one_time
            .iter()
            .map(|c| Ok((c.cycle, c.amount.resolve(registry, name)?)))
            .collect();

        Ok(Self {
            id,
            name: name.clone(),
            transition,
            per_cycle_costs: per_cycle_costs?,
            one_time_costs: one_time_costs?,
            annual_utilities: annual_utilities?,
        })
    }
}
