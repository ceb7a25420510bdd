//! Uncertain parameter declarations and the compiled parameter registry

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::Distribution;
use crate::model::ids::ParameterId;

/// Which strategy a parameter belongs to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParameterOwner {
    /// Shared evidence, used by every strategy that references it
    #[default]
    Shared,
    /// Evidence specific to one strategy arm
    Strategy { name: String },
}

/// One row of the strategy/parameter input table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub owner: ParameterOwner,
    pub distribution: Distribution,
    /// Parameters sharing a group draw from one uniform per iteration,
    /// preserving rank correlation. Unset means independent.
    #[serde(default)]
    pub correlation_group: Option<String>,
    /// Jurisdiction the evidence was sourced from, carried for audit output
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

/// A validated parameter with its correlation group resolved to an index
#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: ParameterId,
    pub name: String,
    pub owner: ParameterOwner,
    pub distribution: Distribution,
    pub correlation_group: Option<usize>,
    pub jurisdiction: Option<String>,
}

/// Ordered registry of every declared parameter.
///
/// Built once at configuration-load time; sampled values are stored in a
/// plain `Vec<f64>` indexed by `ParameterId`, so the registry order defines
/// both the sampling order and the layout of every draw.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
    by_name: FxHashMap<String, ParameterId>,
    group_names: Vec<String>,
}

impl ParameterRegistry {
    /// Validate and index the declared parameters.
    ///
    /// Correlation groups are numbered in first-appearance order so that the
    /// sampler's uniform-draw order is deterministic.
    pub fn from_specs(specs: &[ParameterSpec]) -> Result<Self, ValidationError> {
        let mut params = Vec::with_capacity(specs.len());
        let mut by_name = FxHashMap::default();
        let mut group_names: Vec<String> = Vec::new();

        for (i, spec) in specs.iter().enumerate() {
            spec.distribution
                .validate()
                .map_err(|source| ValidationError::Distribution {
                    parameter: spec.name.clone(),
                    source,
                })?;

            let id = ParameterId(i as u16);
            if by_name.insert(spec.name.clone(), id).is_some() {
                return Err(ValidationError::DuplicateParameter(spec.name.clone()));
            }

            let correlation_group = spec.correlation_group.as_ref().map(|g| {
                match group_names.iter().position(|name| name == g) {
                    Some(idx) => idx,
                    None => {
                        group_names.push(g.clone());
                        group_names.len() - 1
                    }
                }
            });

            params.push(Parameter {
                id,
                name: spec.name.clone(),
                owner: spec.owner.clone(),
                distribution: spec.distribution,
                correlation_group,
                jurisdiction: spec.jurisdiction.clone(),
            });
        }

        Ok(Self {
            params,
            by_name,
            group_names,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ParameterId) -> Option<&Parameter> {
        self.params.get(id.index())
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<ParameterId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Number of correlation groups declared across all parameters
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.group_names.len()
    }

    #[must_use]
    pub fn group_name(&self, group: usize) -> Option<&str> {
        self.group_names.get(group).map(String::as_str)
    }

    /// Point-estimate value vector for the deterministic base case
    #[must_use]
    pub fn mean_values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.distribution.mean()).collect()
    }
}
