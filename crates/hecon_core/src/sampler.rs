//! Parameter sampling for one Monte Carlo iteration
//!
//! One realized value per declared parameter per call, in registry order.
//! Correlated parameters are explicit: members of a correlation group share
//! a single uniform draw pushed through each member's inverse CDF, which
//! preserves rank correlation across the group. Everything else samples
//! independently. The draw order is fixed (group uniforms first, then
//! parameters in registry order), so a given generator state always yields
//! the same realization.

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::error::DistributionError;
use crate::model::{ParameterId, ParameterRegistry};

/// Draws one realization of every uncertain parameter per iteration
#[derive(Debug, Clone, Copy)]
pub struct ParameterSampler<'a> {
    registry: &'a ParameterRegistry,
}

impl<'a> ParameterSampler<'a> {
    #[must_use]
    pub fn new(registry: &'a ParameterRegistry) -> Self {
        Self { registry }
    }

    /// Sample every parameter, returning values in registry order
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>, DistributionError> {
        // One shared uniform per correlation group, drawn up front so the
        // generator advances identically regardless of group membership order
        let group_uniforms: Vec<f64> = (0..self.registry.group_count())
            .map(|_| rng.random::<f64>())
            .collect();

        let mut values = Vec::with_capacity(self.registry.len());
        for param in self.registry.iter() {
            let value = match param.correlation_group {
                Some(group) => param.distribution.quantile(group_uniforms[group])?,
                None => param.distribution.sample(rng)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Sample every parameter, then pin the given subset to fixed values.
    ///
    /// Used by the nested value-of-information loop, where a parameter group
    /// is held at its outer-draw realization while the rest re-sample.
    pub fn sample_with_fixed<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        fixed: &FxHashMap<ParameterId, f64>,
    ) -> Result<Vec<f64>, DistributionError> {
        let mut values = self.sample(rng)?;
        for (id, value) in fixed {
            values[id.index()] = *value;
        }
        Ok(values)
    }
}
