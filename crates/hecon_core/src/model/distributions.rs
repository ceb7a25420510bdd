//! Parameter uncertainty distributions
//!
//! A closed set of distribution families covers the inputs of the cohort
//! model: Beta for probabilities and utilities, Gamma and LogNormal for
//! costs and hazard-scale quantities, Fixed for point estimates. Each
//! variant carries only its own parameters and is validated eagerly, before
//! any sampling happens.

use rand::Rng;
use rand_distr::Distribution as RandDistribution;
use serde::{Deserialize, Serialize};
use statrs::distribution::ContinuousCDF;

use crate::error::DistributionError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Distribution {
    Fixed { value: f64 },
    Beta { alpha: f64, beta: f64 },
    Gamma { shape: f64, scale: f64 },
    LogNormal { mu: f64, sigma: f64 },
}

impl Distribution {
    /// Name of the distribution family, used in error reporting
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Distribution::Fixed { .. } => "Fixed",
            Distribution::Beta { .. } => "Beta",
            Distribution::Gamma { .. } => "Gamma",
            Distribution::LogNormal { .. } => "LogNormal",
        }
    }

    /// Check the declared parameters against the distribution's domain.
    ///
    /// Runs at registry-build time so that a bad declaration fails the run
    /// before any simulation work starts.
    pub fn validate(&self) -> Result<(), DistributionError> {
        match *self {
            Distribution::Fixed { value } => {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err(DistributionError {
                        distribution: "Fixed",
                        reason: "value must be finite",
                    })
                }
            }
            Distribution::Beta { alpha, beta } => {
                if alpha > 0.0 && beta > 0.0 && alpha.is_finite() && beta.is_finite() {
                    Ok(())
                } else {
                    Err(DistributionError {
                        distribution: "Beta",
                        reason: "alpha and beta must be positive and finite",
                    })
                }
            }
            Distribution::Gamma { shape, scale } => {
                if shape > 0.0 && scale > 0.0 && shape.is_finite() && scale.is_finite() {
                    Ok(())
                } else {
                    Err(DistributionError {
                        distribution: "Gamma",
                        reason: "shape and scale must be positive and finite",
                    })
                }
            }
            Distribution::LogNormal { mu, sigma } => {
                if sigma > 0.0 && sigma.is_finite() && mu.is_finite() {
                    Ok(())
                } else {
                    Err(DistributionError {
                        distribution: "LogNormal",
                        reason: "sigma must be positive and finite, mu finite",
                    })
                }
            }
        }
    }

    /// Expectation of the distribution, used for the deterministic base case
    #[must_use]
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Fixed { value } => value,
            Distribution::Beta { alpha, beta } => alpha / (alpha + beta),
            Distribution::Gamma { shape, scale } => shape * scale,
            Distribution::LogNormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
        }
    }

    /// Draw one value, advancing the generator deterministically.
    ///
    /// Beta draws land in [0, 1]; Gamma and LogNormal draws are >= 0, so
    /// probability- and cost-valued parameters stay inside their support
    /// by construction.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        match *self {
            Distribution::Fixed { value } => Ok(value),
            Distribution::Beta { alpha, beta } => rand_distr::Beta::new(alpha, beta)
                .map(|d| d.sample(rng))
                .map_err(|_| DistributionError {
                    distribution: "Beta",
                    reason: "alpha and beta must be positive and finite",
                }),
            Distribution::Gamma { shape, scale } => rand_distr::Gamma::new(shape, scale)
                .map(|d| d.sample(rng))
                .map_err(|_| DistributionError {
                    distribution: "Gamma",
                    reason: "shape and scale must be positive and finite",
                }),
            Distribution::LogNormal { mu, sigma } => rand_distr::LogNormal::new(mu, sigma)
                .map(|d| d.sample(rng))
                .map_err(|_| DistributionError {
                    distribution: "LogNormal",
                    reason: "sigma must be positive and finite, mu finite",
                }),
        }
    }

    /// Inverse CDF transform of a uniform draw.
    ///
    /// This is the correlated-sampling path: members of a correlation group
    /// share one uniform and map it through their own quantile functions,
    /// which preserves rank correlation across the group.
    pub fn quantile(&self, u: f64) -> Result<f64, DistributionError> {
        let u = u.clamp(0.0, 1.0);
        match *self {
            Distribution::Fixed { value } => Ok(value),
            Distribution::Beta { alpha, beta } => statrs::distribution::Beta::new(alpha, beta)
                .map(|d| d.inverse_cdf(u))
                .map_err(|_| DistributionError {
                    distribution: "Beta",
                    reason: "alpha and beta must be positive and finite",
                }),
            Distribution::Gamma { shape, scale } => {
                // statrs parameterizes Gamma by rate rather than scale
                statrs::distribution::Gamma::new(shape, 1.0 / scale)
                    .map(|d| d.inverse_cdf(u))
                    .map_err(|_| DistributionError {
                        distribution: "Gamma",
                        reason: "shape and scale must be positive and finite",
                    })
            }
            Distribution::LogNormal { mu, sigma } => {
                statrs::distribution::LogNormal::new(mu, sigma)
                    .map(|d| d.inverse_cdf(u))
                    .map_err(|_| DistributionError {
                        distribution: "LogNormal",
                        reason: "sigma must be positive and finite, mu finite",
                    })
            }
        }
    }
}
