//! Value of information: EVPI and EVPPI
//!
//! EVPI is computed per willingness-to-pay point from the existing draw
//! collection, with a coefficient-of-variation check that flags unstable
//! estimates instead of reporting misleading precision. EVPPI supports two
//! estimators behind a configuration flag: a binned conditional-expectation
//! regression over the existing draws (no re-simulation, single-parameter
//! groups, bias grows as bins thin out) and a nested Monte Carlo that
//! re-simulates an inner loop per outer draw (unbiased in the limit,
//! quadratic cost).

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::aggregate::DiscountCurve;
use crate::config::{EvppiMethod, ModelRegistry, RunConfig, WtpGrid};
use crate::error::{Result, ValidationError};
use crate::model::{ParameterId, SimulationDraw};
use crate::sampler::ParameterSampler;
use crate::simulation::simulate_all_strategies;

/// Seed-domain separator so nested value-of-information draws never collide
/// with the main run's per-iteration seeds
const VOI_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

/// Draws per bin below which the binned EVPPI estimate is flagged
const MIN_DRAWS_PER_BIN: usize = 10;

/// EVPI at one willingness-to-pay grid point
#[derive(Debug, Clone, Serialize)]
pub struct EvpiPoint {
    pub wtp: f64,
    /// Per-patient expected value of perfect information
    pub evpi: f64,
    /// Per-patient EVPI scaled by the eligible population
    pub population_evpi: f64,
    /// Coefficient of variation of the opportunity-loss mean
    pub cv: f64,
    /// Too few iterations or too unstable for the configured thresholds
    pub low_precision: bool,
}

/// EVPPI estimate for one parameter group at one threshold
#[derive(Debug, Clone, Serialize)]
pub struct EvppiEstimate {
    pub parameters: Vec<String>,
    pub wtp: f64,
    pub evppi: f64,
    pub method: EvppiMethod,
    pub low_precision: bool,
}

/// Expected value of perfect information per grid point.
///
/// `EVPI(w) = E[max_s NMB(s, w)] - max_s E[NMB(s, w)]`, estimated as the
/// mean per-draw opportunity loss against the strategy with the highest
/// expected NMB. Non-negative by construction up to sampling noise.
pub fn evpi(
    draws: &[SimulationDraw],
    grid: &WtpGrid,
    config: &RunConfig,
) -> Result<Vec<EvpiPoint>> {
    if draws.is_empty() {
        return Err(ValidationError::Config(
            "value of information requires at least one draw".to_string(),
        )
        .into());
    }
    let n = draws.len();
    let n_strategies = draws[0].outcomes.len();

    let mut points = Vec::with_capacity(grid.len());
    for wtp in grid.iter() {
        // Strategy with the highest expected NMB at this threshold
        let mut best = 0;
        let mut best_mean = f64::NEG_INFINITY;
        for s in 0..n_strategies {
            let mean: f64 = draws
                .iter()
                .map(|d| d.outcomes[s].nmb(wtp))
                .sum::<f64>()
                / n as f64;
            if mean > best_mean {
                best = s;
                best_mean = mean;
            }
        }

        // Per-draw opportunity loss of committing to that strategy
        let losses: Vec<f64> = draws
            .iter()
            .map(|d| {
                let max = d
                    .outcomes
                    .iter()
                    .map(|o| o.nmb(wtp))
                    .fold(f64::NEG_INFINITY, f64::max);
                max - d.outcomes[best].nmb(wtp)
            })
            .collect();

        let evpi = losses.iter().sum::<f64>() / n as f64;
        let cv = if n < 2 {
            f64::INFINITY
        } else if evpi.abs() < f64::EPSILON {
            0.0
        } else {
            let variance = losses
                .iter()
                .map(|l| (l - evpi) * (l - evpi))
                .sum::<f64>()
                / (n - 1) as f64;
            (variance.sqrt() / (n as f64).sqrt()) / evpi
        };
        let low_precision = n < config.voi_min_iterations || cv > config.voi_cv_threshold;

        points.push(EvpiPoint {
            wtp,
            evpi,
            population_evpi: evpi * config.eligible_population,
            cv,
            low_precision,
        });
    }

    if points.iter().any(|p| p.low_precision) {
        warn!(
            iterations = n,
            "EVPI flagged low precision at one or more thresholds"
        );
    }
    Ok(points)
}

/// Population EVPI at the policy-relevant threshold (nearest grid point)
#[must_use]
pub fn population_evpi_at_policy<'a>(
    points: &'a [EvpiPoint],
    grid: &WtpGrid,
    policy_wtp: f64,
) -> Option<&'a EvpiPoint> {
    grid.nearest(policy_wtp).and_then(|idx| points.get(idx))
}

/// Expected value of partial perfect information for a parameter group,
/// using the estimator configured in `RunConfig::evppi_method`
pub fn evppi(
    registry: &ModelRegistry,
    config: &RunConfig,
    draws: &[SimulationDraw],
    parameters: &[&str],
    wtp: f64,
) -> Result<EvppiEstimate> {
    if parameters.is_empty() {
        return Err(ValidationError::Config(
            "EVPPI requires at least one parameter".to_string(),
        )
        .into());
    }
    let ids: Vec<ParameterId> = parameters
        .iter()
        .map(|name| {
            registry.parameters.id_of(name).ok_or_else(|| {
                ValidationError::UnknownParameter {
                    reference: (*name).to_string(),
                    strategy: "EVPPI".to_string(),
                }
            })
        })
        .collect::<std::result::Result<_, _>>()?;

    match config.evppi_method {
        EvppiMethod::Binned { bins } => evppi_binned(config, draws, &ids, parameters, wtp, bins),
        EvppiMethod::NestedMonteCarlo { outer, inner } => {
            evppi_nested(registry, config, &ids, parameters, wtp, outer, inner)
        }
    }
}

/// Quantile-bin conditional-expectation estimator over the existing draws
fn evppi_binned(
    config: &RunConfig,
    draws: &[SimulationDraw],
    ids: &[ParameterId],
    parameters: &[&str],
    wtp: f64,
    bins: usize,
) -> Result<EvppiEstimate> {
    if ids.len() != 1 {
        return Err(ValidationError::Config(
            "the binned EVPPI estimator supports single-parameter groups; use the nested \
             Monte Carlo method for joint groups"
            .to_string(),
        )
        .into());
    }
    if draws.is_empty() || bins == 0 {
        return Err(ValidationError::Config(
            "binned EVPPI requires draws and at least one bin".to_string(),
        )
        .into());
    }

    let param_idx = ids[0].index();
    let n = draws.len();
    let n_strategies = draws[0].outcomes.len();
    let bins = bins.min(n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        draws[a].values[param_idx]
            .partial_cmp(&draws[b].values[param_idx])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // E_theta[max_s E[NMB | theta]] over quantile bins of the parameter
    let mut inner_expectation = 0.0;
    let mut min_bin = usize::MAX;
    for b in 0..bins {
        let start = b * n / bins;
        let end = (b + 1) * n / bins;
        if start == end {
            continue;
        }
        min_bin = min_bin.min(end - start);
        let mut best = f64::NEG_INFINITY;
        for s in 0..n_strategies {
            let mean: f64 = order[start..end]
                .iter()
                .map(|&i| draws[i].outcomes[s].nmb(wtp))
                .sum::<f64>()
                / (end - start) as f64;
            best = best.max(mean);
        }
        inner_expectation += best * (end - start) as f64 / n as f64;
    }

    let current_best = (0..n_strategies)
        .map(|s| draws.iter().map(|d| d.outcomes[s].nmb(wtp)).sum::<f64>() / n as f64)
        .fold(f64::NEG_INFINITY, f64::max);

    let low_precision = n < config.voi_min_iterations || min_bin < MIN_DRAWS_PER_BIN;
    if low_precision {
        warn!(
            iterations = n,
            min_bin, "binned EVPPI flagged low precision"
        );
    }

    Ok(EvppiEstimate {
        parameters: parameters.iter().map(|s| (*s).to_string()).collect(),
        wtp,
        evppi: inner_expectation - current_best,
        method: EvppiMethod::Binned { bins },
        low_precision,
    })
}

/// Per-strategy inner-loop mean NMB for one outer draw of the group
fn nested_outer_means(
    registry: &ModelRegistry,
    config: &RunConfig,
    discount: &DiscountCurve,
    ids: &[ParameterId],
    wtp: f64,
    inner: usize,
    outer_index: u64,
) -> Result<Vec<f64>> {
    let sampler = ParameterSampler::new(&registry.parameters);
    let mut rng =
        SmallRng::seed_from_u64(config.seed.wrapping_add(VOI_SEED_OFFSET).wrapping_add(outer_index));

    let outer_values = sampler.sample(&mut rng)?;
    let fixed: FxHashMap<ParameterId, f64> = ids
        .iter()
        .map(|id| (*id, outer_values[id.index()]))
        .collect();

    let n_strategies = registry.strategies.len();
    let mut sums = vec![0.0; n_strategies];
    for _ in 0..inner {
        let values = sampler.sample_with_fixed(&mut rng, &fixed)?;
        let outcomes = simulate_all_strategies(registry, config, &values, discount)?;
        for (sum, outcome) in sums.iter_mut().zip(&outcomes) {
            *sum += outcome.nmb(wtp);
        }
    }
    for sum in &mut sums {
        *sum /= inner as f64;
    }
    Ok(sums)
}

/// Nested Monte Carlo estimator: the group is held at its outer-draw value
/// while the remaining parameters re-sample in the inner loop
fn evppi_nested(
    registry: &ModelRegistry,
    config: &RunConfig,
    ids: &[ParameterId],
    parameters: &[&str],
    wtp: f64,
    outer: usize,
    inner: usize,
) -> Result<EvppiEstimate> {
    if outer == 0 || inner == 0 {
        return Err(ValidationError::Config(
            "nested EVPPI requires positive outer and inner counts".to_string(),
        )
        .into());
    }
    let discount = DiscountCurve::new(
        config.discount_rate()?,
        f64::from(config.cycles_per_year),
        config.horizon_cycles,
    );

    #[cfg(feature = "parallel")]
    let outer_means: Vec<Vec<f64>> = (0..outer as u64)
        .into_par_iter()
        .map(|o| nested_outer_means(registry, config, &discount, ids, wtp, inner, o))
        .collect::<Result<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let outer_means: Vec<Vec<f64>> = (0..outer as u64)
        .map(|o| nested_outer_means(registry, config, &discount, ids, wtp, inner, o))
        .collect::<Result<_>>()?;

    let n_strategies = registry.strategies.len();
    let maxima: Vec<f64> = outer_means
        .iter()
        .map(|means| means.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();
    let inner_expectation = maxima.iter().sum::<f64>() / outer as f64;

    let current_best = (0..n_strategies)
        .map(|s| outer_means.iter().map(|m| m[s]).sum::<f64>() / outer as f64)
        .fold(f64::NEG_INFINITY, f64::max);

    let evppi_value = inner_expectation - current_best;

    // Stability of the outer expectation, mirroring the EVPI check
    let cv = if outer < 2 {
        f64::INFINITY
    } else if evppi_value.abs() < f64::EPSILON {
        0.0
    } else {
        let mean = inner_expectation;
        let variance = maxima
            .iter()
            .map(|m| (m - mean) * (m - mean))
            .sum::<f64>()
            / (outer - 1) as f64;
        (variance.sqrt() / (outer as f64).sqrt()) / evppi_value
    };
    let low_precision = outer < config.voi_min_iterations || cv > config.voi_cv_threshold;
    if low_precision {
        warn!(outer, inner, "nested EVPPI flagged low precision");
    }

    Ok(EvppiEstimate {
        parameters: parameters.iter().map(|s| (*s).to_string()).collect(),
        wtp,
        evppi: evppi_value,
        method: EvppiMethod::NestedMonteCarlo { outer, inner },
        low_precision,
    })
}
