//! Decision metrics: ICERs, dominance, net monetary benefit, CEAC and CEAF
//!
//! Everything here is derived on demand from the deterministic outcomes and
//! the draw collection and replaced wholesale on recomputation; nothing is
//! mutated in place.

use serde::Serialize;

use crate::config::{ModelRegistry, WtpGrid};
use crate::error::ValidationError;
use crate::model::{SimulationDraw, StrategyOutcome};

/// Incremental QALYs below this are treated as a zero denominator and the
/// ICER reported undefined rather than a near-infinite ratio
pub const QALY_EPSILON: f64 = 1e-9;

/// Outcome of an ICER computation against the reference strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum IcerOutcome {
    /// Cost per QALY gained
    Ratio { value: f64 },
    /// Strictly dominated: costs more, delivers no more QALYs
    Dominated,
    /// Lies above the frontier connecting two other strategies
    ExtendedlyDominated,
    /// Incremental QALYs within epsilon of zero
    Undefined,
}

impl IcerOutcome {
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            IcerOutcome::Ratio { value } => Some(*value),
            _ => None,
        }
    }
}

/// Deterministic base-case result for one strategy
#[derive(Debug, Clone, Serialize)]
pub struct DeterministicResult {
    pub strategy: String,
    pub cost: f64,
    pub qalys: f64,
}

/// Incremental comparison of one strategy against the reference
#[derive(Debug, Clone, Serialize)]
pub struct IncrementalRow {
    pub strategy: String,
    pub is_reference: bool,
    pub delta_cost: f64,
    pub delta_qalys: f64,
    pub icer: IcerOutcome,
    pub on_frontier: bool,
}

/// The frontier-optimal choice at one willingness-to-pay threshold
#[derive(Debug, Clone, Serialize)]
pub struct CeafPoint {
    pub wtp: f64,
    pub strategy_index: usize,
    pub strategy: String,
    pub expected_nmb: f64,
}

/// Full decision-metric set for one run, recomputed wholesale on demand
#[derive(Debug, Clone)]
pub struct DecisionMetrics {
    pub deterministic: Vec<DeterministicResult>,
    pub incremental: Vec<IncrementalRow>,
    pub wtp: Vec<f64>,
    /// `ceac[w][s]` = fraction of draws in which strategy `s` is optimal at
    /// grid point `w`; sums to 1 across strategies at every point
    pub ceac: Vec<Vec<f64>>,
    pub ceaf: Vec<CeafPoint>,
}

/// Frontier classification per strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierClass {
    Frontier,
    Dominated,
    ExtendedlyDominated,
}

/// Classify strategies against the efficiency frontier.
///
/// Simple dominance removes any strategy with higher cost and no more QALYs
/// than another; extended dominance then removes strategies whose ICER
/// versus the previous frontier point decreases along the QALY-sorted
/// frontier. Re-running the construction on an already-filtered set returns
/// it unchanged.
#[must_use]
pub fn efficiency_frontier(outcomes: &[StrategyOutcome]) -> Vec<FrontierClass> {
    let n = outcomes.len();
    let mut classes = vec![FrontierClass::Frontier; n];

    // Simple dominance: strictly more costly and no more effective
    for i in 0..n {
        for j in 0..n {
            if i != j
                && outcomes[i].cost > outcomes[j].cost
                && outcomes[i].qalys <= outcomes[j].qalys
            {
                classes[i] = FrontierClass::Dominated;
                break;
            }
        }
    }

    // Extended dominance over the survivors, sorted by QALYs ascending
    let mut order: Vec<usize> = (0..n)
        .filter(|&i| classes[i] == FrontierClass::Frontier)
        .collect();
    order.sort_by(|&a, &b| {
        outcomes[a]
            .qalys
            .partial_cmp(&outcomes[b].qalys)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                outcomes[a]
                    .cost
                    .partial_cmp(&outcomes[b].cost)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let icer_between = |a: usize, b: usize| -> f64 {
        let dq = outcomes[b].qalys - outcomes[a].qalys;
        if dq.abs() < QALY_EPSILON {
            f64::INFINITY
        } else {
            (outcomes[b].cost - outcomes[a].cost) / dq
        }
    };

    let mut stack: Vec<usize> = Vec::with_capacity(order.len());
    for idx in order {
        stack.push(idx);
        while stack.len() >= 3 {
            let last = stack[stack.len() - 1];
            let mid = stack[stack.len() - 2];
            let prev = stack[stack.len() - 3];
            if icer_between(prev, mid) > icer_between(mid, last) {
                classes[mid] = FrontierClass::ExtendedlyDominated;
                stack.remove(stack.len() - 2);
            } else {
                break;
            }
        }
    }

    classes
}

/// Build the incremental table against the reference strategy
pub fn incremental_analysis(
    names: &[String],
    outcomes: &[StrategyOutcome],
    reference: usize,
) -> Result<Vec<IncrementalRow>, ValidationError> {
    if names.len() != outcomes.len() {
        return Err(ValidationError::Config(format!(
            "{} strategy names for {} outcomes",
            names.len(),
            outcomes.len()
        )));
    }
    if reference >= outcomes.len() {
        return Err(ValidationError::Config(format!(
            "reference index {reference} out of range"
        )));
    }

    let classes = efficiency_frontier(outcomes);
    let ref_outcome = outcomes[reference];

    let rows = names
        .iter()
        .zip(outcomes)
        .zip(&classes)
        .enumerate()
        .map(|(i, ((name, outcome), class))| {
            let delta_cost = outcome.cost - ref_outcome.cost;
            let delta_qalys = outcome.qalys - ref_outcome.qalys;
            let icer = match class {
                _ if i == reference => IcerOutcome::Undefined,
                FrontierClass::Dominated => IcerOutcome::Dominated,
                FrontierClass::ExtendedlyDominated => IcerOutcome::ExtendedlyDominated,
                FrontierClass::Frontier => {
                    if delta_qalys.abs() < QALY_EPSILON {
                        IcerOutcome::Undefined
                    } else {
                        IcerOutcome::Ratio {
                            value: delta_cost / delta_qalys,
                        }
                    }
                }
            };
            IncrementalRow {
                strategy: name.clone(),
                is_reference: i == reference,
                delta_cost,
                delta_qalys,
                icer,
                on_frontier: *class == FrontierClass::Frontier,
            }
        })
        .collect();

    Ok(rows)
}

/// Index of the optimal strategy for one draw at one threshold: highest net
/// monetary benefit, ties broken deterministically toward the lowest index
#[must_use]
pub fn optimal_strategy(outcomes: &[StrategyOutcome], wtp: f64) -> usize {
    let mut best = 0;
    let mut best_nmb = outcomes[0].nmb(wtp);
    for (i, outcome) in outcomes.iter().enumerate().skip(1) {
        let nmb = outcome.nmb(wtp);
        if nmb > best_nmb {
            best = i;
            best_nmb = nmb;
        }
    }
    best
}

/// Acceptability curves: per grid point, the fraction of draws in which
/// each strategy is optimal
pub fn ceac(
    draws: &[SimulationDraw],
    n_strategies: usize,
    grid: &WtpGrid,
) -> Result<Vec<Vec<f64>>, ValidationError> {
    if draws.is_empty() {
        return Err(ValidationError::Config(
            "acceptability curves require at least one draw".to_string(),
        ));
    }
    let n = draws.len() as f64;
    let mut curves = Vec::with_capacity(grid.len());
    for wtp in grid.iter() {
        let mut counts = vec![0usize; n_strategies];
        for draw in draws {
            counts[optimal_strategy(&draw.outcomes, wtp)] += 1;
        }
        curves.push(counts.into_iter().map(|c| c as f64 / n).collect());
    }
    Ok(curves)
}

/// Acceptability frontier: the strategy with the highest expected net
/// monetary benefit at each grid point, and that expectation
pub fn ceaf(
    draws: &[SimulationDraw],
    names: &[String],
    grid: &WtpGrid,
) -> Result<Vec<CeafPoint>, ValidationError> {
    if draws.is_empty() {
        return Err(ValidationError::Config(
            "acceptability frontier requires at least one draw".to_string(),
        ));
    }
    let n = draws.len() as f64;
    let mut points = Vec::with_capacity(grid.len());
    for wtp in grid.iter() {
        let mut best = 0;
        let mut best_mean = f64::NEG_INFINITY;
        for s in 0..names.len() {
            let mean: f64 = draws.iter().map(|d| d.outcomes[s].nmb(wtp)).sum::<f64>() / n;
            if mean > best_mean {
                best = s;
                best_mean = mean;
            }
        }
        points.push(CeafPoint {
            wtp,
            strategy_index: best,
            strategy: names[best].clone(),
            expected_nmb: best_mean,
        });
    }
    Ok(points)
}

/// Compute the full decision-metric set from deterministic outcomes and the
/// draw collection
pub fn compute_metrics(
    registry: &ModelRegistry,
    deterministic: &[StrategyOutcome],
    draws: &[SimulationDraw],
    grid: &WtpGrid,
) -> Result<DecisionMetrics, ValidationError> {
    let names = registry.strategy_names();
    let det_rows = names
        .iter()
        .zip(deterministic)
        .map(|(name, outcome)| DeterministicResult {
            strategy: name.clone(),
            cost: outcome.cost,
            qalys: outcome.qalys,
        })
        .collect();
    let incremental = incremental_analysis(&names, deterministic, registry.reference_index())?;
    let ceac = ceac(draws, names.len(), grid)?;
    let ceaf = ceaf(draws, &names, grid)?;
    Ok(DecisionMetrics {
        deterministic: det_rows,
        incremental,
        wtp: grid.values().to_vec(),
        ceac,
        ceaf,
    })
}
