//! Cohort simulation and the probabilistic sensitivity analysis driver
//!
//! One iteration samples every parameter, advances the cohort recurrence for
//! each strategy and aggregates discounted outcomes into a `SimulationDraw`.
//! Iterations are shared-nothing and run in parallel batches; the only state
//! crossing the parallel region is the read-only model registry and the
//! seeding scheme `seed_i = base_seed + i`, so results are invariant to
//! scheduling order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::aggregate::{DiscountCurve, aggregate};
use crate::config::{IterationFailurePolicy, ModelRegistry, RunConfig};
use crate::error::{EngineError, InvalidTransitionError, ResumeConflictError, Result};
use crate::model::{
    CohortState, CohortTrace, CompiledRelapse, CompiledTransition, PsaCheckpoint, PsaResult,
    PsaRun, SimulationDraw, SkippedIteration, StrategyArm, StrategyOutcome, TransitionMatrix,
    blend_mortality,
};
use crate::sampler::ParameterSampler;

/// Iterations per work unit; batches keep the progress counter and the
/// cancellation checks coarse enough to stay off the hot path
const BATCH_SIZE: usize = 64;

/// Progress tracking and cooperative cancellation for a PSA run
#[derive(Debug, Clone)]
pub struct RunProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl RunProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create from existing atomics (for embedding in a host UI)
    #[must_use]
    pub fn from_atomics(
        completed: Arc<AtomicUsize>,
        total: Arc<AtomicUsize>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            completed,
            total,
            cancelled,
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn add_completed(&self, n: usize) {
        self.completed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Request cancellation; honored between iteration batches
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Mapping between the simulator's internal state layout and the declared
/// states. Waning relapse expands remission into tunnel compartments that
/// track months since remission; the reported trace collapses them back.
#[derive(Debug, Clone)]
struct InternalLayout {
    n: usize,
    entry: usize,
    death: usize,
    /// internal index -> declared index
    collapse: Vec<usize>,
}

impl InternalLayout {
    fn for_strategy(
        strategy: &StrategyArm,
        n_declared: usize,
        declared_entry: usize,
        declared_death: usize,
    ) -> Self {
        match &strategy.transition {
            CompiledTransition::IllnessRemission {
                relapse: CompiledRelapse::Waning { window_cycles, .. },
                ..
            } => {
                // 0 = ill, 1..=window tunnel months, window+1 stable
                // remission, window+2 death
                let w = *window_cycles;
                let n = w + 3;
                let death = w + 2;
                let mut collapse = vec![1; n];
                collapse[0] = 0;
                collapse[death] = 2;
                let entry = match declared_entry {
                    0 => 0,
                    1 => 1,
                    _ => death,
                };
                Self {
                    n,
                    entry,
                    death,
                    collapse,
                }
            }
            _ => Self {
                n: n_declared,
                entry: declared_entry,
                death: declared_death,
                collapse: (0..n_declared).collect(),
            },
        }
    }

    fn collapse_occupancy(&self, internal: &[f64], n_declared: usize) -> Vec<f64> {
        let mut declared = vec![0.0; n_declared];
        for (i, &mass) in internal.iter().enumerate() {
            declared[self.collapse[i]] += mass;
        }
        declared
    }
}

/// Build and validate the transition matrix for every cycle.
///
/// Matrices depend on the cycle only through attained-age background
/// mortality (and tunnel position, which is a state, not a cycle), so the
/// whole sequence is constructed and checked before the cycle loop begins —
/// an invalid matrix fails the iteration here, never mid-recurrence.
fn build_cycle_matrices(
    strategy: &StrategyArm,
    registry: &ModelRegistry,
    layout: &InternalLayout,
    values: &[f64],
    config: &RunConfig,
) -> std::result::Result<Vec<TransitionMatrix>, InvalidTransitionError> {
    let cpy = f64::from(config.cycles_per_year);
    let mut matrices = Vec::with_capacity(config.horizon_cycles);

    for cycle in 0..config.horizon_cycles {
        let age = registry.start_age + cycle as f64 / cpy;
        let p_background = registry.mortality.cycle_probability(age, cpy);

        let mut matrix = match &strategy.transition {
            CompiledTransition::IllnessRemission {
                remission,
                relapse,
                excess_mortality,
            } => {
                let p_remission = remission.eval(values);
                let p_excess = excess_mortality.eval(values);
                build_illness_remission_matrix(
                    layout,
                    p_remission,
                    relapse,
                    p_excess,
                    p_background,
                    values,
                )
            }
            CompiledTransition::Matrix { rows } => build_explicit_matrix(
                rows,
                layout,
                p_background,
                values,
                &strategy.name,
                cycle,
            )?,
        };

        matrix.validate(&strategy.name, cycle)?;
        matrices.push(matrix);
    }

    Ok(matrices)
}

fn build_illness_remission_matrix(
    layout: &InternalLayout,
    p_remission: f64,
    relapse: &CompiledRelapse,
    p_excess: f64,
    p_background: f64,
    values: &[f64],
) -> TransitionMatrix {
    let n = layout.n;
    let death = layout.death;
    let mut rows = vec![vec![0.0; n]; n];

    // Active illness: death competes first, remission applies to survivors
    let p_death_ill = blend_mortality(p_background, p_excess);
    let p_rem = p_remission * (1.0 - p_death_ill);
    rows[0][0] = 1.0 - p_death_ill - p_rem;
    rows[0][1] = p_rem;
    rows[0][death] = p_death_ill;

    match relapse {
        CompiledRelapse::Constant(hazard) => {
            let p_relapse = hazard.eval(values) * (1.0 - p_background);
            rows[1][0] = p_relapse;
            rows[1][1] = 1.0 - p_background - p_relapse;
            rows[1][death] = p_background;
        }
        CompiledRelapse::Waning {
            early,
            late,
            window_cycles,
        } => {
            let early = early.eval(values);
            let late = late.eval(values);
            // Tunnel month k advances to k + 1 (or stable remission after
            // the window) unless it relapses or dies
            for k in 1..=*window_cycles {
                let p_relapse = early * (1.0 - p_background);
                let onward = 1.0 - p_background - p_relapse;
                rows[k][0] = p_relapse;
                rows[k][k + 1] = onward;
                rows[k][death] = p_background;
            }
            let stable = *window_cycles + 1;
            let p_relapse = late * (1.0 - p_background);
            rows[stable][0] = p_relapse;
            rows[stable][stable] = 1.0 - p_background - p_relapse;
            rows[stable][death] = p_background;
        }
    }

    rows[death][death] = 1.0;
    TransitionMatrix::from_rows(rows)
}

fn build_explicit_matrix(
    rows: &[Vec<crate::model::ResolvedValue>],
    layout: &InternalLayout,
    p_background: f64,
    values: &[f64],
    strategy: &str,
    cycle: usize,
) -> std::result::Result<TransitionMatrix, InvalidTransitionError> {
    let n = layout.n;
    let death = layout.death;

    let mut base = vec![vec![0.0; n]; n];
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            base[i][j] = value.eval(values);
        }
    }

    if (base[death][death] - 1.0).abs() > crate::model::ROW_SUM_EPSILON {
        return Err(InvalidTransitionError {
            strategy: strategy.to_string(),
            cycle,
            row: death,
            row_sum: base[death][death],
            reason: "death state must be absorbing",
        });
    }

    // Blend background mortality into the death column and rescale the
    // surviving entries so each row stays stochastic
    for (i, row) in base.iter_mut().enumerate() {
        if i == death {
            continue;
        }
        let p_death = row[death];
        let blended = blend_mortality(p_background, p_death);
        let scale = if p_death < 1.0 {
            (1.0 - blended) / (1.0 - p_death)
        } else {
            0.0
        };
        for (j, p) in row.iter_mut().enumerate() {
            if j != death {
                *p *= scale;
            }
        }
        row[death] = blended;
    }

    Ok(TransitionMatrix::from_rows(base))
}

/// Build the validated per-cycle matrices for one strategy, exposed for the
/// row-stochastic invariant tests
#[cfg(test)]
pub(crate) fn cycle_matrices(
    strategy: &StrategyArm,
    registry: &ModelRegistry,
    values: &[f64],
    config: &RunConfig,
) -> std::result::Result<Vec<TransitionMatrix>, InvalidTransitionError> {
    let layout = InternalLayout::for_strategy(
        strategy,
        registry.states.len(),
        registry.entry_state,
        registry.states.death(),
    );
    build_cycle_matrices(strategy, registry, &layout, values, config)
}

/// Advance one strategy's cohort through the full horizon for one parameter
/// realization.
///
/// Returns the per-cycle occupancy trace over the declared states. Once all
/// mass is absorbed the remaining cycles repeat the absorbed vector without
/// further matrix products.
pub fn simulate_cohort(
    strategy: &StrategyArm,
    registry: &ModelRegistry,
    values: &[f64],
    config: &RunConfig,
) -> std::result::Result<CohortTrace, InvalidTransitionError> {
    let n_declared = registry.states.len();
    let layout = InternalLayout::for_strategy(
        strategy,
        n_declared,
        registry.entry_state,
        registry.states.death(),
    );
    let matrices = build_cycle_matrices(strategy, registry, &layout, values, config)?;

    let mut current = CohortState::seeded(layout.n, layout.entry);
    let mut next = CohortState::seeded(layout.n, layout.entry);

    let mut trace = CohortTrace::with_capacity(config.horizon_cycles);
    for cycle in 0..config.horizon_cycles {
        let declared = layout.collapse_occupancy(current.occupancy(), n_declared);
        if current.occupancy()[layout.death] >= 1.0 - 1e-12 {
            // All mass absorbed; the occupancy no longer changes
            for _ in cycle..config.horizon_cycles {
                trace.push(declared.clone());
            }
            return Ok(trace);
        }
        trace.push(declared);
        matrices[cycle].apply(current.occupancy(), next.occupancy_mut());
        std::mem::swap(&mut current, &mut next);
    }

    Ok(trace)
}

/// Simulate and aggregate every strategy for one parameter realization
pub(crate) fn simulate_all_strategies(
    registry: &ModelRegistry,
    config: &RunConfig,
    values: &[f64],
    discount: &DiscountCurve,
) -> Result<Vec<StrategyOutcome>> {
    let cpy = f64::from(config.cycles_per_year);
    let mut outcomes = Vec::with_capacity(registry.strategies.len());
    for strategy in &registry.strategies {
        let trace = simulate_cohort(strategy, registry, values, config)?;
        outcomes.push(aggregate(
            &trace,
            strategy,
            &registry.states,
            values,
            discount,
            cpy,
        ));
    }
    Ok(outcomes)
}

/// Deterministic base case: every parameter at its distribution mean
pub fn run_deterministic(
    registry: &ModelRegistry,
    config: &RunConfig,
) -> Result<Vec<StrategyOutcome>> {
    config.validate()?;
    let values = registry.parameters.mean_values();
    let discount = DiscountCurve::new(
        config.discount_rate()?,
        f64::from(config.cycles_per_year),
        config.horizon_cycles,
    );
    simulate_all_strategies(registry, config, &values, &discount)
}

fn run_iteration(
    registry: &ModelRegistry,
    config: &RunConfig,
    discount: &DiscountCurve,
    iteration: u64,
) -> Result<SimulationDraw> {
    let mut rng = SmallRng::seed_from_u64(config.seed.wrapping_add(iteration));
    let sampler = ParameterSampler::new(&registry.parameters);
    let values = sampler.sample(&mut rng)?;
    let outcomes = simulate_all_strategies(registry, config, &values, discount)?;
    Ok(SimulationDraw {
        iteration,
        values,
        outcomes,
    })
}

#[derive(Debug, Default)]
struct BatchOutput {
    draws: Vec<SimulationDraw>,
    skipped: Vec<SkippedIteration>,
}

fn run_batch(
    registry: &ModelRegistry,
    config: &RunConfig,
    discount: &DiscountCurve,
    chunk: &[u64],
    progress: &RunProgress,
) -> Result<BatchOutput> {
    // Cancelled batches contribute nothing; whatever completed earlier is
    // preserved for the checkpoint
    if progress.is_cancelled() {
        return Ok(BatchOutput::default());
    }
    let mut out = BatchOutput {
        draws: Vec::with_capacity(chunk.len()),
        skipped: Vec::new(),
    };
    for &iteration in chunk {
        match run_iteration(registry, config, discount, iteration) {
            Ok(draw) => out.draws.push(draw),
            Err(source) => match config.failure_policy {
                IterationFailurePolicy::Abort => {
                    return Err(EngineError::IterationFailed {
                        iteration,
                        source: Box::new(source),
                    });
                }
                IterationFailurePolicy::SkipAndCount { .. } => {
                    out.skipped.push(SkippedIteration {
                        iteration,
                        reason: source.to_string(),
                    });
                }
            },
        }
    }
    progress.add_completed(chunk.len());
    Ok(out)
}

#[cfg(feature = "parallel")]
fn run_iterations(
    registry: &ModelRegistry,
    config: &RunConfig,
    pending: &[u64],
    progress: &RunProgress,
) -> Result<(Vec<SimulationDraw>, Vec<SkippedIteration>)> {
    let discount = DiscountCurve::new(
        config.discount_rate()?,
        f64::from(config.cycles_per_year),
        config.horizon_cycles,
    );
    let chunks: Vec<&[u64]> = pending.chunks(BATCH_SIZE).collect();
    let outputs: Vec<BatchOutput> = chunks
        .into_par_iter()
        .map(|chunk| run_batch(registry, config, &discount, chunk, progress))
        .collect::<Result<_>>()?;
    Ok(merge_outputs(outputs))
}

#[cfg(not(feature = "parallel"))]
fn run_iterations(
    registry: &ModelRegistry,
    config: &RunConfig,
    pending: &[u64],
    progress: &RunProgress,
) -> Result<(Vec<SimulationDraw>, Vec<SkippedIteration>)> {
    let discount = DiscountCurve::new(
        config.discount_rate()?,
        f64::from(config.cycles_per_year),
        config.horizon_cycles,
    );
    let mut outputs = Vec::new();
    for chunk in pending.chunks(BATCH_SIZE) {
        outputs.push(run_batch(registry, config, &discount, chunk, progress)?);
    }
    Ok(merge_outputs(outputs))
}

/// Merge per-batch buffers and restore iteration order, making aggregate
/// statistics independent of completion order
fn merge_outputs(outputs: Vec<BatchOutput>) -> (Vec<SimulationDraw>, Vec<SkippedIteration>) {
    let mut draws = Vec::new();
    let mut skipped = Vec::new();
    for output in outputs {
        draws.extend(output.draws);
        skipped.extend(output.skipped);
    }
    draws.sort_by_key(|d| d.iteration);
    skipped.sort_by_key(|s| s.iteration);
    (draws, skipped)
}

fn check_failure_tolerance(
    config: &RunConfig,
    draws: &[SimulationDraw],
    skipped: &[SkippedIteration],
) -> Result<()> {
    if skipped.is_empty() {
        return Ok(());
    }
    let attempted = draws.len() + skipped.len();
    if let IterationFailurePolicy::SkipAndCount { max_failed_fraction } = config.failure_policy
        && attempted > 0
        && skipped.len() as f64 / attempted as f64 > max_failed_fraction
    {
        return Err(EngineError::TooManyFailures {
            failed: skipped.len(),
            total: attempted,
            tolerance: max_failed_fraction,
        });
    }
    warn!(
        skipped = skipped.len(),
        "iterations skipped under failure policy"
    );
    Ok(())
}

/// Run the full probabilistic sensitivity analysis.
///
/// Cancellation aborts with `EngineError::Cancelled`; use
/// [`run_psa_resumable`] to keep completed draws as a checkpoint instead.
pub fn run_psa(
    registry: &ModelRegistry,
    config: &RunConfig,
    progress: &RunProgress,
) -> Result<PsaResult> {
    match run_psa_resumable(registry, config, progress)? {
        PsaRun::Complete(result) => Ok(result),
        PsaRun::Interrupted(_) => Err(EngineError::Cancelled),
    }
}

/// Run the PSA, returning a checkpoint with the completed draws if the run
/// is cancelled between batches
pub fn run_psa_resumable(
    registry: &ModelRegistry,
    config: &RunConfig,
    progress: &RunProgress,
) -> Result<PsaRun> {
    config.validate()?;
    progress.reset(config.iterations as usize);
    debug!(
        iterations = config.iterations,
        strategies = registry.strategies.len(),
        horizon_cycles = config.horizon_cycles,
        "starting probabilistic sensitivity analysis"
    );
    let pending: Vec<u64> = (0..config.iterations).collect();
    let (draws, skipped) = run_iterations(registry, config, &pending, progress)?;
    finish_run(config, draws, skipped, progress)
}

/// Resume a cancelled run from its checkpoint.
///
/// The checkpoint must match the configured seed and horizon, and must not
/// contain duplicate iterations; otherwise the resume is rejected with a
/// `ResumeConflictError` rather than risking double-counted draws.
pub fn resume_psa(
    registry: &ModelRegistry,
    config: &RunConfig,
    checkpoint: PsaCheckpoint,
    progress: &RunProgress,
) -> Result<PsaRun> {
    config.validate()?;
    if checkpoint.base_seed != config.seed {
        return Err(ResumeConflictError::SeedMismatch {
            checkpoint: checkpoint.base_seed,
            config: config.seed,
        }
        .into());
    }
    if checkpoint.horizon_cycles != config.horizon_cycles {
        return Err(ResumeConflictError::HorizonMismatch {
            checkpoint: checkpoint.horizon_cycles,
            config: config.horizon_cycles,
        }
        .into());
    }

    let mut seen = FxHashSet::default();
    for iteration in checkpoint
        .draws
        .iter()
        .map(|d| d.iteration)
        .chain(checkpoint.skipped.iter().map(|s| s.iteration))
    {
        if !seen.insert(iteration) {
            return Err(ResumeConflictError::OverlappingIterations { iteration }.into());
        }
    }

    progress.reset(config.iterations as usize);
    progress.add_completed(seen.len());
    let pending: Vec<u64> = (0..config.iterations)
        .filter(|i| !seen.contains(i))
        .collect();
    debug!(
        resumed = seen.len(),
        remaining = pending.len(),
        "resuming probabilistic sensitivity analysis from checkpoint"
    );
    let (new_draws, new_skipped) = run_iterations(registry, config, &pending, progress)?;

    let mut draws = checkpoint.draws;
    draws.extend(new_draws);
    draws.sort_by_key(|d| d.iteration);
    let mut skipped = checkpoint.skipped;
    skipped.extend(new_skipped);
    skipped.sort_by_key(|s| s.iteration);

    finish_run(config, draws, skipped, progress)
}

fn finish_run(
    config: &RunConfig,
    draws: Vec<SimulationDraw>,
    skipped: Vec<SkippedIteration>,
    progress: &RunProgress,
) -> Result<PsaRun> {
    if progress.is_cancelled() {
        return Ok(PsaRun::Interrupted(PsaCheckpoint {
            base_seed: config.seed,
            horizon_cycles: config.horizon_cycles,
            total_iterations: config.iterations,
            draws,
            skipped,
        }));
    }
    check_failure_tolerance(config, &draws, &skipped)?;
    Ok(PsaRun::Complete(PsaResult { draws, skipped }))
}
