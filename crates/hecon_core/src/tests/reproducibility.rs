//! Tests for the reproducibility law and checkpoint resume

use std::collections::HashMap;

use crate::config::{ModelBuilder, ModelRegistry, RunConfig, StrategyBuilder, WtpGridSpec};
use crate::error::{EngineError, ResumeConflictError};
use crate::model::{Distribution, PsaCheckpoint, PsaRun, ValueRef};
use crate::simulation::{RunProgress, resume_psa, run_psa};
use crate::tables::write_parameter_snapshot;

fn model() -> ModelRegistry {
    ModelBuilder::new()
        .parameter(
            "p_remission",
            Distribution::Beta {
                alpha: 35.0,
                beta: 65.0,
            },
        )
        .parameter(
            "c_drug",
            Distribution::Gamma {
                shape: 10.0,
                scale: 45.0,
            },
        )
        .correlated_parameter(
            "h_relapse",
            Distribution::LogNormal {
                mu: -3.0,
                sigma: 0.4,
            },
            "study",
        )
        .strategy(
            StrategyBuilder::new("Treatment")
                .remission(ValueRef::param("p_remission"))
                .relapse(ValueRef::param("h_relapse"))
                .state_costs([
                    ValueRef::param("c_drug"),
                    ValueRef::constant(25.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.55),
                    ValueRef::constant(0.80),
                    ValueRef::constant(0.0),
                ]),
        )
        .strategy(
            StrategyBuilder::new("Comparator")
                .remission(ValueRef::constant(0.07))
                .relapse(ValueRef::constant(0.05))
                .state_costs([
                    ValueRef::constant(120.0),
                    ValueRef::constant(25.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.55),
                    ValueRef::constant(0.80),
                    ValueRef::constant(0.0),
                ]),
        )
        .reference("Comparator")
        .build()
        .unwrap()
}

fn run_config(iterations: u64, seed: u64) -> RunConfig {
    RunConfig {
        iterations,
        seed,
        horizon_cycles: 48,
        cycles_per_year: 12,
        discount_rates: HashMap::from([("US".to_string(), 0.03)]),
        jurisdiction: "US".to_string(),
        wtp: WtpGridSpec {
            lower: 0.0,
            upper: 100_000.0,
            step: 25_000.0,
        },
        policy_wtp: 50_000.0,
        eligible_population: 40_000.0,
        failure_policy: Default::default(),
        evppi_method: Default::default(),
        voi_cv_threshold: 0.1,
        voi_min_iterations: 30,
    }
}

#[test]
fn test_identical_seed_produces_byte_identical_results() {
    let registry = model();
    let config = run_config(60, 7);

    let first = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    let second = run_psa(&registry, &config, &RunProgress::default()).unwrap();

    let first_json = serde_json::to_string(&first).unwrap();
    let second_json = serde_json::to_string(&second).unwrap();
    assert_eq!(
        first_json, second_json,
        "identical configuration and seed must reproduce identical draws"
    );

    let mut first_snapshot = Vec::new();
    write_parameter_snapshot(&mut first_snapshot, &first.draws, &registry.parameters).unwrap();
    let mut second_snapshot = Vec::new();
    write_parameter_snapshot(&mut second_snapshot, &second.draws, &registry.parameters).unwrap();
    assert_eq!(
        first_snapshot, second_snapshot,
        "parameter snapshot artifacts must be byte-identical"
    );
}

#[test]
fn test_different_seeds_produce_different_draws() {
    let registry = model();
    let first = run_psa(&registry, &run_config(30, 1), &RunProgress::default()).unwrap();
    let second = run_psa(&registry, &run_config(30, 2), &RunProgress::default()).unwrap();
    assert_ne!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_draws_are_ordered_by_iteration() {
    let registry = model();
    let config = run_config(100, 5);
    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    for (expected, draw) in result.draws.iter().enumerate() {
        assert_eq!(draw.iteration, expected as u64);
    }
}

#[test]
fn test_checkpoint_resume_matches_uninterrupted_run() {
    let registry = model();
    let config = run_config(60, 11);

    let full = run_psa(&registry, &config, &RunProgress::default()).unwrap();

    // Pretend the run was cancelled after the first 25 iterations
    let checkpoint = PsaCheckpoint {
        base_seed: config.seed,
        horizon_cycles: config.horizon_cycles,
        total_iterations: config.iterations,
        draws: full.draws[..25].to_vec(),
        skipped: Vec::new(),
    };
    let resumed = match resume_psa(&registry, &config, checkpoint, &RunProgress::default()) {
        Ok(PsaRun::Complete(result)) => result,
        other => panic!("expected a completed resume, got {other:?}"),
    };

    assert_eq!(
        serde_json::to_string(&full).unwrap(),
        serde_json::to_string(&resumed).unwrap(),
        "a resumed run must merge into exactly the uninterrupted result"
    );
}

#[test]
fn test_resume_rejects_seed_mismatch() {
    let registry = model();
    let config = run_config(20, 11);
    let checkpoint = PsaCheckpoint {
        base_seed: 12,
        horizon_cycles: config.horizon_cycles,
        total_iterations: config.iterations,
        draws: Vec::new(),
        skipped: Vec::new(),
    };
    let err = resume_psa(&registry, &config, checkpoint, &RunProgress::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Resume(ResumeConflictError::SeedMismatch { .. })
    ));
}

#[test]
fn test_resume_rejects_overlapping_iterations() {
    let registry = model();
    let config = run_config(20, 11);
    let full = run_psa(&registry, &config, &RunProgress::default()).unwrap();

    let mut draws = full.draws[..5].to_vec();
    draws.push(full.draws[3].clone());
    let checkpoint = PsaCheckpoint {
        base_seed: config.seed,
        horizon_cycles: config.horizon_cycles,
        total_iterations: config.iterations,
        draws,
        skipped: Vec::new(),
    };
    let err = resume_psa(&registry, &config, checkpoint, &RunProgress::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Resume(ResumeConflictError::OverlappingIterations { iteration: 3 })
    ));
}

#[test]
fn test_cancellation_before_start_yields_empty_checkpoint() {
    let registry = model();
    let config = run_config(40, 11);
    let progress = RunProgress::default();
    progress.cancel();

    match crate::simulation::run_psa_resumable(&registry, &config, &progress).unwrap() {
        PsaRun::Interrupted(checkpoint) => {
            assert!(checkpoint.draws.is_empty());
            assert_eq!(checkpoint.base_seed, config.seed);
        }
        PsaRun::Complete(_) => panic!("a cancelled run must not report completion"),
    }

    let err = run_psa(&registry, &config, &progress).unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}
