//! Tests for decision metrics: acceptability curves, frontier, full pipeline

use std::collections::HashMap;

use crate::config::{ModelBuilder, ModelRegistry, RunConfig, StrategyBuilder, WtpGridSpec};
use crate::decision::{ceac, ceaf, compute_metrics};
use crate::model::{Distribution, SimulationDraw, StrategyOutcome, ValueRef};
use crate::simulation::{RunProgress, run_deterministic, run_psa};

fn outcome(cost: f64, qalys: f64) -> StrategyOutcome {
    StrategyOutcome { cost, qalys }
}

fn two_arm_model() -> ModelRegistry {
    ModelBuilder::new()
        .parameter(
            "p_remission_esk",
            Distribution::Beta {
                alpha: 45.0,
                beta: 55.0,
            },
        )
        .parameter(
            "p_remission_uc",
            Distribution::Beta {
                alpha: 10.0,
                beta: 90.0,
            },
        )
        .parameter(
            "c_esketamine",
            Distribution::Gamma {
                shape: 25.0,
                scale: 20.0,
            },
        )
        .strategy(
            StrategyBuilder::new("Esketamine")
                .remission(ValueRef::param("p_remission_esk"))
                .relapse(ValueRef::constant(0.03))
                .state_costs([
                    ValueRef::param("c_esketamine"),
                    ValueRef::constant(40.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.57),
                    ValueRef::constant(0.81),
                    ValueRef::constant(0.0),
                ]),
        )
        .strategy(
            StrategyBuilder::new("Usual care")
                .remission(ValueRef::param("p_remission_uc"))
                .relapse(ValueRef::constant(0.04))
                .state_costs([
                    ValueRef::constant(150.0),
                    ValueRef::constant(40.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.57),
                    ValueRef::constant(0.81),
                    ValueRef::constant(0.0),
                ]),
        )
        .reference("Usual care")
        .build()
        .unwrap()
}

fn run_config(iterations: u64) -> RunConfig {
    RunConfig {
        iterations,
        seed: 2024,
        horizon_cycles: 60,
        cycles_per_year: 12,
        discount_rates: HashMap::from([("US".to_string(), 0.03), ("UK".to_string(), 0.035)]),
        jurisdiction: "US".to_string(),
        wtp: WtpGridSpec {
            lower: 0.0,
            upper: 100_000.0,
            step: 10_000.0,
        },
        policy_wtp: 50_000.0,
        eligible_population: 100_000.0,
        failure_policy: Default::default(),
        evppi_method: Default::default(),
        voi_cv_threshold: 0.1,
        voi_min_iterations: 30,
    }
}

#[test]
fn test_ceac_matches_draw_counts_exactly() {
    // 650 of 1000 draws favor strategy A at 50k per QALY
    let draws: Vec<SimulationDraw> = (0..1000u64)
        .map(|i| {
            let outcomes = if i < 650 {
                vec![outcome(10.0, 1.0), outcome(20.0, 0.5)]
            } else {
                vec![outcome(30.0, 0.4), outcome(20.0, 1.0)]
            };
            SimulationDraw {
                iteration: i,
                values: vec![],
                outcomes,
            }
        })
        .collect();
    let grid = WtpGridSpec {
        lower: 0.0,
        upper: 50_000.0,
        step: 50_000.0,
    }
    .expand()
    .unwrap();

    let curves = ceac(&draws, 2, &grid).unwrap();
    let at_50k = &curves[1];
    assert!(
        (at_50k[0] - 0.65).abs() < 1e-12,
        "CEAC(A, 50k) should be 0.65, got {}",
        at_50k[0]
    );
    assert!((at_50k[1] - 0.35).abs() < 1e-12);
}

#[test]
fn test_ceac_sums_to_one_across_strategies() {
    let registry = two_arm_model();
    let config = run_config(200);
    let grid = config.wtp.expand().unwrap();

    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    let curves = ceac(&result.draws, registry.strategies.len(), &grid).unwrap();
    for (w, probs) in grid.iter().zip(&curves) {
        let sum: f64 = probs.iter().sum();
        assert!(
            (sum - 1.0).abs() < 1e-6,
            "CEAC probabilities at WTP {w} sum to {sum}"
        );
    }
}

#[test]
fn test_single_iteration_ceac_degenerates_to_indicator() {
    let registry = two_arm_model();
    let config = run_config(1);
    let grid = config.wtp.expand().unwrap();

    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    assert_eq!(result.len(), 1);
    let curves = ceac(&result.draws, registry.strategies.len(), &grid).unwrap();
    for probs in &curves {
        for &p in probs {
            assert!(
                p == 0.0 || p == 1.0,
                "with one draw the CEAC must be a 0/1 indicator, got {p}"
            );
        }
    }
}

#[test]
fn test_ceaf_tracks_the_expected_nmb_envelope() {
    let registry = two_arm_model();
    let config = run_config(150);
    let grid = config.wtp.expand().unwrap();

    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    let names = registry.strategy_names();
    let points = ceaf(&result.draws, &names, &grid).unwrap();
    let n = result.len() as f64;

    for (idx, point) in points.iter().enumerate() {
        let wtp = grid.values()[idx];
        for s in 0..names.len() {
            let mean: f64 = result
                .draws
                .iter()
                .map(|d| d.outcomes[s].nmb(wtp))
                .sum::<f64>()
                / n;
            assert!(
                point.expected_nmb >= mean - 1e-9,
                "CEAF at WTP {wtp} is below strategy {s}'s expected NMB"
            );
        }
    }
}

#[test]
fn test_full_metric_set_from_pipeline() {
    let registry = two_arm_model();
    let config = run_config(120);
    let grid = config.wtp.expand().unwrap();

    let deterministic = run_deterministic(&registry, &config).unwrap();
    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    let metrics = compute_metrics(&registry, &deterministic, &result.draws, &grid).unwrap();

    let means = result.mean_outcomes();
    assert_eq!(means.len(), 2);
    assert!(means.iter().all(|m| m.cost >= 0.0 && m.qalys >= 0.0));

    assert_eq!(metrics.deterministic.len(), 2);
    assert_eq!(metrics.incremental.len(), 2);
    assert_eq!(metrics.ceac.len(), grid.len());
    assert_eq!(metrics.ceaf.len(), grid.len());
    assert!(metrics.incremental[1].is_reference);
    // The reference row is its own comparison
    assert_eq!(metrics.incremental[1].delta_cost, 0.0);
    assert_eq!(metrics.incremental[1].delta_qalys, 0.0);
}

#[test]
fn test_output_tables_render_one_row_per_concern() {
    let registry = two_arm_model();
    let config = run_config(50);
    let grid = config.wtp.expand().unwrap();

    let deterministic = run_deterministic(&registry, &config).unwrap();
    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    let metrics = compute_metrics(&registry, &deterministic, &result.draws, &grid).unwrap();
    let names = registry.strategy_names();

    let mut buffer = Vec::new();
    crate::tables::write_deterministic(&mut buffer, &metrics).unwrap();
    let table = String::from_utf8(buffer).unwrap();
    assert!(table.starts_with("strategy,cost,qalys,icer"));
    assert_eq!(table.lines().count(), 1 + names.len());

    let mut buffer = Vec::new();
    crate::tables::write_ceac(&mut buffer, &metrics, &names).unwrap();
    let table = String::from_utf8(buffer).unwrap();
    assert!(table.starts_with("wtp,Esketamine,Usual care"));
    assert_eq!(table.lines().count(), 1 + grid.len());

    let mut buffer = Vec::new();
    crate::tables::write_incremental(&mut buffer, &metrics).unwrap();
    assert!(!buffer.is_empty());

    let mut buffer = Vec::new();
    crate::tables::write_ceaf(&mut buffer, &metrics).unwrap();
    let table = String::from_utf8(buffer).unwrap();
    assert_eq!(table.lines().count(), 1 + grid.len());
}
