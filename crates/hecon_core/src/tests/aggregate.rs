//! Tests for discounting and economic aggregation

use std::collections::HashMap;

use crate::config::{ModelBuilder, ModelRegistry, RunConfig, StrategyBuilder, WtpGridSpec};
use crate::model::{Distribution, ValueRef};
use crate::simulation::{RunProgress, run_deterministic, run_psa};

/// A cohort that never leaves the active-illness state, so expected totals
/// reduce to a closed-form sum computable in the test
fn chronic_model(cost_per_cycle: f64, annual_utility: f64) -> ModelRegistry {
    ModelBuilder::new()
        .strategy(
            StrategyBuilder::new("Chronic")
                .remission(ValueRef::constant(0.0))
                .relapse(ValueRef::constant(0.0))
                .state_costs([
                    ValueRef::constant(cost_per_cycle),
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(annual_utility),
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                ]),
        )
        .build()
        .unwrap()
}

fn run_config(horizon_cycles: usize, annual_rate: f64) -> RunConfig {
    RunConfig {
        iterations: 10,
        seed: 7,
        horizon_cycles,
        cycles_per_year: 12,
        discount_rates: HashMap::from([("US".to_string(), annual_rate)]),
        jurisdiction: "US".to_string(),
        wtp: WtpGridSpec {
            lower: 0.0,
            upper: 100_000.0,
            step: 50_000.0,
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
fn test_discounted_totals_match_closed_form() {
    let registry = chronic_model(100.0, 0.6);
    let config = run_config(24, 0.05);

    let outcomes = run_deterministic(&registry, &config).unwrap();
    let outcome = outcomes[0];

    let mut expected_cost = 0.0;
    let mut expected_qalys = 0.0;
    for cycle in 0..24 {
        let factor = 1.05_f64.powf(-(cycle as f64) / 12.0);
        expected_cost += factor * 100.0;
        expected_qalys += factor * 0.6 / 12.0;
    }

    assert!(
        (outcome.cost - expected_cost).abs() < 1e-9,
        "expected cost {expected_cost:.6}, got {:.6}",
        outcome.cost
    );
    assert!(
        (outcome.qalys - expected_qalys).abs() < 1e-9,
        "expected QALYs {expected_qalys:.6}, got {:.6}",
        outcome.qalys
    );
}

#[test]
fn test_zero_discount_rate_sums_raw_totals() {
    let registry = chronic_model(100.0, 0.6);
    let config = run_config(24, 0.0);

    let outcomes = run_deterministic(&registry, &config).unwrap();
    assert!((outcomes[0].cost - 2400.0).abs() < 1e-9);
    assert!((outcomes[0].qalys - 24.0 * 0.6 / 12.0).abs() < 1e-9);
}

#[test]
fn test_one_time_costs_land_at_their_cycle() {
    let registry = ModelBuilder::new()
        .strategy(
            StrategyBuilder::new("Acute course")
                .remission(ValueRef::constant(0.0))
                .relapse(ValueRef::constant(0.0))
                .state_costs([
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.5),
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                ])
                .one_time_cost(0, ValueRef::constant(500.0))
                .one_time_cost(12, ValueRef::constant(250.0)),
        )
        .build()
        .unwrap();
    let config = run_config(24, 0.05);

    let outcomes = run_deterministic(&registry, &config).unwrap();
    let expected = 500.0 + 250.0 / 1.05;
    assert!(
        (outcomes[0].cost - expected).abs() < 1e-9,
        "one-time costs must be discounted at their cycle, not smeared: \
         expected {expected:.6}, got {:.6}",
        outcomes[0].cost
    );
}

#[test]
fn test_one_time_cost_beyond_horizon_never_accrues() {
    let registry = ModelBuilder::new()
        .strategy(
            StrategyBuilder::new("Late course")
                .remission(ValueRef::constant(0.0))
                .relapse(ValueRef::constant(0.0))
                .state_costs([
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.5),
                    ValueRef::constant(0.0),
                    ValueRef::constant(0.0),
                ])
                .one_time_cost(100, ValueRef::constant(999.0)),
        )
        .build()
        .unwrap();
    let config = run_config(24, 0.05);

    let outcomes = run_deterministic(&registry, &config).unwrap();
    assert_eq!(outcomes[0].cost, 0.0);
}

#[test]
fn test_draw_outcomes_are_nonnegative() {
    let registry = ModelBuilder::new()
        .parameter(
            "p_remission",
            Distribution::Beta {
                alpha: 30.0,
                beta: 70.0,
            },
        )
        .parameter(
            "c_drug",
            Distribution::Gamma {
                shape: 9.0,
                scale: 40.0,
            },
        )
        .strategy(
            StrategyBuilder::new("Treatment")
                .remission(ValueRef::param("p_remission"))
                .relapse(ValueRef::constant(0.03))
                .state_costs([
                    ValueRef::param("c_drug"),
                    ValueRef::constant(20.0),
                    ValueRef::constant(0.0),
                ])
                .state_utilities([
                    ValueRef::constant(0.57),
                    ValueRef::constant(0.81),
                    ValueRef::constant(0.0),
                ]),
        )
        .build()
        .unwrap();
    let mut config = run_config(60, 0.03);
    config.iterations = 40;

    let result = run_psa(&registry, &config, &RunProgress::default()).unwrap();
    assert_eq!(result.len(), 40);
    for draw in &result.draws {
        for outcome in &draw.outcomes {
            assert!(
                outcome.cost >= 0.0,
                "iteration {}: negative discounted cost {}",
                draw.iteration,
                outcome.cost
            );
            assert!(
                outcome.qalys >= 0.0,
                "iteration {}: negative discounted QALYs {}",
                draw.iteration,
                outcome.qalys
            );
        }
    }
}
