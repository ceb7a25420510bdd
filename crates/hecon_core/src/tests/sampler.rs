//! Tests for parameter sampling: determinism, support and rank correlation

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;

use crate::model::{
    Distribution, ParameterId, ParameterOwner, ParameterRegistry, ParameterSpec,
};
use crate::sampler::ParameterSampler;

fn spec(name: &str, distribution: Distribution, group: Option<&str>) -> ParameterSpec {
    ParameterSpec {
        name: name.to_string(),
        owner: ParameterOwner::Shared,
        distribution,
        correlation_group: group.map(str::to_string),
        jurisdiction: None,
    }
}

/// Spearman rank correlation of two equal-length samples
fn rank_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let rank = |vs: &[f64]| -> Vec<f64> {
        let mut order: Vec<usize> = (0..vs.len()).collect();
        order.sort_by(|&a, &b| vs[a].partial_cmp(&vs[b]).unwrap());
        let mut ranks = vec![0.0; vs.len()];
        for (r, &i) in order.iter().enumerate() {
            ranks[i] = r as f64;
        }
        ranks
    };
    let rx = rank(xs);
    let ry = rank(ys);
    let n = xs.len() as f64;
    let mean = (n - 1.0) / 2.0;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in rx.iter().zip(&ry) {
        cov += (a - mean) * (b - mean);
        var_x += (a - mean) * (a - mean);
        var_y += (b - mean) * (b - mean);
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

#[test]
fn test_same_seed_reproduces_identical_draws() {
    let registry = ParameterRegistry::from_specs(&[
        spec(
            "p_remission",
            Distribution::Beta {
                alpha: 40.0,
                beta: 60.0,
            },
            None,
        ),
        spec(
            "c_treatment",
            Distribution::Gamma {
                shape: 9.0,
                scale: 120.0,
            },
            None,
        ),
        spec(
            "rr_relapse",
            Distribution::LogNormal {
                mu: -0.1,
                sigma: 0.2,
            },
            None,
        ),
    ])
    .unwrap();
    let sampler = ParameterSampler::new(&registry);

    let mut rng_a = SmallRng::seed_from_u64(99);
    let mut rng_b = SmallRng::seed_from_u64(99);
    for _ in 0..20 {
        let a = sampler.sample(&mut rng_a).unwrap();
        let b = sampler.sample(&mut rng_b).unwrap();
        assert_eq!(a, b, "identical seeds must reproduce bit-identical draws");
    }
}

#[test]
fn test_exactly_one_value_per_parameter() {
    let registry = ParameterRegistry::from_specs(&[
        spec("a", Distribution::Fixed { value: 1.0 }, None),
        spec(
            "b",
            Distribution::Beta {
                alpha: 2.0,
                beta: 2.0,
            },
            Some("g"),
        ),
        spec(
            "c",
            Distribution::Gamma {
                shape: 1.0,
                scale: 1.0,
            },
            Some("g"),
        ),
    ])
    .unwrap();
    let sampler = ParameterSampler::new(&registry);
    let mut rng = SmallRng::seed_from_u64(3);
    let values = sampler.sample(&mut rng).unwrap();
    assert_eq!(values.len(), registry.len());
    assert_eq!(values[0], 1.0);
}

#[test]
fn test_correlated_parameters_preserve_rank_correlation() {
    // An efficacy rate and its relapse counterpart from the same study draw
    // through a shared uniform; their ranks must move together even though
    // the marginals differ
    let registry = ParameterRegistry::from_specs(&[
        spec(
            "p_remission_ket",
            Distribution::Beta {
                alpha: 45.0,
                beta: 55.0,
            },
            Some("ketamine_study"),
        ),
        spec(
            "h_relapse_ket",
            Distribution::LogNormal {
                mu: -2.5,
                sigma: 0.3,
            },
            Some("ketamine_study"),
        ),
    ])
    .unwrap();
    let sampler = ParameterSampler::new(&registry);

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for i in 0..400u64 {
        let mut rng = SmallRng::seed_from_u64(1000 + i);
        let values = sampler.sample(&mut rng).unwrap();
        xs.push(values[0]);
        ys.push(values[1]);
    }
    let rho = rank_correlation(&xs, &ys);
    assert!(
        rho > 0.999,
        "shared-uniform members must be rank-correlated, got rho = {rho}"
    );
}

#[test]
fn test_independent_parameters_stay_independent() {
    let registry = ParameterRegistry::from_specs(&[
        spec(
            "p_remission",
            Distribution::Beta {
                alpha: 45.0,
                beta: 55.0,
            },
            None,
        ),
        spec(
            "h_relapse",
            Distribution::LogNormal {
                mu: -2.5,
                sigma: 0.3,
            },
            None,
        ),
    ])
    .unwrap();
    let sampler = ParameterSampler::new(&registry);

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for i in 0..400u64 {
        let mut rng = SmallRng::seed_from_u64(5000 + i);
        let values = sampler.sample(&mut rng).unwrap();
        xs.push(values[0]);
        ys.push(values[1]);
    }
    let rho = rank_correlation(&xs, &ys);
    assert!(
        rho.abs() < 0.3,
        "unspecified correlation must default to independent draws, got rho = {rho}"
    );
}

#[test]
fn test_sample_with_fixed_pins_values() {
    let registry = ParameterRegistry::from_specs(&[
        spec(
            "p_remission",
            Distribution::Beta {
                alpha: 2.0,
                beta: 2.0,
            },
            None,
        ),
        spec(
            "c_drug",
            Distribution::Gamma {
                shape: 4.0,
                scale: 100.0,
            },
            None,
        ),
    ])
    .unwrap();
    let sampler = ParameterSampler::new(&registry);
    let fixed = FxHashMap::from_iter([(ParameterId(0), 0.42)]);

    let mut rng = SmallRng::seed_from_u64(11);
    for _ in 0..10 {
        let values = sampler.sample_with_fixed(&mut rng, &fixed).unwrap();
        assert_eq!(values[0], 0.42);
        assert!(values[1] >= 0.0);
    }
}
