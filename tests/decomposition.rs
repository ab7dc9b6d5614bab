//! The decomposition-tree engine against the exact engine, on bags small enough to compute exactly.

use rand::{Rng, SeedableRng};

use uconf::{
    config::{ApproximationMode, Config, Strategy, VariableSelection},
    context::Group,
    generic::random::SplitMix64,
    structures::Literal,
};

/// A random bag of binary-variable clauses, as (variable, probability) literal lists.
fn random_bag(rng: &mut SplitMix64, vars: u32, clauses: usize, arity: usize) -> Vec<Vec<Literal>> {
    let mut probabilities: Vec<f64> = Vec::new();
    for _ in 0..vars {
        probabilities.push(0.05 + 0.9 * rng.random::<f64>());
    }

    (0..clauses)
        .map(|_| {
            (0..arity)
                .map(|_| {
                    let var = rng.random_range(0..vars) + 1;
                    Literal::new(var, 1, probabilities[(var - 1) as usize])
                })
                .collect()
        })
        .collect()
}

fn probability_with(strategy: Strategy, bag: &[Vec<Literal>]) -> f64 {
    let mut group = Group::from_config(Config {
        strategy,
        ..Config::default()
    });
    for clause in bag {
        group.accumulate(clause).unwrap();
    }
    group.finalize().unwrap()
}

#[test]
fn bounds_contain_the_exact_probability() {
    let mut rng = SplitMix64::from_seed(5_u64.to_le_bytes());

    for round in 0..40 {
        let bag = random_bag(&mut rng, 6, 4 + round % 5, 2);
        let exact = probability_with(Strategy::Exact, &bag);

        for epsilon in [0.3, 0.1, 0.02] {
            let mut group = Group::from_config(Config {
                strategy: Strategy::Decomposition {
                    epsilon,
                    mode: ApproximationMode::Relative,
                },
                ..Config::default()
            });
            for clause in &bag {
                group.accumulate(clause).unwrap();
            }

            let approximation = group.finalize_approximation().unwrap();
            assert!(
                approximation.lower <= exact + 1e-9,
                "lower bound {} above exact {exact}",
                approximation.lower
            );
            assert!(
                approximation.upper >= exact - 1e-9,
                "upper bound {} below exact {exact}",
                approximation.upper
            );
        }
    }
}

#[test]
fn relative_estimates_land_within_epsilon() {
    let mut rng = SplitMix64::from_seed(17_u64.to_le_bytes());

    for round in 0..40 {
        let bag = random_bag(&mut rng, 7, 5 + round % 4, 2);
        let exact = probability_with(Strategy::Exact, &bag);

        for epsilon in [0.2, 0.05] {
            let estimate = probability_with(
                Strategy::Decomposition {
                    epsilon,
                    mode: ApproximationMode::Relative,
                },
                &bag,
            );

            // A whisker of slack over ε·exact: closed leaves may each leave a
            // fraction of the stopping number unrefined.
            assert!(
                (estimate - exact).abs() <= epsilon * exact * 1.1 + 1e-6,
                "estimate {estimate} off exact {exact} beyond ε = {epsilon}"
            );
        }
    }
}

#[test]
fn absolute_estimates_land_within_epsilon() {
    let mut rng = SplitMix64::from_seed(23_u64.to_le_bytes());

    for _ in 0..20 {
        let bag = random_bag(&mut rng, 6, 6, 2);
        let exact = probability_with(Strategy::Exact, &bag);

        let epsilon = 0.05;
        let estimate = probability_with(
            Strategy::Decomposition {
                epsilon,
                mode: ApproximationMode::Absolute,
            },
            &bag,
        );

        assert!(
            (estimate - exact).abs() <= epsilon + 1e-6,
            "estimate {estimate} off exact {exact} beyond absolute ε"
        );
    }
}

#[test]
fn zero_epsilon_takes_the_exact_path() {
    let mut rng = SplitMix64::from_seed(29_u64.to_le_bytes());

    for _ in 0..10 {
        let bag = random_bag(&mut rng, 5, 5, 2);
        let exact = probability_with(Strategy::Exact, &bag);
        let routed = probability_with(
            Strategy::Decomposition {
                epsilon: 0.0,
                mode: ApproximationMode::Relative,
            },
            &bag,
        );

        assert!((routed - exact).abs() < 1e-12);
    }
}

#[test]
fn heuristics_agree_on_the_exact_probability() {
    let mut rng = SplitMix64::from_seed(31_u64.to_le_bytes());

    for _ in 0..20 {
        let bag = random_bag(&mut rng, 6, 5, 3);

        let same_column = probability_with(Strategy::Exact, &bag);

        let mut group = Group::from_config(Config {
            strategy: Strategy::Exact,
            variable_selection: VariableSelection::MinLog,
            ..Config::default()
        });
        for clause in &bag {
            group.accumulate(clause).unwrap();
        }
        let min_log = group.finalize().unwrap();

        assert!(
            (same_column - min_log).abs() < 1e-9,
            "heuristics disagree: {same_column} vs {min_log}"
        );
    }
}
