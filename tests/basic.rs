use uconf::{
    config::{ApproximationMode, Config, Strategy},
    context::Group,
    structures::Literal,
    types::err::{self, ErrorKind},
};

fn group_with(strategy: Strategy) -> Group {
    Group::from_config(Config {
        strategy,
        ..Config::default()
    })
}

mod single_clause {
    use super::*;

    const P: f64 = 0.37;

    #[test]
    fn exact() {
        let mut group = group_with(Strategy::Exact);
        group.accumulate(&[Literal::new(1, 1, P)]).unwrap();
        assert!((group.finalize().unwrap() - P).abs() < 1e-9);
    }

    #[test]
    fn decomposition() {
        let mut group = group_with(Strategy::Decomposition {
            epsilon: 0.1,
            mode: ApproximationMode::Relative,
        });
        group.accumulate(&[Literal::new(1, 1, P)]).unwrap();

        // A single clause is bounded exactly: the estimate collapses to P.
        assert!((group.finalize().unwrap() - P).abs() < 1e-9);
    }

    #[test]
    fn decomposition_bounds_are_tight() {
        let mut group = group_with(Strategy::Decomposition {
            epsilon: 0.1,
            mode: ApproximationMode::Relative,
        });
        group.accumulate(&[Literal::new(1, 1, P)]).unwrap();

        let approximation = group.finalize_approximation().unwrap();
        assert!((approximation.lower - P).abs() < 1e-9);
        assert!((approximation.upper - P).abs() < 1e-9);
    }

    #[test]
    fn monte_carlo() {
        let epsilon = 0.05;
        let mut group = group_with(Strategy::MonteCarlo {
            epsilon,
            delta: 0.01,
        });
        group.accumulate(&[Literal::new(1, 1, P)]).unwrap();

        let estimate = group.finalize().unwrap();
        assert!((estimate - P).abs() <= epsilon * P);
    }
}

mod independent_clauses {
    use super::*;

    const P1: f64 = 0.4;
    const P2: f64 = 0.25;

    fn expected() -> f64 {
        P1 + P2 - P1 * P2
    }

    fn feed(group: &mut Group) {
        group.accumulate(&[Literal::new(1, 1, P1)]).unwrap();
        group.accumulate(&[Literal::new(2, 1, P2)]).unwrap();
    }

    #[test]
    fn exact() {
        let mut group = group_with(Strategy::Exact);
        feed(&mut group);
        assert!((group.finalize().unwrap() - expected()).abs() < 1e-9);
    }

    #[test]
    fn decomposition() {
        let epsilon = 0.05;
        let mut group = group_with(Strategy::Decomposition {
            epsilon,
            mode: ApproximationMode::Relative,
        });
        feed(&mut group);

        let estimate = group.finalize().unwrap();
        assert!((estimate - expected()).abs() <= epsilon * expected() + 1e-9);
    }

    #[test]
    fn monte_carlo() {
        let epsilon = 0.05;
        let mut group = group_with(Strategy::MonteCarlo {
            epsilon,
            delta: 0.01,
        });
        feed(&mut group);

        let estimate = group.finalize().unwrap();
        assert!((estimate - expected()).abs() <= epsilon * expected());
    }
}

mod neutralization {
    use super::*;

    #[test]
    fn duplicate_variable_keeps_the_first_literal() {
        // Two literals on one variable: the later is neutralized, so the
        // clause behaves as the surviving literal alone.
        let mut group = group_with(Strategy::Exact);
        group
            .accumulate(&[Literal::new(7, 1, 0.6), Literal::new(7, 2, 0.3)])
            .unwrap();
        assert!((group.finalize().unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn duplicate_assignment_collapses() {
        let mut group = group_with(Strategy::Exact);
        group
            .accumulate(&[Literal::new(7, 1, 0.6), Literal::new(7, 1, 0.6)])
            .unwrap();
        assert!((group.finalize().unwrap() - 0.6).abs() < 1e-9);
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn empty_group_has_probability_zero() {
        let mut group = group_with(Strategy::Exact);
        assert_eq!(group.finalize(), Ok(0.0));
    }

    #[test]
    fn groups_are_independent() {
        let mut group = group_with(Strategy::Exact);

        group.accumulate(&[Literal::new(1, 1, 0.5)]).unwrap();
        assert!((group.finalize().unwrap() - 0.5).abs() < 1e-9);

        // The same context, fresh group: nothing of the first survives.
        group.accumulate(&[Literal::new(2, 1, 0.125)]).unwrap();
        assert!((group.finalize().unwrap() - 0.125).abs() < 1e-9);
    }

    #[test]
    fn fixed_seed_fixed_estimate() {
        let estimate_with_seed = |seed: u64| {
            let mut group = Group::from_config(Config {
                strategy: Strategy::MonteCarlo {
                    epsilon: 0.1,
                    delta: 0.05,
                },
                seed,
                ..Config::default()
            });
            for var in 1..5_u32 {
                group
                    .accumulate(&[Literal::new(var, 1, 0.3), Literal::new(var + 10, 1, 0.7)])
                    .unwrap();
            }
            group.finalize().unwrap()
        };

        assert_eq!(estimate_with_seed(11), estimate_with_seed(11));
        assert_ne!(estimate_with_seed(11), estimate_with_seed(13));
    }
}

mod rejected_input {
    use super::*;

    #[test]
    fn probability_out_of_range() {
        let mut group = group_with(Strategy::Exact);
        assert!(matches!(
            group.accumulate(&[Literal::new(1, 1, 1.5)]),
            Err(ErrorKind::WorldTable(
                err::WorldTableError::InvalidProbability { var: 1, .. }
            ))
        ));
    }

    #[test]
    fn outcome_mass_beyond_one() {
        let mut group = group_with(Strategy::Exact);
        group.accumulate(&[Literal::new(1, 1, 0.8)]).unwrap();
        group.accumulate(&[Literal::new(1, 2, 0.8)]).unwrap();

        assert!(matches!(
            group.finalize(),
            Err(ErrorKind::WorldTable(
                err::WorldTableError::MassExceedsOne { var: 1, .. }
            ))
        ));

        // The failed group is released all the same.
        assert_eq!(group.finalize(), Ok(0.0));
    }

    #[test]
    fn arity_is_fixed_per_group() {
        let mut group = group_with(Strategy::Exact);
        group
            .accumulate(&[Literal::new(1, 1, 0.5), Literal::new(2, 1, 0.5)])
            .unwrap();

        assert!(matches!(
            group.accumulate(&[Literal::new(3, 1, 0.5)]),
            Err(ErrorKind::Lineage(err::LineageError::ArityMismatch { .. }))
        ));
    }

    #[test]
    fn rows_rejected_by_clause_strategies() {
        let mut group = group_with(Strategy::Exact);
        assert_eq!(
            group.accumulate_row(&[1], &[0.5]),
            Err(ErrorKind::Finalize(err::FinalizeError::MixedInput))
        );
    }

    #[test]
    fn clauses_rejected_by_one_scan() {
        let mut group = group_with(Strategy::OneScan);
        assert_eq!(
            group.accumulate(&[Literal::new(1, 1, 0.5)]),
            Err(ErrorKind::Finalize(err::FinalizeError::MixedInput))
        );
    }

    #[test]
    fn one_scan_requires_a_signature() {
        let mut group = group_with(Strategy::OneScan);
        assert_eq!(
            group.accumulate_row(&[1], &[0.5]),
            Err(ErrorKind::Finalize(err::FinalizeError::MissingSignature))
        );
    }

    #[test]
    fn invalid_monte_carlo_targets() {
        for (epsilon, delta) in [(0.0, 0.01), (-0.1, 0.01), (0.05, 0.0), (0.05, 1.0)] {
            let mut group = group_with(Strategy::MonteCarlo { epsilon, delta });
            group.accumulate(&[Literal::new(1, 1, 0.5)]).unwrap();
            assert_eq!(
                group.finalize(),
                Err(ErrorKind::Finalize(
                    err::FinalizeError::InvalidApproximationTarget
                ))
            );
        }
    }

    #[test]
    fn negative_epsilon_rejected() {
        let mut group = group_with(Strategy::Decomposition {
            epsilon: -0.5,
            mode: ApproximationMode::Relative,
        });
        group.accumulate(&[Literal::new(1, 1, 0.5)]).unwrap();
        assert_eq!(
            group.finalize(),
            Err(ErrorKind::Finalize(
                err::FinalizeError::InvalidApproximationTarget
            ))
        );
    }
}

mod negated_literals {
    use super::*;

    #[test]
    fn effective_probability_is_complemented() {
        // A negated literal stands for every other assignment of its variable.
        let mut group = group_with(Strategy::Exact);
        group
            .accumulate(&[Literal::negated(1, 1, 0.3), Literal::new(2, 1, 0.5)])
            .unwrap();
        assert!((group.finalize().unwrap() - 0.7 * 0.5).abs() < 1e-9);
    }
}
