//! Exact confidence computation by independent-component decomposition and variable elimination.
//!
//! # Overview
//!
//! The probability of a DNF over independent finite-domain variables is computed by two alternating moves:
//!
//! - **Independent split.**
//!   A connected component of the clause set under the shares-a-variable relation is probabilistically independent of the rest, so `P(D ∨ R) = 1 − (1 − P(D))(1 − P(R))`.
//! - **Variable elimination.**
//!   Within a component, some variable `v` is chosen and the component case-split over the declared outcomes of `v`.
//!   The outcomes are exhaustive and mutually exclusive --- the [world table](crate::db::world) completes every distribution --- so the component probability is the weighted sum, over outcomes `o`, of the probability of the clauses conditioned on `v = o`.
//!   Conditioning masks the `(v, o)` literals and drops any clause subsumed by a narrower one.
//!
//! Elimination of the last live literal of a clause makes the enclosing disjunction certain, and any partial probability reaching one short-circuits the remaining work.
//!
//! This is #P-complete in general and no internal bound is placed on the recursion: the caller guards pathological clause sets externally, or routes them to an approximate strategy.
//!
//! # Literature
//!
//! The decomposition mirrors the ws-tree method for confidence computation in U-relational databases:
//!
//! L. Antova, T. Jansen, C. Koch, and D. Olteanu. Fast and Simple Relational Processing of Uncertain Data. In Proc. ICDE, 2008.

use crate::{
    config::VariableSelection,
    db::world::WorldTable,
    generic::bitset::Bitset,
    misc::log::targets::{self},
    procedures::formula::{independent_or, Formula, OutcomeBranch, Overlay},
    structures::Clause,
};

/// The exact engine over one group's clauses.
pub(crate) struct Eliminator<'a> {
    formula: Formula<'a>,
    selection: VariableSelection,
}

/// The exact probability of the disjunction of `clauses`.
///
/// Expects a complete world table and resolved literal entries.
pub(crate) fn exact_probability(
    clauses: &[Clause],
    world: &WorldTable,
    selection: VariableSelection,
) -> f64 {
    if clauses.is_empty() {
        return 0.0;
    }

    log::trace!(target: targets::ELIMINATION, "Exact computation over {} clauses", clauses.len());

    let eliminator = Eliminator {
        formula: Formula { clauses, world },
        selection,
    };

    let set = Bitset::full(clauses.len());
    let overlay = Overlay::new(clauses);
    eliminator.probability(&set, &overlay, None)
}

impl Eliminator<'_> {
    /// The probability of the clause subset `set` under `overlay`.
    ///
    /// `column` is the clause column of the previously eliminated variable, steering the same-column heuristic.
    fn probability(&self, set: &Bitset, overlay: &Overlay, column: Option<usize>) -> f64 {
        if set.is_empty() {
            return 0.0;
        }

        let component = self.formula.component(set, overlay);

        let p_component = match component.as_singleton() {
            Some(index) => overlay.product(index),
            None => self.eliminate(&component, overlay, column),
        };

        if p_component == 1.0 {
            return 1.0;
        }

        let rest = component.complement_of(set);
        let p_rest = self.probability(&rest, overlay, column);

        independent_or(p_component, p_rest)
    }

    /// The probability of a connected `component` of more than one clause, by variable elimination.
    fn eliminate(&self, component: &Bitset, overlay: &Overlay, column: Option<usize>) -> f64 {
        let Some((entry_index, fresh_column)) =
            self.formula
                .choose_variable(component, overlay, self.selection, column)
        else {
            // No live literal remains, so some clause of the component holds outright.
            return 1.0;
        };

        let world = self.formula.world;
        let entry = world.entry(entry_index);
        let without = self.formula.without_variable(component, entry.var);

        let mut p_without: Option<f64> = None;
        let mut weighted_sum = 0.0;
        let single_outcome = entry.outcomes.len() == 1;

        for outcome_entry in &entry.outcomes {
            let mut branch = outcome_entry.probability;

            match self
                .formula
                .with_outcome(component, overlay, entry.var, outcome_entry.outcome)
            {
                OutcomeBranch::Absent => {
                    let p = match p_without {
                        Some(p) => p,
                        None => {
                            let p = self.probability(&without, overlay, Some(fresh_column));
                            p_without = Some(p);
                            p
                        }
                    };
                    branch *= p;
                }

                OutcomeBranch::Certain => {}

                OutcomeBranch::Masked(mut subset, masked) => {
                    self.formula.union_subsumed(&mut subset, &without, &masked);
                    branch *= self.probability(&subset, &masked, Some(fresh_column));
                }
            }

            weighted_sum += branch;

            if weighted_sum == 1.0 && single_outcome {
                return 1.0;
            }
        }

        weighted_sum
    }
}
