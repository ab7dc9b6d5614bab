//! Approximate confidence computation over a decomposition tree, with a provable error bound.
//!
//! # Overview
//!
//! The recursion has the same shape as the [exact engine](crate::procedures::exact) --- independent split, then case-split over a chosen variable's outcomes --- but a node is not obliged to resolve its subtree.
//! Instead every node carries cheap `[lower, upper]` bounds, obtained by [bucketing](crate::procedures::formula::Formula::bucket_bounds), and refines its outcome branches one at a time, each refinement tightening the bounds.
//!
//! Whether tighter bounds at a node are worth having is a *global* question, so each call receives a linear [Transform] mapping its local bounds into bounds on the whole tree's probability:
//! a node's siblings contribute fixed coefficients and constants, accumulated on the way down.
//! Refinement stops --- everywhere --- once the whole-tree gap reaches the stopping number derived from the target ε, and a single branch is closed early when its marginal contribution cannot move the gap by more than a small fraction of that number.
//!
//! The returned interval always contains the exact probability, and on termination its (relative or absolute) width is within the target.
//! With ε = 0 the caller must use the exact engine instead: a zero-tolerance approximation never terminates by its own stopping rule.
//!
//! # Literature
//!
//! D. Olteanu, J. Huang, and C. Koch. Approximate Confidence Computation in Probabilistic Databases. In Proc. ICDE, 2010.

use crate::{
    config::{ApproximationMode, VariableSelection},
    db::world::WorldTable,
    generic::bitset::Bitset,
    misc::log::targets::{self},
    procedures::formula::{independent_or, Formula, OutcomeBranch, Overlay},
    structures::Clause,
};

/// The fraction of the stopping number below which refining one branch is not worth the work.
const LEAF_CLOSE_FRACTION: f64 = 0.001;

/// A bounded approximation of a group's probability.
#[derive(Clone, Copy, Debug)]
pub struct Approximation {
    /// A lower bound on the exact probability.
    pub lower: f64,

    /// An upper bound on the exact probability.
    pub upper: f64,

    /// The point estimate derived from the bounds and the approximation mode.
    pub estimate: f64,
}

/// Bounds on the probability of one subtree.
#[derive(Clone, Copy, Debug)]
struct Bounds {
    lower: f64,
    upper: f64,
}

/// How one node's local bounds map into bounds on the whole tree.
///
/// The upper and lower coefficients and constants give `whole = coef · local + const`.
/// The condition pair is the variant used when deciding whether a branch may be closed, which reads refined branches at their upper bounds and unrefined branches at their lower bounds.
#[derive(Clone, Copy, Debug)]
struct Transform {
    coef_upper: f64,
    const_upper: f64,
    coef_lower: f64,
    const_lower: f64,
    cond_coef_upper: f64,
    cond_const_upper: f64,
}

impl Transform {
    const IDENTITY: Transform = Transform {
        coef_upper: 1.0,
        const_upper: 0.0,
        coef_lower: 1.0,
        const_lower: 0.0,
        cond_coef_upper: 1.0,
        cond_const_upper: 0.0,
    };
}

/// How one outcome branch was classified on the cheap-bounds pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BranchState {
    /// No clause holds the outcome; the branch is the without-variable subset.
    Null,

    /// Some clause was exhausted; the branch is certain and refinement cannot tighten it.
    Empty,

    /// The branch is the union of the agreeing clauses (masked) and the without-variable subset.
    Union,
}

/// The decomposition-tree engine over one group's clauses.
struct Approximator<'a> {
    formula: Formula<'a>,
    selection: VariableSelection,
    relative: bool,
    stopping: f64,
    satisfied: bool,
}

/// A bounded approximation of the probability of the disjunction of `clauses`, to relative or absolute error ε.
///
/// Expects a complete world table, resolved literal entries, clauses sorted by descending probability, and ε > 0.
pub(crate) fn approximate_probability(
    clauses: &[Clause],
    world: &WorldTable,
    selection: VariableSelection,
    epsilon: f64,
    mode: ApproximationMode,
) -> Approximation {
    let relative = mode == ApproximationMode::Relative;

    let stopping = match relative {
        true => 2.0 * epsilon / (1.0 - epsilon),
        false => 2.0 * epsilon,
    };

    let mut approximator = Approximator {
        formula: Formula { clauses, world },
        selection,
        relative,
        stopping,
        satisfied: false,
    };

    let set = Bitset::full(clauses.len());
    let overlay = Overlay::new(clauses);

    // The whole bag may already be bounded tightly enough without building a single node.
    let (mut lower, mut upper) = approximator.formula.bucket_bounds(&set, &overlay);

    if approximator.gap(upper, lower) > stopping {
        let bounds = approximator.refine(&set, &overlay, 1.0, &Transform::IDENTITY, None);
        lower = bounds.lower;
        upper = bounds.upper;
    }

    log::trace!(target: targets::DECOMPOSITION, "Bounds [{lower}, {upper}] for {} clauses", clauses.len());

    let estimate = match relative {
        true => (upper * (1.0 - epsilon) + lower * (1.0 + epsilon)) / 2.0,
        false => (upper + lower) / 2.0,
    };

    Approximation {
        lower,
        upper,
        estimate,
    }
}

impl Approximator<'_> {
    /// The gap between bounds, in the configured reading.
    fn gap(&self, upper: f64, lower: f64) -> f64 {
        match self.relative {
            true => (upper - lower) / lower,
            false => upper - lower,
        }
    }

    /// Bounds for the clause subset `set` under `overlay`, refined until the whole-tree gap closes.
    ///
    /// `path_probability` is the product of outcome probabilities on the path to this node, weighing the marginal worth of refining a branch here.
    fn refine(
        &mut self,
        set: &Bitset,
        overlay: &Overlay,
        path_probability: f64,
        transform: &Transform,
        column: Option<usize>,
    ) -> Bounds {
        if set.is_empty() {
            return Bounds {
                lower: 0.0,
                upper: 0.0,
            };
        }

        let component = self.formula.component(set, overlay);
        let rest = component.complement_of(set);
        let (right_lower, right_upper) = self.formula.bucket_bounds(&rest, overlay);

        let left = match component.as_singleton() {
            Some(index) => Bounds {
                lower: overlay.product(index),
                upper: overlay.product(index),
            },
            None => match self.eliminate(
                &component,
                overlay,
                path_probability,
                transform,
                column,
                right_lower,
                right_upper,
            ) {
                Some(bounds) => bounds,
                // No live literal remains: the component holds outright.
                None => {
                    return Bounds {
                        lower: 1.0,
                        upper: 1.0,
                    }
                }
            },
        };

        let whole_upper =
            transform.coef_upper * independent_or(left.upper, right_upper) + transform.const_upper;
        let whole_lower =
            transform.coef_lower * independent_or(left.lower, right_lower) + transform.const_lower;

        if self.gap(whole_upper, whole_lower) <= self.stopping {
            self.satisfied = true;
        }

        let mut right = Bounds {
            lower: right_lower,
            upper: right_upper,
        };

        if !self.satisfied && right_lower != 0.0 {
            let descend = Transform {
                coef_upper: transform.coef_upper * (1.0 - left.upper),
                const_upper: transform.const_upper + transform.coef_upper * left.upper,
                coef_lower: transform.coef_lower * (1.0 - left.lower),
                const_lower: transform.const_lower + transform.coef_lower * left.lower,
                cond_coef_upper: transform.coef_upper * (1.0 - left.upper),
                cond_const_upper: transform.const_upper + transform.coef_upper * left.upper,
            };

            right = self.refine(&rest, overlay, path_probability, &descend, column);
        }

        Bounds {
            lower: independent_or(left.lower, right.lower),
            upper: independent_or(left.upper, right.upper),
        }
    }

    /// Bounds for a connected component of more than one clause, by refining the outcomes of a chosen variable.
    ///
    /// None when every live literal of the component is exhausted.
    #[allow(clippy::too_many_arguments)]
    fn eliminate(
        &mut self,
        component: &Bitset,
        overlay: &Overlay,
        path_probability: f64,
        transform: &Transform,
        column: Option<usize>,
        right_lower: f64,
        right_upper: f64,
    ) -> Option<Bounds> {
        let (entry_index, _) =
            self.formula
                .choose_variable(component, overlay, self.selection, column)?;

        let world = self.formula.world;
        let entry = world.entry(entry_index);
        let var = entry.var;
        let without = self.formula.without_variable(component, var);

        let count = entry.outcomes.len();
        let mut uppers = vec![0.0; count];
        let mut lowers = vec![0.0; count];
        let mut states = vec![BranchState::Empty; count];
        let mut without_bounds: Option<(f64, f64)> = None;

        // First round: cheap bounds per outcome.
        for (branch, outcome_entry) in entry.outcomes.iter().enumerate() {
            let p_outcome = outcome_entry.probability;

            match self
                .formula
                .with_outcome(component, overlay, var, outcome_entry.outcome)
            {
                OutcomeBranch::Absent => {
                    let (lower, upper) = *without_bounds
                        .get_or_insert_with(|| self.formula.bucket_bounds(&without, overlay));
                    lowers[branch] = p_outcome * lower;
                    uppers[branch] = p_outcome * upper;
                    states[branch] = BranchState::Null;
                }

                OutcomeBranch::Certain => {
                    lowers[branch] = p_outcome;
                    uppers[branch] = p_outcome;
                    states[branch] = BranchState::Empty;
                }

                OutcomeBranch::Masked(mut subset, masked) => {
                    subset.union(&without);
                    let (lower, upper) = self.formula.bucket_bounds(&subset, &masked);
                    lowers[branch] = p_outcome * lower;
                    uppers[branch] = p_outcome * upper;
                    states[branch] = BranchState::Union;
                }
            }
        }

        // Second round: refine branch by branch, tightest question first --- is the gap closed?
        for branch in 0..count {
            let aggregate_upper: f64 = uppers.iter().sum();
            let aggregate_lower: f64 = lowers.iter().sum();

            // Refined branches at their upper bounds, unrefined at their lower.
            let condition_aggregate: f64 = uppers[..branch].iter().sum::<f64>()
                + lowers[branch + 1..].iter().sum::<f64>();

            let whole_upper = transform.coef_upper
                * independent_or(aggregate_upper, right_upper)
                + transform.const_upper;
            let whole_lower = transform.coef_lower
                * independent_or(aggregate_lower, right_lower)
                + transform.const_lower;
            let condition_whole_upper = transform.cond_coef_upper
                * independent_or(condition_aggregate, right_lower)
                + transform.cond_const_upper;

            if self.gap(whole_upper, whole_lower) <= self.stopping {
                self.satisfied = true;
                break;
            }

            if self.gap(condition_whole_upper, whole_lower) <= self.stopping {
                let margin = (uppers[branch] - lowers[branch]) * path_probability;
                let margin = match self.relative {
                    true => margin / whole_lower,
                    false => margin,
                };

                if margin <= LEAF_CLOSE_FRACTION * self.stopping {
                    continue;
                }
            }

            let p_outcome = entry.outcomes[branch].probability;
            let upper_rest = aggregate_upper - uppers[branch];
            let lower_rest = aggregate_lower - lowers[branch];

            let descend = Transform {
                coef_upper: transform.coef_upper * (1.0 - right_upper) * p_outcome,
                const_upper: transform.const_upper
                    + transform.coef_upper * independent_or(right_upper, upper_rest),
                coef_lower: transform.coef_lower * (1.0 - right_lower) * p_outcome,
                const_lower: transform.const_lower
                    + transform.coef_lower * independent_or(right_lower, lower_rest),
                cond_coef_upper: transform.coef_lower * (1.0 - right_lower) * p_outcome,
                cond_const_upper: transform.cond_const_upper
                    + transform.cond_coef_upper * independent_or(right_lower, condition_aggregate),
            };

            match states[branch] {
                BranchState::Null => {
                    let bounds = self.refine(
                        &without,
                        overlay,
                        path_probability * p_outcome,
                        &descend,
                        column,
                    );
                    lowers[branch] = p_outcome * bounds.lower;
                    uppers[branch] = p_outcome * bounds.upper;
                }

                // Refinement cannot narrow a certain branch.
                BranchState::Empty => {}

                BranchState::Union => {
                    let OutcomeBranch::Masked(mut subset, masked) = self.formula.with_outcome(
                        component,
                        overlay,
                        var,
                        entry.outcomes[branch].outcome,
                    ) else {
                        unreachable!("branch classification is deterministic");
                    };

                    self.formula.union_subsumed(&mut subset, &without, &masked);

                    let bounds = self.refine(
                        &subset,
                        &masked,
                        path_probability * p_outcome,
                        &descend,
                        column,
                    );
                    lowers[branch] = p_outcome * bounds.lower;
                    uppers[branch] = p_outcome * bounds.upper;
                }
            }

            if self.satisfied {
                break;
            }
        }

        Some(Bounds {
            lower: lowers.iter().sum(),
            upper: uppers.iter().sum(),
        })
    }
}
