//! Shared clause-subset machinery of the elimination engines.
//!
//! Both the exact and the decomposition-tree engine recurse by the same two moves:
//! splitting off an independent component of the clause set, and eliminating a variable by case-splitting over its declared outcomes.
//! The structures here carry those moves.
//!
//! # The overlay
//!
//! Eliminating outcome `o` of variable `v` conditions the clauses holding the literal `(v, o)` on that choice: the literal is removed and the clause probability divided by the literal's.
//! The removal is temporary --- sibling outcomes of the case split need the literal back.
//! Rather than mutating clauses and undoing the mutation in precisely paired calls, the engines thread an [Overlay]: a parallel liveness map plus recomputed products, cloned at each elimination branch.
//! A recursion branch owns its overlay outright, and there is nothing to restore.

use crate::{
    config::VariableSelection,
    db::world::WorldTable,
    generic::bitset::Bitset,
    structures::{Clause, Outcome, Var},
};

/// The probability of the disjunction of two independent events.
pub(crate) fn independent_or(a: f64, b: f64) -> f64 {
    a + b - a * b
}

/// The liveness of every clause literal on the current recursion path, with masked clause products.
#[derive(Clone, Debug)]
pub(crate) struct Overlay {
    /// Liveness per literal, clause-major.
    live: Vec<bool>,

    /// The common clause arity.
    arity: usize,

    /// The product of the live literals' effective probabilities, per clause.
    product: Vec<f64>,
}

impl Overlay {
    /// A fresh overlay with every literal live.
    pub fn new(clauses: &[Clause]) -> Self {
        let arity = clauses.first().map_or(0, Clause::arity);
        Overlay {
            live: vec![true; clauses.len() * arity],
            arity,
            product: clauses.iter().map(|clause| clause.probability).collect(),
        }
    }

    /// Whether literal `literal` of clause `clause` is live.
    pub fn is_live(&self, clause: usize, literal: usize) -> bool {
        self.live[clause * self.arity + literal]
    }

    /// The product of the live literals of `clause`.
    pub fn product(&self, clause: usize) -> f64 {
        self.product[clause]
    }

    /// Masks literal `literal` of clause `clause` and recomputes the clause product over the surviving literals.
    pub fn mask(&mut self, clauses: &[Clause], clause: usize, literal: usize) {
        self.live[clause * self.arity + literal] = false;

        let mut product = 1.0;
        for (index, lit) in clauses[clause].literals.iter().enumerate() {
            if self.is_live(clause, index) {
                product *= lit.effective_probability();
            }
        }
        self.product[clause] = product;
    }
}

/// The result of conditioning a clause subset on one (variable, outcome) choice.
pub(crate) enum OutcomeBranch {
    /// No clause of the subset holds a live literal on the choice.
    Absent,

    /// Masking the choice exhausted some clause: every clause agreeing with the choice is satisfied outright.
    Certain,

    /// The clauses agreeing with the choice, under an overlay with their matching literals masked.
    Masked(Bitset, Overlay),
}

/// A clause bag with its world table, as read by the elimination engines.
pub(crate) struct Formula<'a> {
    pub clauses: &'a [Clause],
    pub world: &'a WorldTable,
}

impl Formula<'_> {
    /// Whether two clauses share a live variable.
    fn dependent(&self, overlay: &Overlay, a: usize, b: usize) -> bool {
        for (i, left) in self.clauses[a].literals.iter().enumerate() {
            if !overlay.is_live(a, i) {
                continue;
            }
            for (j, right) in self.clauses[b].literals.iter().enumerate() {
                if overlay.is_live(b, j) && left.var == right.var {
                    return true;
                }
            }
        }
        false
    }

    /// One connected component of `set` under the shares-a-variable relation, grown from the first member.
    pub fn component(&self, set: &Bitset, overlay: &Overlay) -> Bitset {
        let mut component = Bitset::new(set.capacity());
        let Some(start) = set.first_set() else {
            return component;
        };

        component.set(start);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for candidate in set.iter() {
                if !component.test(candidate) && self.dependent(overlay, current, candidate) {
                    component.set(candidate);
                    stack.push(candidate);
                }
            }
        }

        component
    }

    /// The clauses of `set` with no literal on `var`, live or masked.
    ///
    /// A clause whose `var` literal was masked on the current path belongs to neither this subset nor any outcome branch of `var`.
    pub fn without_variable(&self, set: &Bitset, var: Var) -> Bitset {
        let mut subset = Bitset::new(set.capacity());
        for index in set.iter() {
            if !self.clauses[index].mentions(var) {
                subset.set(index);
            }
        }
        subset
    }

    /// The clauses of `set` holding a live literal `(var, outcome)`, conditioned on that choice.
    pub fn with_outcome(
        &self,
        set: &Bitset,
        overlay: &Overlay,
        var: Var,
        outcome: Outcome,
    ) -> OutcomeBranch {
        let mut subset = Bitset::new(set.capacity());
        let mut masked = overlay.clone();

        for index in set.iter() {
            for (position, literal) in self.clauses[index].literals.iter().enumerate() {
                if masked.is_live(index, position)
                    && literal.var == var
                    && literal.outcome == outcome
                {
                    subset.set(index);
                    masked.mask(self.clauses, index, position);

                    // A clause reduced to the empty conjunction holds in every
                    // world agreeing with the choice.
                    if masked.product(index) == 1.0 {
                        return OutcomeBranch::Certain;
                    }
                }
            }
        }

        match subset.is_empty() {
            true => OutcomeBranch::Absent,
            false => OutcomeBranch::Masked(subset, masked),
        }
    }

    /// Extends `target` with the clauses of `other`, dropping subsumed clauses of `other`.
    ///
    /// A clause of `other` is subsumed when the live variables of some clause of `target` all appear in it: the broader clause is absorbed by the narrower one in a disjunction.
    pub fn union_subsumed(&self, target: &mut Bitset, other: &Bitset, overlay: &Overlay) {
        let mut survivors = other.clone();

        for narrow in target.iter() {
            for broad in other.iter() {
                if !survivors.test(broad) {
                    continue;
                }

                let absorbed = self.clauses[narrow]
                    .literals
                    .iter()
                    .enumerate()
                    .filter(|(position, _)| overlay.is_live(narrow, *position))
                    .all(|(_, literal)| self.clauses[broad].mentions(literal.var));

                if absorbed {
                    survivors.clear(broad);
                }
            }
        }

        target.union(&survivors);
    }

    /// Chooses the next variable to eliminate from the live literals of `set`.
    ///
    /// Returns the world-table entry index of the variable and the clause column it was found in, or None when no live literal remains.
    pub fn choose_variable(
        &self,
        set: &Bitset,
        overlay: &Overlay,
        selection: VariableSelection,
        column: Option<usize>,
    ) -> Option<(usize, usize)> {
        match selection {
            VariableSelection::SameColumn => self.choose_same_column(set, overlay, column),
            VariableSelection::MinLog => self.choose_min_log(set, overlay),
        }
    }

    /// The most frequent variable of the previously eliminated column, falling back to the most frequent variable overall.
    fn choose_same_column(
        &self,
        set: &Bitset,
        overlay: &Overlay,
        column: Option<usize>,
    ) -> Option<(usize, usize)> {
        let mut occurrences = vec![0_usize; self.world.len()];
        let mut same_column: Option<(usize, usize, usize)> = None;
        let mut any_column: Option<(usize, usize, usize)> = None;

        for index in set.iter() {
            for (position, literal) in self.clauses[index].literals.iter().enumerate() {
                if !overlay.is_live(index, position) {
                    continue;
                }

                let entry = literal.entry;
                occurrences[entry] += 1;

                if Some(position) == column {
                    if same_column.is_none_or(|(_, best, _)| occurrences[entry] > best) {
                        same_column = Some((entry, occurrences[entry], position));
                    }
                } else if same_column.is_none()
                    && any_column.is_none_or(|(_, best, _)| occurrences[entry] > best)
                {
                    any_column = Some((entry, occurrences[entry], position));
                }
            }
        }

        same_column
            .or(any_column)
            .map(|(entry, _, position)| (entry, position))
    }

    /// The variable minimizing a logarithmic proxy for the sizes of the partitions its elimination produces.
    fn choose_min_log(&self, set: &Bitset, overlay: &Overlay) -> Option<(usize, usize)> {
        let mut counts: Vec<Vec<usize>> = self
            .world
            .entries()
            .map(|entry| vec![0; entry.outcomes.len()])
            .collect();
        let mut first_column = vec![usize::MAX; self.world.len()];
        let mut set_size = 0_usize;

        for index in set.iter() {
            set_size += 1;
            for (position, literal) in self.clauses[index].literals.iter().enumerate() {
                if overlay.is_live(index, position) {
                    counts[literal.entry][literal.outcome_entry] += 1;
                    if first_column[literal.entry] == usize::MAX {
                        first_column[literal.entry] = position;
                    }
                }
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for (entry, outcome_counts) in counts.iter().enumerate() {
            let assignments: usize = outcome_counts.iter().sum();
            if assignments == 0 {
                continue;
            }

            // The reserved variable may occur several times in one clause, so
            // assignments can exceed the set size.
            let uncovered = set_size as i64 - assignments as i64;
            let value = (outcome_counts.len() as i64 * uncovered + assignments as i64) as f64;

            if best.is_none_or(|(_, least)| value < least) {
                best = Some((entry, value));
            }
        }

        best.map(|(entry, _)| (entry, first_column[entry]))
    }

    /// Cheap probability bounds for `set` by bucketing.
    ///
    /// Clauses are greedily grouped into buckets sharing no live variable; the probability of a bucket is the disjunction of its members.
    /// The true probability of `set` is at least the best bucket and at most the sum of all buckets.
    pub fn bucket_bounds(&self, set: &Bitset, overlay: &Overlay) -> (f64, f64) {
        struct Bucket {
            vars: Vec<Var>,
            probability: f64,
        }

        let mut buckets: Vec<Bucket> = Vec::new();

        for index in set.iter() {
            let live_vars = || {
                self.clauses[index]
                    .literals
                    .iter()
                    .enumerate()
                    .filter(|(position, _)| overlay.is_live(index, *position))
                    .map(|(_, literal)| literal.var)
            };

            let home = buckets
                .iter()
                .position(|bucket| live_vars().all(|var| !bucket.vars.contains(&var)));

            let home = match home {
                Some(home) => home,
                None => {
                    buckets.push(Bucket {
                        vars: Vec::new(),
                        probability: 0.0,
                    });
                    buckets.len() - 1
                }
            };

            buckets[home].vars.extend(live_vars());
            buckets[home].probability =
                independent_or(buckets[home].probability, overlay.product(index));
        }

        let mut sum = 0.0;
        let mut max = 0.0;
        for bucket in &buckets {
            sum += bucket.probability;
            if bucket.probability > max {
                max = bucket.probability;
            }
        }

        (max, sum.min(1.0))
    }
}
