//! Lineage --- the clauses or raw tuples contributed by one duplicate-elimination group.
//!
//! Two forms are kept, by strategy:
//!
//! - The clause bag, for the exact, decomposition, and Monte-Carlo strategies, which need random access to clauses during a finalize call.
//! - The tuple lineage, for the one-scan strategy when pre-aggregation is required, holding raw (variable, probability) rows to be streamed --- possibly more than once --- in their sorted input order.
//!
//! [advance](ClauseBag::advance) establishes the invariants the elimination procedures rely on:
//! no clause holds two literals on one variable (the later literal is neutralized to the [reserved variable](crate::structures::RESERVED_VAR)), every clause carries its cached probability, and every literal's variable and outcome are interned in the world table.

use crate::{
    db::world::WorldTable,
    structures::{Clause, Literal, Var, RESERVED_OUTCOME, RESERVED_VAR},
    types::err::{self},
};

/// The ordered bag of clauses of one group.
#[derive(Clone, Debug, Default)]
pub struct ClauseBag {
    /// The clauses, in accumulation order.
    clauses: Vec<Clause>,

    /// The arity fixed by the first clause.
    arity: Option<usize>,
}

impl ClauseBag {
    /// The number of clauses in the bag.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Whether the bag holds no clause.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The clauses of the bag.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Appends one clause built from `literals`, maintaining the bag invariants.
    ///
    /// Duplicate variables within the clause are neutralized, the clause probability is cached, and every literal is interned in `world`.
    pub fn advance(
        &mut self,
        mut literals: Vec<Literal>,
        world: &mut WorldTable,
    ) -> Result<(), err::ErrorKind> {
        if literals.is_empty() {
            return Err(err::LineageError::EmptyClause.into());
        }

        match self.arity {
            None => self.arity = Some(literals.len()),
            Some(arity) => {
                if arity != literals.len() {
                    return Err(err::LineageError::ArityMismatch {
                        expected: arity,
                        found: literals.len(),
                    }
                    .into());
                }
            }
        }

        for literal in &literals {
            let p = literal.probability;
            if !(p > 0.0 && p <= 1.0) {
                return Err(err::WorldTableError::InvalidProbability {
                    var: literal.var,
                    probability: p,
                }
                .into());
            }
        }

        // Two literals on one variable would break exhaustive case-splitting
        // during elimination, so the later one becomes the reserved constant.
        for earlier in 0..literals.len() {
            for later in earlier + 1..literals.len() {
                if literals[later].var == literals[earlier].var {
                    literals[later] = Literal::new(RESERVED_VAR, RESERVED_OUTCOME, 1.0);
                }
            }
        }

        for literal in &literals {
            world.intern(literal.var, literal.outcome, literal.probability);
        }

        self.clauses.push(Clause::new(literals));
        Ok(())
    }

    /// Resolves the cached world-table indices of every literal.
    ///
    /// Called once per finalize, after the world table is complete.
    pub fn resolve_entries(&mut self, world: &WorldTable) {
        for clause in &mut self.clauses {
            for literal in &mut clause.literals {
                let entry = world
                    .index_of(literal.var)
                    .expect("literal variable missing from the world table");
                let outcome_entry = world
                    .entry(entry)
                    .outcomes
                    .iter()
                    .position(|o| o.outcome == literal.outcome)
                    .expect("literal outcome missing from its world entry");

                literal.entry = entry;
                literal.outcome_entry = outcome_entry;
            }
        }
    }

    /// Sorts the bag by descending clause probability.
    ///
    /// The decomposition-tree engine fills buckets greedily, and greedy bucketing bounds are tightest on probability-sorted input.
    pub fn sort_descending(&mut self) {
        self.clauses.sort_unstable_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Releases the clauses of the group.
    pub fn reset(&mut self) {
        self.clauses.clear();
        self.clauses.shrink_to_fit();
        self.arity = None;
    }
}

/// One raw lineage row of the one-scan strategy.
#[derive(Clone, Debug)]
pub struct Row {
    /// The variable of each condition column.
    pub vars: Vec<Var>,

    /// The probability of each condition column, parallel to `vars`.
    pub probs: Vec<f64>,
}

/// The raw tuple lineage of one group, in sorted input order.
#[derive(Clone, Debug, Default)]
pub struct TupleLineage {
    /// The rows, in accumulation order.
    rows: Vec<Row>,

    /// The width fixed by the first row.
    width: Option<usize>,
}

impl TupleLineage {
    /// The number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row is stored.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The stored rows, in input order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Appends one row.
    pub fn store(&mut self, vars: &[Var], probs: &[f64]) -> Result<(), err::ErrorKind> {
        if vars.is_empty() || vars.len() != probs.len() {
            return Err(err::LineageError::EmptyClause.into());
        }

        match self.width {
            None => self.width = Some(vars.len()),
            Some(width) => {
                if width != vars.len() {
                    return Err(err::LineageError::ArityMismatch {
                        expected: width,
                        found: vars.len(),
                    }
                    .into());
                }
            }
        }

        self.rows.push(Row {
            vars: vars.to_vec(),
            probs: probs.to_vec(),
        });
        Ok(())
    }

    /// Releases the rows of the group.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.rows.shrink_to_fit();
        self.width = None;
    }
}

#[cfg(test)]
mod lineage_tests {
    use super::*;

    #[test]
    fn duplicate_variables_neutralized() {
        let mut world = WorldTable::default();
        let mut bag = ClauseBag::default();

        let literals = vec![Literal::new(5, 1, 0.3), Literal::new(5, 2, 0.7)];
        assert!(bag.advance(literals, &mut world).is_ok());

        let clause = &bag.clauses()[0];
        assert_eq!(clause.literals[0].var, 5);
        assert_eq!(clause.literals[1].var, RESERVED_VAR);
        assert!((clause.probability - 0.3).abs() < 1e-12);
    }

    #[test]
    fn arity_is_fixed_by_the_first_clause() {
        let mut world = WorldTable::default();
        let mut bag = ClauseBag::default();

        assert!(bag
            .advance(vec![Literal::new(1, 1, 0.5), Literal::new(2, 1, 0.5)], &mut world)
            .is_ok());

        assert!(matches!(
            bag.advance(vec![Literal::new(3, 1, 0.5)], &mut world),
            Err(err::ErrorKind::Lineage(err::LineageError::ArityMismatch {
                expected: 2,
                found: 1
            }))
        ));
    }

    #[test]
    fn invalid_probability_rejected() {
        let mut world = WorldTable::default();
        let mut bag = ClauseBag::default();

        for p in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                bag.advance(vec![Literal::new(1, 1, p)], &mut world),
                Err(err::ErrorKind::WorldTable(
                    err::WorldTableError::InvalidProbability { .. }
                ))
            ));
        }
    }
}
