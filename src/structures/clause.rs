//! Clauses are conjunctions of literals --- the local condition under which one input tuple exists.
//!
//! The literals of a clause are pairwise on distinct variables.
//! This is an invariant the [lineage](crate::db::lineage) establishes on insertion by neutralizing duplicates, and every elimination procedure relies on it.
//!
//! A clause caches its probability --- the product of the effective probabilities of its literals --- as variable elimination reads clause probabilities far more often than literals.

use crate::structures::Literal;

/// A conjunction of literals over pairwise-distinct variables, with its cached probability.
#[derive(Clone, Debug)]
pub struct Clause {
    /// The literals of the clause, one per condition-column triple of the query.
    pub literals: Vec<Literal>,

    /// The product of the effective probabilities of the literals.
    pub probability: f64,
}

impl Clause {
    /// A clause over the given literals with its probability cached.
    ///
    /// Assumes the literals are already on pairwise-distinct variables.
    pub fn new(literals: Vec<Literal>) -> Self {
        let probability = literals
            .iter()
            .map(Literal::effective_probability)
            .product();

        Clause {
            literals,
            probability,
        }
    }

    /// The number of literals of the clause.
    pub fn arity(&self) -> usize {
        self.literals.len()
    }

    /// Whether some literal of the clause is on `var`, live or not.
    pub fn mentions(&self, var: crate::structures::Var) -> bool {
        self.literals.iter().any(|literal| literal.var == var)
    }
}
