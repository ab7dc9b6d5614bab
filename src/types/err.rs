//! Error types used in the library.
//!
//! - Invalid input is reported once, through the finalize call of a [group](crate::context), and computation for that group aborts without a result.
//! - Contract violations --- an out-of-range [bitset](crate::generic::bitset) index, an unsorted one-scan lineage --- are not errors.
//!   The former panics, the latter is a documented precondition.
//! - Approximation non-convergence does not exist: the approximate engines always terminate with a valid bounded or estimated result.
//!
//! Names of the error enums --- for the most part --- overlap with the module the error originates in.
//  As such, throughout the library err::{self} is often used to prefix use of the types with `err::`.

use crate::structures::Var;

/// The crate-level error, wrapping the specific errors below.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    WorldTable(WorldTableError),
    Lineage(LineageError),
    Signature(SignatureError),
    Finalize(FinalizeError),
}

/// Noted errors while maintaining the world table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorldTableError {
    /// An observed literal probability outside (0, 1].
    InvalidProbability { var: Var, probability: f64 },

    /// The outcome probabilities of a variable sum to more than one, beyond numerical slack.
    MassExceedsOne { var: Var, mass: f64 },
}

impl From<WorldTableError> for ErrorKind {
    fn from(e: WorldTableError) -> Self {
        ErrorKind::WorldTable(e)
    }
}

/// Noted errors while accumulating lineage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LineageError {
    /// A clause or tuple whose arity differs from the first of its group.
    ///
    /// Arity is constant per query --- one literal per condition-column triple.
    ArityMismatch { expected: usize, found: usize },

    /// A clause with no literals.
    EmptyClause,
}

impl From<LineageError> for ErrorKind {
    fn from(e: LineageError) -> Self {
        ErrorKind::Lineage(e)
    }
}

/// Noted errors while building a signature.
///
/// These indicate the one-scan strategy does not apply to the query, and are raised loudly at construction rather than risking a silent mis-computation during a scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SignatureError {
    /// Two subgoal groups partially overlap, so the query is not hierarchical.
    NotHierarchical,

    /// A relation appears twice within one subgoal group.
    SelfJoin,

    /// A subgoal group names a relation outside the declared range.
    UnknownRelation { relation: usize },

    /// A join description with no relations.
    Empty,
}

impl From<SignatureError> for ErrorKind {
    fn from(e: SignatureError) -> Self {
        ErrorKind::Signature(e)
    }
}

/// Noted errors when finalizing a group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FinalizeError {
    /// The one-scan strategy is configured but no signature was supplied.
    MissingSignature,

    /// An approximation target outside its valid range --- ε < 0, or δ outside (0, 1).
    ///
    /// ε = 0 for the decomposition strategy is not an error: it routes to the exact engine.
    InvalidApproximationTarget,

    /// A clause strategy received one-scan rows, or the reverse.
    MixedInput,

    /// A bound certificate was requested from a strategy other than decomposition.
    StrategyMismatch,
}

impl From<FinalizeError> for ErrorKind {
    fn from(e: FinalizeError) -> Self {
        ErrorKind::Finalize(e)
    }
}
