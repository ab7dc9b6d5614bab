//! A library for confidence computation in tuple-independent and U-relational probabilistic databases.
//!
//! To compute the confidence in a tuple of data values occurring possibly in several tuples of a U-relation, the probability of the disjunction of the local conditions of all those tuples has to be computed: the sum of the weights of the possible worlds --- valuations of independent finite-domain random variables --- under which the disjunction holds.
//! The result is not the sum of the individual clause probabilities, because clauses may, intuitively, overlap; in general the problem is #P-complete.
//!
//! uconf offers four interchangeable strategies for this computation, trading exactness for speed:
//!
//! - **Exact** --- independent-component decomposition with variable elimination. See [procedures::exact].
//! - **Bounded approximation** --- a decomposition tree propagating `[lower, upper]` bounds, terminating once a provable relative or absolute ε-gap is reached. See [procedures::approximate].
//! - **Monte-Carlo estimation** --- the Karp--Luby unbiased estimator in its fractional refinement, with the Dagum--Karp--Luby--Ross optimal stopping rule for an (ε, δ) guarantee. See [procedures::estimation].
//! - **One-scan** --- a single streaming pass over sorted lineage for hierarchical self-join-free queries, in O(1) amortized work per tuple, driven by a [signature] tree. See [procedures::one_scan].
//!
//! # Orientation
//!
//! The library is designed around the core structure of a [group context](context): the scope of one duplicate-elimination group.
//! The surrounding query-rewriting layer --- which decides the strategy, prepares condition columns, sorts lineage, and builds signatures --- drives the context with one accumulate call per input row and a single finalize call per group.
//!
//! Internally, and at a high level, a group is viewed in terms of a handful of databases and the procedures over them:
//! - Clauses (or raw tuples) are stored in the [lineage](db::lineage).
//! - The complete distribution of every observed variable is stored in the [world table](db::world).
//! - Subsets of the clause bag are everywhere [bitsets](generic::bitset) over clause indices.
//!
//! Useful starting points, then, may be:
//! - The [group context](context) for the external contract.
//! - The [procedures] for the four strategies and their shared machinery.
//! - The [structures] to familiarise yourself with the abstract elements (variables, literals, clauses).
//! - The [configuration](config) to see what is chosen per query.
//!
//! # Example
//!
//! Two independent clauses, all four strategies in agreement:
//!
//! ```rust
//! use uconf::config::{ApproximationMode, Config, Strategy};
//! use uconf::context::Group;
//! use uconf::structures::Literal;
//!
//! let strategies = [
//!     Strategy::Exact,
//!     Strategy::Decomposition { epsilon: 0.01, mode: ApproximationMode::Relative },
//!     Strategy::MonteCarlo { epsilon: 0.05, delta: 0.01 },
//! ];
//!
//! for strategy in strategies {
//!     let mut group = Group::from_config(Config { strategy, ..Config::default() });
//!
//!     group.accumulate(&[Literal::new(1, 1, 0.4)]).unwrap();
//!     group.accumulate(&[Literal::new(2, 1, 0.5)]).unwrap();
//!
//!     let expected = 0.4 + 0.5 - 0.4 * 0.5;
//!     let probability = group.finalize().unwrap();
//!     assert!((probability - expected).abs() < 0.05 * expected);
//! }
//! ```
//!
//! # Guiding principles
//!
//! ## Explicit scope
//!
//! Nothing is process-wide: every structure belongs to exactly one group context, created lazily at the first accumulated row and released when finalize returns.
//! Parallelism across groups is one context per group; there is nothing to lock.
//!
//! ## Loud preconditions
//!
//! The elimination procedures are only correct on inputs satisfying their invariants, so the invariants are established eagerly (duplicate literals are neutralized on insertion, distributions completed before elimination) or checked loudly (non-hierarchical join descriptions are rejected at signature construction, invalid probabilities abort the group).
//! What cannot be checked --- the sort order of one-scan input --- is documented as the caller's side of the contract.
//!
//! ## Simple efficiency
//!
//! Clause subsets are bitsets, never copied sub-arrays; conditioning during elimination is an overlay cloned per branch, never a paired mutate/undo; the world table is a directory-doubling extendible hash, never rehashed in full.
//! Known compromises are noted where they are made.
//!
//! # Logs
//!
//! To help diagnose issues (somewhat) detailed calls to [log!](log) are made, with a target per subsystem to narrow output to relevant parts of the library.
//! The targets are listed in [misc::log].
//! No log implementation is provided.
//!
//! # Literature
//!
//! The strategies implement techniques from:
//!
//! - L. Antova, T. Jansen, C. Koch, and D. Olteanu. Fast and Simple Relational Processing of Uncertain Data. In Proc. ICDE, 2008.
//! - D. Olteanu, J. Huang, and C. Koch. SPROUT: Lazy vs. Eager Query Plans for Tuple-Independent Probabilistic Databases. In Proc. ICDE, 2009.
//! - D. Olteanu, J. Huang, and C. Koch. Approximate Confidence Computation in Probabilistic Databases. In Proc. ICDE, 2010.
//! - R. M. Karp and M. Luby. Monte-Carlo Algorithms for Enumeration and Reliability Problems. In Proc. FOCS, 1983.
//! - P. Dagum, R. M. Karp, M. Luby, and S. M. Ross. An Optimal Algorithm for Monte Carlo Estimation. SIAM J. Comput., 29(5), 2000.
//! - N. Dalvi and D. Suciu. The Dichotomy of Conjunctive Queries on Probabilistic Structures. In Proc. PODS, 2007.

#![allow(clippy::collapsible_else_if)]
#![allow(clippy::single_match)]

pub mod config;
pub mod context;
pub mod db;
pub mod generic;
pub mod misc;
pub mod procedures;
pub mod signature;
pub mod structures;
pub mod types;
