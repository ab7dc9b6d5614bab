//! Approximate confidence computation by Monte-Carlo estimation, with an (ε, δ) guarantee.
//!
//! # Overview
//!
//! The probability of a DNF over independent variables can be estimated without any decomposition at all.
//! There is an efficiently computable unbiased estimator whose average over sufficiently many samples lands within relative error ε of the true probability with confidence 1 − δ:
//!
//! - [sample_once](Estimator::sample_once) draws one clause with probability proportional to its weight, completes the clause's partial assignment by sampling every unconstrained variable from its own distribution, and returns `1/c`, where `c` counts the clauses the completed assignment satisfies.
//!   In expectation this is `p / nM` --- the probability of the DNF over the bag sum of the clause weights.
//!   Counting the satisfying clauses, rather than testing whether the drawn clause is the first satisfier in some fixed order, is the fractional refinement with the smaller variance.
//!
//! - [estimate](Estimator::estimate) decides *how many* samples, by the optimal three-phase procedure:
//!   a stopping-rule walk for a rough mean, a paired-sample pass for the relative variance, and a final averaging pass sized from both.
//!
//! Every running sum here is an `f64` accumulating a large total from many tiny increments.
//! Narrower accumulation visibly corrupts results --- by several percentage points on a 6-node random-graph triangle benchmark --- well before it looks like noise.
//!
//! # Literature
//!
//! R. M. Karp and M. Luby. Monte-Carlo Algorithms for Enumeration and Reliability Problems. In Proc. FOCS, 1983.
//!
//! P. Dagum, R. M. Karp, M. Luby, and S. M. Ross. An Optimal Algorithm for Monte Carlo Estimation. SIAM J. Comput., 29(5), 2000.
//!
//! V. V. Vazirani. Approximation Algorithms. Springer, 2001. (The fractional estimator, §28.)

use crate::{
    db::world::{WorldEntry, WorldTable},
    misc::log::targets::{self},
    structures::{Clause, Outcome},
};

/// The Monte-Carlo engine over one group's clauses.
///
/// Randomness comes from the group's seedable generator: a fixed seed fixes the estimate.
pub(crate) struct Estimator<'a, R: rand::Rng> {
    clauses: &'a [Clause],
    world: &'a WorldTable,
    rng: &'a mut R,

    /// Clause weights, normalized by the bag sum.
    weights: Vec<f64>,

    /// The bag sum `nM` of the clause weights.
    bag_sum: f64,

    /// The sampled assignment, per world-table entry.
    assignment: Vec<Outcome>,
}

impl<'a, R: rand::Rng> Estimator<'a, R> {
    /// An estimator over `clauses`, expecting a complete world table and resolved literal entries.
    pub fn new(clauses: &'a [Clause], world: &'a WorldTable, rng: &'a mut R) -> Self {
        let bag_sum: f64 = clauses.iter().map(|clause| clause.probability).sum();
        let weights = clauses
            .iter()
            .map(|clause| clause.probability / bag_sum)
            .collect();

        Estimator {
            clauses,
            world,
            rng,
            weights,
            bag_sum,
            assignment: vec![0; world.len()],
        }
    }

    /// One clause index, drawn with probability proportional to clause weight.
    fn sample_clause(&mut self) -> usize {
        let pick: f64 = self.rng.random();

        let mut offset = 0.0;
        for (index, weight) in self.weights.iter().enumerate() {
            offset += weight;
            if pick <= offset {
                return index;
            }
        }

        // Accumulated rounding can leave pick above the final offset.
        self.weights.len() - 1
    }

    /// One outcome of `entry`, drawn from the variable's own distribution.
    fn sample_outcome(rng: &mut R, entry: &WorldEntry) -> Outcome {
        let pick: f64 = rng.random();

        let mut offset = 0.0;
        for outcome_entry in &entry.outcomes {
            offset += outcome_entry.probability;
            if pick <= offset {
                return outcome_entry.outcome;
            }
        }

        entry.outcomes.last().expect("complete distribution").outcome
    }

    /// One draw of the unbiased estimator for `p / nM`.
    fn sample_once(&mut self) -> f64 {
        let chosen = self.sample_clause();
        let world = self.world;

        // A complete assignment consistent with the chosen clause: constrained
        // variables take the clause's outcome, the rest are sampled.
        for (index, entry) in world.entries().enumerate() {
            let constrained = self.clauses[chosen]
                .literals
                .iter()
                .find(|literal| literal.var == entry.var)
                .map(|literal| literal.outcome);

            self.assignment[index] = match constrained {
                Some(outcome) => outcome,
                None => Self::sample_outcome(self.rng, entry),
            };
        }

        let mut satisfied = 0_usize;
        for clause in self.clauses {
            if clause
                .literals
                .iter()
                .all(|literal| self.assignment[literal.entry] == literal.outcome)
            {
                satisfied += 1;
            }
        }

        // The chosen clause is satisfied by construction, so the count is positive.
        1.0 / satisfied as f64
    }

    /// An (ε, δ)-approximation of the probability of the disjunction of the clauses.
    pub fn estimate(&mut self, epsilon: f64, delta: f64) -> f64 {
        let e = std::f64::consts::E;

        let upsilon = 4.0 * (e - 2.0) * (2.0 / delta).ln() / (epsilon * epsilon);
        let upsilon2 = 2.0 * (1.0 + epsilon.sqrt()) * (1.0 + 2.0 * epsilon.sqrt())
            * (1.0 + 1.5_f64.ln())
            / (2.0 / delta).ln()
            * upsilon;

        // Phase one: the stopping-rule walk. Summing fresh samples until the
        // sum crosses a precomputed threshold gives a rough mean in a bounded
        // expected number of draws.
        let mu_estimate = {
            let epsilon_sra = epsilon.sqrt().min(0.5);
            let delta_sra = delta / 3.0;
            let upsilon_sra = 4.0 * (e - 2.0) * (2.0 / delta_sra).ln() / (epsilon_sra * epsilon_sra);
            let threshold = 1.0 + (1.0 + epsilon_sra) * upsilon_sra;

            let mut draws = 0_u64;
            let mut sum: f64 = 0.0;
            while sum < threshold {
                draws += 1;
                sum += self.sample_once();
            }

            threshold / draws as f64
        };

        // Phase two: the relative variance, from squared paired-sample differences.
        let rho_estimate = {
            let pairs = (upsilon2 * epsilon / mu_estimate).ceil();

            let mut sum: f64 = 0.0;
            let mut pair = 1.0;
            while pair <= pairs {
                let difference = self.sample_once() - self.sample_once();
                sum += difference * difference / 2.0;
                pair += 1.0;
            }

            (sum / pairs).max(epsilon * mu_estimate)
        };

        // Phase three: the number of samples both estimates say suffice.
        let needed = upsilon2 * rho_estimate / (mu_estimate * mu_estimate);

        let mut sum: f64 = 0.0;
        let mut draw = 0.0;
        while draw < needed {
            sum += self.sample_once();
            draw += 1.0;
        }

        log::trace!(target: targets::ESTIMATION, "Mean {mu_estimate}, variance {rho_estimate}, {needed} samples");

        (sum / needed) * self.bag_sum
    }
}
