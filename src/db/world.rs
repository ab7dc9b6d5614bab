//! The world table --- the complete outcome distribution of every variable observed in a group.
//!
//! # Overview
//!
//! Each variable owns an entry listing its (outcome, probability) pairs in observation order.
//! The elimination procedures case-split exhaustively over a variable's declared outcomes, so after all input is seen [complete_distributions](WorldTable::complete_distributions) appends one synthetic remaining-mass outcome to any variable whose observed mass falls short of one.
//! The synthetic outcome is appended once, never re-derived.
//!
//! # Hashing
//!
//! Variable identifiers are sparse --- whatever the surrounding system allocated --- and a group may see any number of distinct variables, so entries are indexed by an extendible hash:
//! a directory indexed by the low-order bits of the variable id, pointing into fixed-capacity buckets.
//! When a bucket overflows it splits by one extra bit of the key, doubling the directory only when the overflowing bucket already uses every directory bit.
//! Lookups stay O(1) average at arbitrary scale, and no full-table rehash ever happens.

use crate::{
    misc::log::targets::{self},
    structures::{Outcome, Var},
    types::err::{self},
};

/// The number of directory bits a fresh table starts with.
const INITIAL_BITS: u32 = 6;

/// The fixed key capacity of a bucket.
const BUCKET_CAPACITY: usize = 32;

/// Numerical slack allowed when checking a variable's outcome mass against one.
///
/// Observed probabilities are accumulated in floating point, so a genuine mass of one may be represented as slightly more.
pub const MASS_SLACK: f64 = 0.01;

/// One possible outcome of a variable, with its probability.
#[derive(Clone, Copy, Debug)]
pub struct OutcomeEntry {
    /// The tag of the outcome.
    pub outcome: Outcome,

    /// The probability of the outcome.
    pub probability: f64,
}

/// The complete distribution of one variable.
#[derive(Clone, Debug)]
pub struct WorldEntry {
    /// The variable of the entry.
    pub var: Var,

    /// The declared outcomes of the variable, in observation order.
    pub outcomes: Vec<OutcomeEntry>,
}

/// A bucket of the directory, holding variables and their entry indices.
#[derive(Clone, Debug)]
struct Bucket {
    /// How many key bits this bucket distinguishes.
    local_bits: u32,

    /// The variables hashed to the bucket.
    keys: Vec<Var>,

    /// Entry indices, parallel to `keys`.
    slots: Vec<usize>,
}

impl Bucket {
    fn fresh(local_bits: u32) -> Self {
        Bucket {
            local_bits,
            keys: Vec::with_capacity(BUCKET_CAPACITY),
            slots: Vec::with_capacity(BUCKET_CAPACITY),
        }
    }

    fn is_full(&self) -> bool {
        self.keys.len() == BUCKET_CAPACITY
    }
}

/// The world table of a group.
#[derive(Clone, Debug)]
pub struct WorldTable {
    /// Variable entries, in first-observation order.
    entries: Vec<WorldEntry>,

    /// The directory, holding indices into `buckets`.
    directory: Vec<usize>,

    /// Buckets, shared by one or more directory cells.
    buckets: Vec<Bucket>,

    /// The number of key bits the directory distinguishes.
    global_bits: u32,
}

impl Default for WorldTable {
    fn default() -> Self {
        WorldTable {
            entries: Vec::new(),
            directory: vec![0; 1 << INITIAL_BITS],
            buckets: vec![Bucket::fresh(0)],
            global_bits: INITIAL_BITS,
        }
    }
}

impl WorldTable {
    /// The number of distinct variables observed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no variable has been observed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at `index`.
    pub fn entry(&self, index: usize) -> &WorldEntry {
        &self.entries[index]
    }

    /// An iterator over all entries, in first-observation order.
    pub fn entries(&self) -> impl Iterator<Item = &WorldEntry> {
        self.entries.iter()
    }

    /// The entry index of `var`, if observed.
    pub fn index_of(&self, var: Var) -> Option<usize> {
        let bucket = &self.buckets[self.directory[self.cell(var)]];
        bucket
            .keys
            .iter()
            .position(|key| *key == var)
            .map(|at| bucket.slots[at])
    }

    /// Records the observation of `var` with `outcome` at `probability`.
    ///
    /// Returns the entry index of the variable and the index of the outcome within the entry.
    /// A previously observed (variable, outcome) pair keeps its first probability.
    pub fn intern(&mut self, var: Var, outcome: Outcome, probability: f64) -> (usize, usize) {
        let entry_index = match self.index_of(var) {
            Some(index) => index,
            None => {
                let index = self.entries.len();
                self.entries.push(WorldEntry {
                    var,
                    outcomes: Vec::with_capacity(3),
                });
                self.insert_key(var, index);
                index
            }
        };

        let outcomes = &mut self.entries[entry_index].outcomes;
        let outcome_index = match outcomes.iter().position(|entry| entry.outcome == outcome) {
            Some(index) => index,
            None => {
                outcomes.push(OutcomeEntry {
                    outcome,
                    probability,
                });
                outcomes.len() - 1
            }
        };

        (entry_index, outcome_index)
    }

    /// Completes every variable's distribution so outcome probabilities sum to one.
    ///
    /// A variable with observed mass short of one receives a synthetic outcome tagged past its maximum observed outcome.
    /// A variable with mass exceeding one beyond [MASS_SLACK] is rejected.
    pub fn complete_distributions(&mut self) -> Result<(), err::WorldTableError> {
        for entry in &mut self.entries {
            let mass: f64 = entry.outcomes.iter().map(|o| o.probability).sum();

            if mass - 1.0 > MASS_SLACK {
                log::warn!(target: targets::WORLD_TABLE, "Variable {} has outcome mass {mass}", entry.var);
                return Err(err::WorldTableError::MassExceedsOne {
                    var: entry.var,
                    mass,
                });
            } else if mass < 1.0 {
                let max_outcome = entry
                    .outcomes
                    .iter()
                    .map(|o| o.outcome)
                    .max()
                    .unwrap_or(Outcome::MIN);

                entry.outcomes.push(OutcomeEntry {
                    outcome: max_outcome + 1,
                    probability: 1.0 - mass,
                });
            }
        }

        Ok(())
    }

    /// The directory cell of `var`.
    fn cell(&self, var: Var) -> usize {
        (var as usize) & ((1 << self.global_bits) - 1)
    }

    /// Inserts a fresh key, splitting buckets (and doubling the directory) as needed.
    fn insert_key(&mut self, var: Var, entry_index: usize) {
        loop {
            let bucket_index = self.directory[self.cell(var)];

            if !self.buckets[bucket_index].is_full() {
                self.buckets[bucket_index].keys.push(var);
                self.buckets[bucket_index].slots.push(entry_index);
                return;
            }

            self.split(bucket_index);
        }
    }

    /// Splits a full bucket by one extra key bit.
    fn split(&mut self, bucket_index: usize) {
        if self.buckets[bucket_index].local_bits == self.global_bits {
            self.double_directory();
        }

        let split_bit = self.buckets[bucket_index].local_bits;
        self.buckets[bucket_index].local_bits += 1;

        let mut sibling = Bucket::fresh(self.buckets[bucket_index].local_bits);
        let sibling_index = self.buckets.len();

        // Redistribute by the freshly distinguished bit.
        let keys = std::mem::take(&mut self.buckets[bucket_index].keys);
        let slots = std::mem::take(&mut self.buckets[bucket_index].slots);
        for (key, slot) in keys.into_iter().zip(slots) {
            if (key >> split_bit) & 1 == 1 {
                sibling.keys.push(key);
                sibling.slots.push(slot);
            } else {
                self.buckets[bucket_index].keys.push(key);
                self.buckets[bucket_index].slots.push(slot);
            }
        }

        for cell in 0..self.directory.len() {
            if self.directory[cell] == bucket_index && (cell >> split_bit) & 1 == 1 {
                self.directory[cell] = sibling_index;
            }
        }

        self.buckets.push(sibling);
    }

    /// Doubles the directory, duplicating the current cell → bucket mapping.
    fn double_directory(&mut self) {
        log::trace!(target: targets::WORLD_TABLE, "Directory doubled to {} bits", self.global_bits + 1);
        self.global_bits += 1;
        let half = self.directory.len();
        for cell in 0..half {
            let bucket = self.directory[cell];
            self.directory.push(bucket);
        }
    }
}

#[cfg(test)]
mod world_table_tests {
    use super::*;

    #[test]
    fn intern_and_find() {
        let mut table = WorldTable::default();

        let (entry, first) = table.intern(7, 1, 0.25);
        assert_eq!((entry, first), (0, 0));

        let (entry, second) = table.intern(7, 2, 0.5);
        assert_eq!((entry, second), (0, 1));

        // A duplicate observation keeps the original probability.
        let (entry, again) = table.intern(7, 1, 0.9);
        assert_eq!((entry, again), (0, 0));
        assert_eq!(table.entry(0).outcomes[0].probability, 0.25);

        assert_eq!(table.index_of(7), Some(0));
        assert_eq!(table.index_of(8), None);
    }

    #[test]
    fn directory_growth_preserves_lookup() {
        let mut table = WorldTable::default();

        // Far more variables than a single bucket holds, with colliding low bits.
        for var in 0..4096_u32 {
            table.intern(var, 1, 0.5);
        }

        for var in 0..4096_u32 {
            let index = table.index_of(var).expect("lost a variable");
            assert_eq!(table.entry(index).var, var);
        }
    }

    #[test]
    fn completion_adds_remaining_mass() {
        let mut table = WorldTable::default();
        table.intern(3, 1, 0.1);
        table.intern(3, 2, 0.5);

        assert!(table.complete_distributions().is_ok());

        let entry = table.entry(0);
        assert_eq!(entry.outcomes.len(), 3);
        assert_eq!(entry.outcomes[2].outcome, 3);
        assert!((entry.outcomes[2].probability - 0.4).abs() < 1e-6);

        let mass: f64 = entry.outcomes.iter().map(|o| o.probability).sum();
        assert!((mass - 1.0).abs() < 1e-6);
    }

    #[test]
    fn excessive_mass_rejected() {
        let mut table = WorldTable::default();
        table.intern(9, 1, 0.8);
        table.intern(9, 2, 0.8);

        assert!(matches!(
            table.complete_distributions(),
            Err(err::WorldTableError::MassExceedsOne { var: 9, .. })
        ));
    }

    #[test]
    fn complete_distribution_untouched() {
        let mut table = WorldTable::default();
        table.intern(4, 1, 0.5);
        table.intern(4, 2, 0.5);

        assert!(table.complete_distributions().is_ok());
        assert_eq!(table.entry(0).outcomes.len(), 2);
    }
}
