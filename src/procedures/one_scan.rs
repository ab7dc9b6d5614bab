//! The one-scan pass --- confidence computation over sorted lineage in O(1) amortized work per tuple.
//!
//! # Overview
//!
//! For a signature with the [one-scan property](crate::signature), the probability of the whole group falls out of a single left-to-right pass over lineage sorted by the signature's column order.
//!
//! Each leaf column carries two running values: the probability of its *current block* --- the maximal run of tuples agreeing on every column to its left --- and the accumulated probability of its closed blocks.
//! On each tuple, the leftmost column whose variable changed is found by comparison with the previous tuple; every column to its right closes, folding child values into their head columns via `1 − (1 − a)(1 − b)`, and the span reopens on the new tuple's values.
//! Propagation depth equals the number of changed columns, not the tree size, which is what makes the per-tuple work O(1) amortized.
//!
//! A sentinel [finish](ScanState::finish) closes the last open partition and yields the root's accumulated probability.
//!
//! Aggregated columns --- produced by the [scheduler](crate::procedures::schedule) --- read their probabilities from a materialized table instead of the tuple, consuming one entry per partition; tuples whose variable is not the current partition's representative are skipped as the block-validity state machine dictates.
//!
//! # Preconditions
//!
//! Input rows must arrive sorted lexicographically by their variable columns in the signature's [variable order](crate::signature::Signature::variable_order).
//! Unsorted input is not detected and silently mis-computes --- the sort is the rewriting layer's side of the contract.

use crate::{
    db::lineage::TupleLineage,
    misc::log::targets::{self},
    procedures::formula::independent_or,
    signature::Signature,
    structures::Var,
};

/// The running state of one streaming pass.
pub(crate) struct ScanState {
    /// The leaf columns, in signature order.
    columns: Vec<usize>,

    /// The position of each column in an input row.
    positions: Vec<usize>,

    /// Current block probability, per column.
    sum: Vec<f64>,

    /// Accumulated probability of closed blocks, per column.
    temp_sum: Vec<f64>,

    /// The previous tuple's variables, per column.
    prev: Vec<Var>,

    /// Closed child values awaiting their head column's fold.
    ready: Vec<f64>,

    /// The rightmost column of the currently open span.
    cursor: usize,

    /// A count of the tuples seen.
    counter: usize,

    /// Whether the current block is valid and being accumulated.
    calculating: bool,
}

/// Runs a full pass over stored lineage. The signature must already have the one-scan property.
pub(crate) fn one_scan(signature: &mut Signature, lineage: &TupleLineage) -> f64 {
    debug_assert!(signature.is_one_scan());

    let mut state = ScanState::new(signature);
    for row in lineage.rows() {
        state.advance(signature, &row.vars, &row.probs);
    }

    log::trace!(target: targets::ONE_SCAN, "Scanned {} rows over {} columns", lineage.len(), signature.width());

    state.finish(signature)
}

impl ScanState {
    pub fn new(signature: &Signature) -> Self {
        let columns = signature.leaves();
        let positions = columns
            .iter()
            .map(|column| signature.node(*column).pos)
            .collect();
        let width = columns.len();

        ScanState {
            columns,
            positions,
            sum: vec![0.0; width],
            temp_sum: vec![0.0; width],
            prev: vec![0; width],
            ready: Vec::new(),
            cursor: width.saturating_sub(1),
            counter: 0,
            calculating: false,
        }
    }

    /// Feeds one tuple through the tree.
    pub fn advance(&mut self, signature: &mut Signature, vars: &[Var], probs: &[f64]) {
        let (cur, curp) = self.project(vars, probs);

        self.counter += 1;
        if self.counter == 1 {
            self.open_block(signature, &cur, &curp);
            return;
        }

        // A change in the leading column starts a new partition. Four cases,
        // by validity of the new block and whether the old one was open.
        if cur[0] != self.prev[0] {
            if signature.var_valid(self.columns[0], cur[0]) {
                if !self.calculating {
                    self.open_block(signature, &cur, &curp);
                    return;
                }
                // An open block followed by a valid one: close through the
                // ordinary column comparison below.
            } else if self.calculating {
                self.calculating = false;
                self.close_columns(signature, 0, Some((cur.as_slice(), curp.as_slice())));
                self.prev.copy_from_slice(&cur);
                return;
            } else {
                return;
            }
        } else if !self.calculating {
            return;
        }

        for column in 0..=self.cursor {
            if cur[column] != self.prev[column]
                && signature.var_valid(self.columns[column], cur[column])
            {
                if column == self.cursor {
                    let p = signature.lookup(self.columns[column], cur[column], curp[column]);
                    self.sum[column] = independent_or(self.sum[column], p);
                } else {
                    self.close_columns(signature, column, Some((cur.as_slice(), curp.as_slice())));
                }
                break;
            }
        }

        self.prev.copy_from_slice(&cur);
    }

    /// Closes the last open partition and returns the root's accumulated probability.
    pub fn finish(&mut self, signature: &mut Signature) -> f64 {
        if self.counter == 0 {
            return 0.0;
        }

        match self.calculating {
            true => self
                .close_columns(signature, 0, None)
                .unwrap_or(self.temp_sum[0]),
            false => self.temp_sum[0],
        }
    }

    fn project(&self, vars: &[Var], probs: &[f64]) -> (Vec<Var>, Vec<f64>) {
        let cur = self.positions.iter().map(|p| vars[*p]).collect();
        let curp = self.positions.iter().map(|p| probs[*p]).collect();
        (cur, curp)
    }

    /// Opens a fresh partition on the current tuple.
    fn open_block(&mut self, signature: &mut Signature, cur: &[Var], curp: &[f64]) {
        for column in 0..self.columns.len() {
            self.sum[column] = signature.lookup(self.columns[column], cur[column], curp[column]);
        }
        self.calculating = true;
        self.cursor = self.columns.len() - 1;
        self.prev.copy_from_slice(cur);
    }

    /// Folds the ready values of a head column into its block probability.
    fn fold(&mut self, signature: &Signature, column: usize) -> f64 {
        let mut product = self.sum[column];
        for _ in 0..signature.node(self.columns[column]).vars_to_combine {
            product *= self.ready.pop().expect("a closed value per sibling");
        }
        product
    }

    /// Closes every column right of `target`, then `target` itself, reopening the span on `current`.
    ///
    /// With no current tuple this is the sentinel close, returning the final probability.
    fn close_columns(
        &mut self,
        signature: &mut Signature,
        target: usize,
        current: Option<(&[Var], &[f64])>,
    ) -> Option<f64> {
        for column in (target + 1..=self.cursor).rev() {
            match signature.node(self.columns[column]).domain {
                0 => self.ready.push(self.sum[column]),
                _ => {
                    let product = self.fold(signature, column);
                    self.temp_sum[column] = independent_or(self.temp_sum[column], product);
                    self.ready.push(self.temp_sum[column]);
                    self.temp_sum[column] = 0.0;
                }
            }
        }

        let domain = signature.node(self.columns[target]).domain;

        if domain > 0 || self.columns.len() == 1 {
            let product = self.fold(signature, target);
            self.temp_sum[target] = independent_or(self.temp_sum[target], product);

            let Some((cur, curp)) = current else {
                return Some(self.temp_sum[0]);
            };

            self.cursor = target + domain;
            if self.calculating {
                for column in target..=self.cursor {
                    self.sum[column] =
                        signature.lookup(self.columns[column], cur[column], curp[column]);
                }
            }
        } else {
            let Some((cur, curp)) = current else {
                return Some(self.temp_sum[0]);
            };

            let p = signature.lookup(self.columns[target], cur[target], curp[target]);
            self.sum[target] = independent_or(self.sum[target], p);
            self.cursor = target;
        }

        None
    }
}
