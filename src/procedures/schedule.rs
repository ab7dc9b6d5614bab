//! The pre-aggregation scheduler --- giving every signature subtree the one-scan property.
//!
//! # Overview
//!
//! A starred first child blocks the single streaming pass: its variable may repeat across consecutive tuples, so its contribution per partition has to be known *before* the partition closes.
//! The scheduler removes each such obstruction bottom-up by materializing a probability table for the offending column --- one (representative variable, combined probability) entry per partition --- read off a preparatory pass over the sorted lineage:
//!
//! - **Simple aggregation**, when the first child is a starred leaf: one pass over the column and the anchor column of the next sibling, merging partitions that share an anchor variable.
//! - **Incremental aggregation**, when the first child is an internal subtree: a column-by-column pass over all of the subtree's leaves plus the anchor, folding sub-blocks exactly as the [scan](crate::procedures::one_scan) itself would, writing closed partitions into the table.
//!   The subtree then collapses into a single aggregated leaf carrying its head column.
//!
//! Scheduling rewrites the tree destructively --- collapsed subtrees and consumed tables do not survive --- so a group always schedules a clone of the caller's signature, and the pristine tree is reused for the next group.

use std::collections::HashMap;

use crate::{
    db::lineage::TupleLineage,
    misc::log::targets::{self},
    procedures::formula::independent_or,
    signature::{ProbEntry, Signature},
    structures::Var,
};

/// Rewrites `signature` until the root has the one-scan property, pre-aggregating over `lineage`.
pub(crate) fn schedule(signature: &mut Signature, lineage: &TupleLineage) {
    schedule_node(signature, signature.root(), lineage);
}

fn schedule_node(signature: &mut Signature, node: usize, lineage: &TupleLineage) {
    if signature.node_one_scan(node) {
        return;
    }

    let children = signature.node(node).children.clone();
    for child in &children {
        if !signature.node_one_scan(*child) {
            schedule_node(signature, *child, lineage);
        }
    }

    if signature.node_one_scan(node) {
        return;
    }

    debug_assert!(children.len() >= 2, "a schedulable node nests at least two subtrees");

    let first = children[0];
    let anchor = signature.first_leaf(children[1]);

    log::trace!(target: targets::SCHEDULE, "Aggregating subtree {first} against anchor {anchor}");

    match signature.node(first).is_leaf {
        true => {
            simple_aggregation(signature, first, anchor, lineage);
            let node = signature.node_mut(first);
            node.starred = false;
            node.aggregated = true;
        }
        false => {
            let mut columns = signature.leaves_of(first);
            let head = columns[0];
            columns.push(anchor);
            incremental_aggregation(signature, &columns, lineage);
            signature.collapse_into_leaf(first, head);
        }
    }

    signature.derive_combination();
}

/// Builds the probability table of the starred leaf `x`, partitioned by the anchor column `y`.
///
/// Within one partition the anchor ties together every block sharing a variable with it, so the partition probability is the disjunction of the distinct `x` variables reachable through shared anchors.
fn simple_aggregation(signature: &mut Signature, x: usize, y: usize, lineage: &TupleLineage) {
    let pos_x = signature.node(x).pos;
    let pos_y = signature.node(y).pos;

    let mut table: Vec<ProbEntry> = Vec::new();
    let mut by_x: HashMap<Var, usize> = HashMap::new();
    let mut by_y: HashMap<Var, usize> = HashMap::new();
    let mut prev: Option<(Var, Var)> = None;

    for row in lineage.rows() {
        let cur_x = row.vars[pos_x];
        let prob_x = row.probs[pos_x];
        let cur_y = row.vars[pos_y];

        let (new_x, new_y) = match prev {
            None => (true, true),
            Some((prev_x, prev_y)) => (
                cur_x != prev_x && signature.var_valid(x, cur_x) && !by_x.contains_key(&cur_x),
                cur_y != prev_y && signature.var_valid(y, cur_y) && !by_y.contains_key(&cur_y),
            ),
        };

        if new_x && new_y {
            let probability = signature.lookup(x, cur_x, prob_x);
            table.push(ProbEntry {
                representative: cur_x,
                probability,
            });
            by_y.insert(cur_y, table.len() - 1);
            by_x.insert(cur_x, table.len() - 1);
        } else if new_x {
            let partition = *by_y.get(&cur_y).expect("partition of a seen anchor");
            by_x.insert(cur_x, partition);
            let p = signature.lookup(x, cur_x, prob_x);
            table[partition].probability = independent_or(table[partition].probability, p);
        } else if new_y {
            let partition = *by_x.get(&cur_x).expect("partition of a seen variable");
            by_y.insert(cur_y, partition);
        }

        prev = Some((cur_x, cur_y));
    }

    signature.node_mut(x).table = Some(table.into());
}

/// Builds the probability table of the head of a nested subtree, folding its columns block by block.
///
/// `columns` holds the subtree's leaves in signature order plus the anchor column last.
/// The fold mirrors the streaming pass, except that a closed head partition lands in the table rather than the root accumulator.
fn incremental_aggregation(signature: &mut Signature, columns: &[usize], lineage: &TupleLineage) {
    let width = columns.len();
    let anchor = width - 1;
    let positions: Vec<usize> = columns
        .iter()
        .map(|column| signature.node(*column).pos)
        .collect();

    let mut table: Vec<ProbEntry> = Vec::new();
    let mut by_x: HashMap<Var, usize> = HashMap::new();
    let mut by_y: HashMap<Var, usize> = HashMap::new();

    let mut sum = vec![0.0; width];
    let mut temp_sum = vec![0.0; width];
    let mut ready: Vec<f64> = Vec::new();
    let mut prev: Vec<Var> = vec![0; width];
    let mut cursor = width.saturating_sub(2);
    let mut calculating = false;
    let mut counter = 0_usize;

    for step in 0..=lineage.len() {
        counter += 1;

        let Some(row) = lineage.rows().get(step) else {
            if counter == 1 {
                break;
            }

            // The sentinel close of the last partition.
            close_partition(
                signature, columns, &mut sum, &mut temp_sum, &mut ready, &mut cursor, 0, None,
                prev[0], &mut table, &by_x,
            );
            break;
        };

        let cur: Vec<Var> = positions.iter().map(|p| row.vars[*p]).collect();
        let curp: Vec<f64> = positions.iter().map(|p| row.probs[*p]).collect();

        let (new_x, new_y) = match counter {
            1 => (true, true),
            _ => (
                cur[0] != prev[0]
                    && signature.var_valid(columns[0], cur[0])
                    && !by_x.contains_key(&cur[0]),
                cur[anchor] != prev[anchor]
                    && signature.var_valid(columns[anchor], cur[anchor])
                    && !by_y.contains_key(&cur[anchor]),
            ),
        };

        if new_x && new_y {
            table.push(ProbEntry {
                representative: cur[0],
                probability: 0.0,
            });
            by_y.insert(cur[anchor], table.len() - 1);
            by_x.insert(cur[0], table.len() - 1);
        } else if new_x {
            let partition = *by_y.get(&cur[anchor]).expect("partition of a seen anchor");
            by_x.insert(cur[0], partition);
        } else if new_y {
            let partition = *by_x.get(&cur[0]).expect("partition of a seen variable");
            by_y.insert(cur[anchor], partition);
        }

        if counter == 1 {
            calculating = true;
            for column in 0..anchor {
                sum[column] = signature.lookup(columns[column], cur[column], curp[column]);
                temp_sum[column] = 0.0;
            }
            prev.copy_from_slice(&cur);
            continue;
        }

        let mut closed_block = false;
        if cur[0] != prev[0] {
            if calculating {
                close_partition(
                    signature,
                    columns,
                    &mut sum,
                    &mut temp_sum,
                    &mut ready,
                    &mut cursor,
                    0,
                    Some((cur.as_slice(), curp.as_slice())),
                    prev[0],
                    &mut table,
                    &by_x,
                );
                closed_block = true;
            } else {
                calculating = new_x;
            }
        }

        if !closed_block && calculating {
            for column in 0..=cursor {
                if cur[column] != prev[column]
                    && signature.var_valid(columns[column], cur[column])
                {
                    if column == cursor {
                        let p = signature.lookup(columns[column], cur[column], curp[column]);
                        sum[column] = independent_or(sum[column], p);
                    } else {
                        close_partition(
                            signature,
                            columns,
                            &mut sum,
                            &mut temp_sum,
                            &mut ready,
                            &mut cursor,
                            column,
                            Some((cur.as_slice(), curp.as_slice())),
                            prev[0],
                            &mut table,
                            &by_x,
                        );
                    }
                    break;
                }
            }
        }

        if new_x {
            for column in 0..anchor {
                temp_sum[column] = 0.0;
            }
            if !closed_block {
                for column in 0..anchor {
                    sum[column] = signature.lookup(columns[column], cur[column], curp[column]);
                }
            }
        }

        prev.copy_from_slice(&cur);
    }

    signature.node_mut(columns[0]).table = Some(table.into());
}

/// Closes every column right of `target`, then `target` itself.
///
/// A closed head partition (`target` zero) folds into the table entry of `closing_var`; reopening happens on `current`, absent at end of input.
#[allow(clippy::too_many_arguments)]
fn close_partition(
    signature: &mut Signature,
    columns: &[usize],
    sum: &mut [f64],
    temp_sum: &mut [f64],
    ready: &mut Vec<f64>,
    cursor: &mut usize,
    target: usize,
    current: Option<(&[Var], &[f64])>,
    closing_var: Var,
    table: &mut [ProbEntry],
    by_x: &HashMap<Var, usize>,
) {
    for column in (target + 1..=*cursor).rev() {
        match signature.node(columns[column]).domain {
            0 => ready.push(sum[column]),
            _ => {
                let mut product = sum[column];
                for _ in 0..signature.node(columns[column]).vars_to_combine {
                    product *= ready.pop().expect("a closed value per sibling");
                }
                temp_sum[column] = independent_or(temp_sum[column], product);
                ready.push(temp_sum[column]);
                temp_sum[column] = 0.0;
            }
        }
    }

    let domain = signature.node(columns[target]).domain;

    if domain > 0 || columns.len() == 1 {
        let mut product = sum[target];
        for _ in 0..signature.node(columns[target]).vars_to_combine {
            product *= ready.pop().expect("a closed value per sibling");
        }

        match target {
            0 => {
                let partition = *by_x.get(&closing_var).expect("partition of the closing block");
                table[partition].probability =
                    independent_or(table[partition].probability, product);
            }
            _ => temp_sum[target] = independent_or(temp_sum[target], product),
        }

        let Some((cur, curp)) = current else {
            return;
        };

        *cursor = target + domain;
        for column in target..=*cursor {
            sum[column] = signature.lookup(columns[column], cur[column], curp[column]);
        }
    } else if let Some((cur, curp)) = current {
        let p = signature.lookup(columns[target], cur[target], curp[target]);
        sum[target] = independent_or(sum[target], p);
        *cursor = target;
    }
}
