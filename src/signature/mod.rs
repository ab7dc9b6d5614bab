/*!
Signatures --- tree representations of a hierarchical join, driving the one-scan strategy.

# Overview

A conjunctive query without self-joins is *hierarchical* when its subgoal groups --- the sets of relations equated on each join-column group --- form a laminar family: any two are disjoint or nested.
Hierarchical queries admit PTIME confidence computation, and the signature tree is the shape that computation follows.

A leaf stands for one relation's condition column in the lineage; an internal node for a nesting level of the join.
A leaf is *starred* when the same variable may repeat across consecutive lineage tuples of its column --- the relation has attributes beyond the join columns on its path, and no key among them --- which is exactly what forces pre-aggregation before a single streaming pass suffices.

A node *has the one-scan property* when it is a leaf, or when all its children have the property and its first child is an unstarred leaf.
The [scheduler](crate::procedures::schedule) pre-aggregates offending subtrees until the root has the property, rewriting the tree destructively; a group therefore works on a clone and the pristine signature is kept by the caller.

# Representation

Nodes live in an arena and address one another by index, with children held as index lists.
Rebuilding a signature between groups is then a clone, and the destructive pre-aggregation scheduler can rewrite subtrees without any pointer surgery.

# Construction

Either from a [JoinDescription] --- subgoal groups over relation ids, checked for hierarchy and self-joins --- or node by node through a [SignatureBuilder] when the caller already holds the tree shape.

# Literature

D. Olteanu, J. Huang, and C. Koch. SPROUT: Lazy vs. Eager Query Plans for Tuple-Independent Probabilistic Databases. In Proc. ICDE, 2009.

N. Dalvi and D. Suciu. The Dichotomy of Conjunctive Queries on Probabilistic Structures. In Proc. PODS, 2007.
*/

use std::collections::{BTreeSet, VecDeque};

use crate::{
    structures::Var,
    types::err::{self},
};

/// One representative → probability pair, materialized by pre-aggregation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProbEntry {
    /// The representative variable of one partition.
    pub representative: Var,

    /// The combined probability of the partition.
    pub probability: f64,
}

/// A probability table, consumed front to back during a scan.
pub(crate) type ProbTable = VecDeque<ProbEntry>;

/// A node of the signature arena.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    /// Whether the node is a leaf.
    pub is_leaf: bool,

    /// Whether the leaf's variable may repeat across consecutive tuples, requiring pre-aggregation.
    pub starred: bool,

    /// Whether the column was pre-aggregated, so probabilities come from the node's table.
    pub aggregated: bool,

    /// Children, in signature order. Empty for leaves.
    pub children: Vec<usize>,

    /// The column of the leaf's variable in an input tuple.
    pub pos: usize,

    /// For a leaf heading its parent --- the count of leaf columns under its right siblings.
    pub domain: usize,

    /// For a leaf heading its parent --- the count of sibling values folded into its product.
    pub vars_to_combine: usize,

    /// The aggregation table of the column, once scheduled.
    pub table: Option<ProbTable>,

    /// The relation of the leaf, when built from a join description.
    pub relation: Option<usize>,
}

impl Node {
    fn leaf(relation: Option<usize>, starred: bool) -> Self {
        Node {
            is_leaf: true,
            starred,
            aggregated: false,
            children: Vec::new(),
            pos: 0,
            domain: 0,
            vars_to_combine: 0,
            table: None,
            relation,
        }
    }

    fn internal(children: Vec<usize>) -> Self {
        Node {
            is_leaf: false,
            starred: false,
            aggregated: false,
            children,
            pos: 0,
            domain: 0,
            vars_to_combine: 0,
            table: None,
            relation: None,
        }
    }
}

/// One join-column group: the relations equated on it, and those it is a key of.
#[derive(Clone, Debug)]
pub struct JoinGroup {
    /// The relations (by id) equated on this column group.
    pub members: Vec<usize>,

    /// The members for which the column group is a key, so their variables cannot repeat within a partition.
    pub keys: Vec<usize>,
}

/// A join-dependency description, handed over by the rewriting layer.
#[derive(Clone, Debug)]
pub struct JoinDescription {
    /// The number of relations in the join, identified as `0..relations`.
    pub relations: usize,

    /// The attribute count of each relation.
    pub attributes: Vec<usize>,

    /// The join-column groups.
    pub groups: Vec<JoinGroup>,
}

/// A signature tree over an arena of nodes.
#[derive(Clone, Debug)]
pub struct Signature {
    nodes: Vec<Node>,
    root: usize,
}

/// Node-by-node construction of a signature, for callers already holding the tree shape.
#[derive(Default)]
pub struct SignatureBuilder {
    nodes: Vec<Node>,
}

impl SignatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh leaf. Starred leaves require pre-aggregation before a scan.
    pub fn leaf(&mut self, starred: bool) -> usize {
        self.nodes.push(Node::leaf(None, starred));
        self.nodes.len() - 1
    }

    /// A fresh internal node over `children`, in signature order.
    pub fn internal(&mut self, children: Vec<usize>) -> usize {
        self.nodes.push(Node::internal(children));
        self.nodes.len() - 1
    }

    /// The finished signature rooted at `root`, with derived annotations.
    pub fn finish(self, root: usize) -> Signature {
        let mut signature = Signature {
            nodes: self.nodes,
            root,
        };
        signature.derive_positions();
        signature.derive_combination();
        signature
    }
}

impl Signature {
    /// Builds the signature of a hierarchical self-join-free join.
    ///
    /// Fails loudly when the description is not hierarchical or repeats a relation within a group --- a scan over an unsupported structure would silently mis-compute, and never does.
    pub fn from_join(description: &JoinDescription) -> Result<Signature, err::SignatureError> {
        if description.relations == 0 {
            return Err(err::SignatureError::Empty);
        }

        let mut member_sets: Vec<BTreeSet<usize>> = Vec::with_capacity(description.groups.len());

        for group in &description.groups {
            if group.members.is_empty() {
                return Err(err::SignatureError::Empty);
            }

            for relation in group.members.iter().chain(&group.keys) {
                if *relation >= description.relations {
                    return Err(err::SignatureError::UnknownRelation {
                        relation: *relation,
                    });
                }
            }

            let set: BTreeSet<usize> = group.members.iter().copied().collect();
            if set.len() != group.members.len() {
                return Err(err::SignatureError::SelfJoin);
            }

            member_sets.push(set);
        }

        // Hierarchy: any two groups disjoint or nested.
        for a in 0..member_sets.len() {
            for b in a + 1..member_sets.len() {
                let shared = member_sets[a].intersection(&member_sets[b]).count();
                if shared != 0 && shared != member_sets[a].len() && shared != member_sets[b].len() {
                    return Err(err::SignatureError::NotHierarchical);
                }
            }
        }

        let mut nodes: Vec<Node> = Vec::new();

        // Non-joined relations come first, as starred leaves of the root.
        let joined: BTreeSet<usize> = member_sets.iter().flatten().copied().collect();
        let mut root_children: Vec<usize> = Vec::new();
        for relation in 0..description.relations {
            if !joined.contains(&relation) {
                nodes.push(Node::leaf(Some(relation), true));
                root_children.push(nodes.len() - 1);
            }
        }

        // One subtree per family of overlapping groups.
        let all_groups: Vec<usize> = (0..member_sets.len()).collect();
        for family in connected_families(&member_sets, &all_groups) {
            let subtree = build_family(&mut nodes, description, &member_sets, &family, 0);
            root_children.push(subtree);
        }

        let root = match root_children.len() {
            1 => root_children[0],
            _ => {
                nodes.push(Node::internal(root_children));
                nodes.len() - 1
            }
        };

        let mut signature = Signature { nodes, root };
        signature.derive_positions();
        signature.derive_combination();
        Ok(signature)
    }

    /// The root node index.
    pub(crate) fn root(&self) -> usize {
        self.root
    }

    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    /// Whether the whole signature admits a single streaming pass.
    pub fn is_one_scan(&self) -> bool {
        self.node_one_scan(self.root)
    }

    /// The number of leaf columns.
    pub fn width(&self) -> usize {
        self.leaf_descendants(self.root)
    }

    /// The relation of each column, left to right --- the sort order one-scan input must follow.
    ///
    /// Input rows are sorted lexicographically by their variable columns in this order.
    /// None stands for a builder-made leaf with no relation attached.
    pub fn variable_order(&self) -> Vec<Option<usize>> {
        self.leaves()
            .into_iter()
            .map(|leaf| self.nodes[leaf].relation)
            .collect()
    }

    /// Whether the subtree at `index` admits a single streaming pass.
    pub(crate) fn node_one_scan(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        if node.is_leaf {
            return true;
        }

        if !node.children.iter().all(|child| self.node_one_scan(*child)) {
            return false;
        }

        let first = &self.nodes[node.children[0]];
        first.is_leaf && !first.starred
    }

    /// The leaves of the whole tree, in signature order.
    pub(crate) fn leaves(&self) -> Vec<usize> {
        self.leaves_of(self.root)
    }

    /// The leaves of the subtree at `index`, in signature order.
    pub(crate) fn leaves_of(&self, index: usize) -> Vec<usize> {
        let mut found = Vec::new();
        self.collect_leaves(index, &mut found);
        found
    }

    fn collect_leaves(&self, index: usize, found: &mut Vec<usize>) {
        match self.nodes[index].is_leaf {
            true => found.push(index),
            false => {
                for child in self.nodes[index].children.clone() {
                    self.collect_leaves(child, found);
                }
            }
        }
    }

    /// The leftmost leaf of the subtree at `index`.
    pub(crate) fn first_leaf(&self, index: usize) -> usize {
        let mut current = index;
        while !self.nodes[current].is_leaf {
            current = self.nodes[current].children[0];
        }
        current
    }

    /// The number of leaves under `index`.
    pub(crate) fn leaf_descendants(&self, index: usize) -> usize {
        match self.nodes[index].is_leaf {
            true => 1,
            false => self.nodes[index]
                .children
                .iter()
                .map(|child| self.leaf_descendants(*child))
                .sum(),
        }
    }

    /// Assigns each leaf its column position, left to right.
    fn derive_positions(&mut self) {
        for (position, leaf) in self.leaves().into_iter().enumerate() {
            self.nodes[leaf].pos = position;
        }
    }

    /// Derives `domain` and `vars_to_combine` for every leaf heading its parent.
    ///
    /// Re-run after the scheduler rewrites a subtree: both annotations follow the current tree shape.
    pub(crate) fn derive_combination(&mut self) {
        for index in 0..self.nodes.len() {
            if self.nodes[index].is_leaf {
                self.nodes[index].domain = 0;
                self.nodes[index].vars_to_combine = 0;
            }
        }

        for index in 0..self.nodes.len() {
            if self.nodes[index].is_leaf || self.nodes[index].children.is_empty() {
                continue;
            }

            let children = self.nodes[index].children.clone();
            let head = children[0];
            if self.nodes[head].is_leaf {
                self.nodes[head].vars_to_combine = children.len() - 1;
                self.nodes[head].domain = children[1..]
                    .iter()
                    .map(|sibling| self.leaf_descendants(*sibling))
                    .sum();
            }
        }
    }

    /// The probability of `var` at the column of leaf `index`.
    ///
    /// An aggregated column consumes the front of its table --- the probability of the partition `var` represents; any other column passes `probability` through.
    pub(crate) fn lookup(&mut self, index: usize, var: Var, probability: f64) -> f64 {
        match self.nodes[index].aggregated {
            false => probability,
            true => {
                let table = self.nodes[index]
                    .table
                    .as_mut()
                    .expect("aggregated column without a table");
                let entry = table.pop_front().expect("aggregated column exhausted");
                debug_assert_eq!(entry.representative, var);
                entry.probability
            }
        }
    }

    /// Whether `var` is the variable the column of leaf `index` currently expects.
    ///
    /// Only the representative of the front partition is valid for an aggregated column; every variable is valid for a plain column.
    pub(crate) fn var_valid(&self, index: usize, var: Var) -> bool {
        match self.nodes[index].aggregated {
            false => true,
            true => match &self.nodes[index].table {
                Some(table) => table
                    .front()
                    .is_some_and(|entry| entry.representative == var),
                None => false,
            },
        }
    }

    /// Collapses the subtree at `index` into an aggregated leaf carrying the column of `head`.
    pub(crate) fn collapse_into_leaf(&mut self, index: usize, head: usize) {
        let pos = self.nodes[head].pos;
        let table = self.nodes[head].table.take();
        let relation = self.nodes[head].relation;

        let node = &mut self.nodes[index];
        node.children.clear();
        node.is_leaf = true;
        node.starred = false;
        node.aggregated = true;
        node.pos = pos;
        node.table = table;
        node.relation = relation;
    }
}

/// Partitions `groups` (indices into `member_sets`) into families connected by overlap.
fn connected_families(member_sets: &[BTreeSet<usize>], groups: &[usize]) -> Vec<Vec<usize>> {
    let mut families: Vec<Vec<usize>> = Vec::new();
    let mut assigned = vec![false; groups.len()];

    for seed in 0..groups.len() {
        if assigned[seed] {
            continue;
        }

        let mut family = vec![groups[seed]];
        assigned[seed] = true;

        let mut grew = true;
        while grew {
            grew = false;
            for candidate in 0..groups.len() {
                if assigned[candidate] {
                    continue;
                }
                let overlaps = family.iter().any(|member| {
                    !member_sets[*member].is_disjoint(&member_sets[groups[candidate]])
                });
                if overlaps {
                    family.push(groups[candidate]);
                    assigned[candidate] = true;
                    grew = true;
                }
            }
        }

        families.push(family);
    }

    families
}

/// Builds the subtree of one family of overlapping groups.
///
/// The groups covering the whole family sit at this node; leaves are created for member relations no narrower group covers, and narrower groups recurse as sub-families.
fn build_family(
    nodes: &mut Vec<Node>,
    description: &JoinDescription,
    member_sets: &[BTreeSet<usize>],
    family: &[usize],
    inherited_attrs: usize,
) -> usize {
    let relations: BTreeSet<usize> = family
        .iter()
        .flat_map(|group| member_sets[*group].iter().copied())
        .collect();

    let (tops, remaining): (Vec<usize>, Vec<usize>) = family
        .iter()
        .copied()
        .partition(|group| member_sets[*group] == relations);

    debug_assert!(!tops.is_empty(), "a laminar family has a maximal group");

    let attr_count = inherited_attrs + tops.len();

    let covered: BTreeSet<usize> = remaining
        .iter()
        .flat_map(|group| member_sets[*group].iter().copied())
        .collect();

    let mut children = Vec::new();

    for relation in &relations {
        if !covered.contains(relation) {
            let keyed = tops
                .iter()
                .any(|group| description.groups[*group].keys.contains(relation));
            let starred = !(attr_count == description.attributes[*relation] || keyed);
            nodes.push(Node::leaf(Some(*relation), starred));
            children.push(nodes.len() - 1);
        }
    }

    for sub_family in connected_families(member_sets, &remaining) {
        let subtree = build_family(nodes, description, member_sets, &sub_family, attr_count);
        children.push(subtree);
    }

    // A node over a single subtree adds no nesting.
    match children.len() {
        1 => children[0],
        _ => {
            nodes.push(Node::internal(children));
            nodes.len() - 1
        }
    }
}

#[cfg(test)]
mod signature_tests {
    use super::*;

    fn two_relation_join() -> JoinDescription {
        // R(x) ⋈ S(x, y) on x, with y a join column of S alone.
        JoinDescription {
            relations: 2,
            attributes: vec![1, 2],
            groups: vec![
                JoinGroup {
                    members: vec![0, 1],
                    keys: vec![],
                },
                JoinGroup {
                    members: vec![1],
                    keys: vec![],
                },
            ],
        }
    }

    #[test]
    fn hierarchical_join_accepted() {
        let signature = Signature::from_join(&two_relation_join()).expect("hierarchical");

        assert_eq!(signature.width(), 2);
        assert!(signature.is_one_scan());
        assert_eq!(signature.variable_order(), vec![Some(0), Some(1)]);
    }

    #[test]
    fn partial_overlap_rejected() {
        // R(x), S(x, y), T(y): the classic non-hierarchical join.
        let description = JoinDescription {
            relations: 3,
            attributes: vec![1, 2, 1],
            groups: vec![
                JoinGroup {
                    members: vec![0, 1],
                    keys: vec![],
                },
                JoinGroup {
                    members: vec![1, 2],
                    keys: vec![],
                },
            ],
        };

        assert_eq!(
            Signature::from_join(&description).err(),
            Some(err::SignatureError::NotHierarchical)
        );
    }

    #[test]
    fn repeated_relation_rejected() {
        let description = JoinDescription {
            relations: 2,
            attributes: vec![1, 1],
            groups: vec![JoinGroup {
                members: vec![0, 0, 1],
                keys: vec![],
            }],
        };

        assert_eq!(
            Signature::from_join(&description).err(),
            Some(err::SignatureError::SelfJoin)
        );
    }

    #[test]
    fn starred_first_column_blocks_one_scan() {
        // R has an attribute beyond the join column and no key, so its
        // variable may repeat across tuples.
        let description = JoinDescription {
            relations: 2,
            attributes: vec![2, 1],
            groups: vec![JoinGroup {
                members: vec![0, 1],
                keys: vec![],
            }],
        };

        let signature = Signature::from_join(&description).expect("hierarchical");
        assert!(!signature.is_one_scan());

        // A key on the extra-attribute relation restores the property.
        let keyed = JoinDescription {
            relations: 2,
            attributes: vec![2, 1],
            groups: vec![JoinGroup {
                members: vec![0, 1],
                keys: vec![0],
            }],
        };

        let signature = Signature::from_join(&keyed).expect("hierarchical");
        assert!(signature.is_one_scan());
    }

    #[test]
    fn builder_derives_head_annotations() {
        let mut builder = SignatureBuilder::new();
        let a = builder.leaf(false);
        let b = builder.leaf(false);
        let c = builder.leaf(false);
        let inner = builder.internal(vec![b, c]);
        let root = builder.internal(vec![a, inner]);
        let signature = builder.finish(root);

        assert_eq!(signature.node(a).pos, 0);
        assert_eq!(signature.node(b).pos, 1);
        assert_eq!(signature.node(c).pos, 2);

        // a heads the root: one sibling subtree holding two leaves.
        assert_eq!(signature.node(a).vars_to_combine, 1);
        assert_eq!(signature.node(a).domain, 2);

        // b heads the inner node: one sibling leaf.
        assert_eq!(signature.node(b).vars_to_combine, 1);
        assert_eq!(signature.node(b).domain, 1);

        assert!(signature.is_one_scan());
    }

    #[test]
    fn non_joined_relations_prepended_starred() {
        let description = JoinDescription {
            relations: 3,
            attributes: vec![1, 1, 1],
            groups: vec![JoinGroup {
                members: vec![1, 2],
                keys: vec![],
            }],
        };

        let signature = Signature::from_join(&description).expect("hierarchical");

        // The non-joined relation 0 leads, starred, so the scan needs scheduling.
        assert_eq!(signature.variable_order()[0], Some(0));
        assert!(!signature.is_one_scan());
    }
}
