use crate::geometry::GeometryNode;
use budgetflow_core::{EdgeId, GraphNode, NodeId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Anything the tail aggregator can rank and fold.
pub trait Foldable {
    fn fold_id(&self) -> &NodeId;
    fn fold_amount(&self) -> f64;
    /// Aggregates are never folded again; aggregation is one level deep.
    fn is_aggregate(&self) -> bool {
        false
    }
}

impl Foldable for GraphNode {
    fn fold_id(&self) -> &NodeId {
        &self.id
    }

    fn fold_amount(&self) -> f64 {
        self.amount
    }
}

impl Foldable for GeometryNode {
    fn fold_id(&self) -> &NodeId {
        &self.id
    }

    fn fold_amount(&self) -> f64 {
        self.amount
    }

    fn is_aggregate(&self) -> bool {
        self.is_aggregate
    }
}

/// Which members of a group stay individually visible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FoldRule {
    KeepAll,
    /// Keep the `n` largest per group.
    KeepTop(usize),
    /// Keep members whose amount reaches the floor.
    AtLeast(f64),
}

#[derive(Debug)]
pub struct GroupPartition<'a, K, T> {
    pub key: K,
    /// Kept members, largest first. Pre-existing aggregates are always kept.
    pub kept: Vec<&'a T>,
    /// Members to fold, in the same amount-descending order.
    pub folded: Vec<&'a T>,
}

impl<K, T: Foldable> GroupPartition<'_, K, T> {
    pub fn folded_amount(&self) -> f64 {
        self.folded.iter().map(|n| n.fold_amount()).sum()
    }

    pub fn folded_ids(&self) -> Vec<NodeId> {
        self.folded.iter().map(|n| n.fold_id().clone()).collect()
    }
}

/// Amount descending, ties broken by id so the order never depends on input order.
pub fn by_amount_desc<T: Foldable>(a: &T, b: &T) -> Ordering {
    b.fold_amount()
        .total_cmp(&a.fold_amount())
        .then_with(|| a.fold_id().cmp(b.fold_id()))
}

pub fn other_label(count: usize) -> String {
    format!("Other ({count} items)")
}

/// Partitions nodes per grouping key into kept and folded sets.
pub struct TailAggregator {
    pub rule: FoldRule,
}

impl TailAggregator {
    pub fn new(rule: FoldRule) -> Self {
        Self { rule }
    }

    pub fn partition<'a, T, K, I, F>(&self, items: I, key_of: F) -> Vec<GroupPartition<'a, K, T>>
    where
        T: Foldable + 'a,
        K: Ord,
        I: IntoIterator<Item = &'a T>,
        F: Fn(&T) -> K,
    {
        let mut groups: BTreeMap<K, Vec<&'a T>> = BTreeMap::new();
        for item in items {
            groups.entry(key_of(item)).or_default().push(item);
        }

        groups
            .into_iter()
            .map(|(key, mut members)| {
                members.sort_by(|a, b| by_amount_desc(*a, *b));
                let (kept, folded) = self.split(members);
                GroupPartition { key, kept, folded }
            })
            .collect()
    }

    fn split<'a, T: Foldable>(&self, members: Vec<&'a T>) -> (Vec<&'a T>, Vec<&'a T>) {
        let mut kept = Vec::new();
        let mut folded = Vec::new();
        let mut slots_used = 0usize;
        for member in members {
            let keep = member.is_aggregate()
                || match self.rule {
                    FoldRule::KeepAll => true,
                    FoldRule::KeepTop(n) => {
                        slots_used += 1;
                        slots_used <= n
                    }
                    FoldRule::AtLeast(floor) => member.fold_amount() >= floor,
                };
            if keep {
                kept.push(member);
            } else {
                folded.push(member);
            }
        }
        (kept, folded)
    }
}

/// Folded member id to the id of the aggregate that absorbed it.
#[derive(Debug, Default, Clone)]
pub struct FoldMap {
    targets: HashMap<NodeId, NodeId>,
}

impl FoldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_all(&mut self, members: &[NodeId], aggregate: &NodeId) {
        for member in members {
            self.targets.insert(member.clone(), aggregate.clone());
        }
    }

    pub fn resolve(&self, id: &NodeId) -> NodeId {
        self.targets.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// One edge per resolved (source, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub value: f64,
    pub merged_count: usize,
}

/// Borrowed view of one edge fed to [`merge_edges`].
#[derive(Debug, Clone, Copy)]
pub struct FlowRef<'a> {
    pub id: &'a EdgeId,
    pub source: &'a NodeId,
    pub target: &'a NodeId,
    pub value: f64,
    /// Original edges this one already stands for.
    pub count: usize,
}

impl<'a> FlowRef<'a> {
    pub fn new(id: &'a EdgeId, source: &'a NodeId, target: &'a NodeId, value: f64) -> Self {
        Self {
            id,
            source,
            target,
            value,
            count: 1,
        }
    }
}

/// Rewrites edge endpoints through the fold map and sums edges that land on the
/// same pair. Output is ordered by (source, target).
///
/// A pair with one contributor keeps that edge's id. A merged pair is named
/// `<source>-><target>`, suffixed with `#2`, `#3`, ... if that id is already taken.
pub fn merge_edges<'a, I>(edges: I, folds: &FoldMap) -> Vec<MergedEdge>
where
    I: IntoIterator<Item = FlowRef<'a>>,
{
    let mut merged: BTreeMap<(NodeId, NodeId), MergedEdge> = BTreeMap::new();
    let mut contributors: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
    for flow in edges {
        let source = folds.resolve(flow.source);
        let target = folds.resolve(flow.target);
        let key = (source.clone(), target.clone());
        *contributors.entry(key.clone()).or_default() += 1;
        merged
            .entry(key)
            .and_modify(|edge| {
                edge.value += flow.value;
                edge.merged_count += flow.count;
            })
            .or_insert_with(|| MergedEdge {
                id: flow.id.clone(),
                source,
                target,
                value: flow.value,
                merged_count: flow.count,
            });
    }

    let is_merged = |key: &(NodeId, NodeId)| contributors.get(key).copied().unwrap_or(0) > 1;
    let mut taken: HashSet<EdgeId> = merged
        .iter()
        .filter(|(key, _)| !is_merged(key))
        .map(|(_, edge)| edge.id.clone())
        .collect();

    merged
        .into_iter()
        .map(|(key, mut edge)| {
            if is_merged(&key) {
                edge.id = unclaimed_id(format!("{}->{}", edge.source, edge.target), &mut taken);
            }
            edge
        })
        .collect()
}

fn unclaimed_id(base: String, taken: &mut HashSet<EdgeId>) -> EdgeId {
    let mut candidate = EdgeId::new(base.clone());
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = EdgeId::new(format!("{base}#{suffix}"));
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
