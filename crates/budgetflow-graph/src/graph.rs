use budgetflow_core::{GraphDocument, GraphEdge, GraphNode, InputMetadata, LAYER_COUNT, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeIndex(pub usize);

impl fmt::Display for EdgeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved layout owner of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Ministry(NodeIndex),
    Unowned,
}

/// Indexed, immutable view over an input graph.
///
/// Ownership policy: a layer-0 node owns itself. Any other node whose `owner_key`
/// names a layer-0 node's display name is owned by that node. Otherwise the owner
/// is the first layer-0 node reached by a breadth-first walk backward along
/// incoming edges (in input edge order). Nodes with no such ancestor are
/// [`Owner::Unowned`]. Every layer-0 ancestor, not just the resolved one, is
/// recorded separately in `source_owners`.
#[derive(Debug)]
pub struct GraphModel {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    pub node_map: HashMap<NodeId, NodeIndex>,
    edge_endpoints: Vec<(NodeIndex, NodeIndex)>,
    by_source: Vec<Vec<EdgeIndex>>,
    by_target: Vec<Vec<EdgeIndex>>,
    layers: [Vec<NodeIndex>; LAYER_COUNT],
    ministry_by_name: HashMap<String, NodeIndex>,
    owners: Vec<Owner>,
    source_owners: Vec<Vec<NodeId>>,
    dropped_edge_count: usize,
    duplicate_node_count: usize,
    fingerprint: u64,
    metadata: InputMetadata,
}

impl GraphModel {
    pub fn from_document(document: GraphDocument) -> Self {
        let GraphDocument {
            metadata,
            nodes: raw_nodes,
            edges: raw_edges,
        } = document;

        let mut model = Self {
            nodes: Vec::with_capacity(raw_nodes.len()),
            edges: Vec::with_capacity(raw_edges.len()),
            node_map: HashMap::with_capacity(raw_nodes.len()),
            edge_endpoints: Vec::with_capacity(raw_edges.len()),
            by_source: Vec::new(),
            by_target: Vec::new(),
            layers: Default::default(),
            ministry_by_name: HashMap::new(),
            owners: Vec::new(),
            source_owners: Vec::new(),
            dropped_edge_count: 0,
            duplicate_node_count: 0,
            fingerprint: 0,
            metadata,
        };

        for node in raw_nodes {
            model.add_node(node);
        }
        model.by_source = vec![Vec::new(); model.nodes.len()];
        model.by_target = vec![Vec::new(); model.nodes.len()];
        for edge in raw_edges {
            model.add_edge(edge);
        }

        if model.dropped_edge_count > 0 {
            tracing::info!(
                "Dropped {} edges with missing or backward endpoints",
                model.dropped_edge_count
            );
        }

        model.owners = (0..model.nodes.len())
            .map(|i| model.resolve_owner(NodeIndex(i)))
            .collect();
        model.source_owners = model.collect_source_owners();
        model.fingerprint = model.compute_fingerprint();
        model
    }

    fn add_node(&mut self, node: GraphNode) {
        if self.node_map.contains_key(&node.id) {
            tracing::warn!("Ignoring duplicate node id {}", node.id);
            self.duplicate_node_count += 1;
            return;
        }
        if node.layer_index as usize != node.layer() {
            tracing::debug!(
                "Node {} declares layer {} but type {} places it in layer {}",
                node.id,
                node.layer_index,
                node.node_type,
                node.layer()
            );
        }

        let idx = NodeIndex(self.nodes.len());
        self.layers[node.layer()].push(idx);
        if node.layer() == 0 {
            self.ministry_by_name
                .entry(node.display_name.clone())
                .or_insert(idx);
        }
        self.node_map.insert(node.id.clone(), idx);
        self.nodes.push(node);
    }

    fn add_edge(&mut self, edge: GraphEdge) {
        let (Some(&src), Some(&target)) = (
            self.node_map.get(&edge.source_id),
            self.node_map.get(&edge.target_id),
        ) else {
            if !self.node_map.contains_key(&edge.source_id) {
                tracing::warn!(
                    "Dropping edge {} because source node {} is missing from graph model",
                    edge.id,
                    edge.source_id
                );
            }
            if !self.node_map.contains_key(&edge.target_id) {
                tracing::warn!(
                    "Dropping edge {} because target node {} is missing from graph model",
                    edge.id,
                    edge.target_id
                );
            }
            self.dropped_edge_count += 1;
            return;
        };

        if self.nodes[src.0].layer() >= self.nodes[target.0].layer() {
            tracing::warn!(
                "Dropping edge {} because it does not flow forward ({} -> {})",
                edge.id,
                edge.source_id,
                edge.target_id
            );
            self.dropped_edge_count += 1;
            return;
        }

        let idx = EdgeIndex(self.edges.len());
        self.by_source[src.0].push(idx);
        self.by_target[target.0].push(idx);
        self.edge_endpoints.push((src, target));
        self.edges.push(edge);
    }

    fn resolve_owner(&self, idx: NodeIndex) -> Owner {
        let node = &self.nodes[idx.0];
        if node.layer() == 0 {
            return Owner::Ministry(idx);
        }

        if let Some(&ministry) = node
            .owner_key
            .as_ref()
            .and_then(|key| self.ministry_by_name.get(key))
        {
            return Owner::Ministry(ministry);
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(idx);
        queue.push_back(idx);
        while let Some(current) = queue.pop_front() {
            for &edge_idx in self.incoming(current) {
                let (source, _) = self.edge_endpoints[edge_idx.0];
                if !seen.insert(source) {
                    continue;
                }
                if self.nodes[source.0].layer() == 0 {
                    return Owner::Ministry(source);
                }
                queue.push_back(source);
            }
        }

        Owner::Unowned
    }

    // Edges only flow forward, so pushing along outgoing edges in layer order
    // finishes every node's set before it is propagated.
    fn collect_source_owners(&self) -> Vec<Vec<NodeId>> {
        let mut sets: Vec<BTreeSet<NodeIndex>> = vec![BTreeSet::new(); self.nodes.len()];
        for layer in &self.layers {
            for &idx in layer {
                if self.nodes[idx.0].layer() == 0 {
                    sets[idx.0].insert(idx);
                }
                if sets[idx.0].is_empty() {
                    continue;
                }
                let owners = sets[idx.0].clone();
                for &edge_idx in self.outgoing(idx) {
                    let (_, target) = self.edge_endpoints[edge_idx.0];
                    sets[target.0].extend(owners.iter().copied());
                }
            }
        }

        sets.into_iter()
            .map(|set| {
                let mut ids: Vec<NodeId> =
                    set.into_iter().map(|i| self.nodes[i.0].id.clone()).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    fn compute_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.nodes.len().hash(&mut hasher);
        for node in &self.nodes {
            node.id.hash(&mut hasher);
            node.node_type.hash(&mut hasher);
            node.amount.to_bits().hash(&mut hasher);
            node.owner_key.hash(&mut hasher);
        }
        self.edges.len().hash(&mut hasher);
        for edge in &self.edges {
            edge.source_id.hash(&mut hasher);
            edge.target_id.hash(&mut hasher);
            edge.value.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.nodes[idx.0]
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.node_map.get(id).map(|&idx| &self.nodes[idx.0])
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edge_endpoints(&self, idx: EdgeIndex) -> (NodeIndex, NodeIndex) {
        self.edge_endpoints[idx.0]
    }

    pub fn outgoing(&self, idx: NodeIndex) -> &[EdgeIndex] {
        &self.by_source[idx.0]
    }

    pub fn incoming(&self, idx: NodeIndex) -> &[EdgeIndex] {
        &self.by_target[idx.0]
    }

    pub fn layer(&self, layer: usize) -> &[NodeIndex] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn owner_of(&self, idx: NodeIndex) -> Owner {
        self.owners[idx.0]
    }

    /// Id of the owning ministry, or `None` for unowned nodes.
    pub fn owner_id(&self, idx: NodeIndex) -> Option<&NodeId> {
        match self.owners[idx.0] {
            Owner::Ministry(m) => Some(&self.nodes[m.0].id),
            Owner::Unowned => None,
        }
    }

    pub fn source_owners(&self, idx: NodeIndex) -> &[NodeId] {
        &self.source_owners[idx.0]
    }

    pub fn unowned_count(&self) -> usize {
        self.owners
            .iter()
            .filter(|owner| matches!(owner, Owner::Unowned))
            .count()
    }

    pub fn dropped_edge_count(&self) -> usize {
        self.dropped_edge_count
    }

    pub fn duplicate_node_count(&self) -> usize {
        self.duplicate_node_count
    }

    /// Stable identity of the indexed content, used as a memoization key.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn metadata(&self) -> &InputMetadata {
        &self.metadata
    }
}
