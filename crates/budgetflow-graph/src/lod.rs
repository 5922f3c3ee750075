//! Zoom-driven level of detail over an existing base layout.
//!
//! A view never re-reads the input graph. It works from the base
//! [`LayoutDocument`] alone: nodes below the zoom-scaled threshold of their
//! layer fold into one aggregate per (nearest visible ancestor, layer), edges
//! are rerouted onto the surviving endpoints, and the reduced set is re-packed
//! in the base order before the optional viewport cull.

use crate::bundling::{FlowRef, FoldMap, FoldRule, TailAggregator, merge_edges, other_label};
use crate::edge_router::EdgeRouter;
use crate::geometry::{Bounds, GeometryNode, LayoutDocument, sort_for_output};
use crate::layout::{LayerPacker, Layouter, OrderHints};
use crate::observer::{LayoutObserver, Stage, timed};
use crate::scale::{AmountScale, EdgeWidthScale};
use budgetflow_core::{LAYER_COUNT, NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Each zoom level divides thresholds by this factor.
pub const ZOOM_FACTOR: f64 = 4.0;

const UNOWNED_ANCESTOR: &str = "unowned";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LodConfig {
    /// Multiplier on the request threshold per layer. Layer 0 is never hidden.
    pub layer_weights: [f64; LAYER_COUNT],
    /// Fraction of the viewport size added on every side before culling.
    pub viewport_padding: f64,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            layer_weights: [0.0, 1.0, 1.0, 1.0, 1.0],
            viewport_padding: 0.5,
        }
    }
}

/// Minimum visible amount per layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerThresholds([f64; LAYER_COUNT]);

impl LayerThresholds {
    pub fn new(values: [f64; LAYER_COUNT]) -> Self {
        Self(values)
    }

    pub fn from_weights(threshold: f64, weights: &[f64; LAYER_COUNT]) -> Self {
        Self(weights.map(|w| threshold * w))
    }

    /// `base / 4^max(0, zoom)`; negative zoom never raises a threshold.
    pub fn at_zoom(&self, zoom: f64) -> Self {
        let divisor = ZOOM_FACTOR.powf(zoom.max(0.0));
        Self(self.0.map(|t| t / divisor))
    }

    pub fn get(&self, layer: usize) -> f64 {
        self.0.get(layer).copied().unwrap_or(0.0)
    }
}

/// What a single view asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRequest {
    /// Un-zoomed thresholds. `None` skips reclassification entirely.
    pub thresholds: Option<LayerThresholds>,
    pub zoom: f64,
    pub viewport: Option<Bounds>,
}

pub struct LevelOfDetail<'a> {
    pub packer: LayerPacker,
    pub widths: EdgeWidthScale,
    pub router: EdgeRouter,
    pub scale: AmountScale,
    pub viewport_padding: f64,
    pub observer: Option<&'a dyn LayoutObserver>,
}

impl LevelOfDetail<'_> {
    pub fn view(&self, base: &LayoutDocument, request: &ViewRequest) -> LayoutDocument {
        let mut doc = match request.thresholds {
            Some(thresholds) => {
                let thresholds = thresholds.at_zoom(request.zoom);
                let mut doc = timed(self.observer, Stage::Reclassify, || {
                    self.reclassify(base, &thresholds)
                });
                doc.metadata.zoom = Some(request.zoom);
                doc
            }
            None => base.clone(),
        };

        doc.metadata.canvas = Bounds::enclosing(&doc.nodes);
        if let Some(viewport) = &request.viewport {
            timed(self.observer, Stage::Cull, || self.cull(&mut doc, viewport));
        }
        doc.refresh_summary();
        doc
    }

    /// Folds hidden nodes, re-merges edges and re-packs the survivors.
    pub fn reclassify(
        &self,
        base: &LayoutDocument,
        thresholds: &LayerThresholds,
    ) -> LayoutDocument {
        let scale = self.scale.with_threshold(base.metadata.size_threshold);
        let index: HashMap<&NodeId, usize> =
            base.nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect();
        let visible: Vec<bool> = base
            .nodes
            .iter()
            .map(|n| n.layer() == 0 || n.is_aggregate || n.amount >= thresholds.get(n.layer()))
            .collect();

        // Primary parent: largest inbound flow, ties to the smaller source id.
        let mut parent: Vec<Option<(usize, f64)>> = vec![None; base.nodes.len()];
        for edge in &base.edges {
            let (Some(&s), Some(&t)) = (index.get(&edge.source_id), index.get(&edge.target_id))
            else {
                continue;
            };
            let better = match parent[t] {
                None => true,
                Some((current, value)) => {
                    edge.value > value
                        || (edge.value == value && base.nodes[s].id < base.nodes[current].id)
                }
            };
            if better {
                parent[t] = Some((s, edge.value));
            }
        }

        let nearest_visible = |start: usize| -> Option<usize> {
            let mut current = start;
            // Parents sit on strictly lower layers, so this walk is bounded.
            for _ in 0..LAYER_COUNT {
                let (p, _) = parent[current]?;
                if visible[p] {
                    return Some(p);
                }
                current = p;
            }
            None
        };

        let mut nodes: Vec<GeometryNode> = Vec::with_capacity(base.nodes.len());
        let mut folds = FoldMap::new();
        let mut hints = OrderHints::new();

        for layer in 0..LAYER_COUNT {
            let rule = if layer == 0 {
                FoldRule::KeepAll
            } else {
                FoldRule::AtLeast(thresholds.get(layer))
            };
            let partitions = TailAggregator::new(rule).partition(
                base.nodes.iter().filter(|n| n.layer() == layer),
                |n: &GeometryNode| index.get(&n.id).and_then(|&i| nearest_visible(i)),
            );

            let (mut kept, mut folded) = (0usize, 0usize);
            for partition in partitions {
                for node in &partition.kept {
                    hints.insert(node.id.clone(), node.y);
                    nodes.push((*node).clone());
                }
                kept += partition.kept.len();
                if partition.folded.is_empty() {
                    continue;
                }
                folded += partition.folded.len();

                let ancestor = partition.key.map(|i| &base.nodes[i]);
                let aggregate = Self::aggregate_node(layer, ancestor, &partition.folded, &scale);
                folds.insert_all(&aggregate.aggregated_ids, &aggregate.id);
                let hint = partition
                    .folded
                    .iter()
                    .map(|n| n.y)
                    .fold(f64::INFINITY, f64::min);
                hints.insert(aggregate.id.clone(), hint);
                nodes.push(aggregate);
            }
            if let Some(observer) = self.observer {
                observer.on_layer_aggregated(layer, kept, folded);
            }
        }

        let flows = merge_edges(
            base.edges.iter().map(|e| FlowRef {
                count: e.merged_count.max(1),
                ..FlowRef::new(&e.id, &e.source_id, &e.target_id, e.value)
            }),
            &folds,
        );

        let packed = timed(self.observer, Stage::Pack, || {
            self.packer.execute(&mut nodes, &flows, &hints)
        });
        let edges = timed(self.observer, Stage::Route, || {
            self.router.build_edges(&nodes, flows, &self.widths)
        });
        sort_for_output(&mut nodes);

        let mut metadata = base.metadata.clone();
        metadata.hidden_count = folds.len();
        metadata.sections = packed.sections;
        let mut doc = LayoutDocument {
            metadata,
            nodes,
            edges,
            bounds: Bounds::NOTHING,
        };
        doc.refresh_summary();
        doc
    }

    fn aggregate_node(
        layer: usize,
        ancestor: Option<&GeometryNode>,
        members: &[&GeometryNode],
        scale: &AmountScale,
    ) -> GeometryNode {
        let ancestor_id = ancestor.map_or(UNOWNED_ANCESTOR, |a| a.id.as_str());
        let amount: f64 = members.iter().map(|n| n.amount).sum();
        let owner_key = match ancestor {
            Some(a) if a.layer() == 0 => Some(a.id.clone()),
            Some(a) => a.owner_key.clone(),
            None => members.first().and_then(|n| n.owner_key.clone()),
        };
        let source_owners: BTreeSet<NodeId> = members
            .iter()
            .flat_map(|n| n.source_owners.iter().cloned())
            .collect();
        let node_type = NodeType::for_layer(layer).unwrap_or(NodeType::Recipient);

        GeometryNode {
            id: NodeId::new(format!("{ancestor_id}::other:{layer}")),
            layer_index: layer as u8,
            node_type,
            display_name: other_label(members.len()),
            amount,
            owner_key,
            source_owners: source_owners.into_iter().collect(),
            attributes: Default::default(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: scale.height_of(amount, true),
            is_aggregate: true,
            aggregated_count: members.len(),
            aggregated_ids: members.iter().map(|n| n.id.clone()).collect(),
        }
    }

    /// Drops nodes outside the padded viewport and edges that neither cross it
    /// nor connect two retained nodes.
    pub fn cull(&self, doc: &mut LayoutDocument, viewport: &Bounds) {
        let padded = viewport.padded(self.viewport_padding);
        let (nodes_before, edges_before) = (doc.nodes.len(), doc.edges.len());

        doc.nodes.retain(|n| n.rect().intersects(&padded));
        let retained: HashSet<&NodeId> = doc.nodes.iter().map(|n| &n.id).collect();
        doc.edges.retain(|e| {
            e.path_bounds().is_some_and(|b| b.intersects(&padded))
                || (retained.contains(&e.source_id) && retained.contains(&e.target_id))
        });

        let culled_nodes = nodes_before - doc.nodes.len();
        let culled_edges = edges_before - doc.edges.len();
        doc.metadata.culled_node_count = culled_nodes;
        doc.metadata.culled_edge_count = culled_edges;
        if let Some(observer) = self.observer {
            observer.on_culled(culled_nodes, culled_edges);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeometryEdge, Point};
    use crate::layout::PackerConfig;
    use crate::observer::testing::RecordingObserver;
    use budgetflow_core::{EdgeId, GraphNode};

    fn lod(observer: Option<&dyn LayoutObserver>) -> LevelOfDetail<'_> {
        LevelOfDetail {
            packer: LayerPacker::new(PackerConfig::default()),
            widths: EdgeWidthScale::default(),
            router: EdgeRouter::default(),
            scale: AmountScale::default(),
            viewport_padding: 0.5,
            observer,
        }
    }

    fn node(id: &str, ty: NodeType, amount: f64, owner: &str, y: f64) -> GeometryNode {
        let mut n = GeometryNode::from_graph_node(
            &GraphNode::new(id, ty, id, amount),
            Some(NodeId::from(owner)),
            vec![NodeId::from(owner)],
        );
        n.x = ty.layer_index() as f64 * 250.0;
        n.y = y;
        n.width = 50.0;
        n.height = 10.0;
        n
    }

    fn edge(source: &str, target: &str, value: f64) -> GeometryEdge {
        GeometryEdge {
            id: EdgeId::new(format!("{source}->{target}")),
            source_id: NodeId::from(source),
            target_id: NodeId::from(target),
            value,
            width: 1.0,
            path: vec![],
            merged_count: 1,
        }
    }

    fn weighted(threshold: f64) -> LayerThresholds {
        LayerThresholds::from_weights(threshold, &LodConfig::default().layer_weights)
    }

    /// M1 -> B1 -> D1 -> {P1 (large), P2, P3 (small)}; P* -> R1.
    fn base() -> LayoutDocument {
        let mut doc = LayoutDocument {
            nodes: vec![
                node("M1", NodeType::Ministry, 1e12, "M1", 0.0),
                node("B1", NodeType::Bureau, 1e12, "M1", 0.0),
                node("D1", NodeType::Division, 1e12, "M1", 0.0),
                node("P1", NodeType::Project, 5e11, "M1", 0.0),
                node("P2", NodeType::Project, 1e8, "M1", 20.0),
                node("P3", NodeType::Project, 2e8, "M1", 40.0),
                node("R1", NodeType::Recipient, 6e11, "M1", 0.0),
            ],
            edges: vec![
                edge("M1", "B1", 1e12),
                edge("B1", "D1", 1e12),
                edge("D1", "P1", 5e11),
                edge("D1", "P2", 1e8),
                edge("D1", "P3", 2e8),
                edge("P1", "R1", 5e11),
                edge("P2", "R1", 1e8),
                edge("P3", "R1", 2e8),
            ],
            ..LayoutDocument::default()
        };
        doc.metadata.size_threshold = 1e9;
        doc
    }

    #[test]
    fn test_zoom_divides_thresholds() {
        let base = LayerThresholds::from_weights(1e9, &[0.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(base.get(0), 0.0);
        assert!((base.at_zoom(1.0).get(3) - 2.5e8).abs() < 1.0);
        assert!((base.at_zoom(2.0).get(3) - 6.25e7).abs() < 1.0);
        assert_eq!(base.at_zoom(-3.0), base);
    }

    #[test]
    fn test_small_siblings_fold_under_nearest_visible_ancestor() {
        let doc = lod(None).reclassify(&base(), &weighted(1e9));

        let aggregate = doc.node(&NodeId::from("D1::other:3")).expect("aggregate");
        assert!(aggregate.is_aggregate);
        assert_eq!(aggregate.aggregated_count, 2);
        assert_eq!(aggregate.amount, 3e8);
        assert_eq!(aggregate.display_name, "Other (2 items)");
        assert_eq!(aggregate.owner_key, Some(NodeId::from("M1")));
        assert!(doc.node(&NodeId::from("P2")).is_none());
        assert_eq!(doc.metadata.hidden_count, 2);

        let into = doc
            .edge_between(&NodeId::from("D1"), &aggregate.id)
            .expect("rerouted inbound");
        assert_eq!(into.value, 3e8);
        assert_eq!(into.merged_count, 2);
        let out = doc
            .edge_between(&aggregate.id, &NodeId::from("R1"))
            .expect("rerouted outbound");
        assert_eq!(out.value, 3e8);
    }

    #[test]
    fn test_zooming_in_reveals_nodes() {
        let thresholds = LayerThresholds::from_weights(1e9, &[0.0, 1.0, 1.0, 1.0, 1.0]);
        let doc = lod(None).view(
            &base(),
            &ViewRequest {
                thresholds: Some(thresholds),
                zoom: 3.0,
                viewport: None,
            },
        );
        // 1e9 / 64 is below both small projects.
        assert!(doc.node(&NodeId::from("P2")).is_some());
        assert!(doc.node(&NodeId::from("P3")).is_some());
        assert_eq!(doc.metadata.aggregate_count, 0);
        assert_eq!(doc.metadata.zoom, Some(3.0));
    }

    #[test]
    fn test_amount_is_conserved_per_layer() {
        let base = base();
        let doc = lod(None).reclassify(&base, &weighted(1e12));
        for layer in 0..LAYER_COUNT {
            let total = |nodes: &[GeometryNode]| -> f64 {
                nodes
                    .iter()
                    .filter(|n| n.layer() == layer)
                    .map(|n| n.amount)
                    .sum()
            };
            let (before, after) = (total(&base.nodes), total(&doc.nodes));
            assert!((before - after).abs() < 1e-3 * before.max(1.0), "layer {layer}");
        }
        let total_before: f64 = base.edges.iter().map(|e| e.value).sum();
        let total_after: f64 = doc.edges.iter().map(|e| e.value).sum();
        assert!((total_before - total_after).abs() < 1.0);
    }

    #[test]
    fn test_hidden_chain_falls_back_to_visible_grandparent() {
        // Threshold hides B1, D1 and every project; all fold under M1.
        let thresholds = LayerThresholds::new([0.0, 2e12, 2e12, 2e12, 0.0]);
        let doc = lod(None).reclassify(&base(), &thresholds);
        for layer in 1..=3 {
            let id = NodeId::new(format!("M1::other:{layer}"));
            assert!(doc.node(&id).is_some(), "missing {id}");
        }
        assert!(doc.node(&NodeId::from("R1")).is_some());
    }

    #[test]
    fn test_visible_nodes_keep_base_size() {
        let base = base();
        let doc = lod(None).reclassify(&base, &weighted(1e9));
        let before = base.node(&NodeId::from("P1")).unwrap();
        let after = doc.node(&NodeId::from("P1")).unwrap();
        assert_eq!(before.height, after.height);
    }

    #[test]
    fn test_cull_keeps_padded_viewport_contents() {
        let mut doc = base();
        let observer = RecordingObserver::default();
        // Only the ministry column overlaps the padded viewport.
        lod(Some(&observer)).cull(&mut doc, &Bounds::new(-10.0, -5.0, 10.0, 5.0));

        assert!(doc.node(&NodeId::from("M1")).is_some());
        assert!(doc.node(&NodeId::from("P3")).is_none());
        assert_eq!(doc.metadata.culled_node_count, 6);
        assert_eq!(doc.metadata.culled_edge_count, 8);
        assert_eq!(observer.culled.lock().len(), 1);
    }

    #[test]
    fn test_cull_keeps_edges_crossing_viewport() {
        let mut doc = LayoutDocument {
            nodes: vec![
                node("A", NodeType::Ministry, 1.0, "A", 0.0),
                node("B", NodeType::Bureau, 1.0, "A", 0.0),
            ],
            ..LayoutDocument::default()
        };
        doc.nodes[1].x = 1000.0;
        let mut crossing = edge("A", "B", 1.0);
        crossing.path = vec![Point::new(25.0, 0.0), Point::new(975.0, 0.0)];
        doc.edges.push(crossing);

        lod(None).cull(&mut doc, &Bounds::new(400.0, -10.0, 500.0, 10.0));
        assert!(doc.nodes.is_empty());
        assert_eq!(doc.edges.len(), 1);
    }
}
