use crate::layout::SectionBand;
use crate::params::LayoutMode;
use budgetflow_core::{Attributes, EdgeId, GraphNode, NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::NOTHING
    }
}

impl Bounds {
    /// An empty box at the origin
    pub const NOTHING: Self = Self {
        min_x: 0.0,
        max_x: 0.0,
        min_y: 0.0,
        max_y: 0.0,
    };

    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn from_center_size(center: Point, width: f64, height: f64) -> Self {
        Self {
            min_x: center.x - width / 2.0,
            max_x: center.x + width / 2.0,
            min_y: center.y - height / 2.0,
            max_y: center.y + height / 2.0,
        }
    }

    /// Tight box around a point set, `None` when the set is empty.
    pub fn around_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first.x, first.y, first.x, first.y);
        for p in iter {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.max_x, self.min_y, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Closed-interval overlap test, so touching boxes intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grows the box on every side by `ratio` of its own width/height.
    pub fn padded(&self, ratio: f64) -> Bounds {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        Bounds {
            min_x: self.min_x - dx,
            max_x: self.max_x + dx,
            min_y: self.min_y - dy,
            max_y: self.max_y + dy,
        }
    }

    /// Tight box around every node rectangle, or `NOTHING` for an empty slice.
    pub fn enclosing(nodes: &[GeometryNode]) -> Bounds {
        nodes
            .iter()
            .map(GeometryNode::rect)
            .reduce(|acc, r| acc.union(&r))
            .unwrap_or(Self::NOTHING)
    }
}

/// A laid-out node: the input identity plus position, size and aggregation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryNode {
    pub id: NodeId,
    pub layer_index: u8,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub display_name: String,
    pub amount: f64,
    /// Resolved owning ministry id used for sectioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_owners: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub is_aggregate: bool,
    pub aggregated_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregated_ids: Vec<NodeId>,
}

impl GeometryNode {
    /// Unplaced geometry for an input node.
    pub fn from_graph_node(
        node: &GraphNode,
        owner_key: Option<NodeId>,
        source_owners: Vec<NodeId>,
    ) -> Self {
        Self {
            id: node.id.clone(),
            layer_index: node.layer() as u8,
            node_type: node.node_type,
            display_name: node.display_name.clone(),
            amount: node.amount,
            owner_key,
            source_owners,
            attributes: node.attributes.clone(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            is_aggregate: false,
            aggregated_count: 0,
            aggregated_ids: Vec::new(),
        }
    }

    pub fn layer(&self) -> usize {
        self.layer_index as usize
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn rect(&self) -> Bounds {
        Bounds::from_center_size(self.center(), self.width, self.height)
    }

    /// Anchor where outgoing edges leave the node.
    pub fn right_center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y)
    }

    /// Anchor where incoming edges enter the node.
    pub fn left_center(&self) -> Point {
        Point::new(self.x - self.width / 2.0, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub value: f64,
    pub width: f64,
    pub path: Vec<Point>,
    /// Number of original edges folded into this one.
    pub merged_count: usize,
}

impl GeometryEdge {
    pub fn path_bounds(&self) -> Option<Bounds> {
        Bounds::around_points(&self.path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub dropped_edge_count: usize,
    pub unowned_count: usize,
    pub aggregate_count: usize,
    pub hidden_count: usize,
    pub culled_node_count: usize,
    pub culled_edge_count: usize,
    /// Amount that maps to one unit height; kept so views can size new aggregates.
    pub size_threshold: f64,
    pub mode: LayoutMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Bounds of the layout before viewport culling.
    pub canvas: Bounds,
    /// Ministry bands of the sectioned layers, top to bottom, before culling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_files: Vec<String>,
}

/// Output order: layer, then vertical position, then id.
pub fn sort_for_output(nodes: &mut [GeometryNode]) {
    nodes.sort_by(|a, b| {
        a.layer_index
            .cmp(&b.layer_index)
            .then_with(|| a.y.total_cmp(&b.y))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Engine output consumed by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub metadata: LayoutMetadata,
    pub nodes: Vec<GeometryNode>,
    pub edges: Vec<GeometryEdge>,
    pub bounds: Bounds,
}

impl LayoutDocument {
    pub fn node(&self, id: &NodeId) -> Option<&GeometryNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn edge_between(&self, source: &NodeId, target: &NodeId) -> Option<&GeometryEdge> {
        self.edges
            .iter()
            .find(|e| &e.source_id == source && &e.target_id == target)
    }

    /// Recomputes counts and the tight bounds after nodes or edges changed.
    pub fn refresh_summary(&mut self) {
        self.metadata.node_count = self.nodes.len();
        self.metadata.edge_count = self.edges.len();
        self.metadata.aggregate_count = self.nodes.iter().filter(|n| n.is_aggregate).count();
        self.bounds = Bounds::enclosing(&self.nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(id: &str, x: f64, y: f64, w: f64, h: f64) -> GeometryNode {
        let source = GraphNode::new(id, NodeType::Project, id, 1.0);
        let mut node = GeometryNode::from_graph_node(&source, None, vec![]);
        node.x = x;
        node.y = y;
        node.width = w;
        node.height = h;
        node
    }

    #[test]
    fn test_enclosing_is_tight() {
        let nodes = vec![node_at("a", 0.0, 0.0, 10.0, 4.0), node_at("b", 100.0, 50.0, 10.0, 20.0)];
        let bounds = Bounds::enclosing(&nodes);
        assert_eq!(bounds, Bounds::new(-5.0, -2.0, 105.0, 60.0));
        assert_eq!(Bounds::enclosing(&[]), Bounds::NOTHING);
    }

    #[test]
    fn test_padded_grows_by_ratio() {
        let b = Bounds::new(0.0, 0.0, 100.0, 10.0).padded(0.5);
        assert_eq!(b, Bounds::new(-50.0, -5.0, 150.0, 15.0));
    }

    #[test]
    fn test_touching_boxes_intersect() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(10.0, 0.0, 20.0, 10.0);
        let c = Bounds::new(10.1, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_anchors_sit_on_vertical_edges() {
        let n = node_at("a", 10.0, 5.0, 4.0, 2.0);
        assert_eq!(n.right_center(), Point::new(12.0, 5.0));
        assert_eq!(n.left_center(), Point::new(8.0, 5.0));
    }
}
