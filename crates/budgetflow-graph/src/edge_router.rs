use crate::bundling::MergedEdge;
use crate::geometry::{GeometryEdge, GeometryNode, Point};
use crate::scale::EdgeWidthScale;
use budgetflow_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cubic bezier curve segment defined by four control points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

impl CubicBezier {
    /// Sample the curve at parameter t [0, 1]
    pub fn sample(&self, t: f64) -> Point {
        let t2 = t * t;
        let t3 = t2 * t;
        let mt = 1.0 - t;
        let mt2 = mt * mt;
        let mt3 = mt2 * mt;

        let x = self.start.x * mt3
            + 3.0 * self.control1.x * mt2 * t
            + 3.0 * self.control2.x * mt * t2
            + self.end.x * t3;
        let y = self.start.y * mt3
            + 3.0 * self.control1.y * mt2 * t
            + 3.0 * self.control2.y * mt * t2
            + self.end.y * t3;

        Point::new(x, y)
    }

    /// `count` evenly spaced samples including both endpoints.
    pub fn sample_points(&self, count: usize) -> Vec<Point> {
        let count = count.max(2);
        let last = (count - 1) as f64;
        (0..count)
            .map(|i| match i {
                0 => self.start,
                i if i == count - 1 => self.end,
                i => self.sample(i as f64 / last),
            })
            .collect()
    }
}

/// Builds flow curves from a source's right edge to a target's left edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeRouter {
    /// Sample points per edge, independent of edge length.
    pub samples: usize,
    /// Fraction of the horizontal gap used for the control point offset.
    pub curvature: f64,
}

impl Default for EdgeRouter {
    fn default() -> Self {
        Self {
            samples: 12,
            curvature: 0.5,
        }
    }
}

impl EdgeRouter {
    pub const MIN_SAMPLES: usize = 2;
    pub const MAX_SAMPLES: usize = 64;

    pub fn new(samples: usize, curvature: f64) -> Self {
        Self { samples, curvature }
    }

    pub fn route_edge(&self, source: &GeometryNode, target: &GeometryNode) -> CubicBezier {
        let start = source.right_center();
        let end = target.left_center();
        // Curves leave and enter horizontally.
        let offset = (end.x - start.x) * self.curvature.clamp(0.0, 1.0);
        CubicBezier {
            start,
            control1: Point::new(start.x + offset, start.y),
            control2: Point::new(end.x - offset, end.y),
            end,
        }
    }

    pub fn route_path(&self, source: &GeometryNode, target: &GeometryNode) -> Vec<Point> {
        self.route_edge(source, target)
            .sample_points(self.samples.clamp(Self::MIN_SAMPLES, Self::MAX_SAMPLES))
    }

    /// Routes flows between placed nodes and sizes them against the largest flow.
    /// Flows with an endpoint missing from `nodes` are skipped.
    pub fn build_edges(
        &self,
        nodes: &[GeometryNode],
        flows: Vec<MergedEdge>,
        widths: &EdgeWidthScale,
    ) -> Vec<GeometryEdge> {
        let by_id: HashMap<&NodeId, &GeometryNode> = nodes.iter().map(|n| (&n.id, n)).collect();
        let max_value = flows.iter().map(|f| f.value).fold(0.0, f64::max);

        flows
            .into_iter()
            .filter_map(|flow| {
                let source = by_id.get(&flow.source)?;
                let target = by_id.get(&flow.target)?;
                Some(GeometryEdge {
                    path: self.route_path(source, target),
                    width: widths.width_of(flow.value, max_value),
                    id: flow.id,
                    source_id: flow.source,
                    target_id: flow.target,
                    value: flow.value,
                    merged_count: flow.merged_count,
                })
            })
            .collect()
    }
}
