use crate::bundling::MergedEdge;
use crate::geometry::GeometryNode;
use budgetflow_core::{NodeId, RECIPIENT_LAYER};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

pub trait Layouter {
    /// Assigns `x`, `y` and `width` to every node. Heights must already be set.
    fn execute(
        &self,
        nodes: &mut [GeometryNode],
        flows: &[MergedEdge],
        hints: &OrderHints,
    ) -> PackSummary;
}

/// How layers 0..=3 are split into vertical bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectioningPolicy {
    /// One global stack per layer.
    None,
    /// One contiguous band per owning ministry, unowned nodes in a trailing band.
    #[default]
    ByOwner,
}

/// Placement of a layer's stack inside a taller section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionAlignment {
    #[default]
    Top,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "owner", rename_all = "camelCase")]
pub enum SectionKey {
    Owner(NodeId),
    Unowned,
    /// The whole layer when sectioning is disabled.
    Global,
}

impl SectionKey {
    fn for_node(node: &GeometryNode, policy: SectioningPolicy) -> Self {
        match (policy, &node.owner_key) {
            (SectioningPolicy::None, _) => SectionKey::Global,
            (SectioningPolicy::ByOwner, Some(owner)) => SectionKey::Owner(owner.clone()),
            (SectioningPolicy::ByOwner, None) => SectionKey::Unowned,
        }
    }
}

/// Vertical extent of one section, shared by every sectioned layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBand {
    pub key: SectionKey,
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackSummary {
    /// Bands in top-to-bottom order.
    pub sections: Vec<SectionBand>,
}

/// Prior vertical positions used to keep an existing order when re-packing.
/// Empty hints mean "order by amount".
#[derive(Debug, Clone, Default)]
pub struct OrderHints {
    node_y: HashMap<NodeId, f64>,
}

impl OrderHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, y: f64) {
        self.node_y.insert(id, y);
    }

    pub fn get(&self, id: &NodeId) -> Option<f64> {
        self.node_y.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.node_y.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackerConfig {
    pub node_width: f64,
    pub node_spacing_x: f64,
    /// Vertical padding between stacked nodes. Zero lets nodes touch.
    pub node_spacing_y: f64,
    pub section_padding: f64,
    pub alignment: SectionAlignment,
    pub sectioning: SectioningPolicy,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            node_width: 50.0,
            node_spacing_x: 200.0,
            node_spacing_y: 2.0,
            section_padding: 24.0,
            alignment: SectionAlignment::Top,
            sectioning: SectioningPolicy::ByOwner,
        }
    }
}

/// Stacks nodes vertically per layer (and per section), left to right by layer.
///
/// Sectioned layers sort by amount descending, or by hint when hints are given,
/// with aggregates always last. The recipient layer is never sectioned: it is
/// ordered by the amount-weighted mean `y` of its inbound flows' sources, so the
/// layers before it are placed first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerPacker {
    pub config: PackerConfig,
}

impl LayerPacker {
    pub fn new(config: PackerConfig) -> Self {
        Self { config }
    }

    /// Center x of a layer's column.
    pub fn layer_x(&self, layer: usize) -> f64 {
        layer as f64 * (self.config.node_width + self.config.node_spacing_x)
            + self.config.node_width / 2.0
    }

    fn sectioned_order(
        nodes: &[GeometryNode],
        hints: &OrderHints,
        a: usize,
        b: usize,
    ) -> Ordering {
        let (na, nb) = (&nodes[a], &nodes[b]);
        na.is_aggregate
            .cmp(&nb.is_aggregate)
            .then_with(|| {
                if hints.is_empty() {
                    return Ordering::Equal;
                }
                let ha = hints.get(&na.id).unwrap_or(f64::INFINITY);
                let hb = hints.get(&nb.id).unwrap_or(f64::INFINITY);
                ha.total_cmp(&hb)
            })
            .then_with(|| nb.amount.total_cmp(&na.amount))
            .then_with(|| na.id.cmp(&nb.id))
    }

    fn stack_height(&self, nodes: &[GeometryNode], members: &[usize]) -> f64 {
        if members.is_empty() {
            return 0.0;
        }
        let heights: f64 = members.iter().map(|&i| nodes[i].height).sum();
        heights + self.config.node_spacing_y * (members.len() - 1) as f64
    }

    fn place_stack(&self, nodes: &mut [GeometryNode], members: &[usize], top: f64) {
        let mut offset = 0.0;
        for &i in members {
            let height = nodes[i].height;
            nodes[i].y = top + offset + height / 2.0;
            offset += height + self.config.node_spacing_y;
        }
    }

    fn section_order_key(
        nodes: &[GeometryNode],
        layers: &[Vec<usize>; RECIPIENT_LAYER],
        hints: &OrderHints,
    ) -> f64 {
        if !hints.is_empty() {
            return layers
                .iter()
                .flatten()
                .filter_map(|&i| hints.get(&nodes[i].id))
                .fold(f64::INFINITY, f64::min);
        }
        // Heaviest band first: weight of the lowest populated layer.
        let weight: f64 = layers
            .iter()
            .find(|members| !members.is_empty())
            .map(|members| members.iter().map(|&i| nodes[i].amount.max(0.0)).sum())
            .unwrap_or(0.0);
        -weight
    }

    fn pack_sections(&self, nodes: &mut [GeometryNode], hints: &OrderHints) -> Vec<SectionBand> {
        let mut sections: BTreeMap<SectionKey, [Vec<usize>; RECIPIENT_LAYER]> = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            let layer = node.layer();
            if layer >= RECIPIENT_LAYER {
                continue;
            }
            sections
                .entry(SectionKey::for_node(node, self.config.sectioning))
                .or_default()[layer]
                .push(i);
        }

        let mut ordered: Vec<(SectionKey, [Vec<usize>; RECIPIENT_LAYER], f64)> = sections
            .into_iter()
            .map(|(key, layers)| {
                let order_key = Self::section_order_key(nodes, &layers, hints);
                (key, layers, order_key)
            })
            .collect();
        ordered.sort_by(|(ka, _, oa), (kb, _, ob)| {
            let a_unowned = matches!(ka, SectionKey::Unowned);
            let b_unowned = matches!(kb, SectionKey::Unowned);
            a_unowned
                .cmp(&b_unowned)
                .then_with(|| oa.total_cmp(ob))
                .then_with(|| ka.cmp(kb))
        });

        let mut bands = Vec::with_capacity(ordered.len());
        let mut top = 0.0;
        for (index, (key, mut layers, _)) in ordered.into_iter().enumerate() {
            if index > 0 {
                top += self.config.section_padding;
            }
            let mut stack_heights = [0.0; RECIPIENT_LAYER];
            for (layer, members) in layers.iter_mut().enumerate() {
                members.sort_by(|&a, &b| Self::sectioned_order(nodes, hints, a, b));
                stack_heights[layer] = self.stack_height(nodes, members);
            }
            let section_height = stack_heights.iter().copied().fold(0.0, f64::max);

            for (layer, members) in layers.iter().enumerate() {
                let start = match self.config.alignment {
                    SectionAlignment::Top => top,
                    SectionAlignment::Center => {
                        top + (section_height - stack_heights[layer]) / 2.0
                    }
                };
                self.place_stack(nodes, members, start);
            }

            bands.push(SectionBand {
                key,
                top,
                height: section_height,
            });
            top += section_height;
        }
        bands
    }

    fn pack_recipients(&self, nodes: &mut [GeometryNode], flows: &[MergedEdge]) {
        let positions: HashMap<&NodeId, (usize, f64)> = nodes
            .iter()
            .map(|n| (&n.id, (n.layer(), n.y)))
            .collect();

        // (weighted sum, weight, plain sum, count) per recipient.
        let mut inflow: HashMap<&NodeId, (f64, f64, f64, usize)> = HashMap::new();
        for flow in flows {
            let Some(&(layer, y)) = positions.get(&flow.source) else {
                continue;
            };
            if layer >= RECIPIENT_LAYER {
                continue;
            }
            let entry = inflow.entry(&flow.target).or_insert((0.0, 0.0, 0.0, 0));
            let weight = flow.value.max(0.0);
            entry.0 += weight * y;
            entry.1 += weight;
            entry.2 += y;
            entry.3 += 1;
        }

        let mut members: Vec<(usize, Option<f64>)> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.layer() == RECIPIENT_LAYER)
            .map(|(i, n)| {
                let mean = inflow.get(&n.id).map(|&(weighted, weight, plain, count)| {
                    if weight > 0.0 {
                        weighted / weight
                    } else {
                        plain / count as f64
                    }
                });
                (i, mean)
            })
            .collect();

        members.sort_by(|&(a, ma), &(b, mb)| {
            let (na, nb) = (&nodes[a], &nodes[b]);
            ma.unwrap_or(f64::INFINITY)
                .total_cmp(&mb.unwrap_or(f64::INFINITY))
                .then_with(|| nb.amount.total_cmp(&na.amount))
                .then_with(|| na.id.cmp(&nb.id))
        });

        let order: Vec<usize> = members.into_iter().map(|(i, _)| i).collect();
        self.place_stack(nodes, &order, 0.0);
    }
}

impl Layouter for LayerPacker {
    fn execute(
        &self,
        nodes: &mut [GeometryNode],
        flows: &[MergedEdge],
        hints: &OrderHints,
    ) -> PackSummary {
        for node in nodes.iter_mut() {
            node.x = self.layer_x(node.layer());
            node.width = self.config.node_width;
        }

        let sections = self.pack_sections(nodes, hints);
        self.pack_recipients(nodes, flows);
        PackSummary { sections }
    }
}
