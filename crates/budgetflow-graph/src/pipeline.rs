use crate::bundling::{FlowRef, FoldMap, GroupPartition, TailAggregator, merge_edges, other_label};
use crate::config::LayoutConfig;
use crate::geometry::{Bounds, GeometryNode, LayoutDocument, LayoutMetadata, sort_for_output};
use crate::graph::GraphModel;
use crate::layout::{LayerPacker, Layouter, OrderHints};
use crate::lod::{LayerThresholds, LevelOfDetail, ViewRequest};
use crate::observer::{LayoutObserver, Stage, timed};
use crate::params::{LayoutMode, LayoutParams};
use budgetflow_core::{GraphNode, LAYER_COUNT, NodeId, NodeType, ParameterError, RECIPIENT_LAYER};
use std::collections::BTreeSet;
use std::sync::Arc;

const UNOWNED_GROUP: &str = "unowned";

/// Grouping key for static aggregation: owner for sectioned layers, one
/// global group for recipients.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum FoldGroup {
    Owner(NodeId),
    Unowned,
    Global,
}

impl FoldGroup {
    fn aggregate_id(&self, node_type: NodeType) -> NodeId {
        match self {
            FoldGroup::Owner(owner) => NodeId::new(format!("{node_type}:other:{owner}")),
            FoldGroup::Unowned => NodeId::new(format!("{node_type}:other:{UNOWNED_GROUP}")),
            FoldGroup::Global => NodeId::new(format!("{node_type}:other")),
        }
    }

    fn owner(&self) -> Option<NodeId> {
        match self {
            FoldGroup::Owner(owner) => Some(owner.clone()),
            _ => None,
        }
    }
}

/// Turns an indexed graph into positioned geometry.
///
/// `base_layout` does the full pass (aggregate, size, pack, route);
/// `view` derives a zoom/viewport specific document from a base layout
/// without touching the graph again. Nothing here holds mutable state, so one
/// engine can serve concurrent callers.
#[derive(Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
    observer: Option<Arc<dyn LayoutObserver>>,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LayoutObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    fn observer(&self) -> Option<&dyn LayoutObserver> {
        self.observer.as_deref()
    }

    /// Base layout followed by the view for the same parameters.
    pub fn layout(
        &self,
        model: &GraphModel,
        params: &LayoutParams,
    ) -> Result<LayoutDocument, ParameterError> {
        let base = self.base_layout(model, params)?;
        self.view(&base, params)
    }

    pub fn base_layout(
        &self,
        model: &GraphModel,
        params: &LayoutParams,
    ) -> Result<LayoutDocument, ParameterError> {
        self.config.validate()?;
        params.validate()?;
        if let Some(observer) = self.observer() {
            if model.dropped_edge_count() > 0 {
                observer.on_edges_dropped(model.dropped_edge_count());
            }
            if model.unowned_count() > 0 {
                observer.on_unowned(model.unowned_count());
            }
        }

        let (mut nodes, folds) = timed(self.observer(), Stage::Aggregate, || {
            self.aggregate(model, &params.mode)
        });

        let size_threshold = match params.mode {
            LayoutMode::Dynamic { threshold } => threshold,
            LayoutMode::TopN { .. } => self.config.scale.threshold,
        };
        let scale = self.config.scale.with_threshold(size_threshold);
        timed(self.observer(), Stage::Size, || {
            for node in nodes.iter_mut() {
                node.height = scale.height_of(node.amount, node.is_aggregate);
            }
        });

        let flows = merge_edges(
            model
                .edges()
                .iter()
                .map(|e| FlowRef::new(&e.id, &e.source_id, &e.target_id, e.value)),
            &folds,
        );

        let packer = LayerPacker::new(self.config.packer_with(&params.overrides));
        let packed = timed(self.observer(), Stage::Pack, || {
            packer.execute(&mut nodes, &flows, &OrderHints::new())
        });
        let edges = timed(self.observer(), Stage::Route, || {
            self.config
                .router
                .build_edges(&nodes, flows, &self.config.edge_width)
        });
        sort_for_output(&mut nodes);

        let input = model.metadata();
        let metadata = LayoutMetadata {
            dropped_edge_count: model.dropped_edge_count(),
            unowned_count: model.unowned_count(),
            hidden_count: folds.len(),
            size_threshold,
            mode: params.mode,
            canvas: Bounds::enclosing(&nodes),
            sections: packed.sections,
            fiscal_year: input.fiscal_year,
            generated_at: input.generated_at.clone(),
            source_files: input.source_files.clone(),
            ..LayoutMetadata::default()
        };
        let mut doc = LayoutDocument {
            metadata,
            nodes,
            edges,
            bounds: Bounds::NOTHING,
        };
        doc.refresh_summary();
        Ok(doc)
    }

    /// Applies level of detail and viewport culling to a base layout.
    /// Top-N layouts are only culled; dynamic layouts are reclassified first.
    pub fn view(
        &self,
        base: &LayoutDocument,
        params: &LayoutParams,
    ) -> Result<LayoutDocument, ParameterError> {
        self.config.validate()?;
        params.validate()?;
        let thresholds = match params.mode {
            LayoutMode::Dynamic { threshold } => Some(LayerThresholds::from_weights(
                threshold,
                &self.config.lod.layer_weights,
            )),
            LayoutMode::TopN { .. } => None,
        };
        let lod = LevelOfDetail {
            packer: LayerPacker::new(self.config.packer_with(&params.overrides)),
            widths: self.config.edge_width,
            router: self.config.router,
            scale: self.config.scale,
            viewport_padding: self.config.lod.viewport_padding,
            observer: self.observer(),
        };
        Ok(lod.view(
            base,
            &ViewRequest {
                thresholds,
                zoom: params.zoom,
                viewport: params.viewport,
            },
        ))
    }

    fn aggregate(&self, model: &GraphModel, mode: &LayoutMode) -> (Vec<GeometryNode>, FoldMap) {
        let mut nodes = Vec::with_capacity(model.node_count());
        let mut folds = FoldMap::new();

        for layer in 0..LAYER_COUNT {
            let group_of = |node: &GraphNode| -> FoldGroup {
                if layer == RECIPIENT_LAYER {
                    return FoldGroup::Global;
                }
                match model.node_map.get(&node.id).and_then(|&i| model.owner_id(i)) {
                    Some(owner) => FoldGroup::Owner(owner.clone()),
                    None => FoldGroup::Unowned,
                }
            };
            let partitions = TailAggregator::new(mode.fold_rule(layer)).partition(
                model.layer(layer).iter().map(|&i| model.node(i)),
                group_of,
            );

            let (mut kept, mut folded) = (0usize, 0usize);
            for partition in partitions {
                kept += partition.kept.len();
                folded += partition.folded.len();
                for node in &partition.kept {
                    nodes.push(self.geometry_for(model, node));
                }
                if let Some(aggregate) = self.aggregate_node(model, layer, &partition) {
                    folds.insert_all(&aggregate.aggregated_ids, &aggregate.id);
                    nodes.push(aggregate);
                }
            }
            if let Some(observer) = self.observer() {
                observer.on_layer_aggregated(layer, kept, folded);
            }
        }
        (nodes, folds)
    }

    fn geometry_for(&self, model: &GraphModel, node: &GraphNode) -> GeometryNode {
        match model.node_map.get(&node.id) {
            Some(&idx) => GeometryNode::from_graph_node(
                node,
                model.owner_id(idx).cloned(),
                model.source_owners(idx).to_vec(),
            ),
            None => GeometryNode::from_graph_node(node, None, Vec::new()),
        }
    }

    fn aggregate_node(
        &self,
        model: &GraphModel,
        layer: usize,
        partition: &GroupPartition<'_, FoldGroup, GraphNode>,
    ) -> Option<GeometryNode> {
        if partition.folded.is_empty() {
            return None;
        }
        let node_type = NodeType::for_layer(layer)?;
        let source_owners: BTreeSet<NodeId> = partition
            .folded
            .iter()
            .filter_map(|n| model.node_map.get(&n.id))
            .flat_map(|&idx| model.source_owners(idx).iter().cloned())
            .collect();

        Some(GeometryNode {
            id: partition.key.aggregate_id(node_type),
            layer_index: layer as u8,
            node_type,
            display_name: other_label(partition.folded.len()),
            amount: partition.folded_amount(),
            owner_key: partition.key.owner(),
            source_owners: source_owners.into_iter().collect(),
            attributes: Default::default(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            is_aggregate: true,
            aggregated_count: partition.folded.len(),
            aggregated_ids: partition.folded_ids(),
        })
    }
}
