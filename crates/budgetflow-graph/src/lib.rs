pub mod bundling;
pub mod cache;
pub mod config;
pub mod edge_router;
pub mod geometry;
pub mod graph;
pub mod layout;
pub mod lod;
pub mod observer;
pub mod params;
pub mod pipeline;
pub mod scale;

pub use bundling::{FoldMap, FoldRule, MergedEdge, TailAggregator, merge_edges};
pub use cache::{CacheConfig, LayoutCache, LayoutSession, ViewKey};
pub use config::LayoutConfig;
pub use edge_router::{CubicBezier, EdgeRouter};
pub use geometry::{
    Bounds, GeometryEdge, GeometryNode, LayoutDocument, LayoutMetadata, Point, sort_for_output,
};
pub use graph::{EdgeIndex, GraphModel, NodeIndex, Owner};
pub use layout::{
    LayerPacker, Layouter, OrderHints, PackSummary, PackerConfig, SectionAlignment, SectionBand,
    SectionKey, SectioningPolicy,
};
pub use lod::{LayerThresholds, LevelOfDetail, LodConfig, ViewRequest};
pub use observer::{LayoutObserver, NoopObserver, Stage, TracingObserver};
pub use params::{LayoutMode, LayoutParams, LayoutRequest, PackerOverrides};
pub use pipeline::LayoutEngine;
pub use scale::{AmountScale, EdgeWidthScale};
