use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const LAYOUT_TARGET: &str = "budgetflow::layout";

/// Pipeline stages reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Aggregate,
    Size,
    Pack,
    Route,
    Reclassify,
    Cull,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => write!(f, "aggregate"),
            Self::Size => write!(f, "size"),
            Self::Pack => write!(f, "pack"),
            Self::Route => write!(f, "route"),
            Self::Reclassify => write!(f, "reclassify"),
            Self::Cull => write!(f, "cull"),
        }
    }
}

/// Receives diagnostics from the layout engine. Every hook defaults to a no-op.
pub trait LayoutObserver: Send + Sync {
    fn on_edges_dropped(&self, _count: usize) {}
    fn on_unowned(&self, _count: usize) {}
    fn on_layer_aggregated(&self, _layer: usize, _kept: usize, _folded: usize) {}
    fn on_stage(&self, _stage: Stage, _elapsed: Duration) {}
    fn on_culled(&self, _nodes: usize, _edges: usize) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LayoutObserver for NoopObserver {}

/// Forwards diagnostics to `tracing` under the `budgetflow::layout` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LayoutObserver for TracingObserver {
    fn on_edges_dropped(&self, count: usize) {
        info!(target: LAYOUT_TARGET, dropped_edges = count, "edges dropped at index time");
    }

    fn on_unowned(&self, count: usize) {
        info!(target: LAYOUT_TARGET, unowned = count, "nodes without an owning ministry");
    }

    fn on_layer_aggregated(&self, layer: usize, kept: usize, folded: usize) {
        debug!(target: LAYOUT_TARGET, layer, kept, folded, "layer aggregated");
    }

    fn on_stage(&self, stage: Stage, elapsed: Duration) {
        debug!(
            target: LAYOUT_TARGET,
            stage = %stage,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "stage finished"
        );
    }

    fn on_culled(&self, nodes: usize, edges: usize) {
        debug!(target: LAYOUT_TARGET, nodes, edges, "culled outside viewport");
    }
}

/// Runs `work` and reports its wall time for `stage`.
pub(crate) fn timed<T>(
    observer: Option<&dyn LayoutObserver>,
    stage: Stage,
    work: impl FnOnce() -> T,
) -> T {
    let start = Instant::now();
    let out = work();
    if let Some(observer) = observer {
        observer.on_stage(stage, start.elapsed());
    }
    out
}
