use crate::geometry::{Bounds, LayoutDocument};
use crate::graph::GraphModel;
use crate::params::{LayoutMode, LayoutParams, PackerOverrides};
use crate::pipeline::LayoutEngine;
use budgetflow_core::ParameterError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Documents kept per cache; the oldest entry is evicted first.
    pub capacity: usize,
    /// Zoom values are floored to multiples of this step.
    pub zoom_step: f64,
    /// Viewports are expanded outward to this grid.
    pub viewport_step: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            zoom_step: 0.25,
            viewport_step: 256.0,
        }
    }
}

impl CacheConfig {
    /// Parameters rounded onto the cache grid. Views are computed from these,
    /// so every request in a bucket gets the same document.
    pub fn snap(&self, params: &LayoutParams) -> LayoutParams {
        let zoom = if self.zoom_step > 0.0 {
            (params.zoom / self.zoom_step).floor() * self.zoom_step
        } else {
            params.zoom
        };
        let viewport = params.viewport.map(|v| {
            if self.viewport_step > 0.0 {
                let s = self.viewport_step;
                Bounds::new(
                    (v.min_x / s).floor() * s,
                    (v.min_y / s).floor() * s,
                    (v.max_x / s).ceil() * s,
                    (v.max_y / s).ceil() * s,
                )
            } else {
                v
            }
        });
        LayoutParams {
            zoom,
            viewport,
            ..*params
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ModeKey {
    TopN(Option<usize>, Option<usize>),
    Dynamic(u64),
}

/// Hashable identity of a (graph, parameters) pair. Floats are keyed by their
/// bit patterns, so callers should snap parameters first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    fingerprint: u64,
    mode: ModeKey,
    zoom: u64,
    viewport: Option<[u64; 4]>,
    knobs: [Option<u64>; 3],
}

impl ViewKey {
    pub fn new(fingerprint: u64, params: &LayoutParams) -> Self {
        let mode = match params.mode {
            LayoutMode::TopN {
                top_projects,
                top_recipients,
            } => ModeKey::TopN(top_projects, top_recipients),
            LayoutMode::Dynamic { threshold } => ModeKey::Dynamic(threshold.to_bits()),
        };
        Self {
            fingerprint,
            mode,
            zoom: params.zoom.to_bits(),
            viewport: params
                .viewport
                .map(|v| [v.min_x, v.min_y, v.max_x, v.max_y].map(f64::to_bits)),
            knobs: knob_bits(&params.overrides),
        }
    }

    /// Key of the base layout the view is derived from: zoom and viewport
    /// do not affect it.
    pub fn base(fingerprint: u64, params: &LayoutParams) -> Self {
        Self::new(
            fingerprint,
            &LayoutParams {
                zoom: 0.0,
                viewport: None,
                ..*params
            },
        )
    }
}

fn knob_bits(overrides: &PackerOverrides) -> [Option<u64>; 3] {
    [
        overrides.node_width,
        overrides.node_spacing_x,
        overrides.node_spacing_y,
    ]
    .map(|v| v.map(f64::to_bits))
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ViewKey, Arc<LayoutDocument>>,
    order: VecDeque<ViewKey>,
    hits: u64,
    misses: u64,
}

/// Bounded first-in first-out memo of layout documents.
pub struct LayoutCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl LayoutCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn get(&self, key: &ViewKey) -> Option<Arc<LayoutDocument>> {
        let mut state = self.state.lock();
        let found = state.entries.get(key).cloned();
        if found.is_some() {
            state.hits += 1;
        }
        found
    }

    pub fn insert(&self, key: ViewKey, doc: Arc<LayoutDocument>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        if state.entries.insert(key.clone(), doc).is_some() {
            return;
        }
        state.order.push_back(key);
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }
    }

    /// Returns the cached document or computes and stores it. The lock is not
    /// held while `compute` runs, so concurrent misses on one key may both compute.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: ViewKey,
        compute: impl FnOnce() -> Result<LayoutDocument, E>,
    ) -> Result<Arc<LayoutDocument>, E> {
        if let Some(doc) = self.get(&key) {
            return Ok(doc);
        }
        self.state.lock().misses += 1;
        let doc = Arc::new(compute()?);
        self.insert(key, doc.clone());
        Ok(doc)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.hits, state.misses)
    }
}

/// One graph plus memoized base layouts and views for interactive use.
pub struct LayoutSession {
    model: Arc<GraphModel>,
    engine: LayoutEngine,
    bases: LayoutCache,
    views: LayoutCache,
}

impl LayoutSession {
    pub fn new(model: Arc<GraphModel>, engine: LayoutEngine) -> Self {
        let capacity = engine.config().cache.capacity;
        Self {
            model,
            engine,
            bases: LayoutCache::new(capacity),
            views: LayoutCache::new(capacity),
        }
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn engine(&self) -> &LayoutEngine {
        &self.engine
    }

    pub fn base(&self, params: &LayoutParams) -> Result<Arc<LayoutDocument>, ParameterError> {
        params.validate()?;
        let key = ViewKey::base(self.model.fingerprint(), params);
        self.bases
            .get_or_try_insert_with(key, || self.engine.base_layout(&self.model, params))
    }

    /// View for `params` snapped onto the cache grid.
    pub fn view(&self, params: &LayoutParams) -> Result<Arc<LayoutDocument>, ParameterError> {
        params.validate()?;
        let snapped = self.engine.config().cache.snap(params);
        let key = ViewKey::new(self.model.fingerprint(), &snapped);
        self.views.get_or_try_insert_with(key, || {
            let base = self.base(&snapped)?;
            self.engine.view(&base, &snapped)
        })
    }

    pub fn view_cache(&self) -> &LayoutCache {
        &self.views
    }

    pub fn base_cache(&self) -> &LayoutCache {
        &self.bases
    }
}
