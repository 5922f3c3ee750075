use crate::bundling::FoldRule;
use crate::geometry::Bounds;
use budgetflow_core::{ParameterError, RECIPIENT_LAYER};
use serde::{Deserialize, Serialize};

/// Project layer index; the only sectioned layer that top-N folding touches.
const PROJECT_LAYER: usize = 3;

/// Selects how the base layout decides which nodes stay individually visible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LayoutMode {
    /// Keep the largest projects per ministry and the largest recipients overall.
    /// `None` keeps everything on that layer.
    #[serde(rename_all = "camelCase")]
    TopN {
        top_projects: Option<usize>,
        top_recipients: Option<usize>,
    },
    /// Amount-threshold reclassification driven by zoom.
    Dynamic { threshold: f64 },
}

impl Default for LayoutMode {
    fn default() -> Self {
        LayoutMode::TopN {
            top_projects: None,
            top_recipients: None,
        }
    }
}

impl LayoutMode {
    /// Rule the base layout applies to one layer. Dynamic mode folds nothing up
    /// front; its reclassification happens per view.
    pub fn fold_rule(&self, layer: usize) -> FoldRule {
        match *self {
            LayoutMode::TopN {
                top_projects: Some(n),
                ..
            } if layer == PROJECT_LAYER => FoldRule::KeepTop(n),
            LayoutMode::TopN {
                top_recipients: Some(n),
                ..
            } if layer == RECIPIENT_LAYER => FoldRule::KeepTop(n),
            _ => FoldRule::KeepAll,
        }
    }
}

/// Unvalidated parameters as they arrive from a caller or a JSON request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutRequest {
    pub top_projects: Option<i64>,
    pub top_recipients: Option<i64>,
    pub threshold: Option<f64>,
    pub zoom: Option<f64>,
    #[serde(alias = "viewportBounds")]
    pub viewport: Option<Bounds>,
    pub node_width: Option<f64>,
    pub node_spacing_x: Option<f64>,
    pub node_spacing_y: Option<f64>,
}

/// Per-call packer knob overrides. `None` falls back to the configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackerOverrides {
    pub node_width: Option<f64>,
    pub node_spacing_x: Option<f64>,
    pub node_spacing_y: Option<f64>,
}

/// Validated layout parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutParams {
    pub mode: LayoutMode,
    pub zoom: f64,
    pub viewport: Option<Bounds>,
    pub overrides: PackerOverrides,
}

impl LayoutParams {
    pub fn top_n(top_projects: Option<usize>, top_recipients: Option<usize>) -> Self {
        Self {
            mode: LayoutMode::TopN {
                top_projects,
                top_recipients,
            },
            ..Self::default()
        }
    }

    pub fn dynamic(threshold: f64) -> Self {
        Self {
            mode: LayoutMode::Dynamic { threshold },
            ..Self::default()
        }
    }

    pub fn with_zoom(self, zoom: f64) -> Self {
        Self { zoom, ..self }
    }

    pub fn with_viewport(self, viewport: Bounds) -> Self {
        Self {
            viewport: Some(viewport),
            ..self
        }
    }

    pub fn with_overrides(self, overrides: PackerOverrides) -> Self {
        Self { overrides, ..self }
    }

    /// Checks values that the builder constructors accept unchecked.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if let LayoutMode::Dynamic { threshold } = self.mode {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(ParameterError::InvalidThreshold(threshold));
            }
        }
        if !self.zoom.is_finite() {
            return Err(ParameterError::InvalidZoom(self.zoom));
        }
        if self.viewport.is_some_and(|viewport| !viewport.is_valid()) {
            return Err(ParameterError::InvalidViewport);
        }
        if let Some(width) = self.overrides.node_width {
            check_length("nodeWidth", width)?;
        }
        for (name, value) in [
            ("nodeSpacingX", self.overrides.node_spacing_x),
            ("nodeSpacingY", self.overrides.node_spacing_y),
        ] {
            if let Some(value) = value {
                check_spacing(name, value)?;
            }
        }
        Ok(())
    }
}

/// A size that must stay visible: finite and strictly positive.
pub(crate) fn check_length(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NonPositiveLength { name, value })
    }
}

/// A gap between primitives: finite, zero allowed.
pub(crate) fn check_spacing(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NegativeSpacing { name, value })
    }
}

fn keep_count(name: &'static str, value: Option<i64>) -> Result<Option<usize>, ParameterError> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(ParameterError::NegativeKeepCount { name, value: v }),
        Some(v) => Ok(Some(usize::try_from(v).unwrap_or(usize::MAX))),
    }
}

impl TryFrom<LayoutRequest> for LayoutParams {
    type Error = ParameterError;

    fn try_from(request: LayoutRequest) -> Result<Self, Self::Error> {
        let top_projects = keep_count("topProjects", request.top_projects)?;
        let top_recipients = keep_count("topRecipients", request.top_recipients)?;

        let mode = match request.threshold {
            Some(_) if top_projects.is_some() || top_recipients.is_some() => {
                return Err(ParameterError::MixedModes);
            }
            Some(threshold) => LayoutMode::Dynamic { threshold },
            None => LayoutMode::TopN {
                top_projects,
                top_recipients,
            },
        };

        let params = LayoutParams {
            mode,
            zoom: request.zoom.unwrap_or(0.0),
            viewport: request.viewport,
            overrides: PackerOverrides {
                node_width: request.node_width,
                node_spacing_x: request.node_spacing_x,
                node_spacing_y: request.node_spacing_y,
            },
        };
        params.validate()?;
        Ok(params)
    }
}
