use crate::cache::CacheConfig;
use crate::edge_router::EdgeRouter;
use crate::layout::PackerConfig;
use crate::lod::LodConfig;
use crate::params::{PackerOverrides, check_length, check_spacing};
use crate::scale::{AmountScale, EdgeWidthScale};
use anyhow::{Context, Result};
use budgetflow_core::ParameterError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine-wide settings. Every field has a default, so a partial JSON file
/// only needs the values it changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub packer: PackerConfig,
    pub scale: AmountScale,
    pub edge_width: EdgeWidthScale,
    pub router: EdgeRouter,
    pub lod: LodConfig,
    pub cache: CacheConfig,
}

impl LayoutConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout config {}", path.display()))?;
        let config: LayoutConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse layout config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid layout config {}", path.display()))?;
        Ok(config)
    }

    /// Rejects knobs that would let stacked nodes overlap or shrink a
    /// primitive to nothing.
    pub fn validate(&self) -> Result<(), ParameterError> {
        check_length("packer.nodeWidth", self.packer.node_width)?;
        for (name, value) in [
            ("packer.nodeSpacingX", self.packer.node_spacing_x),
            ("packer.nodeSpacingY", self.packer.node_spacing_y),
            ("packer.sectionPadding", self.packer.section_padding),
            ("lod.viewportPadding", self.lod.viewport_padding),
        ] {
            check_spacing(name, value)?;
        }

        let threshold = self.scale.threshold;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(ParameterError::InvalidThreshold(threshold));
        }
        for (name, value) in [
            ("scale.unitHeight", self.scale.unit_height),
            ("scale.minHeight", self.scale.min_height),
            ("scale.minAggregateHeight", self.scale.min_aggregate_height),
            ("edgeWidth.unitWidth", self.edge_width.unit_width),
            ("edgeWidth.minWidth", self.edge_width.min_width),
        ] {
            check_length(name, value)?;
        }

        for (layer, &value) in self.lod.layer_weights.iter().enumerate() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ParameterError::InvalidLayerWeight { layer, value });
            }
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Packer settings for one call with its knob overrides applied.
    pub fn packer_with(&self, overrides: &PackerOverrides) -> PackerConfig {
        PackerConfig {
            node_width: overrides.node_width.unwrap_or(self.packer.node_width),
            node_spacing_x: overrides.node_spacing_x.unwrap_or(self.packer.node_spacing_x),
            node_spacing_y: overrides.node_spacing_y.unwrap_or(self.packer.node_spacing_y),
            ..self.packer
        }
    }
}
