use serde::{Deserialize, Serialize};

/// Maps a node amount to a pixel height.
///
/// Linear above `threshold`, anchored so that one threshold's worth of amount is
/// always `unit_height` pixels. Anything below the threshold (including zero and
/// negative amounts) gets the fixed floor height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmountScale {
    pub threshold: f64,
    pub unit_height: f64,
    pub min_height: f64,
    /// Floor for aggregate nodes, kept larger so they stay clickable.
    pub min_aggregate_height: f64,
}

impl Default for AmountScale {
    fn default() -> Self {
        Self {
            threshold: 1e9,
            unit_height: 10.0,
            min_height: 1.0,
            min_aggregate_height: 4.0,
        }
    }
}

impl AmountScale {
    pub fn with_threshold(self, threshold: f64) -> Self {
        Self { threshold, ..self }
    }

    pub fn height_of(&self, amount: f64, is_aggregate: bool) -> f64 {
        let floor = if is_aggregate {
            self.min_aggregate_height.max(self.min_height)
        } else {
            self.min_height
        };
        if !(amount > 0.0) || !(self.threshold > 0.0) || amount < self.threshold {
            return floor;
        }
        let height = amount / self.threshold * self.unit_height;
        if height.is_finite() {
            height.max(floor)
        } else {
            floor
        }
    }
}

/// Maps an edge value to a stroke width on a log10 scale relative to the largest value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeWidthScale {
    pub unit_width: f64,
    pub min_width: f64,
}

impl Default for EdgeWidthScale {
    fn default() -> Self {
        Self {
            unit_width: 12.0,
            min_width: 0.5,
        }
    }
}

impl EdgeWidthScale {
    pub fn width_of(&self, value: f64, max_value: f64) -> f64 {
        if !(value > 0.0) || !(max_value > 0.0) {
            return self.min_width;
        }
        let width = (value + 1.0).log10() / (max_value + 1.0).log10() * self.unit_width;
        if width.is_finite() {
            width.max(self.min_width)
        } else {
            self.min_width
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heights_anchor_at_threshold() {
        let scale = AmountScale {
            threshold: 1e12,
            unit_height: 10.0,
            min_height: 1.0,
            min_aggregate_height: 4.0,
        };
        let heights: Vec<f64> = [5e12, 3e12, 1e11]
            .iter()
            .map(|&a| scale.height_of(a, false))
            .collect();
        assert!((heights[0] - 50.0).abs() < 1e-9);
        assert!((heights[1] - 30.0).abs() < 1e-9);
        assert_eq!(heights[2], 1.0);
    }

    #[test]
    fn test_degenerate_amounts_get_floor_height() {
        let scale = AmountScale::default();
        assert_eq!(scale.height_of(0.0, false), scale.min_height);
        assert_eq!(scale.height_of(-5.0, false), scale.min_height);
        assert_eq!(scale.height_of(0.0, true), scale.min_aggregate_height);
        assert!(scale.height_of(1.0, true) > scale.height_of(1.0, false));
    }

    #[test]
    fn test_height_preserves_order() {
        let scale = AmountScale::default();
        let mut last = 0.0;
        for amount in [1e9, 2e9, 5e10, 3e12, 4e13] {
            let h = scale.height_of(amount, false);
            assert!(h >= last);
            last = h;
        }
    }

    #[test]
    fn test_edge_width_is_logarithmic() {
        let scale = EdgeWidthScale {
            unit_width: 10.0,
            min_width: 0.5,
        };
        assert!((scale.width_of(1e12, 1e12) - 10.0).abs() < 1e-9);
        let mid = scale.width_of(1e6, 1e12);
        assert!((mid - 5.0).abs() < 0.01, "got {mid}");
        assert_eq!(scale.width_of(0.0, 1e12), 0.5);
        assert_eq!(scale.width_of(10.0, 0.0), 0.5);
    }
}
