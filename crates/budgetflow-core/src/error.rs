use thiserror::Error;

/// Call-boundary parameter failures. Raised before any layout work begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("{name} must not be negative (got {value})")]
    NegativeKeepCount { name: &'static str, value: i64 },
    #[error("threshold must be a positive finite amount (got {0})")]
    InvalidThreshold(f64),
    #[error("zoom must be finite (got {0})")]
    InvalidZoom(f64),
    #[error("viewport must be finite with min <= max")]
    InvalidViewport,
    #[error("{name} must be a positive finite length (got {value})")]
    NonPositiveLength { name: &'static str, value: f64 },
    #[error("{name} must be a non-negative finite length (got {value})")]
    NegativeSpacing { name: &'static str, value: f64 },
    #[error("layer {layer} weight must be a non-negative finite factor (got {value})")]
    InvalidLayerWeight { layer: usize, value: f64 },
    #[error("top-N keep counts and a dynamic threshold are mutually exclusive layout modes")]
    MixedModes,
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone)]
pub enum EnumConversionError {
    #[error("Invalid layer index: {0}")]
    InvalidLayer(u8),
}
