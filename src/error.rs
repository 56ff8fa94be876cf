//! Grading errors.

use thiserror::Error;

pub type Result<T, E = GradingError> = std::result::Result<T, E>;

/// Failures while reading a 3D LUT file.
#[derive(Debug, Error)]
pub enum LutParseError {
    #[error("unsupported LUT format: {0}")]
    UnsupportedFormat(String),
    #[error("missing LUT size")]
    MissingSize,
    #[error("invalid LUT size: {0}")]
    InvalidSize(String),
    #[error("LUT size mismatch: expected {expected} entries, got {got}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("line {line}: invalid number {token:?}")]
    InvalidNumber { line: usize, token: String },
    #[error("line {line}: expected 3 values, got {got}")]
    MalformedRow { line: usize, got: usize },
    #[error("1D LUTs are not supported")]
    OneDimensional,
    #[error("read LUT failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum GradingError {
    #[error(transparent)]
    LutParse(#[from] LutParseError),
    #[error("invalid image: {width}x{height} has no pixels")]
    InvalidImage { width: u32, height: u32 },
    #[error("GPU engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("processing failed: {0}")]
    Processing(String),
    #[error("invalid preset: {0}")]
    InvalidPreset(String),
    #[error("built-in preset cannot be modified: {0}")]
    BuiltinPreset(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl GradingError {
    pub fn is_engine_unavailable(&self) -> bool {
        matches!(self, Self::EngineUnavailable(_))
    }
}
