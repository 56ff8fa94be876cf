//! The contract both grading engines implement.

use std::fmt;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::{GradingError, Result};
use crate::models::{ColorGradingSettings, PerformanceMetrics, WorkingSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Gpu,
    Cpu,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Gpu => f.write_str("gpu"),
            EngineKind::Cpu => f.write_str("cpu"),
        }
    }
}

/// Applies a full grade to an RGBA8 frame.
///
/// Engines are synchronous; the service moves calls onto a blocking worker.
/// Both implementations run the same per-pixel pipeline, so switching engines
/// changes only speed, never the look.
pub trait ProcessingEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Grade `image` into a new buffer. `space` defaults to
    /// [`WorkingSpace::Display`].
    fn process_image(
        &self,
        image: &RgbaImage,
        settings: &ColorGradingSettings,
        space: Option<WorkingSpace>,
    ) -> Result<RgbaImage>;

    /// Whether this engine currently runs on the GPU. Turns false for good
    /// once the GPU engine has failed to build its pipeline.
    fn supports_gpu(&self) -> bool;

    /// Figures for the most recent frame.
    fn performance_metrics(&self) -> PerformanceMetrics;

    /// Release held resources. Safe to call more than once.
    fn dispose(&self);
}

pub(crate) fn validate_image(image: &RgbaImage) -> Result<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(GradingError::InvalidImage { width, height });
    }
    Ok(())
}

/// Bytes held by one input frame and its output while an engine works.
pub(crate) fn frame_bytes(image: &RgbaImage) -> u64 {
    image.as_raw().len() as u64 * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_is_rejected() {
        let empty = RgbaImage::new(0, 4);
        match validate_image(&empty) {
            Err(GradingError::InvalidImage { width, height }) => {
                assert_eq!((width, height), (0, 4));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(validate_image(&RgbaImage::new(1, 1)).is_ok());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EngineKind::Gpu).unwrap(), "\"gpu\"");
        assert_eq!(EngineKind::Cpu.to_string(), "cpu");
    }
}
