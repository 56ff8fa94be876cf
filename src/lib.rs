//! Still-image colour grading.
//!
//! [`GradingService`] owns the current [`ColorGradingSettings`], their undo
//! history and the preset library, and grades RGBA8 frames on a GPU or CPU
//! [`ProcessingEngine`]. LUT files are read by [`lut::load_lut`].

pub mod config;
pub mod cpu;
pub mod engine;
pub mod error;
pub mod events;
pub mod gpu;
pub mod history;
pub mod image_io;
mod kernel;
pub mod lut;
pub mod models;
pub mod monitor;
pub mod paths;
pub mod preset_io;
pub mod presets;
pub mod service;

pub use config::{GradingConfig, MonitorConfig};
pub use cpu::CpuEngine;
pub use engine::{EngineKind, ProcessingEngine};
pub use error::{GradingError, LutParseError, Result};
pub use events::{GradingEvent, SubscriptionId};
pub use gpu::{GpuEngine, GpuLimits};
pub use lut::{generate_preview, load_lut, load_lut_file, validate_lut_file, LutData, LutFormat};
pub use models::{
    ColorGradingPreset, ColorGradingSettings, ColorWheelSettings, ColorWheels, CurvePoint,
    LutSettings, PerformanceMetrics, PresetCategory, SettingsPatch, ToneCurve, ToneMapAlgorithm,
    ToneMappingSettings, VignetteSettings, WorkingSpace,
};
pub use monitor::{PerformanceGrade, PerformanceMonitor, PerformanceStats};
pub use service::{GradingService, ServiceStatus};
