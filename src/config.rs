use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GradingError, Result};
use crate::gpu::GpuLimits;
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::paths::default_presets_dir;

pub const ENV_FORCE_CPU: &str = "LUMAGRADE_FORCE_CPU";
pub const ENV_PRESET_DIR: &str = "LUMAGRADE_PRESET_DIR";
pub const ENV_HISTORY_LIMIT: &str = "LUMAGRADE_HISTORY_LIMIT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub target_fps: f64,
    /// Average FPS below this counts as throttled.
    pub throttle_fps: f64,
    /// Frames in the rolling average.
    pub window_size: usize,
    pub memory_budget_mb: f64,
    /// Sample process memory every N frames.
    pub memory_sample_interval: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            throttle_fps: 30.0,
            window_size: 60,
            memory_budget_mb: 1024.0,
            memory_sample_interval: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingConfig {
    pub history_limit: usize,
    pub prefer_gpu: bool,
    /// Where user presets live; `None` keeps them in memory.
    pub preset_dir: Option<PathBuf>,
    pub gpu_max_dimension: u32,
    pub gpu_max_pixels: u64,
    pub preview_max_dimension: u32,
    pub monitor: MonitorConfig,
}

impl Default for GradingConfig {
    fn default() -> Self {
        let gpu = GpuLimits::default();
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            prefer_gpu: true,
            preset_dir: None,
            gpu_max_dimension: gpu.max_dimension,
            gpu_max_pixels: gpu.max_pixels,
            preview_max_dimension: 1440,
            monitor: MonitorConfig::default(),
        }
    }
}

impl GradingConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| GradingError::Config(format!("{}: {e}", path.display())))?;
        config.validated()
    }

    /// Apply `LUMAGRADE_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup(ENV_FORCE_CPU) {
            let force = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
            if force {
                debug!("{ENV_FORCE_CPU} set; GPU disabled");
                self.prefer_gpu = false;
            }
        }
        if let Some(v) = lookup(ENV_PRESET_DIR) {
            if !v.trim().is_empty() {
                self.preset_dir = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = lookup(ENV_HISTORY_LIMIT) {
            self.history_limit = v
                .trim()
                .parse()
                .map_err(|_| GradingError::Config(format!("{ENV_HISTORY_LIMIT}={v:?} is not a count")))?;
        }
        self.validated()
    }

    /// Persist user presets under the per-user data directory unless a
    /// directory is already configured.
    pub fn with_user_preset_dir(mut self) -> Result<Self> {
        if self.preset_dir.is_none() {
            self.preset_dir = Some(default_presets_dir()?);
        }
        Ok(self)
    }

    fn validated(self) -> Result<Self> {
        if self.history_limit == 0 {
            return Err(GradingError::Config("historyLimit must be at least 1".to_string()));
        }
        if self.monitor.window_size == 0 {
            return Err(GradingError::Config("monitor.windowSize must be at least 1".to_string()));
        }
        if self.monitor.target_fps <= 0.0 {
            return Err(GradingError::Config("monitor.targetFps must be positive".to_string()));
        }
        Ok(self)
    }

    pub fn gpu_limits(&self) -> GpuLimits {
        GpuLimits {
            max_dimension: self.gpu_max_dimension,
            max_pixels: self.gpu_max_pixels,
        }
    }
}
