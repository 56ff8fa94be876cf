//! The grading service: current settings, history, presets and engine
//! selection behind one handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::GradingConfig;
use crate::cpu::CpuEngine;
use crate::engine::{validate_image, EngineKind, ProcessingEngine};
use crate::error::{GradingError, Result};
use crate::events::{EventBus, GradingEvent, Listener, SubscriptionId};
use crate::gpu::GpuEngine;
use crate::history::History;
use crate::image_io::resize_preserve_aspect;
use crate::models::{
    ColorGradingPreset, ColorGradingSettings, PerformanceMetrics, PresetCategory, SettingsPatch,
    WorkingSpace,
};
use crate::monitor::{PerformanceGrade, PerformanceMonitor, PerformanceStats};
use crate::presets::PresetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Idle,
    Processing,
    Error,
}

struct ServiceState {
    settings: ColorGradingSettings,
    history: History,
    presets: PresetStore,
    status: ServiceStatus,
    last_error: Option<String>,
}

/// Downscaled copy of the last preview source.
struct PreviewSource {
    source: Arc<RgbaImage>,
    max_dimension: u32,
    scaled: Arc<RgbaImage>,
}

/// Puts the service back to idle when a frame ends, however it ends.
struct IdleOnDrop<'a>(&'a Mutex<ServiceState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.lock().status = ServiceStatus::Idle;
    }
}

pub struct GradingService {
    config: GradingConfig,
    state: Mutex<ServiceState>,
    engine: RwLock<Arc<dyn ProcessingEngine>>,
    fallback: Arc<CpuEngine>,
    events: EventBus,
    in_flight: tokio::sync::Mutex<()>,
    monitor: Mutex<PerformanceMonitor>,
    preview: Mutex<Option<PreviewSource>>,
    disposed: AtomicBool,
}

impl GradingService {
    /// Build with the GPU engine when `prefer_gpu` is set and a device is
    /// available, else the CPU engine.
    pub fn new(config: GradingConfig) -> Result<Self> {
        let engine: Arc<dyn ProcessingEngine> = if config.prefer_gpu {
            match GpuEngine::try_new(config.gpu_limits()) {
                Ok(gpu) => Arc::new(gpu),
                Err(e) => {
                    warn!(error = %e, "GPU engine unavailable; using CPU");
                    Arc::new(CpuEngine::new())
                }
            }
        } else {
            Arc::new(CpuEngine::new())
        };
        Self::with_engine(config, engine)
    }

    /// Build around a caller-supplied engine.
    pub fn with_engine(config: GradingConfig, engine: Arc<dyn ProcessingEngine>) -> Result<Self> {
        let presets = match &config.preset_dir {
            Some(dir) => PresetStore::open(dir.clone())?,
            None => PresetStore::new(),
        };
        info!(engine = %engine.kind(), "grading service ready");
        Ok(Self {
            state: Mutex::new(ServiceState {
                settings: ColorGradingSettings::default(),
                history: History::new(ColorGradingSettings::default(), config.history_limit),
                presets,
                status: ServiceStatus::Idle,
                last_error: None,
            }),
            engine: RwLock::new(engine),
            fallback: Arc::new(CpuEngine::new()),
            events: EventBus::new(),
            in_flight: tokio::sync::Mutex::new(()),
            monitor: Mutex::new(PerformanceMonitor::new(config.monitor.clone())),
            preview: Mutex::new(None),
            disposed: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn settings(&self) -> ColorGradingSettings {
        self.state.lock().settings.clone()
    }

    pub fn status(&self) -> ServiceStatus {
        self.state.lock().status
    }

    /// Message of the most recent failed frame.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    // ---- settings & history ----

    /// Merge `patch` into the current settings and record the result.
    pub fn update_settings(&self, patch: &SettingsPatch) -> ColorGradingSettings {
        let next = {
            let mut state = self.state.lock();
            let next = state.settings.apply_patch(patch).clamped();
            state.history.push(next.clone());
            state.settings = next.clone();
            next
        };
        self.events.emit(&GradingEvent::SettingsChanged(next.clone()));
        next
    }

    /// Replace the current settings wholesale and record them.
    pub fn set_settings(&self, settings: ColorGradingSettings) -> ColorGradingSettings {
        let next = settings.clamped();
        {
            let mut state = self.state.lock();
            state.history.push(next.clone());
            state.settings = next.clone();
        }
        self.events.emit(&GradingEvent::SettingsChanged(next.clone()));
        next
    }

    pub fn undo(&self) -> Option<ColorGradingSettings> {
        let restored = {
            let mut state = self.state.lock();
            let restored = state.history.undo()?.clone();
            state.settings = restored.clone();
            restored
        };
        self.events.emit(&GradingEvent::SettingsChanged(restored.clone()));
        Some(restored)
    }

    pub fn redo(&self) -> Option<ColorGradingSettings> {
        let restored = {
            let mut state = self.state.lock();
            let restored = state.history.redo()?.clone();
            state.settings = restored.clone();
            restored
        };
        self.events.emit(&GradingEvent::SettingsChanged(restored.clone()));
        Some(restored)
    }

    pub fn can_undo(&self) -> bool {
        self.state.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.lock().history.can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    // ---- processing ----

    /// Grade `image` with the current settings, or `settings_override` when
    /// given. Must run inside a tokio runtime.
    pub async fn process_image(
        &self,
        image: impl Into<Arc<RgbaImage>>,
        settings_override: Option<ColorGradingSettings>,
    ) -> Result<Arc<RgbaImage>> {
        self.process_image_in(image, settings_override, WorkingSpace::Display)
            .await
    }

    pub async fn process_image_in(
        &self,
        image: impl Into<Arc<RgbaImage>>,
        settings_override: Option<ColorGradingSettings>,
        space: WorkingSpace,
    ) -> Result<Arc<RgbaImage>> {
        let image = image.into();
        validate_image(&image)?;
        let _gate = self.in_flight.lock().await;
        let settings = settings_override.unwrap_or_else(|| self.settings());
        self.run_frame(image, settings, space).await
    }

    /// Downscale `image` to fit `max_dimension` (default from config), grade
    /// it with the current settings and publish it as a preview.
    pub async fn render_preview(
        &self,
        image: impl Into<Arc<RgbaImage>>,
        max_dimension: Option<u32>,
    ) -> Result<Arc<RgbaImage>> {
        let image = image.into();
        validate_image(&image)?;
        let max_dimension = max_dimension
            .unwrap_or(self.config.preview_max_dimension)
            .max(1);

        let _gate = self.in_flight.lock().await;
        let scaled = self.scaled_source(image, max_dimension).await?;
        let settings = self.settings();
        let out = self
            .run_frame(scaled, settings, WorkingSpace::Display)
            .await?;
        self.events
            .emit(&GradingEvent::PreviewUpdated(Arc::clone(&out)));
        Ok(out)
    }

    async fn scaled_source(
        &self,
        image: Arc<RgbaImage>,
        max_dimension: u32,
    ) -> Result<Arc<RgbaImage>> {
        if let Some(cached) = self.preview.lock().as_ref() {
            if Arc::ptr_eq(&cached.source, &image) && cached.max_dimension == max_dimension {
                return Ok(Arc::clone(&cached.scaled));
            }
        }
        let source = Arc::clone(&image);
        let scaled = tokio::task::spawn_blocking(move || {
            Arc::new(resize_preserve_aspect(&source, max_dimension))
        })
        .await
        .map_err(|e| GradingError::Processing(format!("preview resize failed: {e}")))?;
        debug!(
            width = scaled.width(),
            height = scaled.height(),
            "preview source resized"
        );
        *self.preview.lock() = Some(PreviewSource {
            source: image,
            max_dimension,
            scaled: Arc::clone(&scaled),
        });
        Ok(scaled)
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    async fn run_frame(
        &self,
        image: Arc<RgbaImage>,
        settings: ColorGradingSettings,
        space: WorkingSpace,
    ) -> Result<Arc<RgbaImage>> {
        self.state.lock().status = ServiceStatus::Processing;
        let _idle = IdleOnDrop(&self.state);
        self.events.emit(&GradingEvent::ProcessingStarted);

        match self.grade_with_fallback(image, settings, space).await {
            Ok((out, metrics)) => {
                {
                    let mut monitor = self.monitor.lock();
                    if monitor.is_enabled() {
                        monitor.record_frame();
                    }
                }
                let out = Arc::new(out);
                self.events.emit(&GradingEvent::ProcessingCompleted {
                    image: Arc::clone(&out),
                    metrics,
                });
                Ok(out)
            }
            Err(e) => {
                warn!(error = %e, "frame failed");
                {
                    let mut state = self.state.lock();
                    state.status = ServiceStatus::Error;
                    state.last_error = Some(e.to_string());
                }
                self.events.emit(&GradingEvent::error(&e));
                Err(e)
            }
        }
    }

    async fn grade_with_fallback(
        &self,
        image: Arc<RgbaImage>,
        settings: ColorGradingSettings,
        space: WorkingSpace,
    ) -> Result<(RgbaImage, PerformanceMetrics)> {
        let settings = Arc::new(settings);
        let engine = Arc::clone(&*self.engine.read());
        match run_blocking(Arc::clone(&engine), Arc::clone(&image), Arc::clone(&settings), space)
            .await
        {
            Err(e) if e.is_engine_unavailable() && engine.kind() == EngineKind::Gpu => {
                if engine.supports_gpu() {
                    debug!(reason = %e, "frame outside GPU limits; grading on CPU");
                } else {
                    warn!(reason = %e, "GPU engine failed; switching to CPU");
                    let cpu: Arc<dyn ProcessingEngine> = self.fallback.clone();
                    *self.engine.write() = cpu;
                }
                let cpu: Arc<dyn ProcessingEngine> = self.fallback.clone();
                run_blocking(cpu, image, settings, space).await
            }
            other => other,
        }
    }

    // ---- presets ----

    /// Built-ins first, then user presets in creation order.
    pub fn presets(&self) -> Vec<ColorGradingPreset> {
        self.state.lock().presets.list()
    }

    pub fn save_preset(
        &self,
        name: &str,
        description: Option<&str>,
        category: Option<PresetCategory>,
    ) -> Result<ColorGradingPreset> {
        let mut state = self.state.lock();
        let settings = state.settings.clone();
        let preset = state.presets.create(
            name,
            description.map(str::to_string),
            category.unwrap_or_default(),
            settings,
        )?;
        info!(id = %preset.id, name = %preset.name, "preset saved");
        Ok(preset)
    }

    /// Apply a preset's settings. False when the id is unknown.
    pub fn load_preset(&self, id: &str) -> bool {
        let settings = {
            let mut state = self.state.lock();
            let Some(settings) = state.presets.get(id).map(|p| p.settings.clone()) else {
                debug!(id, "unknown preset");
                return false;
            };
            state.history.push(settings.clone());
            state.settings = settings.clone();
            settings
        };
        self.events.emit(&GradingEvent::SettingsChanged(settings));
        true
    }

    /// Remove a user preset. False for unknown ids, built-ins, or when the
    /// stored file cannot be removed.
    pub fn delete_preset(&self, id: &str) -> bool {
        let result = self.state.lock().presets.delete(id);
        match result {
            Ok(removed) => removed,
            Err(e) => {
                warn!(id, error = %e, "preset delete failed");
                self.events.emit(&GradingEvent::error(&e));
                false
            }
        }
    }

    pub fn export_preset(&self, id: &str) -> Result<Option<String>> {
        self.state.lock().presets.export(id)
    }

    pub fn import_preset(&self, json: &str) -> Result<ColorGradingPreset> {
        self.state.lock().presets.import(json)
    }

    // ---- events ----

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&GradingEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ---- engine & monitoring ----

    pub fn active_engine(&self) -> EngineKind {
        self.engine.read().kind()
    }

    pub fn supports_gpu(&self) -> bool {
        self.engine.read().supports_gpu()
    }

    /// Metrics of the engine that graded the last frame.
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.engine.read().performance_metrics()
    }

    pub fn start_monitoring(&self) {
        self.monitor.lock().start();
    }

    pub fn stop_monitoring(&self) {
        self.monitor.lock().stop();
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        self.monitor.lock().stats()
    }

    pub fn performance_grade(&self) -> PerformanceGrade {
        self.monitor.lock().grade()
    }

    pub fn performance_suggestions(&self) -> Vec<String> {
        self.monitor.lock().suggestions()
    }

    /// Release engine resources and continue on the CPU engine. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let previous = {
            let mut engine = self.engine.write();
            let cpu: Arc<dyn ProcessingEngine> = self.fallback.clone();
            std::mem::replace(&mut *engine, cpu)
        };
        previous.dispose();
        self.preview.lock().take();
        self.monitor.lock().stop();
        info!("grading service disposed");
    }
}

impl Drop for GradingService {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_blocking(
    engine: Arc<dyn ProcessingEngine>,
    image: Arc<RgbaImage>,
    settings: Arc<ColorGradingSettings>,
    space: WorkingSpace,
) -> Result<(RgbaImage, PerformanceMetrics)> {
    tokio::task::spawn_blocking(move || {
        let out = engine.process_image(&image, &settings, Some(space))?;
        Ok((out, engine.performance_metrics()))
    })
    .await
    .map_err(|e| GradingError::Processing(format!("engine task failed: {e}")))?
}
