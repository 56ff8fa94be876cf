//! Frame-rate and memory tracking for adaptive preview quality.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, trace};

use crate::config::MonitorConfig;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Returns resident memory of this process in bytes.
pub type MemoryProbe = Box<dyn FnMut() -> Option<u64> + Send>;

fn process_memory_probe() -> MemoryProbe {
    let mut system = System::new();
    let pid = sysinfo::get_current_pid().ok();
    Box::new(move || {
        let pid = pid?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|p| p.memory())
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    /// From the most recent frame interval.
    pub fps: f64,
    pub average_fps: f64,
    pub frame_time_ms: f64,
    pub memory_usage_mb: f64,
    /// Actual over ideal frame time; above 1 means over budget.
    pub cpu_load: f64,
    pub dropped_frames: u64,
    pub total_frames: u64,
    pub is_throttled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PerformanceGrade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PerformanceGrade::A => "A",
            PerformanceGrade::B => "B",
            PerformanceGrade::C => "C",
            PerformanceGrade::D => "D",
            PerformanceGrade::F => "F",
        };
        f.write_str(s)
    }
}

pub struct PerformanceMonitor {
    config: MonitorConfig,
    enabled: bool,
    started_at: Option<Instant>,
    last_frame: Option<Instant>,
    /// Recent frame intervals in milliseconds.
    intervals: VecDeque<f64>,
    stats: PerformanceStats,
    probe: MemoryProbe,
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("enabled", &self.enabled)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_memory_probe(config, process_memory_probe())
    }

    pub fn with_memory_probe(config: MonitorConfig, probe: MemoryProbe) -> Self {
        Self {
            config,
            enabled: false,
            started_at: None,
            last_frame: None,
            intervals: VecDeque::new(),
            stats: PerformanceStats::default(),
            probe,
        }
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Reset counters and begin tracking from `now`.
    pub fn start_at(&mut self, now: Instant) {
        self.enabled = true;
        self.started_at = Some(now);
        self.last_frame = None;
        self.intervals.clear();
        self.stats = PerformanceStats::default();
        debug!(target_fps = self.config.target_fps, "performance monitor started");
    }

    pub fn stop(&mut self) {
        if self.enabled {
            self.enabled = false;
            debug!(average_fps = self.stats.average_fps, "performance monitor stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_frame(&mut self) {
        self.record_frame_at(Instant::now());
    }

    pub fn record_frame_at(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        let started = *self.started_at.get_or_insert(now);
        self.stats.total_frames += 1;

        if let Some(last) = self.last_frame {
            let dt = now.saturating_duration_since(last).as_secs_f64() * 1000.0;
            if dt > 0.0 {
                self.stats.frame_time_ms = dt;
                self.stats.fps = 1000.0 / dt;
                self.stats.cpu_load = dt / self.ideal_frame_ms();
                self.intervals.push_back(dt);
                while self.intervals.len() > self.config.window_size {
                    self.intervals.pop_front();
                }
                let total: f64 = self.intervals.iter().sum();
                self.stats.average_fps = self.intervals.len() as f64 * 1000.0 / total;
                self.stats.is_throttled = self.stats.average_fps < self.config.throttle_fps;
            }
        }
        self.last_frame = Some(now);

        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let expected = (elapsed * self.config.target_fps).floor() as u64;
        self.stats.dropped_frames = expected.saturating_sub(self.stats.total_frames);

        let interval = self.config.memory_sample_interval.max(1) as u64;
        if (self.stats.total_frames - 1) % interval == 0 {
            if let Some(bytes) = (self.probe)() {
                self.stats.memory_usage_mb = bytes as f64 / BYTES_PER_MB;
            }
        }
        trace!(fps = self.stats.fps, avg = self.stats.average_fps, "frame recorded");
    }

    pub fn stats(&self) -> PerformanceStats {
        self.stats
    }

    fn ideal_frame_ms(&self) -> f64 {
        1000.0 / self.config.target_fps
    }

    /// Weighted blend of frame rate (half), memory headroom and frame-time
    /// headroom (a quarter each).
    pub fn score(&self) -> f64 {
        let s = &self.stats;
        let fps_score = (s.average_fps / self.config.target_fps).clamp(0.0, 1.0);
        let mem_score = 1.0 - (s.memory_usage_mb / self.config.memory_budget_mb).clamp(0.0, 1.0);
        let frame_score = if s.frame_time_ms > 0.0 {
            (self.ideal_frame_ms() / s.frame_time_ms).clamp(0.0, 1.0)
        } else {
            0.0
        };
        0.5 * fps_score + 0.25 * mem_score + 0.25 * frame_score
    }

    pub fn grade(&self) -> PerformanceGrade {
        match self.score() {
            s if s >= 0.9 => PerformanceGrade::A,
            s if s >= 0.8 => PerformanceGrade::B,
            s if s >= 0.7 => PerformanceGrade::C,
            s if s >= 0.6 => PerformanceGrade::D,
            _ => PerformanceGrade::F,
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        let s = &self.stats;
        let mut out = Vec::new();
        if s.dropped_frames > 0 && s.average_fps < self.config.target_fps * 0.9 {
            out.push(format!(
                "Frame drops detected ({} frames); reduce preview resolution",
                s.dropped_frames
            ));
        }
        if s.is_throttled {
            out.push(format!(
                "Average frame rate below {:.0} FPS; disable clarity and dehaze while editing",
                self.config.throttle_fps
            ));
        }
        if s.memory_usage_mb > self.config.memory_budget_mb * 0.8 {
            out.push(format!(
                "Memory usage high ({:.0} MB); release unused LUTs and previews",
                s.memory_usage_mb
            ));
        }
        if s.cpu_load > 1.0 {
            out.push(format!(
                "Frames exceed the {:.1} ms budget; switch to the GPU engine if available",
                self.ideal_frame_ms()
            ));
        }
        out
    }
}
