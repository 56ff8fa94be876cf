use std::time::Instant;

use image::RgbaImage;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::engine::{frame_bytes, validate_image, EngineKind, ProcessingEngine};
use crate::error::Result;
use crate::kernel::{
    decode, encode, grade_pixel, source_luminance, GradeParams, LocalStats, LOCAL_RADIUS,
};
use crate::models::{ColorGradingSettings, PerformanceMetrics, WorkingSpace};

/// Grades on the CPU, one rayon task per row.
#[derive(Debug, Default)]
pub struct CpuEngine {
    metrics: Mutex<PerformanceMetrics>,
}

impl CpuEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessingEngine for CpuEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Cpu
    }

    fn process_image(
        &self,
        image: &RgbaImage,
        settings: &ColorGradingSettings,
        space: Option<WorkingSpace>,
    ) -> Result<RgbaImage> {
        validate_image(image)?;
        let started = Instant::now();

        let out = if settings.is_identity() {
            trace!("neutral settings; copying frame");
            image.clone()
        } else {
            let (w, h) = image.dimensions();
            let params = GradeParams::new(settings, w, h, space.unwrap_or_default());
            grade_image(image, &params)
        };

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            width = image.width(),
            height = image.height(),
            ms = elapsed,
            "cpu frame graded"
        );
        *self.metrics.lock() = PerformanceMetrics::from_frame(elapsed, frame_bytes(image), None);
        Ok(out)
    }

    fn supports_gpu(&self) -> bool {
        false
    }

    fn performance_metrics(&self) -> PerformanceMetrics {
        *self.metrics.lock()
    }

    fn dispose(&self) {}
}

/// Reference pipeline over a whole frame.
pub(crate) fn grade_image(image: &RgbaImage, params: &GradeParams) -> RgbaImage {
    let w = image.width();
    let linear = params.linear_space();
    let means = if params.local_active() {
        Some(local_means(image, linear))
    } else {
        None
    };

    let src = image.as_raw();
    let row_bytes = w as usize * 4;
    let mut out = RgbaImage::new(w, image.height());
    out.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let i = y * row_bytes + x * 4;
                let input = [src[i], src[i + 1], src[i + 2], src[i + 3]];
                let local = match &means {
                    Some(m) => LocalStats {
                        luminance: m.luminance[y * w as usize + x],
                        mean: m.mean[y * w as usize + x],
                    },
                    None => LocalStats::default(),
                };
                let c = grade_pixel(
                    params,
                    decode(input, linear),
                    local,
                    x as f32 + 0.5,
                    y as f32 + 0.5,
                );
                px[0] = encode(c[0]);
                px[1] = encode(c[1]);
                px[2] = encode(c[2]);
                px[3] = input[3];
            }
        });
    out
}

struct LocalMeans {
    luminance: Vec<f32>,
    mean: Vec<f32>,
}

/// Source luminance and its box mean over a `(2r+1)²` window with clamped
/// edges, summed in the same order the shader uses.
fn local_means(image: &RgbaImage, linear: bool) -> LocalMeans {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let luminance: Vec<f32> = image
        .as_raw()
        .par_chunks(4)
        .map(|p| source_luminance([p[0], p[1], p[2], p[3]], linear))
        .collect();

    let taps = ((2 * LOCAL_RADIUS + 1) * (2 * LOCAL_RADIUS + 1)) as f32;
    let mut mean = vec![0.0f32; luminance.len()];
    mean.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for (x, m) in row.iter_mut().enumerate() {
                let x = x as i32;
                let mut sum = 0.0;
                for dy in -LOCAL_RADIUS..=LOCAL_RADIUS {
                    let sy = (y + dy).clamp(0, h - 1);
                    for dx in -LOCAL_RADIUS..=LOCAL_RADIUS {
                        let sx = (x + dx).clamp(0, w - 1);
                        sum += luminance[(sy * w + sx) as usize];
                    }
                }
                *m = sum / taps;
            }
        });

    LocalMeans { luminance, mean }
}
