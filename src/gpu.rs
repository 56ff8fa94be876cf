use std::mem::size_of;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use parking_lot::Mutex;
use pollster::block_on;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::engine::{frame_bytes, validate_image, EngineKind, ProcessingEngine};
use crate::error::{GradingError, Result};
use crate::kernel::{GradeParams, GradeUniforms, CURVE_SAMPLES};
use crate::lut::LutData;
use crate::models::{ColorGradingSettings, PerformanceMetrics, WorkingSpace};

/// Frame budget used to turn processing time into a utilization estimate.
const FRAME_BUDGET_MS: f64 = 1000.0 / 60.0;

/// Size guards for GPU frames; larger frames are handed back to the caller
/// as unavailable so the CPU engine takes them.
#[derive(Debug, Clone, Copy)]
pub struct GpuLimits {
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl Default for GpuLimits {
    fn default() -> Self {
        Self {
            max_dimension: 8192,
            max_pixels: 150_000_000, // ~150 MP guardrail
        }
    }
}

struct CachedLut {
    source: Arc<LutData>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuResources {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    empty_lut: wgpu::Texture,
    empty_lut_view: wgpu::TextureView,
    lut: Option<CachedLut>,
    max_safe_dim: u32,
    max_safe_pixels: u64,
}

/// Grades in a fragment shader, one invocation per output pixel.
pub struct GpuEngine {
    resources: Mutex<Option<GpuResources>>,
    available: AtomicBool,
    metrics: Mutex<PerformanceMetrics>,
    adapter_name: String,
}

impl GpuEngine {
    /// Build the device and pipeline. Fails with `EngineUnavailable` when no
    /// adapter exists or the shader does not compile.
    pub fn try_new(limits: GpuLimits) -> Result<Self> {
        let (resources, adapter_name) = catch_unwind(AssertUnwindSafe(|| init_resources(limits)))
            .unwrap_or_else(|_| {
                Err(GradingError::EngineUnavailable(
                    "GPU init panicked".to_string(),
                ))
            })?;
        info!(
            adapter = %adapter_name,
            max_dim = resources.max_safe_dim,
            "GPU grading engine ready"
        );
        Ok(Self {
            resources: Mutex::new(Some(resources)),
            available: AtomicBool::new(true),
            metrics: Mutex::new(PerformanceMetrics::default()),
            adapter_name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn disable(&self, reason: &str) {
        if self.available.swap(false, Ordering::SeqCst) {
            warn!(reason, "GPU grading engine disabled");
        }
    }
}

fn init_resources(limits: GpuLimits) -> Result<(GpuResources, String)> {
    let unavailable = |msg: String| GradingError::EngineUnavailable(msg);

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| unavailable("No suitable GPU adapter found".to_string()))?;
    let adapter_name = adapter.get_info().name;

    let (device, queue) = block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("lumagrade-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
        },
        None,
    ))
    .map_err(|e| unavailable(format!("Failed to create GPU device: {e:?}")))?;

    // Shader or pipeline problems surface here instead of panicking later.
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("lumagrade-grade-shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("grade.wgsl").into()),
    });

    let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("lumagrade-bind-grade"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(size_of::<GradeUniforms>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        (CURVE_SAMPLES * size_of::<[f32; 4]>()) as u64,
                    ),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("lumagrade-pipeline-grade"),
        bind_group_layouts: &[&bind_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("lumagrade-render-grade"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs",
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_grade",
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    });

    if let Some(err) = block_on(device.pop_error_scope()) {
        return Err(unavailable(format!("grade pipeline failed to build: {err}")));
    }

    let black = [0.0f32, 0.0, 0.0, 1.0];
    let empty_lut = device.create_texture_with_data(
        &queue,
        &wgpu::TextureDescriptor {
            label: Some("lumagrade-lut-empty"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(&black),
    );
    let empty_lut_view = empty_lut.create_view(&wgpu::TextureViewDescriptor::default());

    let max_dim = device.limits().max_texture_dimension_2d;
    let resources = GpuResources {
        device,
        queue,
        pipeline,
        bind_layout,
        empty_lut,
        empty_lut_view,
        lut: None,
        max_safe_dim: max_dim.min(limits.max_dimension),
        max_safe_pixels: limits.max_pixels,
    };
    Ok((resources, adapter_name))
}

impl GpuResources {
    /// Frames and lattices beyond the device budget go to the CPU engine;
    /// the GPU engine itself stays usable.
    fn check_capacity(&self, width: u32, height: u32, lut: Option<&LutData>) -> Result<()> {
        if width > self.max_safe_dim || height > self.max_safe_dim {
            return Err(GradingError::EngineUnavailable(format!(
                "{width}x{height} exceeds GPU limit {}",
                self.max_safe_dim
            )));
        }
        if (width as u64) * (height as u64) > self.max_safe_pixels {
            return Err(GradingError::EngineUnavailable(format!(
                "{width}x{height} exceeds GPU pixel budget"
            )));
        }
        if let Some(lut) = lut {
            if (lut.size * lut.size) as u64 > self.device.limits().max_texture_dimension_2d as u64 {
                return Err(GradingError::EngineUnavailable(format!(
                    "LUT size {} too large for a GPU texture",
                    lut.size
                )));
            }
        }
        Ok(())
    }

    /// Upload `lut` unless it is the lattice already resident.
    fn ensure_lut(&mut self, lut: &Arc<LutData>) {
        if matches!(&self.lut, Some(cached) if Arc::ptr_eq(&cached.source, lut)) {
            return;
        }
        let (width, height, texels) = lut.pack_texture();
        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("lumagrade-lut"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&texels),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Some(old) = self.lut.take() {
            old.texture.destroy();
        }
        debug!(size = lut.size, "uploaded LUT texture");
        self.lut = Some(CachedLut {
            source: Arc::clone(lut),
            texture,
            view,
        });
    }

    fn render(&mut self, src: &RgbaImage, params: &GradeParams) -> Result<RgbaImage> {
        let (width, height) = src.dimensions();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let src_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lumagrade-src"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &src_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            src.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let src_view = src_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lumagrade-uniforms"),
                contents: bytemuck::bytes_of(&params.uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let curve_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lumagrade-curve"),
                contents: bytemuck::cast_slice(&params.curve),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        if let Some(lut) = &params.lut {
            self.ensure_lut(lut);
        }
        let lut_view = match &self.lut {
            Some(cached) if params.lut.is_some() => &cached.view,
            _ => &self.empty_lut_view,
        };

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumagrade-bind-grade"),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: curve_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(lut_view),
                },
            ],
        });

        let dst_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lumagrade-dst"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let dst_view = dst_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumagrade-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumagrade-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dst_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        let bytes_per_row = 4 * width;
        let padded_bytes_per_row = ((bytes_per_row as usize
            + (wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize - 1))
            / wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lumagrade-readback"),
            size: (padded_bytes_per_row * height as usize) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &dst_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row as u32),
                    rows_per_image: Some(height),
                },
            },
            size,
        );

        self.queue.submit(Some(encoder.finish()));

        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(GradingError::EngineUnavailable(format!(
                "GPU validation failed: {err}"
            )));
        }

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel::<
            std::result::Result<(), wgpu::BufferAsyncError>,
        >();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match block_on(rx.receive()) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                return Err(GradingError::Processing(format!("GPU readback failed: {e}")))
            }
            None => return Err(GradingError::Processing("GPU readback dropped".to_string())),
        }

        let data = buffer_slice.get_mapped_range();
        let mut out = RgbaImage::new(width, height);
        for y in 0..height as usize {
            let src_start = y * padded_bytes_per_row;
            let src_end = src_start + bytes_per_row as usize;
            let dst_start = y * (bytes_per_row as usize);
            let dst_end = dst_start + (bytes_per_row as usize);
            out.as_mut()[dst_start..dst_end].copy_from_slice(&data[src_start..src_end]);
        }
        drop(data);
        output_buffer.unmap();
        src_texture.destroy();
        dst_texture.destroy();

        Ok(out)
    }

    fn release(self) {
        if let Some(cached) = self.lut {
            cached.texture.destroy();
        }
        self.empty_lut.destroy();
    }
}

impl ProcessingEngine for GpuEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Gpu
    }

    fn process_image(
        &self,
        image: &RgbaImage,
        settings: &ColorGradingSettings,
        space: Option<WorkingSpace>,
    ) -> Result<RgbaImage> {
        validate_image(image)?;
        if !self.available.load(Ordering::SeqCst) {
            return Err(GradingError::EngineUnavailable(
                "GPU engine disabled".to_string(),
            ));
        }
        let started = Instant::now();

        let out = if settings.is_identity() {
            image.clone()
        } else {
            let mut guard = self.resources.lock();
            let resources = guard.as_mut().ok_or_else(|| {
                GradingError::EngineUnavailable("GPU engine disposed".to_string())
            })?;
            let (w, h) = image.dimensions();
            let params = GradeParams::new(settings, w, h, space.unwrap_or_default());
            resources.check_capacity(w, h, params.lut.as_deref())?;
            match catch_unwind(AssertUnwindSafe(|| resources.render(image, &params))) {
                Ok(Ok(out)) => out,
                Ok(Err(e)) => {
                    if e.is_engine_unavailable() {
                        self.disable(&e.to_string());
                    }
                    return Err(e);
                }
                Err(_) => {
                    self.disable("GPU frame panicked");
                    return Err(GradingError::EngineUnavailable(
                        "GPU frame panicked".to_string(),
                    ));
                }
            }
        };

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        let lut_bytes = settings
            .lut
            .as_ref()
            .map(|l| (l.data.data.len() / 3 * 16) as u64)
            .unwrap_or(0);
        let utilization = (elapsed / FRAME_BUDGET_MS).min(1.0);
        debug!(
            width = image.width(),
            height = image.height(),
            ms = elapsed,
            "gpu frame graded"
        );
        *self.metrics.lock() = PerformanceMetrics::from_frame(
            elapsed,
            frame_bytes(image) + lut_bytes,
            Some(utilization),
        );
        Ok(out)
    }

    fn supports_gpu(&self) -> bool {
        self.available.load(Ordering::SeqCst) && self.resources.lock().is_some()
    }

    fn performance_metrics(&self) -> PerformanceMetrics {
        *self.metrics.lock()
    }

    fn dispose(&self) {
        if let Some(resources) = self.resources.lock().take() {
            resources.release();
            info!(adapter = %self.adapter_name, "GPU grading engine disposed");
        }
    }
}

impl Drop for GpuEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
