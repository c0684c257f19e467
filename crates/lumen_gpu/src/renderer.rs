//! wgpu executor
//!
//! [`GpuRenderer`] owns the device, a [`PictureFlusher`] and every GPU
//! resource a command list needs:
//!
//! - One shader module and a pipeline per (program, blend, stencil, sample
//!   count), created lazily
//! - Shared vertex/index buffers and a uniform buffer with one 512-byte slot
//!   per draw, bound at dynamic offsets
//! - Offscreen targets pooled across frames, each with a stencil attachment
//!   and an MSAA color buffer when multisampled
//! - An LRU cache of uploaded images
//!
//! Stencil clipping uses reference value 1 for "inside": a clear pass sets
//! the region to 1, each mask increments the pixels it covers from 1 to 2,
//! and the intersect pass turns 2 back into 1 and everything else into 0.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use lumen_core::{BlendMode, FilterMode, ImageId, Picture};
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::command::{CommandList, DeviceRect, DrawCall, GpuCommand, TargetDesc, TargetId, TextureSource};
use crate::config::RendererConfig;
use crate::error::RendererError;
use crate::flusher::PictureFlusher;
use crate::gradient::GRADIENT_TEXTURE_WIDTH;
use crate::mesh::MeshVertex;
use crate::shader::{DrawUniforms, Material, ProgramKind, StencilMode};
use crate::shaders::{fragment_entry, LUMEN_SHADER, VERTEX_ENTRY};

/// Bytes between consecutive draw uniform slots
const UNIFORM_STRIDE: u64 = 512;

/// Uploaded images kept across frames
const IMAGE_CACHE_CAPACITY: usize = 256;

/// Idle offscreen targets kept for reuse
const MAX_POOLED_TARGETS: usize = 16;

const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Stencil reference value meaning "inside the clip"
const STENCIL_INSIDE: u32 = 1;

/// WebGPU only guarantees 1x and 4x multisampling
fn normalize_samples(samples: u32) -> u32 {
    if samples >= 4 {
        4
    } else {
        1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn new(device: &wgpu::Device, label: &str, desc: TextureSpec) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: desc.samples,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

#[derive(Clone, Copy)]
struct TextureSpec {
    width: u32,
    height: u32,
    samples: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
}

/// A render target: a sampleable single-sample color texture, an optional
/// MSAA color buffer resolving into it, and a stencil buffer
struct RenderTarget {
    color: GpuTexture,
    msaa: Option<GpuTexture>,
    stencil: GpuTexture,
    width: u32,
    height: u32,
    samples: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32, samples: u32) -> Self {
        let samples = normalize_samples(samples);
        let (width, height) = (width.max(1), height.max(1));
        let color = GpuTexture::new(
            device,
            "Lumen Target Color",
            TextureSpec {
                width,
                height,
                samples: 1,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            },
        );
        let msaa = (samples > 1).then(|| {
            GpuTexture::new(
                device,
                "Lumen Target MSAA",
                TextureSpec {
                    width,
                    height,
                    samples,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                },
            )
        });
        let stencil = GpuTexture::new(
            device,
            "Lumen Target Stencil",
            TextureSpec {
                width,
                height,
                samples,
                format: STENCIL_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            },
        );
        Self {
            color,
            msaa,
            stencil,
            width,
            height,
            samples,
        }
    }

    fn matches(&self, width: u32, height: u32, samples: u32) -> bool {
        self.width == width.max(1)
            && self.height == height.max(1)
            && self.samples == normalize_samples(samples)
    }
}

struct Buffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    uniforms: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

struct Samplers {
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
}

impl Samplers {
    fn get(&self, mode: FilterMode) -> &wgpu::Sampler {
        match mode {
            FilterMode::Nearest => &self.nearest,
            FilterMode::Bilinear => &self.linear,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramKind,
    blend: BlendMode,
    stencil: StencilMode,
    samples: u32,
}

impl PipelineKey {
    fn new(call: &DrawCall, samples: u32) -> Self {
        Self {
            program: call.program,
            blend: call.material.blend,
            stencil: call.material.stencil,
            samples: normalize_samples(samples),
        }
    }
}

/// Per-frame GPU resources
struct Frame {
    targets: FxHashMap<TargetId, RenderTarget>,
    gradients: Vec<GpuTexture>,
    /// Scissor last set on each target, re-applied when its pass resumes
    scissors: FxHashMap<TargetId, Option<DeviceRect>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stencil states
// ─────────────────────────────────────────────────────────────────────────────

fn stencil_face(program: ProgramKind, stencil: StencilMode) -> wgpu::StencilFaceState {
    use wgpu::{CompareFunction, StencilOperation};
    let (compare, fail_op, pass_op) = match program {
        ProgramKind::StencilClear => (
            CompareFunction::Always,
            StencilOperation::Keep,
            StencilOperation::Replace,
        ),
        ProgramKind::StencilWrite => (
            CompareFunction::Equal,
            StencilOperation::Keep,
            StencilOperation::IncrementClamp,
        ),
        // Reference 2: covered pixels fail the test and drop to 1
        ProgramKind::StencilIntersect => (
            CompareFunction::NotEqual,
            StencilOperation::DecrementClamp,
            StencilOperation::Zero,
        ),
        _ => match stencil {
            StencilMode::Always => (
                CompareFunction::Always,
                StencilOperation::Keep,
                StencilOperation::Keep,
            ),
            StencilMode::Equal => (
                CompareFunction::Equal,
                StencilOperation::Keep,
                StencilOperation::Keep,
            ),
        },
    };
    wgpu::StencilFaceState {
        compare,
        fail_op,
        depth_fail_op: StencilOperation::Keep,
        pass_op,
    }
}

fn stencil_reference(program: ProgramKind) -> u32 {
    match program {
        ProgramKind::StencilIntersect => STENCIL_INSIDE + 1,
        _ => STENCIL_INSIDE,
    }
}

fn blend_state(material: &Material) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: material.src_factor.into(),
        dst_factor: material.dst_factor.into(),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderer
// ─────────────────────────────────────────────────────────────────────────────

/// Executes flushed pictures on a wgpu device
pub struct GpuRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: RendererConfig,
    color_format: wgpu::TextureFormat,
    flusher: PictureFlusher,
    shader: wgpu::ShaderModule,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    buffers: Buffers,
    samplers: Samplers,
    blank: GpuTexture,
    images: LruCache<ImageId, GpuTexture>,
    target_pool: Vec<RenderTarget>,
    /// Destination target, kept across frames while the size is unchanged
    root: Option<RenderTarget>,
}

impl GpuRenderer {
    /// Get the preferred backend for the current platform
    fn preferred_backends() -> wgpu::Backends {
        #[cfg(target_os = "macos")]
        {
            wgpu::Backends::METAL
        }
        #[cfg(target_os = "windows")]
        {
            wgpu::Backends::DX12
        }
        #[cfg(target_os = "linux")]
        {
            wgpu::Backends::VULKAN | wgpu::Backends::GL
        }
        #[cfg(target_arch = "wasm32")]
        {
            wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL
        }
        #[cfg(not(any(
            target_os = "macos",
            target_os = "windows",
            target_os = "linux",
            target_arch = "wasm32"
        )))]
        {
            wgpu::Backends::PRIMARY
        }
    }

    /// Create a headless renderer on its own device
    pub async fn new(config: RendererConfig) -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: Self::preferred_backends(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference.into(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RendererError::AdapterNotFound)?;
        tracing::debug!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Lumen GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        Ok(Self::with_device(Arc::new(device), Arc::new(queue), config))
    }

    /// Blocking [`GpuRenderer::new`]
    pub fn new_blocking(config: RendererConfig) -> Result<Self, RendererError> {
        pollster::block_on(Self::new(config))
    }

    /// Create a renderer on an existing device
    pub fn with_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: RendererConfig,
    ) -> Self {
        let color_format = config
            .color_format
            .unwrap_or(wgpu::TextureFormat::Rgba8Unorm);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lumen Shader"),
            source: wgpu::ShaderSource::Wgsl(LUMEN_SHADER.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lumen Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<DrawUniforms>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lumen Texture Layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lumen Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let buffers = Self::create_buffers(&device, &uniform_layout, 4096, 4096, 64);

        let sampler = |label: &str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let samplers = Samplers {
            nearest: sampler("Lumen Nearest Sampler", wgpu::FilterMode::Nearest),
            linear: sampler("Lumen Linear Sampler", wgpu::FilterMode::Linear),
        };

        // Bound wherever a draw samples nothing
        let blank = GpuTexture::new(
            &device,
            "Lumen Blank Texture",
            TextureSpec {
                width: 1,
                height: 1,
                samples: 1,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            },
        );
        Self::write_pixels(&queue, &blank.texture, &[255, 255, 255, 255], 1, 1);

        let flusher = PictureFlusher::new(config.flusher.clone());
        let capacity = NonZeroUsize::new(IMAGE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);

        tracing::debug!(
            "GpuRenderer created: {}x{}, format {:?}",
            config.flusher.width,
            config.flusher.height,
            color_format
        );

        Self {
            device,
            queue,
            config,
            color_format,
            flusher,
            shader,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            pipelines: FxHashMap::default(),
            buffers,
            samplers,
            blank,
            images: LruCache::new(capacity),
            target_pool: Vec::new(),
            root: None,
        }
    }

    fn create_buffers(
        device: &wgpu::Device,
        uniform_layout: &wgpu::BindGroupLayout,
        vertex_bytes: u64,
        index_bytes: u64,
        uniform_slots: u64,
    ) -> Buffers {
        let vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lumen Vertex Buffer"),
            size: vertex_bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lumen Index Buffer"),
            size: index_bytes,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lumen Uniform Buffer"),
            size: uniform_slots * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lumen Uniform Bind Group"),
            layout: uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniforms,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
        });
        Buffers {
            vertices,
            indices,
            uniforms,
            uniform_bind_group,
        }
    }

    fn write_pixels(queue: &wgpu::Queue, texture: &wgpu::Texture, pixels: &[u8], width: u32, height: u32) {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn flusher_mut(&mut self) -> &mut PictureFlusher {
        &mut self.flusher
    }

    /// Number of pipelines built so far
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Render `picture` and copy the result into `output`
    ///
    /// `output` must match the configured size and color format and allow
    /// `COPY_DST`.
    pub fn render(&mut self, picture: &Picture, output: &wgpu::Texture) -> Result<(), RendererError> {
        let list = self.flusher.flush(picture)?;
        let mut encoder = self.encode(&list);
        self.flusher.reclaim(list);

        if let Some(root) = &self.root {
            encoder.copy_texture_to_texture(
                root.color.texture.as_image_copy(),
                output.as_image_copy(),
                wgpu::Extent3d {
                    width: root.width.min(output.width()),
                    height: root.height.min(output.height()),
                    depth_or_array_layers: 1,
                },
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Render `picture` and read it back as tightly packed premultiplied
    /// RGBA8 rows
    pub fn render_to_rgba(&mut self, picture: &Picture) -> Result<Vec<u8>, RendererError> {
        let list = self.flusher.flush(picture)?;
        let mut encoder = self.encode(&list);
        self.flusher.reclaim(list);

        let root = self
            .root
            .as_ref()
            .ok_or_else(|| RendererError::Readback("no destination target".to_string()))?;
        let (width, height) = (root.width, root.height);
        let row_bytes = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lumen Readback Buffer"),
            size: padded_row_bytes as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            root.color.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RendererError::Readback(e.to_string()))?
            .map_err(|e| RendererError::Readback(e.to_string()))?;

        let swap_channels = matches!(
            self.color_format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        );
        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded_row_bytes as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();

        if swap_channels {
            for texel in pixels.chunks_exact_mut(4) {
                texel.swap(0, 2);
            }
        }
        Ok(pixels)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encoding
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload everything `list` needs and record its passes
    fn encode(&mut self, list: &CommandList) -> wgpu::CommandEncoder {
        self.upload_geometry(list);
        self.upload_uniforms(list);
        self.upload_images(list);
        let gradients = self.upload_gradients(list);
        let root = self.take_root(list.width, list.height);
        self.prepare_pipelines(list, root.samples);

        let mut frame = Frame {
            targets: FxHashMap::default(),
            gradients,
            scissors: FxHashMap::default(),
        };
        frame.targets.insert(TargetId::SURFACE, root);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Lumen Render Encoder"),
            });

        let commands = &list.commands;
        let mut draw_index = 0u32;
        let mut i = 0;
        while i < commands.len() {
            match &commands[i] {
                GpuCommand::AllocateTarget(desc) => {
                    let target = self.acquire_target(desc);
                    frame.targets.insert(desc.id, target);
                    frame.scissors.insert(desc.id, None);
                    i += 1;
                }
                GpuCommand::ReleaseTarget(id) => {
                    if let Some(target) = frame.targets.remove(id) {
                        self.release_target(target);
                    }
                    i += 1;
                }
                GpuCommand::BindTarget { target, clear } => {
                    let start = i + 1;
                    let end = commands[start..]
                        .iter()
                        .position(|c| !matches!(c, GpuCommand::SetScissor(_) | GpuCommand::Draw(_)))
                        .map_or(commands.len(), |p| start + p);
                    self.encode_pass(
                        &mut encoder,
                        &mut frame,
                        *target,
                        *clear,
                        &commands[start..end],
                        &mut draw_index,
                    );
                    i = end;
                }
                GpuCommand::Draw(_) => {
                    tracing::warn!("Draw with no bound target at command {}", i);
                    draw_index += 1;
                    i += 1;
                }
                GpuCommand::SetScissor(_) => i += 1,
            }
        }

        let Frame { mut targets, .. } = frame;
        self.root = targets.remove(&TargetId::SURFACE);
        for (_, target) in targets.drain() {
            self.release_target(target);
        }
        encoder
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &mut Frame,
        target_id: TargetId,
        clear: bool,
        commands: &[GpuCommand],
        draw_index: &mut u32,
    ) {
        let Some(target) = frame.targets.get(&target_id) else {
            tracing::warn!("Bind of unallocated target {:?}", target_id);
            *draw_index += commands
                .iter()
                .filter(|c| matches!(c, GpuCommand::Draw(_)))
                .count() as u32;
            return;
        };

        let (view, resolve_target) = match &target.msaa {
            Some(msaa) => (&msaa.view, Some(&target.color.view)),
            None => (&target.color.view, None),
        };
        let (color_load, depth_load, stencil_load) = if clear {
            (
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                wgpu::LoadOp::Clear(1.0),
                wgpu::LoadOp::Clear(0),
            )
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lumen Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.stencil.view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: stencil_load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_vertex_buffer(0, self.buffers.vertices.slice(..));
        pass.set_index_buffer(self.buffers.indices.slice(..), wgpu::IndexFormat::Uint32);

        let resumed = frame.scissors.get(&target_id).copied().flatten();
        Self::apply_scissor(&mut pass, resumed, target);

        for command in commands {
            match command {
                GpuCommand::SetScissor(rect) => {
                    frame.scissors.insert(target_id, *rect);
                    Self::apply_scissor(&mut pass, *rect, target);
                }
                GpuCommand::Draw(call) => {
                    let offset = *draw_index as u64 * UNIFORM_STRIDE;
                    *draw_index += 1;
                    let Some(pipeline) = self.pipelines.get(&PipelineKey::new(call, target.samples)) else {
                        tracing::warn!("Missing pipeline for {:?}", call.program);
                        continue;
                    };
                    let textures = self.texture_bind_group(frame, call);
                    pass.set_pipeline(pipeline);
                    pass.set_stencil_reference(stencil_reference(call.program));
                    pass.set_bind_group(0, &self.buffers.uniform_bind_group, &[offset as u32]);
                    pass.set_bind_group(1, &textures, &[]);
                    pass.draw_indexed(
                        call.first_index..call.first_index + call.index_count,
                        call.base_vertex as i32,
                        0..1,
                    );
                }
                _ => {}
            }
        }
    }

    fn apply_scissor(pass: &mut wgpu::RenderPass<'_>, rect: Option<DeviceRect>, target: &RenderTarget) {
        match rect {
            Some(rect) => {
                let x = rect.x.min(target.width);
                let y = rect.y.min(target.height);
                let width = rect.width.min(target.width - x);
                let height = rect.height.min(target.height - y);
                pass.set_scissor_rect(x, y, width, height);
            }
            None => pass.set_scissor_rect(0, 0, target.width, target.height),
        }
    }

    fn texture_bind_group(&self, frame: &Frame, call: &DrawCall) -> wgpu::BindGroup {
        let main = self.resolve_view(frame, call.texture);
        let shader = self.resolve_view(frame, call.shader_texture);
        let shader_sampler = match call.shader_texture {
            Some(TextureSource::Gradient(_)) => &self.samplers.linear,
            _ => self.samplers.get(call.filter_mode),
        };
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lumen Texture Bind Group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(main),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(self.samplers.get(call.filter_mode)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(shader),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(shader_sampler),
                },
            ],
        })
    }

    fn resolve_view<'a>(&'a self, frame: &'a Frame, source: Option<TextureSource>) -> &'a wgpu::TextureView {
        let view = match source {
            None => None,
            Some(TextureSource::Target(id)) => frame.targets.get(&id).map(|t| &t.color.view),
            Some(TextureSource::Image(id)) => self.images.peek(&id).map(|t| &t.view),
            Some(TextureSource::Gradient(index)) => frame.gradients.get(index as usize).map(|t| &t.view),
        };
        view.unwrap_or(&self.blank.view)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Uploads
    // ─────────────────────────────────────────────────────────────────────────

    fn upload_geometry(&mut self, list: &CommandList) {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&list.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&list.indices);
        let draw_count = list.draws().count() as u64;

        let needs_growth = vertex_bytes.len() as u64 > self.buffers.vertices.size()
            || index_bytes.len() as u64 > self.buffers.indices.size()
            || draw_count * UNIFORM_STRIDE > self.buffers.uniforms.size();
        if needs_growth {
            let grow = |needed: u64, current: u64| needed.max(current).next_power_of_two();
            self.buffers = Self::create_buffers(
                &self.device,
                &self.uniform_layout,
                grow(vertex_bytes.len() as u64, self.buffers.vertices.size()),
                grow(index_bytes.len() as u64, self.buffers.indices.size()),
                grow(draw_count, self.buffers.uniforms.size() / UNIFORM_STRIDE),
            );
            tracing::debug!(
                "Grew buffers: {} vertex bytes, {} index bytes, {} uniform slots",
                self.buffers.vertices.size(),
                self.buffers.indices.size(),
                self.buffers.uniforms.size() / UNIFORM_STRIDE
            );
        }

        if !vertex_bytes.is_empty() {
            self.queue.write_buffer(&self.buffers.vertices, 0, vertex_bytes);
        }
        if !index_bytes.is_empty() {
            self.queue.write_buffer(&self.buffers.indices, 0, index_bytes);
        }
    }

    fn upload_uniforms(&mut self, list: &CommandList) {
        let mut staging = Vec::with_capacity(list.draws().count() * UNIFORM_STRIDE as usize);
        for draw in list.draws() {
            let start = staging.len();
            staging.extend_from_slice(bytemuck::bytes_of(&draw.uniforms));
            staging.resize(start + UNIFORM_STRIDE as usize, 0);
        }
        if !staging.is_empty() {
            self.queue.write_buffer(&self.buffers.uniforms, 0, &staging);
        }
    }

    fn upload_images(&mut self, list: &CommandList) {
        if list.images.len() > IMAGE_CACHE_CAPACITY {
            tracing::warn!(
                "Frame uses {} images, more than the cache holds ({})",
                list.images.len(),
                IMAGE_CACHE_CAPACITY
            );
        }
        for (id, image) in &list.images {
            if self.images.get(id).is_some() {
                continue;
            }
            let texture = GpuTexture::new(
                &self.device,
                "Lumen Image",
                TextureSpec {
                    width: image.width(),
                    height: image.height(),
                    samples: 1,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                },
            );
            Self::write_pixels(&self.queue, &texture.texture, image.pixels(), image.width(), image.height());
            self.images.put(*id, texture);
        }
    }

    fn upload_gradients(&self, list: &CommandList) -> Vec<GpuTexture> {
        list.gradients
            .iter()
            .map(|ramp| {
                let texture = self.device.create_texture_with_data(
                    &self.queue,
                    &wgpu::TextureDescriptor {
                        label: Some("Lumen Gradient Ramp"),
                        size: wgpu::Extent3d {
                            width: GRADIENT_TEXTURE_WIDTH,
                            height: 1,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        usage: wgpu::TextureUsages::TEXTURE_BINDING,
                        view_formats: &[],
                    },
                    wgpu::util::TextureDataOrder::LayerMajor,
                    &ramp.pixels,
                );
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                GpuTexture { texture, view }
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Targets and pipelines
    // ─────────────────────────────────────────────────────────────────────────

    fn take_root(&mut self, width: u32, height: u32) -> RenderTarget {
        let samples = self.config.flusher.msaa_samples;
        match self.root.take() {
            Some(root) if root.matches(width, height, samples) => root,
            _ => RenderTarget::new(&self.device, self.color_format, width, height, samples),
        }
    }

    fn acquire_target(&mut self, desc: &TargetDesc) -> RenderTarget {
        let found = self
            .target_pool
            .iter()
            .position(|t| t.matches(desc.width, desc.height, desc.samples));
        match found {
            Some(index) => self.target_pool.swap_remove(index),
            None => {
                tracing::trace!(
                    "Creating target {}x{} x{}",
                    desc.width,
                    desc.height,
                    desc.samples
                );
                RenderTarget::new(&self.device, self.color_format, desc.width, desc.height, desc.samples)
            }
        }
    }

    fn release_target(&mut self, target: RenderTarget) {
        if self.target_pool.len() < MAX_POOLED_TARGETS {
            self.target_pool.push(target);
        }
    }

    /// Build every pipeline `list` will bind
    fn prepare_pipelines(&mut self, list: &CommandList, root_samples: u32) {
        let mut samples: FxHashMap<TargetId, u32> = FxHashMap::default();
        samples.insert(TargetId::SURFACE, root_samples);
        let mut current = root_samples;

        for command in &list.commands {
            match command {
                GpuCommand::AllocateTarget(desc) => {
                    samples.insert(desc.id, desc.samples);
                }
                GpuCommand::BindTarget { target, .. } => {
                    current = samples.get(target).copied().unwrap_or(1);
                }
                GpuCommand::Draw(call) => {
                    let key = PipelineKey::new(call, current);
                    if !self.pipelines.contains_key(&key) {
                        let pipeline = self.create_pipeline(key, &call.material);
                        self.pipelines.insert(key, pipeline);
                    }
                }
                _ => {}
            }
        }
    }

    fn create_pipeline(&self, key: PipelineKey, material: &Material) -> wgpu::RenderPipeline {
        tracing::debug!(
            "Creating pipeline {:?} blend {:?} stencil {:?} x{}",
            key.program,
            key.blend,
            key.stencil,
            key.samples
        );
        let (blend, write_mask) = if key.program.is_stencil() {
            (None, wgpu::ColorWrites::empty())
        } else {
            (Some(blend_state(material)), wgpu::ColorWrites::ALL)
        };
        let face = stencil_face(key.program, key.stencil);

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Lumen Pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some(VERTEX_ENTRY),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<MeshVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some(fragment_entry(key.program)),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend,
                        write_mask,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: STENCIL_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState {
                        front: face,
                        back: face,
                        read_mask: 0xff,
                        write_mask: 0xff,
                    },
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: key.samples,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_samples() {
        assert_eq!(normalize_samples(0), 1);
        assert_eq!(normalize_samples(2), 1);
        assert_eq!(normalize_samples(4), 4);
        assert_eq!(normalize_samples(8), 4);
    }

    #[test]
    fn test_stencil_references() {
        assert_eq!(stencil_reference(ProgramKind::StencilClear), STENCIL_INSIDE);
        assert_eq!(stencil_reference(ProgramKind::StencilWrite), STENCIL_INSIDE);
        assert_eq!(stencil_reference(ProgramKind::StencilIntersect), 2);
        assert_eq!(stencil_reference(ProgramKind::Fill), STENCIL_INSIDE);
    }

    #[test]
    fn test_stencil_faces() {
        let write = stencil_face(ProgramKind::StencilWrite, StencilMode::Always);
        assert_eq!(write.compare, wgpu::CompareFunction::Equal);
        assert_eq!(write.pass_op, wgpu::StencilOperation::IncrementClamp);

        let clipped = stencil_face(ProgramKind::Fill, StencilMode::Equal);
        assert_eq!(clipped.compare, wgpu::CompareFunction::Equal);
        assert_eq!(clipped.pass_op, wgpu::StencilOperation::Keep);

        let open = stencil_face(ProgramKind::Texture, StencilMode::Always);
        assert_eq!(open.compare, wgpu::CompareFunction::Always);
    }

    #[test]
    fn test_uniform_stride_fits_block() {
        assert!(std::mem::size_of::<DrawUniforms>() as u64 <= UNIFORM_STRIDE);
        assert_eq!(UNIFORM_STRIDE % 256, 0);
    }
}
