//! Lumen GPU Engine
//!
//! Replays [`lumen_core::Picture`]s onto the GPU.
//!
//! # Pipeline
//!
//! - **Flush**: [`PictureFlusher`] walks a picture, tracking transforms and
//!   clips per render layer, and emits a linear [`CommandList`]
//! - **Clip reduction**: rect clips become scissors, everything else is
//!   stenciled, and stencil masks are re-rendered only when they change
//! - **Layers**: `save_layer` renders into an offscreen target composited
//!   on restore, with optional backdrop blur or transform
//! - **Blur**: mask filters blur the draw's coverage with a separable
//!   Gaussian, downsampling large sigmas; rect and rounded-rect shadows take
//!   an analytic fast path
//! - **Execute**: [`GpuRenderer`] runs command lists on wgpu
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{Color, Paint, PictureRecorder, Rect};
//! use lumen_gpu::{FlusherConfig, GpuCommand, PictureFlusher, TargetId};
//!
//! let mut recorder = PictureRecorder::new();
//! recorder.clip_rect(Rect::new(50.0, 50.0, 50.0, 50.0));
//! recorder.draw_rect(Rect::new(0.0, 0.0, 200.0, 200.0), Paint::fill(Color::RED));
//! let picture = recorder.end_recording().unwrap();
//!
//! let mut flusher = PictureFlusher::new(FlusherConfig::testing());
//! let list = flusher.flush(&picture).unwrap();
//! assert!(matches!(
//!     list.commands[0],
//!     GpuCommand::BindTarget { target: TargetId::SURFACE, clear: true }
//! ));
//! ```

pub mod blur;
pub mod clip;
pub mod command;
pub mod config;
pub mod error;
pub mod flusher;
pub mod gradient;
pub mod layer;
pub mod mesh;
pub mod pool;
pub mod renderer;
pub mod shader;
pub mod shaders;
pub mod tessellate;
pub mod text;

pub use blur::{adjust_sigma, gaussian_kernel, BlurParams, Kernel, KernelCache};
pub use clip::{ClipElement, ClipStack, GenId, ReducedClip};
pub use command::{
    CommandList, CommandSummary, DeviceRect, DrawCall, GpuCommand, TargetDesc, TargetId,
    TextureSource,
};
pub use config::{FlusherConfig, PowerPreference, RendererConfig};
pub use error::{ConfigError, FlushError, RendererError, Result};
pub use flusher::PictureFlusher;
pub use gradient::{RasterizedGradient, GRADIENT_TEXTURE_WIDTH};
pub use mesh::{Mesh, MeshVertex};
pub use pool::PoolStats;
pub use renderer::GpuRenderer;
pub use shader::{
    BlendFactor, DrawUniforms, Material, ProgramKind, ShaderPass, StencilMode, TexMode,
};
pub use shaders::LUMEN_SHADER;
pub use tessellate::{LyonTessellator, PathTessellator, StrokeParams};
pub use text::{BoxGlyphShaper, GlyphQuad, GlyphShaper, ShapedText};
