//! Shader dispatch
//!
//! Maps a paint on a mesh to the program, material and uniform block of one
//! GPU draw:
//!
//! - **Program**: which fragment stage runs (fill, stroke, texture, blur,
//!   stencil passes, analytic shadows)
//! - **Material**: fixed-function blend factors plus the stencil test, one
//!   per (blend mode, stencil mode) pair for the life of the cache
//! - **Uniforms**: matrices, colors, gradient and blur parameters, laid out
//!   to match the WGSL `DrawUniforms` struct

use lumen_core::{
    BlendMode, Color, GradientStop, GradientStops, Image, Matrix3, Paint, Point, Rect, Shader,
    TileMode,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{FlushError, Result};
use crate::layer::LayerId;
use crate::mesh::Mesh;

// ─────────────────────────────────────────────────────────────────────────────
// Programs and passes
// ─────────────────────────────────────────────────────────────────────────────

/// GPU program variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Filled triangles shaded by the paint
    Fill,
    /// Stroke triangles with edge coverage from `stroke_mult`
    Stroke,
    /// Textured quad: images, layers, glyph atlases, blurred masks
    Texture,
    /// One pass of the separable Gaussian blur
    Blur,
    /// Reset the stencil to zero over a rect
    StencilClear,
    /// Increment the stencil inside a clip mask
    StencilWrite,
    /// Fold the latest mask into the running clip
    StencilIntersect,
    /// Analytic blurred rect
    ShadowBox,
    /// Analytic blurred rounded rect
    ShadowRoundBox,
}

impl ProgramKind {
    /// Draws that only touch the stencil buffer
    pub fn is_stencil(&self) -> bool {
        matches!(
            self,
            ProgramKind::StencilClear | ProgramKind::StencilWrite | ProgramKind::StencilIntersect
        )
    }

    /// Draws that sample a texture through mesh uvs
    pub fn samples_texture(&self) -> bool {
        matches!(self, ProgramKind::Texture | ProgramKind::Blur)
    }
}

/// Paint color source (must match shader constants)
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShaderPass {
    #[default]
    Solid = 0,
    Linear = 1,
    Radial = 2,
    Sweep = 3,
    Image = 4,
}

/// How the texture program reads its texture (must match shader constants)
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TexMode {
    /// Straight-alpha image, tinted by the paint alpha
    #[default]
    Image = 0,
    /// Premultiplied render target, tinted by the paint alpha
    Target = 1,
    /// Coverage only: paint color times texture alpha
    Alpha = 2,
}

/// Stencil test applied to a shaded draw
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilMode {
    /// Ignore the stencil
    #[default]
    Always,
    /// Draw only where the stencil equals the clip reference (inside the
    /// clip)
    Equal,
}

// ─────────────────────────────────────────────────────────────────────────────
// Materials
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-function blend factor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl From<BlendFactor> for wgpu::BlendFactor {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        }
    }
}

/// Source and destination factors for premultiplied colors, or `None` for
/// modes with no fixed-function equivalent
pub fn blend_factors(mode: BlendMode) -> Option<(BlendFactor, BlendFactor)> {
    use BlendFactor::*;
    Some(match mode {
        BlendMode::SrcOver => (One, OneMinusSrcAlpha),
        BlendMode::SrcIn => (DstAlpha, Zero),
        BlendMode::SrcOut => (OneMinusDstAlpha, Zero),
        BlendMode::SrcATop => (DstAlpha, OneMinusSrcAlpha),
        BlendMode::DstOver => (OneMinusDstAlpha, One),
        BlendMode::DstIn => (Zero, SrcAlpha),
        BlendMode::DstOut => (Zero, OneMinusSrcAlpha),
        BlendMode::DstATop => (OneMinusDstAlpha, SrcAlpha),
        BlendMode::Plus => (One, One),
        BlendMode::Src => (One, Zero),
        BlendMode::Dst => (Zero, One),
        BlendMode::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
        BlendMode::Clear => (Zero, Zero),
        _ => return None,
    })
}

/// Blend and stencil state of a draw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Material {
    /// Stable per cache, in creation order
    pub id: u32,
    /// Blend mode actually rendered (advanced modes resolve to source-over)
    pub blend: BlendMode,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub stencil: StencilMode,
}

/// One material per (blend mode, stencil mode) pair
#[derive(Default)]
pub struct MaterialCache {
    materials: FxHashMap<(BlendMode, StencilMode), Material>,
    warned: FxHashSet<BlendMode>,
}

impl MaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, blend: BlendMode, stencil: StencilMode) -> Material {
        let resolved = match blend_factors(blend) {
            Some(_) => blend,
            None => {
                if self.warned.insert(blend) {
                    tracing::warn!(
                        "Blend mode {:?} has no fixed-function equivalent, using SrcOver",
                        blend
                    );
                }
                BlendMode::SrcOver
            }
        };

        let next_id = self.materials.len() as u32;
        *self
            .materials
            .entry((resolved, stencil))
            .or_insert_with(|| {
                let (src_factor, dst_factor) = blend_factors(resolved)
                    .unwrap_or((BlendFactor::One, BlendFactor::OneMinusSrcAlpha));
                Material {
                    id: next_id,
                    blend: resolved,
                    src_factor,
                    dst_factor,
                    stencil,
                }
            })
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Uniforms
// ─────────────────────────────────────────────────────────────────────────────

/// Per-draw uniform block (matches shader `DrawUniforms` struct)
///
/// Memory layout:
/// - viewport: `vec4<f32>`                (16 bytes) - layer bounds (x, y, w, h)
/// - mesh_matrix: `array<vec4<f32>, 3>`   (48 bytes) - mesh to layer rows
/// - shader_matrix: `array<vec4<f32>, 3>` (48 bytes) - mesh to shader space rows
/// - color: `vec4<f32>`                   (16 bytes) - straight-alpha paint color
/// - left_color: `vec4<f32>`              (16 bytes) - first gradient stop
/// - right_color: `vec4<f32>`             (16 bytes) - last gradient stop
/// - shadow_box: `vec4<f32>`              (16 bytes) - shadow rect (l, t, r, b)
/// - kernel: `array<vec4<f32>, 7>`        (112 bytes) - blur taps
/// - image_increment: `vec2<f32>`         (8 bytes) - blur step in uv
/// - alpha, stroke_mult: `f32` x2         (8 bytes)
/// - pass, tile_mode, tex_mode: `u32` x3  (12 bytes)
/// - blur_radius, sweep_bias, sweep_scale,
///   shadow_sigma, shadow_corner: `f32` x5 (20 bytes)
/// Total: 336 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub viewport: [f32; 4],
    pub mesh_matrix: [[f32; 4]; 3],
    pub shader_matrix: [[f32; 4]; 3],
    pub color: [f32; 4],
    pub left_color: [f32; 4],
    pub right_color: [f32; 4],
    pub shadow_box: [f32; 4],
    pub kernel: [[f32; 4]; 7],
    pub image_increment: [f32; 2],
    pub alpha: f32,
    pub stroke_mult: f32,
    pub pass: u32,
    pub tile_mode: u32,
    pub tex_mode: u32,
    pub blur_radius: f32,
    pub sweep_bias: f32,
    pub sweep_scale: f32,
    pub shadow_sigma: f32,
    pub shadow_corner: f32,
}

/// Maximum blur taps the uniform block can carry
pub const MAX_KERNEL_TAPS: usize = 28;

impl DrawUniforms {
    /// Identity-placed solid white draw on a layer spanning `viewport`
    pub fn new(viewport: Rect) -> Self {
        let identity = Matrix3::IDENTITY.to_padded_rows();
        Self {
            viewport: [
                viewport.x(),
                viewport.y(),
                viewport.width(),
                viewport.height(),
            ],
            mesh_matrix: identity,
            shader_matrix: identity,
            color: Color::WHITE.to_array(),
            alpha: 1.0,
            stroke_mult: 1.0,
            ..bytemuck::Zeroable::zeroed()
        }
    }

    pub fn set_mesh_matrix(&mut self, matrix: Option<&Matrix3>) {
        self.mesh_matrix = matrix.unwrap_or(&Matrix3::IDENTITY).to_padded_rows();
    }

    pub fn set_kernel(&mut self, taps: &[f32]) {
        self.kernel = [[0.0; 4]; 7];
        for (i, tap) in taps.iter().take(MAX_KERNEL_TAPS).enumerate() {
            self.kernel[i / 4][i % 4] = *tap;
        }
        self.blur_radius = (taps.len().min(MAX_KERNEL_TAPS) / 2) as f32;
    }

    pub fn pass(&self) -> ShaderPass {
        match self.pass {
            1 => ShaderPass::Linear,
            2 => ShaderPass::Radial,
            3 => ShaderPass::Sweep,
            4 => ShaderPass::Image,
            _ => ShaderPass::Solid,
        }
    }

    /// Paint color as stored (straight alpha)
    pub fn color(&self) -> Color {
        let [r, g, b, a] = self.color;
        Color::rgba(r, g, b, a)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Texture a draw reads, resolved to a GPU binding at emission
#[derive(Clone, Debug, PartialEq)]
pub enum DrawSource {
    /// A render layer's target
    Layer(LayerId),
    Image(Image),
    /// Gradient ramp rasterized from these stops
    Gradient {
        stops: GradientStops,
        tile_mode: TileMode,
    },
}

/// Transform placement context of a draw
#[derive(Clone, Copy, Debug)]
pub struct ShadeContext<'a> {
    /// Current canvas transform of the target layer
    pub state_matrix: &'a Matrix3,
    /// Its inverse, if invertible
    pub state_inverse: Option<Matrix3>,
    /// Target layer bounds
    pub viewport: Rect,
}

/// Uniforms plus the shader texture of one shaded draw
#[derive(Clone, Debug)]
pub struct Shading {
    pub uniforms: DrawUniforms,
    pub shader_source: Option<DrawSource>,
}

/// Map from mesh-local positions to canvas-local positions
fn shader_base(mesh: &Mesh, ctx: &ShadeContext<'_>) -> Matrix3 {
    let inverse = ctx.state_inverse.unwrap_or(Matrix3::IDENTITY);
    match &mesh.matrix {
        Some(m) if m == ctx.state_matrix => Matrix3::IDENTITY,
        Some(m) => inverse.concat(m),
        None => inverse,
    }
}

fn edge_colors(stops: &[GradientStop]) -> (Color, Color) {
    let left = stops.first().map(|s| s.color).unwrap_or(Color::TRANSPARENT);
    let right = stops.last().map(|s| s.color).unwrap_or(Color::TRANSPARENT);
    (left, right)
}

/// Fill the uniform block for `paint` drawn with `mesh`
///
/// Degenerate gradients (zero length, zero radius, empty sweep, a single
/// stop) draw as their last stop color. An image shader with invalid pixel
/// data yields `None` and the draw is skipped. A picture shader cannot be
/// drawn and fails the flush.
pub fn shade(paint: &Paint, mesh: &Mesh, ctx: &ShadeContext<'_>) -> Result<Option<Shading>> {
    if let Some(Shader::Image { image, .. }) = &paint.shader {
        if !image.is_valid() {
            tracing::warn!("Image shader {:?} has invalid pixel data, skipping draw", image.id());
            return Ok(None);
        }
    }
    shade_paint(paint, mesh, ctx).map(Some)
}

fn shade_paint(paint: &Paint, mesh: &Mesh, ctx: &ShadeContext<'_>) -> Result<Shading> {
    let mut uniforms = DrawUniforms::new(ctx.viewport);
    uniforms.set_mesh_matrix(mesh.matrix.as_ref());
    uniforms.color = paint.color.to_array();

    let Some(shader) = &paint.shader else {
        return Ok(Shading {
            uniforms,
            shader_source: None,
        });
    };

    let base = shader_base(mesh, ctx);
    uniforms.tile_mode = shader.tile_mode() as u32;

    let solid_fallback = |mut uniforms: DrawUniforms, color: Color| -> Result<Shading> {
        uniforms.pass = ShaderPass::Solid as u32;
        uniforms.color = color.with_alpha(color.a * paint.color.a).to_array();
        Ok(Shading {
            uniforms,
            shader_source: None,
        })
    };

    let (unit, pass) = match shader {
        Shader::LinearGradient { start, end, .. } => {
            let d = *end - *start;
            let mag_sq = d.x * d.x + d.y * d.y;
            if mag_sq <= f32::EPSILON {
                let (_, right) = edge_colors(shader.stops().unwrap_or(&[]));
                return solid_fallback(uniforms, right);
            }
            let rotate = Matrix3::affine(
                d.x / mag_sq,
                d.y / mag_sq,
                0.0,
                -d.y / mag_sq,
                d.x / mag_sq,
                0.0,
            );
            let unit = rotate.concat(&Matrix3::translate(-start.x, -start.y));
            (unit, ShaderPass::Linear)
        }
        Shader::RadialGradient { center, radius, .. } => {
            if *radius <= 0.0 {
                let (_, right) = edge_colors(shader.stops().unwrap_or(&[]));
                return solid_fallback(uniforms, right);
            }
            let unit = Matrix3::scale(1.0 / radius, 1.0 / radius)
                .concat(&Matrix3::translate(-center.x, -center.y));
            (unit, ShaderPass::Radial)
        }
        Shader::SweepGradient {
            center,
            start_angle,
            end_angle,
            ..
        } => {
            let span = end_angle - start_angle;
            if span.abs() <= f32::EPSILON {
                let (_, right) = edge_colors(shader.stops().unwrap_or(&[]));
                return solid_fallback(uniforms, right);
            }
            uniforms.sweep_bias = -start_angle / std::f32::consts::TAU;
            uniforms.sweep_scale = std::f32::consts::TAU / span;
            (
                Matrix3::translate(-center.x, -center.y),
                ShaderPass::Sweep,
            )
        }
        Shader::Image { image, .. } => {
            let unit = Matrix3::scale(1.0 / image.width() as f32, 1.0 / image.height() as f32);
            uniforms.pass = ShaderPass::Image as u32;
            uniforms.shader_matrix = unit
                .concat(shader.local_matrix())
                .concat(&base)
                .to_padded_rows();
            return Ok(Shading {
                uniforms,
                shader_source: Some(DrawSource::Image(image.clone())),
            });
        }
        other => {
            return Err(FlushError::UnsupportedShader { kind: other.kind() });
        }
    };

    let stops = shader.stops().unwrap_or(&[]);
    if stops.len() < 2 {
        let (_, right) = edge_colors(stops);
        return solid_fallback(uniforms, right);
    }

    let (left, right) = edge_colors(stops);
    uniforms.pass = pass as u32;
    uniforms.left_color = left.to_array();
    uniforms.right_color = right.to_array();
    uniforms.shader_matrix = unit
        .concat(shader.local_matrix())
        .concat(&base)
        .to_padded_rows();

    Ok(Shading {
        uniforms,
        shader_source: Some(DrawSource::Gradient {
            stops: stops.iter().copied().collect(),
            tile_mode: shader.tile_mode(),
        }),
    })
}

/// Map a point through padded matrix rows (for tests and inspection)
pub fn map_rows(rows: &[[f32; 4]; 3], p: Point) -> Point {
    let x = rows[0][0] * p.x + rows[0][1] * p.y + rows[0][2];
    let y = rows[1][0] * p.x + rows[1][1] * p.y + rows[1][2];
    let w = rows[2][0] * p.x + rows[2][1] * p.y + rows[2][2];
    if w != 0.0 && w != 1.0 {
        Point::new(x / w, y / w)
    } else {
        Point::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::rect_mesh;
    use lumen_core::{GradientStop, ImageId};

    fn ctx(matrix: &Matrix3) -> ShadeContext<'_> {
        ShadeContext {
            state_matrix: matrix,
            state_inverse: matrix.invert(),
            viewport: Rect::new(0.0, 0.0, 200.0, 200.0),
        }
    }

    fn stops() -> [GradientStop; 2] {
        [
            GradientStop::new(0.0, Color::RED),
            GradientStop::new(1.0, Color::BLUE),
        ]
    }

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 336);
        assert_eq!(std::mem::size_of::<DrawUniforms>() % 16, 0);
    }

    #[test]
    fn test_porter_duff_table() {
        assert_eq!(
            blend_factors(BlendMode::SrcOver),
            Some((BlendFactor::One, BlendFactor::OneMinusSrcAlpha))
        );
        assert_eq!(
            blend_factors(BlendMode::DstOut),
            Some((BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha))
        );
        assert_eq!(
            blend_factors(BlendMode::Clear),
            Some((BlendFactor::Zero, BlendFactor::Zero))
        );
        assert_eq!(blend_factors(BlendMode::Multiply), None);
    }

    #[test]
    fn test_material_cache_per_pair() {
        let mut cache = MaterialCache::new();
        let a = cache.get(BlendMode::SrcOver, StencilMode::Equal);
        let b = cache.get(BlendMode::SrcOver, StencilMode::Equal);
        let c = cache.get(BlendMode::SrcOver, StencilMode::Always);
        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_advanced_blend_falls_back() {
        let mut cache = MaterialCache::new();
        let m = cache.get(BlendMode::Screen, StencilMode::Always);
        assert_eq!(m.blend, BlendMode::SrcOver);
        assert_eq!(m, cache.get(BlendMode::SrcOver, StencilMode::Always));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_solid_paint() {
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, None, Rect::new(0.0, 0.0, 10.0, 10.0));
        let shading = shade(&Paint::fill(Color::RED), &mesh, &ctx(&Matrix3::IDENTITY))
            .unwrap()
            .unwrap();
        assert_eq!(shading.uniforms.pass(), ShaderPass::Solid);
        assert_eq!(shading.uniforms.color(), Color::RED);
        assert!(shading.shader_source.is_none());
    }

    #[test]
    fn test_linear_gradient_maps_endpoints() {
        let state = Matrix3::translate(10.0, 0.0);
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, Some(state), Rect::new(0.0, 0.0, 100.0, 10.0));
        let paint = Paint::fill(Color::WHITE).with_shader(Shader::linear(
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            stops(),
        ));
        let shading = shade(&paint, &mesh, &ctx(&state)).unwrap().unwrap();
        let u = &shading.uniforms;
        assert_eq!(u.pass(), ShaderPass::Linear);
        let mid = map_rows(&u.shader_matrix, Point::new(50.0, 5.0));
        assert!((mid.x - 0.5).abs() < 1e-5);
        assert_eq!(u.left_color, Color::RED.to_array());
        assert_eq!(u.right_color, Color::BLUE.to_array());
        assert!(matches!(
            shading.shader_source,
            Some(DrawSource::Gradient { .. })
        ));
    }

    #[test]
    fn test_layer_space_mesh_uses_inverse() {
        // Mesh vertices already in layer space: positions go through the
        // inverse canvas transform first.
        let state = Matrix3::scale(2.0, 2.0);
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, None, Rect::new(0.0, 0.0, 200.0, 200.0));
        let paint = Paint::fill(Color::WHITE).with_shader(Shader::radial(
            Point::new(50.0, 50.0),
            50.0,
            stops(),
        ));
        let shading = shade(&paint, &mesh, &ctx(&state)).unwrap().unwrap();
        let edge = map_rows(&shading.uniforms.shader_matrix, Point::new(200.0, 100.0));
        assert!((edge.x - 1.0).abs() < 1e-5);
        assert!(edge.y.abs() < 1e-5);
    }

    #[test]
    fn test_sweep_bias_and_scale() {
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, None, Rect::new(0.0, 0.0, 10.0, 10.0));
        let paint = Paint::fill(Color::WHITE).with_shader(Shader::sweep(
            Point::new(5.0, 5.0),
            std::f32::consts::PI,
            std::f32::consts::TAU,
            stops(),
        ));
        let u = shade(&paint, &mesh, &ctx(&Matrix3::IDENTITY))
            .unwrap()
            .unwrap()
            .uniforms;
        assert_eq!(u.pass(), ShaderPass::Sweep);
        assert!((u.sweep_bias + 0.5).abs() < 1e-6);
        assert!((u.sweep_scale - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_gradient_is_solid() {
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, None, Rect::new(0.0, 0.0, 10.0, 10.0));
        let paint = Paint::fill(Color::WHITE.with_alpha(0.5)).with_shader(Shader::linear(
            Point::new(3.0, 3.0),
            Point::new(3.0, 3.0),
            stops(),
        ));
        let u = shade(&paint, &mesh, &ctx(&Matrix3::IDENTITY))
            .unwrap()
            .unwrap()
            .uniforms;
        assert_eq!(u.pass(), ShaderPass::Solid);
        assert_eq!(u.color(), Color::BLUE.with_alpha(0.5));
    }

    #[test]
    fn test_image_shader_scales_to_unit() {
        let image = Image::solid(ImageId(1), 20, 10, Color::GREEN);
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, Some(Matrix3::IDENTITY), Rect::new(0.0, 0.0, 20.0, 10.0));
        let paint = Paint::fill(Color::WHITE).with_shader(Shader::image(image));
        let shading = shade(&paint, &mesh, &ctx(&Matrix3::IDENTITY)).unwrap().unwrap();
        let corner = map_rows(&shading.uniforms.shader_matrix, Point::new(20.0, 10.0));
        assert!((corner.x - 1.0).abs() < 1e-6 && (corner.y - 1.0).abs() < 1e-6);
        assert!(matches!(shading.shader_source, Some(DrawSource::Image(_))));
    }

    #[test]
    fn test_invalid_image_shader_skips_draw() {
        let image = Image::new(ImageId(2), 4, 4, vec![0u8; 3]);
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, None, Rect::new(0.0, 0.0, 10.0, 10.0));
        let paint = Paint::fill(Color::WHITE).with_shader(Shader::image(image));
        assert!(shade(&paint, &mesh, &ctx(&Matrix3::IDENTITY)).unwrap().is_none());
    }

    #[test]
    fn test_picture_shader_is_fatal() {
        let mut mesh = Mesh::new();
        rect_mesh(&mut mesh, None, Rect::new(0.0, 0.0, 10.0, 10.0));
        let shader = Shader::Picture {
            picture: Default::default(),
            tile_mode: TileMode::Repeat,
            local_matrix: Matrix3::IDENTITY,
        };
        let paint = Paint::fill(Color::WHITE).with_shader(shader);
        let err = shade(&paint, &mesh, &ctx(&Matrix3::IDENTITY)).unwrap_err();
        assert_eq!(err, FlushError::UnsupportedShader { kind: "picture" });
    }
}
