//! WGSL programs
//!
//! One module holds every program. All of them share a vertex stage and the
//! same bindings:
//!
//! - group 0, binding 0: [`DrawUniforms`](crate::shader::DrawUniforms) at a
//!   dynamic offset
//! - group 1: the mesh texture and sampler (layers, images, atlases, masks),
//!   then the paint shader texture and sampler (gradient ramps, image
//!   shaders)
//!
//! Fragment outputs are premultiplied. Images and gradient ramps are stored
//! straight-alpha and premultiplied on sampling; render targets are already
//! premultiplied.

use crate::shader::ProgramKind;

/// Vertex entry point shared by all programs
pub const VERTEX_ENTRY: &str = "vs_main";

/// Fragment entry point of `program`
pub fn fragment_entry(program: ProgramKind) -> &'static str {
    match program {
        ProgramKind::Fill => "fs_fill",
        ProgramKind::Stroke => "fs_stroke",
        ProgramKind::Texture => "fs_texture",
        ProgramKind::Blur => "fs_blur",
        ProgramKind::ShadowBox => "fs_shadow_box",
        ProgramKind::ShadowRoundBox => "fs_shadow_round_box",
        ProgramKind::StencilClear | ProgramKind::StencilWrite | ProgramKind::StencilIntersect => {
            "fs_stencil"
        }
    }
}

/// All Lumen programs
pub const LUMEN_SHADER: &str = r#"
// ============================================================================
// Lumen Programs
// ============================================================================

struct DrawUniforms {
    // Target layer bounds (x, y, w, h)
    viewport: vec4<f32>,
    // Mesh-local to layer transform, row-major
    mesh_matrix: array<vec4<f32>, 3>,
    // Mesh-local to paint shader space, row-major
    shader_matrix: array<vec4<f32>, 3>,
    // Straight-alpha paint color
    color: vec4<f32>,
    // Gradient edge colors, used outside 0..1 when clamping
    left_color: vec4<f32>,
    right_color: vec4<f32>,
    // Analytic shadow rect (l, t, r, b)
    shadow_box: vec4<f32>,
    // Blur taps, four per vector
    kernel: array<vec4<f32>, 7>,
    image_increment: vec2<f32>,
    alpha: f32,
    stroke_mult: f32,
    paint_pass: u32,
    tile_mode: u32,
    tex_mode: u32,
    blur_radius: f32,
    sweep_bias: f32,
    sweep_scale: f32,
    shadow_sigma: f32,
    shadow_corner: f32,
}

// Paint passes
const PASS_SOLID: u32 = 0u;
const PASS_LINEAR: u32 = 1u;
const PASS_RADIAL: u32 = 2u;
const PASS_SWEEP: u32 = 3u;
const PASS_IMAGE: u32 = 4u;

// Tile modes
const TILE_CLAMP: u32 = 0u;
const TILE_REPEAT: u32 = 1u;
const TILE_MIRROR: u32 = 2u;

// Texture modes
const TEX_IMAGE: u32 = 0u;
const TEX_TARGET: u32 = 1u;
const TEX_ALPHA: u32 = 2u;

const TAU: f32 = 6.283185307179586;
const GRADIENT_WIDTH: f32 = 256.0;

@group(0) @binding(0) var<uniform> u: DrawUniforms;

@group(1) @binding(0) var t_main: texture_2d<f32>;
@group(1) @binding(1) var s_main: sampler;
@group(1) @binding(2) var t_shader: texture_2d<f32>;
@group(1) @binding(3) var s_shader: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    // Mesh-local position, the space paint shaders and shadows work in
    @location(1) local: vec2<f32>,
}

fn transform(rows: array<vec4<f32>, 3>, p: vec2<f32>) -> vec2<f32> {
    let h = vec3<f32>(p, 1.0);
    let x = dot(rows[0].xyz, h);
    let y = dot(rows[1].xyz, h);
    let w = dot(rows[2].xyz, h);
    return vec2<f32>(x, y) / select(1.0, w, abs(w) > 1e-6);
}

// ============================================================================
// Vertex Shader
// ============================================================================

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let p = transform(u.mesh_matrix, in.position);
    let ndc = vec2<f32>(
        (p.x - u.viewport.x) / u.viewport.z * 2.0 - 1.0,
        1.0 - (p.y - u.viewport.y) / u.viewport.w * 2.0,
    );

    var out: VertexOutput;
    out.position = vec4<f32>(ndc, 0.0, 1.0);
    out.uv = in.uv;
    out.local = in.position;
    return out;
}

// ============================================================================
// Paint
// ============================================================================

fn premul(c: vec4<f32>) -> vec4<f32> {
    return vec4<f32>(c.rgb * c.a, c.a);
}

fn tile(t: f32) -> f32 {
    switch u.tile_mode {
        case 1u: {
            return fract(t);
        }
        case 2u: {
            let m = abs(t) % 2.0;
            return select(m, 2.0 - m, m > 1.0);
        }
        default: {
            return clamp(t, 0.0, 1.0);
        }
    }
}

fn gradient(t: f32) -> vec4<f32> {
    if u.tile_mode == TILE_CLAMP {
        if t <= 0.0 {
            return premul(u.left_color);
        }
        if t >= 1.0 {
            return premul(u.right_color);
        }
    }
    let x = (tile(t) * (GRADIENT_WIDTH - 1.0) + 0.5) / GRADIENT_WIDTH;
    return premul(textureSampleLevel(t_shader, s_shader, vec2<f32>(x, 0.5), 0.0));
}

// Premultiplied paint color at a mesh-local position, including draw alpha
fn paint_color(local: vec2<f32>) -> vec4<f32> {
    let s = transform(u.shader_matrix, local);
    var c: vec4<f32>;
    switch u.paint_pass {
        case 1u: {
            c = gradient(s.x);
        }
        case 2u: {
            c = gradient(length(s));
        }
        case 3u: {
            let angle = fract(atan2(s.y, s.x) / TAU);
            c = gradient((angle + u.sweep_bias) * u.sweep_scale);
        }
        case 4u: {
            let uv = vec2<f32>(tile(s.x), tile(s.y));
            c = premul(textureSampleLevel(t_shader, s_shader, uv, 0.0));
        }
        default: {
            return premul(u.color) * u.alpha;
        }
    }
    return c * u.color.a * u.alpha;
}

// Apply the texture mode to a sampled (or blurred) texel
fn shade_texel(texel: vec4<f32>, local: vec2<f32>) -> vec4<f32> {
    switch u.tex_mode {
        case 1u: {
            return texel * u.color.a * u.alpha;
        }
        case 2u: {
            return paint_color(local) * texel.a;
        }
        default: {
            return premul(texel) * u.color.a * u.alpha;
        }
    }
}

@fragment
fn fs_fill(in: VertexOutput) -> @location(0) vec4<f32> {
    return paint_color(in.local);
}

@fragment
fn fs_stroke(in: VertexOutput) -> @location(0) vec4<f32> {
    let edge = 1.0 - abs(in.uv.x * 2.0 - 1.0);
    let coverage = min(1.0, edge * u.stroke_mult) * min(1.0, in.uv.y);
    return paint_color(in.local) * coverage;
}

@fragment
fn fs_texture(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSampleLevel(t_main, s_main, in.uv, 0.0);
    return shade_texel(texel, in.local);
}

// ============================================================================
// Blur
// ============================================================================

@fragment
fn fs_blur(in: VertexOutput) -> @location(0) vec4<f32> {
    let radius = i32(u.blur_radius);
    var sum = vec4<f32>(0.0);
    for (var i = -radius; i <= radius; i++) {
        let k = u32(i + radius);
        let weight = u.kernel[k / 4u][k % 4u];
        let uv = in.uv + f32(i) * u.image_increment;
        sum += textureSampleLevel(t_main, s_main, uv, 0.0) * weight;
    }
    return shade_texel(sum, in.local);
}

// ============================================================================
// Analytic Shadows
// ============================================================================

// Error function approximation (Abramowitz and Stegun 7.1.26)
fn erf(x: f32) -> f32 {
    let s = sign(x);
    let a = abs(x);
    let t = 1.0 / (1.0 + 0.3275911 * a);
    let y = 1.0 - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t + 0.254829592) * t * exp(-a * a);
    return s * y;
}

fn sd_round_box(p: vec2<f32>, b: vec4<f32>, radius: f32) -> f32 {
    let center = (b.xy + b.zw) * 0.5;
    let half_size = (b.zw - b.xy) * 0.5;
    let r = min(radius, min(half_size.x, half_size.y));
    let q = abs(p - center) - half_size + vec2<f32>(r);
    return length(max(q, vec2<f32>(0.0))) + min(max(q.x, q.y), 0.0) - r;
}

@fragment
fn fs_shadow_box(in: VertexOutput) -> @location(0) vec4<f32> {
    let b = u.shadow_box;
    let d = sqrt(2.0) * max(u.shadow_sigma, 1e-3);
    let x = 0.5 * (erf((b.z - in.local.x) / d) - erf((b.x - in.local.x) / d));
    let y = 0.5 * (erf((b.w - in.local.y) / d) - erf((b.y - in.local.y) / d));
    return premul(u.color) * u.alpha * x * y;
}

@fragment
fn fs_shadow_round_box(in: VertexOutput) -> @location(0) vec4<f32> {
    let dist = sd_round_box(in.local, u.shadow_box, u.shadow_corner);
    let d = sqrt(2.0) * max(u.shadow_sigma, 1e-3);
    let coverage = 0.5 * (1.0 - erf(dist / d));
    return premul(u.color) * u.alpha * coverage;
}

// ============================================================================
// Stencil
// ============================================================================

// Color writes are masked off for stencil programs
@fragment
fn fs_stencil(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(0.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse() -> naga::Module {
        naga::front::wgsl::parse_str(LUMEN_SHADER).unwrap()
    }

    #[test]
    fn test_shader_validates() {
        let module = parse();
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        );
        validator.validate(&module).unwrap();
    }

    #[test]
    fn test_every_program_has_entry_point() {
        let module = parse();
        let names: Vec<&str> = module
            .entry_points
            .iter()
            .map(|ep| ep.name.as_str())
            .collect();
        assert!(names.contains(&VERTEX_ENTRY));
        for program in [
            ProgramKind::Fill,
            ProgramKind::Stroke,
            ProgramKind::Texture,
            ProgramKind::Blur,
            ProgramKind::StencilClear,
            ProgramKind::StencilWrite,
            ProgramKind::StencilIntersect,
            ProgramKind::ShadowBox,
            ProgramKind::ShadowRoundBox,
        ] {
            assert!(names.contains(&fragment_entry(program)), "{:?}", program);
        }
    }

    #[test]
    fn test_uniform_struct_matches_rust_layout() {
        let module = parse();
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("DrawUniforms"))
            .unwrap();
        assert_eq!(
            ty.inner.size(module.to_ctx()) as usize,
            std::mem::size_of::<crate::shader::DrawUniforms>()
        );
    }
}
