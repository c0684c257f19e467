//! Paint description
//!
//! A [`Paint`] bundles everything that decides how a shape's coverage turns
//! into pixels:
//!
//! - **Color and blend**: the base color and how it composites with the
//!   destination
//! - **Style**: fill, or stroke with width/cap/join/miter parameters
//! - **Shader**: an optional gradient or image that replaces the flat color
//! - **Mask filter**: a blur applied to the shape's coverage
//! - **Backdrop**: a filter applied to the content behind a layer (only
//!   meaningful on `save_layer` paints)

use crate::color::Color;
use crate::geometry::Point;
use crate::image::Image;
use crate::matrix::Matrix3;
use crate::picture::Picture;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// How a source color composites with the destination
///
/// The Porter-Duff modes map to fixed-function blending. The separable and
/// non-separable "advanced" modes are accepted in pictures but render as
/// [`BlendMode::SrcOver`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Clear,
    Src,
    Dst,
    #[default]
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcATop,
    DstATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Whether the mode is expressible as a fixed-function Porter-Duff pair
    pub fn is_porter_duff(&self) -> bool {
        matches!(
            self,
            BlendMode::Clear
                | BlendMode::Src
                | BlendMode::Dst
                | BlendMode::SrcOver
                | BlendMode::DstOver
                | BlendMode::SrcIn
                | BlendMode::DstIn
                | BlendMode::SrcOut
                | BlendMode::DstOut
                | BlendMode::SrcATop
                | BlendMode::DstATop
                | BlendMode::Xor
                | BlendMode::Plus
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintStyle {
    #[default]
    Fill,
    Stroke,
}

/// Line cap style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeCap {
    /// Flat cap at the endpoint
    #[default]
    Butt,
    /// Rounded cap extending past the endpoint
    Round,
    /// Square cap extending past the endpoint
    Square,
}

/// Line join style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Texture sampling filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Nearest,
    #[default]
    Bilinear,
}

/// Behavior of a shader outside its natural domain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum TileMode {
    #[default]
    Clamp = 0,
    Repeat = 1,
    Mirror = 2,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shaders
// ─────────────────────────────────────────────────────────────────────────────

/// Gradient color stop
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Position along the gradient (0.0 to 1.0)
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

pub type GradientStops = SmallVec<[GradientStop; 4]>;

/// Color source replacing a paint's flat color
///
/// Every variant carries a `local_matrix` that is applied to canvas-local
/// coordinates before the shader is evaluated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Shader {
    LinearGradient {
        start: Point,
        end: Point,
        stops: GradientStops,
        #[serde(default)]
        tile_mode: TileMode,
        #[serde(default)]
        local_matrix: Matrix3,
    },
    RadialGradient {
        center: Point,
        radius: f32,
        stops: GradientStops,
        #[serde(default)]
        tile_mode: TileMode,
        #[serde(default)]
        local_matrix: Matrix3,
    },
    /// Angular gradient swept from `start_angle` to `end_angle` (radians)
    SweepGradient {
        center: Point,
        start_angle: f32,
        end_angle: f32,
        stops: GradientStops,
        #[serde(default)]
        tile_mode: TileMode,
        #[serde(default)]
        local_matrix: Matrix3,
    },
    Image {
        image: Image,
        #[serde(default)]
        tile_mode: TileMode,
        #[serde(default)]
        local_matrix: Matrix3,
    },
    /// Recorded picture used as a repeating pattern
    Picture {
        picture: Arc<Picture>,
        #[serde(default)]
        tile_mode: TileMode,
        #[serde(default)]
        local_matrix: Matrix3,
    },
}

impl Shader {
    pub fn linear(start: Point, end: Point, stops: impl IntoIterator<Item = GradientStop>) -> Self {
        Shader::LinearGradient {
            start,
            end,
            stops: stops.into_iter().collect(),
            tile_mode: TileMode::Clamp,
            local_matrix: Matrix3::IDENTITY,
        }
    }

    pub fn radial(center: Point, radius: f32, stops: impl IntoIterator<Item = GradientStop>) -> Self {
        Shader::RadialGradient {
            center,
            radius,
            stops: stops.into_iter().collect(),
            tile_mode: TileMode::Clamp,
            local_matrix: Matrix3::IDENTITY,
        }
    }

    pub fn sweep(
        center: Point,
        start_angle: f32,
        end_angle: f32,
        stops: impl IntoIterator<Item = GradientStop>,
    ) -> Self {
        Shader::SweepGradient {
            center,
            start_angle,
            end_angle,
            stops: stops.into_iter().collect(),
            tile_mode: TileMode::Clamp,
            local_matrix: Matrix3::IDENTITY,
        }
    }

    pub fn image(image: Image) -> Self {
        Shader::Image {
            image,
            tile_mode: TileMode::Clamp,
            local_matrix: Matrix3::IDENTITY,
        }
    }

    pub fn with_tile_mode(mut self, mode: TileMode) -> Self {
        match &mut self {
            Shader::LinearGradient { tile_mode, .. }
            | Shader::RadialGradient { tile_mode, .. }
            | Shader::SweepGradient { tile_mode, .. }
            | Shader::Image { tile_mode, .. }
            | Shader::Picture { tile_mode, .. } => *tile_mode = mode,
        }
        self
    }

    pub fn with_local_matrix(mut self, matrix: Matrix3) -> Self {
        match &mut self {
            Shader::LinearGradient { local_matrix, .. }
            | Shader::RadialGradient { local_matrix, .. }
            | Shader::SweepGradient { local_matrix, .. }
            | Shader::Image { local_matrix, .. }
            | Shader::Picture { local_matrix, .. } => *local_matrix = matrix,
        }
        self
    }

    pub fn tile_mode(&self) -> TileMode {
        match self {
            Shader::LinearGradient { tile_mode, .. }
            | Shader::RadialGradient { tile_mode, .. }
            | Shader::SweepGradient { tile_mode, .. }
            | Shader::Image { tile_mode, .. }
            | Shader::Picture { tile_mode, .. } => *tile_mode,
        }
    }

    pub fn local_matrix(&self) -> &Matrix3 {
        match self {
            Shader::LinearGradient { local_matrix, .. }
            | Shader::RadialGradient { local_matrix, .. }
            | Shader::SweepGradient { local_matrix, .. }
            | Shader::Image { local_matrix, .. }
            | Shader::Picture { local_matrix, .. } => local_matrix,
        }
    }

    /// Gradient stops, for the gradient variants
    pub fn stops(&self) -> Option<&[GradientStop]> {
        match self {
            Shader::LinearGradient { stops, .. }
            | Shader::RadialGradient { stops, .. }
            | Shader::SweepGradient { stops, .. } => Some(stops),
            _ => None,
        }
    }

    /// Short name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Shader::LinearGradient { .. } => "linear_gradient",
            Shader::RadialGradient { .. } => "radial_gradient",
            Shader::SweepGradient { .. } => "sweep_gradient",
            Shader::Image { .. } => "image",
            Shader::Picture { .. } => "picture",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// Which part of a blurred coverage mask is kept
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurStyle {
    #[default]
    Normal,
    /// Blurred mask plus the sharp shape on top
    Solid,
    /// Recorded for other backends; the GPU engine draws these as `Normal`
    Outer,
    Inner,
    /// Analytic shadow for rects and rounded rects; other shapes fall back
    /// to `Normal`
    FastShadow,
}

/// Gaussian blur of a single draw's coverage
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskFilter {
    pub style: BlurStyle,
    pub sigma: f32,
}

impl MaskFilter {
    pub fn blur(style: BlurStyle, sigma: f32) -> Self {
        Self { style, sigma }
    }

    /// Analytic drop shadow
    pub fn shadow(sigma: f32) -> Self {
        Self::blur(BlurStyle::FastShadow, sigma)
    }
}

/// Filter applied to whatever lies behind a new layer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageFilter {
    Blur {
        sigma_x: f32,
        sigma_y: f32,
    },
    Matrix {
        transform: Matrix3,
        #[serde(default)]
        filter_mode: FilterMode,
    },
}

impl ImageFilter {
    pub fn blur(sigma_x: f32, sigma_y: f32) -> Self {
        ImageFilter::Blur { sigma_x, sigma_y }
    }

    pub fn matrix(transform: Matrix3, filter_mode: FilterMode) -> Self {
        ImageFilter::Matrix {
            transform,
            filter_mode,
        }
    }

    /// Whether applying the filter leaves the backdrop unchanged
    pub fn is_noop(&self) -> bool {
        match self {
            ImageFilter::Blur { sigma_x, sigma_y } => *sigma_x == 0.0 && *sigma_y == 0.0,
            ImageFilter::Matrix { transform, .. } => transform.is_identity(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paint
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paint {
    pub color: Color,
    pub blend_mode: BlendMode,
    pub style: PaintStyle,
    pub stroke_width: f32,
    pub stroke_cap: StrokeCap,
    pub stroke_join: StrokeJoin,
    pub stroke_miter_limit: f32,
    pub filter_mode: FilterMode,
    pub shader: Option<Shader>,
    pub mask_filter: Option<MaskFilter>,
    pub backdrop: Option<ImageFilter>,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            blend_mode: BlendMode::SrcOver,
            style: PaintStyle::Fill,
            stroke_width: 0.0,
            stroke_cap: StrokeCap::Butt,
            stroke_join: StrokeJoin::Miter,
            stroke_miter_limit: 4.0,
            filter_mode: FilterMode::Bilinear,
            shader: None,
            mask_filter: None,
            backdrop: None,
        }
    }
}

impl Paint {
    /// Solid fill paint
    pub fn fill(color: Color) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    /// Solid stroke paint
    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            color,
            style: PaintStyle::Stroke,
            stroke_width: width,
            ..Default::default()
        }
    }

    /// Layer paint that only scales opacity
    pub fn opacity(alpha: f32) -> Self {
        Self::fill(Color::WHITE.with_alpha(alpha))
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn with_stroke_cap(mut self, cap: StrokeCap) -> Self {
        self.stroke_cap = cap;
        self
    }

    pub fn with_stroke_join(mut self, join: StrokeJoin) -> Self {
        self.stroke_join = join;
        self
    }

    pub fn with_miter_limit(mut self, limit: f32) -> Self {
        self.stroke_miter_limit = limit;
        self
    }

    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    pub fn with_shader(mut self, shader: Shader) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_mask_filter(mut self, filter: MaskFilter) -> Self {
        self.mask_filter = Some(filter);
        self
    }

    pub fn with_backdrop(mut self, filter: ImageFilter) -> Self {
        self.backdrop = Some(filter);
        self
    }

    pub fn is_stroke(&self) -> bool {
        self.style == PaintStyle::Stroke
    }

    /// Coverage-only copy: white, source-over, same geometry parameters
    ///
    /// Used when rendering a shape into a mask that will later be blurred
    /// and tinted.
    pub fn shape_only(&self) -> Self {
        Self {
            style: self.style,
            stroke_width: self.stroke_width,
            stroke_cap: self.stroke_cap,
            stroke_join: self.stroke_join,
            stroke_miter_limit: self.stroke_miter_limit,
            ..Default::default()
        }
    }

    /// Blur sigma of the mask filter, if it has a visible effect
    pub fn mask_sigma(&self) -> Option<f32> {
        self.mask_filter
            .filter(|mf| mf.sigma > 0.0)
            .map(|mf| mf.sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_defaults() {
        let p = Paint::default();
        assert_eq!(p.color, Color::WHITE);
        assert_eq!(p.blend_mode, BlendMode::SrcOver);
        assert_eq!(p.stroke_miter_limit, 4.0);
        assert!(!p.is_stroke());
    }

    #[test]
    fn test_shape_only_keeps_geometry() {
        let p = Paint::stroke(Color::RED, 3.0)
            .with_blend_mode(BlendMode::Multiply)
            .with_stroke_cap(StrokeCap::Round)
            .with_mask_filter(MaskFilter::blur(BlurStyle::Normal, 2.0));
        let shape = p.shape_only();
        assert_eq!(shape.color, Color::WHITE);
        assert_eq!(shape.blend_mode, BlendMode::SrcOver);
        assert!(shape.is_stroke());
        assert_eq!(shape.stroke_width, 3.0);
        assert_eq!(shape.stroke_cap, StrokeCap::Round);
        assert!(shape.mask_filter.is_none());
    }

    #[test]
    fn test_porter_duff_classification() {
        assert!(BlendMode::Xor.is_porter_duff());
        assert!(BlendMode::Plus.is_porter_duff());
        assert!(!BlendMode::Multiply.is_porter_duff());
        assert!(!BlendMode::Luminosity.is_porter_duff());
    }

    #[test]
    fn test_image_filter_noop() {
        assert!(ImageFilter::blur(0.0, 0.0).is_noop());
        assert!(!ImageFilter::blur(0.0, 1.0).is_noop());
        assert!(ImageFilter::matrix(Matrix3::IDENTITY, FilterMode::Nearest).is_noop());
    }

    #[test]
    fn test_mask_sigma_ignores_zero() {
        let p = Paint::fill(Color::BLACK).with_mask_filter(MaskFilter::shadow(0.0));
        assert_eq!(p.mask_sigma(), None);
        let p = p.with_mask_filter(MaskFilter::shadow(4.0));
        assert_eq!(p.mask_sigma(), Some(4.0));
    }
}
