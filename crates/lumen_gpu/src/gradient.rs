//! Gradient ramp rasterization
//!
//! Every gradient draw samples a 256x1 RGBA lookup texture with the
//! gradient parameter `t`:
//!
//! - The ramp covers `t` in `0..=1` only; the paint program applies the tile
//!   mode before the lookup (clamp uses the edge colors from the uniforms)
//! - Ramps are straight-alpha, like images, and premultiplied in the shader
//! - A command list stores each distinct stop list once, keyed by
//!   [`stops_hash`]

use std::hash::{Hash, Hasher};

use lumen_core::{Color, GradientStop, TileMode};
use rustc_hash::FxHasher;

/// Width of the gradient lookup texture
pub const GRADIENT_TEXTURE_WIDTH: u32 = 256;

/// Rasterized gradient ready for GPU upload
#[derive(Clone, Debug, PartialEq)]
pub struct RasterizedGradient {
    /// RGBA pixel data (256 * 4 bytes)
    pub pixels: [u8; GRADIENT_TEXTURE_WIDTH as usize * 4],
    /// Number of color stops in the source gradient
    pub stop_count: usize,
}

impl RasterizedGradient {
    /// Rasterize `stops` into a 256-wide ramp
    pub fn from_stops(stops: &[GradientStop]) -> Self {
        let mut pixels = [0u8; GRADIENT_TEXTURE_WIDTH as usize * 4];

        for (i, texel) in pixels.chunks_exact_mut(4).enumerate() {
            let t = i as f32 / (GRADIENT_TEXTURE_WIDTH - 1) as f32;
            texel.copy_from_slice(&sample_stops(stops, t).to_rgba8());
        }

        Self {
            pixels,
            stop_count: stops.len(),
        }
    }

    /// Texel at index `i`
    pub fn texel(&self, i: usize) -> [u8; 4] {
        let i = i.min(GRADIENT_TEXTURE_WIDTH as usize - 1) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// Map a raw gradient parameter into `0..=1` (mirrors the WGSL `tile`)
pub fn apply_tile_mode(t: f32, mode: TileMode) -> f32 {
    match mode {
        TileMode::Clamp => t.clamp(0.0, 1.0),
        TileMode::Repeat => t - t.floor(),
        TileMode::Mirror => {
            let t_mod = t.abs() % 2.0;
            if t_mod > 1.0 {
                2.0 - t_mod
            } else {
                t_mod
            }
        }
    }
}

/// Interpolated color at `t`
pub fn sample_stops(stops: &[GradientStop], t: f32) -> Color {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Color::TRANSPARENT;
    };

    if t <= first.offset {
        return first.color;
    }
    if t >= last.offset {
        return last.color;
    }

    for pair in stops.windows(2) {
        let (s0, s1) = (&pair[0], &pair[1]);
        if t >= s0.offset && t <= s1.offset {
            let range = s1.offset - s0.offset;
            if range < 0.0001 {
                return s0.color;
            }
            return Color::lerp(&s0.color, &s1.color, (t - s0.offset) / range);
        }
    }

    last.color
}

/// Identity of a stop list for ramp deduplication
pub fn stops_hash(stops: &[GradientStop]) -> u64 {
    let mut hasher = FxHasher::default();
    stops.len().hash(&mut hasher);
    for stop in stops {
        stop.offset.to_bits().hash(&mut hasher);
        for channel in stop.color.to_array() {
            channel.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}
