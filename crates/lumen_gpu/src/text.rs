//! Glyph shaping seam
//!
//! The engine never shapes or rasterizes text. A [`GlyphShaper`] supplied by
//! the caller turns a [`TextBlob`] into positioned glyph quads over one atlas
//! image; the flusher only places and blends those quads.

use lumen_core::{Color, Image, ImageId, Rect, TextBlob};

/// A glyph quad over the atlas
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphQuad {
    /// Glyph rect relative to the blob origin
    pub bounds: Rect,
    /// Normalized atlas region
    pub uv_bounds: Rect,
}

/// Result of shaping one blob
#[derive(Clone, Debug, PartialEq)]
pub struct ShapedText {
    pub atlas: Image,
    /// Coverage-only atlas (tinted by the paint); false for color glyphs
    pub alpha_only: bool,
    pub glyphs: Vec<GlyphQuad>,
}

pub trait GlyphShaper {
    /// Shape `blob` for rasterization at `scale` device pixels per unit
    ///
    /// `None` means the atlas is not ready; the draw is skipped.
    fn shape(&mut self, blob: &TextBlob, scale: f32) -> Option<ShapedText>;
}

/// Reserved id of the box shaper's atlas
pub const BOX_ATLAS_ID: ImageId = ImageId(u64::MAX);

/// Advance per character as a fraction of the font size
const BOX_ADVANCE: f32 = 0.6;

/// Shaper that draws every visible character as a filled box
///
/// Stands in for a real shaper in tests and headless tooling. Each
/// non-whitespace character becomes one quad over a single-texel atlas.
#[derive(Clone, Debug)]
pub struct BoxGlyphShaper {
    atlas: Image,
    alpha_only: bool,
}

impl Default for BoxGlyphShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxGlyphShaper {
    pub fn new() -> Self {
        Self {
            atlas: Image::solid(BOX_ATLAS_ID, 1, 1, Color::WHITE),
            alpha_only: true,
        }
    }

    /// Report a color atlas instead, as an emoji run would
    pub fn with_color_atlas(mut self, atlas: Image) -> Self {
        self.atlas = atlas;
        self.alpha_only = false;
        self
    }
}

impl GlyphShaper for BoxGlyphShaper {
    fn shape(&mut self, blob: &TextBlob, _scale: f32) -> Option<ShapedText> {
        if !self.atlas.is_valid() {
            return None;
        }

        let advance = blob.font_size * BOX_ADVANCE;
        let height = blob.bounds.height().min(blob.font_size);
        let glyphs = blob
            .text
            .chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, _)| GlyphQuad {
                bounds: Rect::new(
                    blob.bounds.left() + i as f32 * advance + advance * 0.1,
                    blob.bounds.top(),
                    advance * 0.8,
                    height,
                ),
                uv_bounds: Rect::UNIT,
            })
            .collect();

        Some(ShapedText {
            atlas: self.atlas.clone(),
            alpha_only: self.alpha_only,
            glyphs,
        })
    }
}
