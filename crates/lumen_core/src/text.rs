//! Shaped-text payloads carried by pictures
//!
//! The engine never shapes text itself. A `TextBlob` carries the run and its
//! layout bounds; a glyph shaper supplied by the caller turns it into glyph
//! quads at draw time.

use crate::color::Color;
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Drop shadow painted beneath a text run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextShadow {
    pub offset: Point,
    pub color: Color,
    /// Gaussian sigma; zero draws a hard shadow
    pub blur_sigma: f32,
}

/// One run of text ready for glyph lookup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextBlob {
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
    /// Ink bounds relative to the blob origin
    pub bounds: Rect,
    #[serde(default)]
    pub shadows: SmallVec<[TextShadow; 1]>,
}

impl TextBlob {
    pub fn new(text: impl Into<String>, font_size: f32, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            font_family: String::new(),
            font_size,
            bounds,
            shadows: SmallVec::new(),
        }
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn with_shadow(mut self, shadow: TextShadow) -> Self {
        self.shadows.push(shadow);
        self
    }

    /// Ink bounds once the blob is placed at `offset`
    pub fn shifted_bounds(&self, offset: Point) -> Rect {
        self.bounds.offset(offset.x, offset.y)
    }
}
