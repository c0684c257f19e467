//! Decoded raster images referenced by pictures

use crate::color::Color;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable identity of an image's pixel content
///
/// The GPU executor caches uploaded textures by this id, so two images with
/// the same id must carry the same pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(pub u64);

/// Straight-alpha RGBA8 image
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    id: ImageId,
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl Image {
    pub fn new(id: ImageId, width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Image filled with one color
    pub fn solid(id: ImageId, width: u32, height: u32, color: Color) -> Self {
        let texel = color.to_rgba8();
        let pixels: Vec<u8> = texel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(id, width, height, pixels)
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Drawable: non-empty with exactly `width * height` RGBA texels
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}
