//! Engine configuration presets.
//!
//! [`FlusherConfig`] holds everything the replay engine fixes at
//! construction: destination size, device pixel ratio, and the numeric caps
//! that bound blur, texture and stroke work. [`RendererConfig`] adds the
//! wgpu executor's choices on top.
//!
//! Both load from the `[flusher]` and `[renderer]` tables of a `lumen.toml`:
//!
//! ```toml
//! [flusher]
//! width = 800
//! height = 600
//! device_pixel_ratio = 2.0
//!
//! [renderer]
//! power_preference = "low_power"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a [`PictureFlusher`](crate::PictureFlusher).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlusherConfig {
    /// Destination width in physical pixels.
    pub width: u32,
    /// Destination height in physical pixels.
    pub height: u32,
    /// Physical pixels per logical unit.
    pub device_pixel_ratio: f32,
    /// Sigma above which blurs are downsampled instead of widened.
    pub max_blur_sigma: f32,
    /// Upper bound on the 1-D Gaussian kernel width.
    pub max_kernel_width: usize,
    /// Largest offscreen target dimension or downsample factor.
    pub max_texture_size: u32,
    /// Device stroke widths are clamped to this many pixels.
    pub max_stroke_width: f32,
    /// Flattening tolerance in device pixels.
    pub tessellation_tolerance: f32,
    /// Sample count for offscreen targets that allow MSAA (1 disables it).
    pub msaa_samples: u32,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl FlusherConfig {
    /// Standard configuration for a 1x display.
    pub fn standard() -> Self {
        Self {
            width: 800,
            height: 600,
            device_pixel_ratio: 1.0,
            max_blur_sigma: 4.0,
            max_kernel_width: 25,
            max_texture_size: 16_384,
            max_stroke_width: 200.0,
            tessellation_tolerance: 0.25,
            msaa_samples: 4,
        }
    }

    /// Retina-class display at 2x.
    pub fn hidpi() -> Self {
        Self {
            width: 1600,
            height: 1200,
            device_pixel_ratio: 2.0,
            ..Self::standard()
        }
    }

    /// Testing configuration: small surface, no MSAA for determinism.
    pub fn testing() -> Self {
        Self {
            width: 200,
            height: 200,
            msaa_samples: 1,
            ..Self::standard()
        }
    }

    /// Set the destination size in physical pixels.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the device pixel ratio.
    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    /// Set the MSAA sample count for offscreen targets.
    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    /// Set the flattening tolerance in device pixels.
    pub fn with_tessellation_tolerance(mut self, tolerance: f32) -> Self {
        self.tessellation_tolerance = tolerance;
        self
    }

    /// Set the sigma cap for single-pass blur resolution.
    pub fn with_max_blur_sigma(mut self, sigma: f32) -> Self {
        self.max_blur_sigma = sigma;
        self
    }

    /// Width of one hairline fringe in logical units.
    pub fn fringe_width(&self) -> f32 {
        1.0 / self.device_pixel_ratio
    }

    /// Destination size in logical units.
    pub fn logical_size(&self) -> (f32, f32) {
        (
            self.width as f32 / self.device_pixel_ratio,
            self.height as f32 / self.device_pixel_ratio,
        )
    }

    /// Parse the `[flusher]` table of a TOML document, or a bare table.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(file.flusher.unwrap_or_else(|| file.bare))
    }

    /// Load from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Power preference for adapter selection, mirrored for serde.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(pref: PowerPreference) -> Self {
        match pref {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Configuration for creating a [`GpuRenderer`](crate::GpuRenderer).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Color format for every target (None = Rgba8Unorm).
    #[serde(skip)]
    pub color_format: Option<wgpu::TextureFormat>,
    pub power_preference: PowerPreference,
    #[serde(skip)]
    pub flusher: FlusherConfig,
}

impl RendererConfig {
    pub fn new(flusher: FlusherConfig) -> Self {
        Self {
            flusher,
            ..Default::default()
        }
    }

    pub fn with_color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = Some(format);
        self
    }

    pub fn with_power_preference(mut self, pref: PowerPreference) -> Self {
        self.power_preference = pref;
        self
    }

    /// Parse both the `[renderer]` and `[flusher]` tables of a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = file.renderer.unwrap_or_default();
        config.flusher = file.flusher.unwrap_or_else(|| file.bare);
        Ok(config)
    }

    /// Load from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// On-disk layout of `lumen.toml`
#[derive(Deserialize)]
struct ConfigFile {
    flusher: Option<FlusherConfig>,
    renderer: Option<RendererConfig>,
    #[serde(flatten)]
    bare: FlusherConfig,
}
