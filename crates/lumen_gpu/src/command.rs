//! Linear GPU command list
//!
//! The flusher's only output. Every render target a frame needs is declared
//! with [`GpuCommand::AllocateTarget`] before its first bind, and child
//! targets are complete before any draw samples them. Geometry for the whole
//! list lives in one shared vertex/index buffer.

use lumen_core::{FilterMode, Image, ImageId};
use rustc_hash::FxHashMap;

use crate::gradient::RasterizedGradient;
use crate::mesh::MeshVertex;
use crate::pool::Poolable;
use crate::shader::{DrawUniforms, Material, ProgramKind};

/// Render target handle, issued per flush
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl TargetId {
    /// The destination surface
    pub const SURFACE: TargetId = TargetId(0);

    pub fn is_surface(&self) -> bool {
        *self == Self::SURFACE
    }
}

/// Pixel rect relative to a target's top-left corner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeviceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DeviceRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether this rect covers the whole `width` x `height` target
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width >= width && self.height >= height
    }
}

/// Offscreen target description
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDesc {
    pub id: TargetId,
    pub width: u32,
    pub height: u32,
    /// MSAA sample count; 1 for mask and blur targets
    pub samples: u32,
    /// Sampling mode when a parent reads this target
    pub filter_mode: FilterMode,
}

/// Texture a draw binds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSource {
    Target(TargetId),
    Image(ImageId),
    /// Index into [`CommandList::gradients`]
    Gradient(u32),
}

/// One indexed draw into the bound target
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: ProgramKind,
    pub material: Material,
    pub uniforms: DrawUniforms,
    /// Texture sampled through mesh uvs
    pub texture: Option<TextureSource>,
    /// Texture sampled by the paint shader (gradient ramp or image shader)
    pub shader_texture: Option<TextureSource>,
    pub filter_mode: FilterMode,
    pub base_vertex: u32,
    pub first_index: u32,
    pub index_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    AllocateTarget(TargetDesc),
    /// Make `target` current; `clear` resets color and stencil first
    BindTarget { target: TargetId, clear: bool },
    /// `None` disables the scissor
    SetScissor(Option<DeviceRect>),
    Draw(DrawCall),
    /// Target content is no longer needed this frame
    ReleaseTarget(TargetId),
}

/// Everything one flush produced
#[derive(Default)]
pub struct CommandList {
    pub commands: Vec<GpuCommand>,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// Images referenced by draws
    pub images: FxHashMap<ImageId, Image>,
    /// Gradient ramps referenced by draws
    pub gradients: Vec<RasterizedGradient>,
    pub(crate) gradient_lookup: FxHashMap<u64, u32>,
    /// Destination size in physical pixels
    pub width: u32,
    pub height: u32,
}

impl Poolable for CommandList {
    fn clear(&mut self) {
        self.commands.clear();
        self.vertices.clear();
        self.indices.clear();
        self.images.clear();
        self.gradients.clear();
        self.gradient_lookup.clear();
        self.width = 0;
        self.height = 0;
    }
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Draws that shade color (not stencil-only)
    pub fn color_draws(&self) -> impl Iterator<Item = &DrawCall> + '_ {
        self.draws().filter(|d| !d.program.is_stencil())
    }

    pub fn stencil_draws(&self) -> impl Iterator<Item = &DrawCall> + '_ {
        self.draws().filter(|d| d.program.is_stencil())
    }

    pub fn scissors(&self) -> impl Iterator<Item = Option<DeviceRect>> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::SetScissor(rect) => Some(*rect),
            _ => None,
        })
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetDesc> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::AllocateTarget(desc) => Some(desc),
            _ => None,
        })
    }

    /// Index of the first command matching `pred`
    pub fn position(&self, pred: impl Fn(&GpuCommand) -> bool) -> Option<usize> {
        self.commands.iter().position(pred)
    }

    /// Ramp index for `stops_hash`, rasterizing on first use
    pub(crate) fn gradient_index(
        &mut self,
        hash: u64,
        rasterize: impl FnOnce() -> RasterizedGradient,
    ) -> u32 {
        if let Some(index) = self.gradient_lookup.get(&hash) {
            return *index;
        }
        let index = self.gradients.len() as u32;
        self.gradients.push(rasterize());
        self.gradient_lookup.insert(hash, index);
        index
    }

    /// Per-kind counts for logs and inspection
    pub fn summary(&self) -> CommandSummary {
        let mut summary = CommandSummary::default();
        for command in &self.commands {
            match command {
                GpuCommand::AllocateTarget(_) => summary.targets += 1,
                GpuCommand::BindTarget { .. } => summary.binds += 1,
                GpuCommand::SetScissor(_) => summary.scissors += 1,
                GpuCommand::Draw(draw) if draw.program.is_stencil() => summary.stencil_draws += 1,
                GpuCommand::Draw(_) => summary.draws += 1,
                GpuCommand::ReleaseTarget(_) => {}
            }
        }
        summary
    }
}

/// Command counts of one list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandSummary {
    pub targets: usize,
    pub binds: usize,
    pub scissors: usize,
    pub draws: usize,
    pub stencil_draws: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{Color, GradientStop};

    #[test]
    fn test_device_rect_covers() {
        assert!(DeviceRect::new(0, 0, 200, 200).covers(200, 200));
        assert!(!DeviceRect::new(1, 0, 199, 200).covers(200, 200));
        assert_eq!(DeviceRect::new(50, 50, 50, 50).right(), 100);
        assert!(DeviceRect::new(5, 5, 0, 3).is_empty());
    }

    #[test]
    fn test_gradient_index_dedup() {
        let stops = [
            GradientStop::new(0.0, Color::RED),
            GradientStop::new(1.0, Color::BLUE),
        ];
        let mut list = CommandList::new();
        let a = list.gradient_index(7, || RasterizedGradient::from_stops(&stops));
        let b = list.gradient_index(7, || RasterizedGradient::from_stops(&stops));
        let c = list.gradient_index(9, || RasterizedGradient::from_stops(&stops));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(list.gradients.len(), 2);

        list.clear();
        assert!(list.gradients.is_empty());
        assert_eq!(list.gradient_index(7, || RasterizedGradient::from_stops(&stops)), 0);
    }

    #[test]
    fn test_summary_counts() {
        let mut list = CommandList::new();
        list.commands.push(GpuCommand::BindTarget {
            target: TargetId::SURFACE,
            clear: true,
        });
        list.commands.push(GpuCommand::SetScissor(None));
        assert_eq!(
            list.summary(),
            CommandSummary {
                binds: 1,
                scissors: 1,
                ..Default::default()
            }
        );
    }
}
