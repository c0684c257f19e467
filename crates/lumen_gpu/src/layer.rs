//! Render layers
//!
//! A [`RenderLayer`] is one render target plus the canvas state drawn into
//! it: a stack of transform [`State`]s, a [`ClipStack`] moving in lock-step
//! with it, and the ordered [`RenderCmd`] log that emission later flattens
//! into GPU commands. Layers nest: [`RenderLayer::add_layer`] records a child
//! both in the child list and inline in the log, marking where the child's
//! target is complete and may be sampled.
//!
//! Every layer works in its own coordinate space. `layer_bounds` is the
//! region of that space covered by the target, which is `width` x `height`
//! physical pixels.

use std::cell::OnceCell;

use lumen_core::{FilterMode, Matrix3, Paint, Rect};
use slotmap::new_key_type;

use crate::clip::{ClipStack, GenId, INVALID_GEN_ID};
use crate::command::{DeviceRect, TargetId};
use crate::mesh::Mesh;
use crate::pool::Poolable;
use crate::shader::{DrawSource, DrawUniforms, Material, ProgramKind};

new_key_type! {
    /// Handle to a pooled render layer
    pub struct LayerId;
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Transform snapshot with lazily derived scale and inverse
#[derive(Clone, Debug, Default)]
pub struct State {
    matrix: Matrix3,
    scale: OnceCell<f32>,
    inverse: OnceCell<Option<Matrix3>>,
}

impl State {
    pub fn new(matrix: Matrix3) -> Self {
        Self {
            matrix,
            scale: OnceCell::new(),
            inverse: OnceCell::new(),
        }
    }

    pub fn matrix(&self) -> &Matrix3 {
        &self.matrix
    }

    pub fn set_matrix(&mut self, matrix: Matrix3) {
        self.matrix = matrix;
        self.scale = OnceCell::new();
        self.inverse = OnceCell::new();
    }

    /// Compose `other` so it applies before the existing transform
    pub fn pre_concat(&mut self, other: &Matrix3) {
        self.set_matrix(self.matrix.concat(other));
    }

    /// Uniform scale factor of the transform
    pub fn scale(&self) -> f32 {
        *self.scale.get_or_init(|| self.matrix.scale_factor())
    }

    pub fn inverse(&self) -> Option<Matrix3> {
        *self.inverse.get_or_init(|| self.matrix.invert())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// One shaded or stencil draw recorded on a layer
#[derive(Clone, Debug)]
pub struct DrawCmd {
    pub program: ProgramKind,
    pub mesh: Mesh,
    pub uniforms: DrawUniforms,
    pub material: Material,
    pub texture: Option<DrawSource>,
    pub shader_texture: Option<DrawSource>,
    pub filter_mode: FilterMode,
}

#[derive(Clone, Debug)]
pub enum RenderCmd {
    /// The child's target is complete from here on
    Layer(LayerId),
    Draw(DrawCmd),
    /// `None` disables the scissor
    Scissor(Option<DeviceRect>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Layer
// ─────────────────────────────────────────────────────────────────────────────

pub struct RenderLayer {
    /// Assigned at emission
    pub target: TargetId,
    /// Target size in physical pixels
    pub width: u32,
    pub height: u32,
    /// Region of layer space covered by the target
    pub layer_bounds: Rect,
    /// Physical pixels per layer unit
    pub pixel_scale: f32,
    pub filter_mode: FilterMode,
    /// Single-sampled target (masks and blur passes)
    pub no_msaa: bool,
    /// Compositing paint applied when the layer is drawn into its parent
    pub paint: Option<Paint>,
    /// Parent transform the layer is composited with
    pub parent_matrix: Matrix3,
    pub states: Vec<State>,
    pub clip_stack: ClipStack,
    pub draws: Vec<RenderCmd>,
    pub children: Vec<LayerId>,
    pub last_clip_gen_id: GenId,
    pub last_clip_bounds: Rect,
    /// Scissor in effect after the recorded commands; a fresh target has none
    pub last_scissor: Option<DeviceRect>,
}

impl Default for RenderLayer {
    fn default() -> Self {
        Self {
            target: TargetId::SURFACE,
            width: 0,
            height: 0,
            layer_bounds: Rect::ZERO,
            pixel_scale: 1.0,
            filter_mode: FilterMode::Bilinear,
            no_msaa: false,
            paint: None,
            parent_matrix: Matrix3::IDENTITY,
            states: vec![State::default()],
            clip_stack: ClipStack::new(),
            draws: Vec::new(),
            children: Vec::new(),
            last_clip_gen_id: INVALID_GEN_ID,
            last_clip_bounds: Rect::ZERO,
            last_scissor: None,
        }
    }
}

impl Poolable for RenderLayer {
    fn clear(&mut self) {
        self.target = TargetId::SURFACE;
        self.width = 0;
        self.height = 0;
        self.layer_bounds = Rect::ZERO;
        self.pixel_scale = 1.0;
        self.filter_mode = FilterMode::Bilinear;
        self.no_msaa = false;
        self.paint = None;
        self.parent_matrix = Matrix3::IDENTITY;
        self.states.clear();
        self.states.push(State::default());
        self.clip_stack.clear();
        self.draws.clear();
        self.children.clear();
        self.last_clip_gen_id = INVALID_GEN_ID;
        self.last_clip_bounds = Rect::ZERO;
        self.last_scissor = None;
    }
}

impl RenderLayer {
    /// Prepare a pooled layer covering `layer_bounds` at `pixel_scale`
    ///
    /// The target is at least one pixel and at most `max_size` on each side.
    pub fn reset(&mut self, layer_bounds: Rect, pixel_scale: f32, max_size: u32) {
        self.clear();
        self.layer_bounds = layer_bounds;
        self.pixel_scale = pixel_scale;
        let to_pixels = |v: f32| ((v * pixel_scale).ceil() as u32).clamp(1, max_size.max(1));
        self.width = to_pixels(layer_bounds.width());
        self.height = to_pixels(layer_bounds.height());
    }

    pub fn state(&self) -> &State {
        // `states` always holds the root state
        &self.states[self.states.len() - 1]
    }

    pub fn state_mut(&mut self) -> &mut State {
        let top = self.states.len() - 1;
        &mut self.states[top]
    }

    pub fn save_count(&self) -> usize {
        self.states.len() - 1
    }

    pub fn save(&mut self) {
        let top = self.state().clone();
        self.states.push(top);
        self.clip_stack.save();
    }

    /// Pop one state; the root state is never popped
    pub fn restore(&mut self) -> bool {
        if self.states.len() <= 1 {
            return false;
        }
        self.states.pop();
        self.clip_stack.restore();
        true
    }

    pub fn add_layer(&mut self, child: LayerId) {
        self.children.push(child);
        self.draws.push(RenderCmd::Layer(child));
    }

    pub fn add_draw(&mut self, draw: DrawCmd) {
        self.draws.push(RenderCmd::Draw(draw));
    }

    /// Record a scissor change; returns false when `scissor` is already set
    pub fn try_add_scissor(&mut self, scissor: Option<DeviceRect>) -> bool {
        if self.last_scissor == scissor {
            return false;
        }
        self.last_scissor = scissor;
        self.draws.push(RenderCmd::Scissor(scissor));
        true
    }

    /// Whether the stencil must be re-rendered for mask `gen_id` over `bounds`
    pub fn must_render_clip(&self, gen_id: GenId, bounds: &Rect) -> bool {
        gen_id == INVALID_GEN_ID
            || self.last_clip_gen_id != gen_id
            || self.last_clip_bounds != *bounds
    }

    pub fn set_last_clip(&mut self, gen_id: GenId, bounds: Rect) {
        self.last_clip_gen_id = gen_id;
        self.last_clip_bounds = bounds;
    }

    /// Convert a layer-space rect to target pixels, rounded out and clamped
    pub fn device_rect(&self, rect: &Rect) -> DeviceRect {
        let lb = &self.layer_bounds;
        if lb.width() <= 0.0 || lb.height() <= 0.0 {
            return DeviceRect::default();
        }
        let sx = self.width as f32 / lb.width();
        let sy = self.height as f32 / lb.height();
        let mapped = Rect::from_ltrb(
            (rect.left() - lb.left()) * sx,
            (rect.top() - lb.top()) * sy,
            (rect.right() - lb.left()) * sx,
            (rect.bottom() - lb.top()) * sy,
        )
        .round_out();

        let clamp = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;
        let left = clamp(mapped.left(), self.width);
        let top = clamp(mapped.top(), self.height);
        let right = clamp(mapped.right(), self.width);
        let bottom = clamp(mapped.bottom(), self.height);
        DeviceRect::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    /// Samples for the target, given the configured MSAA count
    pub fn samples(&self, msaa_samples: u32) -> u32 {
        if self.no_msaa {
            1
        } else {
            msaa_samples.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> RenderLayer {
        let mut layer = RenderLayer::default();
        layer.reset(Rect::new(0.0, 0.0, 100.0, 50.0), 2.0, 16_384);
        layer
    }

    #[test]
    fn test_state_caches_invalidate() {
        let mut state = State::new(Matrix3::scale(2.0, 2.0));
        assert_eq!(state.scale(), 2.0);
        assert!(state.inverse().is_some());

        state.set_matrix(Matrix3::scale(0.0, 3.0));
        assert_eq!(state.scale(), 0.0);
        assert!(state.inverse().is_none());
    }

    #[test]
    fn test_pre_concat_applies_first() {
        let mut state = State::new(Matrix3::translate(10.0, 0.0));
        state.pre_concat(&Matrix3::scale(2.0, 2.0));
        let p = state.matrix().map_point(lumen_core::Point::new(1.0, 1.0));
        assert_eq!(p, lumen_core::Point::new(12.0, 2.0));
    }

    #[test]
    fn test_reset_sizes_target() {
        let layer = layer();
        assert_eq!((layer.width, layer.height), (200, 100));

        let mut tiny = RenderLayer::default();
        tiny.reset(Rect::new(0.0, 0.0, 0.1, 0.0), 1.0, 16_384);
        assert_eq!((tiny.width, tiny.height), (1, 1));

        let mut huge = RenderLayer::default();
        huge.reset(Rect::new(0.0, 0.0, 10_000.0, 10.0), 4.0, 4096);
        assert_eq!(huge.width, 4096);
    }

    #[test]
    fn test_save_restore_lockstep() {
        let mut layer = layer();
        layer.save();
        layer.state_mut().pre_concat(&Matrix3::translate(5.0, 5.0));
        assert_eq!(layer.save_count(), 1);
        assert_eq!(layer.clip_stack.save_count(), 1);

        assert!(layer.restore());
        assert!(layer.state().matrix().is_identity());
        assert_eq!(layer.clip_stack.save_count(), 0);
        assert!(!layer.restore());
    }

    #[test]
    fn test_scissor_dedup() {
        let mut layer = layer();
        assert!(!layer.try_add_scissor(None));
        let rect = Some(DeviceRect::new(0, 0, 10, 10));
        assert!(layer.try_add_scissor(rect));
        assert!(!layer.try_add_scissor(rect));
        assert!(layer.try_add_scissor(None));
        assert_eq!(layer.draws.len(), 2);
    }

    #[test]
    fn test_device_rect_maps_and_clamps() {
        let mut layer = RenderLayer::default();
        layer.reset(Rect::new(10.0, 10.0, 100.0, 100.0), 1.0, 16_384);
        assert_eq!(
            layer.device_rect(&Rect::new(20.0, 20.0, 10.5, 10.0)),
            DeviceRect::new(10, 10, 11, 10)
        );
        assert_eq!(
            layer.device_rect(&Rect::new(0.0, 0.0, 200.0, 200.0)),
            DeviceRect::new(0, 0, 100, 100)
        );
    }

    #[test]
    fn test_must_render_clip() {
        let mut layer = layer();
        let bounds = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(layer.must_render_clip(5, &bounds));
        layer.set_last_clip(5, bounds);
        assert!(!layer.must_render_clip(5, &bounds));
        assert!(layer.must_render_clip(6, &bounds));
        assert!(layer.must_render_clip(5, &Rect::new(0.0, 0.0, 11.0, 10.0)));
    }

    #[test]
    fn test_add_layer_records_marker() {
        let mut pool = crate::pool::Pool::<LayerId, RenderLayer>::new();
        let parent = pool.acquire();
        let child = pool.acquire();
        pool[parent].add_layer(child);
        assert_eq!(pool[parent].children, vec![child]);
        assert!(matches!(pool[parent].draws[0], RenderCmd::Layer(id) if id == child));
    }
}
