//! Recorded pictures
//!
//! A [`Picture`] is an immutable, ordered log of [`DrawCommand`]s plus the
//! bounds of everything it paints. Pictures are produced by a
//! [`PictureRecorder`] (or deserialized) and replayed by the engine exactly
//! once per flush.
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{Color, Paint, PictureRecorder, Rect};
//!
//! let mut recorder = PictureRecorder::new();
//! recorder.save();
//! recorder.clip_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
//! recorder.draw_rect(Rect::new(50.0, 50.0, 100.0, 100.0), Paint::fill(Color::RED));
//! recorder.restore().unwrap();
//!
//! let picture = recorder.end_recording().unwrap();
//! assert_eq!(picture.paint_bounds(), Rect::new(50.0, 50.0, 50.0, 50.0));
//! ```

use crate::error::{PictureError, Result};
use crate::geometry::{Point, RRect, Rect};
use crate::image::Image;
use crate::matrix::Matrix3;
use crate::paint::{Paint, StrokeJoin};
use crate::path::Path;
use crate::text::TextBlob;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded canvas operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DrawCommand {
    // State
    Save,
    SaveLayer {
        bounds: Rect,
        #[serde(default)]
        paint: Paint,
    },
    Restore,

    // Transform (each applies before the existing transform)
    Translate {
        dx: f32,
        dy: f32,
    },
    Scale {
        sx: f32,
        sy: f32,
    },
    Rotate {
        radians: f32,
        #[serde(default)]
        pivot: Option<Point>,
    },
    Skew {
        sx: f32,
        sy: f32,
    },
    Concat {
        matrix: Matrix3,
    },
    SetMatrix {
        matrix: Matrix3,
    },
    ResetMatrix,

    // Clip
    ClipRect {
        rect: Rect,
    },
    #[serde(rename = "clip_rrect")]
    ClipRRect {
        rrect: RRect,
    },
    ClipPath {
        path: Path,
    },

    // Draw
    DrawPath {
        path: Path,
        paint: Paint,
    },
    DrawImage {
        image: Image,
        offset: Point,
        #[serde(default)]
        paint: Paint,
    },
    DrawImageRect {
        image: Image,
        /// Source region in image pixels; `None` is the whole image
        #[serde(default)]
        src: Option<Rect>,
        dst: Rect,
        #[serde(default)]
        paint: Paint,
    },
    DrawImageNine {
        image: Image,
        #[serde(default)]
        src: Option<Rect>,
        /// Stretchable center region in image pixels
        center: Rect,
        dst: Rect,
        #[serde(default)]
        paint: Paint,
    },
    DrawPicture {
        picture: Arc<Picture>,
    },
    DrawTextBlob {
        blob: TextBlob,
        offset: Point,
        paint: Paint,
    },
}

impl DrawCommand {
    /// Short name used in logs, errors and inspection output
    pub fn kind(&self) -> &'static str {
        match self {
            DrawCommand::Save => "save",
            DrawCommand::SaveLayer { .. } => "save_layer",
            DrawCommand::Restore => "restore",
            DrawCommand::Translate { .. } => "translate",
            DrawCommand::Scale { .. } => "scale",
            DrawCommand::Rotate { .. } => "rotate",
            DrawCommand::Skew { .. } => "skew",
            DrawCommand::Concat { .. } => "concat",
            DrawCommand::SetMatrix { .. } => "set_matrix",
            DrawCommand::ResetMatrix => "reset_matrix",
            DrawCommand::ClipRect { .. } => "clip_rect",
            DrawCommand::ClipRRect { .. } => "clip_rrect",
            DrawCommand::ClipPath { .. } => "clip_path",
            DrawCommand::DrawPath { .. } => "draw_path",
            DrawCommand::DrawImage { .. } => "draw_image",
            DrawCommand::DrawImageRect { .. } => "draw_image_rect",
            DrawCommand::DrawImageNine { .. } => "draw_image_nine",
            DrawCommand::DrawPicture { .. } => "draw_picture",
            DrawCommand::DrawTextBlob { .. } => "draw_text_blob",
        }
    }

    /// The transform this command composes onto the current one, if any
    pub fn transform(&self) -> Option<Matrix3> {
        match *self {
            DrawCommand::Translate { dx, dy } => Some(Matrix3::translate(dx, dy)),
            DrawCommand::Scale { sx, sy } => Some(Matrix3::scale(sx, sy)),
            DrawCommand::Rotate { radians, pivot } => Some(match pivot {
                Some(p) => Matrix3::rotate_about(radians, p.x, p.y),
                None => Matrix3::rotate(radians),
            }),
            DrawCommand::Skew { sx, sy } => Some(Matrix3::skew(sx, sy)),
            DrawCommand::Concat { matrix } => Some(matrix),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Picture
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable recorded command log
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Picture {
    commands: Vec<DrawCommand>,
    paint_bounds: Rect,
}

impl Picture {
    /// Wrap an existing command log
    ///
    /// No balance checking happens here; the engine rejects malformed logs
    /// when it replays them.
    pub fn new(commands: Vec<DrawCommand>, paint_bounds: Rect) -> Self {
        Self {
            commands,
            paint_bounds,
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn paint_bounds(&self) -> Rect {
        self.paint_bounds
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recorder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct RecorderState {
    xform: Matrix3,
    scissor: Option<Rect>,
    /// Set when this state was opened by `save_layer`
    layer: bool,
    paint_bounds: Rect,
}

impl RecorderState {
    fn root() -> Self {
        Self {
            xform: Matrix3::IDENTITY,
            scissor: None,
            layer: false,
            paint_bounds: Rect::ZERO,
        }
    }
}

/// Canvas-style builder for [`Picture`]s
///
/// Besides appending commands, the recorder mirrors the transform and clip
/// state so it can compute the picture's paint bounds. Layers record in
/// their own space: the transform resets to identity and the layer bounds
/// become the scissor. On restore, the layer's bounds are mapped back
/// through the parent transform.
#[derive(Debug)]
pub struct PictureRecorder {
    commands: Vec<DrawCommand>,
    states: Vec<RecorderState>,
    device_pixel_ratio: f32,
}

impl Default for PictureRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl PictureRecorder {
    pub fn new() -> Self {
        Self {
            commands: Vec::with_capacity(128),
            states: vec![RecorderState::root()],
            device_pixel_ratio: 1.0,
        }
    }

    /// Device pixel ratio used to size `draw_image` destinations
    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr.max(f32::EPSILON);
        self
    }

    /// Drop everything recorded so far
    pub fn reset(&mut self) {
        self.commands.clear();
        self.states.clear();
        self.states.push(RecorderState::root());
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of open saves
    pub fn save_count(&self) -> usize {
        self.states.len() - 1
    }

    /// Current transform
    pub fn total_matrix(&self) -> Matrix3 {
        self.state().xform
    }

    /// Finish recording
    ///
    /// Fails if any save is still open; the recorder is left untouched in
    /// that case so the caller can restore and retry.
    pub fn end_recording(&mut self) -> Result<Picture> {
        if self.states.len() > 1 {
            return Err(PictureError::UnbalancedSave {
                depth: self.save_count(),
            });
        }
        let paint_bounds = self.state().paint_bounds;
        let commands = std::mem::take(&mut self.commands);
        tracing::trace!(
            commands = commands.len(),
            bounds = ?paint_bounds,
            "picture recorded"
        );
        self.reset();
        Ok(Picture::new(commands, paint_bounds))
    }

    /// Append an arbitrary command, updating the tracked state
    pub fn push(&mut self, command: DrawCommand) -> Result<()> {
        match command {
            DrawCommand::Restore => self.restore(),
            DrawCommand::SaveLayer { bounds, paint } => self.save_layer(bounds, paint),
            other => {
                self.record(other);
                Ok(())
            }
        }
    }

    // ── State ───────────────────────────────────────────────────────────────

    pub fn save(&mut self) {
        self.record(DrawCommand::Save);
    }

    /// Open an offscreen layer composited with `paint` on restore
    pub fn save_layer(&mut self, bounds: Rect, paint: Paint) -> Result<()> {
        let finite = bounds.x().is_finite()
            && bounds.y().is_finite()
            && bounds.width().is_finite()
            && bounds.height().is_finite();
        if !finite || bounds.is_empty() {
            return Err(PictureError::InvalidLayerBounds(bounds));
        }
        self.commands.push(DrawCommand::SaveLayer { bounds, paint });
        self.states.push(RecorderState {
            xform: Matrix3::IDENTITY,
            scissor: Some(bounds),
            layer: true,
            paint_bounds: Rect::ZERO,
        });
        Ok(())
    }

    pub fn restore(&mut self) -> Result<()> {
        if self.states.len() <= 1 {
            return Err(PictureError::UnmatchedRestore);
        }
        self.commands.push(DrawCommand::Restore);
        if let Some(closed) = self.states.pop() {
            if closed.layer {
                let mapped = self.state().xform.map_rect(&closed.paint_bounds);
                self.add_paint_bounds(mapped);
            } else {
                self.state_mut().paint_bounds = closed.paint_bounds;
            }
        }
        Ok(())
    }

    // ── Transform ───────────────────────────────────────────────────────────

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.record(DrawCommand::Translate { dx, dy });
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.record(DrawCommand::Scale { sx, sy });
    }

    pub fn rotate(&mut self, radians: f32) {
        self.record(DrawCommand::Rotate {
            radians,
            pivot: None,
        });
    }

    pub fn rotate_about(&mut self, radians: f32, pivot: Point) {
        self.record(DrawCommand::Rotate {
            radians,
            pivot: Some(pivot),
        });
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.record(DrawCommand::Skew { sx, sy });
    }

    pub fn concat(&mut self, matrix: Matrix3) {
        self.record(DrawCommand::Concat { matrix });
    }

    pub fn set_matrix(&mut self, matrix: Matrix3) {
        self.record(DrawCommand::SetMatrix { matrix });
    }

    pub fn reset_matrix(&mut self) {
        self.record(DrawCommand::ResetMatrix);
    }

    // ── Clip ────────────────────────────────────────────────────────────────

    pub fn clip_rect(&mut self, rect: Rect) {
        self.record(DrawCommand::ClipRect { rect });
    }

    pub fn clip_rrect(&mut self, rrect: RRect) {
        self.record(DrawCommand::ClipRRect { rrect });
    }

    pub fn clip_path(&mut self, path: Path) {
        self.record(DrawCommand::ClipPath { path });
    }

    // ── Draw ────────────────────────────────────────────────────────────────

    pub fn draw_path(&mut self, path: Path, paint: Paint) {
        self.record(DrawCommand::DrawPath { path, paint });
    }

    pub fn draw_rect(&mut self, rect: Rect, paint: Paint) {
        self.draw_path(Path::rect(rect), paint);
    }

    pub fn draw_rrect(&mut self, rrect: RRect, paint: Paint) {
        self.draw_path(Path::rrect(rrect), paint);
    }

    pub fn draw_circle(&mut self, center: Point, radius: f32, paint: Paint) {
        self.draw_path(Path::circle(center, radius), paint);
    }

    pub fn draw_image(&mut self, image: Image, offset: Point, paint: Paint) {
        self.record(DrawCommand::DrawImage {
            image,
            offset,
            paint,
        });
    }

    pub fn draw_image_rect(&mut self, image: Image, src: Option<Rect>, dst: Rect, paint: Paint) {
        self.record(DrawCommand::DrawImageRect {
            image,
            src,
            dst,
            paint,
        });
    }

    pub fn draw_image_nine(
        &mut self,
        image: Image,
        src: Option<Rect>,
        center: Rect,
        dst: Rect,
        paint: Paint,
    ) {
        self.record(DrawCommand::DrawImageNine {
            image,
            src,
            center,
            dst,
            paint,
        });
    }

    pub fn draw_picture(&mut self, picture: impl Into<Arc<Picture>>) {
        self.record(DrawCommand::DrawPicture {
            picture: picture.into(),
        });
    }

    pub fn draw_text_blob(&mut self, blob: TextBlob, offset: Point, paint: Paint) {
        self.record(DrawCommand::DrawTextBlob {
            blob,
            offset,
            paint,
        });
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn state(&self) -> &RecorderState {
        // The root state is never popped.
        &self.states[self.states.len() - 1]
    }

    fn state_mut(&mut self) -> &mut RecorderState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    /// Track and append a command that cannot fail
    fn record(&mut self, command: DrawCommand) {
        self.track(&command);
        self.commands.push(command);
    }

    fn track(&mut self, command: &DrawCommand) {
        if let Some(m) = command.transform() {
            self.state_mut().xform.pre_concat(&m);
            return;
        }

        let xform = self.state().xform;
        let scale = xform.scale_factor();
        match command {
            DrawCommand::Save => {
                let mut copy = self.state().clone();
                copy.layer = false;
                self.states.push(copy);
            }
            DrawCommand::SetMatrix { matrix } => self.state_mut().xform = *matrix,
            DrawCommand::ResetMatrix => self.state_mut().xform = Matrix3::IDENTITY,
            DrawCommand::ClipRect { rect } => self.intersect_scissor(xform.map_rect(rect)),
            DrawCommand::ClipRRect { rrect } => {
                self.intersect_scissor(xform.map_rect(&rrect.outer_rect()))
            }
            DrawCommand::ClipPath { path } => self.intersect_scissor(xform.map_rect(&path.bounds())),
            DrawCommand::DrawPath { path, paint } => {
                let mut local = path.bounds();
                if paint.is_stroke() {
                    let mut outset = paint.stroke_width.max(0.0) * 0.5;
                    if paint.stroke_join == StrokeJoin::Miter {
                        outset *= paint.stroke_miter_limit.max(1.0);
                    }
                    local = local.inflate(outset);
                }
                let device = xform.map_rect(&local);
                self.add_blurred_bounds(device, paint, scale);
            }
            DrawCommand::DrawImage { image, offset, .. } => {
                let dst = Rect::new(
                    offset.x,
                    offset.y,
                    image.width() as f32 / self.device_pixel_ratio,
                    image.height() as f32 / self.device_pixel_ratio,
                );
                self.add_paint_bounds(xform.map_rect(&dst));
            }
            DrawCommand::DrawImageRect { dst, .. } | DrawCommand::DrawImageNine { dst, .. } => {
                self.add_paint_bounds(xform.map_rect(dst));
            }
            DrawCommand::DrawPicture { picture } => {
                self.add_paint_bounds(xform.map_rect(&picture.paint_bounds()));
            }
            DrawCommand::DrawTextBlob {
                blob,
                offset,
                paint,
            } => {
                let ink = blob.shifted_bounds(*offset);
                for shadow in &blob.shadows {
                    let shadow_ink = ink
                        .offset(shadow.offset.x, shadow.offset.y)
                        .inflate(3.0 * shadow.blur_sigma.max(0.0));
                    self.add_paint_bounds(xform.map_rect(&shadow_ink));
                }
                self.add_blurred_bounds(xform.map_rect(&ink), paint, scale);
            }
            // Handled above or by `save_layer`/`restore`.
            DrawCommand::SaveLayer { .. }
            | DrawCommand::Restore
            | DrawCommand::Translate { .. }
            | DrawCommand::Scale { .. }
            | DrawCommand::Rotate { .. }
            | DrawCommand::Skew { .. }
            | DrawCommand::Concat { .. } => {}
        }
    }

    fn intersect_scissor(&mut self, rect: Rect) {
        let state = self.state_mut();
        state.scissor = Some(match state.scissor {
            Some(scissor) => scissor.intersect(&rect),
            None => rect,
        });
    }

    fn add_blurred_bounds(&mut self, bounds: Rect, paint: &Paint, scale: f32) {
        match paint.mask_sigma() {
            Some(sigma) => self.add_paint_bounds(bounds.inflate(3.0 * sigma * scale)),
            None => self.add_paint_bounds(bounds),
        }
    }

    fn add_paint_bounds(&mut self, bounds: Rect) {
        let state = self.state_mut();
        let bounds = match state.scissor {
            Some(scissor) => bounds.intersect(&scissor),
            None => bounds,
        };
        if bounds.is_empty() {
            return;
        }
        state.paint_bounds = state.paint_bounds.union(&bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::paint::MaskFilter;

    #[test]
    fn test_paint_bounds_clamped_to_clip() {
        let mut rec = PictureRecorder::new();
        rec.save();
        rec.clip_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        rec.draw_rect(Rect::new(50.0, 50.0, 100.0, 100.0), Paint::fill(Color::RED));
        rec.restore().unwrap();
        let pic = rec.end_recording().unwrap();
        assert_eq!(pic.paint_bounds(), Rect::from_ltrb(50.0, 50.0, 100.0, 100.0));
        assert_eq!(pic.len(), 4);
    }

    #[test]
    fn test_paint_bounds_follow_transform() {
        let mut rec = PictureRecorder::new();
        rec.translate(10.0, 20.0);
        rec.scale(2.0, 2.0);
        rec.draw_rect(Rect::new(0.0, 0.0, 5.0, 5.0), Paint::default());
        let pic = rec.end_recording().unwrap();
        assert_eq!(pic.paint_bounds(), Rect::from_ltrb(10.0, 20.0, 20.0, 30.0));
    }

    #[test]
    fn test_mask_filter_inflates_bounds() {
        let mut rec = PictureRecorder::new();
        let paint = Paint::fill(Color::BLACK).with_mask_filter(MaskFilter::shadow(2.0));
        rec.draw_rect(Rect::new(10.0, 10.0, 10.0, 10.0), paint);
        let pic = rec.end_recording().unwrap();
        assert_eq!(pic.paint_bounds(), Rect::from_ltrb(4.0, 4.0, 26.0, 26.0));
    }

    #[test]
    fn test_layer_bounds_map_through_parent() {
        let mut rec = PictureRecorder::new();
        rec.translate(100.0, 0.0);
        rec.save_layer(Rect::new(0.0, 0.0, 50.0, 50.0), Paint::opacity(0.5))
            .unwrap();
        // Clamped to the layer bounds.
        rec.draw_rect(Rect::new(25.0, 25.0, 100.0, 100.0), Paint::default());
        rec.restore().unwrap();
        let pic = rec.end_recording().unwrap();
        assert_eq!(pic.paint_bounds(), Rect::from_ltrb(125.0, 25.0, 150.0, 50.0));
    }

    #[test]
    fn test_unbalanced_recording_fails() {
        let mut rec = PictureRecorder::new();
        assert_eq!(rec.restore(), Err(PictureError::UnmatchedRestore));

        rec.save();
        rec.save();
        assert_eq!(
            rec.end_recording(),
            Err(PictureError::UnbalancedSave { depth: 2 })
        );
        rec.restore().unwrap();
        rec.restore().unwrap();
        assert!(rec.end_recording().is_ok());
    }

    #[test]
    fn test_save_layer_rejects_empty_bounds() {
        let mut rec = PictureRecorder::new();
        let err = rec.save_layer(Rect::ZERO, Paint::default());
        assert_eq!(err, Err(PictureError::InvalidLayerBounds(Rect::ZERO)));
        assert!(rec.commands().is_empty());
    }

    #[test]
    fn test_push_routes_through_state_tracking() {
        let mut rec = PictureRecorder::new();
        rec.push(DrawCommand::Save).unwrap();
        assert_eq!(rec.save_count(), 1);
        rec.push(DrawCommand::Restore).unwrap();
        assert_eq!(rec.push(DrawCommand::Restore), Err(PictureError::UnmatchedRestore));
    }

    #[test]
    fn test_nested_picture_bounds() {
        let mut inner = PictureRecorder::new();
        inner.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::default());
        let inner = inner.end_recording().unwrap();

        let mut rec = PictureRecorder::new();
        rec.translate(5.0, 5.0);
        rec.draw_picture(inner);
        let pic = rec.end_recording().unwrap();
        assert_eq!(pic.paint_bounds(), Rect::from_ltrb(5.0, 5.0, 15.0, 15.0));
    }

    #[test]
    fn test_picture_json_roundtrip() {
        let mut rec = PictureRecorder::new();
        rec.save();
        rec.translate(8.0, 4.0);
        rec.clip_rrect(RRect::new(Rect::new(0.0, 0.0, 40.0, 40.0), 6.0));
        rec.draw_rect(Rect::new(5.0, 5.0, 20.0, 20.0), Paint::stroke(Color::BLUE, 2.0));
        rec.restore().unwrap();
        let pic = rec.end_recording().unwrap();

        let json = serde_json::to_string(&pic).unwrap();
        assert!(json.contains("\"op\":\"clip_rrect\""));
        let back: Picture = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pic);
    }
}
