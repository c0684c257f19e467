//! Picture replay
//!
//! [`PictureFlusher`] turns one [`Picture`] into one [`CommandList`]:
//!
//! 1. **Replay**: every command runs in order against the current
//!    [`RenderLayer`], mutating its transform and clip state and recording
//!    [`RenderCmd`]s. `save_layer` pushes a child layer; the matching
//!    `restore` composites it back into its parent.
//! 2. **Emit**: the layer tree is walked depth-first, children before the
//!    parent draw that samples them, producing the linear GPU command list.
//!
//! Both phases use explicit stacks, so picture nesting depth is bounded by
//! memory rather than by the call stack. Every layer, mesh and command list
//! comes from a pool and is returned at the end of the flush (command lists
//! when the caller hands them back through [`PictureFlusher::reclaim`]).
//!
//! Unbalanced save/restore and unsupported variants abort the flush. Empty
//! geometry, clipped-out draws, invalid images and missing glyph atlases
//! only skip the draw.

use lumen_core::{
    BlendMode, BlurStyle, Color, DrawCommand, FilterMode, Image, ImageFilter, MaskFilter, Matrix3,
    Paint, Path, Picture, Point, Rect, TextBlob,
};
use smallvec::SmallVec;

use crate::blur::{adjust_sigma, Kernel, KernelCache};
use crate::clip::{ClipGenCounter, ReducedClip};
use crate::command::{
    CommandList, DeviceRect, DrawCall, GpuCommand, TargetDesc, TargetId, TextureSource,
};
use crate::config::FlusherConfig;
use crate::error::{FlushError, Result};
use crate::gradient::{stops_hash, RasterizedGradient};
use crate::layer::{DrawCmd, LayerId, RenderCmd, RenderLayer};
use crate::mesh::{image_mesh, image_mesh_quad, image_nine_mesh, rect_mesh, Mesh};
use crate::pool::{Pool, PoolStats, Recycler};
use crate::shader::{
    shade, DrawSource, DrawUniforms, MaterialCache, ProgramKind, ShadeContext, StencilMode,
    TexMode,
};
use crate::tessellate::{LyonTessellator, PathTessellator, StrokeParams};
use crate::text::{BoxGlyphShaper, GlyphShaper};

// ─────────────────────────────────────────────────────────────────────────────
// Draw requests
// ─────────────────────────────────────────────────────────────────────────────

struct BlurPass {
    kernel: Kernel,
    /// One texel step along the blur axis, in uv units
    increment: [f32; 2],
}

struct ShadowParams {
    /// Shadow-casting rect in mesh-local units
    rect: Rect,
    sigma: f32,
    corner: f32,
}

/// Geometry plus the program parameters a paint does not carry
struct DrawRequest {
    program: ProgramKind,
    mesh: Mesh,
    texture: Option<DrawSource>,
    tex_mode: TexMode,
    filter_mode: FilterMode,
    stroke_mult: f32,
    alpha: f32,
    blur: Option<BlurPass>,
    shadow: Option<ShadowParams>,
}

impl DrawRequest {
    fn new(program: ProgramKind, mesh: Mesh) -> Self {
        Self {
            program,
            mesh,
            texture: None,
            tex_mode: TexMode::Image,
            filter_mode: FilterMode::Bilinear,
            stroke_mult: 1.0,
            alpha: 1.0,
            blur: None,
            shadow: None,
        }
    }

    fn with_texture(mut self, source: DrawSource, mode: TexMode) -> Self {
        self.texture = Some(source);
        self.tex_mode = mode;
        self
    }

    fn with_filter(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    fn with_blur(mut self, kernel: Kernel, increment: [f32; 2]) -> Self {
        self.blur = Some(BlurPass { kernel, increment });
        self
    }
}

/// Emulated stroke width and coverage, in layer units
#[derive(Clone, Copy, Debug, PartialEq)]
struct StrokeGeometry {
    width: f32,
    mult: f32,
    alpha: f32,
}

/// Widen hairlines and sub-fringe strokes to one fringe, fading them by
/// area instead
fn stroke_geometry(device_width: f32, fringe: f32, max_width: f32) -> StrokeGeometry {
    let mut width = device_width.clamp(0.0, max_width.max(0.0));
    let mut alpha = 1.0;
    if width <= 0.0 {
        width = fringe;
    } else if width < fringe {
        let ratio = width / fringe;
        alpha = ratio * ratio;
        width = fringe;
    }
    let half_width = width * 0.5;
    StrokeGeometry {
        width,
        mult: (fringe * 0.5 + half_width * 0.5) / fringe,
        alpha,
    }
}

/// Texture coordinates of `bounds`, placed by `matrix`, within a parent
/// target covering `parent_bounds`
///
/// Corners are in top-left, bottom-left, bottom-right, top-right order.
fn backdrop_uvs(matrix: &Matrix3, bounds: &Rect, parent_bounds: &Rect) -> [Point; 4] {
    let corners = [
        bounds.top_left(),
        bounds.bottom_left(),
        bounds.bottom_right(),
        bounds.top_right(),
    ];
    corners.map(|corner| {
        let p = matrix.map_point(corner);
        Point::new(
            (p.x - parent_bounds.left()) / parent_bounds.width(),
            (p.y - parent_bounds.top()) / parent_bounds.height(),
        )
    })
}

/// Normalize a pixel rect of an image to texture space
fn normalize_rect(rect: Rect, width: f32, height: f32) -> Rect {
    Rect::new(
        rect.x() / width,
        rect.y() / height,
        rect.width() / width,
        rect.height() / height,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Replay and emission frames
// ─────────────────────────────────────────────────────────────────────────────

/// One picture being replayed, with its own save counter
struct ReplayFrame<'p> {
    commands: &'p [DrawCommand],
    next: usize,
    save_count: usize,
}

impl<'p> ReplayFrame<'p> {
    fn new(commands: &'p [DrawCommand]) -> Self {
        Self {
            commands,
            next: 0,
            save_count: 0,
        }
    }
}

/// One layer being emitted
struct EmitFrame {
    layer: LayerId,
    target: TargetId,
    draws: std::vec::IntoIter<RenderCmd>,
    /// Target is the current render pass
    bound: bool,
    /// Target has been cleared this frame
    cleared: bool,
}

impl EmitFrame {
    fn new(layer: LayerId, target: TargetId, draws: Vec<RenderCmd>) -> Self {
        Self {
            layer,
            target,
            draws: draws.into_iter(),
            bound: false,
            cleared: false,
        }
    }

    fn ensure_bound(&mut self, list: &mut CommandList) {
        if self.bound {
            return;
        }
        list.commands.push(GpuCommand::BindTarget {
            target: self.target,
            clear: !self.cleared,
        });
        self.bound = true;
        self.cleared = true;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flusher
// ─────────────────────────────────────────────────────────────────────────────

/// Replays pictures into GPU command lists
///
/// Destination size and device pixel ratio are fixed by the
/// [`FlusherConfig`]; a new size needs a new flusher.
///
/// # Example
///
/// ```rust
/// use lumen_core::{Color, Paint, PictureRecorder, Rect};
/// use lumen_gpu::{FlusherConfig, PictureFlusher};
///
/// let mut recorder = PictureRecorder::new();
/// recorder.draw_rect(Rect::new(10.0, 10.0, 50.0, 50.0), Paint::fill(Color::RED));
/// let picture = recorder.end_recording().unwrap();
///
/// let mut flusher = PictureFlusher::new(FlusherConfig::testing());
/// let list = flusher.flush(&picture).unwrap();
/// assert_eq!(list.color_draws().count(), 1);
/// flusher.reclaim(list);
/// ```
pub struct PictureFlusher<T: PathTessellator = LyonTessellator, S: GlyphShaper = BoxGlyphShaper> {
    config: FlusherConfig,
    tessellator: T,
    shaper: S,
    layers: Pool<LayerId, RenderLayer>,
    /// Open layers; the last one receives commands
    layer_stack: Vec<LayerId>,
    root: LayerId,
    meshes: Recycler<Mesh>,
    lists: Recycler<CommandList>,
    gens: ClipGenCounter,
    kernels: KernelCache,
    materials: MaterialCache,
    next_target: u32,
}

impl PictureFlusher {
    /// Flusher with the lyon tessellator and the box glyph shaper
    pub fn new(config: FlusherConfig) -> Self {
        Self::with_collaborators(config, LyonTessellator::new(), BoxGlyphShaper::new())
    }
}

impl<T: PathTessellator, S: GlyphShaper> PictureFlusher<T, S> {
    pub fn with_collaborators(config: FlusherConfig, tessellator: T, shaper: S) -> Self {
        tracing::debug!(
            "PictureFlusher created: {}x{} @ {}x, msaa {}",
            config.width,
            config.height,
            config.device_pixel_ratio,
            config.msaa_samples
        );
        let kernels = KernelCache::new(config.max_kernel_width);
        Self {
            config,
            tessellator,
            shaper,
            layers: Pool::new(),
            layer_stack: Vec::new(),
            root: LayerId::default(),
            meshes: Recycler::new(),
            lists: Recycler::with_max_idle(4),
            gens: ClipGenCounter::new(),
            kernels,
            materials: MaterialCache::new(),
            next_target: 1,
        }
    }

    pub fn config(&self) -> &FlusherConfig {
        &self.config
    }

    pub fn shaper_mut(&mut self) -> &mut S {
        &mut self.shaper
    }

    pub fn layer_stats(&self) -> PoolStats {
        self.layers.stats()
    }

    pub fn mesh_stats(&self) -> PoolStats {
        self.meshes.stats()
    }

    /// Distinct (blend, stencil) materials created so far
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Replay `picture` and emit its GPU command list
    pub fn flush(&mut self, picture: &Picture) -> Result<CommandList> {
        self.begin_frame();
        if let Err(err) = self.replay(picture) {
            tracing::debug!("Flush aborted: {}", err);
            self.end_frame();
            return Err(err);
        }

        let layers = self.layers.live();
        let list = self.emit();
        self.end_frame();

        tracing::debug!(
            "Flushed picture: {} commands -> {} GPU commands, {} layers, {} targets",
            picture.len(),
            list.len(),
            layers,
            self.next_target - 1
        );
        Ok(list)
    }

    /// Return a consumed command list's buffers for reuse
    pub fn reclaim(&mut self, list: CommandList) {
        self.lists.release(list);
    }

    fn begin_frame(&mut self) {
        self.layers.release_all();
        self.layer_stack.clear();
        self.next_target = 1;

        let (width, height) = self.config.logical_size();
        let root = self.layers.acquire();
        let layer = &mut self.layers[root];
        layer.reset(
            Rect::new(0.0, 0.0, width, height),
            self.config.device_pixel_ratio,
            u32::MAX,
        );
        layer.width = self.config.width.max(1);
        layer.height = self.config.height.max(1);
        layer.target = TargetId::SURFACE;

        self.root = root;
        self.layer_stack.push(root);
    }

    fn end_frame(&mut self) {
        // Draws are still recorded here only when replay aborted
        for layer in self.layers.values_mut() {
            for command in layer.draws.drain(..) {
                if let RenderCmd::Draw(draw) = command {
                    self.meshes.release(draw.mesh);
                }
            }
        }
        self.layers.release_all();
        self.layer_stack.clear();
    }

    fn current(&self) -> LayerId {
        self.layer_stack.last().copied().unwrap_or(self.root)
    }

    fn current_layer_mut(&mut self) -> &mut RenderLayer {
        let id = self.current();
        &mut self.layers[id]
    }

    /// Flattening tolerance in layer-local units
    fn tolerance(&self, id: LayerId) -> f32 {
        let layer = &self.layers[id];
        let device_scale = layer.state().scale() * layer.pixel_scale;
        self.config.tessellation_tolerance / device_scale.max(1e-6)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replay
    // ─────────────────────────────────────────────────────────────────────────

    fn replay(&mut self, picture: &Picture) -> Result<()> {
        let mut frames = vec![ReplayFrame::new(picture.commands())];

        while let Some(frame) = frames.last_mut() {
            let index = frame.next;
            let Some(command) = frame.commands.get(index) else {
                let depth = frame.save_count;
                frames.pop();
                if depth != 0 {
                    return Err(FlushError::UnbalancedPicture { depth });
                }
                if !frames.is_empty() {
                    // Close the save wrapping a nested picture
                    self.restore()?;
                }
                continue;
            };
            frame.next += 1;

            match command {
                DrawCommand::Save => {
                    frame.save_count += 1;
                    self.current_layer_mut().save();
                }
                DrawCommand::SaveLayer { bounds, paint } => {
                    frame.save_count += 1;
                    self.save_layer(*bounds, paint)?;
                }
                DrawCommand::Restore => {
                    if frame.save_count == 0 {
                        return Err(FlushError::UnmatchedRestore { index });
                    }
                    frame.save_count -= 1;
                    self.restore()?;
                }

                DrawCommand::Translate { .. }
                | DrawCommand::Scale { .. }
                | DrawCommand::Rotate { .. }
                | DrawCommand::Skew { .. }
                | DrawCommand::Concat { .. } => {
                    if let Some(matrix) = command.transform() {
                        self.current_layer_mut().state_mut().pre_concat(&matrix);
                    }
                }
                DrawCommand::SetMatrix { matrix } => {
                    self.current_layer_mut().state_mut().set_matrix(*matrix);
                }
                DrawCommand::ResetMatrix => {
                    self.current_layer_mut()
                        .state_mut()
                        .set_matrix(Matrix3::IDENTITY);
                }

                DrawCommand::ClipRect { rect } => self.clip(&Path::rect(*rect)),
                DrawCommand::ClipRRect { rrect } => self.clip(&Path::rrect(*rrect)),
                DrawCommand::ClipPath { path } => self.clip(path),

                DrawCommand::DrawPath { path, paint } => self.draw_path(path, paint)?,
                DrawCommand::DrawImage {
                    image,
                    offset,
                    paint,
                } => self.draw_image(image, *offset, paint)?,
                DrawCommand::DrawImageRect {
                    image,
                    src,
                    dst,
                    paint,
                } => self.draw_image_rect(image, *src, *dst, paint)?,
                DrawCommand::DrawImageNine {
                    image,
                    src,
                    center,
                    dst,
                    paint,
                } => self.draw_image_nine(image, *src, *center, *dst, paint)?,
                DrawCommand::DrawTextBlob {
                    blob,
                    offset,
                    paint,
                } => self.draw_text_blob(blob, *offset, paint)?,
                DrawCommand::DrawPicture { picture: nested } => {
                    self.current_layer_mut().save();
                    frames.push(ReplayFrame::new(nested.commands()));
                }

                other => {
                    return Err(FlushError::UnsupportedCommand { kind: other.kind() });
                }
            }
        }

        Ok(())
    }

    /// Pop one state, or close the current layer if it has none left
    fn restore(&mut self) -> Result<()> {
        if self.current_layer_mut().restore() {
            return Ok(());
        }
        if self.layer_stack.len() > 1 {
            return self.close_layer();
        }
        Ok(())
    }

    fn clip(&mut self, path: &Path) {
        let id = self.current();
        let tolerance = self.tolerance(id);
        let layer = &mut self.layers[id];
        let matrix = *layer.state().matrix();
        layer.clip_stack.clip_path(
            path,
            &matrix,
            tolerance,
            &mut self.tessellator,
            &mut self.gens,
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Layers
    // ─────────────────────────────────────────────────────────────────────────

    fn save_layer(&mut self, bounds: Rect, paint: &Paint) -> Result<()> {
        let parent = self.current();
        let (parent_matrix, pixel_scale) = {
            let layer = &self.layers[parent];
            (
                *layer.state().matrix(),
                layer.pixel_scale * layer.state().scale(),
            )
        };

        let child = self.layers.acquire();
        let layer = &mut self.layers[child];
        layer.reset(bounds, pixel_scale, self.config.max_texture_size);
        layer.filter_mode = paint.filter_mode;
        layer.parent_matrix = parent_matrix;
        layer.paint = Some(paint.clone());
        tracing::trace!(
            "save_layer {:?} -> {}x{} target",
            bounds,
            layer.width,
            layer.height
        );

        self.layers[parent].add_layer(child);
        self.layer_stack.push(child);

        match paint.backdrop {
            Some(filter) if !filter.is_noop() => self.apply_backdrop(parent, child, filter),
            _ => Ok(()),
        }
    }

    /// Composite the current layer into its parent
    fn close_layer(&mut self) -> Result<()> {
        let Some(child) = self.layer_stack.pop() else {
            return Ok(());
        };
        let (bounds, parent_matrix, filter_mode, paint) = {
            let layer = &mut self.layers[child];
            (
                layer.layer_bounds,
                layer.parent_matrix,
                layer.filter_mode,
                layer.paint.take().unwrap_or_default(),
            )
        };

        let mut mesh = self.meshes.acquire();
        image_mesh(&mut mesh, Some(parent_matrix), Rect::UNIT, bounds);
        let composite = Paint::opacity(paint.color.a).with_blend_mode(paint.blend_mode);
        let request = DrawRequest::new(ProgramKind::Texture, mesh)
            .with_texture(DrawSource::Layer(child), TexMode::Target)
            .with_filter(filter_mode);
        self.record_draw(&composite, request)
    }

    /// Single-sampled helper layer over `bounds`, registered under `parent`
    fn push_offscreen(&mut self, parent: LayerId, bounds: Rect, pixel_scale: f32) -> LayerId {
        let id = self.layers.acquire();
        let layer = &mut self.layers[id];
        layer.reset(bounds, pixel_scale, self.config.max_texture_size);
        layer.no_msaa = true;
        self.layers[parent].add_layer(id);
        id
    }

    /// Record `request` into `layer` instead of the current layer
    fn record_into(&mut self, layer: LayerId, paint: &Paint, request: DrawRequest) -> Result<()> {
        self.layer_stack.push(layer);
        let result = self.record_draw(paint, request);
        self.layer_stack.pop();
        result
    }

    /// Seed a new layer with the filtered content of its parent
    fn apply_backdrop(&mut self, parent: LayerId, child: LayerId, filter: ImageFilter) -> Result<()> {
        let (bounds, pixel_scale, parent_matrix) = {
            let layer = &self.layers[child];
            (layer.layer_bounds, layer.pixel_scale, layer.parent_matrix)
        };
        let uvs = backdrop_uvs(&parent_matrix, &bounds, &self.layers[parent].layer_bounds);
        let copy_paint = Paint::default().with_blend_mode(BlendMode::Src);

        match filter {
            ImageFilter::Matrix {
                transform,
                filter_mode,
            } => {
                let (l, t) = (bounds.left(), bounds.top());
                let placement = Matrix3::translate(l, t)
                    .concat(&transform)
                    .concat(&Matrix3::translate(-l, -t));
                let mut mesh = self.meshes.acquire();
                image_mesh_quad(&mut mesh, Some(placement), uvs, bounds);
                let request = DrawRequest::new(ProgramKind::Texture, mesh)
                    .with_texture(DrawSource::Layer(parent), TexMode::Target)
                    .with_filter(filter_mode);
                self.record_draw(&copy_paint, request)
            }
            ImageFilter::Blur { sigma_x, sigma_y } => {
                let params = adjust_sigma(
                    sigma_x.max(sigma_y) * pixel_scale,
                    self.config.max_blur_sigma,
                    self.config.max_texture_size as f32,
                );
                let blur_scale = pixel_scale / params.scale_factor;
                let kernel = |kernels: &mut KernelCache, sigma: f32| {
                    let sigma = sigma * blur_scale;
                    kernels.get(sigma, (3.0 * sigma).ceil() as u32)
                };
                let kernel_x = kernel(&mut self.kernels, sigma_x);
                let kernel_y = kernel(&mut self.kernels, sigma_y);

                let copy = self.push_offscreen(child, bounds, blur_scale);
                let mut mesh = self.meshes.acquire();
                image_mesh_quad(&mut mesh, None, uvs, bounds);
                let request = DrawRequest::new(ProgramKind::Texture, mesh)
                    .with_texture(DrawSource::Layer(parent), TexMode::Target);
                self.record_into(copy, &copy_paint, request)?;

                let horizontal = self.push_offscreen(child, bounds, blur_scale);
                let copy_width = self.layers[copy].width as f32;
                let mut mesh = self.meshes.acquire();
                image_mesh(&mut mesh, None, Rect::UNIT, bounds);
                let request = DrawRequest::new(ProgramKind::Blur, mesh)
                    .with_texture(DrawSource::Layer(copy), TexMode::Target)
                    .with_blur(kernel_x, [1.0 / copy_width, 0.0]);
                self.record_into(horizontal, &copy_paint, request)?;

                let pass_height = self.layers[horizontal].height as f32;
                let mut mesh = self.meshes.acquire();
                image_mesh(&mut mesh, None, Rect::UNIT, bounds);
                let request = DrawRequest::new(ProgramKind::Blur, mesh)
                    .with_texture(DrawSource::Layer(horizontal), TexMode::Target)
                    .with_blur(kernel_y, [0.0, 1.0 / pass_height]);
                self.record_draw(&copy_paint, request)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Draws
    // ─────────────────────────────────────────────────────────────────────────

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> Result<()> {
        if let Some(mask) = paint.mask_filter.filter(|m| m.sigma > 0.0) {
            if mask.style == BlurStyle::FastShadow && self.draw_fast_shadow(path, paint, mask.sigma)? {
                return Ok(());
            }
            let Some(shape) = self.shape_request(path, &paint.shape_only()) else {
                return Ok(());
            };
            self.draw_blurred(shape, &Paint::default(), paint, mask)?;

            if mask.style == BlurStyle::Solid {
                if let Some(shape) = self.shape_request(path, paint) {
                    self.record_draw(paint, shape)?;
                }
            }
            return Ok(());
        }

        let Some(request) = self.shape_request(path, paint) else {
            return Ok(());
        };
        self.record_draw(paint, request)
    }

    /// Tessellate `path` for `paint` and place it with the current transform
    fn shape_request(&mut self, path: &Path, paint: &Paint) -> Option<DrawRequest> {
        let id = self.current();
        let tolerance = self.tolerance(id);
        let (matrix, scale, pixel_scale) = {
            let layer = &self.layers[id];
            (*layer.state().matrix(), layer.state().scale(), layer.pixel_scale)
        };

        let mut mesh = self.meshes.acquire();
        let mut request = if paint.is_stroke() {
            let fringe = 1.0 / pixel_scale.max(1e-6);
            let stroke = stroke_geometry(
                paint.stroke_width * scale,
                fringe,
                self.config.max_stroke_width / pixel_scale.max(1e-6),
            );
            let params = StrokeParams {
                width: if scale > 0.0 { stroke.width / scale } else { 0.0 },
                cap: paint.stroke_cap,
                join: paint.stroke_join,
                miter_limit: paint.stroke_miter_limit,
            };
            self.tessellator.stroke(path, &params, tolerance, &mut mesh);
            let mut request = DrawRequest::new(ProgramKind::Stroke, mesh);
            request.stroke_mult = stroke.mult;
            request.alpha = stroke.alpha;
            request
        } else {
            self.tessellator.fill(path, tolerance, &mut mesh);
            DrawRequest::new(ProgramKind::Fill, mesh)
        };

        request.mesh.set_matrix(Some(matrix));
        if request.mesh.is_empty() || request.mesh.bounds.is_empty() {
            tracing::trace!("Skipping empty path mesh");
            self.meshes.release(request.mesh);
            return None;
        }
        Some(request)
    }

    /// Analytic shadow for filled rects and rounded rects
    ///
    /// Returns false when the shape or transform needs the mask path.
    fn draw_fast_shadow(&mut self, path: &Path, paint: &Paint, sigma: f32) -> Result<bool> {
        if paint.is_stroke() {
            return Ok(false);
        }
        let Some(rrect) = path.as_naive_rrect() else {
            return Ok(false);
        };
        let matrix = *self.layers[self.current()].state().matrix();
        if !matrix.rect_stays_rect() {
            return Ok(false);
        }

        let corner = rrect.radii.top_left;
        let program = if corner > 0.0 {
            ProgramKind::ShadowRoundBox
        } else {
            ProgramKind::ShadowBox
        };

        let mut mesh = self.meshes.acquire();
        rect_mesh(&mut mesh, Some(matrix), rrect.rect.inflate(3.0 * sigma));
        let mut request = DrawRequest::new(program, mesh);
        request.shadow = Some(ShadowParams {
            rect: rrect.rect,
            sigma,
            corner,
        });

        let mut shadow_paint = paint.clone();
        shadow_paint.mask_filter = None;
        shadow_paint.shader = None;
        self.record_draw(&shadow_paint, request)?;
        Ok(true)
    }

    /// Blur `shape`'s coverage and composite it with `paint`
    ///
    /// The shape is drawn with `shape_paint` into a mask layer covering its
    /// bounds grown by 3 sigma and clamped to the clip, blurred
    /// horizontally into a second layer, and blurred vertically while
    /// compositing into the current layer.
    fn draw_blurred(
        &mut self,
        shape: DrawRequest,
        shape_paint: &Paint,
        paint: &Paint,
        mask: MaskFilter,
    ) -> Result<()> {
        let parent = self.current();
        let (scale, pixel_scale) = {
            let layer = &self.layers[parent];
            (layer.state().scale(), layer.pixel_scale)
        };
        let sigma = mask.sigma * scale;

        let reduced = {
            let layer = &self.layers[parent];
            ReducedClip::create(
                &layer.clip_stack,
                layer.layer_bounds,
                shape.mesh.bounds.inflate(3.0 * sigma),
            )
        };
        if reduced.is_clipped_out() {
            tracing::trace!("Dropping blurred draw outside clip: {:?}", shape.mesh.bounds);
            self.meshes.release(shape.mesh);
            return Ok(());
        }
        let bounds = reduced.scissor;

        let params = adjust_sigma(
            sigma * pixel_scale,
            self.config.max_blur_sigma,
            self.config.max_texture_size as f32,
        );
        let mask_scale = pixel_scale / params.scale_factor;
        let kernel = self.kernels.get(params.sigma, params.radius);

        let coverage = self.push_offscreen(parent, bounds, mask_scale);
        self.record_into(coverage, shape_paint, shape)?;

        let horizontal = self.push_offscreen(parent, bounds, mask_scale);
        let coverage_width = self.layers[coverage].width as f32;
        let mut mesh = self.meshes.acquire();
        image_mesh(&mut mesh, None, Rect::UNIT, bounds);
        let request = DrawRequest::new(ProgramKind::Blur, mesh)
            .with_texture(DrawSource::Layer(coverage), TexMode::Target)
            .with_blur(kernel.clone(), [1.0 / coverage_width, 0.0]);
        let pass_paint = Paint::default().with_blend_mode(BlendMode::Src);
        self.record_into(horizontal, &pass_paint, request)?;

        let pass_height = self.layers[horizontal].height as f32;
        let mut mesh = self.meshes.acquire();
        image_mesh(&mut mesh, None, Rect::UNIT, bounds);
        let request = DrawRequest::new(ProgramKind::Blur, mesh)
            .with_texture(DrawSource::Layer(horizontal), TexMode::Alpha)
            .with_blur(kernel, [0.0, 1.0 / pass_height]);
        let mut composite = paint.clone();
        composite.mask_filter = None;
        self.record_draw(&composite, request)
    }

    fn draw_image(&mut self, image: &Image, offset: Point, paint: &Paint) -> Result<()> {
        let dpr = self.config.device_pixel_ratio.max(1e-6);
        let dst = Rect::new(
            offset.x,
            offset.y,
            image.width() as f32 / dpr,
            image.height() as f32 / dpr,
        );
        self.draw_image_rect(image, None, dst, paint)
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        src: Option<Rect>,
        dst: Rect,
        paint: &Paint,
    ) -> Result<()> {
        if !self.check_image(image) {
            return Ok(());
        }
        let (w, h) = (image.width() as f32, image.height() as f32);
        let uv = src.map_or(Rect::UNIT, |src| normalize_rect(src, w, h));

        let matrix = *self.layers[self.current()].state().matrix();
        let mut mesh = self.meshes.acquire();
        image_mesh(&mut mesh, Some(matrix), uv, dst);
        self.draw_image_mesh(image, mesh, paint)
    }

    fn draw_image_nine(
        &mut self,
        image: &Image,
        src: Option<Rect>,
        center: Rect,
        dst: Rect,
        paint: &Paint,
    ) -> Result<()> {
        if !self.check_image(image) {
            return Ok(());
        }
        let (w, h) = (image.width() as f32, image.height() as f32);
        let src = src.map_or(Rect::UNIT, |src| normalize_rect(src, w, h));
        let center = normalize_rect(center, w, h);

        let matrix = *self.layers[self.current()].state().matrix();
        let mut mesh = self.meshes.acquire();
        image_nine_mesh(&mut mesh, Some(matrix), src, center, w, h, dst);
        self.draw_image_mesh(image, mesh, paint)
    }

    fn check_image(&self, image: &Image) -> bool {
        if image.is_valid() {
            return true;
        }
        tracing::warn!(
            "Skipping invalid image {:?} ({}x{}, {} bytes)",
            image.id(),
            image.width(),
            image.height(),
            image.pixels().len()
        );
        false
    }

    fn draw_image_mesh(&mut self, image: &Image, mesh: Mesh, paint: &Paint) -> Result<()> {
        let mut image_paint = paint.clone();
        image_paint.shader = None;
        image_paint.mask_filter = None;
        let request = DrawRequest::new(ProgramKind::Texture, mesh)
            .with_texture(DrawSource::Image(image.clone()), TexMode::Image)
            .with_filter(paint.filter_mode);
        self.record_draw(&image_paint, request)
    }

    fn draw_text_blob(&mut self, blob: &TextBlob, offset: Point, paint: &Paint) -> Result<()> {
        for shadow in &blob.shadows {
            let mut shadow_paint = Paint::fill(shadow.color);
            if shadow.blur_sigma > 0.0 {
                shadow_paint = shadow_paint
                    .with_mask_filter(MaskFilter::blur(BlurStyle::Normal, shadow.blur_sigma));
            }
            self.draw_glyphs(blob, offset + shadow.offset, &shadow_paint)?;
        }
        self.draw_glyphs(blob, offset, paint)
    }

    fn draw_glyphs(&mut self, blob: &TextBlob, offset: Point, paint: &Paint) -> Result<()> {
        let (matrix, device_scale) = {
            let layer = &self.layers[self.current()];
            (
                *layer.state().matrix(),
                layer.state().scale() * layer.pixel_scale,
            )
        };

        let Some(shaped) = self.shaper.shape(blob, device_scale) else {
            tracing::warn!("Glyph atlas not ready, skipping text run {:?}", blob.text);
            return Ok(());
        };
        if !shaped.atlas.is_valid() {
            tracing::warn!("Glyph atlas {:?} is invalid, skipping text run", shaped.atlas.id());
            return Ok(());
        }

        let mut mesh = self.meshes.acquire();
        for glyph in &shaped.glyphs {
            let (b, uv) = (glyph.bounds, glyph.uv_bounds);
            let base = mesh.push_vertex(b.top_left(), uv.top_left());
            mesh.push_vertex(b.bottom_left(), uv.bottom_left());
            mesh.push_vertex(b.bottom_right(), uv.bottom_right());
            mesh.push_vertex(b.top_right(), uv.top_right());
            mesh.push_triangle(base, base + 1, base + 2);
            mesh.push_triangle(base, base + 2, base + 3);
        }
        mesh.set_matrix(Some(matrix.concat(&Matrix3::translate(offset.x, offset.y))));
        if mesh.is_empty() {
            self.meshes.release(mesh);
            return Ok(());
        }

        // Color glyphs carry their own color; only the paint alpha applies
        let (tex_mode, glyph_paint) = if shaped.alpha_only {
            (TexMode::Alpha, paint.clone())
        } else {
            let mut color_paint = paint.clone();
            color_paint.color = Color::WHITE.with_alpha(paint.color.a);
            color_paint.shader = None;
            (TexMode::Image, color_paint)
        };
        let request = DrawRequest::new(ProgramKind::Texture, mesh)
            .with_texture(DrawSource::Image(shaped.atlas), tex_mode);

        match glyph_paint.mask_filter.filter(|m| m.sigma > 0.0) {
            Some(mask) => self.draw_blurred(request, &Paint::default(), &glyph_paint, mask),
            None => self.record_draw(&glyph_paint, request),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clipping and recording
    // ─────────────────────────────────────────────────────────────────────────

    /// Clip, shade and record one draw on the current layer
    fn record_draw(&mut self, paint: &Paint, request: DrawRequest) -> Result<()> {
        let id = self.current();
        let layer = &self.layers[id];

        let reduced = ReducedClip::create(&layer.clip_stack, layer.layer_bounds, request.mesh.bounds);
        let scissor = if layer.clip_stack.is_empty() {
            None
        } else {
            Some(layer.device_rect(&reduced.scissor))
                .filter(|rect| !rect.covers(layer.width, layer.height))
        };
        if reduced.is_clipped_out() || scissor.is_some_and(|rect| rect.is_empty()) {
            tracing::trace!("Dropping draw outside clip: {:?}", request.mesh.bounds);
            self.meshes.release(request.mesh);
            return Ok(());
        }

        let ctx = ShadeContext {
            state_matrix: layer.state().matrix(),
            state_inverse: layer.state().inverse(),
            viewport: layer.layer_bounds,
        };
        let shading = match shade(paint, &request.mesh, &ctx) {
            Ok(Some(shading)) => shading,
            Ok(None) => {
                self.meshes.release(request.mesh);
                return Ok(());
            }
            Err(err) => {
                self.meshes.release(request.mesh);
                return Err(err);
            }
        };

        let mut uniforms = shading.uniforms;
        uniforms.alpha = request.alpha;
        uniforms.stroke_mult = request.stroke_mult;
        uniforms.tex_mode = request.tex_mode as u32;
        if let Some(blur) = &request.blur {
            uniforms.set_kernel(&blur.kernel);
            uniforms.image_increment = blur.increment;
        }
        if let Some(shadow) = &request.shadow {
            let r = shadow.rect;
            uniforms.shadow_box = [r.left(), r.top(), r.right(), r.bottom()];
            uniforms.shadow_sigma = shadow.sigma;
            uniforms.shadow_corner = shadow.corner;
        }

        let stencil = self.apply_clip(id, scissor, &reduced);
        let material = self.materials.get(paint.blend_mode, stencil);
        self.layers[id].add_draw(DrawCmd {
            program: request.program,
            mesh: request.mesh,
            uniforms,
            material,
            texture: request.texture,
            shader_texture: shading.shader_source,
            filter_mode: request.filter_mode,
        });
        Ok(())
    }

    /// Record the scissor and stencil work for a draw; returns the stencil
    /// test the draw must use
    fn apply_clip(
        &mut self,
        id: LayerId,
        scissor: Option<DeviceRect>,
        reduced: &ReducedClip,
    ) -> StencilMode {
        self.layers[id].try_add_scissor(scissor);
        if !reduced.needs_mask() {
            return StencilMode::Always;
        }
        if self.layers[id].must_render_clip(reduced.mask_gen_id, &reduced.scissor) {
            self.render_clip(id, reduced);
            self.layers[id].set_last_clip(reduced.mask_gen_id, reduced.scissor);
        }
        StencilMode::Equal
    }

    /// Stencil the mask elements of `reduced`: clear the region, then for
    /// each mask count its coverage and fold it into the running clip
    fn render_clip(&mut self, id: LayerId, reduced: &ReducedClip) {
        let material = self.materials.get(BlendMode::SrcOver, StencilMode::Always);
        let layer = &self.layers[id];
        let viewport = layer.layer_bounds;
        let fringe = 1.0 / layer.pixel_scale.max(1e-6);
        let region = reduced.scissor.inflate(fringe).intersect(&viewport);

        let stencil_draw = |program: ProgramKind, mesh: Mesh| {
            let mut uniforms = DrawUniforms::new(viewport);
            uniforms.set_mesh_matrix(mesh.matrix.as_ref());
            DrawCmd {
                program,
                mesh,
                uniforms,
                material,
                texture: None,
                shader_texture: None,
                filter_mode: FilterMode::Nearest,
            }
        };

        let mut draws: SmallVec<[DrawCmd; 3]> = SmallVec::new();
        let mut clear = self.meshes.acquire();
        rect_mesh(&mut clear, None, region);
        draws.push(stencil_draw(ProgramKind::StencilClear, clear));

        for &index in &reduced.masks {
            let Some(element) = layer.clip_stack.elements().get(index) else {
                continue;
            };
            let mut mask = self.meshes.acquire();
            mask.copy_from(element.mesh());
            draws.push(stencil_draw(ProgramKind::StencilWrite, mask));

            let mut cover = self.meshes.acquire();
            rect_mesh(&mut cover, None, region);
            draws.push(stencil_draw(ProgramKind::StencilIntersect, cover));
        }

        let layer = &mut self.layers[id];
        for draw in draws {
            layer.add_draw(draw);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Emission
    // ─────────────────────────────────────────────────────────────────────────

    fn emit(&mut self) -> CommandList {
        let mut list = self.lists.acquire();
        list.width = self.config.width;
        list.height = self.config.height;

        let root = self.root;
        let draws = std::mem::take(&mut self.layers[root].draws);
        let mut stack = vec![EmitFrame::new(root, TargetId::SURFACE, draws)];

        while let Some(frame) = stack.last_mut() {
            let Some(command) = frame.draws.next() else {
                if !frame.cleared {
                    frame.ensure_bound(&mut list);
                }
                let layer = frame.layer;
                stack.pop();
                for &child in &self.layers[layer].children {
                    list.commands
                        .push(GpuCommand::ReleaseTarget(self.layers[child].target));
                }
                if let Some(parent) = stack.last_mut() {
                    parent.bound = false;
                }
                continue;
            };

            match command {
                RenderCmd::Layer(child) => {
                    // A child may sample its parent, so the parent must hold
                    // defined content before the child renders
                    if !frame.cleared {
                        frame.ensure_bound(&mut list);
                    }
                    frame.bound = false;

                    let target = TargetId(self.next_target);
                    self.next_target += 1;
                    let msaa = self.config.msaa_samples;
                    let layer = &mut self.layers[child];
                    layer.target = target;
                    list.commands.push(GpuCommand::AllocateTarget(TargetDesc {
                        id: target,
                        width: layer.width,
                        height: layer.height,
                        samples: layer.samples(msaa),
                        filter_mode: layer.filter_mode,
                    }));
                    let draws = std::mem::take(&mut layer.draws);
                    stack.push(EmitFrame::new(child, target, draws));
                }
                RenderCmd::Scissor(rect) => {
                    frame.ensure_bound(&mut list);
                    list.commands.push(GpuCommand::SetScissor(rect));
                }
                RenderCmd::Draw(draw) => {
                    frame.ensure_bound(&mut list);
                    if let Some(call) = self.resolve_draw(draw, &mut list) {
                        list.commands.push(GpuCommand::Draw(call));
                    }
                }
            }
        }

        list
    }

    /// Move a recorded draw's geometry into the list and bind its textures
    fn resolve_draw(&mut self, draw: DrawCmd, list: &mut CommandList) -> Option<DrawCall> {
        let texture = draw
            .texture
            .map(|source| self.resolve_source(source, list));
        let shader_texture = draw
            .shader_texture
            .map(|source| self.resolve_source(source, list));
        if matches!(texture, Some(None)) || matches!(shader_texture, Some(None)) {
            tracing::warn!("Draw samples a layer that was never rendered, skipping");
            self.meshes.release(draw.mesh);
            return None;
        }

        let base_vertex = draw.mesh.write_vertices(&mut list.vertices);
        let first_index = list.indices.len() as u32;
        list.indices.extend_from_slice(&draw.mesh.indices);
        let index_count = draw.mesh.indices.len() as u32;
        self.meshes.release(draw.mesh);

        Some(DrawCall {
            program: draw.program,
            material: draw.material,
            uniforms: draw.uniforms,
            texture: texture.flatten(),
            shader_texture: shader_texture.flatten(),
            filter_mode: draw.filter_mode,
            base_vertex,
            first_index,
            index_count,
        })
    }

    fn resolve_source(&self, source: DrawSource, list: &mut CommandList) -> Option<TextureSource> {
        match source {
            DrawSource::Layer(id) => self.layers.get(id).map(|l| TextureSource::Target(l.target)),
            DrawSource::Image(image) => {
                let id = image.id();
                list.images.entry(id).or_insert(image);
                Some(TextureSource::Image(id))
            }
            DrawSource::Gradient { stops, .. } => {
                let index = list.gradient_index(stops_hash(&stops), || {
                    RasterizedGradient::from_stops(&stops)
                });
                Some(TextureSource::Gradient(index))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::PictureRecorder;

    #[test]
    fn test_stroke_geometry_regular() {
        let g = stroke_geometry(4.0, 1.0, 200.0);
        assert_eq!(g.width, 4.0);
        assert_eq!(g.alpha, 1.0);
        assert!((g.mult - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_stroke_geometry_hairline_and_thin() {
        let hairline = stroke_geometry(0.0, 0.5, 200.0);
        assert_eq!(hairline.width, 0.5);
        assert_eq!(hairline.alpha, 1.0);

        let thin = stroke_geometry(0.25, 0.5, 200.0);
        assert_eq!(thin.width, 0.5);
        assert!((thin.alpha - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_stroke_geometry_clamped() {
        assert_eq!(stroke_geometry(500.0, 1.0, 200.0).width, 200.0);
    }

    #[test]
    fn test_backdrop_uvs_normalized() {
        let uvs = backdrop_uvs(
            &Matrix3::translate(50.0, 0.0),
            &Rect::new(0.0, 0.0, 50.0, 100.0),
            &Rect::new(0.0, 0.0, 200.0, 200.0),
        );
        assert_eq!(uvs[0], Point::new(0.25, 0.0));
        assert_eq!(uvs[2], Point::new(0.5, 0.5));
    }

    #[test]
    fn test_normalize_rect() {
        let r = normalize_rect(Rect::new(10.0, 5.0, 20.0, 10.0), 40.0, 20.0);
        assert_eq!(r, Rect::new(0.25, 0.25, 0.5, 0.5));
    }

    #[test]
    fn test_empty_picture_clears_surface() {
        let picture = PictureRecorder::new().end_recording().unwrap();
        let mut flusher = PictureFlusher::new(FlusherConfig::testing());
        let list = flusher.flush(&picture).unwrap();
        assert_eq!(
            list.commands,
            vec![GpuCommand::BindTarget {
                target: TargetId::SURFACE,
                clear: true
            }]
        );
        assert_eq!(flusher.layer_stats().outstanding(), 0);
    }

    #[test]
    fn test_pools_balanced_after_flush() {
        let mut recorder = PictureRecorder::new();
        for i in 0..10 {
            recorder.draw_rect(
                Rect::new(i as f32 * 10.0, 0.0, 5.0, 5.0),
                Paint::fill(Color::RED),
            );
        }
        let picture = recorder.end_recording().unwrap();
        let mut flusher = PictureFlusher::new(FlusherConfig::testing());

        let list = flusher.flush(&picture).unwrap();
        flusher.reclaim(list);
        let created = flusher.mesh_stats().created;
        assert_eq!(flusher.mesh_stats().outstanding(), 0);

        // A second identical frame reuses every mesh
        let list = flusher.flush(&picture).unwrap();
        flusher.reclaim(list);
        assert_eq!(flusher.mesh_stats().created, created);
    }

    #[test]
    fn test_stroke_program_and_mult() {
        let mut recorder = PictureRecorder::new();
        recorder.draw_path(
            Path::line(Point::new(10.0, 10.0), Point::new(100.0, 10.0)),
            Paint::stroke(Color::BLACK, 4.0),
        );
        let picture = recorder.end_recording().unwrap();
        let mut flusher = PictureFlusher::new(FlusherConfig::testing());
        let list = flusher.flush(&picture).unwrap();

        let draw = list.color_draws().next().unwrap();
        assert_eq!(draw.program, ProgramKind::Stroke);
        assert!((draw.uniforms.stroke_mult - 1.5).abs() < 1e-6);
        assert!(draw.index_count > 0);
    }

    #[test]
    fn test_fast_shadow_single_draw() {
        let mut recorder = PictureRecorder::new();
        recorder.draw_rrect(
            lumen_core::RRect::new(Rect::new(50.0, 50.0, 60.0, 40.0), 8.0),
            Paint::fill(Color::BLACK).with_mask_filter(MaskFilter::shadow(4.0)),
        );
        let picture = recorder.end_recording().unwrap();
        let mut flusher = PictureFlusher::new(FlusherConfig::testing());
        let list = flusher.flush(&picture).unwrap();

        assert_eq!(list.targets().count(), 0);
        let draw = list.color_draws().next().unwrap();
        assert_eq!(draw.program, ProgramKind::ShadowRoundBox);
        assert_eq!(draw.uniforms.shadow_box, [50.0, 50.0, 110.0, 90.0]);
        assert_eq!(draw.uniforms.shadow_sigma, 4.0);
        assert_eq!(draw.uniforms.shadow_corner, 8.0);
    }
}
