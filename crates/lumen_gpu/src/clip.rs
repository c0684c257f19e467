//! Clip algebra
//!
//! A [`ClipStack`] holds one [`ClipElement`] per clip operation, tagged with
//! the save depth it was pushed at. Each element carries its cumulative
//! bound (its own bound intersected with everything before it) and a
//! generation id that changes whenever the effective clip changes.
//!
//! [`ReducedClip::create`] answers "what does it take to clip a draw with
//! these bounds": a scissor rect, plus the elements that still need a
//! stencil mask because the scissor cannot express them. In the common case
//! of nested rect clips the answer is a scissor alone.

use lumen_core::{Matrix3, Path, Point, Rect};
use smallvec::SmallVec;

use crate::mesh::{convex_contains, rect_mesh, Mesh};
use crate::pool::{Poolable, Recycler};
use crate::tessellate::PathTessellator;

/// Clip generation id
pub type GenId = u32;

/// Never assigned to a live element
pub const INVALID_GEN_ID: GenId = 0;
/// The clip excludes everything
pub const EMPTY_GEN_ID: GenId = 1;
/// The clip needs no stencil mask
pub const WIDE_OPEN_GEN_ID: GenId = 2;

/// Axis alignment tolerance for rect detection, in layer units
const RECT_EPSILON: f32 = 1e-4;

/// Issues clip generation ids
///
/// Ids increase monotonically and wrap around at `u32::MAX`, skipping the
/// reserved values. After a wrap an id can repeat, but only after four
/// billion clip operations, long after any layer that cached the old one
/// has been torn down.
#[derive(Clone, Debug)]
pub struct ClipGenCounter {
    last: GenId,
}

impl Default for ClipGenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipGenCounter {
    pub fn new() -> Self {
        Self {
            last: WIDE_OPEN_GEN_ID,
        }
    }

    /// Counter whose next id follows `last`
    pub fn starting_after(last: GenId) -> Self {
        Self { last }
    }

    pub fn next_gen_id(&mut self) -> GenId {
        self.last = self.last.wrapping_add(1);
        if self.last <= WIDE_OPEN_GEN_ID {
            self.last = WIDE_OPEN_GEN_ID + 1;
        }
        self.last
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Elements
// ─────────────────────────────────────────────────────────────────────────────

/// One clip operation in layer space
#[derive(Clone, Debug, Default)]
pub struct ClipElement {
    save_count: usize,
    /// Flattened shape; for convex shapes the vertices are the outline
    mesh: Mesh,
    convex: bool,
    /// Axis-aligned rect in layer space, exact
    is_rect: bool,
    rect: Rect,
    /// Cumulative bound: own bound intersected with every prior element
    bound: Rect,
    gen_id: GenId,
    /// Every element up to and including this one is a rect
    is_intersection_of_rects: bool,
}

impl Poolable for ClipElement {
    fn clear(&mut self) {
        self.save_count = 0;
        self.mesh.clear();
        self.convex = false;
        self.is_rect = false;
        self.rect = Rect::ZERO;
        self.bound = Rect::ZERO;
        self.gen_id = INVALID_GEN_ID;
        self.is_intersection_of_rects = false;
    }
}

impl ClipElement {
    fn set_path(
        &mut self,
        save_count: usize,
        path: &Path,
        matrix: &Matrix3,
        tolerance: f32,
        tessellator: &mut dyn PathTessellator,
    ) {
        self.save_count = save_count;
        self.convex = tessellator.fill(path, tolerance, &mut self.mesh);
        self.mesh.set_matrix(Some(*matrix));

        self.is_rect = self.convex
            && self.mesh.vertex_count() == 4
            && matrix.rect_stays_rect()
            && self.is_axis_aligned_quad();
        self.rect = if self.is_rect {
            self.mesh.bounds
        } else {
            Rect::ZERO
        };
    }

    fn is_axis_aligned_quad(&self) -> bool {
        let mut p = [Point::ZERO; 4];
        for (slot, v) in p.iter_mut().zip(self.mesh.device_vertices()) {
            *slot = v;
        }
        let eq = |a: f32, b: f32| (a - b).abs() <= RECT_EPSILON;
        (eq(p[0].x, p[1].x) && eq(p[1].y, p[2].y) && eq(p[2].x, p[3].x) && eq(p[3].y, p[0].y))
            || (eq(p[0].y, p[1].y)
                && eq(p[1].x, p[2].x)
                && eq(p[2].y, p[3].y)
                && eq(p[3].x, p[0].x))
    }

    fn set_rect(&mut self, rect: Rect) {
        self.is_rect = true;
        self.convex = true;
        self.rect = rect;
        rect_mesh(&mut self.mesh, None, rect);
    }

    fn set_empty(&mut self) {
        self.gen_id = EMPTY_GEN_ID;
        self.is_intersection_of_rects = false;
        self.bound = Rect::ZERO;
    }

    fn own_bound(&self) -> Rect {
        if self.is_rect {
            self.rect
        } else {
            self.mesh.bounds
        }
    }

    fn update_bound_and_gen_id(&mut self, prior: Option<&ClipElement>, gens: &mut ClipGenCounter) {
        self.gen_id = gens.next_gen_id();
        self.is_intersection_of_rects =
            self.is_rect && prior.map_or(true, |p| p.is_intersection_of_rects);

        let own = self.own_bound();
        let bound = match prior {
            Some(p) => p.bound.intersection(&own),
            None => Some(own).filter(|r| !r.is_empty()),
        };
        match bound {
            Some(bound) => self.bound = bound,
            None => self.set_empty(),
        }
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn is_rect(&self) -> bool {
        self.is_rect
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_convex(&self) -> bool {
        self.convex
    }

    pub fn bound(&self) -> Rect {
        self.bound
    }

    pub fn gen_id(&self) -> GenId {
        self.gen_id
    }

    pub fn is_intersection_of_rects(&self) -> bool {
        self.is_intersection_of_rects
    }

    /// The clip excludes everything
    pub fn is_empty(&self) -> bool {
        self.gen_id == EMPTY_GEN_ID
    }

    /// Whether the element's shape covers all of `query`
    ///
    /// Exact for rects and convex shapes; any other shape answers false.
    pub fn contains(&self, query: &Rect) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.is_rect {
            return self.rect.contains_rect(query);
        }
        if !self.convex {
            return false;
        }
        let inverse = match self.mesh.matrix.as_ref().map(Matrix3::invert) {
            Some(Some(inverse)) => inverse,
            Some(None) => return false,
            None => Matrix3::IDENTITY,
        };
        query
            .corners()
            .iter()
            .all(|corner| convex_contains(&self.mesh.vertices, inverse.map_point(*corner)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stack
// ─────────────────────────────────────────────────────────────────────────────

/// Active clip elements of one render layer
#[derive(Default)]
pub struct ClipStack {
    elements: Vec<ClipElement>,
    save_count: usize,
    spare: Recycler<ClipElement>,
}

impl Poolable for ClipStack {
    fn clear(&mut self) {
        for element in self.elements.drain(..) {
            self.spare.release(element);
        }
        self.save_count = 0;
    }
}

impl ClipStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self) {
        self.save_count += 1;
    }

    /// Drop every element pushed since the matching `save`
    pub fn restore(&mut self) {
        self.save_count = self.save_count.saturating_sub(1);
        while let Some(last) = self.elements.last() {
            if last.save_count <= self.save_count {
                break;
            }
            if let Some(element) = self.elements.pop() {
                self.spare.release(element);
            }
        }
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    /// Intersect the clip with `path` placed by `matrix`
    ///
    /// `tolerance` is the flattening tolerance in path units.
    pub fn clip_path(
        &mut self,
        path: &Path,
        matrix: &Matrix3,
        tolerance: f32,
        tessellator: &mut dyn PathTessellator,
        gens: &mut ClipGenCounter,
    ) {
        let mut element = self.spare.acquire();
        element.set_path(self.save_count, path, matrix, tolerance, tessellator);
        self.push_element(element, gens);
    }

    fn push_element(&mut self, mut element: ClipElement, gens: &mut ClipGenCounter) {
        let count = self.elements.len();
        if let Some(prior) = self.elements.last_mut() {
            if prior.is_empty() {
                self.spare.release(element);
                return;
            }

            if prior.save_count == self.save_count {
                if prior.is_rect && element.is_rect {
                    match prior.rect.intersection(&element.rect) {
                        Some(rect) => {
                            prior.set_rect(rect);
                            let (head, tail) = self.elements.split_at_mut(count - 1);
                            tail[0].update_bound_and_gen_id(head.last(), gens);
                        }
                        None => prior.set_empty(),
                    }
                    self.spare.release(element);
                    return;
                }

                if !prior.bound.intersects(&element.own_bound()) {
                    prior.set_empty();
                    self.spare.release(element);
                    return;
                }
            }
        }

        element.update_bound_and_gen_id(self.elements.last(), gens);
        self.elements.push(element);
    }

    /// Cumulative bound and rect-only flag of the whole stack
    pub fn bounds(&self) -> Option<(Rect, bool)> {
        self.elements
            .last()
            .map(|e| (e.bound, e.is_intersection_of_rects))
    }

    pub fn elements(&self) -> &[ClipElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reduction
// ─────────────────────────────────────────────────────────────────────────────

/// Minimal device work needed to clip one draw
#[derive(Clone, Debug, PartialEq)]
pub struct ReducedClip {
    /// Layer-space scissor; empty means the draw is fully clipped out
    pub scissor: Rect,
    /// Indices of stack elements that need a stencil mask
    pub masks: SmallVec<[usize; 4]>,
    /// Generation id of the mask set, or [`WIDE_OPEN_GEN_ID`] without masks
    pub mask_gen_id: GenId,
}

impl ReducedClip {
    fn clipped_out() -> Self {
        Self {
            scissor: Rect::ZERO,
            masks: SmallVec::new(),
            mask_gen_id: WIDE_OPEN_GEN_ID,
        }
    }

    fn scissor_only(scissor: Rect) -> Self {
        Self {
            scissor,
            masks: SmallVec::new(),
            mask_gen_id: WIDE_OPEN_GEN_ID,
        }
    }

    /// Reduce `stack` for a draw covering `query` on a layer spanning
    /// `layer_bounds`
    ///
    /// The scissor is the query clamped to the layer and, with a rect-only
    /// stack, to the clip bound. Otherwise elements
    /// that fully contain the reduced query are skipped and the rest become
    /// masks.
    pub fn create(stack: &ClipStack, layer_bounds: Rect, query: Rect) -> Self {
        let Some((stack_bound, rects_only)) = stack.bounds() else {
            return layer_bounds
                .intersection(&query)
                .map_or_else(Self::clipped_out, Self::scissor_only);
        };

        let Some(scissor) = layer_bounds
            .intersection(&stack_bound)
            .and_then(|bounds| bounds.intersection(&query))
        else {
            return Self::clipped_out();
        };

        if rects_only {
            return Self::scissor_only(scissor);
        }

        let mut reduced = Self::scissor_only(scissor);
        for (index, element) in stack.elements().iter().enumerate() {
            if element.is_rect() || element.contains(&scissor) {
                continue;
            }
            reduced.masks.push(index);
            reduced.mask_gen_id = element.gen_id();
        }
        reduced
    }

    pub fn is_clipped_out(&self) -> bool {
        self.scissor.is_empty()
    }

    pub fn needs_mask(&self) -> bool {
        !self.masks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellate::LyonTessellator;
    use lumen_core::RRect;

    struct Fixture {
        stack: ClipStack,
        tess: LyonTessellator,
        gens: ClipGenCounter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                stack: ClipStack::new(),
                tess: LyonTessellator::new(),
                gens: ClipGenCounter::new(),
            }
        }

        fn clip(&mut self, path: Path, matrix: Matrix3) {
            self.stack
                .clip_path(&path, &matrix, 0.25, &mut self.tess, &mut self.gens);
        }
    }

    const LAYER: Rect = Rect::new(0.0, 0.0, 200.0, 200.0);

    #[test]
    fn test_gen_counter_skips_reserved_on_wrap() {
        let mut gens = ClipGenCounter::starting_after(u32::MAX - 1);
        assert_eq!(gens.next_gen_id(), u32::MAX);
        assert_eq!(gens.next_gen_id(), WIDE_OPEN_GEN_ID + 1);
        assert_eq!(ClipGenCounter::new().next_gen_id(), 3);
    }

    #[test]
    fn test_rect_clip_is_rect() {
        let mut f = Fixture::new();
        f.clip(Path::rect(Rect::new(10.0, 10.0, 50.0, 50.0)), Matrix3::IDENTITY);
        let element = &f.stack.elements()[0];
        assert!(element.is_rect());
        assert!(element.is_intersection_of_rects());
        assert_eq!(element.rect(), Rect::new(10.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn test_rotated_rect_is_not_rect() {
        let mut f = Fixture::new();
        f.clip(
            Path::rect(Rect::new(10.0, 10.0, 50.0, 50.0)),
            Matrix3::rotate(0.3),
        );
        let element = &f.stack.elements()[0];
        assert!(!element.is_rect());
        assert!(element.is_convex());
    }

    #[test]
    fn test_same_depth_rects_merge() {
        let mut f = Fixture::new();
        f.clip(Path::rect(Rect::new(0.0, 0.0, 100.0, 100.0)), Matrix3::IDENTITY);
        let first_gen = f.stack.elements()[0].gen_id();
        f.clip(Path::rect(Rect::new(50.0, 25.0, 100.0, 100.0)), Matrix3::IDENTITY);

        assert_eq!(f.stack.elements().len(), 1);
        let element = &f.stack.elements()[0];
        assert_eq!(element.rect(), Rect::from_ltrb(50.0, 25.0, 100.0, 100.0));
        assert_eq!(element.bound(), Rect::from_ltrb(50.0, 25.0, 100.0, 100.0));
        assert_ne!(element.gen_id(), first_gen);
    }

    #[test]
    fn test_disjoint_rects_collapse_to_empty() {
        let mut f = Fixture::new();
        f.clip(Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0)), Matrix3::IDENTITY);
        f.clip(Path::rect(Rect::new(20.0, 20.0, 10.0, 10.0)), Matrix3::IDENTITY);
        assert!(f.stack.elements()[0].is_empty());

        // Later clips in the same scope are dropped
        f.clip(Path::circle(Point::new(5.0, 5.0), 5.0), Matrix3::IDENTITY);
        assert_eq!(f.stack.elements().len(), 1);

        let reduced = ReducedClip::create(&f.stack, LAYER, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(reduced.is_clipped_out());
    }

    #[test]
    fn test_different_depth_rects_stack() {
        let mut f = Fixture::new();
        f.clip(Path::rect(Rect::new(0.0, 0.0, 100.0, 100.0)), Matrix3::IDENTITY);
        f.stack.save();
        f.clip(Path::rect(Rect::new(50.0, 50.0, 100.0, 100.0)), Matrix3::IDENTITY);

        assert_eq!(f.stack.elements().len(), 2);
        assert_eq!(
            f.stack.bounds(),
            Some((Rect::from_ltrb(50.0, 50.0, 100.0, 100.0), true))
        );

        f.stack.restore();
        assert_eq!(f.stack.elements().len(), 1);
        assert_eq!(
            f.stack.bounds(),
            Some((Rect::new(0.0, 0.0, 100.0, 100.0), true))
        );
    }

    #[test]
    fn test_reduce_without_clip() {
        let stack = ClipStack::new();
        let reduced = ReducedClip::create(&stack, LAYER, Rect::new(10.0, 10.0, 5.0, 5.0));
        assert_eq!(reduced.scissor, Rect::new(10.0, 10.0, 5.0, 5.0));
        assert!(!reduced.needs_mask());

        let edge = ReducedClip::create(&stack, LAYER, Rect::new(190.0, -10.0, 20.0, 20.0));
        assert_eq!(edge.scissor, Rect::new(190.0, 0.0, 10.0, 10.0));

        let outside = ReducedClip::create(&stack, LAYER, Rect::new(300.0, 0.0, 5.0, 5.0));
        assert!(outside.is_clipped_out());
    }

    #[test]
    fn test_reduce_rects_to_scissor() {
        let mut f = Fixture::new();
        f.clip(Path::rect(Rect::new(0.0, 0.0, 100.0, 100.0)), Matrix3::IDENTITY);
        let reduced = ReducedClip::create(&f.stack, LAYER, Rect::new(50.0, 50.0, 100.0, 100.0));
        assert_eq!(reduced.scissor, Rect::from_ltrb(50.0, 50.0, 100.0, 100.0));
        assert_eq!(reduced.mask_gen_id, WIDE_OPEN_GEN_ID);
    }

    #[test]
    fn test_reduce_skips_containing_shape() {
        let mut f = Fixture::new();
        f.clip(
            Path::rrect(RRect::new(Rect::new(0.0, 0.0, 100.0, 100.0), 10.0)),
            Matrix3::IDENTITY,
        );

        // Well inside the rounded corners: no mask needed
        let inside = ReducedClip::create(&f.stack, LAYER, Rect::new(20.0, 20.0, 60.0, 60.0));
        assert!(!inside.needs_mask());
        assert_eq!(inside.mask_gen_id, WIDE_OPEN_GEN_ID);

        // Touching a corner: mask needed
        let corner = ReducedClip::create(&f.stack, LAYER, Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(corner.masks.as_slice(), &[0]);
        assert_eq!(corner.mask_gen_id, f.stack.elements()[0].gen_id());
    }

    #[test]
    fn test_reduce_misses_clip() {
        let mut f = Fixture::new();
        f.clip(Path::circle(Point::new(50.0, 50.0), 10.0), Matrix3::IDENTITY);
        let reduced = ReducedClip::create(&f.stack, LAYER, Rect::new(100.0, 100.0, 10.0, 10.0));
        assert!(reduced.is_clipped_out());
    }

    #[test]
    fn test_concave_never_contains() {
        let mut f = Fixture::new();
        let arrow = Path::new()
            .move_to(0.0, 0.0)
            .line_to(100.0, 50.0)
            .line_to(0.0, 100.0)
            .line_to(40.0, 50.0)
            .close();
        f.clip(arrow, Matrix3::IDENTITY);
        assert!(!f.stack.elements()[0].contains(&Rect::new(45.0, 45.0, 1.0, 1.0)));
    }

    #[test]
    fn test_transformed_convex_contains() {
        let mut f = Fixture::new();
        f.clip(
            Path::circle(Point::new(0.0, 0.0), 10.0),
            Matrix3::translate(100.0, 100.0),
        );
        let element = &f.stack.elements()[0];
        assert!(element.contains(&Rect::new(98.0, 98.0, 4.0, 4.0)));
        assert!(!element.contains(&Rect::new(0.0, 0.0, 4.0, 4.0)));
    }
}
