//! Path tessellation
//!
//! The engine only needs triangles; how they are produced sits behind
//! [`PathTessellator`]. [`LyonTessellator`] is the stock implementation:
//!
//! - Rect paths become an exact 4-vertex quad
//! - Convex single-contour fills become a triangle fan over the flattened
//!   outline, so the vertices double as the polygon for clip containment
//! - Everything else goes through lyon's fill tessellator (non-zero winding)
//! - Strokes go through lyon's stroke tessellator, with `uv.x` marking the
//!   side of the stroke (0 or 1) for edge coverage in the stroke program
//!
//! All meshes come back in path coordinates; the caller places them.

use lumen_core::{Path, PathCommand, Point, StrokeCap, StrokeJoin};
use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, LineCap, LineJoin, Side,
    StrokeOptions, StrokeTessellator, StrokeVertex, VertexBuffers,
};
use lyon::math::point;
use lyon::path::iterator::PathIterator;
use lyon::path::PathEvent;

use crate::mesh::{is_convex_polygon, polygon_fan_mesh, rect_mesh, Mesh};
use crate::pool::Poolable;

/// Geometry parameters of a stroke, in path units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeParams {
    pub width: f32,
    pub cap: StrokeCap,
    pub join: StrokeJoin,
    pub miter_limit: f32,
}

/// Turns paths into triangle meshes
pub trait PathTessellator {
    /// Fill `path` into `mesh` at `tolerance` (path units).
    ///
    /// Returns true when the mesh is a fan over a single convex outline.
    fn fill(&mut self, path: &Path, tolerance: f32, mesh: &mut Mesh) -> bool;

    /// Stroke `path` into `mesh` at `tolerance` (path units).
    fn stroke(&mut self, path: &Path, params: &StrokeParams, tolerance: f32, mesh: &mut Mesh);
}

/// Lyon-backed tessellator
pub struct LyonTessellator {
    fill: FillTessellator,
    stroke: StrokeTessellator,
    events: Vec<PathEvent>,
    outline: Vec<Point>,
    buffers: VertexBuffers<(Point, Point), u32>,
}

impl Default for LyonTessellator {
    fn default() -> Self {
        Self::new()
    }
}

impl LyonTessellator {
    pub fn new() -> Self {
        Self {
            fill: FillTessellator::new(),
            stroke: StrokeTessellator::new(),
            events: Vec::new(),
            outline: Vec::new(),
            buffers: VertexBuffers::new(),
        }
    }

    /// Flatten the path events into `self.outline` if the path is a single
    /// contour; returns false for multi-contour paths
    fn flatten_single_contour(&mut self, tolerance: f32) -> bool {
        self.outline.clear();
        let mut contours = 0;
        for event in self.events.iter().cloned().flattened(tolerance) {
            match event {
                PathEvent::Begin { at } => {
                    contours += 1;
                    if contours > 1 {
                        return false;
                    }
                    self.outline.push(Point::new(at.x, at.y));
                }
                PathEvent::Line { to, .. } => {
                    let p = Point::new(to.x, to.y);
                    if self.outline.last() != Some(&p) {
                        self.outline.push(p);
                    }
                }
                PathEvent::End { .. } => {}
                // Flattening only yields lines
                PathEvent::Quadratic { .. } | PathEvent::Cubic { .. } => return false,
            }
        }
        if self.outline.len() > 1 && self.outline.first() == self.outline.last() {
            self.outline.pop();
        }
        true
    }

    fn take_buffers(&mut self, mesh: &mut Mesh) {
        mesh.clear();
        for (position, uv) in self.buffers.vertices.drain(..) {
            mesh.push_vertex(position, uv);
        }
        mesh.indices.append(&mut self.buffers.indices);
        mesh.update_bounds();
    }
}

impl PathTessellator for LyonTessellator {
    fn fill(&mut self, path: &Path, tolerance: f32, mesh: &mut Mesh) -> bool {
        if let Some(rect) = path.as_rect() {
            rect_mesh(mesh, None, rect);
            return !rect.is_empty();
        }

        path_to_lyon_events(path, &mut self.events);
        if self.events.is_empty() {
            mesh.clear();
            return false;
        }

        let tolerance = tolerance.max(1e-3);
        if self.flatten_single_contour(tolerance) && is_convex_polygon(&self.outline) {
            polygon_fan_mesh(mesh, &self.outline);
            return true;
        }

        self.buffers.vertices.clear();
        self.buffers.indices.clear();
        let options = FillOptions::default()
            .with_tolerance(tolerance)
            .with_fill_rule(FillRule::NonZero);

        let result = self.fill.tessellate(
            self.events.iter().cloned(),
            &options,
            &mut BuffersBuilder::new(&mut self.buffers, |vertex: FillVertex| {
                let p = vertex.position();
                (Point::new(p.x, p.y), Point::ZERO)
            }),
        );

        if let Err(err) = result {
            tracing::warn!("Path fill tessellation failed: {:?}", err);
            mesh.clear();
            return false;
        }

        self.take_buffers(mesh);
        false
    }

    fn stroke(&mut self, path: &Path, params: &StrokeParams, tolerance: f32, mesh: &mut Mesh) {
        path_to_lyon_events(path, &mut self.events);
        if self.events.is_empty() {
            mesh.clear();
            return;
        }

        self.buffers.vertices.clear();
        self.buffers.indices.clear();

        let options = StrokeOptions::default()
            .with_line_width(params.width)
            .with_tolerance(tolerance.max(1e-3))
            .with_line_cap(match params.cap {
                StrokeCap::Butt => LineCap::Butt,
                StrokeCap::Round => LineCap::Round,
                StrokeCap::Square => LineCap::Square,
            })
            .with_line_join(match params.join {
                StrokeJoin::Miter => LineJoin::Miter,
                StrokeJoin::Round => LineJoin::Round,
                StrokeJoin::Bevel => LineJoin::Bevel,
            })
            .with_miter_limit(params.miter_limit.max(StrokeOptions::MINIMUM_MITER_LIMIT));

        let result = self.stroke.tessellate(
            self.events.iter().cloned(),
            &options,
            &mut BuffersBuilder::new(&mut self.buffers, |vertex: StrokeVertex| {
                let p = vertex.position();
                let side = if matches!(vertex.side(), Side::Negative) {
                    0.0
                } else {
                    1.0
                };
                (Point::new(p.x, p.y), Point::new(side, 1.0))
            }),
        );

        if let Err(err) = result {
            tracing::warn!("Path stroke tessellation failed: {:?}", err);
            mesh.clear();
            return;
        }

        self.take_buffers(mesh);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Path conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Convert an SVG arc to cubic bezier curves
///
/// Follows the endpoint-to-center conversion of the SVG implementation
/// notes, split into segments of at most 90 degrees.
fn arc_to_cubics(
    from: Point,
    radius_x: f32,
    radius_y: f32,
    x_rotation: f32,
    large_arc: bool,
    sweep: bool,
    to: Point,
) -> Vec<(Point, Point, Point)> {
    let mut curves = Vec::new();

    if from == to {
        return curves;
    }

    let mut rx = radius_x.abs();
    let mut ry = radius_y.abs();
    if rx == 0.0 || ry == 0.0 {
        return curves;
    }

    let cos_phi = x_rotation.cos();
    let sin_phi = x_rotation.sin();

    let dx = (from.x - to.x) / 2.0;
    let dy = (from.y - to.y) / 2.0;
    let x1p = cos_phi * dx + sin_phi * dy;
    let y1p = -sin_phi * dx + cos_phi * dy;

    let x1p_sq = x1p * x1p;
    let y1p_sq = y1p * y1p;

    // Scale radii up when they cannot span the endpoints
    let lambda = x1p_sq / (rx * rx) + y1p_sq / (ry * ry);
    if lambda > 1.0 {
        let lambda_sqrt = lambda.sqrt();
        rx *= lambda_sqrt;
        ry *= lambda_sqrt;
    }

    let rx_sq = rx * rx;
    let ry_sq = ry * ry;

    let sq_numer = (rx_sq * ry_sq - rx_sq * y1p_sq - ry_sq * x1p_sq).max(0.0);
    let sq_denom = rx_sq * y1p_sq + ry_sq * x1p_sq;
    let sq = if sq_denom > 0.0 {
        (sq_numer / sq_denom).sqrt()
    } else {
        0.0
    };

    let sign = if large_arc == sweep { -1.0 } else { 1.0 };
    let cxp = sign * sq * rx * y1p / ry;
    let cyp = sign * sq * -ry * x1p / rx;

    let cx = cos_phi * cxp - sin_phi * cyp + (from.x + to.x) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (from.y + to.y) / 2.0;

    fn angle(ux: f32, uy: f32, vx: f32, vy: f32) -> f32 {
        let dot = ux * vx + uy * vy;
        let len = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
        let angle = (dot / len).clamp(-1.0, 1.0).acos();
        if ux * vy - uy * vx < 0.0 {
            -angle
        } else {
            angle
        }
    }

    let theta1 = angle(1.0, 0.0, (x1p - cxp) / rx, (y1p - cyp) / ry);
    let mut dtheta = angle(
        (x1p - cxp) / rx,
        (y1p - cyp) / ry,
        (-x1p - cxp) / rx,
        (-y1p - cyp) / ry,
    );

    if sweep && dtheta < 0.0 {
        dtheta += std::f32::consts::TAU;
    } else if !sweep && dtheta > 0.0 {
        dtheta -= std::f32::consts::TAU;
    }

    let num_segments = ((dtheta.abs() / std::f32::consts::FRAC_PI_2).ceil() as usize).max(1);
    let segment_angle = dtheta / num_segments as f32;
    let alpha = (segment_angle / 4.0).tan() * 4.0 / 3.0;

    let ellipse_point = |t: f32| {
        let (sin_t, cos_t) = t.sin_cos();
        Point::new(
            cx + rx * cos_phi * cos_t - ry * sin_phi * sin_t,
            cy + rx * sin_phi * cos_t + ry * cos_phi * sin_t,
        )
    };
    let ellipse_tangent = |t: f32| {
        let (sin_t, cos_t) = t.sin_cos();
        Point::new(
            -rx * cos_phi * sin_t - ry * sin_phi * cos_t,
            -rx * sin_phi * sin_t + ry * cos_phi * cos_t,
        )
    };

    for i in 0..num_segments {
        let t1 = theta1 + i as f32 * segment_angle;
        let t2 = t1 + segment_angle;
        let p0 = ellipse_point(t1);
        let p3 = if i + 1 == num_segments { to } else { ellipse_point(t2) };
        let p1 = p0 + ellipse_tangent(t1) * alpha;
        let p2 = p3 - ellipse_tangent(t2) * alpha;
        curves.push((p1, p2, p3));
    }

    curves
}

/// Convert a path to lyon path events, reusing `events`
fn path_to_lyon_events(path: &Path, events: &mut Vec<PathEvent>) {
    events.clear();
    let mut first_point: Option<Point> = None;
    let mut current = Point::ZERO;

    // Verbs before any move_to start an implicit contour at the origin
    let begin_if_needed = |events: &mut Vec<PathEvent>, first: &mut Option<Point>, at: Point| {
        if first.is_none() {
            events.push(PathEvent::Begin {
                at: point(at.x, at.y),
            });
            *first = Some(at);
        }
    };

    for cmd in path.commands() {
        match *cmd {
            PathCommand::MoveTo { to } => {
                if let Some(first) = first_point {
                    events.push(PathEvent::End {
                        last: point(current.x, current.y),
                        first: point(first.x, first.y),
                        close: false,
                    });
                }
                events.push(PathEvent::Begin {
                    at: point(to.x, to.y),
                });
                first_point = Some(to);
                current = to;
            }
            PathCommand::LineTo { to } => {
                begin_if_needed(events, &mut first_point, current);
                events.push(PathEvent::Line {
                    from: point(current.x, current.y),
                    to: point(to.x, to.y),
                });
                current = to;
            }
            PathCommand::QuadTo { control, to } => {
                begin_if_needed(events, &mut first_point, current);
                events.push(PathEvent::Quadratic {
                    from: point(current.x, current.y),
                    ctrl: point(control.x, control.y),
                    to: point(to.x, to.y),
                });
                current = to;
            }
            PathCommand::CubicTo {
                control1,
                control2,
                to,
            } => {
                begin_if_needed(events, &mut first_point, current);
                events.push(PathEvent::Cubic {
                    from: point(current.x, current.y),
                    ctrl1: point(control1.x, control1.y),
                    ctrl2: point(control2.x, control2.y),
                    to: point(to.x, to.y),
                });
                current = to;
            }
            PathCommand::ArcTo {
                radius_x,
                radius_y,
                rotation,
                large_arc,
                sweep,
                to,
            } => {
                begin_if_needed(events, &mut first_point, current);
                let cubics =
                    arc_to_cubics(current, radius_x, radius_y, rotation, large_arc, sweep, to);
                if cubics.is_empty() {
                    // Degenerate arc - treat as line
                    events.push(PathEvent::Line {
                        from: point(current.x, current.y),
                        to: point(to.x, to.y),
                    });
                } else {
                    let mut prev = current;
                    for (ctrl1, ctrl2, end) in cubics {
                        events.push(PathEvent::Cubic {
                            from: point(prev.x, prev.y),
                            ctrl1: point(ctrl1.x, ctrl1.y),
                            ctrl2: point(ctrl2.x, ctrl2.y),
                            to: point(end.x, end.y),
                        });
                        prev = end;
                    }
                }
                current = to;
            }
            PathCommand::Close => {
                if let Some(first) = first_point.take() {
                    events.push(PathEvent::End {
                        last: point(current.x, current.y),
                        first: point(first.x, first.y),
                        close: true,
                    });
                    current = first;
                }
            }
        }
    }

    if let Some(first) = first_point {
        events.push(PathEvent::End {
            last: point(current.x, current.y),
            first: point(first.x, first.y),
            close: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{RRect, Rect};

    #[test]
    fn test_rect_is_exact_quad() {
        let mut tess = LyonTessellator::new();
        let mut mesh = Mesh::new();
        let convex = tess.fill(&Path::rect(Rect::new(0.0, 0.0, 100.0, 50.0)), 0.25, &mut mesh);
        assert!(convex);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.bounds, Rect::new(0.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn test_circle_is_convex_fan() {
        let mut tess = LyonTessellator::new();
        let mut mesh = Mesh::new();
        let convex = tess.fill(&Path::circle(Point::new(50.0, 50.0), 25.0), 0.25, &mut mesh);
        assert!(convex);
        assert!(mesh.vertex_count() > 8);
        assert_eq!(mesh.indices.len(), (mesh.vertex_count() - 2) * 3);
        let b = mesh.bounds;
        assert!((b.left() - 25.0).abs() < 0.5 && (b.right() - 75.0).abs() < 0.5);
    }

    #[test]
    fn test_rrect_is_convex() {
        let mut tess = LyonTessellator::new();
        let mut mesh = Mesh::new();
        let rrect = RRect::new(Rect::new(0.0, 0.0, 40.0, 20.0), 5.0);
        assert!(tess.fill(&Path::rrect(rrect), 0.25, &mut mesh));
    }

    #[test]
    fn test_concave_uses_lyon() {
        let mut tess = LyonTessellator::new();
        let mut mesh = Mesh::new();
        let arrow = Path::new()
            .move_to(0.0, 0.0)
            .line_to(10.0, 5.0)
            .line_to(0.0, 10.0)
            .line_to(4.0, 5.0)
            .close();
        assert!(!tess.fill(&arrow, 0.25, &mut mesh));
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_empty_path() {
        let mut tess = LyonTessellator::new();
        let mut mesh = Mesh::new();
        assert!(!tess.fill(&Path::new(), 0.25, &mut mesh));
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_stroke_marks_sides() {
        let mut tess = LyonTessellator::new();
        let mut mesh = Mesh::new();
        let params = StrokeParams {
            width: 4.0,
            cap: StrokeCap::Butt,
            join: StrokeJoin::Miter,
            miter_limit: 4.0,
        };
        tess.stroke(
            &Path::line(Point::new(0.0, 0.0), Point::new(100.0, 0.0)),
            &params,
            0.25,
            &mut mesh,
        );
        assert!(!mesh.is_empty());
        assert!(mesh.uvs.iter().any(|uv| uv.x == 0.0));
        assert!(mesh.uvs.iter().any(|uv| uv.x == 1.0));
        assert!((mesh.bounds.height() - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_arc_ends_at_target() {
        let cubics = arc_to_cubics(
            Point::new(0.0, 0.0),
            10.0,
            10.0,
            0.0,
            false,
            true,
            Point::new(20.0, 0.0),
        );
        assert_eq!(cubics.len(), 2);
        assert_eq!(cubics.last().map(|c| c.2), Some(Point::new(20.0, 0.0)));
    }
}
