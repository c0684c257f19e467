//! Vector paths
//!
//! A [`Path`] is a list of drawing verbs in logical coordinates. Paths built
//! with [`Path::rect`], [`Path::rrect`], [`Path::circle`] or [`Path::oval`]
//! also remember the primitive they came from, which lets the engine take
//! exact fast paths (4-vertex rect clips, analytic shadows) instead of
//! flattening curves.

use crate::geometry::{Point, RRect, Rect};
use serde::{Deserialize, Serialize};

/// Cubic Bézier control-point factor for quarter circles
const KAPPA: f32 = 0.552_284_8;

/// Path command for building vector paths
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum PathCommand {
    MoveTo { to: Point },
    LineTo { to: Point },
    /// Quadratic Bézier curve
    QuadTo { control: Point, to: Point },
    /// Cubic Bézier curve
    CubicTo {
        control1: Point,
        control2: Point,
        to: Point,
    },
    /// SVG-style elliptical arc
    ArcTo {
        radius_x: f32,
        radius_y: f32,
        /// Ellipse x-axis rotation in radians
        rotation: f32,
        large_arc: bool,
        sweep: bool,
        to: Point,
    },
    Close,
}

/// Primitive a path was constructed from
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathShape {
    Rect { rect: Rect },
    RRect { rrect: RRect },
    Oval { rect: Rect },
}

/// A vector path
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    commands: Vec<PathCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<PathShape>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_commands(commands: Vec<PathCommand>) -> Self {
        Self {
            commands,
            shape: None,
        }
    }

    // Appending any verb invalidates the remembered primitive.
    fn push(mut self, command: PathCommand) -> Self {
        self.commands.push(command);
        self.shape = None;
        self
    }

    pub fn move_to(self, x: f32, y: f32) -> Self {
        self.push(PathCommand::MoveTo {
            to: Point::new(x, y),
        })
    }

    pub fn line_to(self, x: f32, y: f32) -> Self {
        self.push(PathCommand::LineTo {
            to: Point::new(x, y),
        })
    }

    pub fn quad_to(self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        self.push(PathCommand::QuadTo {
            control: Point::new(cx, cy),
            to: Point::new(x, y),
        })
    }

    pub fn cubic_to(self, cx1: f32, cy1: f32, cx2: f32, cy2: f32, x: f32, y: f32) -> Self {
        self.push(PathCommand::CubicTo {
            control1: Point::new(cx1, cy1),
            control2: Point::new(cx2, cy2),
            to: Point::new(x, y),
        })
    }

    /// SVG arc to a point
    ///
    /// - `large_arc`: take the arc spanning more than 180 degrees
    /// - `sweep`: draw in the positive-angle direction
    #[allow(clippy::too_many_arguments)]
    pub fn arc_to(
        self,
        radius_x: f32,
        radius_y: f32,
        rotation: f32,
        large_arc: bool,
        sweep: bool,
        x: f32,
        y: f32,
    ) -> Self {
        self.push(PathCommand::ArcTo {
            radius_x,
            radius_y,
            rotation,
            large_arc,
            sweep,
            to: Point::new(x, y),
        })
    }

    pub fn close(self) -> Self {
        self.push(PathCommand::Close)
    }

    /// Closed rectangle path
    pub fn rect(rect: Rect) -> Self {
        let mut path = Self::new()
            .move_to(rect.left(), rect.top())
            .line_to(rect.right(), rect.top())
            .line_to(rect.right(), rect.bottom())
            .line_to(rect.left(), rect.bottom())
            .close();
        path.shape = Some(PathShape::Rect { rect });
        path
    }

    /// Rounded rectangle path; zero radii produce a plain rect path
    pub fn rrect(rrect: RRect) -> Self {
        if rrect.is_rect() {
            return Self::rect(rrect.rect);
        }
        let r = rrect.rect;
        let radii = rrect.radii;
        let (x, y, w, h) = (r.x(), r.y(), r.width(), r.height());
        let (tl, tr, br, bl) = (
            radii.top_left,
            radii.top_right,
            radii.bottom_right,
            radii.bottom_left,
        );
        let k = 1.0 - KAPPA;

        let mut path = Self::new().move_to(x + tl, y).line_to(x + w - tr, y);
        if tr > 0.0 {
            path = path.cubic_to(x + w - tr * k, y, x + w, y + tr * k, x + w, y + tr);
        }
        path = path.line_to(x + w, y + h - br);
        if br > 0.0 {
            path = path.cubic_to(x + w, y + h - br * k, x + w - br * k, y + h, x + w - br, y + h);
        }
        path = path.line_to(x + bl, y + h);
        if bl > 0.0 {
            path = path.cubic_to(x + bl * k, y + h, x, y + h - bl * k, x, y + h - bl);
        }
        path = path.line_to(x, y + tl);
        if tl > 0.0 {
            path = path.cubic_to(x, y + tl * k, x + tl * k, y, x + tl, y);
        }

        let mut path = path.close();
        path.shape = Some(PathShape::RRect { rrect });
        path
    }

    /// Ellipse inscribed in `rect`
    pub fn oval(rect: Rect) -> Self {
        let c = rect.center();
        let rx = rect.width() * 0.5;
        let ry = rect.height() * 0.5;
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);

        let mut path = Self::new()
            .move_to(c.x + rx, c.y)
            .cubic_to(c.x + rx, c.y + ky, c.x + kx, c.y + ry, c.x, c.y + ry)
            .cubic_to(c.x - kx, c.y + ry, c.x - rx, c.y + ky, c.x - rx, c.y)
            .cubic_to(c.x - rx, c.y - ky, c.x - kx, c.y - ry, c.x, c.y - ry)
            .cubic_to(c.x + kx, c.y - ry, c.x + rx, c.y - ky, c.x + rx, c.y)
            .close();
        path.shape = Some(PathShape::Oval { rect });
        path
    }

    pub fn circle(center: Point, radius: f32) -> Self {
        Self::oval(Rect::from_ltrb(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        ))
    }

    pub fn line(from: Point, to: Point) -> Self {
        Self::new().move_to(from.x, from.y).line_to(to.x, to.y)
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn shape(&self) -> Option<&PathShape> {
        self.shape.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The rect this path was built from, if any
    pub fn as_rect(&self) -> Option<Rect> {
        match self.shape {
            Some(PathShape::Rect { rect }) => Some(rect),
            _ => None,
        }
    }

    /// Rect or rounded rect this path was built from, as a rounded rect
    ///
    /// Only rounded rects with one radius on every corner, no larger than
    /// half the width or height, qualify.
    pub fn as_naive_rrect(&self) -> Option<RRect> {
        match self.shape {
            Some(PathShape::Rect { rect }) => Some(RRect::from_rect(rect)),
            Some(PathShape::RRect { rrect }) => {
                let radius = rrect.radii.top_left;
                let naive = rrect.radii.is_uniform()
                    && radius <= rrect.rect.width() * 0.5
                    && radius <= rrect.rect.height() * 0.5;
                naive.then_some(rrect)
            }
            _ => None,
        }
    }

    pub fn is_naive_rrect(&self) -> bool {
        self.as_naive_rrect().is_some()
    }

    /// Conservative bounding rectangle, including control points
    pub fn bounds(&self) -> Rect {
        match self.shape {
            Some(PathShape::Rect { rect }) | Some(PathShape::Oval { rect }) => return rect,
            Some(PathShape::RRect { rrect }) => return rrect.rect,
            None => {}
        }

        let mut min = Point::new(f32::INFINITY, f32::INFINITY);
        let mut max = Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
        let mut include = |p: Point| {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        };

        for cmd in &self.commands {
            match *cmd {
                PathCommand::MoveTo { to } | PathCommand::LineTo { to } => include(to),
                PathCommand::QuadTo { control, to } => {
                    include(control);
                    include(to);
                }
                PathCommand::CubicTo {
                    control1,
                    control2,
                    to,
                } => {
                    include(control1);
                    include(control2);
                    include(to);
                }
                PathCommand::ArcTo {
                    radius_x,
                    radius_y,
                    to,
                    ..
                } => {
                    // An arc never strays further than its diameter from the endpoint.
                    let reach = 2.0 * radius_x.abs().max(radius_y.abs());
                    include(to);
                    include(to.offset(-reach, -reach));
                    include(to.offset(reach, reach));
                }
                PathCommand::Close => {}
            }
        }

        if min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite() {
            Rect::from_ltrb(min.x, min.y, max.x, max.y)
        } else {
            Rect::ZERO
        }
    }
}

impl From<Rect> for Path {
    fn from(rect: Rect) -> Self {
        Path::rect(rect)
    }
}

impl From<RRect> for Path {
    fn from(rrect: RRect) -> Self {
        Path::rrect(rrect)
    }
}
