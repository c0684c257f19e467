//! Triangle meshes
//!
//! A [`Mesh`] keeps its vertices in the space they were generated in (path
//! coordinates for fills and strokes, layer coordinates for quads) together
//! with the matrix that places them in the layer. The GPU applies that
//! matrix in the vertex stage, which keeps meshes reusable and lets the
//! shader dispatch derive gradient coordinates from the untransformed
//! positions.
//!
//! Quad layout for every generator here is top-left, bottom-left,
//! bottom-right, top-right with triangles `0,1,2` and `0,2,3`.

use lumen_core::{Matrix3, Point, Rect};

use crate::pool::Poolable;

/// A vertex uploaded to the GPU (matches shader `VertexInput`)
///
/// Memory layout:
/// - position: `vec2<f32>` (8 bytes) - mesh-local position
/// - uv: `vec2<f32>`       (8 bytes) - texture coordinate or stroke side
/// Total: 16 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Indexed triangle list with an optional placement matrix
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Point>,
    pub uvs: Vec<Point>,
    pub indices: Vec<u32>,
    /// Mesh-local to layer transform; `None` means vertices are already in
    /// layer space
    pub matrix: Option<Matrix3>,
    /// Layer-space bounds of the transformed vertices
    pub bounds: Rect,
}

impl Poolable for Mesh {
    fn clear(&mut self) {
        self.vertices.clear();
        self.uvs.clear();
        self.indices.clear();
        self.matrix = None;
        self.bounds = Rect::ZERO;
    }
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn push_vertex(&mut self, position: Point, uv: Point) -> u32 {
        self.vertices.push(position);
        self.uvs.push(uv);
        (self.vertices.len() - 1) as u32
    }

    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Overwrite with `other`, reusing this mesh's allocations
    pub fn copy_from(&mut self, other: &Mesh) {
        self.vertices.clone_from(&other.vertices);
        self.uvs.clone_from(&other.uvs);
        self.indices.clone_from(&other.indices);
        self.matrix = other.matrix;
        self.bounds = other.bounds;
    }

    /// Bounds of the untransformed vertices
    pub fn local_bounds(&self) -> Rect {
        Rect::bounding(&self.vertices).unwrap_or(Rect::ZERO)
    }

    /// Place the mesh with `matrix` and recompute its layer-space bounds
    pub fn set_matrix(&mut self, matrix: Option<Matrix3>) {
        self.matrix = matrix;
        self.update_bounds();
    }

    pub fn update_bounds(&mut self) {
        let local = self.local_bounds();
        self.bounds = match &self.matrix {
            Some(m) => m.map_rect(&local),
            None => local,
        };
    }

    /// Vertices mapped into layer space
    pub fn device_vertices(&self) -> impl Iterator<Item = Point> + '_ {
        self.vertices.iter().map(move |p| match &self.matrix {
            Some(m) => m.map_point(*p),
            None => *p,
        })
    }

    /// Append GPU vertices to `out`, returning the base vertex
    pub fn write_vertices(&self, out: &mut Vec<MeshVertex>) -> u32 {
        let base = out.len() as u32;
        out.extend(self.vertices.iter().zip(self.uvs.iter()).map(|(p, uv)| MeshVertex {
            position: [p.x, p.y],
            uv: [uv.x, uv.y],
        }));
        base
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generators
// ─────────────────────────────────────────────────────────────────────────────

/// Textured quad mapping `uv` onto `dst`
pub fn image_mesh(mesh: &mut Mesh, matrix: Option<Matrix3>, uv: Rect, dst: Rect) {
    let corners = [
        Point::new(uv.left(), uv.top()),
        Point::new(uv.left(), uv.bottom()),
        Point::new(uv.right(), uv.bottom()),
        Point::new(uv.right(), uv.top()),
    ];
    image_mesh_quad(mesh, matrix, corners, dst);
}

/// Quad onto `dst` with one arbitrary texture coordinate per corner
///
/// `uvs` are in top-left, bottom-left, bottom-right, top-right order.
pub fn image_mesh_quad(mesh: &mut Mesh, matrix: Option<Matrix3>, uvs: [Point; 4], dst: Rect) {
    mesh.clear();
    let positions = [
        Point::new(dst.left(), dst.top()),
        Point::new(dst.left(), dst.bottom()),
        Point::new(dst.right(), dst.bottom()),
        Point::new(dst.right(), dst.top()),
    ];
    for (p, uv) in positions.into_iter().zip(uvs) {
        mesh.push_vertex(p, uv);
    }
    mesh.push_triangle(0, 1, 2);
    mesh.push_triangle(0, 2, 3);
    mesh.set_matrix(matrix);
}

/// Untextured quad covering `rect`
pub fn rect_mesh(mesh: &mut Mesh, matrix: Option<Matrix3>, rect: Rect) {
    image_mesh(mesh, matrix, Rect::UNIT, rect);
}

/// Nine-patch mesh: a 4x4 vertex grid whose corner cells keep their source
/// size while the edges and center stretch to fill `dst`
///
/// `src` and `center` are normalized texture rects; `image_width` and
/// `image_height` convert them back to source pixels. When `dst` is smaller
/// than the fixed borders they shrink proportionally.
pub fn image_nine_mesh(
    mesh: &mut Mesh,
    matrix: Option<Matrix3>,
    src: Rect,
    center: Rect,
    image_width: f32,
    image_height: f32,
    dst: Rect,
) {
    mesh.clear();

    let border = |near: f32, far: f32, extent: f32| {
        let total = near + far;
        if total > extent && total > 0.0 {
            let k = extent / total;
            (near * k, far * k)
        } else {
            (near, far)
        }
    };
    let (left, right) = border(
        (center.left() - src.left()) * image_width,
        (src.right() - center.right()) * image_width,
        dst.width(),
    );
    let (top, bottom) = border(
        (center.top() - src.top()) * image_height,
        (src.bottom() - center.bottom()) * image_height,
        dst.height(),
    );

    let xs = [dst.left(), dst.left() + left, dst.right() - right, dst.right()];
    let ys = [dst.top(), dst.top() + top, dst.bottom() - bottom, dst.bottom()];
    let us = [src.left(), center.left(), center.right(), src.right()];
    let vs = [src.top(), center.top(), center.bottom(), src.bottom()];

    for row in 0..4 {
        for col in 0..4 {
            mesh.push_vertex(
                Point::new(xs[col], ys[row]),
                Point::new(us[col], vs[row]),
            );
        }
    }
    for row in 0..3u32 {
        for col in 0..3u32 {
            let tl = row * 4 + col;
            let bl = tl + 4;
            let br = bl + 1;
            let tr = tl + 1;
            mesh.push_triangle(tl, bl, br);
            mesh.push_triangle(tl, br, tr);
        }
    }
    mesh.set_matrix(matrix);
}

/// Triangle fan over a closed polygon outline
pub fn polygon_fan_mesh(mesh: &mut Mesh, outline: &[Point]) {
    mesh.clear();
    for p in outline {
        mesh.push_vertex(*p, Point::ZERO);
    }
    for i in 1..outline.len().saturating_sub(1) as u32 {
        mesh.push_triangle(0, i, i + 1);
    }
    mesh.update_bounds();
}

/// Whether a closed polygon outline is convex
///
/// Collinear and repeated points are tolerated. Self-intersecting outlines
/// that turn consistently (a pentagram) are rejected by counting direction
/// changes along each axis.
pub fn is_convex_polygon(outline: &[Point]) -> bool {
    let n = outline.len();
    if n < 3 {
        return false;
    }

    let mut sign = 0.0f32;
    let mut x_flips = 0;
    let mut y_flips = 0;
    let mut last_dx = 0.0f32;
    let mut last_dy = 0.0f32;

    for i in 0..n {
        let a = outline[i];
        let b = outline[(i + 1) % n];
        let c = outline[(i + 2) % n];
        let ab = b - a;
        let bc = c - b;

        let cross = ab.cross(bc);
        if cross.abs() > f32::EPSILON {
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }

        if ab.x != 0.0 {
            if last_dx != 0.0 && ab.x.signum() != last_dx.signum() {
                x_flips += 1;
            }
            last_dx = ab.x;
        }
        if ab.y != 0.0 {
            if last_dy != 0.0 && ab.y.signum() != last_dy.signum() {
                y_flips += 1;
            }
            last_dy = ab.y;
        }
    }

    sign != 0.0 && x_flips <= 2 && y_flips <= 2
}

/// Whether `point` lies inside (or on) a convex polygon
pub fn convex_contains(outline: &[Point], point: Point) -> bool {
    let n = outline.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = outline[i];
        let b = outline[(i + 1) % n];
        let cross = (b - a).cross(point - a);
        if cross.abs() <= f32::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}
