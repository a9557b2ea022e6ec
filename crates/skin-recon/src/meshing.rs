//! Triangulation of the fitted surface.
//!
//! Two modes are available:
//!
//! - [`MeshMode::RegularGrid`]: one vertex per grid cell, two triangles per
//!   quad whose four corners are all grown. Untrusted regions stay open.
//! - [`MeshMode::Boundary`]: ear clipping of the silhouette loop, with
//!   heights sampled from the fitted surface.
//!
//! A mesh with no faces is a normal outcome ("nothing to render"), never an
//! error.

use nalgebra::{Point2, Point3, Vector3};
use tracing::{debug, warn};

use crate::boundary::{BoundaryLoop, CLOSE_EPSILON};
use crate::grid::{ColorMap, GridSpec, HeightMap, ValidMask};
use crate::grow::FittedSurface;
use crate::sampler::GridSampler;
use crate::types::{Mesh, Triangle, Vertex, VertexColor};

/// Cross products at or below this are treated as straight or reflex.
const CONVEX_EPSILON: f64 = 1e-12;

/// Which triangulation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum MeshMode {
    /// Quads of grown cells.
    #[default]
    RegularGrid,
    /// Ear clipping of the boundary loop.
    Boundary,
}

/// Parameters for mesh construction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MeshParams {
    pub mode: MeshMode,
    /// Compute area-weighted vertex normals. Default: true
    pub compute_normals: bool,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            mode: MeshMode::RegularGrid,
            compute_normals: true,
        }
    }
}

/// Inputs shared by both meshing modes.
#[derive(Debug, Clone, Copy)]
pub struct MeshInput<'a> {
    pub spec: &'a GridSpec,
    pub fitted: &'a FittedSurface,
    pub colors: Option<&'a ColorMap>,
    pub boundary: &'a BoundaryLoop,
}

/// Build the mesh selected by `params.mode`.
pub fn build_mesh(input: &MeshInput<'_>, params: &MeshParams) -> Mesh {
    let mut mesh = match params.mode {
        MeshMode::RegularGrid => grid_mesh(
            input.spec,
            &input.fitted.heights,
            &input.fitted.mask,
            input.colors,
        ),
        MeshMode::Boundary => boundary_mesh(
            input.spec,
            &input.fitted.heights,
            input.colors,
            input.boundary,
        ),
    };
    if params.compute_normals && !mesh.is_empty() {
        compute_vertex_normals(&mut mesh);
    }
    mesh
}

fn color_at(spec: &GridSpec, colors: Option<&ColorMap>, x: f64, y: f64) -> VertexColor {
    match colors {
        Some(map) => {
            let (ix, iy) = spec.cell_of(x, y);
            map.color_at(ix, iy)
        }
        None => VertexColor::NEUTRAL,
    }
}

/// Mesh every quad whose four cells are set in `mask`.
///
/// Vertices are emitted for every cell in arena order, so vertex `i` is
/// cell `i = iy * nx + ix` and faces index cells directly. Cells outside
/// any quad are left unreferenced.
pub fn grid_mesh(
    spec: &GridSpec,
    heights: &HeightMap,
    mask: &ValidMask,
    colors: Option<&ColorMap>,
) -> Mesh {
    let (nx, ny) = (spec.nx, spec.ny);
    if nx < 2 || ny < 2 {
        return Mesh::new();
    }

    let mut faces = Vec::new();
    for iy in 0..ny - 1 {
        for ix in 0..nx - 1 {
            let corners = [(ix, iy), (ix + 1, iy), (ix + 1, iy + 1), (ix, iy + 1)];
            if !corners.iter().all(|&(x, y)| *mask.at(x, y)) {
                continue;
            }
            let [a, b, c, d] = corners.map(|(x, y)| spec.index(x, y) as u32);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }

    if faces.is_empty() {
        debug!("No complete quads in fitted mask, mesh is empty");
        return Mesh::new();
    }

    let mut mesh = Mesh::with_capacity(spec.cell_count(), faces.len());
    for cell in 0..spec.cell_count() {
        let (ix, iy) = spec.coords(cell);
        let c = spec.cell_center(ix, iy);
        let position = Point3::new(c.x, c.y, *heights.at(ix, iy));
        let color = match colors {
            Some(map) => map.color_at(ix, iy),
            None => VertexColor::NEUTRAL,
        };
        mesh.vertices.push(Vertex::with_color(position, color));
    }
    mesh.faces = faces;

    debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Built grid mesh"
    );
    mesh
}

/// Ear-clip the boundary loop and lift it onto the fitted surface.
pub fn boundary_mesh(
    spec: &GridSpec,
    heights: &HeightMap,
    colors: Option<&ColorMap>,
    boundary: &BoundaryLoop,
) -> Mesh {
    let mut points: Vec<Point2<f64>> = Vec::with_capacity(boundary.len());
    for &p in boundary.open_points() {
        if points
            .last()
            .is_none_or(|last| (p - last).norm() > CLOSE_EPSILON)
        {
            points.push(p);
        }
    }
    while points.len() > 1
        && (points[0] - points[points.len() - 1]).norm() <= CLOSE_EPSILON
    {
        points.pop();
    }
    if points.len() < 3 {
        debug!(points = points.len(), "Too few boundary points, mesh is empty");
        return Mesh::new();
    }
    if signed_area(&points) < 0.0 {
        points.reverse();
    }

    let triangles = ear_clip(&points);
    let sampler = GridSampler::new(spec, heights);
    let mut mesh = Mesh::with_capacity(points.len(), triangles.len());
    for p in &points {
        let position = Point3::new(p.x, p.y, sampler.sample(p.x, p.y));
        mesh.vertices
            .push(Vertex::with_color(position, color_at(spec, colors, p.x, p.y)));
    }
    mesh.faces.extend(
        triangles
            .into_iter()
            .map(|[a, b, c]| [a as u32, b as u32, c as u32]),
    );

    debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Built boundary mesh"
    );
    mesh
}

/// Twice the signed area; positive for counter-clockwise loops.
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum()
}

fn cross(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Triangulate a counter-clockwise simple polygon by ear clipping.
///
/// Returns index triples into `points`. If no ear can be found the rest of
/// the polygon is fan-triangulated.
pub fn ear_clip(points: &[Point2<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let curr = remaining[i];
            let next = remaining[(i + 1) % len];
            is_ear(points, &remaining, prev, curr, next)
        });

        match ear {
            Some(i) => {
                let prev = remaining[(i + len - 1) % len];
                let next = remaining[(i + 1) % len];
                triangles.push([prev, remaining[i], next]);
                remaining.remove(i);
            }
            None => {
                warn!(
                    remaining = len,
                    "Ear clipping stuck, using fan triangulation"
                );
                break;
            }
        }
    }

    if remaining.len() == 3 {
        triangles.push([remaining[0], remaining[1], remaining[2]]);
    } else if remaining.len() > 3 {
        let center = remaining[0];
        for w in remaining[1..].windows(2) {
            triangles.push([center, w[0], w[1]]);
        }
    }

    triangles
}

fn is_ear(points: &[Point2<f64>], remaining: &[usize], prev: usize, curr: usize, next: usize) -> bool {
    let (a, b, c) = (points[prev], points[curr], points[next]);
    if cross(a, b, c) <= CONVEX_EPSILON {
        return false;
    }
    remaining
        .iter()
        .filter(|&&idx| idx != prev && idx != curr && idx != next)
        .all(|&idx| !point_in_triangle(points[idx], a, b, c))
}

fn point_in_triangle(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> bool {
    let d1 = cross(a, b, p);
    let d2 = cross(b, c, p);
    let d3 = cross(c, a, p);

    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;

    !(has_neg && has_pos)
}

/// Assign area-weighted, normalized vertex normals.
///
/// Vertices touched only by degenerate faces keep `None`.
pub fn compute_vertex_normals(mesh: &mut Mesh) {
    let mut accum = vec![Vector3::<f64>::zeros(); mesh.vertices.len()];
    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i as usize);
        let weighted = Triangle::new(
            mesh.vertices[a].position,
            mesh.vertices[b].position,
            mesh.vertices[c].position,
        )
        .normal_unnormalized();
        accum[a] += weighted;
        accum[b] += weighted;
        accum[c] += weighted;
    }

    for (vertex, n) in mesh.vertices.iter_mut().zip(accum) {
        let len_sq = n.norm_squared();
        vertex.normal = (len_sq > f64::EPSILON).then(|| n / len_sq.sqrt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryLoop;
    use crate::grid::Grid;
    use crate::grow::GrowthStats;

    fn fitted(n: usize, height: f64, mask: ValidMask) -> FittedSurface {
        FittedSurface {
            heights: Grid::new(n, n, height),
            mask,
            seed: None,
            stats: GrowthStats::default(),
        }
    }

    fn square_loop() -> BoundaryLoop {
        BoundaryLoop::closed(vec![
            Point2::new(0.1, 0.1),
            Point2::new(0.9, 0.1),
            Point2::new(0.9, 0.9),
            Point2::new(0.1, 0.9),
        ])
    }

    #[test]
    fn test_grid_mesh_full_mask() {
        let spec = GridSpec::new(4, 3, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(4, 3, 1.0);
        let mask = Grid::new(4, 3, true);
        let mesh = grid_mesh(&spec, &heights, &mask, None);
        assert_eq!(mesh.vertex_count(), 12);
        assert_eq!(mesh.face_count(), 2 * 3 * 2);
        assert!(mesh.indices_in_range());
        assert!(mesh.vertices.iter().all(|v| v.color == Some(VertexColor::NEUTRAL)));
    }

    #[test]
    fn test_grid_mesh_skips_partial_quads() {
        let spec = GridSpec::new(3, 3, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(3, 3, 0.0);
        let mut mask = Grid::new(3, 3, true);
        mask.set(1, 1, false);
        let mesh = grid_mesh(&spec, &heights, &mask, None);
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn test_grid_mesh_vertex_per_cell() {
        let spec = GridSpec::new(5, 4, 0.0, 0.0, 1.0, 1.0);
        let mut heights = Grid::new(5, 4, 0.0);
        let mut mask = Grid::new(5, 4, false);
        for (ix, iy) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            mask.set(ix, iy, true);
            heights.set(ix, iy, 0.5);
        }
        let mesh = grid_mesh(&spec, &heights, &mask, None);

        assert_eq!(mesh.vertex_count(), 5 * 4);
        assert_eq!(mesh.face_count(), 2);
        let quad = [spec.index(1, 1), spec.index(2, 1), spec.index(2, 2), spec.index(1, 2)].map(|i| i as u32);
        assert_eq!(mesh.faces, vec![[quad[0], quad[1], quad[2]], [quad[0], quad[2], quad[3]]]);

        for cell in 0..spec.cell_count() {
            let (ix, iy) = spec.coords(cell);
            let v = mesh.vertices[cell].position;
            assert_eq!((v.x, v.y), (spec.center_x(ix), spec.center_y(iy)));
            assert_eq!(v.z, *heights.at(ix, iy));
        }
    }

    #[test]
    fn test_grid_mesh_unreferenced_cells_keep_no_normal() {
        let spec = GridSpec::new(4, 4, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(4, 4, 0.0);
        let mut mask = Grid::new(4, 4, false);
        for (ix, iy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            mask.set(ix, iy, true);
        }
        let mut mesh = grid_mesh(&spec, &heights, &mask, None);
        compute_vertex_normals(&mut mesh);
        assert!(mesh.vertices[spec.index(0, 0)].normal.is_some());
        assert!(mesh.vertices[spec.index(3, 3)].normal.is_none());
    }

    #[test]
    fn test_grid_mesh_faces_point_up() {
        let spec = GridSpec::new(3, 3, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(3, 3, 0.0);
        let mask = Grid::new(3, 3, true);
        let mut mesh = grid_mesh(&spec, &heights, &mask, None);
        compute_vertex_normals(&mut mesh);
        for tri in mesh.triangles() {
            assert!(tri.normal().unwrap().z > 0.99);
        }
        for v in &mesh.vertices {
            assert!((v.normal.unwrap().z - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ear_clip_convex() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let tris = ear_clip(&square);
        assert_eq!(tris.len(), 2);
        for [a, b, c] in tris {
            assert!(cross(square[a], square[b], square[c]) > 0.0);
        }
    }

    #[test]
    fn test_ear_clip_concave() {
        // L-shape.
        let l = [
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        let tris = ear_clip(&l);
        assert_eq!(tris.len(), 4);
        let area: f64 = tris
            .iter()
            .map(|&[a, b, c]| cross(l[a], l[b], l[c]) * 0.5)
            .sum();
        assert!((area - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_mesh_orients_clockwise_input() {
        let spec = GridSpec::new(4, 4, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(4, 4, 2.0);
        let mut pts = square_loop().open_points().to_vec();
        pts.reverse();
        let mesh = boundary_mesh(&spec, &heights, None, &BoundaryLoop::closed(pts));
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!(mesh.vertices.iter().all(|v| (v.position.z - 2.0).abs() < 1e-12));
        for tri in mesh.triangles() {
            assert!(tri.normal().unwrap().z > 0.0);
        }
    }

    #[test]
    fn test_boundary_mesh_too_few_points() {
        let spec = GridSpec::new(4, 4, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(4, 4, 0.0);
        let degenerate = BoundaryLoop::closed(vec![
            Point2::new(0.5, 0.5),
            Point2::new(0.5, 0.5),
            Point2::new(0.7, 0.5),
        ]);
        let mesh = boundary_mesh(&spec, &heights, None, &degenerate);
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
        assert!(boundary_mesh(&spec, &heights, None, &BoundaryLoop::default()).is_empty());
    }

    #[test]
    fn test_boundary_mesh_uses_color_map() {
        let spec = GridSpec::new(2, 2, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::new(2, 2, 0.0);
        let colors = ColorMap::uniform(2, 2, VertexColor::new(10, 20, 30));
        let mesh = boundary_mesh(&spec, &heights, Some(&colors), &square_loop());
        assert!(mesh.vertices.iter().all(|v| v.color == Some(VertexColor::new(10, 20, 30))));
    }

    #[test]
    fn test_build_mesh_dispatch() {
        let spec = GridSpec::new(4, 4, 0.0, 0.0, 1.0, 1.0);
        let surface = fitted(4, 1.0, Grid::new(4, 4, true));
        let boundary = square_loop();
        let input = MeshInput {
            spec: &spec,
            fitted: &surface,
            colors: None,
            boundary: &boundary,
        };

        let grid = build_mesh(&input, &MeshParams::default());
        assert_eq!(grid.face_count(), 18);
        assert!(grid.has_normals());

        let params = MeshParams {
            mode: MeshMode::Boundary,
            compute_normals: false,
        };
        let outline = build_mesh(&input, &params);
        assert_eq!(outline.face_count(), 2);
        assert!(!outline.has_normals());
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        assert!(signed_area(&ccw) > 0.0);
        let cw = [ccw[0], ccw[2], ccw[1]];
        assert!(signed_area(&cw) < 0.0);
    }
}
