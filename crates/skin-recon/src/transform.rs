//! Dataset normalization shared by every entity derived from one cloud.

use nalgebra::{Point3, Vector3};

use crate::types::Mesh;

/// Default bounding-box diagonal after normalization.
pub const DEFAULT_TARGET_SIZE: f64 = 2.0;

/// Uniform scale plus recentering computed once per dataset.
///
/// Maps `p` to `(p - center) * scale_factor`: the bounding-box diagonal
/// becomes the target size and the box center lands on the origin. Apply
/// the same instance to the mesh, the smoothed points and anything else
/// derived from the cloud so they stay co-registered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub scale_factor: f64,
    pub center: Point3<f64>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformParams {
    pub fn identity() -> Self {
        Self {
            scale_factor: 1.0,
            center: Point3::origin(),
        }
    }

    /// Compute from the bounding box of the finite points.
    ///
    /// A zero diagonal is treated as 1.0. Without finite points the
    /// identity is returned.
    pub fn from_points(points: &[Point3<f64>], target_size: f64) -> Self {
        let mut finite = points.iter().filter(|p| p.iter().all(|c| c.is_finite()));
        let Some(first) = finite.next() else {
            return Self::identity();
        };
        let (min, max) = finite.fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p)));

        let diagonal = (max - min).norm();
        let diagonal = if diagonal > f64::EPSILON { diagonal } else { 1.0 };
        Self {
            scale_factor: target_size / diagonal,
            center: nalgebra::center(&min, &max),
        }
    }

    #[inline]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p - self.center) * self.scale_factor)
    }

    #[inline]
    pub fn invert(&self, p: &Point3<f64>) -> Point3<f64> {
        self.center + p.coords / self.scale_factor
    }

    pub fn apply_points(&self, points: &mut [Point3<f64>]) {
        for p in points {
            *p = self.apply(p);
        }
    }

    /// Transform vertex positions. Normals are unchanged by a positive
    /// uniform scale.
    pub fn apply_mesh(&self, mesh: &mut Mesh) {
        mesh.translate(-self.center.coords);
        mesh.scale(self.scale_factor);
    }

    /// Translation part after scaling.
    pub fn translation(&self) -> Vector3<f64> {
        -self.center.coords * self.scale_factor
    }
}

/// Whether and how to normalize pipeline outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct NormalizeParams {
    /// Apply the transform to the mesh and smoothed points. Default: false
    pub apply: bool,
    /// Diagonal after normalization. Default: 2.0
    pub target_size: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            apply: false,
            target_size: DEFAULT_TARGET_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_diagonal_maps_to_target() {
        let points = vec![Point3::new(1.0, 1.0, 1.0), Point3::new(4.0, 5.0, 1.0)];
        let t = TransformParams::from_points(&points, 2.0);
        assert!(approx_eq(t.scale_factor, 0.4));
        assert_eq!(t.center, Point3::new(2.5, 3.0, 1.0));
        let a = t.apply(&points[0]);
        let b = t.apply(&points[1]);
        assert!(approx_eq((b - a).norm(), 2.0));
        assert!(approx_eq(nalgebra::center(&a, &b).coords.norm(), 0.0));
    }

    #[test]
    fn test_zero_diagonal_uses_unit() {
        let points = vec![Point3::new(3.0, 3.0, 3.0); 4];
        let t = TransformParams::from_points(&points, 2.0);
        assert_eq!(t.scale_factor, 2.0);
        assert_eq!(t.apply(&points[0]), Point3::origin());
    }

    #[test]
    fn test_empty_is_identity() {
        assert_eq!(TransformParams::from_points(&[], 2.0), TransformParams::identity());
    }

    #[test]
    fn test_invert_roundtrip() {
        let t = TransformParams {
            scale_factor: 0.25,
            center: Point3::new(1.0, -2.0, 3.0),
        };
        let p = Point3::new(7.0, 8.0, -9.0);
        let back = t.invert(&t.apply(&p));
        assert!(approx_eq((back - p).norm(), 0.0));
    }

    #[test]
    fn test_mesh_and_points_stay_registered() {
        let t = TransformParams {
            scale_factor: 3.0,
            center: Point3::new(1.0, 1.0, 1.0),
        };
        let p = Point3::new(2.0, 0.0, 5.0);
        let mut mesh = crate::types::Mesh::new();
        mesh.vertices.push(Vertex::new(p));
        t.apply_mesh(&mut mesh);
        let mut pts = vec![p];
        t.apply_points(&mut pts);
        assert!(approx_eq((mesh.vertices[0].position - pts[0]).norm(), 0.0));
        assert!(approx_eq((pts[0].coords - (p.coords * 3.0 + t.translation())).norm(), 0.0));
    }
}
