//! Least-squares plane fitting `z = a*x + b*y + c`.

use nalgebra::{Matrix3, Point3, Vector3};

/// Default pivot magnitude below which the normal equations are singular.
pub const PIVOT_EPSILON: f64 = 1e-8;

/// A height plane `z = a*x + b*y + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    /// Predicted height at `(x, y)`.
    #[inline]
    pub fn predict(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    /// Signed vertical distance of `p` above the plane.
    #[inline]
    pub fn residual(&self, p: &Point3<f64>) -> f64 {
        p.z - self.predict(p.x, p.y)
    }
}

/// Fit a plane through `points` by the 3x3 normal equations.
///
/// Returns None for fewer than 3 points or when elimination meets a pivot
/// smaller than `pivot_epsilon` (collinear or coincident XY positions).
pub fn fit_plane(points: &[Point3<f64>], pivot_epsilon: f64) -> Option<Plane> {
    if points.len() < 3 {
        return None;
    }

    let mut ata = Matrix3::zeros();
    let mut atb = Vector3::zeros();
    for p in points {
        let row = Vector3::new(p.x, p.y, 1.0);
        ata += row * row.transpose();
        atb += row * p.z;
    }

    let [a, b, c] = solve_3x3(ata, atb, pivot_epsilon)?;
    Some(Plane { a, b, c })
}

/// Gaussian elimination with partial pivoting.
fn solve_3x3(mut m: Matrix3<f64>, mut rhs: Vector3<f64>, pivot_epsilon: f64) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot_row = (col..3)
            .max_by(|&i, &j| m[(i, col)].abs().total_cmp(&m[(j, col)].abs()))
            .unwrap_or(col);
        if m[(pivot_row, col)].abs() < pivot_epsilon {
            return None;
        }
        if pivot_row != col {
            m.swap_rows(pivot_row, col);
            rhs.swap_rows(pivot_row, col);
        }

        for row in (col + 1)..3 {
            let factor = m[(row, col)] / m[(col, col)];
            for k in col..3 {
                m[(row, k)] -= factor * m[(col, k)];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| m[(row, k)] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[(row, row)];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_exact_plane_recovered() {
        let points: Vec<_> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.5, 0.3)]
            .iter()
            .map(|&(x, y)| Point3::new(x, y, 2.0 * x - 3.0 * y + 0.5))
            .collect();
        let plane = fit_plane(&points, PIVOT_EPSILON).unwrap();
        assert!(approx_eq(plane.a, 2.0));
        assert!(approx_eq(plane.b, -3.0));
        assert!(approx_eq(plane.c, 0.5));
        assert!(approx_eq(plane.predict(2.0, 2.0), -1.5));
    }

    #[test]
    fn test_least_squares_average() {
        // Same XY twice at different heights: the fit passes through the mean.
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let plane = fit_plane(&points, PIVOT_EPSILON).unwrap();
        assert!(approx_eq(plane.predict(0.0, 0.0), 1.0));
        assert!(approx_eq(plane.residual(&Point3::new(1.0, 0.0, 1.0)), 0.0));
    }

    #[test]
    fn test_too_few_points() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(fit_plane(&points, PIVOT_EPSILON).is_none());
    }

    #[test]
    fn test_collinear_points_are_singular() {
        let points: Vec<_> = (0..5)
            .map(|i| Point3::new(i as f64, 2.0 * i as f64, 1.0))
            .collect();
        assert!(fit_plane(&points, PIVOT_EPSILON).is_none());
    }

    #[test]
    fn test_coincident_points_are_singular() {
        let points = vec![Point3::new(0.3, 0.3, 1.0); 6];
        assert!(fit_plane(&points, PIVOT_EPSILON).is_none());
    }

    #[test]
    fn test_pivoting_handles_zero_leading_entry() {
        // All x = 0 except one, forcing a row swap on the first column.
        let points = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 2.0),
            Point3::new(1.0, 0.0, 4.0),
        ];
        let plane = fit_plane(&points, PIVOT_EPSILON).unwrap();
        assert!(approx_eq(plane.a, 3.0));
        assert!(approx_eq(plane.b, 1.0));
        assert!(approx_eq(plane.c, 1.0));
    }
}
