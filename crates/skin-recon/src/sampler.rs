//! Bilinear height lookup over a [`HeightMap`].

use nalgebra::Point3;
use rayon::prelude::*;

use crate::grid::{GridSpec, HeightMap};

/// Read-only bilinear sampler over one height map and its spec.
///
/// Cell centers sit at integer continuous coordinates. Lookups between
/// centers blend the four surrounding cells; lookups beyond the outermost
/// centers clamp to the edge, so results never leave the range of the
/// sampled corner values.
#[derive(Debug, Clone, Copy)]
pub struct GridSampler<'a> {
    spec: &'a GridSpec,
    heights: &'a HeightMap,
}

impl<'a> GridSampler<'a> {
    pub fn new(spec: &'a GridSpec, heights: &'a HeightMap) -> Self {
        debug_assert_eq!(heights.len(), spec.cell_count());
        Self { spec, heights }
    }

    /// Interpolated height at world `(x, y)`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (gx, gy) = self.spec.continuous(x, y);
        let (x0, x1, tx) = split_axis(gx, self.spec.nx);
        let (y0, y1, ty) = split_axis(gy, self.spec.ny);

        let h00 = *self.heights.at(x0, y0);
        let h10 = *self.heights.at(x1, y0);
        let h01 = *self.heights.at(x0, y1);
        let h11 = *self.heights.at(x1, y1);

        let bottom = h00 + (h10 - h00) * tx;
        let top = h01 + (h11 - h01) * tx;
        bottom + (top - bottom) * ty
    }

    /// Same XY with z replaced by the interpolated height.
    #[inline]
    pub fn resample(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(p.x, p.y, self.sample(p.x, p.y))
    }

    /// Resample every point, preserving order and count.
    pub fn resample_all(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        points.par_iter().map(|p| self.resample(p)).collect()
    }
}

/// Floor index, clamped neighbor and fractional weight along one axis.
fn split_axis(g: f64, n: usize) -> (usize, usize, f64) {
    let max = (n - 1) as f64;
    // NaN falls to the first cell rather than poisoning the blend.
    let g = if g.is_nan() { 0.0 } else { g.clamp(0.0, max) };
    let i0 = g.floor() as usize;
    let i1 = (i0 + 1).min(n - 1);
    (i0, i1, g - i0 as f64)
}
