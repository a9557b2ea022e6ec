//! Edge-preserving bilateral smoothing of a height field.
//!
//! Each valid cell becomes a weighted mean of the valid cells in its
//! `(2r+1)^2` neighborhood. Weights combine a Gaussian on grid distance
//! with a Gaussian on height difference, so steps much taller than
//! `sigma_depth` survive while small-scale noise is averaged out.

use rayon::prelude::*;
use tracing::debug;

use crate::grid::{HeightMap, ValidMask};

/// Weight sums at or below this keep the cell's previous value.
const MIN_WEIGHT: f64 = 1e-12;

/// Parameters for bilateral smoothing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SmoothParams {
    /// Neighborhood radius in cells. Default: 2
    pub radius: usize,
    /// Spatial Gaussian sigma in cells. Default: 1.0
    pub sigma_space: f64,
    /// Explicit height-similarity sigma in world units. When None it is
    /// derived from `depth_fraction`.
    pub sigma_depth: Option<f64>,
    /// Fraction of the observed valid height range used as sigma_depth.
    /// Default: 0.06
    pub depth_fraction: f64,
    /// Number of passes. Zero is the identity. Default: 2
    pub iterations: usize,
}

impl Default for SmoothParams {
    fn default() -> Self {
        Self {
            radius: 2,
            sigma_space: 1.0,
            sigma_depth: None,
            depth_fraction: 0.06,
            iterations: 2,
        }
    }
}

impl SmoothParams {
    /// Heavier smoothing for noisy body scans.
    pub fn strong() -> Self {
        Self {
            radius: 3,
            sigma_space: 1.5,
            iterations: 3,
            ..Default::default()
        }
    }

    /// Height sigma for a map whose valid cells span `range`.
    pub fn resolve_sigma_depth(&self, range: f64) -> f64 {
        self.sigma_depth
            .unwrap_or(self.depth_fraction * range)
            .max(f64::EPSILON)
    }
}

/// Bilateral smoother with a precomputed spatial kernel.
#[derive(Debug, Clone)]
pub struct BilateralSmoother {
    params: SmoothParams,
    kernel: Vec<f64>,
}

impl BilateralSmoother {
    pub fn new(params: &SmoothParams) -> Self {
        let r = params.radius as isize;
        let side = 2 * params.radius + 1;
        let two_s2 = 2.0 * params.sigma_space.max(f64::EPSILON).powi(2);
        let mut kernel = Vec::with_capacity(side * side);
        for dy in -r..=r {
            for dx in -r..=r {
                kernel.push((-((dx * dx + dy * dy) as f64) / two_s2).exp());
            }
        }
        Self {
            params: params.clone(),
            kernel,
        }
    }

    /// Spatial weight for offset `(dx, dy)`.
    #[inline]
    fn spatial(&self, dx: isize, dy: isize) -> f64 {
        let side = 2 * self.params.radius + 1;
        let r = self.params.radius as isize;
        self.kernel[(dy + r) as usize * side + (dx + r) as usize]
    }

    /// Smooth `heights` over the cells set in `valid`.
    ///
    /// Invalid cells are copied through and never contribute as neighbors.
    pub fn smooth(&self, heights: &HeightMap, valid: &ValidMask) -> HeightMap {
        let mut front = heights.clone();
        if self.params.iterations == 0 || heights.is_empty() {
            return front;
        }

        let range = heights
            .masked_range(valid)
            .map(|(lo, hi)| hi - lo)
            .unwrap_or(0.0);
        let sigma_depth = self.params.resolve_sigma_depth(range);
        let two_d2 = 2.0 * sigma_depth * sigma_depth;

        debug!(
            radius = self.params.radius,
            iterations = self.params.iterations,
            sigma_depth,
            "Bilateral smoothing"
        );

        let nx = heights.nx();
        let ny = heights.ny();
        let r = self.params.radius as isize;
        let mut back = front.clone();

        for _ in 0..self.params.iterations {
            let src = front.as_slice();
            let mask = valid.as_slice();
            back.as_mut_slice()
                .par_chunks_mut(nx)
                .enumerate()
                .for_each(|(iy, row)| {
                    for (ix, out) in row.iter_mut().enumerate() {
                        let center = iy * nx + ix;
                        if !mask[center] {
                            *out = src[center];
                            continue;
                        }
                        let h0 = src[center];
                        let mut wsum = 0.0;
                        let mut hsum = 0.0;
                        for dy in -r..=r {
                            let y = iy as isize + dy;
                            if y < 0 || y >= ny as isize {
                                continue;
                            }
                            for dx in -r..=r {
                                let x = ix as isize + dx;
                                if x < 0 || x >= nx as isize {
                                    continue;
                                }
                                let n = y as usize * nx + x as usize;
                                if !mask[n] {
                                    continue;
                                }
                                let dh = src[n] - h0;
                                let w = self.spatial(dx, dy) * (-(dh * dh) / two_d2).exp();
                                wsum += w;
                                hsum += w * src[n];
                            }
                        }
                        *out = if wsum > MIN_WEIGHT { hsum / wsum } else { h0 };
                    }
                });
            std::mem::swap(&mut front, &mut back);
        }

        front
    }
}

/// Convenience wrapper around [`BilateralSmoother`].
pub fn smooth_heights(heights: &HeightMap, valid: &ValidMask, params: &SmoothParams) -> HeightMap {
    BilateralSmoother::new(params).smooth(heights, valid)
}

/// Spatial-only Gaussian blur over valid cells, the limit of bilateral
/// smoothing as `sigma_depth` grows.
pub fn gaussian_blur(heights: &HeightMap, valid: &ValidMask, params: &SmoothParams) -> HeightMap {
    let params = SmoothParams {
        sigma_depth: Some(f64::INFINITY),
        ..params.clone()
    };
    smooth_heights(heights, valid, &params)
}
