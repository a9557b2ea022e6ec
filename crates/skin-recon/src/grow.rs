//! Region growing by local plane consistency.
//!
//! Starting from a seed near the grid center, cells are admitted one BFS
//! ring at a time. Each candidate gets a least-squares plane through the
//! valid samples of its window; the candidate is accepted when the plane's
//! prediction at the candidate agrees with what the region expects there.
//! Accepted cells store the predicted height, so the grown surface is
//! locally planar and isolated spikes or detached noise never join it.
//!
//! Degenerate windows are routine at the silhouette and inside holes. They
//! are skipped, never fatal.

use std::collections::VecDeque;

use nalgebra::Point3;
use tracing::debug;

use crate::grid::{Grid, GridSpec, HeightMap, OFFSETS_4, ValidMask};
use crate::plane::{PIVOT_EPSILON, Plane, fit_plane};

/// Tolerances below this are raised to it, so perfectly flat data still
/// passes the consistency test despite rounding.
const MIN_TOLERANCE: f64 = 1e-9;

/// Scale from the median absolute residual to a normal standard deviation.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Parameters for surface growing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct GrowParams {
    /// Half-width of the fitting window in cells. Default: 2
    pub window_radius: usize,
    /// Acceptance tolerance as a fraction of the cloud's z range. Default: 0.12
    pub acceptance_fraction: f64,
    /// Minimum valid samples in a window for a fit. Default: 3
    pub min_window_samples: usize,
    /// Pivot magnitude treated as singular. Default: 1e-8
    pub pivot_epsilon: f64,
    /// Upper bound on residual-trimming refits after the first fit;
    /// trimming stops earlier once a pass removes nothing. Default: 8
    pub refit_passes: usize,
    /// Trimming cutoff in robust standard deviations of the window
    /// residuals (median absolute residual scaled to sigma). Default: 3.0
    pub trim_sigmas: f64,
    /// Floor of the trimming cutoff as a fraction of the cloud's z range.
    /// Default: 0.01
    pub trim_fraction: f64,
}

impl Default for GrowParams {
    fn default() -> Self {
        Self {
            window_radius: 2,
            acceptance_fraction: 0.12,
            min_window_samples: 3,
            pivot_epsilon: PIVOT_EPSILON,
            refit_passes: 8,
            trim_sigmas: 3.0,
            trim_fraction: 0.01,
        }
    }
}

impl GrowParams {
    /// Params with a different window radius.
    pub fn with_window_radius(radius: usize) -> Self {
        Self {
            window_radius: radius,
            ..Default::default()
        }
    }
}

/// Counters describing one growth run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrowthStats {
    /// Cells admitted to the region, seed included.
    pub accepted: usize,
    /// Cells whose prediction disagreed with the reference.
    pub rejected: usize,
    /// Cells skipped for having too few window samples.
    pub sparse_skipped: usize,
    /// Cells skipped for a singular fit.
    pub singular_skipped: usize,
}

impl GrowthStats {
    /// Total cells evaluated.
    pub fn evaluated(&self) -> usize {
        self.accepted + self.rejected + self.sparse_skipped + self.singular_skipped
    }
}

/// Output of [`SurfaceGrower::grow`].
#[derive(Debug, Clone)]
pub struct FittedSurface {
    /// Plane-predicted heights where grown, input heights elsewhere.
    pub heights: HeightMap,
    /// True for grown cells.
    pub mask: ValidMask,
    /// Seed cell, None when no valid cell exists.
    pub seed: Option<(usize, usize)>,
    pub stats: GrowthStats,
}

impl FittedSurface {
    /// Number of grown cells.
    pub fn grown_count(&self) -> usize {
        self.mask.count_true()
    }
}

/// Outcome of testing one candidate cell.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Verdict {
    Accept(f64),
    Reject,
    Sparse,
    Singular,
}

/// Nearest valid cell to the grid center, searched in square rings.
pub fn find_seed(valid: &ValidMask) -> Option<(usize, usize)> {
    let (nx, ny) = (valid.nx() as isize, valid.ny() as isize);
    if nx == 0 || ny == 0 {
        return None;
    }
    let (cx, cy) = (nx / 2, ny / 2);
    let max_ring = nx.max(ny);

    for ring in 0..=max_ring {
        for dy in -ring..=ring {
            for dx in -ring..=ring {
                if dx.abs() != ring && dy.abs() != ring {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if valid.is_set(x, y) {
                    return Some((x as usize, y as usize));
                }
            }
        }
    }
    None
}

/// Region grower bound to one grid layout.
#[derive(Debug, Clone)]
pub struct SurfaceGrower {
    params: GrowParams,
    /// World X of each column center.
    xs: Vec<f64>,
    /// World Y of each row center.
    ys: Vec<f64>,
}

impl SurfaceGrower {
    pub fn new(spec: &GridSpec, params: &GrowParams) -> Self {
        Self {
            params: params.clone(),
            xs: (0..spec.nx).map(|ix| spec.center_x(ix)).collect(),
            ys: (0..spec.ny).map(|iy| spec.center_y(iy)).collect(),
        }
    }

    /// Grow a region over `heights` / `valid`.
    ///
    /// `z_range` is the cloud's `z_max - z_min` and scales the acceptance
    /// tolerance. Without any valid cell the input is returned unchanged
    /// with an empty mask.
    pub fn grow(&self, heights: &HeightMap, valid: &ValidMask, z_range: f64) -> FittedSurface {
        let (nx, ny) = (heights.nx(), heights.ny());
        let mut out = heights.clone();
        let mut mask = Grid::new(nx, ny, false);
        let mut stats = GrowthStats::default();

        let Some(seed) = find_seed(valid) else {
            debug!("No valid seed cell, returning input surface");
            return FittedSurface {
                heights: out,
                mask,
                seed: None,
                stats,
            };
        };

        let tolerance = (self.params.acceptance_fraction * z_range).max(MIN_TOLERANCE);
        let trim_floor = (self.params.trim_fraction * z_range).max(MIN_TOLERANCE);
        let mut scratch = Vec::new();
        let mut visited = Grid::new(nx, ny, false);
        let mut queue = VecDeque::new();
        let mut window = Vec::with_capacity((2 * self.params.window_radius + 1).pow(2));

        // Running mean of accepted heights; starts at the seed's raw height
        // and is replaced by the first accepted value.
        let mut region_mean = *heights.at(seed.0, seed.1);
        let mut region_count = 0usize;

        visited.set(seed.0, seed.1, true);
        match self.fit_at(seed, heights, valid, trim_floor, &mut window, &mut scratch) {
            Ok(plane) => {
                let value = plane.c;
                out.set(seed.0, seed.1, value);
                mask.set(seed.0, seed.1, true);
                region_count += 1;
                region_mean += (value - region_mean) / region_count as f64;
                stats.accepted += 1;
            }
            Err(Verdict::Singular) => stats.singular_skipped += 1,
            Err(_) => stats.sparse_skipped += 1,
        }
        queue.push_back(seed);

        while let Some((ix, iy)) = queue.pop_front() {
            for (dx, dy) in OFFSETS_4 {
                let (x, y) = (ix as isize + dx, iy as isize + dy);
                if x < 0 || y < 0 || x >= nx as isize || y >= ny as isize {
                    continue;
                }
                let cell = (x as usize, y as usize);
                if *visited.at(cell.0, cell.1) {
                    continue;
                }
                visited.set(cell.0, cell.1, true);

                let fit = self.fit_at(cell, heights, valid, trim_floor, &mut window, &mut scratch);
                match Self::evaluate(cell, fit, heights, valid, tolerance, region_mean) {
                    Verdict::Accept(value) => {
                        out.set(cell.0, cell.1, value);
                        mask.set(cell.0, cell.1, true);
                        region_count += 1;
                        region_mean += (value - region_mean) / region_count as f64;
                        stats.accepted += 1;
                        queue.push_back(cell);
                    }
                    Verdict::Reject => stats.rejected += 1,
                    Verdict::Sparse => stats.sparse_skipped += 1,
                    Verdict::Singular => stats.singular_skipped += 1,
                }
            }
        }

        debug!(
            seed_x = seed.0,
            seed_y = seed.1,
            accepted = stats.accepted,
            rejected = stats.rejected,
            sparse = stats.sparse_skipped,
            singular = stats.singular_skipped,
            region_mean,
            "Surface growth complete"
        );

        FittedSurface {
            heights: out,
            mask,
            seed: Some(seed),
            stats,
        }
    }

    /// Test one candidate's fit against the region.
    fn evaluate(
        cell: (usize, usize),
        fit: Result<Plane, Verdict>,
        heights: &HeightMap,
        valid: &ValidMask,
        tolerance: f64,
        region_mean: f64,
    ) -> Verdict {
        let plane = match fit {
            Ok(plane) => plane,
            Err(verdict) => return verdict,
        };
        // Coordinates are relative to the cell center, so the prediction
        // at the candidate is the intercept.
        let predicted = plane.c;
        let reference = if *valid.at(cell.0, cell.1) {
            *heights.at(cell.0, cell.1)
        } else {
            region_mean
        };

        if (predicted - reference).abs() <= tolerance {
            Verdict::Accept(predicted)
        } else {
            Verdict::Reject
        }
    }

    /// Fit the window plane around `cell`.
    ///
    /// After each fit, samples whose residual exceeds a robust cutoff are
    /// dropped and the plane is refitted, until a pass removes nothing or
    /// `refit_passes` is spent. The cutoff is `trim_sigmas` robust standard
    /// deviations of the current residuals, never below `trim_floor`, and
    /// independent of the acceptance tolerance.
    fn fit_at(
        &self,
        (ix, iy): (usize, usize),
        heights: &HeightMap,
        valid: &ValidMask,
        trim_floor: f64,
        window: &mut Vec<Point3<f64>>,
        scratch: &mut Vec<f64>,
    ) -> Result<Plane, Verdict> {
        self.gather(ix, iy, heights, valid, window);
        let min_samples = self.params.min_window_samples.max(3);
        if window.len() < min_samples {
            return Err(Verdict::Sparse);
        }

        let mut plane = fit_plane(window, self.params.pivot_epsilon).ok_or(Verdict::Singular)?;
        for _ in 0..self.params.refit_passes {
            scratch.clear();
            scratch.extend(window.iter().map(|p| plane.residual(p).abs()));
            let cutoff = (self.params.trim_sigmas * MAD_TO_SIGMA * median(scratch)).max(trim_floor);

            let before = window.len();
            window.retain(|p| plane.residual(p).abs() <= cutoff);
            if window.len() == before {
                break;
            }
            if window.len() < min_samples {
                return Err(Verdict::Sparse);
            }
            plane = fit_plane(window, self.params.pivot_epsilon).ok_or(Verdict::Singular)?;
        }
        Ok(plane)
    }

    /// Collect valid window samples in coordinates relative to the center
    /// of cell `(ix, iy)`.
    fn gather(
        &self,
        ix: usize,
        iy: usize,
        heights: &HeightMap,
        valid: &ValidMask,
        window: &mut Vec<Point3<f64>>,
    ) {
        window.clear();
        let r = self.params.window_radius;
        let (cx, cy) = (self.xs[ix], self.ys[iy]);
        let x_range = ix.saturating_sub(r)..=(ix + r).min(self.xs.len() - 1);
        for y in iy.saturating_sub(r)..=(iy + r).min(self.ys.len() - 1) {
            for x in x_range.clone() {
                if *valid.at(x, y) {
                    window.push(Point3::new(self.xs[x] - cx, self.ys[y] - cy, *heights.at(x, y)));
                }
            }
        }
    }

    /// Valid samples in the window of `(ix, iy)`.
    pub fn window_sample_count(&self, ix: usize, iy: usize, valid: &ValidMask) -> usize {
        let r = self.params.window_radius;
        let mut count = 0;
        for y in iy.saturating_sub(r)..=(iy + r).min(self.ys.len() - 1) {
            for x in ix.saturating_sub(r)..=(ix + r).min(self.xs.len() - 1) {
                if *valid.at(x, y) {
                    count += 1;
                }
            }
        }
        count
    }
}

/// Median of `values`, reordering them. Zero for an empty slice.
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    *upper
}

/// Grow a surface over the maps of one binning call.
pub fn grow_surface(
    spec: &GridSpec,
    heights: &HeightMap,
    valid: &ValidMask,
    z_range: f64,
    params: &GrowParams,
) -> FittedSurface {
    SurfaceGrower::new(spec, params).grow(heights, valid, z_range)
}
