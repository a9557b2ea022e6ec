//! Projection of a point cloud onto a regular XY grid.
//!
//! Binning turns an unordered cloud into a height field: every finite
//! sample lands in the cell under its XY position, and each cell keeps
//! either the mean of its samples or the front-most one. Cells that
//! receive nothing are filled with the global mean so later stages never
//! see sentinel gaps; the [`ValidMask`] still records which cells were
//! really observed.

use nalgebra::Point3;
use tracing::{debug, warn};

use crate::error::{SkinError, SkinResult};
use crate::grid::{ColorMap, Grid, GridSpec, HeightMap, ValidMask};
use crate::types::{Sample, VertexColor};

/// How samples sharing one cell are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum BinningPolicy {
    /// Arithmetic mean of z and color.
    #[default]
    Average,
    /// Keep only the sample with the largest z (self-occluding clouds).
    NearestFront,
}

/// How grid dimensions are chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "mode", rename_all = "snake_case")
)]
pub enum Resolution {
    /// Fixed cell counts along X and Y.
    Fixed { nx: usize, ny: usize },
    /// Cell counts derived from a physical cell size, clamped per axis.
    Adaptive {
        cell_size: f64,
        min_res: usize,
        max_res: usize,
    },
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Fixed { nx: 64, ny: 64 }
    }
}

impl Resolution {
    /// Resolve to concrete `(nx, ny)` for a bounding box of the given spans.
    ///
    /// Both results are at least 1.
    pub fn resolve(&self, span_x: f64, span_y: f64) -> (usize, usize) {
        match *self {
            Resolution::Fixed { nx, ny } => (nx.max(1), ny.max(1)),
            Resolution::Adaptive {
                cell_size,
                min_res,
                max_res,
            } => {
                let lo = min_res.max(1);
                let hi = max_res.max(lo);
                if !(cell_size.is_finite() && cell_size > 0.0) {
                    return (lo, lo);
                }
                let axis = |span: f64| {
                    let n = (span / cell_size).round();
                    if n.is_finite() {
                        (n.max(0.0) as usize).clamp(lo, hi)
                    } else {
                        hi
                    }
                };
                (axis(span_x), axis(span_y))
            }
        }
    }
}

/// Parameters for binning.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BinningParams {
    pub policy: BinningPolicy,
    pub resolution: Resolution,
}

impl BinningParams {
    /// Fixed `nx * ny` grid with the given policy.
    pub fn fixed(nx: usize, ny: usize, policy: BinningPolicy) -> Self {
        Self {
            policy,
            resolution: Resolution::Fixed { nx, ny },
        }
    }

    /// Adaptive grid from a physical cell size.
    pub fn adaptive(cell_size: f64, min_res: usize, max_res: usize, policy: BinningPolicy) -> Self {
        Self {
            policy,
            resolution: Resolution::Adaptive {
                cell_size,
                min_res,
                max_res,
            },
        }
    }
}

/// Maps produced by one binning call. All grids share `spec`.
#[derive(Debug, Clone)]
pub struct BinnedGrid {
    pub spec: GridSpec,
    /// Per-cell height; holes hold the global mean of valid cells.
    pub heights: HeightMap,
    /// True where at least one sample landed.
    pub valid: ValidMask,
    /// Per-cell color, present when the input carried colors.
    pub colors: Option<ColorMap>,
    /// Samples that landed in each cell.
    pub counts: Grid<u32>,
    /// Global z range over all finite samples.
    pub z_min: f64,
    pub z_max: f64,
}

impl BinnedGrid {
    /// Observed height range `z_max - z_min`.
    #[inline]
    pub fn z_range(&self) -> f64 {
        self.z_max - self.z_min
    }

    /// Number of observed cells.
    pub fn valid_count(&self) -> usize {
        self.valid.count_true()
    }
}

/// Bin [`Sample`]s, using their colors when any sample carries one.
///
/// Uncolored samples in a partially colored cloud contribute
/// [`VertexColor::NEUTRAL`].
pub fn bin_samples(samples: &[Sample], params: &BinningParams) -> SkinResult<BinnedGrid> {
    let points: Vec<Point3<f64>> = samples.iter().map(|s| s.position).collect();
    let colors: Option<Vec<VertexColor>> = samples.iter().any(|s| s.color.is_some()).then(|| {
        samples
            .iter()
            .map(|s| s.color.unwrap_or(VertexColor::NEUTRAL))
            .collect()
    });
    bin_points(&points, colors.as_deref(), params)
}

/// Bin points with an optional parallel color array.
///
/// # Errors
///
/// Returns [`SkinError::EmptyInput`] if `points` is empty or holds no
/// finite sample.
pub fn bin_points(
    points: &[Point3<f64>],
    colors: Option<&[VertexColor]>,
    params: &BinningParams,
) -> SkinResult<BinnedGrid> {
    if points.is_empty() {
        return Err(SkinError::empty_input("no points to bin"));
    }

    let colors = match colors {
        Some(c) if c.len() != points.len() => {
            warn!(
                points = points.len(),
                colors = c.len(),
                "Color array length does not match point count, ignoring colors"
            );
            None
        }
        other => other,
    };

    let is_finite = |p: &Point3<f64>| p.iter().all(|c| c.is_finite());
    let mut finite = 0usize;
    let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points.iter().filter(|p| is_finite(p)) {
        finite += 1;
        min = min.inf(p);
        max = max.sup(p);
    }

    if finite == 0 {
        return Err(SkinError::empty_input(format!(
            "all {} points have non-finite coordinates",
            points.len()
        )));
    }
    if finite < points.len() {
        warn!(
            skipped = points.len() - finite,
            "Skipping points with non-finite coordinates"
        );
    }

    let (nx, ny) = params
        .resolution
        .resolve(floored_span(max.x - min.x), floored_span(max.y - min.y));
    let spec = GridSpec::new(nx, ny, min.x, min.y, max.x, max.y);
    let cells = spec.cell_count();

    let mut counts = vec![0u32; cells];
    let mut z_acc = vec![0.0f64; cells];
    let mut rgb_acc = colors.map(|_| vec![[0.0f64; 3]; cells]);

    for (i, p) in points.iter().enumerate() {
        if !is_finite(p) {
            continue;
        }
        let (ix, iy) = spec.cell_of(p.x, p.y);
        let cell = spec.index(ix, iy);
        let color = colors.map(|c| c[i]);
        let first = counts[cell] == 0;
        counts[cell] += 1;

        match params.policy {
            BinningPolicy::Average => {
                z_acc[cell] += p.z;
                if let (Some(acc), Some(c)) = (rgb_acc.as_mut(), color) {
                    acc[cell][0] += c.r as f64;
                    acc[cell][1] += c.g as f64;
                    acc[cell][2] += c.b as f64;
                }
            }
            BinningPolicy::NearestFront => {
                if first || p.z > z_acc[cell] {
                    z_acc[cell] = p.z;
                    if let (Some(acc), Some(c)) = (rgb_acc.as_mut(), color) {
                        acc[cell] = [c.r as f64, c.g as f64, c.b as f64];
                    }
                }
            }
        }
    }

    // Averaging divides sums by counts; nearest-front already holds values.
    let divisor = |count: u32| match params.policy {
        BinningPolicy::Average => count as f64,
        BinningPolicy::NearestFront => 1.0,
    };

    let valid: Vec<bool> = counts.iter().map(|&c| c > 0).collect();
    let valid_count = valid.iter().filter(|&&v| v).count();

    let mut heights = vec![0.0f64; cells];
    let mut height_sum = 0.0;
    for cell in 0..cells {
        if valid[cell] {
            heights[cell] = z_acc[cell] / divisor(counts[cell]);
            height_sum += heights[cell];
        }
    }
    let mean_height = height_sum / valid_count as f64;
    for cell in 0..cells {
        if !valid[cell] {
            heights[cell] = mean_height;
        }
    }

    let colors = rgb_acc.map(|acc| {
        let mut channels = [vec![0.0f64; cells], vec![0.0f64; cells], vec![0.0f64; cells]];
        let mut channel_sum = [0.0f64; 3];
        for cell in (0..cells).filter(|&c| valid[c]) {
            for k in 0..3 {
                let value = acc[cell][k] / divisor(counts[cell]);
                channels[k][cell] = value;
                channel_sum[k] += value;
            }
        }
        for cell in (0..cells).filter(|&c| !valid[c]) {
            for k in 0..3 {
                channels[k][cell] = channel_sum[k] / valid_count as f64;
            }
        }
        let [r, g, b] = channels.map(|data| Grid::from_parts(nx, ny, data));
        ColorMap { r, g, b }
    });

    debug!(
        nx,
        ny,
        valid_cells = valid_count,
        skipped = points.len() - finite,
        z_min = min.z,
        z_max = max.z,
        "Binned points onto grid"
    );

    Ok(BinnedGrid {
        spec,
        heights: Grid::from_parts(nx, ny, heights),
        valid: Grid::from_parts(nx, ny, valid),
        colors,
        counts: Grid::from_parts(nx, ny, counts),
        z_min: min.z,
        z_max: max.z,
    })
}

fn floored_span(span: f64) -> f64 {
    if span.is_finite() && span > crate::grid::MIN_SPAN {
        span
    } else {
        1.0
    }
}
