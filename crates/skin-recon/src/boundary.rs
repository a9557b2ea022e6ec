//! Silhouette extraction from a cell mask.
//!
//! Two strategies produce an ordered, closed 2D loop around the set cells:
//!
//! - [`BoundaryStrategy::AngularSort`] collects every set cell with an
//!   empty 4-neighbor, orders them by angle around their centroid and
//!   rounds the polygon with corner cutting. Robust and smooth, but
//!   re-entrant shapes can be misordered.
//! - [`BoundaryStrategy::ContourTrace`] walks the boundary band cell by
//!   cell. It follows the outline faithfully where it can, but may stop
//!   early on spurs and miss concavities.
//!
//! Neither is authoritative; the angular sort is the default.

use nalgebra::Point2;
use tracing::debug;

use crate::grid::{GridSpec, OFFSETS_4, OFFSETS_8, ValidMask};

/// Gap between first and last point above which a closing point is added.
pub const CLOSE_EPSILON: f64 = 1e-6;

/// Boundary extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum BoundaryStrategy {
    /// Angular sort around the centroid plus corner cutting.
    #[default]
    AngularSort,
    /// Cell-by-cell walk along the boundary band.
    ContourTrace,
}

/// Parameters for boundary extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BoundaryParams {
    pub strategy: BoundaryStrategy,
    /// Corner-cutting passes for the angular sort. Default: 2
    pub smoothing_iterations: usize,
}

impl Default for BoundaryParams {
    fn default() -> Self {
        Self {
            strategy: BoundaryStrategy::AngularSort,
            smoothing_iterations: 2,
        }
    }
}

impl BoundaryParams {
    /// Contour tracing, no smoothing.
    pub fn trace() -> Self {
        Self {
            strategy: BoundaryStrategy::ContourTrace,
            smoothing_iterations: 0,
        }
    }
}

/// An ordered closed loop of world XY points.
///
/// A non-empty loop has its first and last points within
/// [`CLOSE_EPSILON`] of each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryLoop {
    pub points: Vec<Point2<f64>>,
}

impl BoundaryLoop {
    /// Build a loop from open points, appending a closing point if needed.
    pub fn closed(mut points: Vec<Point2<f64>>) -> Self {
        if let (Some(&first), Some(&last)) = (points.first(), points.last())
            && (first - last).norm() > CLOSE_EPSILON
        {
            points.push(first);
        }
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True for an empty loop or one whose ends meet.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first - last).norm() <= CLOSE_EPSILON,
            _ => true,
        }
    }

    /// Points without the closing duplicate.
    pub fn open_points(&self) -> &[Point2<f64>] {
        match self.points.len() {
            0 | 1 => &self.points,
            n if (self.points[0] - self.points[n - 1]).norm() <= CLOSE_EPSILON => {
                &self.points[..n - 1]
            }
            _ => &self.points,
        }
    }

    /// Perimeter length of the closed loop.
    pub fn perimeter(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }
}

/// Extract the boundary of `mask` with the configured strategy.
pub fn extract_boundary(spec: &GridSpec, mask: &ValidMask, params: &BoundaryParams) -> BoundaryLoop {
    let loop_ = match params.strategy {
        BoundaryStrategy::AngularSort => angular_sort(spec, mask, params.smoothing_iterations),
        BoundaryStrategy::ContourTrace => trace_contour(spec, mask),
    };
    debug!(
        strategy = ?params.strategy,
        points = loop_.len(),
        "Extracted boundary"
    );
    loop_
}

/// True for a set cell with an empty or out-of-range neighbor under `offsets`.
fn on_edge(mask: &ValidMask, ix: usize, iy: usize, offsets: &[(isize, isize)]) -> bool {
    *mask.at(ix, iy)
        && offsets
            .iter()
            .any(|&(dx, dy)| !mask.is_set(ix as isize + dx, iy as isize + dy))
}

/// Angular sort of 4-boundary cell centers with corner cutting.
pub fn angular_sort(spec: &GridSpec, mask: &ValidMask, iterations: usize) -> BoundaryLoop {
    let mut points: Vec<Point2<f64>> = Vec::new();
    for iy in 0..mask.ny() {
        for ix in 0..mask.nx() {
            if on_edge(mask, ix, iy, &OFFSETS_4) {
                points.push(spec.cell_center(ix, iy));
            }
        }
    }
    if points.is_empty() {
        return BoundaryLoop::default();
    }

    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(Point2::origin(), |acc, p| acc + p.coords / n);
    points.sort_by(|a, b| {
        let ta = (a.y - centroid.y).atan2(a.x - centroid.x);
        let tb = (b.y - centroid.y).atan2(b.x - centroid.x);
        ta.total_cmp(&tb)
    });

    for _ in 0..iterations {
        if points.len() < 2 {
            break;
        }
        points = corner_cut(&points);
    }
    BoundaryLoop::closed(points)
}

/// One pass of corner cutting on a closed polygon: each edge is replaced by
/// its 1/4 and 3/4 points.
pub fn corner_cut(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let n = points.len();
    let mut out = Vec::with_capacity(n * 2);
    for i in 0..n {
        let p0 = points[i];
        let p1 = points[(i + 1) % n];
        out.push(p0 + (p1 - p0) * 0.25);
        out.push(p0 + (p1 - p0) * 0.75);
    }
    out
}

/// Walk the 8-boundary band from its first cell in scan order.
///
/// Moves between 4-adjacent band cells, preferring forward, then left,
/// right and back relative to the current heading. Stops when the start
/// comes up again or every band neighbor has been visited.
pub fn trace_contour(spec: &GridSpec, mask: &ValidMask) -> BoundaryLoop {
    let (nx, ny) = (mask.nx(), mask.ny());
    let band: Vec<bool> = (0..nx * ny)
        .map(|i| on_edge(mask, i % nx, i / nx, &OFFSETS_8))
        .collect();
    let Some(start_index) = band.iter().position(|&b| b) else {
        return BoundaryLoop::default();
    };

    let in_band = |x: isize, y: isize| {
        x >= 0 && y >= 0 && (x as usize) < nx && (y as usize) < ny && band[y as usize * nx + x as usize]
    };

    let start = ((start_index % nx) as isize, (start_index / nx) as isize);
    let mut visited = vec![false; nx * ny];
    visited[start_index] = true;
    let mut path = vec![start];
    let mut current = start;
    let (mut hx, mut hy) = OFFSETS_4[0];

    'walk: loop {
        let turns = [(hx, hy), (-hy, hx), (hy, -hx), (-hx, -hy)];
        for (dx, dy) in turns {
            let next = (current.0 + dx, current.1 + dy);
            if !in_band(next.0, next.1) {
                continue;
            }
            if next == start {
                if path.len() > 2 {
                    break 'walk;
                }
                continue;
            }
            let idx = next.1 as usize * nx + next.0 as usize;
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            path.push(next);
            current = next;
            (hx, hy) = (dx, dy);
            continue 'walk;
        }
        break;
    }

    BoundaryLoop::closed(
        path.into_iter()
            .map(|(x, y)| spec.cell_center(x as usize, y as usize))
            .collect(),
    )
}
