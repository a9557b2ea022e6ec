//! Companion pass flagging points the smoother moved suspiciously far.
//!
//! Works on the raw cloud and its smoothed counterpart, point for point.
//! Interior points with many neighbors are trusted; near edges and in
//! sparse patches a point is rejected when smoothing displaced it and its
//! smoothed height also disagrees with the raw heights around it.

use hashbrown::HashMap;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{SkinError, SkinResult};

/// Rejection policy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum OutlierPolicy {
    /// Neighbor-count tiers: dense keeps, sparse uses the strict threshold,
    /// intermediate uses twice the threshold.
    Density {
        sparse_cutoff: usize,
        dense_cutoff: usize,
    },
    /// `|raw z - smoothed z|` against the threshold, no spatial context.
    Direct,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Density {
            sparse_cutoff: 3,
            dense_cutoff: 12,
        }
    }
}

/// Parameters for the edge outlier filter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct OutlierParams {
    pub policy: OutlierPolicy,
    /// Height difference threshold in world units. Default: 0.05
    pub threshold: f64,
    /// XY neighbor search radius in world units. Default: 0.05
    pub radius: f64,
    /// Spatial hash cell size; defaults to `radius`.
    pub cell_size: Option<f64>,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            policy: OutlierPolicy::default(),
            threshold: 0.05,
            radius: 0.05,
            cell_size: None,
        }
    }
}

impl OutlierParams {
    /// Direct raw-vs-smoothed comparison with one threshold.
    pub fn direct(threshold: f64) -> Self {
        Self {
            policy: OutlierPolicy::Direct,
            threshold,
            ..Default::default()
        }
    }

    fn hash_cell_size(&self) -> f64 {
        let cell = self.cell_size.unwrap_or(self.radius);
        if cell.is_finite() && cell > 0.0 { cell } else { 1.0 }
    }
}

/// Result of the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlierReport {
    /// One flag per input point; false means rejected.
    pub keep: Vec<bool>,
    /// Indices of rejected points, ascending.
    pub rejected: Vec<usize>,
}

impl OutlierReport {
    pub fn kept_count(&self) -> usize {
        self.keep.len() - self.rejected.len()
    }
}

/// Uniform XY hash for radius queries.
#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell: f64,
    map: HashMap<(i64, i64), Vec<usize>>,
}

impl SpatialHash {
    /// Index `points` by XY; z is ignored.
    pub fn build(points: &[Point3<f64>], cell: f64) -> Self {
        let mut map: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            map.entry(Self::key(p.x, p.y, cell)).or_default().push(i);
        }
        Self { cell, map }
    }

    #[inline]
    fn key(x: f64, y: f64, cell: f64) -> (i64, i64) {
        ((x / cell).floor() as i64, (y / cell).floor() as i64)
    }

    /// Candidate indices in cells overlapping the circle of radius `r`
    /// around `(x, y)`. Callers filter by exact distance.
    pub fn candidates(&self, x: f64, y: f64, r: f64) -> impl Iterator<Item = usize> + '_ {
        let reach = (r / self.cell).ceil().max(0.0) as i64;
        let (ix, iy) = Self::key(x, y, self.cell);
        (-reach..=reach).flat_map(move |dx| {
            (-reach..=reach)
                .filter_map(move |dy| self.map.get(&(ix + dx, iy + dy)))
                .flatten()
                .copied()
        })
    }

    /// Number of occupied cells.
    pub fn occupied_cells(&self) -> usize {
        self.map.len()
    }
}

/// Flag anomalous points given raw and smoothed clouds of equal length.
///
/// # Errors
///
/// Returns [`SkinError::MismatchedLengths`] when the sequences differ in
/// length.
pub fn filter_outliers(
    raw: &[Point3<f64>],
    smoothed: &[Point3<f64>],
    params: &OutlierParams,
) -> SkinResult<OutlierReport> {
    if raw.len() != smoothed.len() {
        return Err(SkinError::mismatched_lengths(
            "smoothed points",
            raw.len(),
            smoothed.len(),
        ));
    }
    if raw.is_empty() {
        return Ok(OutlierReport::default());
    }

    let threshold = params.threshold;
    let keep: Vec<bool> = match params.policy {
        OutlierPolicy::Direct => raw
            .par_iter()
            .zip(smoothed.par_iter())
            .map(|(r, s)| (r.z - s.z).abs() <= threshold)
            .collect(),
        OutlierPolicy::Density {
            sparse_cutoff,
            dense_cutoff,
        } => {
            let hash = SpatialHash::build(raw, params.hash_cell_size());
            let radius = params.radius;
            let r2 = radius * radius;
            (0..raw.len())
                .into_par_iter()
                .map(|i| {
                    let p = raw[i];
                    let (count, z_sum) = hash
                        .candidates(p.x, p.y, radius)
                        .filter(|&j| j != i)
                        .filter(|&j| {
                            let q = raw[j];
                            (q.x - p.x).powi(2) + (q.y - p.y).powi(2) <= r2
                        })
                        .fold((0usize, 0.0f64), |(n, sum), j| (n + 1, sum + raw[j].z));

                    if count >= dense_cutoff {
                        return true;
                    }
                    let tier = if count <= sparse_cutoff {
                        threshold
                    } else {
                        2.0 * threshold
                    };
                    let neighbor_mean = if count == 0 { p.z } else { z_sum / count as f64 };
                    let z = smoothed[i].z;
                    let displaced = (z - p.z).abs() > tier;
                    let disagrees = (z - neighbor_mean).abs() > tier;
                    !(displaced && disagrees)
                })
                .collect()
        }
    };

    let rejected: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| (!k).then_some(i))
        .collect();

    debug!(
        points = raw.len(),
        rejected = rejected.len(),
        policy = ?params.policy,
        "Edge outlier filter"
    );

    Ok(OutlierReport { keep, rejected })
}
