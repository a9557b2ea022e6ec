//! The reconstruction pipeline and its configuration.
//!
//! One configurable pipeline runs the stages in a fixed order:
//!
//! 1. Binning onto an XY grid
//! 2. Bilateral smoothing of the height map, then resampling every input
//!    point's z from the smoothed map
//! 3. Plane-fit region growing
//! 4. Boundary extraction
//! 5. Meshing
//! 6. Edge outlier filtering (optional)
//!
//! Normalization, when enabled, is applied last to both the mesh and the
//! smoothed points so they stay co-registered.
//!
//! # Example
//!
//! ```
//! use skin_recon::{Pipeline, ReconstructionParams, Sample};
//!
//! let samples: Vec<Sample> = (0..400)
//!     .map(|i| Sample::new((i % 20) as f64 * 0.05, (i / 20) as f64 * 0.05, 1.0))
//!     .collect();
//!
//! let result = Pipeline::new(ReconstructionParams::default())
//!     .run(&samples)
//!     .unwrap();
//!
//! assert_eq!(result.smoothed_points.len(), samples.len());
//! assert!(result.mesh.indices_in_range());
//! ```

use std::thread::JoinHandle;

use nalgebra::Point3;
use tracing::{debug, info};

use crate::binning::{BinningParams, BinningPolicy, Resolution, bin_samples};
use crate::boundary::{BoundaryLoop, BoundaryParams, extract_boundary};
use crate::error::{SkinError, SkinResult};
use crate::grid::GridSpec;
use crate::grow::{GrowParams, GrowthStats, grow_surface};
use crate::meshing::{MeshInput, MeshParams, build_mesh};
use crate::outliers::{OutlierParams, OutlierPolicy, OutlierReport, filter_outliers};
use crate::progress::{ProgressCallback, ProgressTracker, SharedProgressTracker, Stage, shared_tracker};
use crate::sampler::GridSampler;
use crate::smooth::{BilateralSmoother, SmoothParams};
use crate::tracing_ext::{OperationTimer, log_grid_stats, log_mesh_stats, log_stage_progress};
use crate::transform::{NormalizeParams, TransformParams};
use crate::types::{Mesh, Sample};

// =========================================================================
// Configuration
// =========================================================================

/// Every tunable of one reconstruction.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ReconstructionParams {
    pub binning: BinningParams,
    pub smoothing: SmoothParams,
    pub growing: GrowParams,
    pub boundary: BoundaryParams,
    pub meshing: MeshParams,
    /// Edge outlier filter; skipped when None.
    #[cfg_attr(
        feature = "pipeline-config",
        serde(skip_serializing_if = "Option::is_none")
    )]
    pub outliers: Option<OutlierParams>,
    pub transform: NormalizeParams,
}

impl ReconstructionParams {
    /// Adaptive grid and outlier filtering for full body scans, with
    /// outputs normalized for display.
    pub fn for_body_scan() -> Self {
        Self {
            binning: BinningParams::adaptive(0.01, 32, 256, BinningPolicy::Average),
            outliers: Some(OutlierParams::default()),
            transform: NormalizeParams {
                apply: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Front-most binning and heavier smoothing for clouds where the body
    /// folds over itself along the view axis.
    pub fn for_self_occluding() -> Self {
        Self {
            binning: BinningParams {
                policy: BinningPolicy::NearestFront,
                ..Default::default()
            },
            smoothing: SmoothParams::strong(),
            growing: GrowParams::with_window_radius(3),
            boundary: BoundaryParams::trace(),
            ..Default::default()
        }
    }

    /// Number of stages a run with these params reports.
    pub fn stage_count(&self) -> u64 {
        if self.outliers.is_some() { 6 } else { 5 }
    }

    /// Reject parameters no stage can work with.
    ///
    /// # Errors
    ///
    /// Returns [`SkinError::InvalidParameter`] naming the first offending
    /// field.
    pub fn validate(&self) -> SkinResult<()> {
        if let Resolution::Adaptive {
            cell_size,
            min_res,
            max_res,
        } = self.binning.resolution
        {
            if cell_size.is_nan() {
                return Err(SkinError::invalid_parameter(
                    "binning.resolution.cell_size",
                    "must be a number",
                ));
            }
            if min_res > max_res {
                return Err(SkinError::invalid_parameter(
                    "binning.resolution.min_res",
                    format!("min_res {min_res} exceeds max_res {max_res}"),
                ));
            }
        }

        let s = &self.smoothing;
        positive("smoothing.sigma_space", s.sigma_space)?;
        positive("smoothing.depth_fraction", s.depth_fraction)?;
        if let Some(sigma) = s.sigma_depth {
            positive("smoothing.sigma_depth", sigma)?;
        }

        let g = &self.growing;
        non_negative("growing.acceptance_fraction", g.acceptance_fraction)?;
        positive("growing.pivot_epsilon", g.pivot_epsilon)?;
        positive("growing.trim_sigmas", g.trim_sigmas)?;
        non_negative("growing.trim_fraction", g.trim_fraction)?;
        if g.min_window_samples < 3 {
            return Err(SkinError::invalid_parameter(
                "growing.min_window_samples",
                "a plane needs at least 3 samples",
            ));
        }

        if let Some(o) = &self.outliers {
            non_negative("outliers.threshold", o.threshold)?;
            positive("outliers.radius", o.radius)?;
            if let Some(cell) = o.cell_size {
                positive("outliers.cell_size", cell)?;
            }
            if let OutlierPolicy::Density {
                sparse_cutoff,
                dense_cutoff,
            } = o.policy
                && sparse_cutoff > dense_cutoff
            {
                return Err(SkinError::invalid_parameter(
                    "outliers.policy.sparse_cutoff",
                    format!("sparse cutoff {sparse_cutoff} exceeds dense cutoff {dense_cutoff}"),
                ));
            }
        }

        positive("transform.target_size", self.transform.target_size)?;
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> SkinResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SkinError::invalid_parameter(
            name,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

fn non_negative(name: &str, value: f64) -> SkinResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SkinError::invalid_parameter(
            name,
            format!("must be finite and non-negative, got {value}"),
        ))
    }
}

#[cfg(feature = "pipeline-config")]
impl ReconstructionParams {
    /// Parse parameters from a TOML string. Missing fields keep defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load parameters from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a TOML file.
    pub fn save_toml(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Errors that can occur when loading or saving parameter files.
#[cfg(feature = "pipeline-config")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Parsing or serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =========================================================================
// Execution
// =========================================================================

/// Everything one reconstruction produces.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// The triangulated skin.
    pub mesh: Mesh,
    /// Input points with z resampled from the smoothed height map; same
    /// length and order as the input.
    pub smoothed_points: Vec<Point3<f64>>,
    /// Dataset normalization. Already applied to `mesh` and
    /// `smoothed_points` when normalization was enabled.
    pub transform: TransformParams,
    /// Whether `transform` was applied to the outputs.
    pub normalized: bool,
    /// Silhouette of the grown region, in world XY.
    pub boundary: BoundaryLoop,
    /// Grid the maps were built on.
    pub spec: GridSpec,
    /// Cells observed by binning.
    pub valid_cells: usize,
    /// Seed cell of the grown region.
    pub seed: Option<(usize, usize)>,
    pub growth: GrowthStats,
    /// Edge outlier report, when the filter ran.
    pub outliers: Option<OutlierReport>,
    /// Human-readable summary of each finished stage.
    pub stage_log: Vec<String>,
}

/// Configured reconstruction run.
///
/// # Example
///
/// ```
/// use skin_recon::{Pipeline, ReconstructionParams, Sample};
/// use skin_recon::progress::Progress;
///
/// let samples = vec![
///     Sample::new(0.0, 0.0, 0.0),
///     Sample::new(1.0, 0.0, 0.0),
///     Sample::new(0.0, 1.0, 0.0),
/// ];
/// let result = Pipeline::new(ReconstructionParams::default())
///     .with_progress(Box::new(|p: &Progress| {
///         println!("[{}/{}] {}", p.current, p.total, p.message);
///         true
///     }))
///     .run(&samples)
///     .unwrap();
/// assert_eq!(result.smoothed_points.len(), 3);
/// ```
pub struct Pipeline {
    params: ReconstructionParams,
    progress_callback: Option<ProgressCallback>,
    tracker: Option<SharedProgressTracker>,
}

impl Pipeline {
    pub fn new(params: ReconstructionParams) -> Self {
        Self {
            params,
            progress_callback: None,
            tracker: None,
        }
    }

    /// Set a callback invoked after every stage. Returning `false` cancels
    /// the run before the next stage.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Share a tracker so another thread can observe or cancel the run.
    pub fn with_tracker(mut self, tracker: SharedProgressTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn params(&self) -> &ReconstructionParams {
        &self.params
    }

    /// Run every stage over `samples`.
    ///
    /// # Errors
    ///
    /// - [`SkinError::InvalidParameter`] if the params fail validation
    /// - [`SkinError::EmptyInput`] if there is no finite sample
    /// - [`SkinError::Cancelled`] if cancellation was requested
    pub fn run(&self, samples: &[Sample]) -> SkinResult<Reconstruction> {
        self.params.validate()?;

        let local;
        let tracker: &ProgressTracker = match &self.tracker {
            Some(shared) => shared.as_ref(),
            None => {
                local = ProgressTracker::new(self.params.stage_count());
                &local
            }
        };
        let run = StageRunner {
            tracker,
            callback: self.progress_callback.as_ref(),
        };
        let params = &self.params;
        let mut stage_log = Vec::with_capacity(6);
        let points: Vec<Point3<f64>> = samples.iter().map(|s| s.position).collect();

        run.check(Stage::Binning)?;
        let binned = {
            let _timer = OperationTimer::with_context("binning", 0, samples.len());
            bin_samples(samples, &params.binning)?
        };
        let spec = binned.spec;
        log_grid_stats(&spec, &binned.valid, "binned");
        run.finish(
            Stage::Binning,
            format!(
                "Binned {} points into {}x{} cells ({} observed)",
                samples.len(),
                spec.nx,
                spec.ny,
                binned.valid_count()
            ),
            &mut stage_log,
        );

        run.check(Stage::Smoothing)?;
        let (smoothed, smoothed_points) = {
            let _timer = OperationTimer::with_context("smoothing", spec.cell_count(), samples.len());
            let smoothed = BilateralSmoother::new(&params.smoothing).smooth(&binned.heights, &binned.valid);
            let resampled = GridSampler::new(&spec, &smoothed).resample_all(&points);
            (smoothed, resampled)
        };
        run.finish(
            Stage::Smoothing,
            format!("Smoothed height map ({} iterations)", params.smoothing.iterations),
            &mut stage_log,
        );

        run.check(Stage::Growing)?;
        let fitted = {
            let _timer = OperationTimer::with_context("growing", spec.cell_count(), samples.len());
            grow_surface(
                &spec,
                &smoothed,
                &binned.valid,
                binned.z_range(),
                &params.growing,
            )
        };
        log_grid_stats(&spec, &fitted.mask, "grown");
        run.finish(
            Stage::Growing,
            format!(
                "Grew {} cells ({} rejected, {} sparse, {} singular)",
                fitted.grown_count(),
                fitted.stats.rejected,
                fitted.stats.sparse_skipped,
                fitted.stats.singular_skipped
            ),
            &mut stage_log,
        );

        run.check(Stage::Boundary)?;
        let boundary = {
            let _timer = OperationTimer::new("boundary");
            extract_boundary(&spec, &fitted.mask, &params.boundary)
        };
        run.finish(
            Stage::Boundary,
            format!("Extracted boundary with {} points", boundary.len()),
            &mut stage_log,
        );

        run.check(Stage::Meshing)?;
        let mut mesh = {
            let _timer = OperationTimer::new("meshing");
            let input = MeshInput {
                spec: &spec,
                fitted: &fitted,
                colors: binned.colors.as_ref(),
                boundary: &boundary,
            };
            build_mesh(&input, &params.meshing)
        };
        log_mesh_stats(&mesh, "meshed");
        run.finish(
            Stage::Meshing,
            format!(
                "Built mesh with {} vertices and {} faces",
                mesh.vertex_count(),
                mesh.face_count()
            ),
            &mut stage_log,
        );

        let outliers = match &params.outliers {
            Some(outlier_params) => {
                run.check(Stage::OutlierFilter)?;
                let report = {
                    let _timer = OperationTimer::with_context("outlier_filter", 0, points.len());
                    filter_outliers(&points, &smoothed_points, outlier_params)?
                };
                run.finish(
                    Stage::OutlierFilter,
                    format!("Flagged {} edge outliers", report.rejected.len()),
                    &mut stage_log,
                );
                Some(report)
            }
            None => None,
        };

        let transform = TransformParams::from_points(&points, params.transform.target_size);
        let mut smoothed_points = smoothed_points;
        if params.transform.apply {
            transform.apply_mesh(&mut mesh);
            transform.apply_points(&mut smoothed_points);
            debug!(
                scale = transform.scale_factor,
                center = ?transform.center,
                "Normalized outputs"
            );
        }

        info!(
            points = samples.len(),
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            grown = fitted.grown_count(),
            "Reconstruction complete"
        );

        Ok(Reconstruction {
            mesh,
            smoothed_points,
            transform,
            normalized: params.transform.apply,
            boundary,
            spec,
            valid_cells: binned.valid_count(),
            seed: fitted.seed,
            growth: fitted.stats,
            outliers,
            stage_log,
        })
    }
}

struct StageRunner<'a> {
    tracker: &'a ProgressTracker,
    callback: Option<&'a ProgressCallback>,
}

impl StageRunner<'_> {
    fn check(&self, stage: Stage) -> SkinResult<()> {
        if self.tracker.is_cancelled() {
            debug!(stage = stage.name(), "Reconstruction cancelled");
            return Err(SkinError::cancelled(stage.name()));
        }
        Ok(())
    }

    fn finish(&self, stage: Stage, message: String, log: &mut Vec<String>) {
        debug!(stage = stage.name(), "{}", message);
        self.tracker.complete_stage(self.callback, message.as_str());
        log_stage_progress(stage.name(), self.tracker.current(), self.tracker.total());
        log.push(message);
    }
}

/// Reconstruct with the given params.
pub fn reconstruct(samples: &[Sample], params: &ReconstructionParams) -> SkinResult<Reconstruction> {
    Pipeline::new(params.clone()).run(samples)
}

/// Run a reconstruction on a background thread.
///
/// The returned tracker reports finished stages and can cancel the run;
/// the handle yields the result once.
///
/// # Example
///
/// ```
/// use skin_recon::{ReconstructionParams, Sample, spawn_reconstruction};
///
/// let samples: Vec<Sample> = (0..100)
///     .map(|i| Sample::new((i % 10) as f64, (i / 10) as f64, 0.5))
///     .collect();
/// let (handle, tracker) = spawn_reconstruction(samples, ReconstructionParams::default());
/// let result = handle.join().unwrap().unwrap();
/// assert_eq!(tracker.current(), tracker.total());
/// assert_eq!(result.smoothed_points.len(), 100);
/// ```
pub fn spawn_reconstruction(
    samples: Vec<Sample>,
    params: ReconstructionParams,
) -> (JoinHandle<SkinResult<Reconstruction>>, SharedProgressTracker) {
    let tracker = shared_tracker(params.stage_count());
    let worker_tracker = tracker.clone();
    let handle = std::thread::spawn(move || {
        Pipeline::new(params)
            .with_tracker(worker_tracker)
            .run(&samples)
    });
    (handle, tracker)
}
