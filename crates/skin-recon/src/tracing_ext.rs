//! Tracing helpers for reconstruction stages.
//!
//! The library only emits events; installing a subscriber is up to the
//! host. With `tracing-subscriber`:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=skin_recon=debug for per-stage detail
//! ```
//!
//! # Targets
//!
//! - `skin_recon::timing`: stage durations from [`OperationTimer`]
//! - `skin_recon::grid_state`: binned and grown grid summaries
//! - `skin_recon::mesh_state`: mesh summaries
//! - `skin_recon::progress`: stage progress

use std::time::Instant;
use nalgebra::Vector3;
use tracing::{Span, debug, info};

use crate::grid::{GridSpec, ValidMask};
use crate::types::Mesh;

/// Logs the duration of a stage when dropped.
///
/// ```rust,ignore
/// use skin_recon::tracing_ext::OperationTimer;
///
/// fn stage() {
///     let _timer = OperationTimer::new("binning");
///     // ... work ...
/// } // duration logged here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("skin_stage", stage = name);
        debug!(target: "skin_recon::timing", stage = name, "Starting stage");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Timer whose span also records the grid size and input point count.
    pub fn with_context(name: &'static str, cells: usize, points: usize) -> Self {
        let span = tracing::info_span!("skin_stage", stage = name, cells = cells, points = points);
        debug!(
            target: "skin_recon::timing",
            stage = name,
            cells = cells,
            points = points,
            "Starting stage"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "skin_recon::timing",
            stage = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Stage completed"
        );
    }
}

/// Log grid dimensions and mask occupancy at debug level.
pub fn log_grid_stats(spec: &GridSpec, mask: &ValidMask, context: &str) {
    let cells = spec.cell_count();
    let occupied = mask.count_true();
    let fill = if cells > 0 {
        occupied as f64 / cells as f64 * 100.0
    } else {
        0.0
    };

    debug!(
        target: "skin_recon::grid_state",
        context = context,
        nx = spec.nx,
        ny = spec.ny,
        cell = format!("{:.4} x {:.4}", spec.cell_width(), spec.cell_height()),
        occupied = occupied,
        fill_percent = format!("{:.1}", fill),
        "Grid state"
    );
}

/// Log mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let dims = mesh
        .bounds()
        .map(|(min, max)| max - min)
        .unwrap_or_else(Vector3::zeros);

    debug!(
        target: "skin_recon::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        has_colors = mesh.has_colors(),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log stage progress at debug level.
pub fn log_stage_progress(stage: &str, current: u64, total: u64) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };

    debug!(
        target: "skin_recon::progress",
        stage = stage,
        current = current,
        total = total,
        percent = percent,
        "Progress update"
    );
}
