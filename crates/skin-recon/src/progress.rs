//! Stage-level progress reporting, cancellation and cost estimation.
//!
//! A reconstruction runs a fixed sequence of [`Stage`]s. Hosts can watch it
//! through a [`ProgressCallback`] invoked after every stage, and stop it
//! through a shared [`ProgressTracker`]. Cancellation is coarse: it takes
//! effect at the next stage boundary, where the finished stage's buffers
//! are simply dropped.
//!
//! # Example
//!
//! ```
//! use skin_recon::progress::{Progress, ProgressCallback};
//!
//! let callback: ProgressCallback = Box::new(|progress: &Progress| {
//!     println!("{}% {}", progress.percent(), progress.message);
//!     true // return false to cancel
//! });
//! # let _ = callback;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::grow::GrowParams;
use crate::smooth::SmoothParams;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Binning,
    Smoothing,
    Growing,
    Boundary,
    Meshing,
    OutlierFilter,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Binning,
        Stage::Smoothing,
        Stage::Growing,
        Stage::Boundary,
        Stage::Meshing,
        Stage::OutlierFilter,
    ];

    /// Short lowercase name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Binning => "binning",
            Stage::Smoothing => "smoothing",
            Stage::Growing => "growing",
            Stage::Boundary => "boundary",
            Stage::Meshing => "meshing",
            Stage::OutlierFilter => "outlier_filter",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Stages completed so far.
    pub current: u64,

    /// Stages in this run.
    pub total: u64,

    /// Human-readable description of the stage just finished.
    pub message: String,

    /// Elapsed time since the run started.
    pub elapsed: Duration,
}

impl Progress {
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    /// Progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Callback for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// Thread-safe stage counter with a cancellation flag.
#[derive(Debug)]
pub struct ProgressTracker {
    current: AtomicU64,
    total: u64,
    cancelled: AtomicBool,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            current: AtomicU64::new(0),
            total,
            cancelled: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation. Takes effect at the next stage boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current() as f64) / (self.total as f64)
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total,
            message: message.into(),
            elapsed: self.elapsed(),
        }
    }

    /// Mark one stage finished and notify `callback`.
    ///
    /// Returns `false` if the run is cancelled, either already or by the
    /// callback's answer.
    pub fn complete_stage(&self, callback: Option<&ProgressCallback>, message: impl Into<String>) -> bool {
        self.increment();
        if self.is_cancelled() {
            return false;
        }
        let Some(callback) = callback else {
            return true;
        };
        let should_continue = callback(&self.snapshot(message));
        if !should_continue {
            self.cancel();
        }
        should_continue
    }
}

/// Arc-wrapped tracker for sharing across threads.
pub type SharedProgressTracker = Arc<ProgressTracker>;

pub fn shared_tracker(total: u64) -> SharedProgressTracker {
    Arc::new(ProgressTracker::new(total))
}

// ============================================================================
// Stage Cost Estimation
// ============================================================================

/// Rough cost of one stage.
#[derive(Debug, Clone)]
pub struct StageEstimate {
    pub stage: Stage,
    /// Elementary operations the stage performs.
    pub operations: u64,
    /// Approximate working memory in bytes.
    pub memory_bytes: u64,
    /// Complexity description.
    pub complexity: &'static str,
}

impl StageEstimate {
    /// Time at a nominal 100M simple operations per second.
    pub fn estimated_seconds(&self) -> f64 {
        self.operations as f64 / 100_000_000.0
    }
}

/// Sizes that drive stage costs.
#[derive(Debug, Clone, Copy)]
pub struct CostInputs<'a> {
    pub points: usize,
    pub cells: usize,
    pub smoothing: &'a SmoothParams,
    pub growing: &'a GrowParams,
}

/// Estimate the cost of `stage` for a run of the given size.
///
/// Growing assumes every cell is evaluated; boundary work assumes a
/// silhouette of about `4 * sqrt(cells)` cells.
pub fn estimate_stage_cost(inputs: &CostInputs<'_>, stage: Stage) -> StageEstimate {
    let n = inputs.points as u64;
    let cells = inputs.cells as u64;
    let f64_size = std::mem::size_of::<f64>() as u64;

    let (operations, memory_bytes, complexity) = match stage {
        Stage::Binning => (n + cells, cells * (f64_size * 4 + 5), "O(N + cells)"),
        Stage::Smoothing => {
            let kernel = ((2 * inputs.smoothing.radius + 1) as u64).pow(2);
            let iters = inputs.smoothing.iterations as u64;
            (cells * kernel * iters, cells * f64_size * 2, "O(cells × window² × iterations)")
        }
        Stage::Growing => {
            let window = ((2 * inputs.growing.window_radius + 1) as u64).pow(2);
            let passes = 1 + inputs.growing.refit_passes as u64;
            (cells * window * passes, cells * (f64_size + 2), "O(cells × window²)")
        }
        Stage::Boundary => {
            let perimeter = 4 * (inputs.cells as f64).sqrt().ceil() as u64;
            (cells + perimeter * perimeter.max(1).ilog2() as u64, perimeter * 16, "O(cells + boundary log boundary)")
        }
        Stage::Meshing => (cells * 2, cells * 64, "O(cells)"),
        Stage::OutlierFilter => (n * 16, n * 24, "O(N × neighbors)"),
    };

    StageEstimate {
        stage,
        operations,
        memory_bytes,
        complexity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_progress_fraction() {
        let p = Progress::new(3, 6, "growing");
        assert!((p.fraction() - 0.5).abs() < 1e-12);
        assert_eq!(p.percent(), 50);
        assert!(!p.is_complete());
        assert_eq!(Progress::new(0, 0, "").fraction(), 0.0);
    }

    #[test]
    fn test_tracker_cancel() {
        let tracker = ProgressTracker::new(6);
        assert!(tracker.complete_stage(None, "binning"));
        tracker.cancel();
        assert!(!tracker.complete_stage(None, "smoothing"));
        assert_eq!(tracker.current(), 2);
    }

    #[test]
    fn test_callback_can_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let callback: ProgressCallback = Box::new(move |p: &Progress| {
            seen.fetch_add(1, Ordering::SeqCst);
            p.current < 2
        });
        let tracker = ProgressTracker::new(6);
        assert!(tracker.complete_stage(Some(&callback), "a"));
        assert!(!tracker.complete_stage(Some(&callback), "b"));
        assert!(tracker.is_cancelled());
        assert!(!tracker.complete_stage(Some(&callback), "c"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stage_names_unique() {
        let names: std::collections::HashSet<_> = Stage::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), Stage::ALL.len());
        assert_eq!(Stage::Growing.to_string(), "growing");
    }

    #[test]
    fn test_estimates_scale_with_size() {
        let smoothing = SmoothParams::default();
        let growing = GrowParams::default();
        let small = CostInputs {
            points: 1_000,
            cells: 1_024,
            smoothing: &smoothing,
            growing: &growing,
        };
        let large = CostInputs {
            points: 100_000,
            cells: 65_536,
            ..small
        };
        for stage in Stage::ALL {
            let a = estimate_stage_cost(&small, stage);
            let b = estimate_stage_cost(&large, stage);
            assert!(b.operations > a.operations, "{stage}");
            assert!(b.estimated_seconds() >= a.estimated_seconds());
        }
    }
}
