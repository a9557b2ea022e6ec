//! Colored surface reconstruction from noisy body-scan point clouds.
//!
//! The crate turns an unordered `(x, y, z, color)` cloud sampled over a
//! body-shaped region into two outputs:
//!
//! - a denoised point sequence with the same length and order as the input
//! - a triangulated "skin" with per-vertex color and normals
//!
//! The cloud is treated as a height field over the XY plane. Everything
//! happens on one regular grid per run:
//!
//! - **Binning** ([`binning`]): average or front-most sample per cell
//! - **Smoothing** ([`smooth`]): edge-preserving bilateral filter
//! - **Growing** ([`grow`]): plane-fit region growing that leaves spikes
//!   and floating outliers out of the surface
//! - **Boundary** ([`boundary`]): closed silhouette of the grown region
//! - **Meshing** ([`meshing`]): grid quads or ear-clipped silhouette
//! - **Edge outliers** ([`outliers`]): optional per-point flagging where
//!   smoothing moved sparse points too far
//!
//! # Units
//!
//! The library is unit-agnostic but assumes one consistent unit across the
//! cloud. Thresholds in world units (outlier threshold and radius, adaptive
//! cell size) must be given in that unit. [`TransformParams`] can normalize
//! the outputs to a fixed bounding-box diagonal for display.
//!
//! # Quick Start
//!
//! ```
//! use skin_recon::{ReconstructionParams, Sample, reconstruct};
//!
//! // A gently tilted 30 x 30 patch
//! let samples: Vec<Sample> = (0..900)
//!     .map(|i| {
//!         let x = (i % 30) as f64 * 0.01;
//!         let y = (i / 30) as f64 * 0.01;
//!         Sample::new(x, y, 0.5 + 0.1 * x)
//!     })
//!     .collect();
//!
//! let result = reconstruct(&samples, &ReconstructionParams::default()).unwrap();
//! println!(
//!     "{} vertices, {} faces, {} cells grown",
//!     result.mesh.vertex_count(),
//!     result.mesh.face_count(),
//!     result.growth.accepted
//! );
//! ```
//!
//! # Configuration
//!
//! With the `pipeline-config` feature (on by default),
//! [`ReconstructionParams`] reads and writes TOML and JSON:
//!
//! ```
//! # #[cfg(feature = "pipeline-config")]
//! # {
//! use skin_recon::ReconstructionParams;
//!
//! let params = ReconstructionParams::from_toml(
//!     r#"
//!     [smoothing]
//!     iterations = 3
//!
//!     [growing]
//!     window_radius = 3
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(params.smoothing.iterations, 3);
//! # }
//! ```
//!
//! # Failure Model
//!
//! Only an empty (or entirely non-finite) cloud is a hard error. A missing
//! seed leaves the surface unchanged, a sparse or singular window leaves a
//! hole, and fewer than three boundary points or no complete quad yield an
//! empty mesh.

mod error;
pub mod grid;
mod pipeline;
pub mod tracing_ext;
mod types;

#[cfg(test)]
mod edge_cases;

pub mod binning;
pub mod boundary;
pub mod grow;
pub mod meshing;
pub mod outliers;
pub mod plane;
pub mod progress;
pub mod sampler;
pub mod smooth;
pub mod transform;

// Re-export core types at crate root
pub use error::{ErrorCode, ErrorLocation, RecoverySuggestion, SkinError, SkinResult};
pub use types::{Mesh, Sample, Triangle, Vertex, VertexColor};

pub use grid::{ColorMap, Grid, GridSpec, HeightMap, ValidMask};

pub use pipeline::{Pipeline, Reconstruction, ReconstructionParams, reconstruct, spawn_reconstruction};

#[cfg(feature = "pipeline-config")]
pub use pipeline::ConfigError;

pub use binning::{BinnedGrid, BinningParams, BinningPolicy, Resolution, bin_points, bin_samples};
pub use boundary::{BoundaryLoop, BoundaryParams, BoundaryStrategy, extract_boundary};
pub use grow::{FittedSurface, GrowParams, GrowthStats, SurfaceGrower, grow_surface};
pub use meshing::{MeshInput, MeshMode, MeshParams, build_mesh};
pub use outliers::{OutlierParams, OutlierPolicy, OutlierReport, filter_outliers};
pub use progress::{Progress, ProgressCallback, ProgressTracker, Stage};
pub use sampler::GridSampler;
pub use smooth::{BilateralSmoother, SmoothParams};
pub use transform::{NormalizeParams, TransformParams};
