//! Edge case tests for degenerate and unusual clouds.
//!
//! Every case here must finish without panicking and follow the local
//! skip/fallback rules instead of failing the whole run.

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use crate::binning::{BinningParams, BinningPolicy, bin_points};
    use crate::boundary::{BoundaryParams, extract_boundary};
    use crate::grid::{Grid, GridSpec};
    use crate::grow::grow_surface;
    use crate::meshing::{MeshMode, MeshParams, grid_mesh};
    use crate::outliers::{OutlierParams, filter_outliers};
    use crate::pipeline::{ReconstructionParams, reconstruct};
    use crate::smooth::{SmoothParams, smooth_heights};
    use crate::{Sample, SkinError, VertexColor};

    fn grid_params(n: usize) -> ReconstructionParams {
        ReconstructionParams {
            binning: BinningParams::fixed(n, n, BinningPolicy::Average),
            ..Default::default()
        }
    }

    // ==================== Empty / Non-finite Input ====================

    #[test]
    fn test_empty_cloud_is_hard_error() {
        let err = reconstruct(&[], &ReconstructionParams::default()).unwrap_err();
        assert!(matches!(err, SkinError::EmptyInput { .. }));
    }

    #[test]
    fn test_all_nan_cloud_is_empty_input() {
        let samples = vec![Sample::new(f64::NAN, 0.0, 0.0), Sample::new(0.0, f64::INFINITY, 1.0)];
        let err = reconstruct(&samples, &ReconstructionParams::default()).unwrap_err();
        assert!(matches!(err, SkinError::EmptyInput { .. }));
    }

    #[test]
    fn test_non_finite_samples_keep_cardinality() {
        let mut samples: Vec<Sample> = (0..100)
            .map(|i| Sample::new((i % 10) as f64, (i / 10) as f64, 1.0))
            .collect();
        samples[17] = Sample::new(f64::NAN, 3.0, 1.0);
        let result = reconstruct(&samples, &grid_params(8)).unwrap();
        assert_eq!(result.smoothed_points.len(), 100);
        assert!(result.smoothed_points[17].x.is_nan());
        assert!(result.mesh.indices_in_range());
    }

    // ==================== Tiny Clouds ====================

    #[test]
    fn test_single_point_gives_empty_mesh() {
        let samples = vec![Sample::new(2.0, 3.0, 4.0)];
        let result = reconstruct(&samples, &ReconstructionParams::default()).unwrap();
        assert!(result.mesh.is_empty());
        assert_eq!(result.mesh.face_count(), 0);
        assert_eq!(result.valid_cells, 1);
        assert_eq!(result.growth.accepted, 0);
        assert!(result.boundary.is_empty());
        assert!((result.smoothed_points[0].z - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_points_collapse_to_one_cell() {
        let samples = vec![Sample::new(1.0, 1.0, 1.0); 50];
        let result = reconstruct(&samples, &ReconstructionParams::default()).unwrap();
        assert_eq!(result.valid_cells, 1);
        assert!(result.mesh.is_empty());
        assert!(result.smoothed_points.iter().all(|p| (p.z - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_collinear_cloud_never_fits_a_plane() {
        let samples: Vec<Sample> = (0..64).map(|i| Sample::new(i as f64, 5.0, 0.1 * i as f64)).collect();
        let result = reconstruct(&samples, &grid_params(16)).unwrap();
        assert_eq!(result.growth.accepted, 0);
        assert!(result.growth.singular_skipped > 0);
        assert!(result.mesh.is_empty());
    }

    // ==================== Grid Extremes ====================

    #[test]
    fn test_one_by_one_grid() {
        let samples: Vec<Sample> = (0..10).map(|i| Sample::new(i as f64, i as f64, 0.0)).collect();
        let result = reconstruct(&samples, &grid_params(1)).unwrap();
        assert_eq!(result.spec.cell_count(), 1);
        assert!(result.mesh.is_empty());
    }

    #[test]
    fn test_zero_dimensions_raised_to_one() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)];
        let binned = bin_points(&points, None, &BinningParams::fixed(0, 0, BinningPolicy::Average)).unwrap();
        assert_eq!((binned.spec.nx, binned.spec.ny), (1, 1));
        assert_eq!(binned.heights.len(), 1);
    }

    #[test]
    fn test_empty_mask_everywhere_downstream() {
        let spec = GridSpec::new(6, 6, 0.0, 0.0, 1.0, 1.0);
        let heights = Grid::for_spec(&spec, 0.0);
        let mask = Grid::for_spec(&spec, false);

        let smoothed = smooth_heights(&heights, &mask, &SmoothParams::default());
        assert_eq!(smoothed, heights);

        let fitted = grow_surface(&spec, &heights, &mask, 0.0, &Default::default());
        assert!(fitted.seed.is_none());
        assert_eq!(fitted.heights, heights);

        for params in [BoundaryParams::default(), BoundaryParams::trace()] {
            assert!(extract_boundary(&spec, &mask, &params).is_empty());
        }
        assert!(grid_mesh(&spec, &heights, &mask, None).is_empty());
    }

    // ==================== Colors ====================

    #[test]
    fn test_mismatched_color_array_ignored() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0)];
        let colors = vec![VertexColor::new(255, 0, 0)];
        let binned = bin_points(&points, Some(&colors), &BinningParams::default()).unwrap();
        assert!(binned.colors.is_none());
    }

    #[test]
    fn test_uncolored_cloud_gets_neutral_vertices() {
        let samples: Vec<Sample> = (0..400)
            .map(|i| Sample::new((i % 20) as f64, (i / 20) as f64, 2.0))
            .collect();
        let result = reconstruct(&samples, &grid_params(10)).unwrap();
        assert!(!result.mesh.is_empty());
        assert!(result
            .mesh
            .vertices
            .iter()
            .all(|v| v.color.is_none_or(|c| c == VertexColor::NEUTRAL)));
    }

    // ==================== Boundary Meshing ====================

    #[test]
    fn test_boundary_mode_on_disc() {
        let samples: Vec<Sample> = (0..1600)
            .map(|i| ((i % 40) as f64 / 39.0 - 0.5, (i / 40) as f64 / 39.0 - 0.5))
            .filter(|(x, y)| x * x + y * y <= 0.25)
            .map(|(x, y)| Sample::new(x, y, 1.0))
            .collect();
        let mut params = grid_params(16);
        params.meshing = MeshParams {
            mode: MeshMode::Boundary,
            ..Default::default()
        };
        let result = reconstruct(&samples, &params).unwrap();
        assert!(result.boundary.is_closed());
        assert!(result.mesh.face_count() > 0);
        assert!(result.mesh.indices_in_range());
        for v in &result.mesh.vertices {
            assert!((v.position.z - 1.0).abs() < 1e-9);
        }
    }

    // ==================== Outlier Filter ====================

    #[test]
    fn test_outlier_filter_single_point() {
        let raw = vec![Point3::new(0.0, 0.0, 0.0)];
        let shifted = vec![Point3::new(0.0, 0.0, 1.0)];
        let report = filter_outliers(&raw, &shifted, &OutlierParams::default()).unwrap();
        assert_eq!(report.rejected, vec![0]);
        let report = filter_outliers(&raw, &raw, &OutlierParams::default()).unwrap();
        assert!(report.rejected.is_empty());
    }
}
