//! End-to-end tests for skin-recon.
//!
//! These run the stages together on synthetic clouds with known geometry
//! and check the surface that comes out.

use nalgebra::Point3;
use skin_recon::{
    BinningParams, BinningPolicy, BoundaryParams, GrowParams, MeshMode, MeshParams, OutlierParams,
    ReconstructionParams, Sample, SkinError, SmoothParams, VertexColor, bin_points,
    extract_boundary, grow_surface, reconstruct,
};
use skin_recon::smooth::smooth_heights;

/// Small deterministic xorshift generator so scenarios are reproducible
/// without a rand dependency.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform in [0, 1).
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// 10,000 points on z = 1.0 +- 0.001 over the unit square, 5% of them
/// thrown to z = 5.0. Returns the points and the outlier flags.
fn noisy_plane_with_spikes(seed: u64) -> (Vec<Point3<f64>>, Vec<bool>) {
    let mut rng = XorShift::new(seed);
    let mut points = Vec::with_capacity(10_000);
    let mut spikes = Vec::with_capacity(10_000);
    for i in 0..10_000 {
        let x = rng.next_f64();
        let y = rng.next_f64();
        let noise = (rng.next_f64() - 0.5) * 0.002;
        let spike = i % 20 == 0;
        points.push(Point3::new(x, y, if spike { 5.0 } else { 1.0 + noise }));
        spikes.push(spike);
    }
    (points, spikes)
}

fn samples_from(points: &[Point3<f64>]) -> Vec<Sample> {
    points.iter().map(|p| Sample::new(p.x, p.y, p.z)).collect()
}

// =============================================================================
// Spike rejection scenario
// =============================================================================

#[test]
fn test_spiky_plane_grows_clean_surface() {
    let (points, spikes) = noisy_plane_with_spikes(0x5eed_cafe);

    let binned = bin_points(&points, None, &BinningParams::fixed(64, 64, BinningPolicy::Average)).unwrap();
    let smoothing = SmoothParams {
        radius: 2,
        iterations: 2,
        ..Default::default()
    };
    let smoothed = smooth_heights(&binned.heights, &binned.valid, &smoothing);
    let fitted = grow_surface(
        &binned.spec,
        &smoothed,
        &binned.valid,
        binned.z_range(),
        &GrowParams::with_window_radius(2),
    );

    // Nearly every observed cell is plane-dominated, so nearly all of them
    // are recovered...
    let grown = fitted.grown_count();
    let valid = binned.valid_count();
    assert!(
        grown as f64 >= 0.9 * valid as f64,
        "grew only {grown} of {valid} observed cells"
    );

    // ...and it sits on the plane.
    let near_plane = fitted
        .mask
        .iter()
        .zip(fitted.heights.iter())
        .filter(|&(&m, &h)| m && (h - 1.0).abs() <= 0.05)
        .count();
    assert!(
        near_plane as f64 >= 0.95 * grown as f64,
        "{near_plane} of {grown} grown cells within 0.05 of the plane"
    );

    // Cells where spikes outnumber plane samples stay out, unless seeded.
    let spec = binned.spec;
    let mut totals = vec![0usize; spec.cell_count()];
    let mut spiked = vec![0usize; spec.cell_count()];
    for (p, &spike) in points.iter().zip(&spikes) {
        let (ix, iy) = spec.cell_of(p.x, p.y);
        let cell = spec.index(ix, iy);
        totals[cell] += 1;
        if spike {
            spiked[cell] += 1;
        }
    }
    for cell in 0..spec.cell_count() {
        if 2 * spiked[cell] > totals[cell] {
            let (ix, iy) = spec.coords(cell);
            assert!(
                !*fitted.mask.at(ix, iy) || fitted.seed == Some((ix, iy)),
                "spike-dominated cell ({ix}, {iy}) was grown"
            );
        }
    }
}

#[test]
fn test_spiky_plane_full_pipeline() {
    let (points, _) = noisy_plane_with_spikes(42);
    let samples = samples_from(&points);
    let params = ReconstructionParams {
        outliers: Some(OutlierParams::default()),
        ..Default::default()
    };
    let result = reconstruct(&samples, &params).unwrap();

    assert_eq!(result.smoothed_points.len(), points.len());
    for (s, p) in result.smoothed_points.iter().zip(&points) {
        assert_eq!((s.x, s.y), (p.x, p.y));
    }
    assert!(result.mesh.face_count() > 0);
    assert!(result.mesh.indices_in_range());
    assert!(result.mesh.has_normals());

    let report = result.outliers.unwrap();
    assert_eq!(report.keep.len(), points.len());
    assert_eq!(report.kept_count() + report.rejected.len(), points.len());
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn test_tilted_plane_is_reproduced() {
    let plane = |x: f64, y: f64| 0.5 + 0.3 * x + 0.2 * y;
    let n = 64;
    let samples: Vec<Sample> = (0..n * n)
        .map(|i| {
            let x = ((i % n) as f64 + 0.5) / n as f64;
            let y = ((i / n) as f64 + 0.5) / n as f64;
            Sample::new(x, y, plane(x, y))
        })
        .collect();
    // Unsmoothed, so border cells carry no one-sided filter bias.
    let params = ReconstructionParams {
        binning: BinningParams::fixed(16, 16, BinningPolicy::Average),
        smoothing: SmoothParams {
            iterations: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = reconstruct(&samples, &params).unwrap();

    assert_eq!(result.growth.accepted, 256);
    assert_eq!(result.mesh.face_count(), 15 * 15 * 2);
    for v in &result.mesh.vertices {
        let expected = plane(v.position.x, v.position.y);
        assert!(
            (v.position.z - expected).abs() < 0.02,
            "vertex at ({:.3}, {:.3}) has z {:.4}, expected {:.4}",
            v.position.x,
            v.position.y,
            v.position.z,
            expected
        );
        let normal = v.normal.unwrap();
        assert!(normal.z > 0.9);
    }
}

#[test]
fn test_disconnected_island_not_grown() {
    let mut points = Vec::new();
    for iy in 0..60 {
        for ix in 0..60 {
            points.push(Point3::new(ix as f64 * 0.01, iy as f64 * 0.01, 1.0));
        }
    }
    for iy in 0..10 {
        for ix in 0..10 {
            points.push(Point3::new(0.9 + ix as f64 * 0.01, 0.9 + iy as f64 * 0.01, 1.0));
        }
    }
    let binned = bin_points(&points, None, &BinningParams::fixed(32, 32, BinningPolicy::Average)).unwrap();
    let fitted = grow_surface(
        &binned.spec,
        &binned.heights,
        &binned.valid,
        binned.z_range(),
        &GrowParams::default(),
    );

    let spec = binned.spec;
    let (island_x, island_y) = spec.cell_of(0.9, 0.9);
    for iy in island_y..spec.ny {
        for ix in island_x..spec.nx {
            assert!(!*fitted.mask.at(ix, iy), "island cell ({ix}, {iy}) grown");
        }
    }
    assert!(fitted.grown_count() > 100);
}

#[test]
fn test_nearest_front_keeps_upper_layer() {
    let mut samples = Vec::new();
    for iy in 0..20 {
        for ix in 0..20 {
            let (x, y) = (ix as f64 * 0.05, iy as f64 * 0.05);
            samples.push(Sample::new(x, y, 0.0));
            samples.push(Sample::new(x, y, 1.0));
        }
    }

    let mut params = ReconstructionParams {
        binning: BinningParams::fixed(10, 10, BinningPolicy::NearestFront),
        ..Default::default()
    };
    let front = reconstruct(&samples, &params).unwrap();
    assert!(front.mesh.vertices.iter().all(|v| (v.position.z - 1.0).abs() < 1e-9));

    params.binning.policy = BinningPolicy::Average;
    let average = reconstruct(&samples, &params).unwrap();
    assert!(average.mesh.vertices.iter().all(|v| (v.position.z - 0.5).abs() < 1e-9));
}

#[test]
fn test_colors_flow_into_mesh() {
    let samples: Vec<Sample> = (0..400)
        .map(|i| {
            let (ix, iy) = (i % 20, i / 20);
            let color = if ix < 10 {
                VertexColor::new(255, 0, 0)
            } else {
                VertexColor::new(0, 0, 255)
            };
            Sample::with_color(ix as f64, iy as f64, 0.0, color)
        })
        .collect();
    let params = ReconstructionParams {
        binning: BinningParams::fixed(10, 10, BinningPolicy::Average),
        ..Default::default()
    };
    let result = reconstruct(&samples, &params).unwrap();
    let red = result
        .mesh
        .vertices
        .iter()
        .filter(|v| v.color == Some(VertexColor::new(255, 0, 0)))
        .count();
    let blue = result
        .mesh
        .vertices
        .iter()
        .filter(|v| v.color == Some(VertexColor::new(0, 0, 255)))
        .count();
    assert_eq!(red, 50);
    assert_eq!(blue, 50);
}

// =============================================================================
// Boundary and meshing modes
// =============================================================================

#[test]
fn test_both_boundary_strategies_close() {
    let points: Vec<Point3<f64>> = (0..900)
        .map(|i| Point3::new((i % 30) as f64, (i / 30) as f64, 2.0))
        .collect();
    let binned = bin_points(&points, None, &BinningParams::fixed(12, 12, BinningPolicy::Average)).unwrap();

    for params in [BoundaryParams::default(), BoundaryParams::trace()] {
        let boundary = extract_boundary(&binned.spec, &binned.valid, &params);
        assert!(boundary.len() > 4);
        assert!(boundary.is_closed());
        for p in &boundary.points {
            assert!(p.x >= 0.0 && p.x <= 29.0);
            assert!(p.y >= 0.0 && p.y <= 29.0);
        }
    }
}

#[test]
fn test_boundary_mesh_mode() {
    let samples: Vec<Sample> = (0..2500)
        .map(|i| ((i % 50) as f64 * 0.02, (i / 50) as f64 * 0.02))
        .filter(|(x, y)| (x - 0.5).powi(2) + (y - 0.5).powi(2) < 0.2)
        .map(|(x, y)| Sample::new(x, y, 0.25))
        .collect();
    let params = ReconstructionParams {
        binning: BinningParams::fixed(20, 20, BinningPolicy::Average),
        meshing: MeshParams {
            mode: MeshMode::Boundary,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = reconstruct(&samples, &params).unwrap();
    assert!(result.mesh.face_count() > 0);
    assert!(result.mesh.indices_in_range());
    assert_eq!(result.mesh.face_count(), result.mesh.vertex_count() - 2);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_presets_run_end_to_end() {
    let (points, _) = noisy_plane_with_spikes(7);
    let samples = samples_from(&points);

    let body = reconstruct(&samples, &ReconstructionParams::for_body_scan()).unwrap();
    assert!(body.normalized);
    assert!(body.outliers.is_some());
    if let Some((min, max)) = body.mesh.bounds() {
        assert!((max - min).norm() <= 2.0 + 1e-9);
    }

    let occluding = reconstruct(&samples, &ReconstructionParams::for_self_occluding()).unwrap();
    assert!(!occluding.normalized);
    assert!(occluding.mesh.indices_in_range());
}

#[test]
fn test_invalid_params_rejected_before_work() {
    let mut params = ReconstructionParams::default();
    params.transform.target_size = -1.0;
    let err = reconstruct(&[Sample::new(0.0, 0.0, 0.0)], &params).unwrap_err();
    assert!(matches!(err, SkinError::InvalidParameter { .. }));
    assert_eq!(err.code().as_str(), "SKIN-2001");
}
