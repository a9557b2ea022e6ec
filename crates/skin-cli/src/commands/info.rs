//! skin info command - display point cloud statistics.

use std::path::Path;

use anyhow::{Result, bail};
use colored::Colorize;
use nalgebra::Point3;
use serde::Serialize;
use skin_recon::progress::{CostInputs, Stage, estimate_stage_cost};
use skin_recon::{ReconstructionParams, TransformParams};

use crate::{Cli, OutputFormat, io, output};

#[derive(Serialize)]
struct CloudInfo {
    path: String,
    points: usize,
    skipped_lines: usize,
    has_colors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    normalization: NormalizationInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimates: Option<Vec<StageInfo>>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
struct NormalizationInfo {
    target_size: f64,
    scale_factor: f64,
    center: [f64; 3],
}

#[derive(Serialize)]
struct StageInfo {
    stage: &'static str,
    operations: u64,
    memory_bytes: u64,
    complexity: &'static str,
    estimated_seconds: f64,
}

fn bounds_of(points: &[Point3<f64>]) -> Option<(Point3<f64>, Point3<f64>)> {
    let mut finite = points.iter().filter(|p| p.iter().all(|c| c.is_finite()));
    let first = finite.next()?;
    Some(finite.fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p))))
}

/// Per-stage costs for the body-scan preset on a cloud of this extent.
fn stage_estimates(points: usize, dims: [f64; 3]) -> Vec<StageInfo> {
    let params = ReconstructionParams::for_body_scan();
    let (nx, ny) = params.binning.resolution.resolve(dims[0], dims[1]);
    let inputs = CostInputs {
        points,
        cells: nx * ny,
        smoothing: &params.smoothing,
        growing: &params.growing,
    };
    Stage::ALL
        .iter()
        .map(|&stage| {
            let estimate = estimate_stage_cost(&inputs, stage);
            StageInfo {
                stage: stage.name(),
                operations: estimate.operations,
                memory_bytes: estimate.memory_bytes,
                complexity: estimate.complexity,
                estimated_seconds: estimate.estimated_seconds(),
            }
        })
        .collect()
}

pub fn run(input: &Path, target_size: f64, detailed: bool, cli: &Cli) -> Result<()> {
    if !(target_size.is_finite() && target_size > 0.0) {
        bail!("--target-size must be a positive number, got {target_size}");
    }

    let cloud = io::read_points(input)?;
    let positions = cloud.positions();

    let bounds = bounds_of(&positions).map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    let transform = TransformParams::from_points(&positions, target_size);
    let center = transform.center;

    let estimates = match (&bounds, detailed) {
        (Some(b), true) => Some(stage_estimates(positions.len(), b.dimensions)),
        _ => None,
    };

    let info = CloudInfo {
        path: input.display().to_string(),
        points: positions.len(),
        skipped_lines: cloud.skipped,
        has_colors: cloud.has_colors(),
        bounds,
        normalization: NormalizationInfo {
            target_size,
            scale_factor: transform.scale_factor,
            center: [center.x, center.y, center.z],
        },
        estimates,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Point Cloud Information".bold().underline());
                println!("  {}: {}", "File".cyan(), info.path);
                println!("  {}: {}", "Points".cyan(), info.points);
                if info.skipped_lines > 0 {
                    println!("  {}: {}", "Skipped lines".yellow(), info.skipped_lines);
                }
                println!(
                    "  {}: {}",
                    "Has colors".cyan(),
                    if info.has_colors { "yes" } else { "no" }
                );

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.4} x {:.4} x {:.4}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!(
                        "  {}: ({:.4}, {:.4}, {:.4})",
                        "Min bounds".cyan(),
                        b.min[0],
                        b.min[1],
                        b.min[2]
                    );
                    println!(
                        "  {}: ({:.4}, {:.4}, {:.4})",
                        "Max bounds".cyan(),
                        b.max[0],
                        b.max[1],
                        b.max[2]
                    );
                }

                println!(
                    "  {}: scale {:.6}, center ({:.4}, {:.4}, {:.4})",
                    "Normalization".cyan(),
                    info.normalization.scale_factor,
                    center.x,
                    center.y,
                    center.z
                );

                if let Some(ref estimates) = info.estimates {
                    println!();
                    println!("{}", "Stage Estimates (body-scan preset)".bold());
                    for e in estimates {
                        println!(
                            "  {} {:>14} ops  {:>10} KiB  {:>8.3}s  {}",
                            format!("{:<16}", e.stage).cyan(),
                            e.operations,
                            e.memory_bytes / 1024,
                            e.estimated_seconds,
                            e.complexity.dimmed()
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_skip_non_finite() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f64::NAN, 5.0, 5.0),
            Point3::new(2.0, -1.0, 3.0),
        ];
        let (min, max) = bounds_of(&points).unwrap();
        assert_eq!(min, Point3::new(0.0, -1.0, 0.0));
        assert_eq!(max, Point3::new(2.0, 0.0, 3.0));
        assert!(bounds_of(&[]).is_none());
    }

    #[test]
    fn test_stage_estimates_cover_every_stage() {
        let estimates = stage_estimates(10_000, [1.0, 0.5, 0.2]);
        assert_eq!(estimates.len(), Stage::ALL.len());
        assert_eq!(estimates[0].stage, "binning");
        assert!(estimates.iter().all(|e| e.operations > 0));
    }
}
