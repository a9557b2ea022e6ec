//! skin reconstruct - point cloud to colored surface mesh.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use skin_recon::{
    BinningPolicy, BoundaryStrategy, MeshMode, OutlierParams, Pipeline, Progress,
    ReconstructionParams, Resolution,
};

use crate::{BoundaryArg, Cli, MeshModeArg, OutputFormat, PolicyArg, Preset, io, output};

#[derive(Args)]
pub struct ReconstructArgs {
    /// Input point file (x y z [r g b] per line)
    pub input: PathBuf,

    /// Output OBJ file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Parameter file (.json, otherwise TOML)
    #[arg(long, conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Named parameter set
    #[arg(long)]
    pub preset: Option<Preset>,

    /// Fixed grid size as NXxNY, e.g. 128x96
    #[arg(long, value_parser = parse_grid, conflicts_with = "cell_size")]
    pub grid: Option<(usize, usize)>,

    /// Adaptive grid with this cell size in world units
    #[arg(long)]
    pub cell_size: Option<f64>,

    /// How samples sharing a cell are combined
    #[arg(long)]
    pub policy: Option<PolicyArg>,

    /// Boundary extraction strategy
    #[arg(long)]
    pub boundary: Option<BoundaryArg>,

    /// Meshing mode
    #[arg(long)]
    pub mode: Option<MeshModeArg>,

    /// Smoothing iterations
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Half-width of the plane fitting window in cells
    #[arg(long)]
    pub window_radius: Option<usize>,

    /// Enable the edge outlier filter with this height threshold
    #[arg(long)]
    pub outliers: Option<f64>,

    /// Normalize outputs into a box of diagonal 2
    #[arg(long)]
    pub normalize: bool,

    /// Also write the smoothed points as x y z lines
    #[arg(long)]
    pub points_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReconstructResult {
    input: String,
    output: String,
    points_output: Option<String>,
    input_points: usize,
    skipped_lines: usize,
    grid: [usize; 2],
    valid_cells: usize,
    grown_cells: usize,
    seed: Option<[usize; 2]>,
    rejected_cells: usize,
    sparse_cells: usize,
    singular_cells: usize,
    boundary_points: usize,
    vertices: usize,
    faces: usize,
    surface_area: f64,
    outliers_rejected: Option<usize>,
    normalized: bool,
    scale_factor: f64,
    center: [f64; 3],
    stages: Vec<String>,
}

fn parse_grid(s: &str) -> Result<(usize, usize), String> {
    let (nx, ny) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected NXxNY, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid grid size '{v}': {e}"))
    };
    let (nx, ny) = (parse(nx)?, parse(ny)?);
    if nx == 0 || ny == 0 {
        return Err("grid dimensions must be at least 1".to_string());
    }
    Ok((nx, ny))
}

fn load_config(path: &Path) -> Result<ReconstructionParams> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let params = if is_json {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        ReconstructionParams::from_json(&text)?
    } else {
        ReconstructionParams::from_toml_file(path)?
    };
    Ok(params)
}

/// Resolve the parameter set: config file or preset first, then flags.
pub fn build_params(args: &ReconstructArgs) -> Result<ReconstructionParams> {
    let mut params = match (&args.config, args.preset) {
        (Some(path), _) => {
            load_config(path).with_context(|| format!("Failed to load config {:?}", path))?
        }
        (None, Some(preset)) => preset.params(),
        (None, None) => ReconstructionParams::default(),
    };

    if let Some(policy) = args.policy {
        params.binning.policy = match policy {
            PolicyArg::Average => BinningPolicy::Average,
            PolicyArg::NearestFront => BinningPolicy::NearestFront,
        };
    }
    if let Some((nx, ny)) = args.grid {
        params.binning.resolution = Resolution::Fixed { nx, ny };
    }
    if let Some(cell_size) = args.cell_size {
        params.binning.resolution = match params.binning.resolution {
            Resolution::Adaptive {
                min_res, max_res, ..
            } => Resolution::Adaptive {
                cell_size,
                min_res,
                max_res,
            },
            Resolution::Fixed { .. } => Resolution::Adaptive {
                cell_size,
                min_res: 8,
                max_res: 512,
            },
        };
    }
    if let Some(boundary) = args.boundary {
        params.boundary.strategy = match boundary {
            BoundaryArg::Angular => BoundaryStrategy::AngularSort,
            BoundaryArg::Trace => BoundaryStrategy::ContourTrace,
        };
    }
    if let Some(mode) = args.mode {
        params.meshing.mode = match mode {
            MeshModeArg::Grid => MeshMode::RegularGrid,
            MeshModeArg::Boundary => MeshMode::Boundary,
        };
    }
    if let Some(iterations) = args.iterations {
        params.smoothing.iterations = iterations;
    }
    if let Some(radius) = args.window_radius {
        params.growing.window_radius = radius;
    }
    if let Some(threshold) = args.outliers {
        let base = params.outliers.unwrap_or_default();
        params.outliers = Some(OutlierParams { threshold, ..base });
    }
    if args.normalize {
        params.transform.apply = true;
    }

    Ok(params)
}

pub fn run(args: &ReconstructArgs, cli: &Cli) -> Result<()> {
    let params = build_params(args)?;
    params.validate()?;

    let cloud = io::read_points(&args.input)?;
    if cloud.skipped > 0 {
        output::warning(
            &format!("{} malformed lines skipped", cloud.skipped),
            cli.quiet,
        );
    }
    if cloud.samples.is_empty() {
        bail!("No points found in {:?}", args.input);
    }

    output::info(
        &format!("Reconstructing {} points", cloud.samples.len()),
        cli.format,
        cli.quiet,
    );

    let (format, quiet) = (cli.format, cli.quiet);
    let pipeline = Pipeline::new(params).with_progress(Box::new(move |p: &Progress| {
        output::info(
            &format!("[{:>3}%] {}", p.percent(), p.message),
            format,
            quiet,
        );
        true
    }));
    let recon = pipeline.run(&cloud.samples)?;

    if recon.mesh.is_empty() {
        output::warning("Reconstruction produced an empty mesh", cli.quiet);
    }

    io::write_obj(&recon.mesh, &args.output)
        .with_context(|| format!("Failed to save mesh to {:?}", args.output))?;
    if let Some(path) = &args.points_out {
        io::write_points(&recon.smoothed_points, path)
            .with_context(|| format!("Failed to save points to {:?}", path))?;
    }

    let center = recon.transform.center;
    let result = ReconstructResult {
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        points_output: args.points_out.as_ref().map(|p| p.display().to_string()),
        input_points: cloud.samples.len(),
        skipped_lines: cloud.skipped,
        grid: [recon.spec.nx, recon.spec.ny],
        valid_cells: recon.valid_cells,
        grown_cells: recon.growth.accepted,
        seed: recon.seed.map(|(ix, iy)| [ix, iy]),
        rejected_cells: recon.growth.rejected,
        sparse_cells: recon.growth.sparse_skipped,
        singular_cells: recon.growth.singular_skipped,
        boundary_points: recon.boundary.len(),
        vertices: recon.mesh.vertex_count(),
        faces: recon.mesh.face_count(),
        surface_area: recon.mesh.surface_area(),
        outliers_rejected: recon.outliers.as_ref().map(|r| r.rejected.len()),
        normalized: recon.normalized,
        scale_factor: recon.transform.scale_factor,
        center: [center.x, center.y, center.z],
        stages: recon.stage_log.clone(),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                for line in &result.stages {
                    println!("  {} {}", "•".dimmed(), line);
                }
                output::success(
                    &format!("Mesh saved to {}", args.output.display()),
                    cli.format,
                    cli.quiet,
                );
                println!(
                    "  {}: {}x{} ({} observed, {} grown)",
                    "Grid".cyan(),
                    result.grid[0],
                    result.grid[1],
                    result.valid_cells,
                    result.grown_cells
                );
                println!(
                    "  {}: {} vertices, {} faces",
                    "Mesh".cyan(),
                    result.vertices,
                    result.faces
                );
                println!("  {}: {:.4}", "Area".cyan(), result.surface_area);
                if let Some(rejected) = result.outliers_rejected {
                    println!("  {}: {} points rejected", "Outliers".yellow(), rejected);
                }
                if result.normalized {
                    println!(
                        "  {}: scale {:.6}, center ({:.4}, {:.4}, {:.4})",
                        "Normalized".green(),
                        result.scale_factor,
                        center.x,
                        center.y,
                        center.z
                    );
                }
                if let Some(path) = &result.points_output {
                    println!("  {}: {}", "Points".cyan(), path);
                }
            }
        }
    }

    Ok(())
}
