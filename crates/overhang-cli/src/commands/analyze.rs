//! overhang analyze command - find overhangs and fit support volumes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use colored::Colorize;
use mesh_overhang::angle::is_overhang;
use mesh_overhang::io::{export_boxes_stl, export_faces_stl};
use mesh_overhang::{
    AnalysisParams, AnalysisResult, CancellationToken, DanglingParams, DanglingTip,
    ExtensionTarget, FitMode, Mesh, ObbParams, OverhangAnalysis, PlacementPolicy, SeedMode,
    analyze_overhangs_with_progress,
};
use nalgebra::{Point3, Vector3};
use serde::Serialize;
use tracing::info;

use crate::output::fmt3;
use crate::{Cli, OutputFormat, output};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input STL file, JSON mesh dump or zip archive
    input: PathBuf,

    /// Allowed overhang beyond vertical, in degrees (0-90)
    #[arg(long, short, default_value = "45")]
    threshold: f64,

    /// Horizontal padding added on each side of a support volume
    #[arg(long, short, default_value = "1.0")]
    padding: f64,

    /// Build direction as x,y,z (pointing toward the build plate)
    #[arg(long, value_parser = parse_triple, default_value = "0,0,-1", allow_hyphen_values = true)]
    direction: [f64; 3],

    /// Only analyze the region containing this face
    #[arg(long, conflicts_with = "seed_point")]
    seed_face: Option<u32>,

    /// Only analyze the region nearest to this point (x,y,z)
    #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
    seed_point: Option<[f64; 3]>,

    /// Analyze every region even when the mesh dump carries a picked position
    #[arg(long)]
    ignore_picked: bool,

    /// Extend support volumes downward
    #[arg(long)]
    extend: Option<ExtendMode>,

    /// Height of the build plate along the up axis
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    plate_height: f64,

    /// Rule deciding whether a volume may be placed
    #[arg(long, default_value = "attachment")]
    policy: PolicyArg,

    /// Largest upward reach above the region accepted by the attachment policy
    #[arg(long, default_value = "1.0")]
    max_penetration: f64,

    /// Box fitting strategy
    #[arg(long, default_value = "pca")]
    fit: FitArg,

    /// Measure extents over all points instead of the convex hull
    #[arg(long)]
    no_hull: bool,

    /// Classify faces on raw angles, without neighborhood smoothing
    #[arg(long)]
    no_smoothing: bool,

    /// Drop regions with fewer distinct vertices
    #[arg(long, default_value = "4")]
    min_vertices: usize,

    /// Also look for dangling tips hanging below all their neighbors
    #[arg(long)]
    dangling: bool,

    /// Fewest dangling faces a tip needs
    #[arg(long, default_value = "10")]
    tip_min_faces: usize,

    /// Report only the largest regions (0 for all)
    #[arg(long, default_value = "20")]
    top: usize,

    /// Stop after this many seconds and report partial results
    #[arg(long)]
    time_limit: Option<f64>,

    /// Write all region faces to this STL file
    #[arg(long)]
    export_regions: Option<PathBuf>,

    /// Write all support volumes to this STL file
    #[arg(long)]
    export_boxes: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExtendMode {
    /// Down to the build plate
    Plate,
    /// Down to the first surface below, or the plate
    Surface,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Accept volumes hanging below their region: at most --max-penetration
    /// above it and crossing no unrelated triangle
    Attachment,
    /// Accept volumes that cut no mesh triangle away from their region
    Clearance,
    /// Accept every volume
    Accept,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FitArg {
    /// Principal axes
    Pca,
    /// Principal axes refined by a minimal-volume search
    Minimal,
}

fn parse_triple(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z but got '{}'", s));
    }
    let mut out = [0.0; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|e| format!("invalid number '{}': {}", part, e))?;
    }
    Ok(out)
}

impl AnalyzeArgs {
    /// Map the flags to analysis parameters. An explicit seed wins over
    /// the position picked in a mesh dump.
    fn params(&self, picked: Option<Point3<f64>>) -> AnalysisParams {
        let picked = picked.filter(|_| !self.ignore_picked);
        let seed = match (self.seed_face, self.seed_point, picked) {
            (Some(face), _, _) => SeedMode::Face(face),
            (None, Some(p), _) => SeedMode::NearestTo(Point3::from(p)),
            (None, None, Some(p)) => SeedMode::NearestTo(p),
            (None, None, None) => SeedMode::Exhaustive,
        };
        let extension = self.extend.map(|mode| match mode {
            ExtendMode::Plate => ExtensionTarget::BuildPlate {
                height: self.plate_height,
            },
            ExtendMode::Surface => ExtensionTarget::NearestSurface {
                plate_height: self.plate_height,
            },
        });
        let policy = match self.policy {
            PolicyArg::Attachment => PlacementPolicy::AttachmentOnly {
                max_penetration: self.max_penetration,
            },
            PolicyArg::Clearance => PlacementPolicy::TriangleClearance,
            PolicyArg::Accept => PlacementPolicy::AcceptAll,
        };
        let fit = ObbParams {
            mode: match self.fit {
                FitArg::Pca => FitMode::Pca,
                FitArg::Minimal => FitMode::MinimalVolume,
            },
            use_hull: !self.no_hull,
            ..ObbParams::default()
        };

        AnalysisParams {
            threshold_deg: self.threshold,
            padding: self.padding,
            build_direction: Vector3::from(self.direction),
            seed,
            extension,
            smoothing: !self.no_smoothing,
            fit,
            policy,
            min_vertices: self.min_vertices,
            dangling: self.dangling.then(|| DanglingParams {
                min_faces: self.tip_min_faces,
                ..DanglingParams::default()
            }),
            ..AnalysisParams::default()
        }
    }

    /// The face the user pointed at: an explicit seed, else the face nearest
    /// to the seed point or to the picked position of a mesh dump.
    fn marked_face(&self, mesh: &Mesh, picked: Option<Point3<f64>>) -> Option<usize> {
        if let Some(face) = self.seed_face {
            return Some(face as usize);
        }
        self.seed_point
            .map(Point3::from)
            .or(picked)
            .and_then(|p| mesh.nearest_face(&p))
    }
}

/// Bin edges of the angle distribution, in degrees from the up vector.
const ANGLE_BINS: [f64; 7] = [90.0, 105.0, 120.0, 135.0, 150.0, 165.0, 180.0];

#[derive(Serialize)]
struct AnalysisReport {
    path: String,
    faces: usize,
    candidates: usize,
    complete: bool,
    valid_volumes: usize,
    region_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    marked_face: Option<usize>,
    angle_histogram: Vec<HistogramBin>,
    /// Largest first.
    regions: Vec<RegionReport>,
    dangling_tips: Vec<TipReport>,
    diagnostics: DiagnosticsReport,
}

#[derive(Serialize)]
struct HistogramBin {
    from: f64,
    to: f64,
    faces: usize,
}

#[derive(Serialize)]
struct RegionReport {
    /// Position in segmentation order.
    index: usize,
    faces: usize,
    kind: String,
    severity: f64,
    min_angle: f64,
    mean_angle: f64,
    area: f64,
    lowest_point: [f64; 3],
    center: [f64; 3],
    half_extents: [f64; 3],
    axes: [[f64; 3]; 3],
    volume: f64,
    placement_valid: bool,
    penetration_depth: f64,
    colliding_faces: usize,
    marked: bool,
}

#[derive(Serialize)]
struct TipReport {
    faces: usize,
    patch_faces: usize,
    lowest_point: [f64; 3],
    lower_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    convexity: Option<f64>,
}

#[derive(Serialize)]
struct DiagnosticsReport {
    degenerate_faces: usize,
    boundary_edges: usize,
    non_manifold_edges: usize,
    dropped_regions: usize,
    degenerate_boxes: usize,
}

impl RegionReport {
    fn new(index: usize, r: &AnalysisResult, marked_face: Option<usize>) -> Self {
        let marked_face = marked_face.map(|f| f as u32);
        let p = r.region.lowest_point;
        let c = r.obb.center;
        let e = r.obb.half_extents;
        Self {
            index,
            faces: r.faces().len(),
            kind: r.kind().to_string(),
            severity: r.severity,
            min_angle: r.region.min_angle,
            mean_angle: r.mean_angle(),
            area: r.area(),
            lowest_point: [p.x, p.y, p.z],
            center: [c.x, c.y, c.z],
            half_extents: [e.x, e.y, e.z],
            axes: r.obb.axes().map(|a| [a.x, a.y, a.z]),
            volume: r.obb.volume(),
            placement_valid: r.placement_valid,
            penetration_depth: r.placement.penetration_depth,
            colliding_faces: r.placement.colliding_faces.len(),
            marked: marked_face.is_some_and(|f| r.faces().binary_search(&f).is_ok()),
        }
    }
}

impl From<&DanglingTip> for TipReport {
    fn from(tip: &DanglingTip) -> Self {
        let p = tip.lowest_point;
        Self {
            faces: tip.faces.len(),
            patch_faces: tip.patch.len(),
            lowest_point: [p.x, p.y, p.z],
            lower_fraction: tip.lower_fraction,
            convexity: tip.convexity,
        }
    }
}

/// Count overhang faces per [`ANGLE_BINS`] interval. The last bin is closed.
fn angle_histogram(angles: &[f64], threshold: f64) -> Vec<HistogramBin> {
    let mut bins: Vec<HistogramBin> = ANGLE_BINS
        .windows(2)
        .map(|w| HistogramBin {
            from: w[0],
            to: w[1],
            faces: 0,
        })
        .collect();
    for &angle in angles.iter().filter(|&&a| is_overhang(a, threshold)) {
        let slot = bins
            .iter()
            .position(|b| angle < b.to)
            .unwrap_or(bins.len() - 1);
        bins[slot].faces += 1;
    }
    bins
}

/// Result indices ordered by face count, largest first, cut to `top`
/// entries unless `top` is zero.
fn ranked(results: &[AnalysisResult], top: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(results[i].faces().len()));
    if top > 0 {
        order.truncate(top);
    }
    order
}

struct ReportContext<'a> {
    input: &'a Path,
    faces: usize,
    threshold: f64,
    top: usize,
    marked_face: Option<usize>,
}

fn report(ctx: &ReportContext<'_>, analysis: &OverhangAnalysis) -> AnalysisReport {
    let d = &analysis.diagnostics;
    let regions = ranked(&analysis.results, ctx.top)
        .into_iter()
        .map(|i| RegionReport::new(i, &analysis.results[i], ctx.marked_face))
        .collect();
    AnalysisReport {
        path: ctx.input.display().to_string(),
        faces: ctx.faces,
        candidates: analysis.candidate_count,
        complete: analysis.complete,
        valid_volumes: analysis.valid_results().count(),
        region_count: analysis.results.len(),
        marked_face: ctx.marked_face,
        angle_histogram: angle_histogram(&analysis.face_angles, ctx.threshold),
        regions,
        dangling_tips: analysis.dangling_tips.iter().map(Into::into).collect(),
        diagnostics: DiagnosticsReport {
            degenerate_faces: d.degenerate_faces,
            boundary_edges: d.boundary_edges,
            non_manifold_edges: d.non_manifold_edges,
            dropped_regions: d.dropped_regions,
            degenerate_boxes: d.degenerate_boxes,
        },
    }
}

pub fn run(args: &AnalyzeArgs, cli: &Cli) -> Result<()> {
    let loaded = crate::input::load(&args.input)?;
    let mesh = loaded.mesh;
    if let Some(p) = loaded.picked {
        info!(
            x = p.x,
            y = p.y,
            z = p.z,
            "Mesh dump carries a picked position"
        );
    }
    let params = args.params(loaded.picked);
    let marked_face = args.marked_face(&mesh, loaded.picked);

    let token = CancellationToken::new();
    if let Some(secs) = args.time_limit {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("--time-limit must be a positive number of seconds");
        }
        let watchdog = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs_f64(secs));
            watchdog.cancel();
        });
    }

    let analysis = analyze_overhangs_with_progress(&mesh, &params, None, Some(&token))?;

    if let Some(path) = &args.export_regions {
        let faces: Vec<u32> = analysis
            .results
            .iter()
            .flat_map(|r| r.faces().iter().copied())
            .collect();
        export_faces_stl(&mesh, &faces, path)
            .with_context(|| format!("Failed to export regions to {:?}", path))?;
        info!(path = %path.display(), faces = faces.len(), "Exported region faces");
    }
    if let Some(path) = &args.export_boxes {
        export_boxes_stl(&analysis.boxes(), path)
            .with_context(|| format!("Failed to export boxes to {:?}", path))?;
        info!(path = %path.display(), boxes = analysis.results.len(), "Exported support volumes");
    }

    let ctx = ReportContext {
        input: &args.input,
        faces: mesh.face_count(),
        threshold: args.threshold,
        top: args.top,
        marked_face,
    };
    let report = report(&ctx, &analysis);
    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                print_text(&report);
            }
        }
    }

    Ok(())
}

fn print_text(report: &AnalysisReport) {
    println!("{}", "Overhang Analysis".bold().underline());
    println!("  {}: {}", "File".cyan(), report.path);
    println!(
        "  {}: {} of {} faces",
        "Candidates".cyan(),
        report.candidates,
        report.faces
    );
    println!(
        "  {}: {} ({} placeable)",
        "Regions".cyan(),
        report.region_count,
        report.valid_volumes
    );
    if !report.complete {
        println!("  {}", "Cancelled: results are partial".yellow());
    }

    if report.angle_histogram.iter().any(|b| b.faces > 0) {
        println!();
        println!("  {}", "Angle distribution".bold());
        for bin in &report.angle_histogram {
            println!("    {:>3.0}-{:.0}°: {} faces", bin.from, bin.to, bin.faces);
        }
    }

    if report.regions.len() < report.region_count {
        println!();
        println!(
            "  Showing the {} largest of {} regions",
            report.regions.len(),
            report.region_count
        );
    }

    for r in &report.regions {
        let status = if r.placement_valid {
            "ok".green()
        } else {
            "rejected".red()
        };
        let marker = if r.marked {
            " [picked]".yellow()
        } else {
            "".normal()
        };
        println!();
        println!(
            "  {} {} ({}, {}){}",
            "Region".bold(),
            r.index,
            r.kind,
            status,
            marker
        );
        println!("    {}: {}", "Faces".cyan(), r.faces);
        println!(
            "    {}: {:.1}° to {:.1}°, mean {:.1}°",
            "Angle".cyan(),
            r.min_angle,
            r.severity,
            r.mean_angle
        );
        println!("    {}: {:.2}", "Area".cyan(), r.area);
        println!("    {}: {}", "Lowest point".cyan(), fmt3(r.lowest_point));
        println!("    {}: {}", "Box center".cyan(), fmt3(r.center));
        println!("    {}: {}", "Half extents".cyan(), fmt3(r.half_extents));
        println!("    {}: {:.2}", "Volume".cyan(), r.volume);
        if r.penetration_depth > 0.0 {
            println!("    {}: {:.2}", "Penetration".cyan(), r.penetration_depth);
        }
        if r.colliding_faces > 0 {
            println!("    {}: {}", "Colliding faces".cyan(), r.colliding_faces);
        }
    }

    for (i, tip) in report.dangling_tips.iter().enumerate() {
        println!();
        println!("  {} {}", "Dangling tip".bold(), i);
        println!(
            "    {}: {} of {}",
            "Faces".cyan(),
            tip.faces,
            tip.patch_faces
        );
        println!("    {}: {}", "Lowest point".cyan(), fmt3(tip.lowest_point));
        if let Some(c) = tip.convexity {
            println!("    {}: {:.2}", "Convexity".cyan(), c);
        }
    }

    if let Some(face) = report.marked_face {
        println!();
        match report.regions.iter().find(|r| r.marked) {
            Some(r) => println!("  Picked face {} lies in region {}", face, r.index),
            None => println!("  Picked face {} is in no listed region", face),
        }
    }

    let d = &report.diagnostics;
    if d.degenerate_faces + d.non_manifold_edges + d.dropped_regions + d.degenerate_boxes > 0 {
        println!();
        println!("  {}", "Diagnostics".bold());
        println!("    {}: {}", "Degenerate faces".cyan(), d.degenerate_faces);
        println!(
            "    {}: {}",
            "Non-manifold edges".cyan(),
            d.non_manifold_edges
        );
        println!("    {}: {}", "Dropped regions".cyan(), d.dropped_regions);
        println!("    {}: {}", "Flat boxes".cyan(), d.degenerate_boxes);
    }
}
