//! The overhang analysis pipeline.
//!
//! Normals and angles, adjacency, smoothing and segmentation, then per
//! region: box fit, expansion, optional extension and a placement check.

use crate::adjacency::FaceAdjacency;
use crate::angle::{FaceAngles, FaceNormals, classify};
use crate::dangling::{DanglingParams, DanglingTip, find_dangling_tips};
use crate::error::OverhangResult;
use crate::obb::{DEGENERATE_EXTENT, ObbParams, OrientedBoundingBox, fit_obb};
use crate::placement::{
    PlacementCheck, PlacementPolicy, check_placement, expand_horizontal, extend_to_height,
    surface_height_below,
};
use crate::progress::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::region::{OverhangRegion, RegionKind, classify_regions};
use crate::segment::{Segmentation, segment_exhaustive, segment_seeded, smooth_angles};
use crate::tracing_ext::{
    OperationTimer, log_analysis_summary, log_mesh_stats, log_perf_section, log_progress,
};
use crate::types::Mesh;
use crate::validate::{validate_mesh_data, validate_params};
use nalgebra::{Point3, Vector3};
use tracing::{debug, trace, warn};

/// Progress message reported while fitting support volumes.
pub const FIT_STAGE: &str = "Fitting support volumes";

/// Which faces start a region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SeedMode {
    /// Every candidate face, partitioned into connected regions.
    #[default]
    Exhaustive,
    /// Only the region containing this face.
    Face(u32),
    /// Only the region containing the face whose centroid is nearest to
    /// this point.
    NearestTo(Point3<f64>),
}

/// Where support volumes are extended down to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtensionTarget {
    /// A plane at `height` along the up vector.
    BuildPlate { height: f64 },
    /// The first mesh surface below the volume, or the plate when there is
    /// none.
    NearestSurface { plate_height: f64 },
}

impl Default for ExtensionTarget {
    fn default() -> Self {
        ExtensionTarget::BuildPlate { height: 0.0 }
    }
}

/// Parameters for overhang analysis.
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    /// Allowed overhang beyond vertical, in degrees (0 to 90). A face is an
    /// overhang when its angle from the up vector exceeds `90 + threshold`.
    pub threshold_deg: f64,
    /// Horizontal growth of each support volume on every side.
    pub padding: f64,
    /// Build direction, pointing from the top of the part toward the plate.
    /// Normalized internally.
    pub build_direction: Vector3<f64>,
    pub seed: SeedMode,
    /// Extend volumes downward; `None` leaves them at the region.
    pub extension: Option<ExtensionTarget>,
    /// Average each face's angle with its neighbors before thresholding.
    pub smoothing: bool,
    pub fit: ObbParams,
    pub policy: PlacementPolicy,
    /// Regions with fewer distinct vertices are dropped.
    pub min_vertices: usize,
    /// Height band above the lowest region within which regions count as
    /// tips.
    pub tip_tolerance: f64,
    /// Also search for dangling tips; `None` skips the search.
    pub dangling: Option<DanglingParams>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            threshold_deg: 45.0,
            padding: 1.0,
            build_direction: Vector3::new(0.0, 0.0, -1.0),
            seed: SeedMode::Exhaustive,
            extension: None,
            smoothing: true,
            fit: ObbParams::default(),
            policy: PlacementPolicy::default(),
            min_vertices: 4,
            tip_tolerance: 0.5,
            dangling: None,
        }
    }
}

impl AnalysisParams {
    /// FDM printing: 45° overhangs, volumes extended to the plate.
    pub fn for_fdm() -> Self {
        Self {
            extension: Some(ExtensionTarget::default()),
            ..Self::default()
        }
    }

    /// Resin printing: stricter 30° limit and tighter volumes.
    pub fn for_resin() -> Self {
        Self {
            threshold_deg: 30.0,
            padding: 0.5,
            extension: Some(ExtensionTarget::default()),
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold_deg: f64) -> Self {
        self.threshold_deg = threshold_deg;
        self
    }

    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_build_direction(mut self, direction: Vector3<f64>) -> Self {
        self.build_direction = direction;
        self
    }

    pub fn with_seed(mut self, seed: SeedMode) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_extension(mut self, target: ExtensionTarget) -> Self {
        self.extension = Some(target);
        self
    }

    pub fn with_smoothing(mut self, smoothing: bool) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_fit(mut self, fit: ObbParams) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_policy(mut self, policy: PlacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dangling(mut self, dangling: DanglingParams) -> Self {
        self.dangling = Some(dangling);
        self
    }
}

/// One overhang region and its support volume.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub region: OverhangRegion,
    /// Box fitted to the region's vertices.
    pub fitted_obb: OrientedBoundingBox,
    /// Support volume after padding and extension.
    pub obb: OrientedBoundingBox,
    /// Largest overhang angle in the region (degrees).
    pub severity: f64,
    pub placement_valid: bool,
    pub placement: PlacementCheck,
}

impl AnalysisResult {
    pub fn faces(&self) -> &[u32] {
        &self.region.faces
    }

    pub fn mean_angle(&self) -> f64 {
        self.region.mean_angle
    }

    pub fn area(&self) -> f64 {
        self.region.area
    }

    pub fn kind(&self) -> RegionKind {
        self.region.kind
    }
}

/// Counts of input problems absorbed during analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisDiagnostics {
    /// Faces without a usable normal.
    pub degenerate_faces: usize,
    pub boundary_edges: usize,
    pub non_manifold_edges: usize,
    /// Regions dropped for having too few vertices.
    pub dropped_regions: usize,
    /// Fitted boxes with a (near) zero extent.
    pub degenerate_boxes: usize,
}

/// Result of one analysis call.
#[derive(Debug, Clone)]
pub struct OverhangAnalysis {
    /// One entry per region, in segmentation order.
    pub results: Vec<AnalysisResult>,
    /// Box around the whole mesh, used for placement checks.
    pub mesh_obb: OrientedBoundingBox,
    /// Raw overhang angle per face (degrees).
    pub face_angles: Vec<f64>,
    /// Angles after smoothing; equal to `face_angles` with smoothing off.
    pub smoothed_angles: Vec<f64>,
    /// Faces classified as overhang candidates.
    pub candidate_count: usize,
    /// Dangling tips, empty unless requested.
    pub dangling_tips: Vec<DanglingTip>,
    /// False when the call was cancelled and the results are partial.
    pub complete: bool,
    pub diagnostics: AnalysisDiagnostics,
}

impl OverhangAnalysis {
    /// Whether any region was found.
    pub fn has_overhangs(&self) -> bool {
        !self.results.is_empty()
    }

    /// Results whose volume passed the placement policy.
    pub fn valid_results(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter().filter(|r| r.placement_valid)
    }

    /// Support volumes in result order.
    pub fn boxes(&self) -> Vec<OrientedBoundingBox> {
        self.results.iter().map(|r| r.obb.clone()).collect()
    }
}

/// Find overhang regions and fit a support volume to each.
///
/// Invalid meshes and parameters are rejected before any geometry work.
///
/// ```
/// use mesh_overhang::{AnalysisParams, Mesh, analyze_overhangs};
///
/// // A square ceiling facing straight down.
/// let mesh = Mesh::from_buffers(
///     &[[0.0, 0.0, 5.0], [1.0, 0.0, 5.0], [1.0, 1.0, 5.0], [0.0, 1.0, 5.0]],
///     &[[0, 2, 1], [0, 3, 2]],
/// );
/// let analysis = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();
/// assert_eq!(analysis.results.len(), 1);
/// assert_eq!(analysis.results[0].severity, 180.0);
/// ```
pub fn analyze_overhangs(mesh: &Mesh, params: &AnalysisParams) -> OverhangResult<OverhangAnalysis> {
    analyze_overhangs_with_progress(mesh, params, None, None)
}

/// [`analyze_overhangs`] with progress reporting and cancellation.
///
/// The callback may return `false` to cancel, and the token may be
/// cancelled from another thread. Cancellation is checked per face during
/// segmentation and per region during fitting; a cancelled call returns the
/// regions finished so far with `complete == false`.
pub fn analyze_overhangs_with_progress(
    mesh: &Mesh,
    params: &AnalysisParams,
    callback: Option<&ProgressCallback>,
    token: Option<&CancellationToken>,
) -> OverhangResult<OverhangAnalysis> {
    validate_mesh_data(mesh)?;
    validate_params(params, mesh)?;

    let _timer =
        OperationTimer::with_context("analyze_overhangs", mesh.face_count(), mesh.vertex_count());
    log_mesh_stats(mesh, "overhang input");

    let down = params.build_direction.normalize();

    let normals = FaceNormals::compute(mesh);
    let angles = FaceAngles::compute(&normals, &down, params.threshold_deg);
    let adjacency = FaceAdjacency::build(&mesh.faces);

    let (smoothed_angles, candidates) = if params.smoothing {
        let smoothed = smooth_angles(&angles.angles, &adjacency);
        let candidates = classify(&smoothed, &normals, params.threshold_deg);
        (smoothed, candidates)
    } else {
        (angles.angles.clone(), angles.candidates.clone())
    };
    let candidate_count = candidates.iter().filter(|&&c| c).count();
    debug!(
        raw = angles.candidate_count(),
        smoothed = candidate_count,
        "Classified overhang candidates"
    );

    let tracker = match token {
        Some(token) => ProgressTracker::with_token(candidate_count as u64, token.clone()),
        None => ProgressTracker::new(candidate_count as u64),
    };

    let segmentation = match params.seed {
        SeedMode::Exhaustive => segment_exhaustive(&candidates, &adjacency, &tracker, callback),
        SeedMode::Face(face) => segment_seeded(face, &candidates, &adjacency, &tracker, callback),
        SeedMode::NearestTo(point) => match mesh.nearest_face(&point) {
            Some(face) => {
                debug!(face, "Seed point resolved to face");
                segment_seeded(face as u32, &candidates, &adjacency, &tracker, callback)
            }
            None => Segmentation {
                regions: Vec::new(),
                complete: true,
            },
        },
    };

    let mut diagnostics = AnalysisDiagnostics {
        degenerate_faces: normals.degenerate_count,
        boundary_edges: adjacency.boundary_edge_count(),
        non_manifold_edges: adjacency.non_manifold_edge_count(),
        ..Default::default()
    };

    let mut regions = Vec::with_capacity(segmentation.regions.len());
    for faces in segmentation.regions {
        let Some(region) = OverhangRegion::from_faces(mesh, faces, &angles.angles, &down) else {
            continue;
        };
        if region.vertices.len() < params.min_vertices {
            diagnostics.dropped_regions += 1;
            continue;
        }
        regions.push(region);
    }
    if diagnostics.dropped_regions > 0 {
        warn!(
            dropped = diagnostics.dropped_regions,
            min_vertices = params.min_vertices,
            "Dropped overhang regions with too few vertices"
        );
    }
    classify_regions(&mut regions, params.tip_tolerance);

    let all_points: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();
    let mesh_obb = fit_obb(&all_points, &params.fit);

    let region_count = regions.len();
    let fit_tracker = tracker.stage(region_count as u64);
    let mut results = Vec::with_capacity(region_count);
    for region in regions {
        if fit_tracker.is_cancelled() {
            break;
        }

        let result = support_volume(mesh, region, &mesh_obb, &down, params);
        if result.fitted_obb.is_degenerate(DEGENERATE_EXTENT) {
            diagnostics.degenerate_boxes += 1;
        }
        results.push(result);

        fit_tracker.increment();
        log_progress("fit", fit_tracker.current() as usize, region_count);
        fit_tracker.maybe_callback(callback, FIT_STAGE);
    }

    let dangling_tips = match &params.dangling {
        Some(dangling) if !fit_tracker.is_cancelled() => {
            let _perf = log_perf_section("dangling_tips");
            let tip_tracker = tracker.stage(mesh.face_count() as u64);
            find_dangling_tips(mesh, &normals, &adjacency, &down, dangling, &tip_tracker)
        }
        _ => Vec::new(),
    };

    let analysis = OverhangAnalysis {
        results,
        mesh_obb,
        face_angles: angles.angles,
        smoothed_angles,
        candidate_count,
        dangling_tips,
        complete: segmentation.complete && !fit_tracker.is_cancelled(),
        diagnostics,
    };
    log_analysis_summary(&analysis);
    Ok(analysis)
}

/// Fit, pad, extend and check the volume for one region.
fn support_volume(
    mesh: &Mesh,
    region: OverhangRegion,
    mesh_obb: &OrientedBoundingBox,
    down: &Vector3<f64>,
    params: &AnalysisParams,
) -> AnalysisResult {
    let fitted_obb = fit_obb(&region.points(mesh), &params.fit);
    let padded = expand_horizontal(&fitted_obb, down, params.padding);

    let obb = match params.extension {
        None => padded,
        Some(ExtensionTarget::BuildPlate { height }) => extend_to_height(&padded, down, height),
        Some(ExtensionTarget::NearestSurface { plate_height }) => {
            let mut excluded = vec![false; mesh.face_count()];
            for &f in &region.faces {
                excluded[f as usize] = true;
            }
            let target =
                surface_height_below(mesh, &padded.center, down, region.min_height, &excluded)
                    .map_or(plate_height, |h| h.max(plate_height));
            trace!(target, "Extension target below region");
            extend_to_height(&padded, down, target)
        }
    };

    let placement = {
        let _perf = log_perf_section("placement_check");
        check_placement(&obb, mesh_obb, mesh, &region, down, &params.policy)
    };
    let placement_valid = params.policy.accepts(&placement);

    trace!(
        faces = region.faces.len(),
        kind = %region.kind,
        volume = obb.volume(),
        placement_valid,
        "Fitted support volume"
    );

    AnalysisResult {
        severity: region.max_angle,
        region,
        fitted_obb,
        obb,
        placement_valid,
        placement,
    }
}

impl Mesh {
    /// Run [`analyze_overhangs`] on this mesh.
    pub fn analyze_overhangs(&self, params: &AnalysisParams) -> OverhangResult<OverhangAnalysis> {
        analyze_overhangs(self, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// An `n` x `n` grid over [x0, x0 + size] x [0, size] at height `z`,
    /// facing down when `down` is set and up otherwise.
    fn grid(n: u32, x0: f64, size: f64, z: f64, down: bool) -> Mesh {
        let step = size / n as f64;
        let mut positions = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                positions.push([x0 + i as f64 * step, j as f64 * step, z]);
            }
        }
        let idx = |i: u32, j: u32| j * (n + 1) + i;
        let mut faces = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let (a, b, c, d) = (idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1));
                if down {
                    faces.push([a, c, b]);
                    faces.push([a, d, c]);
                } else {
                    faces.push([a, b, c]);
                    faces.push([a, c, d]);
                }
            }
        }
        Mesh::from_buffers(&positions, &faces)
    }

    fn merge(meshes: &[Mesh]) -> Mesh {
        let mut out = Mesh::new();
        for m in meshes {
            let offset = out.vertices.len() as u32;
            out.vertices.extend(m.vertices.iter().cloned());
            out.faces.extend(m.faces.iter().map(|f| f.map(|v| v + offset)));
        }
        out
    }

    fn two_ceilings() -> Mesh {
        merge(&[
            grid(2, 0.0, 10.0, 4.0, true),
            grid(2, 20.0, 10.0, 8.0, true),
        ])
    }

    #[test]
    fn test_single_ceiling() {
        let mesh = grid(3, 0.0, 9.0, 5.0, true);
        let analysis = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();

        assert!(analysis.complete);
        assert_eq!(analysis.candidate_count, 18);
        assert_eq!(analysis.results.len(), 1);

        let result = &analysis.results[0];
        assert_eq!(result.faces().len(), 18);
        assert!(approx_eq(result.severity, 180.0));
        assert!(approx_eq(result.area(), 81.0));
        assert_eq!(result.kind(), RegionKind::Tip);
        assert!(result.placement_valid);
        assert!(approx_eq(result.placement.penetration_depth, 0.0));

        // Padding widens the box horizontally only.
        let (bottom, top) = result.obb.project_interval(&Vector3::z());
        assert!(approx_eq(bottom, 5.0) && approx_eq(top, 5.0));
        let down = Vector3::new(0.0, 0.0, -1.0);
        let vertical = crate::placement::vertical_axis(&result.fitted_obb, &down);
        for i in 0..3 {
            let growth = result.obb.half_extents[i] - result.fitted_obb.half_extents[i];
            let expected = if i == vertical { 0.0 } else { 1.0 };
            assert!(approx_eq(growth, expected));
        }
    }

    #[test]
    fn test_upward_faces_are_not_overhangs() {
        let mesh = grid(2, 0.0, 10.0, 0.0, false);
        let analysis = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();
        assert!(analysis.complete);
        assert_eq!(analysis.candidate_count, 0);
        assert!(!analysis.has_overhangs());
    }

    #[test]
    fn test_exhaustive_regions_and_kinds() {
        let analysis = analyze_overhangs(&two_ceilings(), &AnalysisParams::default()).unwrap();
        assert_eq!(analysis.results.len(), 2);
        assert_eq!(analysis.results[0].faces(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(analysis.results[0].kind(), RegionKind::Tip);
        assert_eq!(analysis.results[1].kind(), RegionKind::Boundary);
    }

    #[test]
    fn test_seed_face_and_seed_point() {
        let mesh = two_ceilings();

        let params = AnalysisParams::default().with_seed(SeedMode::Face(9));
        let by_face = analyze_overhangs(&mesh, &params).unwrap();
        assert_eq!(by_face.results.len(), 1);
        assert_eq!(by_face.results[0].faces()[0], 8);

        let params =
            AnalysisParams::default().with_seed(SeedMode::NearestTo(Point3::new(1.0, 1.0, 3.0)));
        let by_point = analyze_overhangs(&mesh, &params).unwrap();
        assert_eq!(by_point.results.len(), 1);
        assert_eq!(by_point.results[0].faces()[0], 0);
    }

    #[test]
    fn test_extension_to_build_plate() {
        let mesh = grid(2, 0.0, 10.0, 6.0, true);
        let params =
            AnalysisParams::default().with_extension(ExtensionTarget::BuildPlate { height: 0.0 });
        let analysis = analyze_overhangs(&mesh, &params).unwrap();

        let (bottom, top) = analysis.results[0].obb.project_interval(&Vector3::z());
        assert!(approx_eq(bottom, 0.0));
        assert!(approx_eq(top, 6.0));
    }

    #[test]
    fn test_extension_stops_at_surface_below() {
        let mesh = merge(&[
            grid(2, 0.0, 10.0, 10.0, true),
            grid(3, -5.0, 20.0, 3.0, false),
        ]);
        let params = AnalysisParams::default()
            .with_extension(ExtensionTarget::NearestSurface { plate_height: 0.0 });
        let analysis = analyze_overhangs(&mesh, &params).unwrap();

        assert_eq!(analysis.results.len(), 1);
        let (bottom, top) = analysis.results[0].obb.project_interval(&Vector3::z());
        assert!(approx_eq(bottom, 3.0), "bottom = {}", bottom);
        assert!(approx_eq(top, 10.0));
    }

    #[test]
    fn test_small_regions_are_dropped() {
        let mesh = Mesh::from_buffers(
            &[[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]],
            &[[0, 2, 1]],
        );
        let analysis = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();
        assert_eq!(analysis.candidate_count, 1);
        assert!(analysis.results.is_empty());
        assert_eq!(analysis.diagnostics.dropped_regions, 1);
    }

    #[test]
    fn test_flat_regions_count_as_degenerate_boxes() {
        let analysis = analyze_overhangs(&two_ceilings(), &AnalysisParams::default()).unwrap();
        assert_eq!(analysis.diagnostics.degenerate_boxes, 2);
        assert_eq!(analysis.diagnostics.non_manifold_edges, 0);
    }

    #[test]
    fn test_pre_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let params = AnalysisParams::default();
        let analysis =
            analyze_overhangs_with_progress(&two_ceilings(), &params, None, Some(&token)).unwrap();
        assert!(!analysis.complete);
        assert!(analysis.results.is_empty());
    }

    #[test]
    fn test_callback_can_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let callback: ProgressCallback = Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            false
        });

        let analysis = analyze_overhangs_with_progress(
            &two_ceilings(),
            &AnalysisParams::default(),
            Some(&callback),
            None,
        )
        .unwrap();
        assert!(!analysis.complete);
        assert_eq!(analysis.results.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_input_is_rejected_early() {
        let err = analyze_overhangs(&Mesh::new(), &AnalysisParams::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyMesh);

        let steep = AnalysisParams::default().with_threshold(120.0);
        let err = analyze_overhangs(&two_ceilings(), &steep).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);

        let out_of_range = AnalysisParams::default().with_seed(SeedMode::Face(99));
        let err = analyze_overhangs(&two_ceilings(), &out_of_range).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFaceIndex);
    }

    #[test]
    fn test_repeat_calls_agree() {
        let mesh = two_ceilings();
        let params = AnalysisParams::for_fdm().with_fit(ObbParams::precise());
        let a = analyze_overhangs(&mesh, &params).unwrap();
        let b = mesh.analyze_overhangs(&params).unwrap();

        assert_eq!(a.results.len(), b.results.len());
        for (x, y) in a.results.iter().zip(&b.results) {
            assert_eq!(x.faces(), y.faces());
            assert_eq!(x.obb, y.obb);
            assert_eq!(x.placement_valid, y.placement_valid);
        }
        assert_eq!(a.smoothed_angles, b.smoothed_angles);
    }

    #[test]
    fn test_smoothing_switch_keeps_raw_angles() {
        let params = AnalysisParams::default().with_smoothing(false);
        let analysis = analyze_overhangs(&two_ceilings(), &params).unwrap();
        assert_eq!(analysis.face_angles, analysis.smoothed_angles);
    }
}
