//! End-to-end tests for overhang analysis.
//!
//! These run the full pipeline on small closed models: angles, adjacency,
//! segmentation, box fitting and placement, plus STL export.

use mesh_overhang::io::{export_boxes_stl, export_faces_stl, load_stl, save_stl};
use mesh_overhang::{
    AnalysisParams, CancellationToken, DanglingParams, ErrorCode, ExtensionTarget, FIT_STAGE,
    Mesh, ObbParams, PlacementCheck, PlacementPolicy, Progress, ProgressCallback, RegionKind,
    SeedMode, Vertex, analyze_overhangs, analyze_overhangs_with_progress, fit_obb,
};
use nalgebra::{Point3, Rotation3, Vector3};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}

/// A closed slab over [x0, x0 + width] x [0, depth] between `z0` and `z1`.
///
/// The bottom is an `n` x `n` grid; top and sides are two triangles each.
/// Grid edges never coincide with side edges, so the bottom faces only
/// neighbor each other.
fn slab(n: u32, x0: f64, width: f64, depth: f64, z0: f64, z1: f64) -> Mesh {
    let mut mesh = Mesh::new();
    for j in 0..=n {
        for i in 0..=n {
            mesh.vertices.push(Vertex::from_coords(
                x0 + width * i as f64 / n as f64,
                depth * j as f64 / n as f64,
                z0,
            ));
        }
    }
    let idx = |i: u32, j: u32| j * (n + 1) + i;
    for j in 0..n {
        for i in 0..n {
            let (a, b, c, d) = (idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1));
            mesh.faces.push([a, c, b]);
            mesh.faces.push([a, d, c]);
        }
    }

    let t0 = mesh.vertices.len() as u32;
    let top = [
        (x0, 0.0),
        (x0 + width, 0.0),
        (x0 + width, depth),
        (x0, depth),
    ];
    for (x, y) in top {
        mesh.vertices.push(Vertex::from_coords(x, y, z1));
    }
    let (t1, t2, t3) = (t0 + 1, t0 + 2, t0 + 3);
    let (b0, b1, b2, b3) = (idx(0, 0), idx(n, 0), idx(n, n), idx(0, n));

    mesh.faces.extend_from_slice(&[
        // Top
        [t0, t1, t2],
        [t0, t2, t3],
        // Front, right, back, left
        [b0, b1, t1],
        [b0, t1, t0],
        [b1, b2, t2],
        [b1, t2, t1],
        [b2, b3, t3],
        [b2, t3, t2],
        [b3, b0, t0],
        [b3, t0, t3],
    ]);
    mesh
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

/// Two stacked slabs with a gap: a low one and a shelf above it.
fn stacked_slabs() -> Mesh {
    merge(&[
        slab(4, 0.0, 10.0, 8.0, 1.0, 2.0),
        slab(4, 0.0, 10.0, 8.0, 8.0, 9.0),
    ])
}

/// A closed 16-sided cone hanging point-down from `z_tip` to a flat cap at
/// `z_cap`.
fn hanging_cone(cx: f64, cy: f64, z_tip: f64, z_cap: f64) -> Mesh {
    let segments = 16u32;
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(cx, cy, z_tip));
    mesh.vertices.push(Vertex::from_coords(cx, cy, z_cap));
    for k in 0..segments {
        let a = std::f64::consts::TAU * k as f64 / segments as f64;
        let (x, y) = (cx + 2.0 * a.cos(), cy + 2.0 * a.sin());
        mesh.vertices.push(Vertex::from_coords(x, y, z_cap));
    }
    let ring = |k: u32| 2 + k % segments;
    for k in 0..segments {
        mesh.faces.push([0, ring(k + 1), ring(k)]);
        mesh.faces.push([1, ring(k), ring(k + 1)]);
    }
    mesh
}

// =============================================================================
// Pipeline
// =============================================================================

#[test]
fn test_floating_slab_bottom_is_one_region() {
    let mesh = slab(4, 0.0, 10.0, 8.0, 3.0, 5.0);
    let analysis = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();

    assert!(analysis.complete);
    assert_eq!(analysis.candidate_count, 32);
    assert_eq!(analysis.results.len(), 1);

    let result = &analysis.results[0];
    assert_eq!(result.faces(), (0..32).collect::<Vec<u32>>().as_slice());
    assert!(approx_eq(result.severity, 180.0, 1e-9));
    assert!(approx_eq(result.area(), 80.0, 1e-9));
    assert_eq!(result.kind(), RegionKind::Tip);
    assert!(result.placement_valid);

    let d = &analysis.diagnostics;
    assert_eq!(d.non_manifold_edges, 0);
    assert_eq!(d.degenerate_faces, 0);
    assert_eq!(d.boundary_edges, 4 * 4 + 4);
}

#[test]
fn test_extension_to_build_plate() {
    let mesh = slab(4, 0.0, 10.0, 8.0, 3.0, 5.0);
    let analysis = analyze_overhangs(&mesh, &AnalysisParams::for_fdm()).unwrap();

    let obb = &analysis.results[0].obb;
    let (bottom, top) = obb.project_interval(&Vector3::z());
    assert!(approx_eq(bottom, 0.0, 1e-9));
    assert!(approx_eq(top, 3.0, 1e-9));
}

#[test]
fn test_shelf_extends_to_surface_below() {
    let params = AnalysisParams::default()
        .with_extension(ExtensionTarget::NearestSurface { plate_height: 0.0 });
    let analysis = analyze_overhangs(&stacked_slabs(), &params).unwrap();

    assert_eq!(analysis.results.len(), 2);
    let lower = &analysis.results[0];
    let shelf = &analysis.results[1];
    assert_eq!(lower.kind(), RegionKind::Tip);
    assert_eq!(shelf.kind(), RegionKind::Boundary);

    let (bottom, top) = lower.obb.project_interval(&Vector3::z());
    assert!(approx_eq(bottom, 0.0, 1e-9) && approx_eq(top, 1.0, 1e-9));

    let (bottom, top) = shelf.obb.project_interval(&Vector3::z());
    assert!(approx_eq(bottom, 2.0, 1e-9), "shelf bottom = {}", bottom);
    assert!(approx_eq(top, 8.0, 1e-9));
}

#[test]
fn test_triangle_clearance_rejects_volume_through_part() {
    let params = AnalysisParams::for_fdm().with_policy(PlacementPolicy::TriangleClearance);
    let analysis = analyze_overhangs(&stacked_slabs(), &params).unwrap();

    let lower = &analysis.results[0];
    let shelf = &analysis.results[1];
    assert!(lower.placement_valid);
    assert!(lower.placement.colliding_faces.is_empty());
    assert!(!shelf.placement_valid);
    assert!(!shelf.placement.colliding_faces.is_empty());

    let relaxed = AnalysisParams::for_fdm().with_policy(PlacementPolicy::AcceptAll);
    let relaxed = analyze_overhangs(&stacked_slabs(), &relaxed).unwrap();
    assert!(relaxed.results.iter().all(|r| r.placement_valid));
    assert!(relaxed.results.iter().all(|r| r.placement.colliding_faces.is_empty()));
}

#[test]
fn test_default_policy_rejects_volume_through_part() {
    let analysis = analyze_overhangs(&stacked_slabs(), &AnalysisParams::for_fdm()).unwrap();

    let lower = &analysis.results[0];
    let shelf = &analysis.results[1];
    assert!(lower.placement_valid);

    // The shelf volume reaches the plate straight through the lower slab,
    // even though its top stays at the shelf.
    assert!(shelf.placement.intersects_mesh_box);
    assert!(approx_eq(shelf.placement.penetration_depth, 0.0, 1e-9));
    assert!(!shelf.placement.colliding_faces.is_empty());
    assert!(!shelf.placement_valid);
    assert_eq!(analysis.valid_results().count(), 1);
}

#[test]
fn test_custom_policy_sees_the_check() {
    let shallow = Arc::new(|check: &PlacementCheck| check.penetration_depth <= 0.5);
    let params = AnalysisParams::default().with_policy(PlacementPolicy::Custom(shallow));
    let analysis = analyze_overhangs(&stacked_slabs(), &params).unwrap();
    assert_eq!(analysis.valid_results().count(), 2);

    let reject = PlacementPolicy::Custom(Arc::new(|_: &PlacementCheck| false));
    let params = AnalysisParams::default().with_policy(reject);
    let analysis = analyze_overhangs(&stacked_slabs(), &params).unwrap();
    assert_eq!(analysis.valid_results().count(), 0);
    assert_eq!(analysis.results.len(), 2);
}

#[test]
fn test_seeded_analysis_finds_one_region() {
    let mesh = stacked_slabs();
    let wall_face = mesh.faces.len() as u32 - 3;
    let params = AnalysisParams::default().with_seed(SeedMode::Face(0));
    let analysis = analyze_overhangs(&mesh, &params).unwrap();
    assert_eq!(analysis.results.len(), 1);
    assert_eq!(analysis.results[0].faces().len(), 32);

    // A seed on a vertical side wall is not an overhang.
    let params = AnalysisParams::default().with_seed(SeedMode::Face(wall_face));
    let analysis = analyze_overhangs(&mesh, &params).unwrap();
    assert!(analysis.results.is_empty());
    assert!(analysis.complete);

    let params =
        AnalysisParams::default().with_seed(SeedMode::NearestTo(Point3::new(5.0, 4.0, 7.5)));
    let analysis = analyze_overhangs(&mesh, &params).unwrap();
    assert_eq!(analysis.results.len(), 1);
    assert!(approx_eq(analysis.results[0].region.min_height, 8.0, 1e-9));
}

#[test]
fn test_threshold_controls_candidates() {
    // A ramp rising 30° from horizontal; its underside reads 150°.
    let s = 3f64.sqrt();
    let mesh = Mesh::from_buffers(
        &[
            [0.0, 0.0, 0.0],
            [0.0, 4.0, 0.0],
            [s, 4.0, 1.0],
            [s, 0.0, 1.0],
        ],
        &[[0, 1, 2], [0, 2, 3]],
    );
    let normal = mesh.triangle(0).unwrap().normal().unwrap();
    assert!(normal.z < 0.0);

    let strict = analyze_overhangs(&mesh, &AnalysisParams::default().with_threshold(45.0)).unwrap();
    assert_eq!(strict.candidate_count, 2);
    assert!(approx_eq(strict.results[0].severity, 150.0, 1e-9));

    let loose = analyze_overhangs(&mesh, &AnalysisParams::default().with_threshold(70.0)).unwrap();
    assert_eq!(loose.candidate_count, 0);
}

#[test]
fn test_dangling_tip_found_below_angle_threshold() {
    let mesh = merge(&[
        slab(2, 0.0, 10.0, 8.0, 0.0, 1.0),
        hanging_cone(20.0, 4.0, 3.0, 6.0),
    ]);

    // The cone flanks read about 124°, short of the 135° overhang limit.
    let plain = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();
    assert_eq!(plain.results.len(), 1);
    assert!(approx_eq(plain.results[0].region.min_height, 0.0, 1e-9));
    assert!(plain.dangling_tips.is_empty());

    let params = AnalysisParams {
        dangling: Some(DanglingParams::default()),
        ..AnalysisParams::default()
    };
    let analysis = analyze_overhangs(&mesh, &params).unwrap();
    assert_eq!(analysis.results.len(), 1);
    assert_eq!(analysis.dangling_tips.len(), 1);

    let tip = &analysis.dangling_tips[0];
    assert_eq!(tip.faces.len(), 16);
    assert_eq!(tip.convexity, Some(1.0));
    assert!((tip.lowest_point - Point3::new(20.0, 4.0, 3.0)).norm() < 1e-9);
    for &f in &tip.faces {
        assert!(analysis.face_angles[f as usize] < 135.0);
    }
}

#[test]
fn test_rotated_model_and_direction_agree() {
    let mesh = slab(4, 0.0, 12.0, 6.0, 3.0, 5.0);
    let rotation = Rotation3::from_euler_angles(0.3, -0.7, 1.1);
    let mut rotated = mesh.clone();
    for v in &mut rotated.vertices {
        v.position = rotation * v.position;
    }

    let params = AnalysisParams::default().with_smoothing(false);
    let a = analyze_overhangs(&mesh, &params).unwrap();
    let b = analyze_overhangs(
        &rotated,
        &params.with_build_direction(rotation * Vector3::new(0.0, 0.0, -1.0)),
    )
    .unwrap();

    assert_eq!(a.results.len(), b.results.len());
    for (x, y) in a.results.iter().zip(&b.results) {
        assert_eq!(x.faces(), y.faces());
        assert!(approx_eq(x.severity, y.severity, 1e-6));

        let mut ex: Vec<f64> = x.obb.half_extents.iter().copied().collect();
        let mut ey: Vec<f64> = y.obb.half_extents.iter().copied().collect();
        ex.sort_by(f64::total_cmp);
        ey.sort_by(f64::total_cmp);
        for (p, q) in ex.iter().zip(&ey) {
            assert!(approx_eq(*p, *q, 1e-6), "{:?} vs {:?}", ex, ey);
        }
    }
}

#[test]
fn test_repeat_runs_are_identical() {
    let mesh = stacked_slabs();
    let params = AnalysisParams::for_resin()
        .with_fit(ObbParams::precise())
        .with_extension(ExtensionTarget::NearestSurface { plate_height: 0.0 });

    let first = analyze_overhangs(&mesh, &params).unwrap();
    let second = analyze_overhangs(&mesh, &params).unwrap();

    assert_eq!(first.face_angles, second.face_angles);
    assert_eq!(first.smoothed_angles, second.smoothed_angles);
    assert_eq!(first.mesh_obb, second.mesh_obb);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.results.len(), second.results.len());
    for (x, y) in first.results.iter().zip(&second.results) {
        assert_eq!(x.faces(), y.faces());
        assert_eq!(x.fitted_obb, y.fitted_obb);
        assert_eq!(x.obb, y.obb);
        assert_eq!(x.placement_valid, y.placement_valid);
    }
}

#[test]
fn test_box_fixture_fit() {
    let mut points = Vec::new();
    for &x in &[0.0, 10.0] {
        for &y in &[0.0, 10.0] {
            for &z in &[0.0, 5.0] {
                points.push(Point3::new(x, y, z));
            }
        }
    }
    let obb = fit_obb(&points, &ObbParams::default());
    assert!((obb.center - Point3::new(5.0, 5.0, 2.5)).norm() < 1e-9);

    let mut extents: Vec<f64> = obb.half_extents.iter().copied().collect();
    extents.sort_by(f64::total_cmp);
    assert!(approx_eq(extents[0], 2.5, 1e-9));
    assert!(approx_eq(extents[1], 5.0, 1e-9));
    assert!(approx_eq(extents[2], 5.0, 1e-9));
}

// =============================================================================
// Progress and cancellation
// =============================================================================

#[test]
fn test_progress_reports_fitting() {
    let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Box::new(move |p| {
        sink.lock().unwrap().push(p.clone());
        true
    });

    let analysis = analyze_overhangs_with_progress(
        &stacked_slabs(),
        &AnalysisParams::default(),
        Some(&callback),
        None,
    )
    .unwrap();

    assert!(analysis.complete);
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|p| p.current <= p.total));

    // Fitting counts regions, not segmented faces.
    let fitting: Vec<&Progress> = seen.iter().filter(|p| p.message == FIT_STAGE).collect();
    assert!(!fitting.is_empty());
    assert_eq!(fitting[0].current, 1);
    assert!(fitting.iter().all(|p| p.total == 2 && p.current >= 1));
}

#[test]
fn test_cancelled_token_yields_partial_result() {
    let token = CancellationToken::new();
    token.cancel();
    let analysis = analyze_overhangs_with_progress(
        &stacked_slabs(),
        &AnalysisParams::default(),
        None,
        Some(&token),
    )
    .unwrap();

    assert!(!analysis.complete);
    assert!(analysis.results.is_empty());
    assert_eq!(analysis.candidate_count, 64);
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_invalid_inputs_have_error_codes() {
    let mut bad_index = slab(2, 0.0, 1.0, 1.0, 0.0, 1.0);
    bad_index.faces.push([0, 1, 999]);
    let err = analyze_overhangs(&bad_index, &AnalysisParams::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidVertexIndex);

    let mut nan = slab(2, 0.0, 1.0, 1.0, 0.0, 1.0);
    nan.vertices[0].position.x = f64::NAN;
    let err = analyze_overhangs(&nan, &AnalysisParams::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCoordinate);

    let normals = slab(2, 0.0, 1.0, 1.0, 0.0, 1.0).with_face_normals(vec![Vector3::z(); 3]);
    let err = analyze_overhangs(&normals, &AnalysisParams::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NormalCountMismatch);

    let mesh = slab(2, 0.0, 1.0, 1.0, 0.0, 1.0);
    let err = analyze_overhangs(
        &mesh,
        &AnalysisParams::default().with_build_direction(Vector3::zeros()),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
    assert!(err.location().is_some());

    let err = analyze_overhangs(&mesh, &AnalysisParams::default().with_padding(-1.0)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
}

// =============================================================================
// STL
// =============================================================================

#[test]
fn test_stl_round_trip_preserves_analysis() {
    let mesh = slab(4, 0.0, 10.0, 8.0, 3.0, 5.0);
    let file = NamedTempFile::with_suffix(".stl").unwrap();
    save_stl(&mesh, file.path()).unwrap();

    let loaded = load_stl(file.path()).unwrap();
    assert_eq!(loaded.face_count(), mesh.face_count());

    let before = analyze_overhangs(&mesh, &AnalysisParams::default()).unwrap();
    let after = analyze_overhangs(&loaded, &AnalysisParams::default()).unwrap();
    assert_eq!(before.candidate_count, after.candidate_count);
    assert_eq!(before.results.len(), after.results.len());
}

#[test]
fn test_debug_export_of_regions_and_boxes() {
    let analysis = analyze_overhangs(&stacked_slabs(), &AnalysisParams::for_fdm()).unwrap();
    let mesh = stacked_slabs();

    let regions = NamedTempFile::with_suffix(".stl").unwrap();
    export_faces_stl(&mesh, analysis.results[1].faces(), regions.path()).unwrap();
    assert_eq!(load_stl(regions.path()).unwrap().face_count(), 32);

    let boxes = NamedTempFile::with_suffix(".stl").unwrap();
    export_boxes_stl(&analysis.boxes(), boxes.path()).unwrap();
    let loaded = load_stl(boxes.path()).unwrap();
    assert_eq!(loaded.face_count(), 24);

    let (min, _) = loaded.bounds().unwrap();
    assert!(approx_eq(min.z, 0.0, 1e-5));
}
