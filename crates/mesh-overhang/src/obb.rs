//! Oriented bounding box fitting.
//!
//! The baseline fit is principal component analysis: the box axes are the
//! eigenvectors of the point covariance, largest spread first, with the
//! third axis rebuilt as the cross product of the first two so the frame is
//! always right-handed.
//!
//! Two optional refinements:
//! - **Hull reduction**: above a point-count threshold, extents are measured
//!   over the convex hull vertices only. The frame still comes from all
//!   points, so the box is the same.
//! - **Minimal-volume search**: a deterministic coarse-to-fine rotation
//!   search that only accepts volume-reducing rotations.

use crate::types::{Mesh, Vertex};
use nalgebra::{Matrix3, Point3, Rotation3, Unit, UnitQuaternion, Vector3};
use tracing::{debug, trace};

/// Half-extents below this are considered flat.
pub const DEGENERATE_EXTENT: f64 = 1e-9;

/// Rotation steps of the minimal-volume search, in degrees.
const SEARCH_STEPS_DEG: [f64; 6] = [30.0, 10.0, 3.0, 1.0, 0.3, 0.1];

/// Upper bound on improving moves per step size.
const MAX_MOVES_PER_STEP: usize = 64;

/// An oriented box: center, right-handed rotation whose columns are the box
/// axes, and non-negative half-extents along those axes.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: Point3<f64>,
    pub rotation: Rotation3<f64>,
    pub half_extents: Vector3<f64>,
}

impl OrientedBoundingBox {
    /// Create a box. Negative half-extents are clamped to zero.
    pub fn new(center: Point3<f64>, rotation: Rotation3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            center,
            rotation,
            half_extents: half_extents.map(|e| e.max(0.0)),
        }
    }

    /// An axis-aligned box from its corners.
    pub fn from_aabb(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self::new(
            nalgebra::center(&min, &max),
            Rotation3::identity(),
            (max - min) / 2.0,
        )
    }

    /// Unit direction of box axis `i` (0, 1 or 2).
    #[inline]
    pub fn axis(&self, i: usize) -> Vector3<f64> {
        self.rotation.matrix().column(i).into_owned()
    }

    /// The three box axes.
    #[inline]
    pub fn axes(&self) -> [Vector3<f64>; 3] {
        [self.axis(0), self.axis(1), self.axis(2)]
    }

    /// Box volume.
    #[inline]
    pub fn volume(&self) -> f64 {
        8.0 * self.half_extents.x * self.half_extents.y * self.half_extents.z
    }

    /// Whether any half-extent is below `eps`, making the box flat.
    pub fn is_degenerate(&self, eps: f64) -> bool {
        self.half_extents.min() < eps
    }

    /// The 8 corners.
    ///
    /// Ordered bottom ring then top ring (local z), each counter-clockwise
    /// seen from local +z: `---`, `+--`, `++-`, `-+-`, `--+`, `+-+`, `+++`, `-++`.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let e = self.half_extents;
        [
            Vector3::new(-e.x, -e.y, -e.z),
            Vector3::new(e.x, -e.y, -e.z),
            Vector3::new(e.x, e.y, -e.z),
            Vector3::new(-e.x, e.y, -e.z),
            Vector3::new(-e.x, -e.y, e.z),
            Vector3::new(e.x, -e.y, e.z),
            Vector3::new(e.x, e.y, e.z),
            Vector3::new(-e.x, e.y, e.z),
        ]
        .map(|c| self.center + self.rotation * c)
    }

    /// Coordinates of `p` in the box frame, relative to the center.
    #[inline]
    pub fn to_local(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(&(p - self.center))
    }

    /// Whether `p` lies inside the box grown by `tolerance` on every side.
    pub fn contains_point(&self, p: &Point3<f64>, tolerance: f64) -> bool {
        let local = self.to_local(p);
        (0..3).all(|i| local[i].abs() <= self.half_extents[i] + tolerance)
    }

    /// Interval covered by the box when projected onto `direction`.
    pub fn project_interval(&self, direction: &Vector3<f64>) -> (f64, f64) {
        let mid = self.center.coords.dot(direction);
        let radius: f64 = (0..3)
            .map(|i| self.half_extents[i] * self.axis(i).dot(direction).abs())
            .sum();
        (mid - radius, mid + radius)
    }

    /// A closed 12-triangle mesh of the box with outward winding.
    pub fn to_mesh(&self) -> Mesh {
        const FACES: [[u32; 3]; 12] = [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
        ];
        Mesh {
            vertices: self.corners().into_iter().map(Vertex::new).collect(),
            faces: FACES.to_vec(),
            face_normals: None,
        }
    }
}

/// Rotation strategy of the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Principal axes only.
    #[default]
    Pca,
    /// Principal axes refined by a volume-reducing rotation search.
    MinimalVolume,
}

/// Fitting parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ObbParams {
    pub mode: FitMode,
    /// Measure extents over the convex hull for large point sets.
    pub use_hull: bool,
    /// Point count above which the hull is used.
    pub hull_threshold: usize,
}

impl Default for ObbParams {
    fn default() -> Self {
        Self {
            mode: FitMode::Pca,
            use_hull: true,
            hull_threshold: 256,
        }
    }
}

impl ObbParams {
    /// Tightest boxes: minimal-volume search over the hull.
    pub fn precise() -> Self {
        Self {
            mode: FitMode::MinimalVolume,
            ..Self::default()
        }
    }

    /// PCA only, no hull. Fastest, and the reference for the others.
    pub fn pca_only() -> Self {
        Self {
            mode: FitMode::Pca,
            use_hull: false,
            hull_threshold: usize::MAX,
        }
    }
}

/// Fit an oriented box around `points`.
///
/// Every input point lies inside the result (up to rounding). Coincident,
/// collinear or coplanar inputs produce a flat box in a valid frame. An
/// empty input yields a zero box at the origin.
pub fn fit_obb(points: &[Point3<f64>], params: &ObbParams) -> OrientedBoundingBox {
    if points.is_empty() {
        return OrientedBoundingBox::new(Point3::origin(), Rotation3::identity(), Vector3::zeros());
    }

    let centroid = centroid(points);
    let frame = pca_frame(points, &centroid);

    let reduced;
    let extent_points = if params.use_hull && points.len() > params.hull_threshold {
        reduced = hull_points(points);
        trace!(input = points.len(), hull = reduced.len(), "Hull reduction");
        &reduced[..]
    } else {
        points
    };

    let obb = fit_in_frame(extent_points, &frame, &centroid);

    match params.mode {
        FitMode::Pca => obb,
        FitMode::MinimalVolume => {
            let refined = minimize_volume(extent_points, &centroid, obb);
            debug!(volume = refined.volume(), "Minimal-volume search finished");
            refined
        }
    }
}

/// Arithmetic mean of the points.
pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f64)
}

/// Covariance of the points about `centroid`, normalized by the count.
pub fn covariance(points: &[Point3<f64>], centroid: &Point3<f64>) -> Matrix3<f64> {
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    cov / points.len().max(1) as f64
}

/// Principal-axis frame of the points.
///
/// Columns are sorted by eigenvalue, largest first. The third column is
/// the cross product of the first two, never the raw third eigenvector.
pub fn pca_frame(points: &[Point3<f64>], centroid: &Point3<f64>) -> Rotation3<f64> {
    let eigen = covariance(points, centroid).symmetric_eigen();

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let first = eigen.eigenvectors.column(order[0]).into_owned();
    let second = eigen.eigenvectors.column(order[1]).into_owned();
    orthonormal_frame(&first, &second)
}

/// Right-handed orthonormal frame whose first axis follows `first` and
/// whose second axis is `second` made orthogonal to it.
///
/// Falls back to arbitrary perpendicular directions when the inputs are
/// zero, non-finite or parallel.
pub fn orthonormal_frame(first: &Vector3<f64>, second: &Vector3<f64>) -> Rotation3<f64> {
    let a0 = first
        .try_normalize(DEGENERATE_EXTENT)
        .filter(|v| v.iter().all(|c| c.is_finite()))
        .unwrap_or_else(Vector3::x);

    let a1 = (second - a0 * a0.dot(second))
        .try_normalize(1e-6)
        .filter(|v| v.iter().all(|c| c.is_finite()))
        .unwrap_or_else(|| any_perpendicular(&a0));

    let a2 = a0.cross(&a1).normalize();
    Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[a0, a1, a2]))
}

/// A unit vector perpendicular to unit vector `v`.
fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let helper = if v.x.abs() <= v.y.abs() && v.x.abs() <= v.z.abs() {
        Vector3::x()
    } else if v.y.abs() <= v.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    v.cross(&helper).normalize()
}

/// Tightest box around `points` with the given orientation.
///
/// `anchor` should be near the points (the centroid) to keep the projection
/// well conditioned.
pub fn fit_in_frame(
    points: &[Point3<f64>],
    rotation: &Rotation3<f64>,
    anchor: &Point3<f64>,
) -> OrientedBoundingBox {
    if points.is_empty() {
        return OrientedBoundingBox::new(*anchor, *rotation, Vector3::zeros());
    }

    let mut local_min = Vector3::repeat(f64::INFINITY);
    let mut local_max = Vector3::repeat(f64::NEG_INFINITY);
    for p in points {
        let local = rotation.inverse_transform_vector(&(p - anchor));
        local_min = local_min.inf(&local);
        local_max = local_max.sup(&local);
    }

    let half_extents = (local_max - local_min) / 2.0;
    let local_center = (local_min + local_max) / 2.0;
    OrientedBoundingBox::new(anchor + rotation * local_center, *rotation, half_extents)
}

/// Convex hull vertices of the points, or the points themselves when the
/// hull cannot be built.
pub fn hull_points(points: &[Point3<f64>]) -> Vec<Point3<f64>> {
    match parry3d_f64::transformation::try_convex_hull(points) {
        Ok((vertices, _)) if !vertices.is_empty() => vertices,
        Ok(_) => points.to_vec(),
        Err(err) => {
            debug!(error = ?err, points = points.len(), "Convex hull failed; using all points");
            points.to_vec()
        }
    }
}

/// Coarse-to-fine rotation search that never increases the volume of `start`.
fn minimize_volume(
    points: &[Point3<f64>],
    anchor: &Point3<f64>,
    start: OrientedBoundingBox,
) -> OrientedBoundingBox {
    let mut best = start;

    let aligned = fit_in_frame(points, &Rotation3::identity(), anchor);
    if aligned.volume() < best.volume() {
        best = aligned;
    }

    if best.volume() <= 0.0 {
        return best;
    }

    let mut orientation = UnitQuaternion::from_rotation_matrix(&best.rotation);

    for step in SEARCH_STEPS_DEG.map(f64::to_radians) {
        for _ in 0..MAX_MOVES_PER_STEP {
            let mut improved = false;

            for i in 0..3 {
                let axis = Unit::new_normalize(orientation * Vector3::ith(i, 1.0));
                for angle in [step, -step] {
                    let mut candidate = UnitQuaternion::from_axis_angle(&axis, angle) * orientation;
                    candidate.renormalize();
                    let rotation = candidate.to_rotation_matrix();
                    let obb = fit_in_frame(points, &rotation, anchor);
                    if obb.volume() < best.volume() * (1.0 - 1e-12) {
                        best = obb;
                        orientation = candidate;
                        improved = true;
                    }
                }
            }

            if !improved {
                break;
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{} != {}", a, b);
    }

    fn box_corners(min: [f64; 3], max: [f64; 3]) -> Vec<Point3<f64>> {
        let mut pts = Vec::new();
        for &x in &[min[0], max[0]] {
            for &y in &[min[1], max[1]] {
                for &z in &[min[2], max[2]] {
                    pts.push(Point3::new(x, y, z));
                }
            }
        }
        pts
    }

    fn assert_frame_valid(obb: &OrientedBoundingBox) {
        let m = obb.rotation.matrix();
        let identity = m.transpose() * m;
        assert!((identity - Matrix3::identity()).norm() < 1e-9);
        assert_close(m.determinant(), 1.0, 1e-9);
    }

    #[test]
    fn test_axis_aligned_box() {
        let pts = box_corners([0.0, 0.0, 0.0], [10.0, 10.0, 5.0]);
        let obb = fit_obb(&pts, &ObbParams::default());

        assert_close(obb.center.x, 5.0, 1e-9);
        assert_close(obb.center.y, 5.0, 1e-9);
        assert_close(obb.center.z, 2.5, 1e-9);

        let mut extents: Vec<f64> = obb.half_extents.iter().copied().collect();
        extents.sort_by(f64::total_cmp);
        assert_close(extents[0], 2.5, 1e-9);
        assert_close(extents[1], 5.0, 1e-9);
        assert_close(extents[2], 5.0, 1e-9);
        assert_close(obb.volume(), 500.0, 1e-6);
        assert_frame_valid(&obb);
    }

    #[test]
    fn test_rotated_box_recovers_principal_axes() {
        let rotation = Rotation3::from_euler_angles(0.3, -0.2, 0.7);
        let pts: Vec<Point3<f64>> = box_corners([-8.0, -3.0, -1.0], [8.0, 3.0, 1.0])
            .into_iter()
            .map(|p| Point3::from(rotation * p.coords) + Vector3::new(4.0, 5.0, 6.0))
            .collect();

        let obb = fit_obb(&pts, &ObbParams::default());
        assert_close(obb.half_extents.x, 8.0, 1e-6);
        assert_close(obb.half_extents.y, 3.0, 1e-6);
        assert_close(obb.half_extents.z, 1.0, 1e-6);
        assert_close(obb.center.x, 4.0, 1e-6);
        assert_frame_valid(&obb);
        for p in &pts {
            assert!(obb.contains_point(p, 1e-6));
        }
    }

    #[test]
    fn test_coplanar_points_give_flat_box() {
        let pts = vec![
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(4.0, 0.0, 3.0),
            Point3::new(4.0, 2.0, 3.0),
            Point3::new(0.0, 2.0, 3.0),
        ];
        let obb = fit_obb(&pts, &ObbParams::default());
        assert!(obb.is_degenerate(DEGENERATE_EXTENT));
        assert_close(obb.center.z, 3.0, 1e-9);
        assert_frame_valid(&obb);
        for p in &pts {
            assert!(obb.contains_point(p, 1e-9));
        }
    }

    #[test]
    fn test_coplanar_points_through_hull() {
        // A 20 x 20 grid is past the default hull threshold.
        let pts: Vec<Point3<f64>> = (0..400)
            .map(|i| Point3::new((i % 20) as f64 * 0.5, (i / 20) as f64 * 0.25, 3.0))
            .collect();
        let params = ObbParams {
            hull_threshold: 0,
            ..ObbParams::default()
        };

        for fit in [params.clone(), ObbParams::default(), ObbParams::precise()] {
            let obb = fit_obb(&pts, &fit);
            assert!(obb.is_degenerate(DEGENERATE_EXTENT));
            assert_close(obb.center.z, 3.0, 1e-9);
            assert_close(obb.volume(), 0.0, 1e-9);
            assert_frame_valid(&obb);
            for p in &pts {
                assert!(obb.contains_point(p, 1e-9));
            }
        }

        let hull = fit_obb(&pts, &params);
        let full = fit_obb(&pts, &ObbParams::pca_only());
        assert!((hull.center - full.center).norm() < 1e-9);
        assert!((hull.half_extents - full.half_extents).norm() < 1e-9);
    }

    #[test]
    fn test_coincident_and_collinear_points() {
        let same = vec![Point3::new(1.0, 2.0, 3.0); 5];
        let obb = fit_obb(&same, &ObbParams::default());
        assert_eq!(obb.volume(), 0.0);
        assert_frame_valid(&obb);
        assert!(obb.contains_point(&same[0], 1e-12));

        let line: Vec<Point3<f64>> = (0..5)
            .map(|i| Point3::new(i as f64, i as f64, 0.0))
            .collect();
        let obb = fit_obb(&line, &ObbParams::default());
        assert_frame_valid(&obb);
        assert_close(obb.half_extents.max(), 2.0 * std::f64::consts::SQRT_2, 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let obb = fit_obb(&[], &ObbParams::default());
        assert_eq!(obb.volume(), 0.0);
        assert_eq!(obb.center, Point3::origin());
    }

    #[test]
    fn test_hull_reduction_gives_same_box() {
        // Points on and inside an ellipsoid-ish shell.
        let mut pts = Vec::new();
        for i in 0..40 {
            for j in 0..20 {
                let theta = i as f64 * std::f64::consts::TAU / 40.0;
                let phi = j as f64 * std::f64::consts::PI / 19.0;
                let r = if (i + j) % 3 == 0 { 0.5 } else { 1.0 };
                pts.push(Point3::new(
                    6.0 * r * phi.sin() * theta.cos(),
                    3.0 * r * phi.sin() * theta.sin(),
                    1.5 * r * phi.cos(),
                ));
            }
        }

        let with_hull = fit_obb(
            &pts,
            &ObbParams {
                hull_threshold: 16,
                ..ObbParams::default()
            },
        );
        let without = fit_obb(&pts, &ObbParams::pca_only());

        assert!((with_hull.center - without.center).norm() < 1e-6);
        assert!((with_hull.half_extents - without.half_extents).norm() < 1e-6);
        assert_close(with_hull.volume(), without.volume(), 1e-6);
    }

    #[test]
    fn test_minimal_volume_never_worse_than_pca() {
        // A skewed point set where principal axes are not the tightest frame.
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(10.0, 0.0, 1.0),
            Point3::new(10.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
            Point3::new(2.0, 0.5, 0.5),
            Point3::new(2.1, 0.6, 0.4),
            Point3::new(1.9, 0.4, 0.6),
        ];
        let pca = fit_obb(&pts, &ObbParams::pca_only());
        let precise = fit_obb(
            &pts,
            &ObbParams {
                mode: FitMode::MinimalVolume,
                use_hull: false,
                hull_threshold: usize::MAX,
            },
        );
        assert!(precise.volume() <= pca.volume() + 1e-9);
        assert_close(precise.volume(), 10.0, 1e-6);
        assert_frame_valid(&precise);
        for p in &pts {
            assert!(precise.contains_point(p, 1e-9));
        }
    }

    #[test]
    fn test_project_interval_and_corners() {
        let obb =
            OrientedBoundingBox::from_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0));
        let (lo, hi) = obb.project_interval(&Vector3::z());
        assert_close(lo, 0.0, 1e-12);
        assert_close(hi, 6.0, 1e-12);

        let corners = obb.corners();
        assert_eq!(corners[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(corners[6], Point3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_to_mesh_is_closed_and_outward() {
        let obb =
            OrientedBoundingBox::from_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let mesh = obb.to_mesh();
        assert_eq!(mesh.face_count(), 12);
        let adjacency = crate::adjacency::FaceAdjacency::build(&mesh.faces);
        assert_eq!(adjacency.boundary_edge_count(), 0);
        for tri in mesh.triangles() {
            let n = tri.normal().expect("non-degenerate");
            let outward = tri.centroid() - obb.center;
            assert!(n.dot(&outward) > 0.0);
        }
    }
}
