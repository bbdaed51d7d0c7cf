//! Support-volume expansion and placement checks.
//!
//! A fitted region box is turned into a support volume in up to three steps:
//!
//! 1. **Expansion**: pad the two horizontal box axes so the volume reaches
//!    a little past the overhang edge.
//! 2. **Extension** (optional): grow the box downward, keeping its top
//!    fixed, until its bottom reaches a reference height.
//! 3. **Validation**: test the volume against the mesh and apply a
//!    [`PlacementPolicy`].
//!
//! "Horizontal" and "vertical" refer to the build direction: the vertical
//! box axis is the one most aligned with it. Heights are measured along the
//! up vector (the negated build direction).

use crate::obb::OrientedBoundingBox;
use crate::region::OverhangRegion;
use crate::sat::{obb_intersects_obb, obb_intersects_triangle};
use crate::types::{Mesh, Triangle};
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use tracing::trace;

/// Rays closer to parallel with a triangle than this are misses.
const RAY_EPSILON: f64 = 1e-12;

/// Height of a point along the up vector `-down`.
#[inline]
pub fn height(p: &Point3<f64>, down: &Vector3<f64>) -> f64 {
    -down.dot(&p.coords)
}

/// Index of the box axis most aligned with the build direction.
pub fn vertical_axis(obb: &OrientedBoundingBox, down: &Vector3<f64>) -> usize {
    let alignment = obb.axes().map(|a| a.dot(down).abs());
    (0..3)
        .max_by(|&a, &b| alignment[a].total_cmp(&alignment[b]))
        .unwrap_or(2)
}

/// Grow the two horizontal half-extents by `padding`, so the box widens by
/// `padding` on each side. The vertical extent is untouched.
pub fn expand_horizontal(
    obb: &OrientedBoundingBox,
    down: &Vector3<f64>,
    padding: f64,
) -> OrientedBoundingBox {
    let vertical = vertical_axis(obb, down);
    let mut expanded = obb.clone();
    for i in (0..3).filter(|&i| i != vertical) {
        expanded.half_extents[i] += padding;
    }
    expanded
}

/// Extend the box downward so its lowest point sits at `target_height`.
///
/// The vertical half-extent grows and the center moves down along the
/// vertical axis by the same amount, so the top stays where it was. Boxes
/// already reaching the target are returned unchanged.
pub fn extend_to_height(
    obb: &OrientedBoundingBox,
    down: &Vector3<f64>,
    target_height: f64,
) -> OrientedBoundingBox {
    let up = -down;
    let vertical = vertical_axis(obb, down);
    let axis = obb.axis(vertical);
    let alignment = axis.dot(&up);

    let (bottom, _) = obb.project_interval(&up);
    let gap = bottom - target_height;
    if gap <= 0.0 || alignment.abs() < RAY_EPSILON {
        return obb.clone();
    }

    let delta = gap / (2.0 * alignment.abs());
    let mut extended = obb.clone();
    extended.half_extents[vertical] += delta;
    extended.center -= axis * (delta * alignment.signum());
    extended
}

/// Distance along `direction` (unit) from `origin` to the triangle, if the
/// ray hits it. Both sides count.
pub fn ray_triangle(origin: &Point3<f64>, direction: &Vector3<f64>, tri: &Triangle) -> Option<f64> {
    let e1 = tri.v1 - tri.v0;
    let e2 = tri.v2 - tri.v0;
    let p = direction.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < RAY_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - tri.v0;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&e1);
    let v = direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(&q) * inv_det;
    (t >= 0.0).then_some(t)
}

/// Height of the highest mesh surface straight below `origin` that lies at
/// or under `ceiling`, ignoring faces flagged in `excluded`.
pub fn surface_height_below(
    mesh: &Mesh,
    origin: &Point3<f64>,
    down: &Vector3<f64>,
    ceiling: f64,
    excluded: &[bool],
) -> Option<f64> {
    let origin_height = height(origin, down);
    (0..mesh.face_count())
        .filter(|&f| !excluded.get(f).copied().unwrap_or(false))
        .filter_map(|f| mesh.triangle(f))
        .filter_map(|tri| ray_triangle(origin, down, &tri))
        .map(|t| origin_height - t)
        .filter(|&h| h <= ceiling)
        .max_by(f64::total_cmp)
}

/// Decides whether a candidate support volume may be placed.
#[derive(Clone)]
pub enum PlacementPolicy {
    /// Every volume is accepted.
    AcceptAll,
    /// Accept volumes that hang below their own region: the top may rise
    /// above the region by at most `max_penetration` when the volume meets
    /// the mesh bounding box, and no triangle outside the region's
    /// neighborhood may be crossed.
    AttachmentOnly { max_penetration: f64 },
    /// Accept volumes that intersect no mesh triangle other than the
    /// region's own faces and the faces sharing a vertex with them.
    TriangleClearance,
    /// Caller-supplied rule.
    Custom(Arc<dyn Fn(&PlacementCheck) -> bool + Send + Sync>),
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        PlacementPolicy::AttachmentOnly {
            max_penetration: 1.0,
        }
    }
}

impl std::fmt::Debug for PlacementPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementPolicy::AcceptAll => write!(f, "AcceptAll"),
            PlacementPolicy::AttachmentOnly { max_penetration } => f
                .debug_struct("AttachmentOnly")
                .field("max_penetration", max_penetration)
                .finish(),
            PlacementPolicy::TriangleClearance => write!(f, "TriangleClearance"),
            PlacementPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl PlacementPolicy {
    fn needs_triangle_test(&self) -> bool {
        !matches!(self, PlacementPolicy::AcceptAll)
    }

    /// Apply the policy to a finished check.
    pub fn accepts(&self, check: &PlacementCheck) -> bool {
        match self {
            PlacementPolicy::AcceptAll => true,
            PlacementPolicy::AttachmentOnly { max_penetration } => {
                let attached =
                    !check.intersects_mesh_box || check.penetration_depth <= *max_penetration;
                attached && check.colliding_faces.is_empty()
            }
            PlacementPolicy::TriangleClearance => check.colliding_faces.is_empty(),
            PlacementPolicy::Custom(rule) => rule(check),
        }
    }
}

/// Geometric facts about a candidate volume.
#[derive(Debug, Clone, Default)]
pub struct PlacementCheck {
    /// Whether the volume intersects the mesh's oriented bounding box.
    pub intersects_mesh_box: bool,
    /// How far the volume's top rises above the region's highest point,
    /// along the up vector. Never negative.
    pub penetration_depth: f64,
    /// Mesh faces outside the region's neighborhood that the volume
    /// intersects. Left empty under [`PlacementPolicy::AcceptAll`].
    pub colliding_faces: Vec<u32>,
}

/// Measure a candidate volume against the mesh.
pub fn check_placement(
    candidate: &OrientedBoundingBox,
    mesh_obb: &OrientedBoundingBox,
    mesh: &Mesh,
    region: &OverhangRegion,
    down: &Vector3<f64>,
    policy: &PlacementPolicy,
) -> PlacementCheck {
    let up = -down;
    let (_, top) = candidate.project_interval(&up);
    let penetration_depth = (top - region.max_height).max(0.0);
    let intersects_mesh_box = obb_intersects_obb(candidate, mesh_obb);

    let colliding_faces = if policy.needs_triangle_test() {
        colliding_faces(candidate, mesh, region)
    } else {
        Vec::new()
    };

    trace!(
        intersects_mesh_box,
        penetration_depth,
        colliding = colliding_faces.len(),
        "Placement check"
    );

    PlacementCheck {
        intersects_mesh_box,
        penetration_depth,
        colliding_faces,
    }
}

/// Faces the candidate intersects, skipping the region and every face that
/// shares a vertex with it.
fn colliding_faces(
    candidate: &OrientedBoundingBox,
    mesh: &Mesh,
    region: &OverhangRegion,
) -> Vec<u32> {
    let lowest = Point3::from(Vector3::repeat(f64::INFINITY));
    let highest = Point3::from(Vector3::repeat(f64::NEG_INFINITY));
    let (box_min, box_max) = candidate
        .corners()
        .iter()
        .fold((lowest, highest), |(lo, hi), c| (lo.inf(c), hi.sup(c)));

    (0..mesh.face_count())
        .filter(|&f| {
            mesh.face(f).is_some_and(|face| {
                face.iter()
                    .all(|v| region.vertices.binary_search(v).is_err())
            })
        })
        .filter_map(|f| Some((f, mesh.triangle(f)?)))
        .filter(|(_, tri)| {
            let pts = tri.points();
            let lo = pts[0].inf(&pts[1]).inf(&pts[2]);
            let hi = pts[0].sup(&pts[1]).sup(&pts[2]);
            (0..3).all(|i| lo[i] <= box_max[i] && hi[i] >= box_min[i])
        })
        .filter(|(_, tri)| obb_intersects_triangle(candidate, tri))
        .map(|(f, _)| f as u32)
        .collect()
}
