//! Separating axis tests.
//!
//! Two convex shapes are disjoint exactly when some axis separates their
//! projections. For two boxes the candidate axes are the 3 + 3 face normals
//! and the 9 pairwise cross products of their edges; for a box and a
//! triangle they are the 3 box axes, the triangle normal and the 9 cross
//! products of box axes with triangle edges.
//!
//! Cross products shorter than [`AXIS_EPSILON`] come from (nearly) parallel
//! edges and are skipped. Shapes that merely touch count as intersecting.

use crate::obb::OrientedBoundingBox;
use crate::types::Triangle;
use nalgebra::{Point3, Vector3};

/// Cross-product axes shorter than this are skipped.
pub const AXIS_EPSILON: f64 = 1e-6;

/// Projected extent of a point set onto `axis`.
#[inline]
fn interval(points: &[Point3<f64>], axis: &Vector3<f64>) -> (f64, f64) {
    points
        .iter()
        .map(|p| p.coords.dot(axis))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

#[inline]
fn separated(a: (f64, f64), b: (f64, f64)) -> bool {
    a.1 < b.0 || b.1 < a.0
}

/// The candidate separating axes for two boxes, degenerate cross products
/// removed. At most 15.
pub fn box_box_axes(a: &OrientedBoundingBox, b: &OrientedBoundingBox) -> Vec<Vector3<f64>> {
    let axes_a = a.axes();
    let axes_b = b.axes();

    let mut axes = Vec::with_capacity(15);
    axes.extend_from_slice(&axes_a);
    axes.extend_from_slice(&axes_b);
    for u in &axes_a {
        for v in &axes_b {
            let cross = u.cross(v);
            if cross.norm() >= AXIS_EPSILON {
                axes.push(cross);
            }
        }
    }
    axes
}

/// Whether two oriented boxes overlap or touch.
///
/// All 8 corners of each box are projected onto every candidate axis.
pub fn obb_intersects_obb(a: &OrientedBoundingBox, b: &OrientedBoundingBox) -> bool {
    let corners_a = a.corners();
    let corners_b = b.corners();

    !box_box_axes(a, b)
        .iter()
        .any(|axis| separated(interval(&corners_a, axis), interval(&corners_b, axis)))
}

/// Whether an oriented box and a triangle overlap or touch.
pub fn obb_intersects_triangle(obb: &OrientedBoundingBox, tri: &Triangle) -> bool {
    let corners = obb.corners();
    let tri_points = tri.points();
    let box_axes = obb.axes();

    let test =
        |axis: &Vector3<f64>| !separated(interval(&corners, axis), interval(&tri_points, axis));

    if !box_axes.iter().all(|axis| test(axis)) {
        return false;
    }

    let normal = tri.normal_unnormalized();
    if normal.norm() >= AXIS_EPSILON && !test(&normal) {
        return false;
    }

    let edges = [tri.v1 - tri.v0, tri.v2 - tri.v1, tri.v0 - tri.v2];
    for edge in &edges {
        for axis in &box_axes {
            let cross = edge.cross(axis);
            if cross.norm() >= AXIS_EPSILON && !test(&cross) {
                return false;
            }
        }
    }

    true
}
