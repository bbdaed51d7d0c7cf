//! Per-face normals and overhang angles.
//!
//! # Angle convention
//!
//! The build direction `d` points *down*, the direction in which layers are
//! stacked against gravity. The overhang angle of a face is the angle
//! between its unit normal and the up vector `-d`, in degrees:
//!
//! | Face orientation            | Angle |
//! |-----------------------------|-------|
//! | Facing straight up (`-d`)   | 0°    |
//! | Vertical wall (`⟂ d`)       | 90°   |
//! | Tilted 45° below horizontal | 135°  |
//! | Facing straight down (`d`)  | 180°  |
//!
//! A threshold `t` in `[0, 90]` is the tolerated overhang past vertical: a
//! face is an overhang candidate when its angle exceeds `90 + t`. With the
//! default of 45°, faces whose normal lies within 45° of straight down need
//! support.

use crate::types::Mesh;
use crate::validate::MIN_DIRECTION_LENGTH;
use nalgebra::Vector3;
use tracing::debug;

/// Overhang angle in degrees between a unit normal and the up vector `-down`.
///
/// The cosine is clamped to `[-1, 1]` before `acos`, so slightly
/// non-unit inputs never produce NaN.
#[inline]
pub fn overhang_angle(normal: &Vector3<f64>, down: &Vector3<f64>) -> f64 {
    let cos = (-normal.dot(down)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Whether an overhang angle exceeds the tolerated overhang `threshold_deg`.
#[inline]
pub fn is_overhang(angle_deg: f64, threshold_deg: f64) -> bool {
    angle_deg > 90.0 + threshold_deg
}

/// Unit normal per face.
///
/// Faces without a usable normal (zero area and no supplied normal) carry a
/// zero vector and are flagged degenerate.
#[derive(Debug, Clone)]
pub struct FaceNormals {
    pub normals: Vec<Vector3<f64>>,
    pub degenerate_count: usize,
}

impl FaceNormals {
    /// Resolve one normal per face.
    ///
    /// Priority: supplied face normals, then the average of the three vertex
    /// normals when all three are present, then the geometric normal from
    /// the winding. Every result is normalized with a guarded denominator.
    /// The mesh must already be validated.
    pub fn compute(mesh: &Mesh) -> Self {
        let mut degenerate_count = 0;
        let normals: Vec<Vector3<f64>> = (0..mesh.faces.len())
            .map(|face_idx| {
                let n = resolve_normal(mesh, face_idx);
                if n == Vector3::zeros() {
                    degenerate_count += 1;
                }
                n
            })
            .collect();

        if degenerate_count > 0 {
            debug!(
                degenerate = degenerate_count,
                "Faces without a usable normal"
            );
        }

        Self {
            normals,
            degenerate_count,
        }
    }

    /// Whether a face has no usable normal.
    #[inline]
    pub fn is_degenerate(&self, face_idx: usize) -> bool {
        self.normals
            .get(face_idx)
            .is_none_or(|n| *n == Vector3::zeros())
    }

    pub fn len(&self) -> usize {
        self.normals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normals.is_empty()
    }
}

fn resolve_normal(mesh: &Mesh, face_idx: usize) -> Vector3<f64> {
    if let Some(supplied) = mesh.face_normals.as_ref().and_then(|n| n.get(face_idx)) {
        return safe_normalize(supplied);
    }

    let Some(face) = mesh.face(face_idx) else {
        return Vector3::zeros();
    };

    let vertex_normals: Option<Vec<Vector3<f64>>> = face
        .iter()
        .map(|&v| mesh.vertices.get(v as usize).and_then(|v| v.normal))
        .collect();
    if let Some(ns) = vertex_normals {
        let averaged = safe_normalize(&(ns[0] + ns[1] + ns[2]));
        if averaged != Vector3::zeros() {
            return averaged;
        }
    }

    mesh.triangle(face_idx)
        .map(|tri| safe_normalize(&tri.normal_unnormalized()))
        .unwrap_or_else(Vector3::zeros)
}

/// Normalize, returning the zero vector when the length is below the guard.
#[inline]
pub fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    let len = v.norm();
    if len.is_finite() && len >= MIN_DIRECTION_LENGTH {
        v / len
    } else {
        Vector3::zeros()
    }
}

/// Overhang angle and candidacy per face.
#[derive(Debug, Clone)]
pub struct FaceAngles {
    /// Overhang angle per face in degrees. Degenerate faces read 90°.
    pub angles: Vec<f64>,
    /// Whether each face is an overhang candidate.
    pub candidates: Vec<bool>,
}

impl FaceAngles {
    /// Compute angles against the unit build direction `down` and classify
    /// against `threshold_deg`.
    pub fn compute(normals: &FaceNormals, down: &Vector3<f64>, threshold_deg: f64) -> Self {
        let angles: Vec<f64> = normals
            .normals
            .iter()
            .map(|n| overhang_angle(n, down))
            .collect();
        let candidates = classify(&angles, normals, threshold_deg);
        Self { angles, candidates }
    }

    /// Number of candidate faces.
    pub fn candidate_count(&self) -> usize {
        self.candidates.iter().filter(|&&c| c).count()
    }

    /// Candidate face indices in ascending order.
    pub fn candidate_faces(&self) -> Vec<u32> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .map(|(i, _)| i as u32)
            .collect()
    }
}

/// Threshold a set of angles. Degenerate faces are never candidates.
pub fn classify(angles: &[f64], normals: &FaceNormals, threshold_deg: f64) -> Vec<bool> {
    angles
        .iter()
        .enumerate()
        .map(|(i, &a)| !normals.is_degenerate(i) && is_overhang(a, threshold_deg))
        .collect()
}
