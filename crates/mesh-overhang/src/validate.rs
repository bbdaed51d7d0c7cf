//! Input validation.
//!
//! Everything here runs before any geometry work. A failure is a structured
//! [`OverhangError`]; success means the analysis may index the mesh freely.

use crate::analysis::{AnalysisParams, ExtensionTarget, SeedMode};
use crate::dangling::DanglingParams;
use crate::error::{OverhangError, OverhangResult};
use crate::placement::PlacementPolicy;
use crate::types::Mesh;
use nalgebra::Vector3;
use tracing::debug;

/// Below this length a supplied normal or direction is treated as zero.
pub const MIN_DIRECTION_LENGTH: f64 = 1e-10;

/// Check mesh data for out-of-range indices, non-finite coordinates and
/// unusable supplied normals.
///
/// Fails fast on the first problem found.
pub fn validate_mesh_data(mesh: &Mesh) -> OverhangResult<()> {
    if mesh.vertices.is_empty() {
        return Err(OverhangError::empty_mesh("no vertices"));
    }
    if mesh.faces.is_empty() {
        return Err(OverhangError::empty_mesh("no faces"));
    }

    for (vertex_idx, vertex) in mesh.vertices.iter().enumerate() {
        let p = vertex.position;
        for (name, value) in [("x", p.x), ("y", p.y), ("z", p.z)] {
            if !value.is_finite() {
                return Err(OverhangError::invalid_coordinate(vertex_idx, name, value));
            }
        }
    }

    let vertex_count = mesh.vertices.len();
    for (face_idx, face) in mesh.faces.iter().enumerate() {
        if let Some(&bad) = face.iter().find(|&&v| v as usize >= vertex_count) {
            return Err(OverhangError::invalid_vertex_index(face_idx, bad, vertex_count));
        }
    }

    if let Some(normals) = &mesh.face_normals {
        if normals.len() != mesh.faces.len() {
            return Err(OverhangError::NormalCountMismatch {
                kind: "face",
                expected: mesh.faces.len(),
                actual: normals.len(),
            });
        }
        for (face_idx, n) in normals.iter().enumerate() {
            let length = n.norm();
            if !length.is_finite() || length < MIN_DIRECTION_LENGTH {
                return Err(OverhangError::invalid_normal(face_idx, length));
            }
        }
    }

    debug!(
        vertices = vertex_count,
        faces = mesh.faces.len(),
        "Mesh data validation passed"
    );
    Ok(())
}

/// Check analysis parameters against their valid ranges and against the mesh
/// they will be applied to.
pub fn validate_params(params: &AnalysisParams, mesh: &Mesh) -> OverhangResult<()> {
    let t = params.threshold_deg;
    if !t.is_finite() || !(0.0..=90.0).contains(&t) {
        return Err(OverhangError::invalid_parameter(
            "threshold_deg",
            t,
            "must be within [0, 90] degrees",
        ));
    }

    if !params.padding.is_finite() || params.padding < 0.0 {
        return Err(OverhangError::invalid_parameter(
            "padding",
            params.padding,
            "must be a finite non-negative distance",
        ));
    }

    validate_direction(&params.build_direction)?;

    match params.seed {
        SeedMode::Exhaustive => {}
        SeedMode::Face(face) => {
            if face as usize >= mesh.faces.len() {
                return Err(OverhangError::invalid_face_index(
                    face as usize,
                    mesh.faces.len(),
                ));
            }
        }
        SeedMode::NearestTo(p) => {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(OverhangError::invalid_parameter(
                    "seed",
                    format!("({}, {}, {})", p.x, p.y, p.z),
                    "seed point must be finite",
                ));
            }
        }
    }

    if let Some(target) = &params.extension {
        let height = match target {
            ExtensionTarget::BuildPlate { height } => *height,
            ExtensionTarget::NearestSurface { plate_height } => *plate_height,
        };
        if !height.is_finite() {
            return Err(OverhangError::invalid_parameter(
                "extension",
                height,
                "reference height must be finite",
            ));
        }
    }

    if let PlacementPolicy::AttachmentOnly { max_penetration } = params.policy {
        if !max_penetration.is_finite() || max_penetration < 0.0 {
            return Err(OverhangError::invalid_parameter(
                "policy.max_penetration",
                max_penetration,
                "must be a finite non-negative distance",
            ));
        }
    }

    if !params.tip_tolerance.is_finite() || params.tip_tolerance < 0.0 {
        return Err(OverhangError::invalid_parameter(
            "tip_tolerance",
            params.tip_tolerance,
            "must be a finite non-negative distance",
        ));
    }

    if let Some(dangling) = &params.dangling {
        validate_dangling(dangling)?;
    }

    Ok(())
}

fn validate_dangling(params: &DanglingParams) -> OverhangResult<()> {
    let distances = [
        ("dangling.min_drop", params.min_drop),
        ("dangling.plate_clearance", params.plate_clearance),
        ("dangling.min_face_drop", params.min_face_drop),
    ];
    for (name, value) in distances {
        if !value.is_finite() || value < 0.0 {
            return Err(OverhangError::invalid_parameter(
                name,
                value,
                "must be a finite non-negative distance",
            ));
        }
    }

    let fractions = [
        ("dangling.max_lower_fraction", params.max_lower_fraction),
        ("dangling.min_convexity", params.min_convexity),
    ];
    for (name, value) in fractions {
        if !(0.0..=1.0).contains(&value) {
            return Err(OverhangError::invalid_parameter(
                name,
                value,
                "must be a fraction within [0, 1]",
            ));
        }
    }
    Ok(())
}

/// Check that a build direction can be normalized.
pub fn validate_direction(direction: &Vector3<f64>) -> OverhangResult<()> {
    let length = direction.norm();
    if !length.is_finite() || length < MIN_DIRECTION_LENGTH {
        return Err(OverhangError::invalid_parameter(
            "build_direction",
            format!("({}, {}, {})", direction.x, direction.y, direction.z),
            "must be a finite non-zero vector",
        ));
    }
    Ok(())
}
