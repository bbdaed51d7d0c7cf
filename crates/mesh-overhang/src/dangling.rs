//! Dangling tips: downward points that hang below all of their neighbors.
//!
//! Angle thresholds miss small tips whose faces are steep rather than flat,
//! like the point of a cone hanging off a model. A vertex dangles when no
//! neighboring vertex sits lower by at least a small drop, so its first
//! layer would print in mid-air. Connected downward patches around such
//! vertices are kept as tips when they look like a convex point rather than
//! the lower edge of a slope.

use crate::adjacency::FaceAdjacency;
use crate::angle::FaceNormals;
use crate::progress::ProgressTracker;
use crate::segment::segment_exhaustive;
use crate::types::Mesh;
use nalgebra::{Point3, Vector3};
use tracing::{debug, trace};

/// Neighbor pairs whose curvature term is smaller than this count as flat.
const FLAT_PAIR_EPSILON: f64 = 1e-9;

/// Thresholds for dangling-tip detection. Distances are along the up
/// vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingParams {
    /// A vertex is supported when some neighbor sits at least this much
    /// lower.
    pub min_drop: f64,
    /// Faces whose centroid lies within this height of the mesh bottom rest
    /// on the plate and never dangle.
    pub plate_clearance: f64,
    /// Height difference for a neighboring face to count as lower.
    pub min_face_drop: f64,
    /// Patches whose dangling faces average a larger share of lower
    /// neighbors are slopes, not tips.
    pub max_lower_fraction: f64,
    /// Minimum share of convex neighbor pairs over the dangling faces.
    pub min_convexity: f64,
    /// Patches with fewer dangling faces are dropped.
    pub min_faces: usize,
}

impl Default for DanglingParams {
    fn default() -> Self {
        Self {
            min_drop: 0.05,
            plate_clearance: 0.2,
            min_face_drop: 0.05,
            max_lower_fraction: 0.35,
            min_convexity: 0.6,
            min_faces: 10,
        }
    }
}

/// A downward patch hanging from one or more dangling vertices.
#[derive(Debug, Clone)]
pub struct DanglingTip {
    /// Faces of the patch touching a dangling vertex, ascending.
    pub faces: Vec<u32>,
    /// The whole connected downward patch, ascending.
    pub patch: Vec<u32>,
    /// Mean share of lower neighbors over `faces`.
    pub lower_fraction: f64,
    /// Share of convex neighbor pairs over `faces`; `None` when every pair
    /// is flat.
    pub convexity: Option<f64>,
    /// Lowest dangling vertex of the patch.
    pub lowest_point: Point3<f64>,
}

/// Per-face neighborhood shape.
#[derive(Debug, Clone)]
pub struct FaceShape {
    /// Share of edge neighbors whose centroid sits lower by more than the
    /// face drop.
    pub lower_fraction: Vec<f64>,
    /// Neighbor pairs whose normals diverge along the step between
    /// centroids.
    pub convex_pairs: Vec<u32>,
    /// Neighbor pairs that are not flat.
    pub curved_pairs: Vec<u32>,
}

/// Faces whose normal has a positive component along `down`.
pub fn downward_faces(normals: &FaceNormals, down: &Vector3<f64>) -> Vec<bool> {
    normals.normals.iter().map(|n| n.dot(down) > 0.0).collect()
}

/// Flag the vertices of `mask` faces that have no neighbor lower by at least
/// `min_drop`. Vertices without any neighbor dangle too.
///
/// The mesh must already be validated.
pub fn dangling_vertices(
    mesh: &Mesh,
    mask: &[bool],
    down: &Vector3<f64>,
    min_drop: f64,
) -> Vec<bool> {
    let heights: Vec<f64> = mesh
        .vertices
        .iter()
        .map(|v| -down.dot(&v.position.coords))
        .collect();
    let neighbors = vertex_neighbors(mesh);

    let mut dangling = vec![false; mesh.vertex_count()];
    let mut seen = vec![false; mesh.vertex_count()];
    for (face, &selected) in mesh.faces.iter().zip(mask) {
        if !selected {
            continue;
        }
        for &v in face {
            let v = v as usize;
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            let floor = heights[v] - min_drop;
            dangling[v] = !neighbors[v].iter().any(|&n| heights[n as usize] < floor);
        }
    }
    dangling
}

/// Faces of `mask` touching a dangling vertex.
pub fn dangling_faces(mesh: &Mesh, mask: &[bool], dangling_vertices: &[bool]) -> Vec<bool> {
    mesh.faces
        .iter()
        .zip(mask)
        .map(|(face, &selected)| {
            selected && face.iter().any(|&v| dangling_vertices[v as usize])
        })
        .collect()
}

/// Lower-neighbor share and convexity counts for every face.
///
/// A neighbor pair is convex when `(n2 - n1) · (c2 - c1) > 0` for normals
/// `n` and centroids `c`.
pub fn face_shape(
    mesh: &Mesh,
    normals: &FaceNormals,
    adjacency: &FaceAdjacency,
    down: &Vector3<f64>,
    min_face_drop: f64,
) -> FaceShape {
    let centroids = face_centroids(mesh);
    let heights: Vec<f64> = centroids.iter().map(|c| -down.dot(&c.coords)).collect();

    let face_count = mesh.face_count();
    let mut shape = FaceShape {
        lower_fraction: vec![0.0; face_count],
        convex_pairs: vec![0; face_count],
        curved_pairs: vec![0; face_count],
    };

    for face in 0..face_count {
        let neighbors = adjacency.neighbors(face);
        if neighbors.is_empty() {
            continue;
        }
        let floor = heights[face] - min_face_drop;
        let mut lower = 0usize;
        for &n in neighbors {
            let n = n as usize;
            if heights[n] < floor {
                lower += 1;
            }
            let s = (normals.normals[n] - normals.normals[face])
                .dot(&(centroids[n] - centroids[face]));
            if s.abs() > FLAT_PAIR_EPSILON {
                shape.curved_pairs[face] += 1;
                if s > 0.0 {
                    shape.convex_pairs[face] += 1;
                }
            }
        }
        shape.lower_fraction[face] = lower as f64 / neighbors.len() as f64;
    }
    shape
}

/// Find dangling tips over the whole mesh.
///
/// Downward faces are split into connected patches. A patch is kept when it
/// has at least `min_faces` dangling faces clear of the plate, those faces
/// have few lower neighbors and their neighbor pairs are mostly convex.
/// Cancelling `tracker` stops the patch search early.
pub fn find_dangling_tips(
    mesh: &Mesh,
    normals: &FaceNormals,
    adjacency: &FaceAdjacency,
    down: &Vector3<f64>,
    params: &DanglingParams,
    tracker: &ProgressTracker,
) -> Vec<DanglingTip> {
    let downward = downward_faces(normals, down);
    let vertices = dangling_vertices(mesh, &downward, down, params.min_drop);
    let mut faces = dangling_faces(mesh, &downward, &vertices);

    let height = |p: &Point3<f64>| -down.dot(&p.coords);
    let bottom = mesh
        .vertices
        .iter()
        .map(|v| height(&v.position))
        .fold(f64::INFINITY, f64::min);
    for (flag, centroid) in faces.iter_mut().zip(face_centroids(mesh)) {
        if height(&centroid) <= bottom + params.plate_clearance {
            *flag = false;
        }
    }

    let dangling_count = faces.iter().filter(|&&f| f).count();
    debug!(
        vertices = vertices.iter().filter(|&&v| v).count(),
        faces = dangling_count,
        "Dangling geometry"
    );
    if dangling_count == 0 {
        return Vec::new();
    }

    let shape = face_shape(mesh, normals, adjacency, down, params.min_face_drop);
    let patches = segment_exhaustive(&downward, adjacency, tracker, None);

    let mut tips = Vec::new();
    for patch in patches.regions {
        let tip_faces: Vec<u32> = patch
            .iter()
            .copied()
            .filter(|&f| faces[f as usize])
            .collect();
        if tip_faces.is_empty() {
            continue;
        }

        let lower_fraction = tip_faces
            .iter()
            .map(|&f| shape.lower_fraction[f as usize])
            .sum::<f64>()
            / tip_faces.len() as f64;
        let (convex, curved) = tip_faces.iter().fold((0u32, 0u32), |(c, t), &f| {
            let f = f as usize;
            (c + shape.convex_pairs[f], t + shape.curved_pairs[f])
        });
        let convexity = (curved > 0).then(|| convex as f64 / curved as f64);

        if lower_fraction > params.max_lower_fraction
            || convexity.is_some_and(|c| c < params.min_convexity)
            || tip_faces.len() < params.min_faces
        {
            trace!(
                faces = tip_faces.len(),
                lower_fraction,
                ?convexity,
                "Rejected dangling patch"
            );
            continue;
        }

        let lowest_point = tip_faces
            .iter()
            .flat_map(|&f| mesh.faces[f as usize])
            .filter(|&v| vertices[v as usize])
            .filter_map(|v| mesh.position(v as usize))
            .min_by(|a, b| height(a).total_cmp(&height(b)));
        let Some(lowest_point) = lowest_point else {
            continue;
        };

        tips.push(DanglingTip {
            faces: tip_faces,
            patch,
            lower_fraction,
            convexity,
            lowest_point,
        });
    }

    debug!(tips = tips.len(), "Found dangling tips");
    tips
}

fn vertex_neighbors(mesh: &Mesh) -> Vec<Vec<u32>> {
    let mut neighbors = vec![Vec::new(); mesh.vertex_count()];
    for &[a, b, c] in &mesh.faces {
        for (u, v) in [(a, b), (b, c), (c, a)] {
            neighbors[u as usize].push(v);
            neighbors[v as usize].push(u);
        }
    }
    for list in &mut neighbors {
        list.sort_unstable();
        list.dedup();
    }
    neighbors
}

fn face_centroids(mesh: &Mesh) -> Vec<Point3<f64>> {
    (0..mesh.face_count())
        .map(|f| mesh.triangle(f).map_or(Point3::origin(), |t| t.centroid()))
        .collect()
}
