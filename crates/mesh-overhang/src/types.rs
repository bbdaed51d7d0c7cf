//! Core mesh data types.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

/// Default tolerance for welding triangle-soup vertices.
pub const DEFAULT_WELD_TOLERANCE: f64 = 1e-6;

/// A vertex with an optional caller-supplied normal.
///
/// Coordinates are unit-agnostic; the analysis defaults assume millimeters.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// 3D position.
    pub position: Point3<f64>,

    /// Vertex normal, if the source provides one.
    pub normal: Option<Vector3<f64>>,
}

impl Vertex {
    /// Create a new vertex with only position set.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
        }
    }

    /// Create a vertex from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }
}

/// Read-only view of a triangle mesh handed to the analysis.
///
/// The analysis borrows a `Mesh` for the duration of one call and never
/// mutates or retains it.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as 0-based indices into the vertex array.
    /// Counter-clockwise winding when viewed from outside.
    pub faces: Vec<[u32; 3]>,

    /// Optional per-face normals. When present they take priority over
    /// vertex normals and geometry.
    pub face_normals: Option<Vec<Vector3<f64>>>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            face_normals: None,
        }
    }

    /// Build a mesh from flat position and index buffers.
    ///
    /// Indices are not checked here; run [`crate::validate::validate_mesh_data`]
    /// (the analysis entry points do) before relying on them.
    pub fn from_buffers(positions: &[[f64; 3]], faces: &[[u32; 3]]) -> Self {
        Self {
            vertices: positions
                .iter()
                .map(|&[x, y, z]| Vertex::from_coords(x, y, z))
                .collect(),
            faces: faces.to_vec(),
            face_normals: None,
        }
    }

    /// Rebuild an indexed mesh from a triangle soup.
    ///
    /// Every three consecutive points form one triangle. Points closer than
    /// `tolerance` (per axis, after quantization) collapse into one vertex so
    /// that faces share edges and adjacency can be recovered. A trailing
    /// partial triangle is ignored.
    pub fn from_triangle_soup(points: &[Point3<f64>], tolerance: f64) -> Self {
        let tolerance = if tolerance > 0.0 {
            tolerance
        } else {
            DEFAULT_WELD_TOLERANCE
        };
        let quantize = |p: &Point3<f64>| -> [i64; 3] {
            [
                (p.x / tolerance).round() as i64,
                (p.y / tolerance).round() as i64,
                (p.z / tolerance).round() as i64,
            ]
        };

        let mut lookup: HashMap<[i64; 3], u32> = HashMap::with_capacity(points.len() / 2);
        let mut mesh = Mesh::with_capacity(points.len() / 2, points.len() / 3);

        for chunk in points.chunks_exact(3) {
            let mut face = [0u32; 3];
            for (slot, p) in face.iter_mut().zip(chunk) {
                let next = mesh.vertices.len() as u32;
                *slot = *lookup.entry(quantize(p)).or_insert_with(|| {
                    mesh.vertices.push(Vertex::new(*p));
                    next
                });
            }
            mesh.faces.push(face);
        }

        mesh
    }

    /// Attach per-face normals.
    pub fn with_face_normals(mut self, normals: Vec<Vector3<f64>>) -> Self {
        self.face_normals = Some(normals);
        self
    }

    /// Number of vertices in the mesh.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces (triangles) in the mesh.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if mesh is empty (no vertices or faces).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Position of a vertex, bounds-checked.
    #[inline]
    pub fn position(&self, vertex_idx: usize) -> Option<Point3<f64>> {
        self.vertices.get(vertex_idx).map(|v| v.position)
    }

    /// Vertex indices of a face, bounds-checked.
    #[inline]
    pub fn face(&self, face_idx: usize) -> Option<[u32; 3]> {
        self.faces.get(face_idx).copied()
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if mesh is empty.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?.position;
        let (min, max) = self.vertices[1..]
            .iter()
            .fold((first, first), |(min, max), v| {
                (min.inf(&v.position), max.sup(&v.position))
            });
        Some((min, max))
    }

    /// Get a specific triangle by face index.
    ///
    /// Returns None when the face index or any of its vertex indices is out
    /// of range.
    pub fn triangle(&self, face_idx: usize) -> Option<Triangle> {
        let [i0, i1, i2] = self.face(face_idx)?;
        Some(Triangle {
            v0: self.position(i0 as usize)?,
            v1: self.position(i1 as usize)?,
            v2: self.position(i2 as usize)?,
        })
    }

    /// Iterate over triangles with resolved vertex positions.
    ///
    /// Faces with out-of-range indices are skipped.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.faces.len()).filter_map(|idx| self.triangle(idx))
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|tri| tri.area()).sum()
    }

    /// Index of the face whose centroid is nearest to `point`.
    ///
    /// Maps a picked position (for example a click on the rendered model)
    /// onto a seed face. Returns None for an empty mesh.
    pub fn nearest_face(&self, point: &Point3<f64>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, tri) in (0..self.faces.len()).filter_map(|i| Some((i, self.triangle(i)?))) {
            let dist_sq = (tri.centroid() - point).norm_squared();
            if best.is_none_or(|(_, d)| dist_sq < d) {
                best = Some((idx, dist_sq));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// A triangle with concrete vertex positions.
///
/// Winding is counter-clockwise when viewed from the front.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    /// Returns None for degenerate triangles (zero area).
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON * f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Compute the centroid.
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// The three vertices as an array.
    #[inline]
    pub fn points(&self) -> [Point3<f64>; 3] {
        [self.v0, self.v1, self.v2]
    }
}
