//! Face-to-face adjacency from shared edges.
//!
//! Two faces are neighbors when they share an edge that belongs to exactly
//! two faces. Boundary edges (one face) and non-manifold edges (three or
//! more) connect nothing and are counted instead.

use hashbrown::HashMap;
use tracing::{debug, warn};

/// Symmetric face adjacency stored as a compressed index arena.
///
/// `neighbors(f)` is a sorted slice, so traversal order never depends on
/// hash iteration order.
#[derive(Debug, Clone, Default)]
pub struct FaceAdjacency {
    offsets: Vec<u32>,
    neighbors: Vec<u32>,
    boundary_edges: usize,
    non_manifold_edges: usize,
    edge_count: usize,
}

impl FaceAdjacency {
    /// Build adjacency for a list of faces.
    ///
    /// ```
    /// use mesh_overhang::FaceAdjacency;
    ///
    /// let adj = FaceAdjacency::build(&[[0, 1, 2], [1, 3, 2]]);
    /// assert_eq!(adj.neighbors(0), &[1]);
    /// assert_eq!(adj.boundary_edge_count(), 4);
    /// ```
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> =
            HashMap::with_capacity(faces.len() * 3 / 2);

        for (face_idx, face) in faces.iter().enumerate() {
            for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                if a == b {
                    continue;
                }
                let edge_faces = edge_to_faces.entry(normalize_edge(a, b)).or_default();
                if edge_faces.last() != Some(&(face_idx as u32)) {
                    edge_faces.push(face_idx as u32);
                }
            }
        }

        let mut pairs: Vec<(u32, u32)> = Vec::with_capacity(edge_to_faces.len());
        let mut boundary_edges = 0;
        let mut non_manifold_edges = 0;

        for edge_faces in edge_to_faces.values() {
            match edge_faces.as_slice() {
                [_] => boundary_edges += 1,
                &[f0, f1] if f0 != f1 => {
                    pairs.push((f0, f1));
                    pairs.push((f1, f0));
                }
                [_, _] => {}
                _ => non_manifold_edges += 1,
            }
        }

        if non_manifold_edges > 0 {
            warn!(
                non_manifold_edges,
                "Non-manifold edges found; faces across them are not connected"
            );
        }

        pairs.sort_unstable();
        pairs.dedup();

        let mut offsets = vec![0u32; faces.len() + 1];
        for &(f, _) in &pairs {
            offsets[f as usize + 1] += 1;
        }
        for i in 0..faces.len() {
            offsets[i + 1] += offsets[i];
        }
        let neighbors: Vec<u32> = pairs.into_iter().map(|(_, n)| n).collect();

        debug!(
            faces = faces.len(),
            edges = edge_to_faces.len(),
            boundary_edges,
            non_manifold_edges,
            "Built face adjacency"
        );

        Self {
            offsets,
            neighbors,
            boundary_edges,
            non_manifold_edges,
            edge_count: edge_to_faces.len(),
        }
    }

    /// Neighbors of a face, ascending. Empty for out-of-range indices.
    #[inline]
    pub fn neighbors(&self, face: usize) -> &[u32] {
        match (self.offsets.get(face), self.offsets.get(face + 1)) {
            (Some(&start), Some(&end)) => &self.neighbors[start as usize..end as usize],
            _ => &[],
        }
    }

    /// Number of faces the graph was built for.
    pub fn face_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of distinct undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Edges with exactly one face.
    pub fn boundary_edge_count(&self) -> usize {
        self.boundary_edges
    }

    /// Edges shared by three or more faces.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.non_manifold_edges
    }

    /// Whether every adjacency is mirrored.
    pub fn is_symmetric(&self) -> bool {
        (0..self.face_count()).all(|f| {
            self.neighbors(f)
                .iter()
                .all(|&n| self.neighbors(n as usize).binary_search(&(f as u32)).is_ok())
        })
    }
}

/// Normalize edge direction so v0 < v1.
#[inline]
fn normalize_edge(v0: u32, v1: u32) -> (u32, u32) {
    if v0 < v1 { (v0, v1) } else { (v1, v0) }
}
