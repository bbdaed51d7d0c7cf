//! Overhang regions and their derived attributes.

use crate::types::Mesh;
use nalgebra::{Point3, Vector3};

/// Where a region sits relative to the other overhangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// The region reaches down to the lowest overhang of the model, a
    /// hanging tip that needs support from below.
    Tip,
    /// The region sits higher up, usually along the rim of a larger
    /// overhanging surface.
    Boundary,
}

impl std::fmt::Display for RegionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionKind::Tip => write!(f, "tip"),
            RegionKind::Boundary => write!(f, "boundary"),
        }
    }
}

/// A connected patch of overhang faces.
#[derive(Debug, Clone)]
pub struct OverhangRegion {
    /// Face indices, ascending.
    pub faces: Vec<u32>,
    /// Distinct vertex indices used by the faces, ascending.
    pub vertices: Vec<u32>,
    /// Smallest overhang angle in the region (degrees).
    pub min_angle: f64,
    /// Largest overhang angle in the region (degrees).
    pub max_angle: f64,
    /// Mean overhang angle over the region's faces (degrees).
    pub mean_angle: f64,
    /// Total surface area.
    pub area: f64,
    /// Lowest vertex along the build axis.
    pub lowest_point: Point3<f64>,
    /// Height of `lowest_point` along the up vector.
    pub min_height: f64,
    /// Height of the highest vertex along the up vector.
    pub max_height: f64,
    pub kind: RegionKind,
}

impl OverhangRegion {
    /// Derive region attributes from its faces.
    ///
    /// `angles` holds the raw per-face overhang angles and `down` the unit
    /// build direction. The mesh must already be validated. Returns None for
    /// an empty face list.
    pub fn from_faces(
        mesh: &Mesh,
        faces: Vec<u32>,
        angles: &[f64],
        down: &Vector3<f64>,
    ) -> Option<Self> {
        if faces.is_empty() {
            return None;
        }

        let mut vertices: Vec<u32> = faces
            .iter()
            .filter_map(|&f| mesh.face(f as usize))
            .flatten()
            .collect();
        vertices.sort_unstable();
        vertices.dedup();

        let face_angles: Vec<f64> = faces
            .iter()
            .filter_map(|&f| angles.get(f as usize).copied())
            .collect();
        let min_angle = face_angles.iter().copied().fold(f64::INFINITY, f64::min);
        let max_angle = face_angles.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_angle = face_angles.iter().sum::<f64>() / face_angles.len().max(1) as f64;

        let area = faces
            .iter()
            .filter_map(|&f| mesh.triangle(f as usize))
            .map(|t| t.area())
            .sum();

        let height = |p: &Point3<f64>| -down.dot(&p.coords);
        let mut lowest_point = mesh.position(vertices[0] as usize)?;
        let mut min_height = height(&lowest_point);
        let mut max_height = min_height;
        for &v in &vertices[1..] {
            let Some(p) = mesh.position(v as usize) else {
                continue;
            };
            let h = height(&p);
            if h < min_height {
                min_height = h;
                lowest_point = p;
            }
            max_height = max_height.max(h);
        }

        Some(Self {
            faces,
            vertices,
            min_angle,
            max_angle,
            mean_angle,
            area,
            lowest_point,
            min_height,
            max_height,
            kind: RegionKind::Boundary,
        })
    }

    /// Vertex positions of the region.
    pub fn points(&self, mesh: &Mesh) -> Vec<Point3<f64>> {
        self.vertices
            .iter()
            .filter_map(|&v| mesh.position(v as usize))
            .collect()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// Label each region as a tip or a boundary.
///
/// A region is a tip when its lowest point lies within `tolerance` of the
/// lowest point over all regions.
pub fn classify_regions(regions: &mut [OverhangRegion], tolerance: f64) {
    let global_min = regions
        .iter()
        .map(|r| r.min_height)
        .fold(f64::INFINITY, f64::min);

    for region in regions {
        region.kind = if region.min_height - global_min <= tolerance {
            RegionKind::Tip
        } else {
            RegionKind::Boundary
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -1.0)
    }

    /// Two downward-facing quads at different heights.
    fn two_ceilings() -> Mesh {
        Mesh::from_buffers(
            &[
                [0.0, 0.0, 2.0],
                [1.0, 0.0, 2.0],
                [1.0, 1.0, 2.0],
                [0.0, 1.0, 2.0],
                [5.0, 0.0, 4.0],
                [6.0, 0.0, 4.0],
                [6.0, 1.0, 4.0],
                [5.0, 1.0, 4.5],
            ],
            &[[0, 2, 1], [0, 3, 2], [4, 6, 5], [4, 7, 6]],
        )
    }

    #[test]
    fn test_region_attributes() {
        let mesh = two_ceilings();
        let angles = [180.0, 170.0, 180.0, 160.0];
        let region = OverhangRegion::from_faces(&mesh, vec![0, 1], &angles, &down())
            .expect("non-empty region");

        assert_eq!(region.vertices, vec![0, 1, 2, 3]);
        assert_eq!(region.min_angle, 170.0);
        assert_eq!(region.max_angle, 180.0);
        assert!((region.mean_angle - 175.0).abs() < 1e-12);
        assert!((region.area - 1.0).abs() < 1e-12);
        assert!((region.min_height - 2.0).abs() < 1e-12);
        assert_eq!(region.points(&mesh).len(), 4);
    }

    #[test]
    fn test_empty_region_is_none() {
        let mesh = two_ceilings();
        assert!(OverhangRegion::from_faces(&mesh, Vec::new(), &[], &down()).is_none());
    }

    #[test]
    fn test_tip_and_boundary_classification() {
        let mesh = two_ceilings();
        let angles = [180.0; 4];
        let mut regions = vec![
            OverhangRegion::from_faces(&mesh, vec![0, 1], &angles, &down()).expect("region"),
            OverhangRegion::from_faces(&mesh, vec![2, 3], &angles, &down()).expect("region"),
        ];
        assert!((regions[1].max_height - 4.5).abs() < 1e-12);

        classify_regions(&mut regions, 0.5);
        assert_eq!(regions[0].kind, RegionKind::Tip);
        assert_eq!(regions[1].kind, RegionKind::Boundary);

        classify_regions(&mut regions, 2.0);
        assert_eq!(regions[1].kind, RegionKind::Tip);
    }
}
