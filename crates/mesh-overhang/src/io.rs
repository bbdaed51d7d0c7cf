//! STL input and debug export.
//!
//! Analysis itself never touches the filesystem. These helpers load test
//! models and write regions and support volumes out for inspection in any
//! mesh viewer.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{OverhangError, OverhangResult};
use crate::obb::OrientedBoundingBox;
use crate::tracing_ext::log_io_operation;
use crate::types::{Mesh, Triangle, Vertex};

/// Load a mesh from an STL file (binary or ASCII).
///
/// Vertices are shared by position. Triangles that collapse onto a repeated
/// vertex are skipped.
pub fn load_stl(path: &Path) -> OverhangResult<Mesh> {
    let file = File::open(path).map_err(|e| OverhangError::io_read(path, e))?;
    let mesh = read_stl(&mut BufReader::new(file), path)?;
    log_io_operation("load_stl", path, mesh.face_count());
    Ok(mesh)
}

/// Read STL data from any seekable source, such as an archive entry held
/// in memory. `origin` names the source in errors.
pub fn read_stl<R: Read + Seek>(reader: &mut R, origin: &Path) -> OverhangResult<Mesh> {
    let stl = stl_io::read_stl(reader)
        .map_err(|e| OverhangError::parse_error(origin, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    mesh.vertices.extend(
        stl.vertices
            .iter()
            .map(|v| Vertex::from_coords(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64)),
    );

    let mut skipped = 0usize;
    for face in &stl.faces {
        let [a, b, c] = face.vertices.map(|i| i as u32);
        if a == b || b == c || a == c {
            skipped += 1;
            continue;
        }
        mesh.faces.push([a, b, c]);
    }

    debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        skipped,
        "Converted STL"
    );
    Ok(mesh)
}

/// Save every face of a mesh as binary STL.
pub fn save_stl(mesh: &Mesh, path: &Path) -> OverhangResult<()> {
    let triangles: Vec<Triangle> = mesh.triangles().collect();
    write_triangles(&triangles, path)?;
    log_io_operation("save_stl", path, triangles.len());
    Ok(())
}

/// Save selected faces of a mesh as binary STL.
///
/// Typically the faces of one overhang region, or all candidate faces.
pub fn export_faces_stl(mesh: &Mesh, faces: &[u32], path: &Path) -> OverhangResult<()> {
    let triangles = faces
        .iter()
        .map(|&f| {
            mesh.triangle(f as usize)
                .ok_or_else(|| OverhangError::invalid_face_index(f as usize, mesh.face_count()))
        })
        .collect::<OverhangResult<Vec<_>>>()?;

    write_triangles(&triangles, path)?;
    log_io_operation("export_faces_stl", path, triangles.len());
    Ok(())
}

/// Save oriented boxes as one binary STL, 12 triangles per box.
pub fn export_boxes_stl(boxes: &[OrientedBoundingBox], path: &Path) -> OverhangResult<()> {
    let triangles: Vec<Triangle> = boxes
        .iter()
        .flat_map(|b| b.to_mesh().triangles().collect::<Vec<_>>())
        .collect();

    write_triangles(&triangles, path)?;
    log_io_operation("export_boxes_stl", path, triangles.len());
    Ok(())
}

/// Binary STL: unit normal, three vertices and a zero attribute word per
/// triangle. Degenerate triangles get a zero normal.
fn write_triangles(triangles: &[Triangle], path: &Path) -> OverhangResult<()> {
    info!(path = %path.display(), triangles = triangles.len(), "Writing STL");

    let file = File::create(path).map_err(|e| OverhangError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let to_f32 =
        |p: &nalgebra::Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
    let stl_triangles: Vec<stl_io::Triangle> = triangles
        .iter()
        .map(|t| {
            let n = t.normal().unwrap_or_else(nalgebra::Vector3::zeros);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [to_f32(&t.v0), to_f32(&t.v1), to_f32(&t.v2)],
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, stl_triangles.iter())
        .map_err(|e| OverhangError::io_write(path, std::io::Error::other(e.to_string())))?;
    writer
        .flush()
        .map_err(|e| OverhangError::io_write(path, e))?;
    Ok(())
}
