//! Mesh loading for the harness: STL files, JSON mesh dumps and zip
//! archives holding either.
//!
//! A JSON dump holds the raw buffers a host application hands to the
//! analysis, plus the position the user picked:
//!
//! ```json
//! {
//!   "vertices": [[0, 0, 5], [1, 0, 5], [1, 1, 5]],
//!   "has_indices": true,
//!   "indices": [[0, 2, 1]],
//!   "normals": [[0, 0, -1], [0, 0, -1], [0, 0, -1]],
//!   "clicked_position": [0.6, 0.3, 5]
//! }
//! ```
//!
//! Without indices, vertices are read as a triangle soup and welded.
//!
//! A `.zip` archive is searched in order for its first `.json` or `.stl`
//! entry, so `mesh.json.zip` and `mesh.stl.zip` both load.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use mesh_overhang::io::{load_stl, read_stl};
use mesh_overhang::{DEFAULT_WELD_TOLERANCE, Mesh};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Deserialize)]
struct MeshDump {
    vertices: Vec<[f64; 3]>,
    #[serde(default)]
    has_indices: bool,
    #[serde(default)]
    indices: Vec<[u32; 3]>,
    #[serde(default)]
    normals: Option<Vec<[f64; 3]>>,
    #[serde(default)]
    clicked_position: Option<[f64; 3]>,
}

/// A loaded mesh and the picked position stored with it, if any.
#[derive(Debug)]
pub struct LoadedMesh {
    pub mesh: Mesh,
    pub picked: Option<Point3<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Stl,
    Json,
    Zip,
}

impl Format {
    fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".json") {
            Some(Format::Json)
        } else if lower.ends_with(".stl") {
            Some(Format::Stl)
        } else if lower.ends_with(".zip") {
            Some(Format::Zip)
        } else {
            None
        }
    }
}

/// Load by extension: `.json` dumps, `.zip` archives, everything else as
/// STL.
pub fn load(path: &Path) -> Result<LoadedMesh> {
    let format = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(Format::from_name);

    match format {
        Some(Format::Json) => load_json(path),
        Some(Format::Zip) => load_zip(path),
        Some(Format::Stl) | None => {
            let mesh =
                load_stl(path).with_context(|| format!("Failed to load mesh from {:?}", path))?;
            Ok(LoadedMesh { mesh, picked: None })
        }
    }
}

fn load_json(path: &Path) -> Result<LoadedMesh> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let dump: MeshDump = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse mesh dump {:?}", path))?;
    mesh_from_dump(dump)
}

fn load_zip(path: &Path) -> Result<LoadedMesh> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Invalid zip archive {:?}", path))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Cannot read entry {} of {:?}", i, path))?;
        let name = entry.name().to_string();
        let format = match Format::from_name(&name) {
            Some(f @ (Format::Json | Format::Stl)) => f,
            _ => continue,
        };

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Cannot extract '{}' from {:?}", name, path))?;
        info!(entry = %name, bytes = bytes.len(), "Extracted mesh from archive");

        return if format == Format::Json {
            let dump: MeshDump = serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse mesh dump '{}'", name))?;
            mesh_from_dump(dump)
        } else {
            let mesh = read_stl(&mut Cursor::new(bytes), Path::new(&name))
                .with_context(|| format!("Failed to load mesh from '{}'", name))?;
            Ok(LoadedMesh { mesh, picked: None })
        };
    }

    bail!("No .json or .stl file found in {:?}", path)
}

fn mesh_from_dump(dump: MeshDump) -> Result<LoadedMesh> {
    let mesh = if dump.has_indices {
        let mut mesh = Mesh::from_buffers(&dump.vertices, &dump.indices);
        if let Some(normals) = &dump.normals {
            if normals.len() == mesh.vertex_count() {
                for (v, n) in mesh.vertices.iter_mut().zip(normals) {
                    v.normal = Some(Vector3::from(*n));
                }
            } else if normals.len() == mesh.face_count() {
                let normals = normals.iter().map(|n| Vector3::from(*n)).collect();
                mesh = mesh.with_face_normals(normals);
            } else {
                bail!(
                    "{} normals match neither {} vertices nor {} faces",
                    normals.len(),
                    mesh.vertex_count(),
                    mesh.face_count()
                );
            }
        }
        mesh
    } else {
        if dump.vertices.len() % 3 != 0 {
            bail!(
                "non-indexed dump has {} vertices, not a multiple of 3",
                dump.vertices.len()
            );
        }
        let soup: Vec<Point3<f64>> = dump.vertices.iter().map(|p| Point3::from(*p)).collect();
        let mesh = Mesh::from_triangle_soup(&soup, DEFAULT_WELD_TOLERANCE);
        info!(
            soup = soup.len(),
            welded = mesh.vertex_count(),
            "Rebuilt index buffer from triangle soup"
        );
        mesh
    };
    let picked = dump.clicked_position.map(Point3::from);
    debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        picked = picked.is_some(),
        "Loaded mesh dump"
    );
    Ok(LoadedMesh { mesh, picked })
}
