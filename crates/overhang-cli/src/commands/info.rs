//! overhang info command - mesh statistics and input diagnostics.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use mesh_overhang::{FaceAdjacency, FaceNormals, validate_mesh_data};
use serde::Serialize;

use crate::output::fmt3;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    vertices: usize,
    faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    surface_area: f64,
    boundary_edges: usize,
    non_manifold_edges: usize,
    degenerate_faces: usize,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    let mesh = crate::input::load(input)?.mesh;
    validate_mesh_data(&mesh)?;

    let adjacency = FaceAdjacency::build(&mesh.faces);
    let normals = FaceNormals::compute(&mesh);
    let bounds = mesh.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    let info = MeshInfo {
        path: input.display().to_string(),
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
        bounds,
        surface_area: mesh.surface_area(),
        boundary_edges: adjacency.boundary_edge_count(),
        non_manifold_edges: adjacency.non_manifold_edge_count(),
        degenerate_faces: normals.degenerate_count,
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.format, cli.quiet),
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            println!("{}", "Mesh Information".bold().underline());
            println!("  {}: {}", "File".cyan(), info.path);
            println!("  {}: {}", "Vertices".cyan(), info.vertices);
            println!("  {}: {}", "Faces".cyan(), info.faces);
            if let Some(b) = &info.bounds {
                println!(
                    "  {}: {:.2} x {:.2} x {:.2}",
                    "Dimensions".cyan(),
                    b.dimensions[0],
                    b.dimensions[1],
                    b.dimensions[2]
                );
                println!("  {}: {}", "Min bounds".cyan(), fmt3(b.min));
                println!("  {}: {}", "Max bounds".cyan(), fmt3(b.max));
            }
            println!("  {}: {:.2}", "Surface area".cyan(), info.surface_area);

            let edge_line = |label: &str, count: usize| {
                let value = if count == 0 {
                    count.to_string().green()
                } else {
                    count.to_string().yellow()
                };
                println!("  {}: {}", label.cyan(), value);
            };
            edge_line("Boundary edges", info.boundary_edges);
            edge_line("Non-manifold edges", info.non_manifold_edges);
            edge_line("Degenerate faces", info.degenerate_faces);
        }
    }

    Ok(())
}
