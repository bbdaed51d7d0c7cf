//! Overhang detection and support-volume fitting for triangle meshes.
//!
//! Given a mesh and a build direction, this crate finds the faces that hang
//! out further than a printer can bridge, groups them into connected
//! regions and fits each region with a tight oriented box. The boxes are
//! padded, optionally extended down to the build plate or the surface below,
//! and checked against the mesh so a slicer can place local support or
//! modifier volumes.
//!
//! # Features
//!
//! - **Angles**: per-face overhang angle against any build direction
//! - **Regions**: neighborhood smoothing and connected-region segmentation,
//!   either seeded from one face or over the whole mesh
//! - **Boxes**: PCA fitting with convex-hull reduction and an optional
//!   minimal-volume rotation search
//! - **Dangling tips**: downward points hanging below all their neighbors,
//!   found even when their faces are too steep to be overhangs
//! - **Placement**: padding, extension and separating-axis checks under a
//!   configurable [`PlacementPolicy`]
//! - **Control**: progress callbacks and cooperative cancellation
//!
//! # Coordinate System
//!
//! Angles are measured from the up vector, the negated build direction:
//! a floor reads 0°, a wall 90° and a ceiling 180°. With the default
//! threshold of 45°, faces steeper than 135° are overhangs. The default
//! build direction is `(0, 0, -1)`, so Z is up.
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_overhang::{AnalysisParams, io::load_stl};
//! use std::path::Path;
//!
//! let mesh = load_stl(Path::new("model.stl")).unwrap();
//! let analysis = mesh.analyze_overhangs(&AnalysisParams::for_fdm()).unwrap();
//!
//! for result in analysis.valid_results() {
//!     println!(
//!         "{} faces, worst {:.1}°, volume {:.2}",
//!         result.faces().len(),
//!         result.severity,
//!         result.obb.volume()
//!     );
//! }
//! ```
//!
//! # Error Handling
//!
//! Invalid meshes and parameters are rejected up front with an
//! [`OverhangError`] carrying a stable [`ErrorCode`]. Degenerate geometry
//! is not an error; it is absorbed and counted in
//! [`AnalysisDiagnostics`].
//!
//! ```
//! use mesh_overhang::{AnalysisParams, ErrorCode, Mesh, analyze_overhangs};
//!
//! let err = analyze_overhangs(&Mesh::new(), &AnalysisParams::default()).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::EmptyMesh);
//! ```

mod error;
mod types;

pub mod adjacency;
pub mod analysis;
pub mod angle;
pub mod dangling;
pub mod io;
pub mod obb;
pub mod placement;
pub mod progress;
pub mod region;
pub mod sat;
pub mod segment;
pub mod tracing_ext;
pub mod validate;

pub use error::{ErrorCode, MeshLocation, OverhangError, OverhangResult, RecoverySuggestion};
pub use types::{DEFAULT_WELD_TOLERANCE, Mesh, Triangle, Vertex};

pub use adjacency::FaceAdjacency;
pub use analysis::{
    AnalysisDiagnostics, AnalysisParams, AnalysisResult, ExtensionTarget, FIT_STAGE,
    OverhangAnalysis, SeedMode, analyze_overhangs, analyze_overhangs_with_progress,
};
pub use angle::{FaceAngles, FaceNormals, overhang_angle};
pub use dangling::{DanglingParams, DanglingTip, find_dangling_tips};
pub use obb::{FitMode, ObbParams, OrientedBoundingBox, fit_obb};
pub use placement::{PlacementCheck, PlacementPolicy};
pub use progress::{CancellationToken, Progress, ProgressCallback, ProgressTracker};
pub use region::{OverhangRegion, RegionKind};
pub use sat::{obb_intersects_obb, obb_intersects_triangle};
pub use validate::{validate_mesh_data, validate_params};
