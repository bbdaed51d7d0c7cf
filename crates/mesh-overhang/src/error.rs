//! Error types for overhang analysis with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable error code
//! - Location context (which face, which vertex, which parameter)
//! - A recovery suggestion
//! - Terminal rendering via miette
//!
//! # Error Codes
//!
//! Codes follow the format `OVH-XXXX`:
//! - `OVH-1xxx`: I/O errors (debug export and harness input)
//! - `OVH-2xxx`: Input data errors (indices, coordinates, normals)
//! - `OVH-3xxx`: Parameter errors
//!
//! Degenerate geometry and non-manifold edges are not errors. They are
//! absorbed by the analysis and reported through its diagnostics.
//!
//! # Example
//!
//! ```
//! use mesh_overhang::{ErrorCode, OverhangError};
//!
//! let err = OverhangError::invalid_vertex_index(5, 100, 50);
//! assert_eq!(err.code(), ErrorCode::InvalidVertexIndex);
//! assert_eq!(err.code().as_str(), "OVH-2001");
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for overhang operations.
pub type OverhangResult<T> = Result<T, OverhangError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// OVH-1001: Failed to read file
    IoRead = 1001,
    /// OVH-1002: Failed to write file
    IoWrite = 1002,
    /// OVH-1003: Failed to parse file
    ParseError = 1003,

    // Input data errors (2xxx)
    /// OVH-2001: Face references a vertex that does not exist
    InvalidVertexIndex = 2001,
    /// OVH-2002: Vertex has a NaN or infinite coordinate
    InvalidCoordinate = 2002,
    /// OVH-2003: Mesh has no vertices or no faces
    EmptyMesh = 2003,
    /// OVH-2004: Supplied normal has zero length or is not finite
    InvalidNormal = 2004,
    /// OVH-2005: Supplied normal array does not match the face/vertex count
    NormalCountMismatch = 2005,
    /// OVH-2006: Face index (seed) out of range
    InvalidFaceIndex = 2006,

    // Parameter errors (3xxx)
    /// OVH-3001: Parameter outside its valid range
    InvalidParameter = 3001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `OVH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "OVH-1001",
            ErrorCode::IoWrite => "OVH-1002",
            ErrorCode::ParseError => "OVH-1003",
            ErrorCode::InvalidVertexIndex => "OVH-2001",
            ErrorCode::InvalidCoordinate => "OVH-2002",
            ErrorCode::EmptyMesh => "OVH-2003",
            ErrorCode::InvalidNormal => "OVH-2004",
            ErrorCode::NormalCountMismatch => "OVH-2005",
            ErrorCode::InvalidFaceIndex => "OVH-2006",
            ErrorCode::InvalidParameter => "OVH-3001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions attached to errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the mesh from the authoring software.
    ReexportFile { format: Option<String> },
    /// Check the input data for specific problems.
    CheckSourceMesh { checks: Vec<String> },
    /// Adjust one or more parameters.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Drop the supplied normals and let the analysis derive them.
    DeriveNormals,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { format } => match format {
                Some(fmt) => write!(f, "Try re-exporting the mesh as {}", fmt),
                None => write!(f, "Try re-exporting the mesh from the original software"),
            },
            RecoverySuggestion::CheckSourceMesh { checks } => {
                write!(f, "Check the source mesh for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::DeriveNormals => {
                write!(f, "Omit the supplied normals so they are computed from geometry")
            }
        }
    }
}

/// Where in the input an error was found.
#[derive(Debug, Clone)]
pub enum MeshLocation {
    /// A specific vertex.
    Vertex { index: usize },
    /// A specific face.
    Face { index: usize },
    /// A named analysis parameter.
    Parameter { name: &'static str },
    /// A file on disk.
    File { path: PathBuf },
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::Vertex { index } => write!(f, "vertex {}", index),
            MeshLocation::Face { index } => write!(f, "face {}", index),
            MeshLocation::Parameter { name } => write!(f, "parameter `{}`", name),
            MeshLocation::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Errors raised before or around overhang analysis.
#[derive(Debug, Error, Diagnostic)]
pub enum OverhangError {
    /// Error reading from a file.
    #[error("failed to read mesh from {path}")]
    #[diagnostic(
        code(overhang::io::read),
        help("Check that the file exists and is readable")
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(overhang::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(overhang::io::parse),
        help("The file may be corrupted. Try re-exporting it as binary STL.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Mesh has no vertices or no faces.
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(overhang::input::empty),
        help("The mesh must have at least one vertex and one face")
    )]
    EmptyMesh { details: String },

    /// Face references a vertex index past the end of the vertex array.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(overhang::input::vertex_index),
        help("Indices are 0-based and must be smaller than the vertex count")
    )]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Vertex coordinate is NaN or infinite.
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(overhang::input::coordinate),
        help("Check for numerical issues in the source data")
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// A supplied normal cannot be normalized.
    #[error("invalid normal for face {face_index}: length {length}")]
    #[diagnostic(
        code(overhang::input::normal),
        help("Supplied normals must be finite and non-zero; omit them to derive from geometry")
    )]
    InvalidNormal { face_index: usize, length: f64 },

    /// Supplied normal array has the wrong length.
    #[error("expected {expected} {kind} normals, got {actual}")]
    #[diagnostic(code(overhang::input::normal_count))]
    NormalCountMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A face index supplied by the caller is out of range.
    #[error("face index {face_index} is out of range for a mesh with {face_count} faces")]
    #[diagnostic(code(overhang::input::face_index))]
    InvalidFaceIndex {
        face_index: usize,
        face_count: usize,
    },

    /// An analysis parameter is outside its valid range.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    #[diagnostic(code(overhang::params::invalid))]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl OverhangError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            OverhangError::IoRead { .. } => ErrorCode::IoRead,
            OverhangError::IoWrite { .. } => ErrorCode::IoWrite,
            OverhangError::ParseError { .. } => ErrorCode::ParseError,
            OverhangError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            OverhangError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            OverhangError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            OverhangError::InvalidNormal { .. } => ErrorCode::InvalidNormal,
            OverhangError::NormalCountMismatch { .. } => ErrorCode::NormalCountMismatch,
            OverhangError::InvalidFaceIndex { .. } => ErrorCode::InvalidFaceIndex,
            OverhangError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            OverhangError::IoRead { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            OverhangError::IoWrite { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            OverhangError::ParseError { .. } => RecoverySuggestion::ReexportFile {
                format: Some("binary STL".into()),
            },
            OverhangError::EmptyMesh { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["mesh has geometry".into(), "correct export settings".into()],
            },
            OverhangError::InvalidVertexIndex { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["0-based indices".into(), "truncated vertex buffer".into()],
            },
            OverhangError::InvalidCoordinate { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["coordinate values".into(), "export precision".into()],
            },
            OverhangError::InvalidNormal { .. } | OverhangError::NormalCountMismatch { .. } => {
                RecoverySuggestion::DeriveNormals
            }
            OverhangError::InvalidFaceIndex { face_count, .. } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![("seed".into(), format!("a face below {}", face_count))],
                }
            }
            OverhangError::InvalidParameter { name, reason, .. } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![((*name).into(), (*reason).into())],
                }
            }
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<MeshLocation> {
        match self {
            OverhangError::InvalidVertexIndex { face_index, .. }
            | OverhangError::InvalidNormal { face_index, .. }
            | OverhangError::InvalidFaceIndex { face_index, .. } => {
                Some(MeshLocation::Face { index: *face_index })
            }
            OverhangError::InvalidCoordinate { vertex_index, .. } => Some(MeshLocation::Vertex {
                index: *vertex_index,
            }),
            OverhangError::InvalidParameter { name, .. } => Some(MeshLocation::Parameter { name }),
            OverhangError::IoRead { path, .. }
            | OverhangError::IoWrite { path, .. }
            | OverhangError::ParseError { path, .. } => {
                Some(MeshLocation::File { path: path.clone() })
            }
            OverhangError::EmptyMesh { .. } | OverhangError::NormalCountMismatch { .. } => None,
        }
    }

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OverhangError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OverhangError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        OverhangError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        OverhangError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidVertexIndex error.
    pub fn invalid_vertex_index(face_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        OverhangError::InvalidVertexIndex {
            face_index,
            vertex_index,
            vertex_count,
        }
    }

    /// Create an InvalidCoordinate error.
    pub fn invalid_coordinate(vertex_index: usize, coordinate: &'static str, value: f64) -> Self {
        OverhangError::InvalidCoordinate {
            vertex_index,
            coordinate,
            value,
        }
    }

    /// Create an InvalidNormal error.
    pub fn invalid_normal(face_index: usize, length: f64) -> Self {
        OverhangError::InvalidNormal { face_index, length }
    }

    /// Create an InvalidFaceIndex error.
    pub fn invalid_face_index(face_index: usize, face_count: usize) -> Self {
        OverhangError::InvalidFaceIndex {
            face_index,
            face_count,
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(
        name: &'static str,
        value: impl std::fmt::Display,
        reason: &'static str,
    ) -> Self {
        OverhangError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
