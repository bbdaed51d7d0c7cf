//! Tracing helpers for overhang analysis.
//!
//! The library only emits events; the host decides where they go. Targets:
//!
//! - `mesh_overhang::timing`: per-stage durations
//! - `mesh_overhang::mesh_state`: input mesh summaries
//! - `mesh_overhang::progress`: stage progress
//! - `mesh_overhang::io`: debug export
//! - `mesh_overhang::perf`: fine-grained section timing (trace)
//!
//! Set `RUST_LOG=mesh_overhang=debug` for detailed output.

use crate::analysis::OverhangAnalysis;
use crate::types::Mesh;
use std::time::Instant;
use tracing::{Span, debug, info, trace, warn};

/// A timer that logs its duration on drop.
///
/// ```
/// use mesh_overhang::tracing_ext::OperationTimer;
///
/// let timer = OperationTimer::new("fit_boxes");
/// assert!(timer.elapsed_ms() >= 0.0);
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("overhang_operation", operation = name);
        debug!(target: "mesh_overhang::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that records the mesh size on its span.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "overhang_operation",
            operation = name,
            faces = face_count,
            vertices = vertex_count
        );
        debug!(
            target: "mesh_overhang::timing",
            operation = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// The span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_overhang::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log mesh size and extent at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "mesh_overhang::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        face_normals = mesh.face_normals.is_some(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log progress of a stage.
pub fn log_progress(stage: &str, current: usize, total: usize) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };

    debug!(
        target: "mesh_overhang::progress",
        stage = stage,
        current = current,
        total = total,
        percent = percent,
        "Progress update"
    );
}

/// Log the outcome of one analysis call.
pub fn log_analysis_summary(analysis: &OverhangAnalysis) {
    let valid = analysis.results.iter().filter(|r| r.placement_valid).count();
    let d = &analysis.diagnostics;

    if analysis.complete {
        info!(
            target: "mesh_overhang::analysis",
            candidates = analysis.candidate_count,
            regions = analysis.results.len(),
            valid_placements = valid,
            dropped_regions = d.dropped_regions,
            degenerate_faces = d.degenerate_faces,
            non_manifold_edges = d.non_manifold_edges,
            "Overhang analysis completed"
        );
    } else {
        warn!(
            target: "mesh_overhang::analysis",
            candidates = analysis.candidate_count,
            regions = analysis.results.len(),
            "Overhang analysis cancelled; result is partial"
        );
    }
}

/// Log a debug export.
pub fn log_io_operation(operation: &str, path: &std::path::Path, triangles: usize) {
    info!(
        target: "mesh_overhang::io",
        operation = operation,
        path = path.display().to_string(),
        triangles = triangles,
        "I/O operation completed"
    );
}

/// Time a hot section at trace level.
///
/// Returns a guard that logs when dropped.
#[must_use]
pub fn log_perf_section(name: &'static str) -> impl Drop {
    struct PerfGuard {
        name: &'static str,
        start: Instant,
    }
    impl Drop for PerfGuard {
        fn drop(&mut self) {
            trace!(
                target: "mesh_overhang::perf",
                section = self.name,
                elapsed_us = self.start.elapsed().as_micros(),
                "Performance section completed"
            );
        }
    }
    PerfGuard {
        name,
        start: Instant::now(),
    }
}
