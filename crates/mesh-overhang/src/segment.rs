//! Region segmentation over the face adjacency graph.
//!
//! Candidate faces are first smoothed over their neighborhood to suppress
//! isolated misclassifications, then grouped into connected regions by
//! breadth-first traversal, either from a single seed or exhaustively.

use crate::adjacency::FaceAdjacency;
use crate::progress::{ProgressCallback, ProgressTracker};
use std::collections::VecDeque;
use tracing::{debug, info};

/// How often, in visited faces, the progress callback is offered a call.
const CALLBACK_STRIDE: usize = 4096;

/// One pass of connectivity smoothing.
///
/// Each face's angle becomes the mean of its own angle and the angles of its
/// direct neighbors. Faces without neighbors keep their angle.
pub fn smooth_angles(angles: &[f64], adjacency: &FaceAdjacency) -> Vec<f64> {
    angles
        .iter()
        .enumerate()
        .map(|(face, &own)| {
            let neighbors = adjacency.neighbors(face);
            if neighbors.is_empty() {
                return own;
            }
            let sum: f64 = neighbors
                .iter()
                .filter_map(|&n| angles.get(n as usize))
                .sum::<f64>()
                + own;
            sum / (neighbors.len() + 1) as f64
        })
        .collect()
}

/// Regions found by a segmentation pass.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    /// Face indices per region, each sorted ascending. Regions are ordered
    /// by their smallest face index.
    pub regions: Vec<Vec<u32>>,
    /// False when the pass stopped early on cancellation.
    pub complete: bool,
}

impl Segmentation {
    /// Total number of faces across all regions.
    pub fn face_count(&self) -> usize {
        self.regions.iter().map(Vec::len).sum()
    }
}

/// Grow one region from `seed` over candidate faces.
///
/// Returns no region when the seed is not a candidate (or is out of range).
pub fn segment_seeded(
    seed: u32,
    candidates: &[bool],
    adjacency: &FaceAdjacency,
    tracker: &ProgressTracker,
    callback: Option<&ProgressCallback>,
) -> Segmentation {
    if !candidates.get(seed as usize).copied().unwrap_or(false) {
        debug!(seed, "Seed face is not an overhang candidate");
        return Segmentation {
            regions: Vec::new(),
            complete: true,
        };
    }

    let mut visited = vec![false; candidates.len()];
    let (region, complete) = grow(seed, candidates, adjacency, &mut visited, tracker, callback);

    debug!(seed, faces = region.len(), complete, "Grew seeded region");
    Segmentation {
        regions: vec![region],
        complete,
    }
}

/// Partition all candidate faces into connected regions.
///
/// Candidates are visited in ascending face order; each one not yet claimed
/// seeds a new region. The result is disjoint and, when complete, covers
/// every candidate.
pub fn segment_exhaustive(
    candidates: &[bool],
    adjacency: &FaceAdjacency,
    tracker: &ProgressTracker,
    callback: Option<&ProgressCallback>,
) -> Segmentation {
    let mut visited = vec![false; candidates.len()];
    let mut regions = Vec::new();

    for face in 0..candidates.len() {
        if !candidates[face] || visited[face] {
            continue;
        }
        let (region, complete) = grow(
            face as u32,
            candidates,
            adjacency,
            &mut visited,
            tracker,
            callback,
        );
        if !complete {
            debug!(regions = regions.len(), "Segmentation cancelled");
            return Segmentation {
                regions,
                complete: false,
            };
        }
        regions.push(region);
    }

    info!(
        regions = regions.len(),
        faces = regions.iter().map(Vec::len).sum::<usize>(),
        "Segmented overhang candidates"
    );

    Segmentation {
        regions,
        complete: true,
    }
}

/// Breadth-first growth from `seed`. Returns the sorted region and whether it
/// finished without cancellation.
fn grow(
    seed: u32,
    candidates: &[bool],
    adjacency: &FaceAdjacency,
    visited: &mut [bool],
    tracker: &ProgressTracker,
    callback: Option<&ProgressCallback>,
) -> (Vec<u32>, bool) {
    let mut region = Vec::new();
    let mut queue = VecDeque::from([seed]);
    visited[seed as usize] = true;

    while let Some(face) = queue.pop_front() {
        if tracker.is_cancelled() {
            region.sort_unstable();
            return (region, false);
        }
        region.push(face);
        tracker.increment();
        if tracker.current() % CALLBACK_STRIDE as u64 == 0
            && !tracker.maybe_callback(callback, "Segmenting overhang regions")
        {
            region.sort_unstable();
            return (region, false);
        }

        for &neighbor in adjacency.neighbors(face as usize) {
            let n = neighbor as usize;
            if candidates.get(n).copied().unwrap_or(false) && !visited[n] {
                visited[n] = true;
                queue.push_back(neighbor);
            }
        }
    }

    region.sort_unstable();
    (region, true)
}
