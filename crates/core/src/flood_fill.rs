//! Seeded region growing over the label bitmap.
//!
//! Every fill builds a scratch mask where `1` marks candidate voxels. A
//! breadth-first traversal from the seed promotes connected candidates to `2`,
//! and the promoted voxels receive the new label.

use std::collections::VecDeque;

use tracing::{debug, info};
use voxdraw_grid::{SliceAxis, VoxelGrid};

use crate::connectivity::{for_each_neighbor, Connectivity};
use crate::error::DrawError;
use crate::parallel;
use crate::settings::ClickToSegmentSettings;

const CANDIDATE: u8 = 1;
const IN_CLUSTER: u8 = 2;

/// How candidate voxels are chosen. Intensities are calibrated values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowMode {
    /// Voxels carrying the same label as the seed.
    Uniform,
    /// Voxels at least as bright as the seed (or cluster mean).
    Brighter,
    /// Voxels at most as bright as the seed (or cluster mean).
    Darker,
    Range { min: f32, max: f32 },
}

impl GrowMode {
    pub fn grows(self) -> bool {
        !matches!(self, GrowMode::Uniform)
    }

    fn bounds(self, base: f32) -> (f32, f32) {
        match self {
            GrowMode::Uniform => (f32::NEG_INFINITY, f32::INFINITY),
            GrowMode::Brighter => (base, f32::INFINITY),
            GrowMode::Darker => (f32::NEG_INFINITY, base),
            GrowMode::Range { min, max } => (min.min(max), max.max(min)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloodFillRequest {
    pub seed: [i32; 3],
    pub label: u8,
    pub mode: GrowMode,
    pub connectivity: Connectivity,
    pub max_distance_mm: Option<f32>,
    /// Keep the fill on the seed's slice of this orientation.
    pub planar: Option<SliceAxis>,
    /// Operate on the whole labeled cluster under the seed: erase it (label 0)
    /// or grow it into unlabeled voxels by intensity.
    pub cluster_tool: bool,
}

impl FloodFillRequest {
    pub fn new(seed: [i32; 3], label: u8) -> Self {
        Self {
            seed,
            label,
            mode: GrowMode::Uniform,
            connectivity: Connectivity::Six,
            max_distance_mm: None,
            planar: None,
            cluster_tool: false,
        }
    }

    pub fn with_mode(mut self, mode: GrowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_max_distance(mut self, max_distance_mm: Option<f32>) -> Self {
        self.max_distance_mm = max_distance_mm.filter(|d| d.is_finite() && *d > 0.0);
        self
    }

    pub fn with_planar(mut self, axis: Option<SliceAxis>) -> Self {
        self.planar = axis;
        self
    }

    pub fn as_cluster_tool(mut self) -> Self {
        self.cluster_tool = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The seed already carries the requested label.
    AlreadyLabeled,
    /// A cluster operation was requested on an unlabeled seed.
    NotInCluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Filled(usize),
    Skipped(SkipReason),
}

impl FillOutcome {
    pub fn filled(self) -> usize {
        match self {
            FillOutcome::Filled(count) => count,
            FillOutcome::Skipped(_) => 0,
        }
    }
}

pub(crate) fn seed_index(dims: [u32; 3], seed: [i32; 3]) -> Result<usize, DrawError> {
    let inside = seed
        .iter()
        .zip(dims.iter())
        .all(|(&p, &d)| p >= 0 && (p as i64) < d as i64);
    if !inside {
        return Err(DrawError::SeedOutOfBounds { seed, dims });
    }
    let nx = dims[0] as usize;
    let nxy = nx * dims[1] as usize;
    Ok(seed[0] as usize + seed[1] as usize * nx + seed[2] as usize * nxy)
}

/// Breadth-first traversal from `seed` over voxels marked `1`, promoting every
/// reached voxel to `2`. The seed is promoted unconditionally. Returns the
/// cluster size.
pub(crate) fn grow_cluster(
    mask: &mut [u8],
    dims: [u32; 3],
    seed: usize,
    connectivity: Connectivity,
) -> usize {
    let mut queue = VecDeque::new();
    mask[seed] = IN_CLUSTER;
    queue.push_back(seed);
    let mut count = 1;
    while let Some(idx) = queue.pop_front() {
        for_each_neighbor(dims, idx, connectivity, |n| {
            if mask[n] == CANDIDATE {
                mask[n] = IN_CLUSTER;
                queue.push_back(n);
                count += 1;
            }
        });
    }
    count
}

/// Marks the connected cluster of voxels sharing the seed's label.
fn label_cluster(
    labels: &[u8],
    dims: [u32; 3],
    seed: usize,
    connectivity: Connectivity,
) -> Vec<u8> {
    let value = labels[seed];
    let mut mask: Vec<u8> = labels
        .iter()
        .map(|&v| if v == value { CANDIDATE } else { 0 })
        .collect();
    grow_cluster(&mut mask, dims, seed, connectivity);
    mask
}

fn cluster_mean_intensity(grid: &VoxelGrid, mask: &[u8], fallback: f32) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (idx, &m) in mask.iter().enumerate() {
        if m == IN_CLUSTER {
            sum += grid.calibrated(idx) as f64;
            count += 1;
        }
    }
    if count == 0 {
        fallback
    } else {
        (sum / count as f64) as f32
    }
}

struct Reach {
    dims: [u32; 3],
    seed: [u32; 3],
    seed_mm: glam::Vec3,
    max_distance2: Option<f32>,
    normal: Option<usize>,
}

impl Reach {
    fn new(grid: &VoxelGrid, seed: [u32; 3], request: &FloodFillRequest) -> Self {
        Self {
            dims: grid.dims,
            seed,
            seed_mm: grid.voxel_to_mm(seed),
            max_distance2: request.max_distance_mm.map(|d| d * d),
            normal: request.planar.map(SliceAxis::normal_axis),
        }
    }

    fn allows(&self, grid: &VoxelGrid, idx: usize) -> bool {
        let nx = self.dims[0] as usize;
        let nxy = nx * self.dims[1] as usize;
        let z = idx / nxy;
        let y = (idx - z * nxy) / nx;
        let voxel = [(idx % nx) as u32, y as u32, z as u32];
        if let Some(axis) = self.normal {
            if voxel[axis] != self.seed[axis] {
                return false;
            }
        }
        match self.max_distance2 {
            Some(limit) => grid.voxel_to_mm(voxel).distance_squared(self.seed_mm) <= limit,
            None => true,
        }
    }
}

/// Runs one fill request, reading labels from `original` and writing into
/// `target`. In preview mode every voxel outside the cluster is reset from
/// `original`, so `target` holds exactly `original` plus this fill.
pub fn flood_fill(
    grid: &VoxelGrid,
    original: &[u8],
    target: &mut [u8],
    request: &FloodFillRequest,
    preview: bool,
) -> Result<FillOutcome, DrawError> {
    let count = grid.voxel_count();
    for len in [original.len(), target.len()] {
        if len != count {
            return Err(DrawError::DimensionMismatch {
                expected: count,
                actual: len,
            });
        }
    }
    let dims = grid.dims;
    let seed = seed_index(dims, request.seed)?;
    let seed_voxel = grid.coords(seed);
    let seed_label = original[seed];
    let reach = Reach::new(grid, seed_voxel, request);

    let mut mask = vec![0u8; count];
    match request.mode {
        GrowMode::Uniform => {
            if request.cluster_tool && seed_label == 0 {
                info!("flood fill: seed {:?} is not part of a cluster", request.seed);
                return Ok(FillOutcome::Skipped(SkipReason::NotInCluster));
            }
            if seed_label == request.label {
                info!(
                    "flood fill: seed {:?} already has label {}",
                    request.seed, request.label
                );
                return Ok(FillOutcome::Skipped(SkipReason::AlreadyLabeled));
            }
            parallel::for_each_indexed_mut(&mut mask, |idx, m| {
                if original[idx] == seed_label && reach.allows(grid, idx) {
                    *m = CANDIDATE;
                }
            });
        }
        mode if request.cluster_tool => {
            if seed_label == 0 {
                info!("flood fill: seed {:?} is not part of a cluster", request.seed);
                return Ok(FillOutcome::Skipped(SkipReason::NotInCluster));
            }
            let cluster = label_cluster(original, dims, seed, request.connectivity);
            let mean = cluster_mean_intensity(grid, &cluster, grid.calibrated(seed));
            let (lo, hi) = mode.bounds(mean);
            debug!("grow cluster: mean {mean}, window [{lo}, {hi}]");
            parallel::for_each_indexed_mut(&mut mask, |idx, m| {
                if cluster[idx] == IN_CLUSTER {
                    *m = CANDIDATE;
                } else if original[idx] == 0 {
                    let value = grid.calibrated(idx);
                    if value >= lo && value <= hi && reach.allows(grid, idx) {
                        *m = CANDIDATE;
                    }
                }
            });
        }
        mode => {
            let (lo, hi) = mode.bounds(grid.calibrated(seed));
            debug!("intensity fill: window [{lo}, {hi}]");
            parallel::for_each_indexed_mut(&mut mask, |idx, m| {
                let label = original[idx];
                if label != 0 && label != seed_label {
                    return;
                }
                let value = grid.calibrated(idx);
                if value >= lo && value <= hi && reach.allows(grid, idx) {
                    *m = CANDIDATE;
                }
            });
        }
    }

    let filled = grow_cluster(&mut mask, dims, seed, request.connectivity);
    for (idx, value) in target.iter_mut().enumerate() {
        if mask[idx] == IN_CLUSTER {
            *value = request.label;
        } else if preview {
            *value = original[idx];
        }
    }
    debug!(
        "flood fill from {:?}: {} voxels -> label {}",
        request.seed, filled, request.label
    );
    Ok(FillOutcome::Filled(filled))
}

/// Grows the labeled cluster under `seed` by one voxel into unlabeled
/// neighbors. Neighbor tests read the pre-dilation labels only.
pub fn dilate(
    labels: &[u8],
    dims: [u32; 3],
    seed: [i32; 3],
    connectivity: Connectivity,
) -> Result<(Vec<u8>, FillOutcome), DrawError> {
    let expected = dims[0] as usize * dims[1] as usize * dims[2] as usize;
    if labels.len() != expected {
        return Err(DrawError::DimensionMismatch {
            expected,
            actual: labels.len(),
        });
    }
    let seed = seed_index(dims, seed)?;
    let value = labels[seed];
    if value == 0 {
        info!("dilate: seed is not part of a cluster");
        return Ok((labels.to_vec(), FillOutcome::Skipped(SkipReason::NotInCluster)));
    }
    let cluster = label_cluster(labels, dims, seed, connectivity);
    let mut out = labels.to_vec();
    let mut added = 0usize;
    for (idx, &m) in cluster.iter().enumerate() {
        if m != IN_CLUSTER {
            continue;
        }
        for_each_neighbor(dims, idx, connectivity, |n| {
            if labels[n] == 0 && out[n] == 0 {
                out[n] = value;
                added += 1;
            }
        });
    }
    Ok((out, FillOutcome::Filled(added)))
}

/// Grow mode for a click-to-segment interaction at a voxel of intensity
/// `seed_value`, given the display window of the background.
pub fn click_to_segment_mode(
    seed_value: f32,
    settings: &ClickToSegmentSettings,
    cal_min: f32,
    cal_max: f32,
) -> GrowMode {
    if settings.auto_intensity {
        if settings.percent != 0.0 {
            let base = if seed_value == 0.0 { 0.01 } else { seed_value };
            let a = base * (1.0 - settings.percent);
            let b = base * (1.0 + settings.percent);
            return GrowMode::Range {
                min: a.min(b),
                max: a.max(b),
            };
        }
        if seed_value > (cal_min + cal_max) * 0.5 {
            GrowMode::Brighter
        } else {
            GrowMode::Darker
        }
    } else if settings.intensity_max > settings.intensity_min {
        GrowMode::Range {
            min: settings.intensity_min,
            max: settings.intensity_max,
        }
    } else if settings.bright {
        GrowMode::Brighter
    } else {
        GrowMode::Darker
    }
}
