//! Grow-cut: competitive label propagation as a cellular automaton.
//!
//! Each voxel holds a label and a strength in `[0, 1]`. Every generation a
//! neighbor attacks with its strength scaled by the intensity similarity of the
//! two voxels, and takes the voxel over when the attack beats the defender.
//! Generations are double-buffered, so the result does not depend on visiting
//! order or thread count.

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use voxdraw_grid::VoxelGrid;

use crate::connectivity::{for_each_neighbor, Connectivity};
use crate::error::DrawError;
use crate::parallel;
use crate::progress::report_progress;
use crate::settings::GrowCutSettings;

#[derive(Debug, Clone)]
pub struct GrowCutOptions {
    pub iterations: u32,
    pub connectivity: Connectivity,
    pub smooth_final: bool,
    /// Checked between generations; setting it stops the run early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for GrowCutOptions {
    fn default() -> Self {
        Self::from(&GrowCutSettings::default())
    }
}

impl From<&GrowCutSettings> for GrowCutOptions {
    fn from(settings: &GrowCutSettings) -> Self {
        Self {
            iterations: settings.iterations,
            connectivity: settings.connectivity,
            smooth_final: settings.smooth_final,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowCutReport {
    pub iterations_run: u32,
    /// A generation finished without changing any voxel.
    pub converged: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    label: u8,
    strength: f32,
}

impl Cell {
    const EMPTY: Cell = Cell {
        label: 0,
        strength: 0.0,
    };
}

/// Runs grow-cut from the nonzero voxels of `seeds` and returns the final
/// label generation.
pub fn grow_cut(
    grid: &VoxelGrid,
    seeds: &[u8],
    options: &GrowCutOptions,
) -> Result<(Vec<u8>, GrowCutReport), DrawError> {
    let count = grid.voxel_count();
    if seeds.len() != count {
        return Err(DrawError::DimensionMismatch {
            expected: count,
            actual: seeds.len(),
        });
    }
    let start = Instant::now();
    let dims = grid.dims;
    let intensities: Vec<f32> = (0..count).map(|idx| grid.calibrated(idx)).collect();
    let range = grid.global_max - grid.global_min;
    let inv_range = if range > 0.0 { 1.0 / range } else { 0.0 };
    let connectivity = options.connectivity;

    let mut current: Vec<Cell> = seeds
        .iter()
        .map(|&label| {
            if label == 0 {
                Cell::EMPTY
            } else {
                Cell {
                    label,
                    strength: 1.0,
                }
            }
        })
        .collect();
    let mut next = current.clone();
    let mut report = GrowCutReport {
        iterations_run: 0,
        converged: false,
        cancelled: false,
    };

    for generation in 0..options.iterations {
        if let Some(cancel) = options.cancel.as_ref() {
            if cancel.load(Ordering::Relaxed) {
                info!("grow-cut cancelled after {} generations", generation);
                report.cancelled = true;
                break;
            }
        }
        let changed = AtomicUsize::new(0);
        {
            let previous = &current;
            let intensities = &intensities;
            let changed = &changed;
            parallel::for_each_indexed_mut(&mut next, |idx, cell| {
                let mut best = previous[idx];
                let own = intensities[idx];
                for_each_neighbor(dims, idx, connectivity, |n| {
                    let attacker = previous[n];
                    if attacker.label == 0 {
                        return;
                    }
                    let similarity = 1.0 - ((own - intensities[n]).abs() * inv_range).min(1.0);
                    let attack = similarity * attacker.strength;
                    if attack > best.strength {
                        best = Cell {
                            label: attacker.label,
                            strength: attack,
                        };
                    }
                });
                if best != previous[idx] {
                    changed.fetch_add(1, Ordering::Relaxed);
                }
                *cell = best;
            });
        }
        std::mem::swap(&mut current, &mut next);
        report.iterations_run = generation + 1;
        report_progress(report.iterations_run as f32 / options.iterations as f32);
        let changed = changed.into_inner();
        debug!("grow-cut generation {}: {} voxels changed", generation, changed);
        if changed == 0 {
            report.converged = true;
            break;
        }
    }

    let mut labels: Vec<u8> = current.iter().map(|cell| cell.label).collect();
    if options.smooth_final {
        labels = majority_smooth(&labels, dims);
    }
    info!(
        "grow-cut: {} generations in {:.1}ms (converged: {})",
        report.iterations_run,
        start.elapsed().as_secs_f32() * 1000.0,
        report.converged
    );
    Ok((labels, report))
}

/// Most frequent label in each 3x3x3 neighborhood, ties to the lowest label.
fn majority_smooth(labels: &[u8], dims: [u32; 3]) -> Vec<u8> {
    let mut out = labels.to_vec();
    parallel::for_each_indexed_mut(&mut out, |idx, value| {
        let mut tally: [(u8, u8); 27] = [(0, 0); 27];
        let mut distinct = 0usize;
        let mut add = |label: u8| {
            match tally[..distinct].iter_mut().find(|(l, _)| *l == label) {
                Some(entry) => entry.1 += 1,
                None => {
                    tally[distinct] = (label, 1);
                    distinct += 1;
                }
            }
        };
        add(labels[idx]);
        for_each_neighbor(dims, idx, Connectivity::TwentySix, |n| add(labels[n]));
        let mut winner = (labels[idx], 0u8);
        for &(label, count) in &tally[..distinct] {
            if count > winner.1 || (count == winner.1 && label < winner.0) {
                winner = (label, count);
            }
        }
        *value = winner.0;
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_grid() -> VoxelGrid {
        let values = vec![0.0, 0.0, 0.0, 0.0, 0.0, 100.0, 100.0, 100.0, 100.0, 100.0];
        VoxelGrid::new([10, 1, 1], values).unwrap()
    }

    fn seeds() -> Vec<u8> {
        let mut seeds = vec![0u8; 10];
        seeds[0] = 1;
        seeds[9] = 2;
        seeds
    }

    #[test]
    fn labels_split_at_intensity_edge() {
        let (labels, report) = grow_cut(&step_grid(), &seeds(), &GrowCutOptions::default()).unwrap();
        assert_eq!(labels, vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2]);
        assert!(report.converged);
        assert!(report.iterations_run < 256);
        assert!(!report.cancelled);
    }

    #[test]
    fn results_are_repeatable() {
        let mut values = Vec::new();
        for i in 0..(16 * 16 * 4) {
            values.push(((i * 37) % 101) as f32);
        }
        let grid = VoxelGrid::new([16, 16, 4], values).unwrap();
        let mut seeds = vec![0u8; grid.voxel_count()];
        seeds[0] = 1;
        seeds[grid.voxel_count() - 1] = 2;
        seeds[500] = 3;
        let options = GrowCutOptions {
            iterations: 12,
            ..Default::default()
        };
        let first = grow_cut(&grid, &seeds, &options).unwrap();
        let second = grow_cut(&grid, &seeds, &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cancel_flag_stops_before_first_generation() {
        let cancel = Arc::new(AtomicBool::new(true));
        let options = GrowCutOptions {
            cancel: Some(cancel),
            smooth_final: false,
            ..Default::default()
        };
        let (labels, report) = grow_cut(&step_grid(), &seeds(), &options).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.iterations_run, 0);
        assert_eq!(labels, seeds());
    }

    #[test]
    fn iteration_cap_limits_spread() {
        let options = GrowCutOptions {
            iterations: 2,
            smooth_final: false,
            ..Default::default()
        };
        let (labels, report) = grow_cut(&step_grid(), &seeds(), &options).unwrap();
        assert_eq!(report.iterations_run, 2);
        assert!(!report.converged);
        assert_eq!(labels, vec![1, 1, 1, 0, 0, 0, 0, 2, 2, 2]);
    }

    #[test]
    fn majority_smoothing_removes_isolated_voxels() {
        let mut labels = vec![1u8; 27];
        labels[13] = 2;
        let smoothed = majority_smooth(&labels, [3, 3, 3]);
        assert!(smoothed.iter().all(|&l| l == 1));
    }

    #[test]
    fn seed_length_must_match_grid() {
        let err = grow_cut(&step_grid(), &[0u8; 3], &GrowCutOptions::default()).unwrap_err();
        assert!(matches!(err, DrawError::DimensionMismatch { .. }));
    }
}
