//! Multi-level Otsu thresholding over a 256-bin intensity histogram.

use tracing::{debug, warn};
use voxdraw_grid::VoxelGrid;

use crate::progress::report_progress;

const BINS: usize = 256;
const MAX_BIN: usize = BINS - 1;

/// Between-class variance contribution of every bin interval `[i, j]`,
/// stored row-major as `h[i * BINS + j]`.
struct IntervalTable {
    h: Vec<f64>,
}

impl IntervalTable {
    fn build(histogram: &[u64; BINS]) -> Self {
        let mut count_prefix = [0f64; BINS + 1];
        let mut sum_prefix = [0f64; BINS + 1];
        for bin in 0..BINS {
            count_prefix[bin + 1] = count_prefix[bin] + histogram[bin] as f64;
            sum_prefix[bin + 1] = sum_prefix[bin] + bin as f64 * histogram[bin] as f64;
        }
        let mut h = vec![0f64; BINS * BINS];
        for i in 0..BINS {
            for j in i..BINS {
                let p = count_prefix[j + 1] - count_prefix[i];
                if p > 0.0 {
                    let s = sum_prefix[j + 1] - sum_prefix[i];
                    h[i * BINS + j] = s * s / p;
                }
            }
        }
        Self { h }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.h[i * BINS + j]
    }
}

/// Best cut bins for `levels` classes. Each cut `t` splits bins `..=t` from `t+1..`.
fn best_cuts(table: &IntervalTable, levels: u32) -> Vec<usize> {
    let mut best = f64::NEG_INFINITY;
    let mut cuts = Vec::new();
    match levels {
        4 => {
            for l in 0..BINS - 3 {
                for m in l + 1..BINS - 2 {
                    let head = table.get(0, l) + table.get(l + 1, m);
                    for k in m + 1..BINS - 1 {
                        let v = head + table.get(m + 1, k) + table.get(k + 1, MAX_BIN);
                        if v > best {
                            best = v;
                            cuts = vec![l, m, k];
                        }
                    }
                }
                report_progress(l as f32 / (BINS - 3) as f32);
            }
        }
        3 => {
            for l in 0..BINS - 2 {
                for k in l + 1..BINS - 1 {
                    let v = table.get(0, l) + table.get(l + 1, k) + table.get(k + 1, MAX_BIN);
                    if v > best {
                        best = v;
                        cuts = vec![l, k];
                    }
                }
            }
        }
        _ => {
            for t in 0..BINS - 1 {
                let v = table.get(0, t) + table.get(t + 1, MAX_BIN);
                if v > best {
                    best = v;
                    cuts = vec![t];
                }
            }
        }
    }
    cuts
}

/// Otsu thresholds for raw samples, in raw units.
///
/// Calibrated intensities are clamped to `[cal_min, cal_max]` and binned by
/// rounding. Each cut bin maps back through `cal_min + bin * range / 256`, the
/// lower edge of that bin, so voxels landing in the cut bin itself fall in the
/// upper class. Returns `levels - 1` thresholds, or none when the window is
/// empty.
pub fn otsu_thresholds(
    values: &[f32],
    slope: f32,
    intercept: f32,
    cal_min: f32,
    cal_max: f32,
    levels: u32,
) -> Vec<f32> {
    let levels = levels.clamp(2, 4);
    if values.is_empty() {
        warn!("otsu: empty volume");
        return Vec::new();
    }
    if cal_min.is_nan() || cal_max.is_nan() || cal_max <= cal_min {
        warn!("otsu: intensity range [{cal_min}, {cal_max}] is empty");
        return Vec::new();
    }
    let range = cal_max - cal_min;
    let to_bin = MAX_BIN as f32 / range;
    let mut histogram = [0u64; BINS];
    for &raw in values {
        let value = raw * slope + intercept;
        if !value.is_finite() {
            continue;
        }
        let value = value.clamp(cal_min, cal_max);
        let bin = ((value - cal_min) * to_bin).round() as usize;
        histogram[bin.min(MAX_BIN)] += 1;
    }

    let table = IntervalTable::build(&histogram);
    let cuts = best_cuts(&table, levels);
    debug!("otsu: {} levels, cut bins {:?}", levels, cuts);
    let slope = if slope == 0.0 { 1.0 } else { slope };
    let bin_width = range / BINS as f32;
    cuts.into_iter()
        .map(|bin| {
            let calibrated = cal_min + bin as f32 * bin_width;
            (calibrated - intercept) / slope
        })
        .collect()
}

/// Otsu thresholds of the grid over its display window.
pub fn find_thresholds(grid: &VoxelGrid, levels: u32) -> Vec<f32> {
    otsu_thresholds(
        &grid.values,
        grid.scale_slope,
        grid.scale_intercept,
        grid.cal_min,
        grid.cal_max,
        levels,
    )
}

/// Labels unlabeled voxels with the number of thresholds their intensity
/// exceeds. Voxels below every threshold, and voxels that already carry a
/// label, are left alone. Returns the number of voxels written.
pub fn apply_thresholds(grid: &VoxelGrid, labels: &mut [u8], thresholds: &[f32]) -> usize {
    let mut cutoffs: Vec<f32> = thresholds
        .iter()
        .map(|&raw| grid.raw_to_calibrated(raw))
        .collect();
    cutoffs.sort_by(|a, b| a.total_cmp(b));
    let mut written = 0;
    for (idx, label) in labels.iter_mut().enumerate() {
        if *label != 0 {
            continue;
        }
        let value = grid.calibrated(idx);
        let class = cutoffs.iter().filter(|&&cut| value > cut).count();
        if class > 0 {
            *label = class as u8;
            written += 1;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal_samples() -> Vec<f32> {
        let mut values = Vec::new();
        for v in 0..256 {
            let x = v as f32;
            let a = (-(x - 60.0).powi(2) / (2.0 * 400.0)).exp();
            let b = (-(x - 190.0).powi(2) / (2.0 * 400.0)).exp();
            let count = (1000.0 * (a + b)).round() as usize;
            values.extend(std::iter::repeat(x).take(count));
        }
        values
    }

    #[test]
    fn bimodal_histogram_splits_at_valley() {
        let values = bimodal_samples();
        let len = values.len() as u32;
        let grid = VoxelGrid::new([len, 1, 1], values)
            .unwrap()
            .with_display_range(0.0, 255.0);
        let thresholds = find_thresholds(&grid, 2);
        assert_eq!(thresholds.len(), 1);
        assert!(
            (122.0..=126.0).contains(&thresholds[0]),
            "threshold {}",
            thresholds[0]
        );
    }

    #[test]
    fn three_classes_give_ordered_cuts() {
        let mut values = Vec::new();
        for center in [30.0f32, 128.0, 220.0] {
            for offset in -5..=5 {
                values.extend(std::iter::repeat(center + offset as f32).take(50));
            }
        }
        let thresholds = otsu_thresholds(&values, 1.0, 0.0, 0.0, 255.0, 3);
        assert_eq!(thresholds.len(), 2);
        // empty bins tie, so the first cut after each cluster wins
        assert!((thresholds[0] - 35.0 * 255.0 / 256.0).abs() < 1.0e-3);
        assert!((thresholds[1] - 133.0 * 255.0 / 256.0).abs() < 1.0e-3);
    }

    #[test]
    fn thresholds_are_reported_in_raw_units() {
        let raw: Vec<f32> = bimodal_samples().iter().map(|v| v / 2.0).collect();
        let thresholds = otsu_thresholds(&raw, 2.0, 0.0, 0.0, 255.0, 2);
        assert!((61.0..=63.0).contains(&thresholds[0]));
    }

    #[test]
    fn threshold_is_lower_edge_of_cut_bin() {
        let mut values = vec![10.0f32; 100];
        values.extend(std::iter::repeat(11.0).take(100));
        values.extend(std::iter::repeat(250.0).take(100));
        let thresholds = otsu_thresholds(&values, 1.0, 0.0, 0.0, 255.0, 2);
        assert_eq!(thresholds.len(), 1);
        assert!((thresholds[0] - 11.0 * 255.0 / 256.0).abs() < 1.0e-4);

        let grid = VoxelGrid::new([3, 1, 1], vec![10.0, 11.0, 250.0])
            .unwrap()
            .with_display_range(0.0, 255.0);
        let mut labels = vec![0u8; 3];
        apply_thresholds(&grid, &mut labels, &thresholds);
        assert_eq!(labels, vec![0, 1, 1]);
    }

    #[test]
    fn empty_window_yields_no_thresholds() {
        let grid = VoxelGrid::filled([4, 4, 4], 7.0).unwrap();
        assert!(find_thresholds(&grid, 2).is_empty());
        assert!(otsu_thresholds(&[], 1.0, 0.0, 0.0, 1.0, 2).is_empty());
    }

    #[test]
    fn apply_keeps_existing_labels() {
        let grid = VoxelGrid::new([4, 1, 1], vec![0.0, 50.0, 100.0, 200.0]).unwrap();
        let mut labels = vec![0, 0, 9, 0];
        let written = apply_thresholds(&grid, &mut labels, &[25.0, 150.0]);
        assert_eq!(labels, vec![0, 1, 9, 2]);
        assert_eq!(written, 2);
    }
}
