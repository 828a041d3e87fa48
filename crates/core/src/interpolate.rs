use tracing::debug;
use voxdraw_grid::{SliceAxis, VoxelGrid};

use crate::error::DrawError;
use crate::parallel;
use crate::progress::report_progress;
use crate::settings::InterpolationSettings;

/// Walks a volume slice by slice along the normal of one drawing plane.
#[derive(Debug, Clone, Copy)]
struct SliceLayout {
    dims: [u32; 3],
    h: usize,
    v: usize,
    normal: usize,
}

impl SliceLayout {
    fn new(dims: [u32; 3], axis: SliceAxis) -> Self {
        let (h, v) = axis.in_plane_axes();
        Self {
            dims,
            h,
            v,
            normal: axis.normal_axis(),
        }
    }

    fn width(&self) -> usize {
        self.dims[self.h] as usize
    }

    fn height(&self) -> usize {
        self.dims[self.v] as usize
    }

    fn slice_count(&self) -> u32 {
        self.dims[self.normal]
    }

    fn pixels(&self) -> usize {
        self.width() * self.height()
    }

    /// Volume index of in-plane `pixel` (horizontal fastest) on `slice`.
    fn voxel_index(&self, pixel: usize, slice: u32) -> usize {
        let width = self.width();
        let mut p = [0usize; 3];
        p[self.h] = pixel % width;
        p[self.v] = pixel / width;
        p[self.normal] = slice as usize;
        let nx = self.dims[0] as usize;
        let ny = self.dims[1] as usize;
        p[2] * nx * ny + p[1] * nx + p[0]
    }

    fn slice_of(&self, index: usize) -> u32 {
        let nx = self.dims[0] as usize;
        let ny = self.dims[1] as usize;
        let coords = [index % nx, (index / nx) % ny, index / (nx * ny)];
        coords[self.normal] as u32
    }
}

/// First and last slice holding each label, in label order.
fn label_slice_ranges(labels: &[u8], layout: &SliceLayout) -> Vec<(u8, u32, u32)> {
    let mut ranges: [Option<(u32, u32)>; 256] = [None; 256];
    for (idx, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        let slice = layout.slice_of(idx);
        let range = &mut ranges[label as usize];
        *range = Some(match *range {
            Some((low, high)) => (low.min(slice), high.max(slice)),
            None => (slice, slice),
        });
    }
    ranges
        .iter()
        .enumerate()
        .filter_map(|(label, range)| range.map(|(low, high)| (label as u8, low, high)))
        .collect()
}

fn label_mask(labels: &[u8], layout: &SliceLayout, slice: u32, label: u8) -> Vec<f32> {
    (0..layout.pixels())
        .map(|pixel| {
            if labels[layout.voxel_index(pixel, slice)] == label {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Calibrated intensities of one slice scaled into 0..1 by the global range.
fn intensity_slice(grid: &VoxelGrid, layout: &SliceLayout, slice: u32) -> Vec<f32> {
    let span = grid.global_max - grid.global_min;
    (0..layout.pixels())
        .map(|pixel| {
            let value = grid.calibrated(layout.voxel_index(pixel, slice));
            if span > 0.0 && value.is_finite() {
                (value - grid.global_min) / span
            } else {
                0.0
            }
        })
        .collect()
}

/// Separable [1, 2, 1] / 4 blur. Border rows and columns keep their values.
fn smooth_slice(slice: &mut [f32], width: usize, height: usize) {
    if width < 3 || height < 3 {
        return;
    }
    let mut horizontal = slice.to_vec();
    for y in 0..height {
        for x in 1..width - 1 {
            let idx = y * width + x;
            horizontal[idx] = (slice[idx - 1] + 2.0 * slice[idx] + slice[idx + 1]) * 0.25;
        }
    }
    slice.copy_from_slice(&horizontal);
    for y in 1..height - 1 {
        for x in 0..width {
            let idx = y * width + x;
            slice[idx] =
                (horizontal[idx - width] + 2.0 * horizontal[idx] + horizontal[idx + width]) * 0.25;
        }
    }
}

/// Share of the blend owed to the lower slice, from how closely each boundary
/// intensity matches the target.
fn intensity_weight(low: f32, high: f32, target: f32, sigma: f32) -> f32 {
    let denom = 2.0 * sigma * sigma;
    let weight_low = (-(target - low).powi(2) / denom).exp();
    let weight_high = (-(target - high).powi(2) / denom).exp();
    let total = weight_low + weight_high;
    if total < 1.0e-6 {
        0.5
    } else {
        weight_low / total
    }
}

/// Fills the slices between the outermost painted slices of every label along
/// the normal of `axis`. Each label blends its two boundary masks on its own;
/// `bounds` narrows every label's range. Returns the number of voxels changed.
pub fn interpolate_slices(
    grid: &VoxelGrid,
    labels: &mut [u8],
    axis: SliceAxis,
    bounds: Option<(u32, u32)>,
    settings: &InterpolationSettings,
) -> Result<usize, DrawError> {
    let expected = grid.voxel_count();
    if labels.len() != expected {
        return Err(DrawError::DimensionMismatch {
            expected,
            actual: labels.len(),
        });
    }
    let layout = SliceLayout::new(grid.dims, axis);
    let slices = layout.slice_count();
    if let Some((low, high)) = bounds {
        if low >= high || high >= slices {
            return Err(DrawError::InvalidSliceRange { low, high, slices });
        }
    }

    let ranges = label_slice_ranges(labels, &layout);
    let (width, height) = (layout.width(), layout.height());
    let mut written = 0;
    for (done, &(label, first, last)) in ranges.iter().enumerate() {
        let (low, high) = match bounds {
            Some((min, max)) => (first.max(min), last.min(max)),
            None => (first, last),
        };
        if low >= high || high - low < 2 {
            debug!("label {} spans slices {}..={}, nothing to fill", label, low, high);
            continue;
        }

        let mut mask_low = label_mask(labels, &layout, low, label);
        let mut mask_high = label_mask(labels, &layout, high, label);
        if settings.smooth_slices {
            smooth_slice(&mut mask_low, width, height);
            smooth_slice(&mut mask_high, width, height);
        }
        let guide = settings.intensity_guided.then(|| {
            (
                intensity_slice(grid, &layout, low),
                intensity_slice(grid, &layout, high),
            )
        });

        for slice in low + 1..high {
            let frac_high = (slice - low) as f32 / (high - low) as f32;
            let target = guide
                .as_ref()
                .map(|_| intensity_slice(grid, &layout, slice));
            let mut blended = vec![0.0f32; layout.pixels()];
            parallel::for_each_indexed_mut(&mut blended, |pixel, out| {
                let (from_low, from_high) = (mask_low[pixel], mask_high[pixel]);
                let mut weight_low = 1.0 - frac_high;
                if let (Some((intensity_low, intensity_high)), Some(target)) =
                    (guide.as_ref(), target.as_ref())
                {
                    if from_low > 0.0 || from_high > 0.0 {
                        let matched = intensity_weight(
                            intensity_low[pixel],
                            intensity_high[pixel],
                            target[pixel],
                            settings.intensity_sigma,
                        );
                        weight_low = settings.intensity_weight * matched
                            + (1.0 - settings.intensity_weight) * weight_low;
                    }
                }
                *out = from_low * weight_low + from_high * (1.0 - weight_low);
            });
            for (pixel, &value) in blended.iter().enumerate() {
                if value < settings.binary_threshold {
                    continue;
                }
                let idx = layout.voxel_index(pixel, slice);
                if labels[idx] != label {
                    labels[idx] = label;
                    written += 1;
                }
            }
        }
        report_progress((done + 1) as f32 / ranges.len() as f32);
    }
    Ok(written)
}
