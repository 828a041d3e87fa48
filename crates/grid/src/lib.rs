use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    EmptyDimensions,
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::EmptyDimensions => write!(f, "grid dimensions must all be non-zero"),
            GridError::LengthMismatch { expected, actual } => write!(
                f,
                "grid expects {expected} samples but {actual} were supplied"
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// Slice orientation of a 2D drawing plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceAxis {
    Axial,
    Coronal,
    Sagittal,
}

impl SliceAxis {
    /// Axis that stays constant within the plane (z, y, x).
    pub fn normal_axis(self) -> usize {
        match self {
            SliceAxis::Axial => 2,
            SliceAxis::Coronal => 1,
            SliceAxis::Sagittal => 0,
        }
    }

    /// Horizontal and vertical axes of the plane.
    pub fn in_plane_axes(self) -> (usize, usize) {
        match self {
            SliceAxis::Axial => (0, 1),
            SliceAxis::Coronal => (0, 2),
            SliceAxis::Sagittal => (1, 2),
        }
    }
}

/// Read-only background scan. Samples are stored x fastest, then y, then z.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    pub dims: [u32; 3],
    pub values: Vec<f32>,
    pub scale_slope: f32,
    pub scale_intercept: f32,
    pub transform: Mat4,
    pub global_min: f32,
    pub global_max: f32,
    pub cal_min: f32,
    pub cal_max: f32,
}

impl VoxelGrid {
    pub fn new(dims: [u32; 3], values: Vec<f32>) -> Result<Self, GridError> {
        if dims.iter().any(|&d| d == 0) {
            return Err(GridError::EmptyDimensions);
        }
        let expected = dims[0] as usize * dims[1] as usize * dims[2] as usize;
        if values.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: values.len(),
            });
        }
        let mut grid = Self {
            dims,
            values,
            scale_slope: 1.0,
            scale_intercept: 0.0,
            transform: Mat4::IDENTITY,
            global_min: 0.0,
            global_max: 0.0,
            cal_min: 0.0,
            cal_max: 0.0,
        };
        grid.refresh_range();
        Ok(grid)
    }

    pub fn filled(dims: [u32; 3], value: f32) -> Result<Self, GridError> {
        let count = dims[0] as usize * dims[1] as usize * dims[2] as usize;
        Self::new(dims, vec![value; count])
    }

    pub fn with_scale(mut self, slope: f32, intercept: f32) -> Self {
        self.scale_slope = if slope == 0.0 || !slope.is_finite() {
            1.0
        } else {
            slope
        };
        self.scale_intercept = if intercept.is_finite() { intercept } else { 0.0 };
        self.refresh_range();
        self
    }

    pub fn with_voxel_size(mut self, size: [f32; 3]) -> Self {
        self.transform = Mat4::from_scale(Vec3::from(size));
        self
    }

    /// Overrides the display window used for histogram and intensity heuristics.
    pub fn with_display_range(mut self, cal_min: f32, cal_max: f32) -> Self {
        self.cal_min = cal_min;
        self.cal_max = cal_max;
        self
    }

    /// Recomputes the calibrated global range and resets the display window to it.
    pub fn refresh_range(&mut self) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &raw in &self.values {
            let value = raw * self.scale_slope + self.scale_intercept;
            if !value.is_finite() {
                continue;
            }
            min = min.min(value);
            max = max.max(value);
        }
        if min > max {
            min = 0.0;
            max = 0.0;
        }
        self.global_min = min;
        self.global_max = max;
        self.cal_min = min;
        self.cal_max = max;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn voxel_count(&self) -> usize {
        self.dims[0] as usize * self.dims[1] as usize * self.dims[2] as usize
    }

    pub fn value_index(&self, x: u32, y: u32, z: u32) -> usize {
        let nx = self.dims[0] as usize;
        let ny = self.dims[1] as usize;
        z as usize * nx * ny + y as usize * nx + x as usize
    }

    pub fn coords(&self, index: usize) -> [u32; 3] {
        let nx = self.dims[0].max(1) as usize;
        let nxy = nx * self.dims[1].max(1) as usize;
        let z = index / nxy;
        let y = (index - z * nxy) / nx;
        let x = index % nx;
        [x as u32, y as u32, z as u32]
    }


    pub fn raw(&self, index: usize) -> f32 {
        self.values[index]
    }

    pub fn calibrated(&self, index: usize) -> f32 {
        self.values[index] * self.scale_slope + self.scale_intercept
    }

    pub fn raw_to_calibrated(&self, raw: f32) -> f32 {
        raw * self.scale_slope + self.scale_intercept
    }

    pub fn calibrated_to_raw(&self, calibrated: f32) -> f32 {
        (calibrated - self.scale_intercept) / self.scale_slope
    }

    pub fn voxel_to_mm(&self, voxel: [u32; 3]) -> Vec3 {
        self.transform.transform_point3(Vec3::new(
            voxel[0] as f32,
            voxel[1] as f32,
            voxel[2] as f32,
        ))
    }

    /// Volume of a single voxel in cubic millimetres.
    pub fn voxel_volume_mm3(&self) -> f32 {
        let det = self.transform.determinant().abs();
        if det.is_finite() && det > 0.0 {
            det
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sample_count_mismatch() {
        let result = VoxelGrid::new([2, 2, 2], vec![0.0; 7]);
        assert_eq!(
            result.unwrap_err(),
            GridError::LengthMismatch {
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn index_and_coords_agree() {
        let grid = VoxelGrid::filled([4, 3, 2], 0.0).unwrap();
        let idx = grid.value_index(3, 2, 1);
        assert_eq!(idx, 3 + 2 * 4 + 12);
        assert_eq!(grid.coords(idx), [3, 2, 1]);
    }

    #[test]
    fn calibration_applies_slope_and_intercept() {
        let grid = VoxelGrid::new([2, 1, 1], vec![1.0, 3.0])
            .unwrap()
            .with_scale(2.0, -1.0);
        assert!((grid.calibrated(1) - 5.0).abs() < 1.0e-6);
        assert!((grid.global_min - 1.0).abs() < 1.0e-6);
        assert!((grid.global_max - 5.0).abs() < 1.0e-6);
        assert!((grid.calibrated_to_raw(5.0) - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn voxel_size_scales_mm_and_volume() {
        let grid = VoxelGrid::filled([2, 2, 2], 0.0)
            .unwrap()
            .with_voxel_size([2.0, 1.0, 0.5]);
        let mm = grid.voxel_to_mm([1, 1, 1]);
        assert!((mm.x - 2.0).abs() < 1.0e-6);
        assert!((mm.z - 0.5).abs() < 1.0e-6);
        assert!((grid.voxel_volume_mm3() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn slice_axes_are_consistent() {
        for axis in [SliceAxis::Axial, SliceAxis::Coronal, SliceAxis::Sagittal] {
            let (h, v) = axis.in_plane_axes();
            assert_eq!(h + v + axis.normal_axis(), 3);
        }
    }
}
