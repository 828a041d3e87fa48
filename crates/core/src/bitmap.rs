use voxdraw_grid::VoxelGrid;

use crate::error::DrawError;
use crate::parallel;

/// Byte-per-voxel label volume. 0 is unlabeled, 1..=255 are label classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBitmap {
    dims: [u32; 3],
    data: Vec<u8>,
}

impl LabelBitmap {
    pub fn new(dims: [u32; 3]) -> Self {
        let count = dims[0] as usize * dims[1] as usize * dims[2] as usize;
        Self {
            dims,
            data: vec![0; count],
        }
    }

    pub fn for_grid(grid: &VoxelGrid) -> Self {
        Self::new(grid.dims)
    }

    pub fn from_vec(dims: [u32; 3], data: Vec<u8>) -> Result<Self, DrawError> {
        let expected = dims[0] as usize * dims[1] as usize * dims[2] as usize;
        if data.len() != expected {
            return Err(DrawError::DimensionMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let nx = self.dims[0] as usize;
        let ny = self.dims[1] as usize;
        z as usize * nx * ny + y as usize * nx + x as usize
    }

    pub fn coords(&self, index: usize) -> [u32; 3] {
        let nx = self.dims[0].max(1) as usize;
        let nxy = nx * self.dims[1].max(1) as usize;
        let z = index / nxy;
        let y = (index - z * nxy) / nx;
        [(index % nx) as u32, y as u32, z as u32]
    }

    pub fn contains(&self, point: [i32; 3]) -> bool {
        point
            .iter()
            .zip(self.dims.iter())
            .all(|(&p, &d)| p >= 0 && (p as i64) < d as i64)
    }

    /// Clamps a possibly out-of-range point into the grid and returns its index.
    pub fn clamped_index(&self, point: [i32; 3]) -> usize {
        let clamp = |value: i32, dim: u32| value.clamp(0, dim.saturating_sub(1) as i32) as u32;
        self.index(
            clamp(point[0], self.dims[0]),
            clamp(point[1], self.dims[1]),
            clamp(point[2], self.dims[2]),
        )
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> u8 {
        self.data[self.index(x, y, z)]
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, label: u8) {
        let idx = self.index(x, y, z);
        self.data[idx] = label;
    }

    /// Full-buffer copy from a bitmap of the same shape.
    pub fn copy_from(&mut self, other: &LabelBitmap) -> Result<(), DrawError> {
        if other.data.len() != self.data.len() {
            return Err(DrawError::DimensionMismatch {
                expected: self.data.len(),
                actual: other.data.len(),
            });
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    pub(crate) fn replace_data(&mut self, data: Vec<u8>) -> Result<(), DrawError> {
        if data.len() != self.data.len() {
            return Err(DrawError::DimensionMismatch {
                expected: self.data.len(),
                actual: data.len(),
            });
        }
        self.data = data;
        Ok(())
    }

    pub fn count_nonzero(&self) -> usize {
        parallel::count_where(&self.data, |&value| value != 0)
    }

    pub fn count_label(&self, label: u8) -> usize {
        parallel::count_where(&self.data, |&value| value == label)
    }

    pub fn histogram(&self) -> [usize; 256] {
        let mut counts = [0usize; 256];
        for &value in &self.data {
            counts[value as usize] += 1;
        }
        counts
    }
}
