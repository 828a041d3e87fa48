use std::fmt;

use crate::rle::RleError;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawError {
    NoDrawingOpen,
    DimensionMismatch { expected: usize, actual: usize },
    SeedOutOfBounds { seed: [i32; 3], dims: [u32; 3] },
    InvalidConnectivity(u32),
    NoPreview,
    InvalidSliceRange { low: u32, high: u32, slices: u32 },
    Rle(RleError),
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawError::NoDrawingOpen => write!(f, "no drawing open"),
            DrawError::DimensionMismatch { expected, actual } => write!(
                f,
                "drawing has {actual} voxels but the background has {expected}"
            ),
            DrawError::SeedOutOfBounds { seed, dims } => write!(
                f,
                "seed {:?} lies outside the {}x{}x{} grid",
                seed, dims[0], dims[1], dims[2]
            ),
            DrawError::InvalidConnectivity(value) => {
                write!(f, "connectivity must be 6, 18 or 26 (got {value})")
            }
            DrawError::NoPreview => write!(f, "no segmentation preview in progress"),
            DrawError::InvalidSliceRange { low, high, slices } => write!(
                f,
                "slice range {low}..={high} must be increasing and within 0..{slices}"
            ),
            DrawError::Rle(err) => write!(f, "undo history is corrupt: {err}"),
        }
    }
}

impl std::error::Error for DrawError {}

impl From<RleError> for DrawError {
    fn from(value: RleError) -> Self {
        DrawError::Rle(value)
    }
}
