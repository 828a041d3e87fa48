use serde::{Deserialize, Serialize};

use crate::error::DrawError;

/// Face offsets first, then edges, then corners, so each connectivity is a prefix.
const NEIGHBOR_OFFSETS: [[i32; 3]; 26] = [
    [0, 0, -1],
    [0, 0, 1],
    [0, -1, 0],
    [0, 1, 0],
    [-1, 0, 0],
    [1, 0, 0],
    [-1, -1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [1, 1, 0],
    [0, -1, -1],
    [0, 1, -1],
    [-1, 0, -1],
    [1, 0, -1],
    [0, -1, 1],
    [0, 1, 1],
    [-1, 0, 1],
    [1, 0, 1],
    [-1, -1, -1],
    [1, -1, -1],
    [-1, 1, -1],
    [1, 1, -1],
    [-1, -1, 1],
    [1, -1, 1],
    [-1, 1, 1],
    [1, 1, 1],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Connectivity {
    /// Face neighbors.
    #[default]
    Six,
    /// Faces and edges.
    Eighteen,
    /// Faces, edges and corners.
    TwentySix,
}

impl Connectivity {
    pub fn from_neighbors(count: u32) -> Option<Self> {
        match count {
            6 => Some(Connectivity::Six),
            18 => Some(Connectivity::Eighteen),
            26 => Some(Connectivity::TwentySix),
            _ => None,
        }
    }

    pub fn neighbors(self) -> u32 {
        match self {
            Connectivity::Six => 6,
            Connectivity::Eighteen => 18,
            Connectivity::TwentySix => 26,
        }
    }

    pub fn offsets(self) -> &'static [[i32; 3]] {
        &NEIGHBOR_OFFSETS[..self.neighbors() as usize]
    }
}

impl TryFrom<u32> for Connectivity {
    type Error = DrawError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Connectivity::from_neighbors(value).ok_or(DrawError::InvalidConnectivity(value))
    }
}

impl From<Connectivity> for u32 {
    fn from(value: Connectivity) -> Self {
        value.neighbors()
    }
}

/// Neighbor visitor for a flat x-fastest grid; skips offsets that leave the grid.
pub(crate) fn for_each_neighbor<F>(dims: [u32; 3], index: usize, connectivity: Connectivity, mut f: F)
where
    F: FnMut(usize),
{
    let nx = dims[0] as usize;
    let nxy = nx * dims[1] as usize;
    let z = index / nxy;
    let y = (index - z * nxy) / nx;
    let x = index % nx;
    for offset in connectivity.offsets() {
        let xx = x as i64 + offset[0] as i64;
        let yy = y as i64 + offset[1] as i64;
        let zz = z as i64 + offset[2] as i64;
        if xx < 0 || yy < 0 || zz < 0 {
            continue;
        }
        if xx >= dims[0] as i64 || yy >= dims[1] as i64 || zz >= dims[2] as i64 {
            continue;
        }
        f(xx as usize + yy as usize * nx + zz as usize * nxy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_nested_prefixes() {
        assert_eq!(Connectivity::Six.offsets().len(), 6);
        assert_eq!(Connectivity::Eighteen.offsets().len(), 18);
        assert_eq!(Connectivity::TwentySix.offsets().len(), 26);
        for offset in Connectivity::Six.offsets() {
            let manhattan: i32 = offset.iter().map(|v| v.abs()).sum();
            assert_eq!(manhattan, 1);
        }
        for offset in &Connectivity::Eighteen.offsets()[6..] {
            let manhattan: i32 = offset.iter().map(|v| v.abs()).sum();
            assert_eq!(manhattan, 2);
        }
    }

    #[test]
    fn rejects_unknown_neighbor_counts() {
        assert_eq!(
            Connectivity::try_from(8),
            Err(DrawError::InvalidConnectivity(8))
        );
        assert_eq!(Connectivity::try_from(18), Ok(Connectivity::Eighteen));
    }

    #[test]
    fn corner_voxel_has_clipped_neighborhood() {
        let mut seen = Vec::new();
        for_each_neighbor([3, 3, 3], 0, Connectivity::TwentySix, |idx| seen.push(idx));
        assert_eq!(seen.len(), 7);
        let mut seen = Vec::new();
        for_each_neighbor([3, 3, 3], 13, Connectivity::TwentySix, |idx| seen.push(idx));
        assert_eq!(seen.len(), 26);
    }
}
