//! Connected-component labeling with a provisional raster pass and a
//! translation table of label equivalences.

use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use tracing::{info, warn};

use crate::connectivity::Connectivity;
use crate::error::DrawError;
use crate::progress::report_progress;

const TABLE_GROWTH: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelingOptions {
    pub connectivity: Connectivity,
    /// Treat every nonzero value as the same class.
    pub binarize: bool,
    /// Keep only the largest component of each input value, written back as
    /// that value.
    pub largest_per_value: bool,
}

impl Default for LabelingOptions {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::TwentySix,
            binarize: false,
            largest_per_value: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Number of components, or the largest surviving value when filtering
    /// to the largest component per value.
    pub count: u32,
    pub labels: Vec<u32>,
}

impl Components {
    fn empty(len: usize) -> Self {
        Self {
            count: 0,
            labels: vec![0; len],
        }
    }
}

/// Provisional id equivalences. Entry `id - 1` points at an id no larger
/// than `id`; roots point at themselves.
struct TranslationTable {
    parents: Vec<u32>,
}

impl TranslationTable {
    fn new() -> Self {
        Self {
            parents: Vec::with_capacity(TABLE_GROWTH),
        }
    }

    fn len(&self) -> usize {
        self.parents.len()
    }

    fn fresh(&mut self) -> u32 {
        if self.parents.len() == self.parents.capacity() {
            self.parents.reserve(TABLE_GROWTH);
        }
        let id = self.parents.len() as u32 + 1;
        self.parents.push(id);
        id
    }

    fn root(&self, mut id: u32) -> u32 {
        while self.parents[id as usize - 1] != id {
            id = self.parents[id as usize - 1];
        }
        id
    }

    /// Points the roots of all `ids` at the smallest of them.
    fn merge(&mut self, ids: &[u32]) {
        let mut roots = [0u32; 27];
        let mut lowest = u32::MAX;
        for (slot, &id) in roots.iter_mut().zip(ids) {
            *slot = self.root(id);
            lowest = lowest.min(*slot);
        }
        for &root in &roots[..ids.len()] {
            self.parents[root as usize - 1] = lowest;
        }
    }

    fn flatten(&mut self) {
        for i in 0..self.parents.len() {
            let parent = self.parents[i];
            // lower entries are already flat, and every parent is lower
            self.parents[i] = if parent as usize == i + 1 {
                parent
            } else {
                self.parents[parent as usize - 1]
            };
        }
    }

    fn resolve(&self, id: u32) -> u32 {
        self.parents[id as usize - 1]
    }
}

struct Lattice {
    nx: usize,
    ny: usize,
    nz: usize,
}

impl Lattice {
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.nx * self.ny + y * self.nx + x
    }
}

fn provisional_labels(
    bw: &[u32],
    lattice: &Lattice,
    connectivity: Connectivity,
) -> (Vec<u32>, TranslationTable) {
    let neighbors = connectivity.neighbors();
    let mut provisional = vec![0u32; bw.len()];
    let mut table = TranslationTable::new();
    let mut found = [0u32; 27];
    let (nx, ny) = (lattice.nx, lattice.ny);

    for z in 0..lattice.nz {
        for y in 0..ny {
            for x in 0..nx {
                let here = lattice.index(x, y, z);
                let value = bw[here];
                if value == 0 {
                    continue;
                }
                let mut count = 0usize;
                let mut check = |i: usize| {
                    if bw[i] == value {
                        found[count] = provisional[i];
                        count += 1;
                    }
                };

                if z > 0 {
                    let below = z - 1;
                    check(lattice.index(x, y, below));
                    if neighbors >= 18 {
                        if x > 0 {
                            check(lattice.index(x - 1, y, below));
                        }
                        if y > 0 {
                            check(lattice.index(x, y - 1, below));
                        }
                        if x + 1 < nx {
                            check(lattice.index(x + 1, y, below));
                        }
                        if y + 1 < ny {
                            check(lattice.index(x, y + 1, below));
                        }
                    }
                    if neighbors == 26 {
                        if x > 0 && y > 0 {
                            check(lattice.index(x - 1, y - 1, below));
                        }
                        if x + 1 < nx && y > 0 {
                            check(lattice.index(x + 1, y - 1, below));
                        }
                        if x > 0 && y + 1 < ny {
                            check(lattice.index(x - 1, y + 1, below));
                        }
                        if x + 1 < nx && y + 1 < ny {
                            check(lattice.index(x + 1, y + 1, below));
                        }
                    }
                }
                if x > 0 {
                    check(lattice.index(x - 1, y, z));
                }
                if y > 0 {
                    check(lattice.index(x, y - 1, z));
                }
                if neighbors >= 18 && y > 0 {
                    if x > 0 {
                        check(lattice.index(x - 1, y - 1, z));
                    }
                    if x + 1 < nx {
                        check(lattice.index(x + 1, y - 1, z));
                    }
                }

                if count > 0 {
                    provisional[here] = found[0];
                    table.merge(&found[..count]);
                } else {
                    provisional[here] = table.fresh();
                }
            }
        }
        report_progress((z + 1) as f32 / lattice.nz as f32);
    }
    table.flatten();
    (provisional, table)
}

/// Renumbers resolved roots densely in raster order, starting at 1.
fn dense_labels(provisional: &[u32], table: &TranslationTable) -> (u32, Vec<u32>) {
    let mut dense_id = vec![0u32; table.len()];
    let mut next = 0u32;
    let labels: Vec<u32> = provisional
        .iter()
        .map(|&id| {
            if id == 0 {
                return 0;
            }
            let root = table.resolve(id) as usize - 1;
            if dense_id[root] == 0 {
                next += 1;
                dense_id[root] = next;
            }
            dense_id[root]
        })
        .collect();
    (next, labels)
}

/// Maps each component to its input value if it is the largest component of
/// that value (ties go to the lower id), else to 0.
fn largest_per_value(bw: &[u32], count: u32, labels: &[u32]) -> (u32, Vec<u32>) {
    let slots = count as usize + 1;
    let mut value_of = vec![0u32; slots];
    let mut size_of = vec![0usize; slots];
    for (&value, &label) in bw.iter().zip(labels) {
        value_of[label as usize] = value;
        size_of[label as usize] += 1;
    }
    let max_value = value_of.iter().skip(1).copied().max().unwrap_or(0);

    let mut winner = HashMap::new();
    for label in 1..slots {
        let value = value_of[label];
        let entry = winner.entry(value).or_insert(label);
        if size_of[label] > size_of[*entry] {
            *entry = label;
        }
    }
    let mut keep = vec![0u32; slots];
    for (&value, &label) in &winner {
        keep[label] = value;
    }
    (max_value, labels.iter().map(|&l| keep[l as usize]).collect())
}

/// Labels connected components of `values` (x fastest).
///
/// Grids thinner than two voxels in x or y yield an empty result.
pub fn label_components(
    values: &[u8],
    dims: [u32; 3],
    options: LabelingOptions,
) -> Result<Components, DrawError> {
    let expected = dims[0] as usize * dims[1] as usize * dims[2] as usize;
    if values.len() != expected {
        return Err(DrawError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    if dims[0] < 2 || dims[1] < 2 || dims[2] < 1 {
        warn!("bwlabel: volume must be at least 2x2 in plane, got {:?}", dims);
        return Ok(Components::empty(values.len()));
    }

    let start = Instant::now();
    let bw: Vec<u32> = if options.binarize {
        values.iter().map(|&v| u32::from(v != 0)).collect()
    } else {
        values.iter().map(|&v| u32::from(v)).collect()
    };
    let lattice = Lattice {
        nx: dims[0] as usize,
        ny: dims[1] as usize,
        nz: dims[2] as usize,
    };
    let (provisional, table) = provisional_labels(&bw, &lattice, options.connectivity);
    let (count, labels) = dense_labels(&provisional, &table);
    info!(
        "{} neighbor clustering into {} regions in {:.1}ms",
        options.connectivity.neighbors(),
        count,
        start.elapsed().as_secs_f32() * 1000.0
    );

    if options.largest_per_value {
        let (max_value, kept) = largest_per_value(&bw, count, &labels);
        return Ok(Components {
            count: max_value,
            labels: kept,
        });
    }
    Ok(Components { count, labels })
}

/// Untyped entry point: a neighbor count other than 6, 18 or 26 yields an
/// empty result.
pub fn bwlabel(
    values: &[u8],
    dims: [u32; 3],
    neighbors: u32,
    binarize: bool,
    largest_per_value: bool,
) -> Result<Components, DrawError> {
    let Some(connectivity) = Connectivity::from_neighbors(neighbors) else {
        warn!("bwlabel: connectivity must be 6, 18 or 26, got {neighbors}");
        return Ok(Components::empty(values.len()));
    };
    label_components(
        values,
        dims,
        LabelingOptions {
            connectivity,
            binarize,
            largest_per_value,
        },
    )
}
