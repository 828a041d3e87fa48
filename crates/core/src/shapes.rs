use crate::bitmap::LabelBitmap;

fn clamped_bounds(bitmap: &LabelBitmap, a: [i32; 3], b: [i32; 3]) -> ([u32; 3], [u32; 3]) {
    let dims = bitmap.dims();
    let mut min = [0u32; 3];
    let mut max = [0u32; 3];
    for axis in 0..3 {
        let hi = dims[axis].saturating_sub(1) as i32;
        let lo_v = a[axis].min(b[axis]).clamp(0, hi);
        let hi_v = a[axis].max(b[axis]).clamp(0, hi);
        min[axis] = lo_v as u32;
        max[axis] = hi_v as u32;
    }
    (min, max)
}

/// Fills the axis-aligned box spanned by two corners. Returns the voxel count written.
pub fn fill_rectangle(bitmap: &mut LabelBitmap, a: [i32; 3], b: [i32; 3], value: u8) -> usize {
    let (min, max) = clamped_bounds(bitmap, a, b);
    let mut written = 0;
    for z in min[2]..=max[2] {
        for y in min[1]..=max[1] {
            for x in min[0]..=max[0] {
                bitmap.set(x, y, z, value);
                written += 1;
            }
        }
    }
    written
}

/// Fills the ellipsoid inscribed in the box spanned by two corners.
///
/// Radii are padded by half a voxel so flat (single-slice) boxes still produce
/// an ellipse and the extreme voxels of each axis are included.
pub fn fill_ellipsoid(bitmap: &mut LabelBitmap, a: [i32; 3], b: [i32; 3], value: u8) -> usize {
    let (min, max) = clamped_bounds(bitmap, a, b);
    let mut center = [0f32; 3];
    let mut radius = [0f32; 3];
    for axis in 0..3 {
        center[axis] = (min[axis] + max[axis]) as f32 * 0.5;
        radius[axis] = (max[axis] - min[axis]) as f32 * 0.5 + 0.5;
    }
    let mut written = 0;
    for z in min[2]..=max[2] {
        for y in min[1]..=max[1] {
            for x in min[0]..=max[0] {
                let p = [x as f32, y as f32, z as f32];
                let sum: f32 = (0..3)
                    .map(|axis| {
                        let d = (p[axis] - center[axis]) / radius[axis];
                        d * d
                    })
                    .sum();
                if sum <= 1.0 {
                    bitmap.set(x, y, z, value);
                    written += 1;
                }
            }
        }
    }
    written
}
