use std::collections::VecDeque;

use voxdraw_grid::SliceAxis;

use crate::bitmap::LabelBitmap;

/// Brush state for freehand drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pen {
    pub value: u8,
    pub size: u32,
    /// Plane that thick strokes spread across. `None` paints single voxels.
    pub axis: Option<SliceAxis>,
}

impl Pen {
    pub fn new(value: u8) -> Self {
        Self {
            value,
            size: 1,
            axis: None,
        }
    }

    pub fn with_size(mut self, size: u32, axis: SliceAxis) -> Self {
        self.size = size.max(1);
        self.axis = Some(axis);
        self
    }

    pub fn eraser() -> Self {
        Self::new(0)
    }
}

/// Writes the pen footprint centred on `point`. Coordinates are clamped into
/// the grid; thickness never extends along the slice normal.
pub fn draw_point(bitmap: &mut LabelBitmap, point: [i32; 3], pen: &Pen) {
    let axis = match pen.axis {
        Some(axis) if pen.size > 1 => axis,
        _ => {
            let idx = bitmap.clamped_index(point);
            bitmap.as_mut_slice()[idx] = pen.value;
            return;
        }
    };
    let center = bitmap.coords(bitmap.clamped_index(point));
    let center = [center[0] as i32, center[1] as i32, center[2] as i32];
    let half = (pen.size / 2) as i32;
    let (h, v) = axis.in_plane_axes();
    for i in -half..=half {
        for j in -half..=half {
            let mut p = center;
            p[h] += i;
            p[v] += j;
            let idx = bitmap.clamped_index(p);
            bitmap.as_mut_slice()[idx] = pen.value;
        }
    }
}

/// Visits every voxel of the discrete segment from `a` to `b`, both ends
/// included. Consecutive voxels differ by at most one step on each axis.
pub fn bresenham_3d<F>(a: [i32; 3], b: [i32; 3], mut visit: F)
where
    F: FnMut([i32; 3]),
{
    let delta = [
        (b[0] - a[0]).abs(),
        (b[1] - a[1]).abs(),
        (b[2] - a[2]).abs(),
    ];
    let step = [
        (b[0] - a[0]).signum(),
        (b[1] - a[1]).signum(),
        (b[2] - a[2]).signum(),
    ];
    let driving = if delta[0] >= delta[1] && delta[0] >= delta[2] {
        0
    } else if delta[1] >= delta[2] {
        1
    } else {
        2
    };
    let (first, second) = match driving {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };

    let mut p = a;
    visit(p);
    let mut err1 = 2 * delta[first] - delta[driving];
    let mut err2 = 2 * delta[second] - delta[driving];
    while p[driving] != b[driving] {
        p[driving] += step[driving];
        if err1 >= 0 {
            p[first] += step[first];
            err1 -= 2 * delta[driving];
        }
        if err2 >= 0 {
            p[second] += step[second];
            err2 -= 2 * delta[driving];
        }
        err1 += 2 * delta[first];
        err2 += 2 * delta[second];
        visit(p);
    }
}

pub fn draw_line(bitmap: &mut LabelBitmap, a: [i32; 3], b: [i32; 3], pen: &Pen) {
    bresenham_3d(a, b, |p| draw_point(bitmap, p, pen));
}

/// Joins successive points with lines; a single point paints one footprint.
pub fn draw_stroke(bitmap: &mut LabelBitmap, points: &[[i32; 3]], pen: &Pen) {
    match points {
        [] => {}
        [only] => draw_point(bitmap, *only, pen),
        _ => {
            for pair in points.windows(2) {
                draw_line(bitmap, pair[0], pair[1], pen);
            }
        }
    }
}

fn bresenham_2d<F>(a: [i32; 2], b: [i32; 2], mut visit: F)
where
    F: FnMut(i32, i32),
{
    let dx = (b[0] - a[0]).abs();
    let dy = -(b[1] - a[1]).abs();
    let sx = (b[0] - a[0]).signum();
    let sy = (b[1] - a[1]).signum();
    let mut err = dx + dy;
    let (mut x, mut y) = (a[0], a[1]);
    loop {
        visit(x, y);
        if x == b[0] && y == b[1] {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

const OUTSIDE_UNKNOWN: u8 = 0;
const OUTLINE: u8 = 1;
const EXTERIOR: u8 = 2;

/// Fills the closed polygon through `points` on the slice of `axis` that holds
/// the first point. Returns `false` when there are too few points to close a
/// shape.
pub fn fill_polygon(
    bitmap: &mut LabelBitmap,
    points: &[[i32; 3]],
    value: u8,
    axis: SliceAxis,
) -> bool {
    if points.len() < 2 {
        return false;
    }
    let dims = bitmap.dims();
    let (h, v) = axis.in_plane_axes();
    let normal = axis.normal_axis();
    let clamp = |value: i32, axis: usize| value.clamp(0, dims[axis].saturating_sub(1) as i32);
    let slice = clamp(points[0][normal], normal);
    let plane: Vec<[i32; 2]> = points
        .iter()
        .map(|p| [clamp(p[h], h), clamp(p[v], v)])
        .collect();

    let min_h = plane.iter().map(|p| p[0]).min().unwrap_or(0) - 1;
    let max_h = plane.iter().map(|p| p[0]).max().unwrap_or(0) + 1;
    let min_v = plane.iter().map(|p| p[1]).min().unwrap_or(0) - 1;
    let max_v = plane.iter().map(|p| p[1]).max().unwrap_or(0) + 1;
    let width = (max_h - min_h + 1) as usize;
    let height = (max_v - min_v + 1) as usize;
    let mut mask = vec![OUTSIDE_UNKNOWN; width * height];

    for (i, start) in plane.iter().enumerate() {
        let end = plane[(i + 1) % plane.len()];
        bresenham_2d(*start, end, |x, y| {
            let local = (y - min_v) as usize * width + (x - min_h) as usize;
            mask[local] = OUTLINE;
        });
    }

    // the padded border is never on the outline, so the corner reaches all of it
    let mut queue = VecDeque::new();
    mask[0] = EXTERIOR;
    queue.push_back((0usize, 0usize));
    while let Some((x, y)) = queue.pop_front() {
        let mut visit = |nx: usize, ny: usize| {
            let local = ny * width + nx;
            if mask[local] == OUTSIDE_UNKNOWN {
                mask[local] = EXTERIOR;
                queue.push_back((nx, ny));
            }
        };
        if x > 0 {
            visit(x - 1, y);
        }
        if x + 1 < width {
            visit(x + 1, y);
        }
        if y > 0 {
            visit(x, y - 1);
        }
        if y + 1 < height {
            visit(x, y + 1);
        }
    }

    for y in 0..height {
        for x in 0..width {
            if mask[y * width + x] == EXTERIOR {
                continue;
            }
            let mut p = [0i32; 3];
            p[h] = x as i32 + min_h;
            p[v] = y as i32 + min_v;
            p[normal] = slice;
            if bitmap.contains(p) {
                let idx = bitmap.index(p[0] as u32, p[1] as u32, p[2] as u32);
                bitmap.as_mut_slice()[idx] = value;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_includes_endpoints_without_gaps() {
        let mut visited = Vec::new();
        bresenham_3d([0, 0, 0], [5, -3, 2], |p| visited.push(p));
        assert_eq!(visited.first(), Some(&[0, 0, 0]));
        assert_eq!(visited.last(), Some(&[5, -3, 2]));
        assert_eq!(visited.len(), 6);
        for pair in visited.windows(2) {
            for axis in 0..3 {
                assert!((pair[1][axis] - pair[0][axis]).abs() <= 1);
            }
        }
    }

    #[test]
    fn single_point_line_visits_once() {
        let mut visited = Vec::new();
        bresenham_3d([2, 2, 2], [2, 2, 2], |p| visited.push(p));
        assert_eq!(visited, vec![[2, 2, 2]]);
    }

    #[test]
    fn thick_pen_stays_in_plane() {
        let mut bitmap = LabelBitmap::new([5, 5, 5]);
        let pen = Pen::new(3).with_size(3, SliceAxis::Coronal);
        draw_point(&mut bitmap, [2, 2, 2], &pen);
        assert_eq!(bitmap.count_label(3), 9);
        for idx in 0..bitmap.len() {
            if bitmap.as_slice()[idx] != 0 {
                assert_eq!(bitmap.coords(idx)[1], 2);
            }
        }
    }

    #[test]
    fn out_of_range_point_is_clamped() {
        let mut bitmap = LabelBitmap::new([5, 5, 5]);
        draw_point(&mut bitmap, [-1, 10, 2], &Pen::new(1));
        assert_eq!(bitmap.get(0, 4, 2), 1);
        assert_eq!(bitmap.count_nonzero(), 1);
    }

    #[test]
    fn thick_pen_off_grid_spreads_from_clamped_center() {
        let mut bitmap = LabelBitmap::new([10, 10, 3]);
        let pen = Pen::new(6).with_size(3, SliceAxis::Axial);
        draw_point(&mut bitmap, [-20, 5, 1], &pen);
        assert_eq!(bitmap.count_label(6), 6);
        for y in 4..=6 {
            assert_eq!(bitmap.get(0, y, 1), 6);
            assert_eq!(bitmap.get(1, y, 1), 6);
        }
        assert_eq!(bitmap.get(2, 5, 1), 0);
    }

    #[test]
    fn stroke_joins_points() {
        let mut bitmap = LabelBitmap::new([6, 6, 1]);
        draw_stroke(&mut bitmap, &[[0, 0, 0], [5, 0, 0], [5, 5, 0]], &Pen::new(2));
        assert_eq!(bitmap.count_label(2), 11);
    }

    #[test]
    fn polygon_fills_interior_and_outline() {
        let mut bitmap = LabelBitmap::new([7, 7, 2]);
        let square = [[1, 1, 1], [5, 1, 1], [5, 5, 1], [1, 5, 1]];
        assert!(fill_polygon(&mut bitmap, &square, 4, SliceAxis::Axial));
        assert_eq!(bitmap.count_label(4), 25);
        assert_eq!(bitmap.get(3, 3, 1), 4);
        assert_eq!(bitmap.get(3, 3, 0), 0);
        assert_eq!(bitmap.get(0, 0, 1), 0);
    }

    #[test]
    fn polygon_needs_two_points() {
        let mut bitmap = LabelBitmap::new([4, 4, 1]);
        assert!(!fill_polygon(&mut bitmap, &[[1, 1, 0]], 1, SliceAxis::Axial));
        assert_eq!(bitmap.count_nonzero(), 0);
    }
}
