//! Inferred deltas for untouched points.
//!
//! When a tuple only supplies deltas for some points of a contour, the
//! remaining points move by interpolation between their touched neighbours:
//! independently in X and Y, linearly when the untouched coordinate lies
//! between the neighbours' coordinates, and by a flat shift otherwise.

/// Expands a sparse delta set across every contour of a glyph.
///
/// `deltas` and `touched` cover the full point array including phantom
/// points; `end_points` lists the last point index of each contour, so
/// phantom points (which belong to no contour) are never inferred.
/// Untouched deltas arrive as zero and leave as `f64` interpolants.
pub(crate) fn expand(
    dx: &[i32],
    dy: &[i32],
    touched: &[bool],
    base: &[(i32, i32)],
    end_points: &[usize],
) -> Vec<(f64, f64)> {
    let mut deltas: Vec<(f64, f64)> = dx
        .iter()
        .zip(dy.iter())
        .map(|(x, y)| (f64::from(*x), f64::from(*y)))
        .collect();

    let mut start = 0;
    for &end in end_points {
        if end >= deltas.len() || end >= base.len() {
            break;
        }
        expand_contour(&mut deltas, touched, base, start, end);
        start = end + 1;
    }
    deltas
}

fn expand_contour(
    deltas: &mut [(f64, f64)],
    touched: &[bool],
    base: &[(i32, i32)],
    start: usize,
    end: usize,
) {
    if start > end {
        return;
    }
    let len = end - start + 1;
    let Some(first_touched) = (0..len).position(|i| touched[start + i]) else {
        // No touched point on the contour: everything stays at zero.
        return;
    };

    let mut touched_order = vec![first_touched];
    let mut i = (first_touched + 1) % len;
    while i != first_touched {
        if touched[start + i] {
            touched_order.push(i);
        }
        i = (i + 1) % len;
    }

    if touched_order.len() == 1 {
        // A single touched point drags the whole contour with it.
        let d = deltas[start + first_touched];
        for i in 0..len {
            if i != first_touched {
                deltas[start + i] = d;
            }
        }
        return;
    }

    for window in touched_order.windows(2) {
        interpolate_run(deltas, base, start, len, window[0], window[1]);
    }
    let last = *touched_order.last().unwrap();
    interpolate_run(deltas, base, start, len, last, touched_order[0]);
}

/// Fills the untouched points strictly between two touched bounds, walking
/// cyclically from `left` to `right`.
fn interpolate_run(
    deltas: &mut [(f64, f64)],
    base: &[(i32, i32)],
    start: usize,
    len: usize,
    left: usize,
    right: usize,
) {
    if (left + 1) % len == right {
        return;
    }
    let (lx, ly) = base[start + left];
    let (rx, ry) = base[start + right];
    let (dlx, dly) = deltas[start + left];
    let (drx, dry) = deltas[start + right];

    let mut i = (left + 1) % len;
    while i != right {
        let (px, py) = base[start + i];
        deltas[start + i] = (
            infer_axis(lx, rx, px, dlx, drx),
            infer_axis(ly, ry, py, dly, dry),
        );
        i = (i + 1) % len;
    }
}

fn infer_axis(c_left: i32, c_right: i32, c: i32, d_left: f64, d_right: f64) -> f64 {
    if c_left == c_right {
        return d_left;
    }
    let (lo, hi, d_lo, d_hi) = if c_left > c_right {
        (c_right, c_left, d_right, d_left)
    } else {
        (c_left, c_right, d_left, d_right)
    };
    if c <= lo {
        d_lo
    } else if c >= hi {
        d_hi
    } else {
        let t = f64::from(c - lo) / f64::from(hi - lo);
        d_lo + t * (d_hi - d_lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        dx: &[i32],
        dy: &[i32],
        touched: &[bool],
        base: &[(i32, i32)],
        ends: &[usize],
    ) -> Vec<(f64, f64)> {
        expand(dx, dy, touched, base, ends)
    }

    #[test]
    fn interpolates_between_touched_neighbours() {
        // three collinear points, ends touched with deltas (0,0) and (20,0)
        let base = [(0, 0), (100, 0), (200, 0)];
        let out = run(
            &[0, 0, 20],
            &[0, 0, 0],
            &[true, false, true],
            &base,
            &[2],
        );
        assert_eq!(out[1], (10.0, 0.0));
        assert_eq!(out[0], (0.0, 0.0));
        assert_eq!(out[2], (20.0, 0.0));
    }

    #[test]
    fn all_touched_is_identity() {
        let base = [(0, 0), (10, 10), (20, 0)];
        let out = run(
            &[1, 2, 3],
            &[4, 5, 6],
            &[true, true, true],
            &base,
            &[2],
        );
        assert_eq!(out, vec![(1.0, 4.0), (2.0, 5.0), (3.0, 6.0)]);
    }

    #[test]
    fn untouched_contour_stays_zero() {
        let base = [(0, 0), (10, 10), (20, 0)];
        let out = run(&[0; 3], &[0; 3], &[false; 3], &base, &[2]);
        assert_eq!(out, vec![(0.0, 0.0); 3]);
    }

    #[test]
    fn single_touched_point_shifts_contour() {
        let base = [(0, 0), (10, 10), (20, 0), (30, -10)];
        let out = run(
            &[0, 7, 0, 0],
            &[0, -3, 0, 0],
            &[false, true, false, false],
            &base,
            &[3],
        );
        assert_eq!(out, vec![(7.0, -3.0); 4]);
    }

    #[test]
    fn shift_outside_bracketing_interval() {
        // untouched point sits left of both touched coordinates: it follows
        // the nearer-side delta instead of extrapolating
        let base = [(0, 0), (100, 0), (200, 0)];
        let out = run(
            &[5, 0, 9],
            &[0, 0, 0],
            &[false, true, true],
            &base,
            &[2],
        );
        // run wraps from point 2 back to point 1 through point 0;
        // c=0 lies below both bounds, so it follows the lower-coordinate
        // bound (point 1, delta 0)
        assert_eq!(out[0].0, 0.0);
    }

    #[test]
    fn wrapping_run_uses_last_and_first_touched() {
        // square contour, touched at 1 and 3; points 2 and 0 both inferred,
        // point 0 through the wrap-around run 3 -> 0 -> 1
        let base = [(0, 0), (100, 0), (100, 100), (0, 100)];
        let out = run(
            &[0, 10, 0, 30],
            &[0, 0, 0, 0],
            &[false, true, false, true],
            &base,
            &[3],
        );
        // x: point 0 at x=0 equals the touched point 3's x -> shares d=30
        assert_eq!(out[0].0, 30.0);
        // point 2 at x=100 equals touched point 1's x -> shares d=10
        assert_eq!(out[2].0, 10.0);
    }

    #[test]
    fn equal_endpoint_coordinates_pick_the_left_delta() {
        let base = [(50, 0), (50, 10), (50, 20)];
        let out = run(
            &[4, 0, 8],
            &[0, 0, 0],
            &[true, false, true],
            &base,
            &[2],
        );
        assert_eq!(out[1].0, 4.0);
    }

    #[test]
    fn phantom_points_are_left_alone() {
        // one contour of two points plus four phantoms carrying deltas
        let base = [(0, 0), (100, 0), (0, 0), (500, 0), (0, 0), (0, 0)];
        let out = run(
            &[0, 10, 0, 40, 0, 0],
            &[0; 6],
            &[false, true, false, true, false, false],
            &base,
            &[1],
        );
        assert_eq!(out[0], (10.0, 0.0)); // dragged by the contour's one touched point
        assert_eq!(out[2], (0.0, 0.0)); // untouched phantom stays put
        assert_eq!(out[3], (40.0, 0.0));
    }
}
