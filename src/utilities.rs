/// Utility functions for searching and interpolating on monotone grids

/// Locate `x_new` on the non-decreasing grid `x`.
///
/// Returns `(idx, weight)` with `x[idx] <= x_new <= x[idx + 1]` and
/// `weight = (x_new - x[idx]) / (x[idx + 1] - x[idx])`. Values outside the
/// grid are clamped to the first or last interval. Zero-width intervals give
/// weight 0. The grid must have at least two points.
pub fn bracket(x: &[f64], x_new: f64) -> (usize, f64) {
    debug_assert!(x.len() >= 2, "bracket needs at least two grid points");
    let last = x.len() - 1;
    if x_new <= x[0] {
        return (0, 0.0);
    }
    if x_new >= x[last] {
        // Step back over trailing zero-width intervals
        let mut idx = last - 1;
        while idx > 0 && x[idx] >= x[last] {
            idx -= 1;
        }
        return (idx, interval_weight(x[idx], x[idx + 1], x_new));
    }

    // Binary search for interval: find largest i with x[i] <= x_new
    let mut low = 0usize;
    let mut high = last; // invariant: target interval within (low, high]
    while high - low > 1 {
        let mid = (low + high) >> 1;
        if x[mid] <= x_new {
            low = mid;
        } else {
            high = mid;
        }
    }
    (low, interval_weight(x[low], x[low + 1], x_new))
}

fn interval_weight(x1: f64, x2: f64, x_new: f64) -> f64 {
    let width = x2 - x1;
    if width > 0.0 {
        ((x_new - x1) / width).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Trapezoidal integral of `y` over `x`.
pub fn integrate_trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (ys[0] + ys[1]) * (xs[1] - xs[0]))
        .sum()
}
