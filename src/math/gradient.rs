//! Finite differences and linear interpolation on irregular grids.

/// Pointwise derivative `dy/dx` on a (possibly non-uniform) grid.
///
/// Interior points use the second-order accurate central difference for
/// uneven spacing; the edges use one-sided differences. Repeated `x` values
/// produce `NaN` at the affected points instead of dividing by zero.
pub fn gradient(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return vec![f64::NAN; n];
    }

    let mut out = vec![f64::NAN; n];
    out[0] = one_sided(x[0], x[1], y[0], y[1]);
    out[n - 1] = one_sided(x[n - 2], x[n - 1], y[n - 2], y[n - 1]);

    for i in 1..n - 1 {
        let h0 = x[i] - x[i - 1];
        let h1 = x[i + 1] - x[i];
        if h0 <= 0.0 || h1 <= 0.0 {
            continue;
        }
        out[i] = (h0 * h0 * y[i + 1] - h1 * h1 * y[i - 1] + (h1 * h1 - h0 * h0) * y[i])
            / (h0 * h1 * (h0 + h1));
    }
    out
}

fn one_sided(x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    let h = x1 - x0;
    if h <= 0.0 { f64::NAN } else { (y1 - y0) / h }
}

/// Linearly interpolate `(xs, ys)` at `x`. `xs` must be non-decreasing.
///
/// Returns `NaN` outside `[xs[0], xs[last]]` or when a bracketing value is
/// missing.
pub fn interp(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 || !x.is_finite() || x < xs[0] || x > xs[n - 1] {
        return f64::NAN;
    }
    let hi = xs[..n].partition_point(|&v| v < x);
    if hi < n && xs[hi] == x {
        return ys[hi];
    }
    if hi == 0 {
        return ys[0];
    }
    let lo = hi - 1;
    let (x0, x1) = (xs[lo], xs[hi]);
    let (y0, y1) = (ys[lo], ys[hi]);
    if (x1 - x0).abs() < 1e-12 {
        return y0;
    }
    let u = (x - x0) / (x1 - x0);
    y0 + u * (y1 - y0)
}

/// Time at which the segment `(t0, y0) -> (t1, y1)` crosses zero.
pub fn zero_crossing(t0: f64, y0: f64, t1: f64, y1: f64) -> f64 {
    if (y1 - y0).abs() < f64::EPSILON {
        return t0;
    }
    t0 + (0.0 - y0) * (t1 - t0) / (y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_is_exact_for_quadratics_on_uneven_grid() {
        let x = [0.0, 0.5, 2.0, 2.5, 4.0];
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let g = gradient(&x, &y);
        for i in 1..x.len() - 1 {
            assert!((g[i] - 2.0 * x[i]).abs() < 1e-12, "g[{i}]={}", g[i]);
        }
    }

    #[test]
    fn interp_brackets_and_edges() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [0.0, 10.0, 30.0];
        assert!((interp(&xs, &ys, 2.0) - 20.0).abs() < 1e-12);
        assert_eq!(interp(&xs, &ys, 1.0), 10.0);
        assert!(interp(&xs, &ys, -0.1).is_nan());
        assert!(interp(&xs, &ys, 3.1).is_nan());
    }

    #[test]
    fn zero_crossing_interpolates() {
        assert!((zero_crossing(0.0, 1.0, 2.0, -1.0) - 1.0).abs() < 1e-12);
    }
}
