//! ASCII/Unicode plotting of light curves.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a single stage
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed samples: `o`
//! - fitted curve: `-` line
//! - markers (depth, slope run, crossings): caller-chosen symbol

use crate::domain::LightCurve;

/// A highlighted point drawn on top of everything else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub t: f64,
    pub y: f64,
    pub symbol: char,
}

impl Marker {
    pub fn new(t: f64, y: f64, symbol: char) -> Self {
        Self { t, y, symbol }
    }
}

/// Render `observed` samples with an optional fitted curve and markers.
///
/// Missing samples are skipped. Time is in seconds from the flare peak and
/// the y axis in percent of the pre-flare level.
pub fn render_curve_plot(
    observed: &LightCurve,
    fitted: Option<&LightCurve>,
    markers: &[Marker],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (t_min, t_max) = time_range(observed, fitted);
    let (y_min, y_max) = y_range(observed, fitted, markers).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    if let Some(curve) = fitted {
        let points: Vec<(f64, f64)> = curve.iter().filter(|(_, y)| y.is_finite()).collect();
        draw_curve(&mut grid, &points, t_min, t_max, y_min, y_max);
    }

    for (t, y) in observed.iter().filter(|(_, y)| y.is_finite()) {
        let x = map_x(t, t_min, t_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][x] = 'o';
    }

    for m in markers.iter().filter(|m| m.t.is_finite() && m.y.is_finite()) {
        let x = map_x(m.t, t_min, t_max, width);
        let row = map_y(m.y, y_min, y_max, height);
        grid[row][x] = m.symbol;
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: t=[{t_min:.0}, {t_max:.0}] s | y=[{y_min:.2}, {y_max:.2}] %\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn time_range(observed: &LightCurve, fitted: Option<&LightCurve>) -> (f64, f64) {
    let (mut t_min, mut t_max) = observed.span();
    if let Some(curve) = fitted {
        let (a, b) = curve.span();
        t_min = t_min.min(a);
        t_max = t_max.max(b);
    }
    if t_max > t_min {
        (t_min, t_max)
    } else {
        (t_min - 1.0, t_max + 1.0)
    }
}

fn y_range(observed: &LightCurve, fitted: Option<&LightCurve>, markers: &[Marker]) -> Option<(f64, f64)> {
    let values = observed
        .irradiance()
        .iter()
        .chain(fitted.map(|c| c.irradiance()).unwrap_or(&[]))
        .copied()
        .chain(markers.iter().map(|m| m.y))
        .filter(|v| v.is_finite());

    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in values {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        Some((min_y - 1.0, max_y + 1.0))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
