//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - dataset means: `o`, with `|` error bars (one sdev)
//! - fitted curve: `-` line
//! - fit band edges (mean ± sdev): `:`

use crate::app::pipeline::FitBand;
use crate::data::ObservedDataset;
use crate::domain::Grid;

/// Render the dataset and, when present, the fit band.
pub fn render_ascii_plot(
    grid: &Grid,
    dataset: &ObservedDataset,
    band: Option<&FitBand>,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let xs = grid.points();
    let ys = dataset.mean();
    let errs = dataset.sdev();

    let (x_min, x_max) = x_range(xs, band).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_range(ys, &errs, band).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut cells = vec![vec![' '; width]; height];
    let frame = Frame {
        x_min,
        x_max,
        y_min,
        y_max,
        width,
        height,
    };

    // Curve first, then band edges only where blank.
    if let Some(band) = band {
        let sdev = band.sdev();
        let mean: Vec<(f64, f64)> = band.xs.iter().copied().zip(band.mean().iter().copied()).collect();
        let upper: Vec<(f64, f64)> = mean.iter().zip(&sdev).map(|(&(x, y), s)| (x, y + s)).collect();
        let lower: Vec<(f64, f64)> = mean.iter().zip(&sdev).map(|(&(x, y), s)| (x, y - s)).collect();
        draw_curve(&mut cells, &mean, &frame, '-');
        draw_curve(&mut cells, &upper, &frame, ':');
        draw_curve(&mut cells, &lower, &frame, ':');
    }

    for ((&x, &y), &e) in xs.iter().zip(ys).zip(&errs) {
        let col = frame.col(x);
        let row = frame.row(y);
        if e > 0.0 {
            let top = frame.row(y + e);
            let bottom = frame.row(y - e);
            for cell_row in cells.iter_mut().take(bottom + 1).skip(top) {
                if matches!(cell_row[col], ' ' | ':') {
                    cell_row[col] = '|';
                }
            }
        }
        cells[row][col] = 'o';
    }

    // Build final string. We include a small header with ranges.
    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.2}, {y_max:.2}]\n"
    ));

    for row in cells {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    width: usize,
    height: usize,
}

impl Frame {
    fn col(&self, x: f64) -> usize {
        let u = ((x - self.x_min) / (self.x_max - self.x_min)).clamp(0.0, 1.0);
        (u * (self.width as f64 - 1.0)).round() as usize
    }

    fn row(&self, y: f64) -> usize {
        let u = ((y - self.y_min) / (self.y_max - self.y_min)).clamp(0.0, 1.0);
        // y=top is max -> row 0
        (self.height as f64 - 1.0 - (u * (self.height as f64 - 1.0))).round() as usize
    }
}

fn x_range(xs: &[f64], band: Option<&FitBand>) -> Option<(f64, f64)> {
    let band_xs = band.map(|b| b.xs.as_slice()).unwrap_or(&[]);
    let (lo, hi) = xs
        .iter()
        .chain(band_xs)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    (lo.is_finite() && hi.is_finite() && hi > lo).then_some((lo, hi))
}

fn y_range(ys: &[f64], errs: &[f64], band: Option<&FitBand>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for (&y, &e) in ys.iter().zip(errs) {
        min_y = min_y.min(y - e);
        max_y = max_y.max(y + e);
    }
    if let Some(band) = band {
        for (&y, s) in band.mean().iter().zip(band.sdev()) {
            min_y = min_y.min(y - s);
            max_y = max_y.max(y + s);
        }
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn draw_curve(cells: &mut [Vec<char>], curve: &[(f64, f64)], frame: &Frame, ch: char) {
    if curve.len() < 2 {
        return;
    }

    let mut prev = None;
    for &(x, y) in curve {
        let col = frame.col(x);
        let row = frame.row(y);
        match prev {
            Some((c0, r0)) => draw_line(cells, c0, r0, col, row, ch),
            None if cells[row][col] == ' ' => cells[row][col] = ch,
            None => {}
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish); only blank cells are written.
fn draw_line(cells: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
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
            && (y0 as usize) < cells.len()
            && x0 >= 0
            && (x0 as usize) < cells[0].len()
            && cells[y0 as usize][x0 as usize] == ' '
        {
            cells[y0 as usize][x0 as usize] = ch;
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
