//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (the tests below pin the layout)
//!
//! Uncertain numbers are printed in the compact `value(error)` notation, with
//! the error given to two significant digits in units of the last printed
//! digit of the value: `1.4723 ± 0.0123` prints as `1.472(12)`.

use crate::app::pipeline::RunOutput;
use crate::data::ObservedDataset;
use crate::domain::{key_name, FitResult, RunConfig};
use crate::error::Result;
use crate::report::{compute_residuals, largest_pulls};

/// Number of points listed under "Largest pulls".
const TOP_PULLS: usize = 5;
const MAX_DECIMALS: i32 = 15;

/// `value(error)` with a two-digit error.
pub fn fmt_uncertain(mean: f64, sdev: f64) -> String {
    if !mean.is_finite() || !sdev.is_finite() {
        return format!("{mean}({sdev})");
    }
    if sdev <= 0.0 {
        return format!("{mean}(0)");
    }

    let mut decimals = 1 - sdev.log10().floor() as i32;
    // 0.0996 rounds to 100 units of the third decimal: keep two digits.
    if (sdev * 10f64.powi(decimals)).round() >= 100.0 {
        decimals -= 1;
    }
    let decimals = decimals.clamp(0, MAX_DECIMALS);
    let d = decimals as usize;
    let digits = (sdev * 10f64.powi(decimals)).round();
    if decimals > 0 && digits >= 10f64.powi(decimals) {
        // Error spans the decimal point: print it in the value's units.
        return format!("{mean:.d$}({sdev:.d$})");
    }
    format!("{mean:.d$}({digits:.0})")
}

/// Format the full run summary (setup, dataset, fit diagnostics).
pub fn format_run_summary(run: &RunOutput, config: &RunConfig) -> Result<String> {
    let mut out = String::new();

    out.push_str("=== polyfit - noisy polynomial least squares ===\n");
    out.push_str(&format!(
        "Truth: degree {} | {}\n",
        config.data_degree,
        fmt_coefficients(&run.truth.iter().collect::<Vec<_>>())
    ));
    out.push_str(&format!(
        "Noise: N(mu={}, sig={}) x {} draws | seed={}\n",
        config.noise_mean,
        config.noise_width,
        config.sample_count,
        config.seed.map_or_else(|| "entropy".to_string(), |s| s.to_string())
    ));
    out.push_str(&format!(
        "Grid: {} points on [{}, {}], step {}\n",
        run.grid.len(),
        run.grid.start(),
        run.grid.end(),
        run.grid.step()
    ));
    out.push('\n');
    out.push_str(&format_dataset(&run.dataset));

    match &run.fit {
        Some(fit) => {
            out.push('\n');
            out.push_str(&format_fit(fit));
            let residuals = compute_residuals(&run.grid, &run.dataset, fit)?;
            out.push_str("\nLargest pulls:\n");
            out.push_str(&format!("{:>8} {:>14} {:>10} {:>8}\n", "x", "y", "y_fit", "pull"));
            for r in largest_pulls(&residuals, TOP_PULLS) {
                out.push_str(&format!(
                    "{:>8.2} {:>14} {:>10.4} {:>8.2}\n",
                    r.x,
                    fmt_uncertain(r.y_obs, r.y_sdev),
                    r.y_fit,
                    r.pull
                ));
            }
        }
        None => out.push_str("\nFit: skipped\n"),
    }

    Ok(out)
}

/// Short description of an aggregated dataset.
pub fn format_dataset(dataset: &ObservedDataset) -> String {
    let sdev = dataset.sdev();
    let (lo, hi) = sdev
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));

    let corr = dataset.correlation();
    let mut max_corr: f64 = 0.0;
    for i in 0..corr.nrows() {
        for j in 0..i {
            max_corr = max_corr.max(corr[(i, j)].abs());
        }
    }

    format!(
        "Dataset: {} points from {} draws | sdev=[{lo:.4}, {hi:.4}] | max |corr|={max_corr:.3}\n",
        dataset.len(),
        dataset.sample_count()
    )
}

/// Fit diagnostics, parameters and their correlation.
pub fn format_fit(fit: &FitResult) -> String {
    let mut out = String::new();

    out.push_str("Least squares fit:\n");
    out.push_str(&format!(
        "  chi2/dof [dof] = {:.2} [{}]    Q = {:.2}    logL = {:.3}\n",
        fit.chi2_per_dof(),
        fit.dof,
        fit.q,
        fit.log_likelihood
    ));
    if !fit.converged {
        out.push_str("  (did not converge: best estimate so far)\n");
    }

    out.push_str("\nParameters:\n");
    let degrees = fit.values.degrees();
    for (i, (&degree, value)) in degrees.iter().zip(fit.values.values()).enumerate() {
        let start = fit.initial.get(degree).unwrap_or(0.0);
        out.push_str(&format!(
            "{:>10}   {:<16} [ {start} ]\n",
            key_name(degree),
            fmt_uncertain(value, fit.sdev[i])
        ));
    }

    if degrees.len() > 1 {
        out.push_str("\nCorrelation:\n");
        let corr = fit.correlation();
        let mut header = String::from("       ");
        for &d in &degrees {
            header.push_str(&format!("{:>8}", key_name(d)));
        }
        out.push_str(header.trim_end());
        out.push('\n');
        for (i, &d) in degrees.iter().enumerate() {
            let mut row = format!("{:>7}", key_name(d));
            for j in 0..degrees.len() {
                row.push_str(&format!("{:>8.3}", corr[(i, j)]));
            }
            out.push_str(&row);
            out.push('\n');
        }
    }

    out.push_str(&format!(
        "\nSettings:\n  strategy = {}    iterations = {}    svd cut raised {} eigenvalue(s)\n",
        fit.strategy.display_name(),
        fit.iterations,
        fit.svd_modified
    ));
    if !fit.linear.is_empty() {
        let names: Vec<String> = fit.linear.iter().map(|&d| key_name(d)).collect();
        out.push_str(&format!("  linear: {}\n", names.join(", ")));
    }

    out
}

fn fmt_coefficients(pairs: &[(u32, f64)]) -> String {
    let parts: Vec<String> = pairs.iter().map(|&(d, v)| format!("{}={v}", key_name(d))).collect();
    parts.join(", ")
}
