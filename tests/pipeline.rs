//! End-to-end runs of the sample -> aggregate -> fit pipeline.

use approx::assert_relative_eq;
use nalgebra::DMatrix;

use polyfit_noise::app::pipeline::{BAND_STEP, run};
use polyfit_noise::data::{aggregate, sample};
use polyfit_noise::domain::{Coefficients, Grid, RunConfig, StrategyKind};
use polyfit_noise::error::Error;
use polyfit_noise::fit::{FitOptions, fit};
use polyfit_noise::models::evaluate_grid;

fn seeded(seed: u64) -> RunConfig {
    RunConfig {
        seed: Some(seed),
        ..RunConfig::default()
    }
}

#[test]
fn noisy_line_is_recovered_within_its_uncertainty() {
    for seed in [1, 2, 3] {
        let out = run(&seeded(seed)).unwrap();
        let fit = out.fit.as_ref().unwrap();

        assert!(fit.converged);
        assert_eq!(fit.dof, 49);
        assert_eq!(fit.strategy, StrategyKind::LevenbergMarquardt);
        for (degree, truth) in [(0, 1.5), (1, -0.3)] {
            let value = fit.values.get(degree).unwrap();
            let sdev = fit.sdev_of(degree).unwrap();
            assert!(sdev > 0.0);
            assert!((value - truth).abs() < 6.0 * sdev, "seed {seed}: p_{degree} = {value} ± {sdev}");
        }
        assert!(fit.chi2.is_finite() && fit.q >= 0.0 && fit.q <= 1.0);
    }
}

#[test]
fn zero_noise_run_recovers_the_truth_exactly() {
    let config = RunConfig {
        noise_width: 0.0,
        ..seeded(5)
    };
    let out = run(&config).unwrap();
    let fit = out.fit.unwrap();

    assert_relative_eq!(fit.values.get(0).unwrap(), 1.5, epsilon = 1e-9);
    assert_relative_eq!(fit.values.get(1).unwrap(), -0.3, epsilon = 1e-9);
    assert!(fit.sdev.iter().all(|&s| s < 1e-4), "{:?}", fit.sdev);
    assert_eq!(fit.svd_modified, 51);
}

#[test]
fn overfitting_zero_noise_data_keeps_the_extra_term_at_zero() {
    let config = RunConfig {
        noise_width: 0.0,
        fit_degree: 2,
        ..seeded(5)
    };
    let fit = run(&config).unwrap().fit.unwrap();
    let p2 = fit.values.get(2).unwrap();
    let s2 = fit.sdev_of(2).unwrap();
    assert!(p2.abs() <= s2, "p_2 = {p2} ± {s2}");
}

#[test]
fn overfitting_ten_noise_free_draws_keeps_the_extra_term_at_zero() {
    let config = RunConfig {
        noise_width: 0.0,
        fit_degree: 2,
        sample_count: 10,
        ..seeded(5)
    };
    let out = run(&config).unwrap();
    assert_eq!(out.dataset.sample_count(), 10);

    let fit = out.fit.unwrap();
    assert_relative_eq!(fit.values.get(0).unwrap(), 1.5, epsilon = 1e-9);
    assert_relative_eq!(fit.values.get(1).unwrap(), -0.3, epsilon = 1e-9);
    let p2 = fit.values.get(2).unwrap();
    let s2 = fit.sdev_of(2).unwrap();
    assert!(p2.abs() <= s2, "p_2 = {p2} ± {s2}");
}

#[test]
fn quadratic_data_with_linear_subset_matches_the_full_fit() {
    let base = RunConfig {
        data_degree: 2,
        fit_degree: 2,
        ..seeded(9)
    };
    let lm = run(&base).unwrap().fit.unwrap();
    let vp = run(&RunConfig {
        use_linear_subset: true,
        ..base
    })
    .unwrap()
    .fit
    .unwrap();

    assert_eq!(vp.strategy, StrategyKind::VariableProjection);
    assert_eq!(vp.iterations, 0);
    for ((a, b), s) in lm.values.values().iter().zip(vp.values.values()).zip(&lm.sdev) {
        assert!((a - b).abs() <= 1e-3 * s, "{a} vs {b} (sdev {s})");
    }
    assert_relative_eq!(lm.chi2, vp.chi2, max_relative = 1e-6);
}

#[test]
fn same_seed_gives_identical_runs() {
    let a = run(&seeded(11)).unwrap();
    let b = run(&seeded(11)).unwrap();
    assert_eq!(a.dataset, b.dataset);
    let (fa, fb) = (a.fit.unwrap(), b.fit.unwrap());
    assert_eq!(fa.values, fb.values);
    assert_eq!(fa.covariance, fb.covariance);
}

#[test]
fn one_draw_is_insufficient() {
    let config = RunConfig {
        sample_count: 1,
        ..seeded(1)
    };
    assert!(matches!(run(&config), Err(Error::InsufficientSamples { count: 1 })));

    let draws = sample(&Grid::default(), 0.0, 1.0, 1, Some(1)).unwrap();
    assert!(matches!(aggregate(draws.values()), Err(Error::InsufficientSamples { count: 1 })));
}

#[test]
fn invalid_degrees_are_configuration_errors() {
    let too_high = RunConfig {
        data_degree: 3,
        ..seeded(1)
    };
    let err = run(&too_high).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn strict_covariance_mode_rejects_noise_free_data() {
    let config = RunConfig {
        noise_width: 0.0,
        fit_options: FitOptions {
            svd_cut: None,
            ..FitOptions::default()
        },
        ..seeded(1)
    };
    let err = run(&config).unwrap_err();
    assert!(matches!(err, Error::SingularCovariance(_)));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn iteration_budget_exhaustion_returns_the_best_estimate() {
    // Start far from the minimum of a cubic fit so one iteration cannot finish.
    let grid = Grid::default();
    let truth = Coefficients::new([(0, 1.5), (1, -0.3), (2, 0.04)]).unwrap();
    let draws = sample(&grid, 0.0, 0.1, 50, Some(4)).unwrap();
    let samples = draws.with_signal(&evaluate_grid(grid.points(), &truth)).unwrap();
    let dataset = aggregate(&samples).unwrap();
    let start = Coefficients::new([(0, 100.0), (1, 50.0), (2, -20.0), (3, 5.0)]).unwrap();
    let options = FitOptions {
        max_iterations: 1,
        ..FitOptions::default()
    };

    match fit(&grid, &dataset, &start, &[], &options) {
        Err(Error::NonConvergentFit(best)) => {
            assert!(!best.converged);
            assert_eq!(best.iterations, 1);
            assert_eq!(best.values.degrees(), vec![0, 1, 2, 3]);
        }
        other => panic!("expected a non-convergent fit, got {other:?}"),
    }
}

#[test]
fn fit_band_brackets_the_fitted_curve() {
    let out = run(&seeded(21)).unwrap();
    let band = out.fit_band(BAND_STEP).unwrap().unwrap();
    let fit = out.fit.as_ref().unwrap();

    assert_eq!(band.xs.len(), 101);
    assert_relative_eq!(band.xs[100], 10.0, epsilon = 1e-9);
    let (lo, hi) = band.values.band();
    for (i, &x) in band.xs.iter().enumerate() {
        let y = fit.values.get(0).unwrap() + fit.values.get(1).unwrap() * x;
        assert_relative_eq!(band.mean()[i], y, epsilon = 1e-12, max_relative = 1e-12);
        assert!(lo[i] < y && y < hi[i]);
    }
}

#[test]
fn aggregated_covariance_keeps_cross_point_terms() {
    let out = run(&RunConfig {
        run_fit: false,
        ..seeded(2)
    })
    .unwrap();
    let cov: &DMatrix<f64> = out.dataset.covariance();
    assert_eq!(cov.nrows(), 51);
    assert_eq!(cov, &cov.transpose());
    let off_diagonal = (0..51).flat_map(|i| (0..i).map(move |j| (i, j))).filter(|&(i, j)| cov[(i, j)] != 0.0).count();
    assert!(off_diagonal > 0);
    // Var of the mean of N(0, 1) over 100 draws is 0.01.
    let mean_var = cov.diagonal().mean();
    assert!((mean_var - 0.01).abs() < 0.003, "{mean_var}");
}
