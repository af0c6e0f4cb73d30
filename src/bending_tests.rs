// src/bending_tests.rs
#![cfg(test)]
use crate::bending::*;
use crate::error::BendError;
use crate::linalg_backends::{BackendEigh, EighOutput, NdarrayLinAlgBackend, ThreadSafeStdError};
use crate::observer::RecordingObserver;
use crate::utils::covariance_to_correlation;
use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array2, Axis};

const EIGENVALUE_SLACK: f64 = 1e-9;

/// Banded 5x5 covariance with two negative eigenvalues.
fn banded_covariance() -> Array2<f64> {
    array![
        [100.0, 95.0, 80.0, 40.0, 40.0],
        [95.0, 100.0, 95.0, 80.0, 40.0],
        [80.0, 95.0, 100.0, 95.0, 80.0],
        [40.0, 80.0, 95.0, 100.0, 95.0],
        [40.0, 40.0, 80.0, 95.0, 100.0]
    ]
}

/// Precision-like weights (larger = more trusted), meant for `reciprocal = true`.
fn precision_weights() -> Array2<f64> {
    array![
        [1000.0, 500.0, 20.0, 50.0, 200.0],
        [500.0, 1000.0, 500.0, 5.0, 50.0],
        [20.0, 500.0, 1000.0, 20.0, 20.0],
        [50.0, 5.0, 20.0, 1000.0, 200.0],
        [200.0, 50.0, 20.0, 200.0, 1000.0]
    ]
}

fn fixed_leading_block() -> Array2<f64> {
    let mut w = Array2::<f64>::ones((5, 5));
    w.slice_mut(s![0..2, 0..2]).fill(0.0);
    w
}

fn config(method: BendMethod) -> BendConfig {
    BendConfig { method, ..BendConfig::default() }
}

/// Backend returning eigenpairs largest-first instead of LAPACK's ascending order.
struct DescendingOrderBackend;

impl BackendEigh<f64> for DescendingOrderBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        let out = NdarrayLinAlgBackend.eigh_upper(matrix)?;
        let order: Vec<usize> = (0..out.eigenvalues.len()).rev().collect();
        Ok(EighOutput {
            eigenvalues: out.eigenvalues.select(Axis(0), &order),
            eigenvectors: out.eigenvectors.select(Axis(1), &order),
        })
    }
}

/// Backend that always fails, to check error propagation.
struct FailingBackend;

impl BackendEigh<f64> for FailingBackend {
    fn eigh_upper(&self, _matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        Err("LAPACK exploded".into())
    }
}

#[test]
fn test_banded_covariance_hj_converges_in_one_iteration() {
    let v = banded_covariance();
    let result = MatrixBender::new(BendConfig::default()).bend(&v, None).unwrap();

    assert_eq!(result.outcome, BendOutcome::Converged { iterations: 1 });
    assert!(!result.is_correlation);
    assert_eq!(result.initial_eigenvalues.iter().filter(|&&ev| ev < 0.0).count(), 2);
    for &ev in result.final_eigenvalues.iter() {
        assert!(ev >= DEFAULT_SMALL_POSITIVE - EIGENVALUE_SLACK, "eigenvalue {} below floor", ev);
    }
    // Input eigenvalues are reported largest first.
    assert!(result.initial_eigenvalues.windows(2).into_iter().all(|w| w[0] >= w[1]));
    assert!(result.weighted_deviation.is_none());
}

#[test]
fn test_banded_covariance_lrs_converges() {
    let v = banded_covariance();
    let result = MatrixBender::new(config(BendMethod::Lrs)).bend(&v, None).unwrap();
    assert_eq!(result.outcome, BendOutcome::Converged { iterations: 1 });
    assert!(result.final_eigenvalues.iter().all(|&ev| ev > 0.0));
    assert_eq!(result.method, BendMethod::Lrs);
}

#[test]
fn test_fixed_block_is_reproduced_exactly() {
    let v = banded_covariance();
    let w = fixed_leading_block();
    for method in [BendMethod::Hj, BendMethod::Lrs] {
        let result = MatrixBender::new(config(method)).bend(&v, Some(&w)).unwrap();
        assert!(result.is_converged(), "{} did not converge", method);
        assert_eq!(result.bent.slice(s![0..2, 0..2]), v.slice(s![0..2, 0..2]));
        assert!(result.final_eigenvalues.iter().all(|&ev| ev > 0.0));
    }
}

#[test]
fn test_precision_weighted_run_reports_weighted_stats() {
    let v = banded_covariance();
    let w = precision_weights();
    let cfg = BendConfig { reciprocal: true, ..BendConfig::default() };
    let result = MatrixBender::new(cfg).bend(&v, Some(&w)).unwrap();

    assert!(result.is_converged());
    assert!(result.iterations() > 1);
    let weighted = result.weighted_deviation.as_ref().expect("weighted run should report weighted stats");
    assert_eq!(weighted.w_gt_0, 15);
    assert!(weighted.waad >= 0.0);
    assert!(weighted.wrmsd >= weighted.waad - 1e-12);
    assert!(weighted.wcor > 0.9);
}

#[test]
fn test_correlation_diagonal_survives_every_method_and_weighting() {
    let cor = covariance_to_correlation(&banded_covariance()).unwrap();
    let w = precision_weights();
    for method in [BendMethod::Hj, BendMethod::Lrs] {
        for weights in [None, Some(&w)] {
            let cfg = BendConfig { method, reciprocal: weights.is_some(), ..BendConfig::default() };
            let result = MatrixBender::new(cfg).bend(&cor, weights).unwrap();
            assert!(result.is_correlation);
            assert!(result.is_converged());
            assert_eq!(result.bent.diag().to_vec(), vec![1.0; 5]);
            if let Some(weighted) = &result.weighted_deviation {
                // Diagonal entries are excluded from all statistics.
                assert_eq!(weighted.w_gt_0, 10);
            }
        }
    }
}

#[test]
fn test_exhausted_budget_returns_best_effort_matrix() {
    let v = banded_covariance();
    let w = precision_weights();
    let cfg = BendConfig { reciprocal: true, max_iter: 1, ..BendConfig::default() };
    let result = MatrixBender::new(cfg).bend(&v, Some(&w)).unwrap();

    assert_eq!(result.outcome, BendOutcome::Exhausted { iterations: 1 });
    assert!(!result.is_converged());
    assert_ne!(result.bent, v);
    assert!(result.final_eigenvalues.iter().any(|&ev| ev <= 0.0));
}

#[test]
fn test_rebending_a_bent_matrix_is_a_no_op() {
    let v = banded_covariance();
    let bender = MatrixBender::new(BendConfig::default());
    let first = bender.bend(&v, None).unwrap();
    let second = bender.bend(&first.bent, None).unwrap();

    assert_eq!(second.outcome, BendOutcome::AlreadyPositiveDefinite);
    assert_eq!(second.iterations(), 0);
    assert_eq!(second.bent, first.bent);
    assert_eq!(second.deviation.rmsd, 0.0);
    assert_eq!(second.deviation.max_dev, 0.0);
}

#[test]
fn test_already_pd_error_policy() {
    let m = array![[2.0, 0.5], [0.5, 1.0]];
    let cfg = BendConfig { already_pd_policy: AlreadyPdPolicy::Error, ..BendConfig::default() };
    match MatrixBender::new(cfg).bend(&m, None) {
        Err(BendError::AlreadyPositiveDefinite { smallest_eigenvalue }) => assert!(smallest_eigenvalue > 0.0),
        other => panic!("expected AlreadyPositiveDefinite, got {:?}", other),
    }
}

#[test]
fn test_validation_errors_come_before_any_decomposition() {
    // The failing backend would error on the first eigendecomposition, so every
    // validation error below proves no decomposition was attempted.
    let bender = MatrixBender::with_backend(BendConfig::default(), FailingBackend);
    let v = banded_covariance();

    assert!(matches!(
        bender.bend(&Array2::zeros((2, 3)), None),
        Err(BendError::NotSquare { .. })
    ));

    let mut asym = v.clone();
    asym[[0, 4]] += 1.0;
    assert!(matches!(bender.bend(&asym, None), Err(BendError::Asymmetric { .. })));

    let w = Array2::<f64>::ones((4, 4));
    assert!(matches!(bender.bend(&v, Some(&w)), Err(BendError::ShapeMismatch { .. })));

    let mut w = Array2::<f64>::ones((5, 5));
    w[[1, 2]] = 2.0;
    assert!(matches!(
        bender.bend(&v, Some(&w)),
        Err(BendError::Asymmetric { name: "wtmat", .. })
    ));

    let mut w = Array2::<f64>::ones((5, 5));
    w[[3, 3]] = -1.0;
    assert!(matches!(bender.bend(&v, Some(&w)), Err(BendError::NegativeWeight { row: 3, col: 3, .. })));

    let bad = MatrixBender::with_backend(BendConfig { small_positive: 0.2, ..BendConfig::default() }, FailingBackend);
    assert!(matches!(bad.bend(&v, None), Err(BendError::OutOfRange { parameter: "small_positive", .. })));

    // Reaching the backend surfaces its error as Decomposition.
    match bender.bend(&v, None) {
        Err(err @ BendError::Decomposition { .. }) => assert!(err.to_string().contains("LAPACK exploded")),
        other => panic!("expected Decomposition, got {:?}", other),
    }
}

#[test]
fn test_zero_weights_on_a_non_pd_matrix_have_nothing_to_move() {
    let w = Array2::<f64>::zeros((5, 5));
    assert!(matches!(
        MatrixBender::new(BendConfig::default()).bend(&banded_covariance(), Some(&w)),
        Err(BendError::AllWeightsZero)
    ));
}

#[test]
fn test_fixed_weights_do_not_block_already_pd_input() {
    // A 1x1 correlation matrix only has its fixed unit diagonal.
    let one = array![[1.0]];
    let result = MatrixBender::new(BendConfig::default()).bend(&one, None).unwrap();
    assert_eq!(result.outcome, BendOutcome::AlreadyPositiveDefinite);
    assert_eq!(result.bent, one);

    let pd = array![[2.0, 0.0], [0.0, 1.0]];
    let zeros = Array2::<f64>::zeros((2, 2));
    for method in [BendMethod::Hj, BendMethod::Lrs] {
        let result = MatrixBender::new(config(method)).bend(&pd, Some(&zeros)).unwrap();
        assert_eq!(result.outcome, BendOutcome::AlreadyPositiveDefinite);
        assert_eq!(result.iterations(), 0);
        assert_eq!(result.bent, pd);
    }
}

#[test]
fn test_correlation_with_only_diagonal_weights_has_nothing_to_move() {
    let cor = covariance_to_correlation(&banded_covariance()).unwrap();
    let w = Array2::<f64>::eye(5);
    assert!(matches!(
        MatrixBender::new(BendConfig::default()).bend(&cor, Some(&w)),
        Err(BendError::AllWeightsZero)
    ));
}

#[test]
fn test_lrs_ignores_small_positive() {
    let v = banded_covariance();
    let cfg = BendConfig { method: BendMethod::Lrs, small_positive: 5.0, ..BendConfig::default() };
    let result = MatrixBender::new(cfg).bend(&v, None).unwrap();
    let reference = MatrixBender::new(config(BendMethod::Lrs)).bend(&v, None).unwrap();
    assert_eq!(result.bent, reference.bent);
}

#[test]
fn test_result_does_not_depend_on_backend_eigen_order() {
    let v = banded_covariance();
    let w = fixed_leading_block();
    for method in [BendMethod::Hj, BendMethod::Lrs] {
        let ascending = MatrixBender::new(config(method)).bend(&v, Some(&w)).unwrap();
        let descending = MatrixBender::with_backend(config(method), DescendingOrderBackend)
            .bend(&v, Some(&w))
            .unwrap();
        assert_eq!(ascending.outcome, descending.outcome);
        for (a, b) in ascending.bent.iter().zip(descending.bent.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_observer_sees_every_iteration_and_the_outcome() {
    let v = banded_covariance();
    let w = fixed_leading_block();
    let mut observer = RecordingObserver::default();
    let result = MatrixBender::new(BendConfig::default())
        .bend_with_observer(&v, Some(&w), &mut observer)
        .unwrap();

    assert_eq!(observer.iterations.len(), result.iterations());
    for (i, progress) in observer.iterations.iter().enumerate() {
        assert_eq!(progress.iteration, i + 1);
        assert_eq!(progress.max_iter, DEFAULT_MAX_ITER);
    }
    let last = observer.iterations.last().unwrap();
    assert_eq!(last.non_positive_count, 0);
    assert!(last.smallest_eigenvalue > 0.0);
    assert_eq!(observer.outcome, Some(result.outcome));
}

#[test]
fn test_observer_is_told_when_nothing_is_needed() {
    let mut observer = RecordingObserver::default();
    MatrixBender::new(BendConfig::default())
        .bend_with_observer(&Array2::eye(3), None, &mut observer)
        .unwrap();
    assert!(observer.iterations.is_empty());
    assert_eq!(observer.outcome, Some(BendOutcome::AlreadyPositiveDefinite));
}

#[test]
fn test_deviation_stats_match_the_bent_matrix() {
    let v = banded_covariance();
    let result = MatrixBender::new(BendConfig::default()).bend(&v, None).unwrap();
    let d = &result.bent - &v;
    let stats = &result.deviation;

    let (r, c) = stats.loc_min_dev;
    assert!(c >= r);
    assert_eq!(stats.min_dev, d[[r, c]]);
    let (r, c) = stats.loc_max_dev;
    assert_eq!(stats.max_dev, d[[r, c]]);
    for row in 0..5 {
        for col in row..5 {
            assert!(d[[row, col]] >= stats.min_dev && d[[row, col]] <= stats.max_dev);
        }
    }
    assert!(stats.aad >= stats.mean_dev.abs());
    assert!(stats.rmsd >= stats.aad);
    assert!(stats.cor > 0.9 && stats.cor <= 1.0 + 1e-12);
}

#[test]
fn test_free_function_matches_bender() {
    let v = banded_covariance();
    let cfg = config(BendMethod::Hj);
    let via_fn = bend(&v, None, &cfg).unwrap();
    let via_struct = MatrixBender::new(cfg).bend(&v, None).unwrap();
    assert_eq!(via_fn.bent, via_struct.bent);
}

#[test]
fn test_config_and_outcome_serde() {
    let cfg = BendConfig { method: BendMethod::Lrs, reciprocal: true, ..BendConfig::default() };
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"method\":\"lrs\""));
    let back: BendConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);

    let outcome = serde_json::to_value(BendOutcome::Converged { iterations: 4 }).unwrap();
    assert_eq!(outcome, serde_json::json!({ "status": "converged", "iterations": 4 }));
}
