// src/validation.rs

use crate::error::BendError;
use float_cmp::approx_eq;
use ndarray::Array2;

/// Tolerance for `|a[i,j] - a[j,i]|`, scaled by `max(1, max |a|)` of the matrix under test.
pub const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Absolute tolerance for a diagonal entry to count as exactly 1 when classifying
/// a matrix as a correlation matrix.
pub const CORRELATION_DIAGONAL_TOLERANCE: f64 = 1e-10;

/// Allowed open interval for `small_positive` under the hj strategy.
pub const SMALL_POSITIVE_RANGE: (f64, f64) = (0.0, 0.1);

/// Checks that `matrix` is non-empty, square, finite and symmetric.
pub fn validate_square_symmetric(name: &'static str, matrix: &Array2<f64>) -> Result<(), BendError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(BendError::NotSquare { name, rows, cols });
    }
    if rows == 0 {
        return Err(BendError::EmptyMatrix { name });
    }
    if let Some(((row, col), &value)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(BendError::NonFiniteEntry { name, row, col, value });
    }

    let scale = matrix.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let epsilon = SYMMETRY_TOLERANCE * scale;
    for row in 0..rows {
        for col in (row + 1)..cols {
            let (upper, lower) = (matrix[[row, col]], matrix[[col, row]]);
            if !approx_eq!(f64, upper, lower, epsilon = epsilon) {
                return Err(BendError::Asymmetric {
                    name,
                    row,
                    col,
                    difference: (upper - lower).abs(),
                });
            }
        }
    }
    Ok(())
}

/// Checks a weight matrix against the input matrix's shape, then for symmetry and sign.
pub fn validate_weights(weights: &Array2<f64>, input_dim: (usize, usize)) -> Result<(), BendError> {
    let (weight_rows, weight_cols) = weights.dim();
    if (weight_rows, weight_cols) != input_dim {
        return Err(BendError::ShapeMismatch {
            rows: input_dim.0,
            cols: input_dim.1,
            weight_rows,
            weight_cols,
        });
    }
    validate_square_symmetric("wtmat", weights)?;
    if let Some(((row, col), &value)) = weights.indexed_iter().find(|(_, v)| **v < 0.0) {
        return Err(BendError::NegativeWeight { row, col, value });
    }
    Ok(())
}

/// Checks that `small_positive` lies in the open interval (0, 0.1).
pub fn validate_small_positive(small_positive: f64) -> Result<(), BendError> {
    let (low, high) = SMALL_POSITIVE_RANGE;
    if small_positive.is_finite() && small_positive > low && small_positive < high {
        Ok(())
    } else {
        Err(BendError::OutOfRange {
            parameter: "small_positive",
            value: small_positive,
            allowed: "(0, 0.1)",
        })
    }
}

/// A matrix is treated as a correlation matrix iff every diagonal entry is 1
/// within [`CORRELATION_DIAGONAL_TOLERANCE`].
pub fn is_correlation_matrix(matrix: &Array2<f64>) -> bool {
    matrix
        .diag()
        .iter()
        .all(|&d| approx_eq!(f64, d, 1.0, epsilon = CORRELATION_DIAGONAL_TOLERANCE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rejects_non_square() {
        let m = Array2::<f64>::zeros((2, 3));
        let err = validate_square_symmetric("inmat", &m).unwrap_err();
        assert!(matches!(err, BendError::NotSquare { rows: 2, cols: 3, .. }));
    }

    #[test]
    fn test_rejects_empty() {
        let m = Array2::<f64>::zeros((0, 0));
        assert!(matches!(
            validate_square_symmetric("inmat", &m),
            Err(BendError::EmptyMatrix { name: "inmat" })
        ));
    }

    #[test]
    fn test_rejects_asymmetric_and_reports_location() {
        let m = array![[1.0, 0.5, 0.1], [0.5, 1.0, 0.2], [0.1, 0.3, 1.0]];
        match validate_square_symmetric("inmat", &m) {
            Err(BendError::Asymmetric { row, col, .. }) => assert_eq!((row, col), (1, 2)),
            other => panic!("expected Asymmetric, got {:?}", other),
        }
    }

    #[test]
    fn test_symmetry_tolerance_scales_with_magnitude() {
        // A 1e-9 discrepancy is rounding noise on entries of order 1e4.
        let m = array![[1.0e4, 9.5e3 + 1e-9], [9.5e3, 1.0e4]];
        assert!(validate_square_symmetric("inmat", &m).is_ok());
        let small = array![[1.0, 0.5 + 1e-6], [0.5, 1.0]];
        assert!(validate_square_symmetric("inmat", &small).is_err());
    }

    #[test]
    fn test_rejects_nan_entry() {
        let m = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
        assert!(matches!(
            validate_square_symmetric("inmat", &m),
            Err(BendError::NonFiniteEntry { row: 0, col: 1, .. })
        ));
    }

    #[test]
    fn test_weight_shape_mismatch() {
        let w = Array2::<f64>::ones((2, 2));
        assert!(matches!(
            validate_weights(&w, (3, 3)),
            Err(BendError::ShapeMismatch { weight_rows: 2, rows: 3, .. })
        ));
    }

    #[test]
    fn test_negative_weight() {
        let w = array![[1.0, -0.5], [-0.5, 1.0]];
        assert!(matches!(
            validate_weights(&w, (2, 2)),
            Err(BendError::NegativeWeight { row: 0, col: 1, .. })
        ));
    }

    #[test]
    fn test_small_positive_range() {
        assert!(validate_small_positive(0.0001).is_ok());
        assert!(validate_small_positive(0.0).is_err());
        assert!(validate_small_positive(0.1).is_err());
        assert!(validate_small_positive(-1e-3).is_err());
        assert!(validate_small_positive(f64::NAN).is_err());
    }

    #[test]
    fn test_correlation_classification() {
        assert!(is_correlation_matrix(&array![[1.0, 0.9], [0.9, 1.0]]));
        assert!(is_correlation_matrix(&array![[1.0 + 1e-12, 0.9], [0.9, 1.0]]));
        assert!(!is_correlation_matrix(&array![[1.0, 0.9], [0.9, 1.01]]));
        assert!(!is_correlation_matrix(&array![[100.0, 95.0], [95.0, 100.0]]));
    }
}
