// src/utils.rs

use crate::error::BendError;
use crate::linalg_backends::LinAlgBackendProvider;
use crate::spectrum::DescendingSpectrum;
use crate::validation::validate_square_symmetric;
use ndarray::Array2;

/// Standardizes a covariance matrix to a correlation matrix, `c[i,j] = v[i,j] / sqrt(v[i,i]·v[j,j])`.
///
/// The diagonal is set to exactly 1, so the result is always classified as a
/// correlation matrix by the bender.
///
/// # Errors
/// Fails validation like the bender's input check, and with `OutOfRange` when a
/// variance is not strictly positive.
pub fn covariance_to_correlation(covariance: &Array2<f64>) -> Result<Array2<f64>, BendError> {
    validate_square_symmetric("covariance", covariance)?;
    if let Some(&variance) = covariance.diag().iter().find(|&&v| v <= 0.0) {
        return Err(BendError::OutOfRange {
            parameter: "variance",
            value: variance,
            allowed: "(0, inf)",
        });
    }

    let std_devs = covariance.diag().mapv(f64::sqrt);
    let mut correlation = Array2::from_shape_fn(covariance.dim(), |(i, j)| {
        covariance[[i, j]] / (std_devs[i] * std_devs[j])
    });
    correlation.diag_mut().fill(1.0);
    Ok(correlation)
}

/// True when every eigenvalue of the symmetric `matrix` is strictly positive.
pub fn is_positive_definite(matrix: &Array2<f64>) -> Result<bool, BendError> {
    validate_square_symmetric("matrix", matrix)?;
    let spectrum = DescendingSpectrum::decompose(&LinAlgBackendProvider::<f64>::new(), matrix)?;
    Ok(spectrum.is_positive_definite())
}
