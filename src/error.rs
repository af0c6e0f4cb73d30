use crate::linalg_backends::ThreadSafeStdError;

/// Errors raised while validating inputs or bending a matrix.
///
/// Every validation variant is produced before the first iteration runs, so a
/// returned error never comes with partially bent state.
#[derive(Debug, thiserror::Error)]
pub enum BendError {
    #[error("matrix `{name}` must be square, got {rows}x{cols}")]
    NotSquare { name: &'static str, rows: usize, cols: usize },

    #[error("matrix `{name}` is empty")]
    EmptyMatrix { name: &'static str },

    #[error("weight matrix is {weight_rows}x{weight_cols} but the input matrix is {rows}x{cols}")]
    ShapeMismatch { rows: usize, cols: usize, weight_rows: usize, weight_cols: usize },

    #[error("matrix `{name}` is not symmetric: entries ({row}, {col}) and ({col}, {row}) differ by {difference:e}")]
    Asymmetric { name: &'static str, row: usize, col: usize, difference: f64 },

    #[error("matrix `{name}` has a non-finite entry {value} at ({row}, {col})")]
    NonFiniteEntry { name: &'static str, row: usize, col: usize, value: f64 },

    #[error("weight matrix has negative entry {value} at ({row}, {col})")]
    NegativeWeight { row: usize, col: usize, value: f64 },

    #[error("all weights are zero after normalization; no element is free to move")]
    AllWeightsZero,

    #[error("unknown value `{value}` for `{flag}` (expected one of: {expected})")]
    InvalidFlag { flag: &'static str, value: String, expected: &'static str },

    #[error("`{parameter}` = {value} is outside the allowed range {allowed}")]
    OutOfRange { parameter: &'static str, value: f64, allowed: &'static str },

    #[error("matrix is already positive definite (smallest eigenvalue {smallest_eigenvalue:e})")]
    AlreadyPositiveDefinite { smallest_eigenvalue: f64 },

    #[error("spectrum has no positive eigenvalue to anchor the lrs remap")]
    NoPositiveEigenvalue,

    #[error("eigendecomposition returned a non-finite eigenvalue at position {index}")]
    NonFiniteSpectrum { index: usize },

    #[error("symmetric eigendecomposition failed: {source}")]
    Decomposition {
        #[source]
        source: ThreadSafeStdError,
    },
}

impl From<ThreadSafeStdError> for BendError {
    fn from(source: ThreadSafeStdError) -> Self {
        BendError::Decomposition { source }
    }
}
