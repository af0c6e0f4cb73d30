// src/weights.rs

use ndarray::Array2;

/// Per-element blend coefficients in `[0, 1]`, derived from a raw weight matrix.
///
/// A zero entry marks a "fixed" element that bending must leave untouched; the
/// strongest-weighted element always gets coefficient 1.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalWeights {
    coefficients: Array2<f64>,
}

impl CanonicalWeights {
    /// Builds canonical weights for an `n`x`n` input matrix.
    ///
    /// Missing weights mean unweighted bending (all ones). With `fix_diagonal` the raw
    /// diagonal is zeroed before normalization, so unit variances of a correlation
    /// matrix never move and the strongest off-diagonal pair still gets coefficient 1.
    pub fn from_raw(raw: Option<&Array2<f64>>, n: usize, reciprocal: bool, fix_diagonal: bool) -> Self {
        let mut raw = match raw {
            Some(w) => w.to_owned(),
            None => Array2::ones((n, n)),
        };
        if fix_diagonal {
            raw.diag_mut().fill(0.0);
        }
        Self::normalize(&raw, reciprocal)
    }

    /// Normalizes a validated, non-negative weight matrix.
    ///
    /// With `reciprocal`, every strictly positive entry `w` becomes `1/w` first;
    /// zeros stay zero. The result is averaged with its transpose, so blending keeps
    /// a symmetric working matrix symmetric, then divided by its maximum. An
    /// all-zero matrix is returned unchanged.
    pub fn normalize(raw: &Array2<f64>, reciprocal: bool) -> Self {
        let transformed = if reciprocal {
            raw.mapv(|w| if w > 0.0 { 1.0 / w } else { 0.0 })
        } else {
            raw.to_owned()
        };
        let transformed = (&transformed + &transformed.t()) * 0.5;

        let max = transformed.iter().cloned().fold(0.0_f64, f64::max);
        let coefficients = if max > 0.0 { transformed / max } else { transformed };
        Self { coefficients }
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.coefficients[[row, col]]
    }

    /// True when no element is allowed to move.
    pub fn all_fixed(&self) -> bool {
        self.coefficients.iter().all(|&w| w == 0.0)
    }

    /// True when some coefficient lies strictly between 0 and 1, i.e. the run is
    /// genuinely weighted rather than a mix of fixed and fully free elements.
    pub fn has_partial_weights(&self) -> bool {
        self.coefficients.iter().any(|&w| w > 0.0 && w < 1.0)
    }

    /// `working - (working - candidate) ⊙ weights`, i.e. `old·(1−w) + candidate·w` per cell.
    ///
    /// Cells with weight 0 are returned bit-for-bit unchanged.
    pub fn blend(&self, working: &Array2<f64>, candidate: &Array2<f64>) -> Array2<f64> {
        let step = (working - candidate) * &self.coefficients;
        working - &step
    }
}
