// src/correction.rs

use crate::error::BendError;
use crate::linalg_backends::BackendEigh;
use crate::spectrum::DescendingSpectrum;
use log::trace;
use ndarray::{s, Array1, Array2};

/// Turns a spectrum containing non-positive eigenvalues into a PD candidate matrix.
///
/// Implementations receive the working matrix's spectrum (largest first) and return
/// the reconstructed candidate `V · diag(corrected) · Vᵗ`, which the bending loop
/// then blends into the working matrix.
pub trait SpectrumCorrection {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    fn candidate(
        &self,
        spectrum: &DescendingSpectrum,
        backend: &dyn BackendEigh<f64>,
    ) -> Result<Array2<f64>, BendError>;
}

/// Weighted bending after Jorjani et al. (2003): clip every eigenvalue below
/// `small_positive` up to exactly `small_positive`.
#[derive(Debug, Clone, Copy)]
pub struct ClipCorrection {
    pub small_positive: f64,
}

impl ClipCorrection {
    pub fn corrected_eigenvalues(&self, eigenvalues: &Array1<f64>) -> Array1<f64> {
        let floor = self.small_positive;
        eigenvalues.mapv(|v| if v < floor { floor } else { v })
    }
}

impl SpectrumCorrection for ClipCorrection {
    fn name(&self) -> &'static str {
        "hj"
    }

    fn candidate(
        &self,
        spectrum: &DescendingSpectrum,
        _backend: &dyn BackendEigh<f64>,
    ) -> Result<Array2<f64>, BendError> {
        let corrected = self.corrected_eigenvalues(spectrum.eigenvalues());
        Ok(spectrum.reconstruct_with(&corrected))
    }
}

/// Schaeffer's (2014) smooth remap of the trailing non-positive block.
///
/// With `m` non-positive eigenvalues at the tail, `S = 2·Σ tail`, `Wc = 100·S² + 1`
/// and `p` the smallest positive eigenvalue, each tail value `λ` becomes
/// `p·(S − λ)² / Wc`. If the reconstructed candidate still has non-positive
/// eigenvalues, those are clipped to `p / 10`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchaefferCorrection;

/// Result of remapping one spectrum: the new eigenvalues and the anchor `p`.
#[derive(Debug, Clone)]
pub struct SchaefferRemap {
    pub eigenvalues: Array1<f64>,
    pub anchor: f64,
}

impl SchaefferCorrection {
    /// Remaps the trailing non-positive block of a descending spectrum.
    ///
    /// # Errors
    /// `NoPositiveEigenvalue` when every eigenvalue is non-positive, leaving no anchor.
    pub fn remap(&self, spectrum: &DescendingSpectrum) -> Result<SchaefferRemap, BendError> {
        let n = spectrum.len();
        let m = spectrum.non_positive_count();
        if m == n {
            return Err(BendError::NoPositiveEigenvalue);
        }

        let mut eigenvalues = spectrum.eigenvalues().clone();
        let anchor = eigenvalues[n - m - 1];
        let tail_sum = 2.0 * eigenvalues.slice(s![n - m..]).sum();
        let normalizer = 100.0 * tail_sum * tail_sum + 1.0;
        eigenvalues
            .slice_mut(s![n - m..])
            .mapv_inplace(|v| anchor * (tail_sum - v).powi(2) / normalizer);

        Ok(SchaefferRemap { eigenvalues, anchor })
    }
}

impl SpectrumCorrection for SchaefferCorrection {
    fn name(&self) -> &'static str {
        "lrs"
    }

    fn candidate(
        &self,
        spectrum: &DescendingSpectrum,
        backend: &dyn BackendEigh<f64>,
    ) -> Result<Array2<f64>, BendError> {
        let SchaefferRemap { eigenvalues, anchor } = self.remap(spectrum)?;
        let candidate = spectrum.reconstruct_with(&eigenvalues);

        let check = DescendingSpectrum::decompose(backend, &candidate)?;
        if check.is_positive_definite() {
            return Ok(candidate);
        }

        let fallback = anchor / 10.0;
        trace!(
            "lrs candidate kept {} non-positive eigenvalue(s); clipping them to {:e}",
            check.non_positive_count(),
            fallback
        );
        let clipped = check.eigenvalues().mapv(|v| if v <= 0.0 { fallback } else { v });
        Ok(check.reconstruct_with(&clipped))
    }
}
