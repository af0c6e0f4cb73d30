// src/spectrum.rs

use crate::error::BendError;
use crate::linalg_backends::{BackendEigh, EighOutput};
use ndarray::{Array1, Array2, Axis};

/// Reorders the columns of a 2D array (`Array2`) based on a given slice of indices.
/// Returns a new owned `Array2<T>` with columns in the specified order.
///
/// # Panics
/// Panics if any index in `order` is out of bounds for the columns of `matrix`.
pub fn reorder_columns_owned<T: Clone>(matrix: &Array2<T>, order: &[usize]) -> Array2<T> {
    matrix.select(Axis(1), order)
}

/// Reorders the elements of a 1D array (`Array1`) based on a given slice of indices.
///
/// # Panics
/// Panics if any index in `order` is out of bounds for `array`.
pub fn reorder_array_owned<T: Clone>(array: &Array1<T>, order: &[usize]) -> Array1<T> {
    order.iter().map(|&i| array[i].clone()).collect()
}

/// Eigenpairs of a symmetric matrix, ordered by eigenvalue, largest first.
///
/// The trailing-block arithmetic of the lrs correction depends on this ordering,
/// so a `DescendingSpectrum` can only be built through [`DescendingSpectrum::decompose`]
/// or [`DescendingSpectrum::from_eigh`], both of which sort and check the result
/// regardless of what order the backend returned.
#[derive(Debug, Clone)]
pub struct DescendingSpectrum {
    eigenvalues: Array1<f64>,
    /// Column `i` pairs with `eigenvalues[i]`.
    eigenvectors: Array2<f64>,
}

impl DescendingSpectrum {
    /// Decomposes `matrix` with `backend` and sorts the eigenpairs largest first.
    pub fn decompose<B>(backend: &B, matrix: &Array2<f64>) -> Result<Self, BendError>
    where
        B: BackendEigh<f64> + ?Sized,
    {
        let output = backend.eigh_upper(matrix)?;
        Self::from_eigh(output)
    }

    /// Builds a descending spectrum from raw backend output in any order.
    ///
    /// # Errors
    /// Returns `NonFiniteSpectrum` if an eigenvalue is NaN or infinite, since such a
    /// value has no place in a total order.
    pub fn from_eigh(output: EighOutput<f64>) -> Result<Self, BendError> {
        let EighOutput { eigenvalues, eigenvectors } = output;
        if let Some(index) = eigenvalues.iter().position(|v| !v.is_finite()) {
            return Err(BendError::NonFiniteSpectrum { index });
        }

        let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

        let spectrum = Self {
            eigenvalues: reorder_array_owned(&eigenvalues, &order),
            eigenvectors: reorder_columns_owned(&eigenvectors, &order),
        };
        debug_assert!(spectrum.is_descending());
        Ok(spectrum)
    }

    fn is_descending(&self) -> bool {
        self.eigenvalues.windows(2).into_iter().all(|w| w[0] >= w[1])
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Eigenvalues, largest first.
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn eigenvectors(&self) -> &Array2<f64> {
        &self.eigenvectors
    }

    /// Smallest eigenvalue, or `None` for an empty spectrum.
    pub fn smallest(&self) -> Option<f64> {
        self.eigenvalues.last().copied()
    }

    /// Number of eigenvalues `<= 0`. These always form the trailing block.
    pub fn non_positive_count(&self) -> usize {
        self.eigenvalues.iter().rev().take_while(|&&v| v <= 0.0).count()
    }

    pub fn is_positive_definite(&self) -> bool {
        self.non_positive_count() == 0
    }

    /// Reconstructs `V · diag(eigenvalues) · Vᵗ` with this spectrum's eigenvectors.
    ///
    /// The product is averaged with its transpose so the result is symmetric to the bit,
    /// not just up to rounding.
    pub fn reconstruct_with(&self, eigenvalues: &Array1<f64>) -> Array2<f64> {
        let scaled = &self.eigenvectors * &eigenvalues.view().insert_axis(Axis(0));
        let product = scaled.dot(&self.eigenvectors.t());
        (&product + &product.t()) * 0.5
    }

    pub fn into_eigenvalues(self) -> Array1<f64> {
        self.eigenvalues
    }
}
