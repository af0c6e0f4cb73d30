// src/bending.rs

use crate::correction::{ClipCorrection, SchaefferCorrection, SpectrumCorrection};
use crate::error::BendError;
use crate::fit_stats::{deviation_stats, weighted_deviation_stats, DeviationStats, WeightedDeviationStats};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use crate::observer::{BendObserver, IterationProgress, LoggingObserver};
use crate::spectrum::DescendingSpectrum;
use crate::validation::{is_correlation_matrix, validate_small_positive, validate_square_symmetric, validate_weights};
use crate::weights::CanonicalWeights;
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default iteration budget.
pub const DEFAULT_MAX_ITER: usize = 10_000;
/// Default eigenvalue floor for the hj method.
pub const DEFAULT_SMALL_POSITIVE: f64 = 0.0001;
/// Default number of iterations between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1_000;

/// Eigenvalue correction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BendMethod {
    /// Weighted bending (Jorjani et al., 2003): clip eigenvalues up to `small_positive`.
    #[default]
    Hj,
    /// Schaeffer (2014): smooth remap of the negative tail; `small_positive` is unused.
    Lrs,
}

impl BendMethod {
    fn correction(self, small_positive: f64) -> Box<dyn SpectrumCorrection> {
        match self {
            BendMethod::Hj => Box::new(ClipCorrection { small_positive }),
            BendMethod::Lrs => Box::new(SchaefferCorrection),
        }
    }
}

impl fmt::Display for BendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BendMethod::Hj => f.write_str("hj"),
            BendMethod::Lrs => f.write_str("lrs"),
        }
    }
}

impl FromStr for BendMethod {
    type Err = BendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hj" => Ok(BendMethod::Hj),
            "lrs" => Ok(BendMethod::Lrs),
            _ => Err(BendError::InvalidFlag {
                flag: "method",
                value: s.to_string(),
                expected: "hj, lrs",
            }),
        }
    }
}

/// What to do when the input matrix is already positive definite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlreadyPdPolicy {
    /// Return the input unchanged with [`BendOutcome::AlreadyPositiveDefinite`].
    #[default]
    ReturnUnchanged,
    /// Fail with [`BendError::AlreadyPositiveDefinite`].
    Error,
}

/// Parameters of a bending run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BendConfig {
    /// Use `1/w` for every positive weight before normalization, for weights given
    /// as precision proxies (e.g. sample sizes) rather than as freedom to move.
    pub reciprocal: bool,
    /// Upper bound on iterations; each one costs a full eigendecomposition.
    pub max_iter: usize,
    /// Eigenvalue floor for [`BendMethod::Hj`]; must lie in (0, 0.1).
    /// [`BendMethod::Lrs`] never reads it.
    pub small_positive: f64,
    pub method: BendMethod,
    pub already_pd_policy: AlreadyPdPolicy,
    /// Iterations between progress log lines of the default observer.
    pub progress_interval: usize,
}

impl Default for BendConfig {
    fn default() -> Self {
        BendConfig {
            reciprocal: false,
            max_iter: DEFAULT_MAX_ITER,
            small_positive: DEFAULT_SMALL_POSITIVE,
            method: BendMethod::Hj,
            already_pd_policy: AlreadyPdPolicy::ReturnUnchanged,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl BendConfig {
    /// Checks the scalar parameters. `small_positive` is only checked for hj,
    /// since lrs never reads it.
    pub fn validate(&self) -> Result<(), BendError> {
        if self.max_iter == 0 {
            return Err(BendError::OutOfRange {
                parameter: "max_iter",
                value: 0.0,
                allowed: "[1, inf)",
            });
        }
        if self.progress_interval == 0 {
            return Err(BendError::OutOfRange {
                parameter: "progress_interval",
                value: 0.0,
                allowed: "[1, inf)",
            });
        }
        if self.method == BendMethod::Hj {
            validate_small_positive(self.small_positive)?;
        }
        Ok(())
    }

    /// The configured `small_positive` when the chosen method does not use it.
    pub fn ignored_small_positive(&self) -> Option<f64> {
        match self.method {
            BendMethod::Hj => None,
            BendMethod::Lrs => Some(self.small_positive),
        }
    }
}

/// How a bending run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BendOutcome {
    /// The input had no non-positive eigenvalue; nothing was changed.
    AlreadyPositiveDefinite,
    /// Every eigenvalue of the result is positive.
    Converged { iterations: usize },
    /// `max_iter` was reached with non-positive eigenvalues left. The result is the
    /// last working matrix, not an error.
    Exhausted { iterations: usize },
}

/// Everything a bending run produces. Built once, when the loop exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BendResult {
    /// The bent matrix.
    pub bent: Array2<f64>,
    /// Eigenvalues of the input, largest first.
    pub initial_eigenvalues: Array1<f64>,
    /// Eigenvalues of `bent`, largest first.
    pub final_eigenvalues: Array1<f64>,
    pub outcome: BendOutcome,
    pub method: BendMethod,
    /// Whether the input was classified as a correlation matrix.
    pub is_correlation: bool,
    pub deviation: DeviationStats,
    /// Present only for genuinely weighted runs.
    pub weighted_deviation: Option<WeightedDeviationStats>,
}

impl BendResult {
    /// True when the result is positive definite, either because bending converged
    /// or because the input already was.
    pub fn is_converged(&self) -> bool {
        !matches!(self.outcome, BendOutcome::Exhausted { .. })
    }

    pub fn iterations(&self) -> usize {
        match self.outcome {
            BendOutcome::AlreadyPositiveDefinite => 0,
            BendOutcome::Converged { iterations } | BendOutcome::Exhausted { iterations } => iterations,
        }
    }
}

/// Bends symmetric matrices toward positive definiteness.
///
/// Each iteration corrects the working matrix's spectrum, reconstructs a candidate
/// from it, blends the candidate into the working matrix cell by cell according to
/// the canonical weights, and re-decomposes. The loop stops once no eigenvalue is
/// `<= 0` or after `max_iter` iterations.
///
/// Cells with weight 0 never move. For a correlation matrix (unit diagonal) the
/// diagonal weights are forced to 0, so the unit diagonal is preserved exactly.
#[derive(Debug, Clone)]
pub struct MatrixBender<B = LinAlgBackendProvider<f64>> {
    config: BendConfig,
    backend: B,
}

impl MatrixBender<LinAlgBackendProvider<f64>> {
    /// Creates a bender using the linear-algebra backend selected by cargo features.
    pub fn new(config: BendConfig) -> Self {
        Self { config, backend: LinAlgBackendProvider::new() }
    }
}

impl<B: BackendEigh<f64>> MatrixBender<B> {
    /// Creates a bender with an explicit eigendecomposition backend.
    pub fn with_backend(config: BendConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &BendConfig {
        &self.config
    }

    /// Bends `inmat`, reporting progress through the `log` facade every
    /// `progress_interval` iterations.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `inmat` is empty, not square, not symmetric, or has non-finite entries.
    /// - `wtmat` is given and differs in shape, is not symmetric, or has negative entries.
    /// - the normalized weights are all zero.
    /// - a configuration value is out of range (see [`BendConfig::validate`]).
    /// - `inmat` is already positive definite and the policy is [`AlreadyPdPolicy::Error`].
    /// - the eigendecomposition backend fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use mbend::{BendConfig, MatrixBender};
    /// use ndarray::array;
    ///
    /// let v = array![
    ///     [100.0, 95.0, 80.0, 40.0, 40.0],
    ///     [95.0, 100.0, 95.0, 80.0, 40.0],
    ///     [80.0, 95.0, 100.0, 95.0, 80.0],
    ///     [40.0, 80.0, 95.0, 100.0, 95.0],
    ///     [40.0, 40.0, 80.0, 95.0, 100.0]
    /// ];
    /// let result = MatrixBender::new(BendConfig::default()).bend(&v, None).unwrap();
    /// assert!(result.is_converged());
    /// assert!(result.final_eigenvalues.iter().all(|&ev| ev > 0.0));
    /// ```
    pub fn bend(&self, inmat: &Array2<f64>, wtmat: Option<&Array2<f64>>) -> Result<BendResult, BendError> {
        let mut observer = LoggingObserver::new(self.config.progress_interval);
        self.bend_with_observer(inmat, wtmat, &mut observer)
    }

    /// Same as [`MatrixBender::bend`], with progress delivered to `observer`.
    pub fn bend_with_observer(
        &self,
        inmat: &Array2<f64>,
        wtmat: Option<&Array2<f64>>,
        observer: &mut dyn BendObserver,
    ) -> Result<BendResult, BendError> {
        let config = &self.config;
        config.validate()?;
        validate_square_symmetric("inmat", inmat)?;
        if let Some(w) = wtmat {
            validate_weights(w, inmat.dim())?;
        }

        let n = inmat.nrows();
        let is_correlation = is_correlation_matrix(inmat);
        let weights = CanonicalWeights::from_raw(wtmat, n, config.reciprocal, is_correlation);

        if let Some(small_positive) = config.ignored_small_positive() {
            if small_positive == DEFAULT_SMALL_POSITIVE {
                debug!("small_positive is not used by the lrs method.");
            } else {
                warn!(
                    "small_positive = {} is ignored by the lrs method; the floor is recomputed every iteration.",
                    small_positive
                );
            }
        }

        info!(
            "Bending {}x{} {} matrix with method {} (max_iter={}, weighted={}).",
            n,
            n,
            if is_correlation { "correlation" } else { "covariance" },
            config.method,
            config.max_iter,
            wtmat.is_some()
        );

        // Checking: initial decomposition of the untouched input.
        let mut spectrum = DescendingSpectrum::decompose(&self.backend, inmat)?;
        let initial_eigenvalues = spectrum.eigenvalues().clone();

        if spectrum.is_positive_definite() {
            let smallest_eigenvalue = spectrum.smallest().unwrap_or(f64::NAN);
            if config.already_pd_policy == AlreadyPdPolicy::Error {
                return Err(BendError::AlreadyPositiveDefinite { smallest_eigenvalue });
            }
            let outcome = BendOutcome::AlreadyPositiveDefinite;
            observer.on_finish(&outcome);
            return Ok(self.finish(inmat, inmat.to_owned(), initial_eigenvalues, spectrum, outcome, &weights, is_correlation));
        }
        if weights.all_fixed() {
            return Err(BendError::AllWeightsZero);
        }
        debug!(
            "Initial spectrum has {} non-positive eigenvalue(s); smallest {:e}.",
            spectrum.non_positive_count(),
            spectrum.smallest().unwrap_or(f64::NAN)
        );

        // Iterating: each step yields a new working matrix value.
        let correction = config.method.correction(config.small_positive);
        let mut working = inmat.to_owned();
        let mut iterations = 0;
        while !spectrum.is_positive_definite() && iterations < config.max_iter {
            let candidate = correction.candidate(&spectrum, &self.backend)?;
            working = weights.blend(&working, &candidate);
            spectrum = DescendingSpectrum::decompose(&self.backend, &working)?;
            iterations += 1;

            observer.on_iteration(&IterationProgress {
                iteration: iterations,
                max_iter: config.max_iter,
                non_positive_count: spectrum.non_positive_count(),
                smallest_eigenvalue: spectrum.smallest().unwrap_or(f64::NAN),
            });
        }

        // Done.
        let outcome = if spectrum.is_positive_definite() {
            BendOutcome::Converged { iterations }
        } else {
            BendOutcome::Exhausted { iterations }
        };
        debug!("{} correction finished: {:?}", correction.name(), outcome);
        observer.on_finish(&outcome);
        Ok(self.finish(inmat, working, initial_eigenvalues, spectrum, outcome, &weights, is_correlation))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        inmat: &Array2<f64>,
        bent: Array2<f64>,
        initial_eigenvalues: Array1<f64>,
        spectrum: DescendingSpectrum,
        outcome: BendOutcome,
        weights: &CanonicalWeights,
        is_correlation: bool,
    ) -> BendResult {
        let deviation = deviation_stats(inmat, &bent, is_correlation);
        let weighted_deviation = weighted_deviation_stats(inmat, &bent, weights, is_correlation);
        BendResult {
            bent,
            initial_eigenvalues,
            final_eigenvalues: spectrum.into_eigenvalues(),
            outcome,
            method: self.config.method,
            is_correlation,
            deviation,
            weighted_deviation,
        }
    }
}

/// Bends `inmat` with the default backend and `config`.
///
/// Shorthand for `MatrixBender::new(config.clone()).bend(inmat, wtmat)`.
pub fn bend(inmat: &Array2<f64>, wtmat: Option<&Array2<f64>>, config: &BendConfig) -> Result<BendResult, BendError> {
    MatrixBender::new(config.clone()).bend(inmat, wtmat)
}
