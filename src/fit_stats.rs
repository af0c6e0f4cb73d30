// src/fit_stats.rs

use crate::weights::CanonicalWeights;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Deviation summary between the input matrix and the bent result, computed over
/// the upper triangle (diagonal included only for covariance matrices).
///
/// Locations are 0-based `(row, col)`; ties resolve to the first entry in
/// row-major scan order. With no comparable entries (a 1x1 correlation matrix)
/// every statistic is NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationStats {
    pub min_dev: f64,
    pub loc_min_dev: (usize, usize),
    pub max_dev: f64,
    pub loc_max_dev: (usize, usize),
    /// Signed mean of `bent - input`.
    pub mean_dev: f64,
    /// Mean absolute deviation.
    pub aad: f64,
    /// Pearson correlation between matched input and bent entries.
    pub cor: f64,
    /// Root-mean-square deviation.
    pub rmsd: f64,
}

/// Statistics restricted to entries with canonical weight `> 0`, each entry weighted
/// by `1 / weight`, so the entries that were least free to move dominate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedDeviationStats {
    /// Number of compared entries with weight `> 0`.
    pub w_gt_0: usize,
    pub waad: f64,
    pub wcor: f64,
    pub wrmsd: f64,
}

/// One compared upper-triangle position.
#[derive(Debug, Clone, Copy)]
struct Entry {
    loc: (usize, usize),
    original: f64,
    bent: f64,
}

impl Entry {
    fn deviation(&self) -> f64 {
        self.bent - self.original
    }
}

fn upper_triangle_entries(original: &Array2<f64>, bent: &Array2<f64>, include_diagonal: bool) -> Vec<Entry> {
    let n = original.nrows();
    let mut entries = Vec::with_capacity(n * (n + 1) / 2);
    for row in 0..n {
        let first_col = if include_diagonal { row } else { row + 1 };
        for col in first_col..n {
            entries.push(Entry {
                loc: (row, col),
                original: original[[row, col]],
                bent: bent[[row, col]],
            });
        }
    }
    entries
}

/// Weighted Pearson correlation. Uniform weights give the ordinary coefficient.
/// Returns NaN when either side has zero variance.
pub fn weighted_pearson(x: &[f64], y: &[f64], w: &[f64]) -> f64 {
    let total: f64 = w.iter().sum();
    if x.is_empty() || total <= 0.0 {
        return f64::NAN;
    }
    let mean_x = x.iter().zip(w).map(|(a, wi)| a * wi).sum::<f64>() / total;
    let mean_y = y.iter().zip(w).map(|(b, wi)| b * wi).sum::<f64>() / total;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for ((a, b), wi) in x.iter().zip(y).zip(w) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        sxy += wi * dx * dy;
        sxx += wi * dx * dx;
        syy += wi * dy * dy;
    }
    sxy / (sxx * syy).sqrt()
}

/// Plain deviation statistics over the compared upper triangle.
pub fn deviation_stats(original: &Array2<f64>, bent: &Array2<f64>, is_correlation: bool) -> DeviationStats {
    let entries = upper_triangle_entries(original, bent, !is_correlation);
    summarize(&entries)
}

fn summarize(entries: &[Entry]) -> DeviationStats {
    if entries.is_empty() {
        return DeviationStats {
            min_dev: f64::NAN,
            loc_min_dev: (0, 0),
            max_dev: f64::NAN,
            loc_max_dev: (0, 0),
            mean_dev: f64::NAN,
            aad: f64::NAN,
            cor: f64::NAN,
            rmsd: f64::NAN,
        };
    }

    let mut min = entries[0];
    let mut max = entries[0];
    for entry in &entries[1..] {
        if entry.deviation() < min.deviation() {
            min = *entry;
        }
        if entry.deviation() > max.deviation() {
            max = *entry;
        }
    }

    let count = entries.len() as f64;
    let mean_dev = entries.iter().map(Entry::deviation).sum::<f64>() / count;
    let aad = entries.iter().map(|e| e.deviation().abs()).sum::<f64>() / count;
    let rmsd = (entries.iter().map(|e| e.deviation().powi(2)).sum::<f64>() / count).sqrt();

    let originals: Vec<f64> = entries.iter().map(|e| e.original).collect();
    let bents: Vec<f64> = entries.iter().map(|e| e.bent).collect();
    let cor = weighted_pearson(&originals, &bents, &vec![1.0; entries.len()]);

    DeviationStats {
        min_dev: min.deviation(),
        loc_min_dev: min.loc,
        max_dev: max.deviation(),
        loc_max_dev: max.loc,
        mean_dev,
        aad,
        cor,
        rmsd,
    }
}

/// Inverse-weight-weighted statistics, only for genuinely weighted runs
/// (some canonical weight strictly inside (0, 1)); `None` otherwise.
pub fn weighted_deviation_stats(
    original: &Array2<f64>,
    bent: &Array2<f64>,
    weights: &CanonicalWeights,
    is_correlation: bool,
) -> Option<WeightedDeviationStats> {
    if !weights.has_partial_weights() {
        return None;
    }

    let entries: Vec<(Entry, f64)> = upper_triangle_entries(original, bent, !is_correlation)
        .into_iter()
        .filter_map(|e| {
            let w = weights.get(e.loc.0, e.loc.1);
            (w > 0.0).then(|| (e, 1.0 / w))
        })
        .collect();

    let total: f64 = entries.iter().map(|(_, w)| w).sum();
    let waad = entries.iter().map(|(e, w)| w * e.deviation().abs()).sum::<f64>() / total;
    let wrmsd = (entries.iter().map(|(e, w)| w * e.deviation().powi(2)).sum::<f64>() / total).sqrt();

    let originals: Vec<f64> = entries.iter().map(|(e, _)| e.original).collect();
    let bents: Vec<f64> = entries.iter().map(|(e, _)| e.bent).collect();
    let inverse_weights: Vec<f64> = entries.iter().map(|(_, w)| *w).collect();

    Some(WeightedDeviationStats {
        w_gt_0: entries.len(),
        waad,
        wcor: weighted_pearson(&originals, &bents, &inverse_weights),
        wrmsd,
    })
}
