//! Preprocessed training data handed over by the feature pipeline.
//!
//! Rows are accounts, columns are already imputed and scaled features;
//! labels are 1 for accounts flagged as suspicious.

use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TunerError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<u8>) -> Result<Self> {
        if features.is_empty() { return Err(TunerError::InvalidDataset("no rows".into())); }
        if features.len() != labels.len() {
            return Err(TunerError::InvalidDataset(format!("{} rows but {} labels", features.len(), labels.len())));
        }
        let n_features = features[0].len();
        if n_features == 0 { return Err(TunerError::InvalidDataset("rows have no features".into())); }
        for (i, row) in features.iter().enumerate() {
            if row.len() != n_features {
                return Err(TunerError::InvalidDataset(format!("row {i} has {} features, expected {n_features}", row.len())));
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(TunerError::InvalidDataset(format!("row {i} feature {j} is not finite")));
            }
        }
        if let Some(i) = labels.iter().position(|&l| l > 1) {
            return Err(TunerError::InvalidDataset(format!("label {} at row {i} is not binary", labels[i])));
        }
        Ok(Self { features, labels })
    }

    /// Reads `{"features": [[..], ..], "labels": [..]}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw { features: Vec<Vec<f64>>, labels: Vec<u8> }
        let text = std::fs::read_to_string(path.as_ref())?;
        let raw: Raw = serde_json::from_str(&text)?;
        let ds = Self::new(raw.features, raw.labels)?;
        info!(path = %path.as_ref().display(), rows = ds.n_rows(), features = ds.n_features(), positives = ds.positives(), "dataset loaded");
        Ok(ds)
    }

    pub fn n_rows(&self) -> usize { self.labels.len() }
    pub fn n_features(&self) -> usize { self.features[0].len() }
    pub fn row(&self, i: usize) -> &[f64] { &self.features[i] }
    pub fn value(&self, row: usize, feature: usize) -> f64 { self.features[row][feature] }
    pub fn label(&self, i: usize) -> u8 { self.labels[i] }
    pub fn labels(&self) -> &[u8] { &self.labels }
    pub fn positives(&self) -> usize { self.labels.iter().filter(|&&l| l == 1).count() }
    pub fn all_rows(&self) -> Vec<usize> { (0..self.n_rows()).collect() }
    pub fn labels_of(&self, rows: &[usize]) -> Vec<u8> { rows.iter().map(|&r| self.labels[r]).collect() }
}

/// Negative-to-positive ratio used to up-weight the rare suspicious class.
pub fn scale_pos_weight(labels: &[u8]) -> f64 {
    let pos = labels.iter().filter(|&&l| l == 1).count();
    let neg = labels.len() - pos;
    info!(positives = pos, negatives = neg, "class balance");
    if pos > 0 { neg as f64 / pos as f64 } else { 1.0 }
}

/// Groups row indices (taken from `rows`) by label, in ascending label order.
pub(crate) fn rows_by_class(labels: &[u8], rows: &[usize]) -> BTreeMap<u8, Vec<usize>> {
    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for &r in rows { by_class.entry(labels[r]).or_default().push(r); }
    by_class
}

/// Stratified shuffled hold-out split; returns `(train_rows, test_rows)`.
///
/// Each class contributes `round(test_size * class_count)` rows to the
/// test side, but never all of them.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TunerError::InvalidConfig(format!("test_size must be in (0, 1), got {test_size}")));
    }
    let all: Vec<usize> = (0..labels.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut train, mut test) = (Vec::new(), Vec::new());
    for (_, mut rows) in rows_by_class(labels, &all) {
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64 * test_size).round() as usize).min(rows.len().saturating_sub(1));
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    if train.is_empty() || test.is_empty() {
        return Err(TunerError::InvalidDataset(format!("split of {} rows left an empty side", labels.len())));
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}
