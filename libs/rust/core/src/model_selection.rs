//! Stratified k-fold cross validation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::rows_by_class;
use crate::error::{Result, TunerError};

pub type Fold = (Vec<usize>, Vec<usize>);

/// Splits rows into `n_splits` folds that keep each class's share.
///
/// Every class is (optionally) shuffled, cut into `n_splits` contiguous
/// chunks whose sizes differ by at most one, and chunk `k` of every class
/// goes to test fold `k`. Classes are visited in ascending label order and
/// one seeded rng is shared across them, so a seed pins the folds exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for StratifiedKFold { fn default() -> Self { Self { n_splits: 3, shuffle: true, seed: 42 } } }

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self { Self { n_splits, ..Self::default() } }
    pub fn with_shuffle(mut self, shuffle: bool) -> Self { self.shuffle = shuffle; self }
    pub fn with_seed(mut self, seed: u64) -> Self { self.seed = seed; self }

    pub fn validate(&self) -> Result<()> {
        if self.n_splits < 2 { return Err(TunerError::InvalidConfig(format!("need at least 2 folds, got {}", self.n_splits))); }
        Ok(())
    }

    /// Folds over the rows listed in `rows`; `labels` is indexed by row id.
    pub fn split(&self, labels: &[u8], rows: &[usize]) -> Result<Vec<Fold>> {
        self.validate()?;
        if rows.len() < self.n_splits {
            return Err(TunerError::InvalidConfig(format!("{} folds requested for {} rows", self.n_splits, rows.len())));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut test_folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        for (_, mut class_rows) in rows_by_class(labels, rows) {
            if self.shuffle { class_rows.shuffle(&mut rng); }
            let base = class_rows.len() / self.n_splits;
            let extra = class_rows.len() % self.n_splits;
            let mut start = 0;
            for (k, fold) in test_folds.iter_mut().enumerate() {
                let end = start + base + usize::from(k < extra);
                fold.extend_from_slice(&class_rows[start..end]);
                start = end;
            }
        }
        Ok((0..self.n_splits).map(|k| {
            let train = test_folds.iter().enumerate().filter(|(j, _)| *j != k).flat_map(|(_, f)| f.iter().copied()).collect();
            (train, test_folds[k].clone())
        }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_partition_rows_and_keep_ratio() {
        let labels: Vec<u8> = (0..30).map(|i| u8::from(i < 6)).collect();
        let rows: Vec<usize> = (0..30).collect();
        let folds = StratifiedKFold::new(3).split(&labels, &rows).unwrap();
        assert_eq!(folds.len(), 3);
        let mut seen: Vec<usize> = folds.iter().flat_map(|(_, test)| test.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, rows);
        for (train, test) in &folds {
            assert_eq!(test.len(), 10);
            assert_eq!(train.len(), 20);
            assert_eq!(test.iter().filter(|&&r| labels[r] == 1).count(), 2);
            assert!(test.iter().all(|r| !train.contains(r)));
        }
    }

    #[test]
    fn seed_pins_folds() {
        let labels: Vec<u8> = (0..20).map(|i| (i % 2) as u8).collect();
        let rows: Vec<usize> = (0..20).collect();
        let a = StratifiedKFold::new(3).with_seed(7).split(&labels, &rows).unwrap();
        let b = StratifiedKFold::new(3).with_seed(7).split(&labels, &rows).unwrap();
        let c = StratifiedKFold::new(3).with_seed(8).split(&labels, &rows).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn respects_row_subset() {
        let labels = vec![0u8, 1, 0, 1, 0, 1, 0, 1];
        let rows = vec![0, 1, 2, 3, 4, 5];
        let folds = StratifiedKFold::new(3).with_shuffle(false).split(&labels, &rows).unwrap();
        assert!(folds.iter().all(|(tr, te)| tr.iter().chain(te).all(|r| *r < 6)));
        assert_eq!(folds[0].1, vec![0, 1]);
    }

    #[test]
    fn rejects_bad_fold_counts() {
        let labels = vec![0u8, 1];
        assert!(StratifiedKFold::new(1).split(&labels, &[0, 1]).is_err());
        assert!(StratifiedKFold::new(3).split(&labels, &[0, 1]).is_err());
    }
}
