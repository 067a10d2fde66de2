//! Binary classification metrics used for fitness and hold-out reporting.

use crate::error::{Result, TunerError};

/// Area under the ROC curve via the Mann-Whitney rank statistic (ties get average rank).
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(TunerError::DimensionMismatch { expected: labels.len(), actual: scores.len() });
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(TunerError::UndefinedMetric(format!("roc_auc needs both classes ({positives} positive, {negatives} negative)")));
    }
    if scores.iter().any(|s| s.is_nan()) { return Err(TunerError::UndefinedMetric("roc_auc got NaN scores".into())); }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] { j += 1; }
        // ranks are 1-based; tied block [i, j] shares the mean rank
        let rank = (i + j) as f64 / 2.0 + 1.0;
        positive_rank_sum += rank * order[i..=j].iter().filter(|&&k| labels[k] == 1).count() as f64;
        i = j + 1;
    }
    let (p, n) = (positives as f64, negatives as f64);
    Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// F1 of the positive class; 0 when there are no true positives.
pub fn f1_score(labels: &[u8], predicted: &[u8]) -> f64 {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&y, &p) in labels.iter().zip(predicted) {
        match (y, p) { (1, 1) => tp += 1, (0, 1) => fp += 1, (1, 0) => fn_ += 1, _ => {} }
    }
    if tp == 0 { return 0.0; }
    2.0 * tp as f64 / (2 * tp + fp + fn_) as f64
}

/// Scans 17 thresholds evenly spaced over [0.1, 0.9]; returns `(threshold, f1)`
/// of the first one with the best F1, or `(0.5, 0.0)` if none scores above zero.
pub fn best_threshold(labels: &[u8], probabilities: &[f64]) -> (f64, f64) {
    let (mut best_t, mut best_f1) = (0.5, 0.0);
    for k in 0..17 {
        let t = 0.1 + 0.05 * k as f64;
        let predicted: Vec<u8> = probabilities.iter().map(|&p| u8::from(p >= t)).collect();
        let f1 = f1_score(labels, &predicted);
        if f1 > best_f1 { best_f1 = f1; best_t = t; }
    }
    (best_t, best_f1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auc_perfect_inverse_and_random() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
        assert_eq!(roc_auc(&y, &[0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
    }

    #[test]
    fn auc_matches_pairwise_count() {
        // pairs (pos, neg): 0.35>0.1, 0.35<0.4, 0.8>0.1, 0.8>0.4 -> 3/4
        let y = [0, 0, 1, 1];
        let s = [0.1, 0.4, 0.35, 0.8];
        assert!((roc_auc(&y, &s).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn auc_undefined_for_single_class() {
        assert!(matches!(roc_auc(&[1, 1], &[0.2, 0.3]), Err(TunerError::UndefinedMetric(_))));
        assert!(roc_auc(&[0, 1], &[0.2]).is_err());
    }

    #[test]
    fn f1_and_threshold() {
        assert_eq!(f1_score(&[1, 0, 1, 0], &[1, 0, 0, 0]), 2.0 / 3.0);
        assert_eq!(f1_score(&[0, 0], &[0, 0]), 0.0);
        let (t, f1) = best_threshold(&[0, 0, 1, 1], &[0.05, 0.3, 0.7, 0.95]);
        assert_eq!(f1, 1.0);
        assert!(t > 0.3 && t <= 0.7);
        assert_eq!(best_threshold(&[0, 0], &[0.2, 0.9]), (0.5, 0.0));
    }
}
