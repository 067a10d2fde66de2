//! Gradient-boosted regression trees for binary classification.
//!
//! Logistic loss with second-order tree fitting: every round computes the
//! gradient `w*(p - y)` and hessian `w*p*(1 - p)` of each training row,
//! grows one depth-limited tree on a row/column subsample and adds its
//! leaf weights to the margin. Leaf weights and split gains carry L2
//! (`reg_lambda`) and L1 (`reg_alpha`) penalties; positive rows are
//! weighted by `scale_pos_weight`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Dataset;
use crate::error::{Result, TunerError};
use crate::fitness::{Classifier, ModelBuilder};
use crate::metrics::roc_auc;
use crate::search_space::{DecodedParams, ParamValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub scale_pos_weight: f64,
    pub min_child_weight: f64,
    pub seed: u64,
    /// Stop after this many rounds without validation AUC improvement.
    /// Only used by [`GradientBoostedTrees::fit_with_validation`].
    pub early_stopping_rounds: Option<usize>,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self { n_estimators: 100, max_depth: 6, learning_rate: 0.3, subsample: 1.0, colsample_bytree: 1.0, reg_lambda: 1.0, reg_alpha: 0.0, scale_pos_weight: 1.0, min_child_weight: 1.0, seed: 0, early_stopping_rounds: None }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("learning_rate", self.learning_rate, self.learning_rate > 0.0, "must be > 0"),
            ("subsample", self.subsample, self.subsample > 0.0 && self.subsample <= 1.0, "must be in (0, 1]"),
            ("colsample_bytree", self.colsample_bytree, self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0, "must be in (0, 1]"),
            ("reg_lambda", self.reg_lambda, self.reg_lambda >= 0.0, "must be >= 0"),
            ("reg_alpha", self.reg_alpha, self.reg_alpha >= 0.0, "must be >= 0"),
            ("scale_pos_weight", self.scale_pos_weight, self.scale_pos_weight > 0.0, "must be > 0"),
            ("min_child_weight", self.min_child_weight, self.min_child_weight >= 0.0, "must be >= 0"),
        ];
        for (name, value, ok, reason) in checks {
            if !value.is_finite() || !ok { return Err(TunerError::hyperparameter(name, value, reason)); }
        }
        if self.n_estimators == 0 { return Err(TunerError::hyperparameter("n_estimators", 0.0, "must be positive")); }
        if self.early_stopping_rounds == Some(0) { return Err(TunerError::hyperparameter("early_stopping_rounds", 0.0, "must be positive")); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf { weight: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct Tree { nodes: Vec<Node> }

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf { weight } => return weight,
                Node::Split { feature, threshold, left, right } => i = if row[feature] < threshold { left } else { right },
            }
        }
    }
}

fn sigmoid(x: f64) -> f64 { 1.0 / (1.0 + (-x).exp()) }

fn soft_threshold(g: f64, alpha: f64) -> f64 {
    if g > alpha { g - alpha } else if g < -alpha { g + alpha } else { 0.0 }
}

/// Grows one tree over the sampled members of the training rows.
struct TreeGrower<'a> {
    data: &'a Dataset,
    rows: &'a [usize],
    grad: &'a [f64],
    hess: &'a [f64],
    columns: &'a [usize],
    params: &'a BoostingParams,
}

struct SplitCandidate { feature: usize, threshold: f64, gain: f64 }

impl TreeGrower<'_> {
    fn value(&self, member: usize, feature: usize) -> f64 { self.data.value(self.rows[member], feature) }

    fn structure_score(&self, g: f64, h: f64) -> f64 {
        let t = soft_threshold(g, self.params.reg_alpha);
        t * t / (h + self.params.reg_lambda)
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -soft_threshold(g, self.params.reg_alpha) / (h + self.params.reg_lambda) * self.params.learning_rate
    }

    fn grow(self, members: Vec<usize>) -> Tree {
        let mut nodes = Vec::new();
        self.grow_node(&mut nodes, members, 0);
        Tree { nodes }
    }

    fn grow_node(&self, nodes: &mut Vec<Node>, members: Vec<usize>, depth: usize) -> usize {
        let g: f64 = members.iter().map(|&m| self.grad[m]).sum();
        let h: f64 = members.iter().map(|&m| self.hess[m]).sum();
        let id = nodes.len();
        nodes.push(Node::Leaf { weight: self.leaf_weight(g, h) });
        if depth >= self.params.max_depth || members.len() < 2 || h < 2.0 * self.params.min_child_weight { return id; }
        let Some(split) = self.best_split(&members, g, h) else { return id };
        let (left, right): (Vec<usize>, Vec<usize>) = members.into_iter().partition(|&m| self.value(m, split.feature) < split.threshold);
        let left = self.grow_node(nodes, left, depth + 1);
        let right = self.grow_node(nodes, right, depth + 1);
        nodes[id] = Node::Split { feature: split.feature, threshold: split.threshold, left, right };
        id
    }

    fn best_split(&self, members: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.structure_score(g, h);
        let mcw = self.params.min_child_weight;
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = members.to_vec();
        for &feature in self.columns {
            sorted.sort_by(|&a, &b| self.value(a, feature).total_cmp(&self.value(b, feature)));
            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..sorted.len() - 1 {
                gl += self.grad[sorted[k]];
                hl += self.hess[sorted[k]];
                let (v, next) = (self.value(sorted[k], feature), self.value(sorted[k + 1], feature));
                if v == next { continue; }
                let (gr, hr) = (g - gl, h - hl);
                if hl < mcw || hr < mcw { continue; }
                let gain = self.structure_score(gl, hl) + self.structure_score(gr, hr) - parent;
                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    let mid = v + (next - v) / 2.0;
                    let threshold = if mid > v { mid } else { next };
                    best = Some(SplitCandidate { feature, threshold, gain });
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    trees: Vec<Tree>,
    best_iteration: Option<usize>,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams) -> Self { Self { params, trees: Vec::new(), best_iteration: None } }

    pub fn params(&self) -> &BoostingParams { &self.params }
    pub fn n_trees(&self) -> usize { self.trees.len() }
    /// 0-based round with the best validation AUC, once early stopping has run.
    pub fn best_iteration(&self) -> Option<usize> { self.best_iteration }

    /// Trains on `train` and tracks AUC on `valid`; with `early_stopping_rounds`
    /// set, stops when AUC stalls and keeps only the trees up to the best round.
    pub fn fit_with_validation(&mut self, data: &Dataset, train: &[usize], valid: &[usize]) -> Result<()> {
        self.train(data, train, Some(valid))
    }

    fn train(&mut self, data: &Dataset, rows: &[usize], valid: Option<&[usize]>) -> Result<()> {
        self.params.validate()?;
        if rows.is_empty() { return Err(TunerError::InvalidDataset("no training rows".into())); }
        let p = self.params.clone();
        let n = rows.len();
        let n_features = data.n_features();
        let mut rng = StdRng::seed_from_u64(p.seed);

        let targets: Vec<f64> = rows.iter().map(|&r| f64::from(data.label(r))).collect();
        let weights: Vec<f64> = targets.iter().map(|&y| if y == 1.0 { p.scale_pos_weight } else { 1.0 }).collect();
        let mut margin = vec![0.0; n];
        let valid_labels = valid.map(|v| data.labels_of(v));
        let mut valid_margin = valid.map(|v| vec![0.0; v.len()]);

        let n_sampled = ((n as f64 * p.subsample).ceil() as usize).clamp(1, n);
        let n_columns = ((n_features as f64 * p.colsample_bytree).round() as usize).clamp(1, n_features);
        let mut members: Vec<usize> = (0..n).collect();
        let mut features: Vec<usize> = (0..n_features).collect();
        let (mut grad, mut hess) = (vec![0.0; n], vec![0.0; n]);
        let (mut best_auc, mut best_round, mut stale) = (f64::NEG_INFINITY, 0usize, 0usize);

        self.trees = Vec::with_capacity(p.n_estimators);
        self.best_iteration = None;
        for round in 0..p.n_estimators {
            for i in 0..n {
                let prob = sigmoid(margin[i]);
                grad[i] = weights[i] * (prob - targets[i]);
                hess[i] = (weights[i] * prob * (1.0 - prob)).max(1e-16);
            }
            let sampled = if n_sampled < n { members.shuffle(&mut rng); members[..n_sampled].to_vec() } else { members.clone() };
            let mut columns = if n_columns < n_features { features.shuffle(&mut rng); features[..n_columns].to_vec() } else { features.clone() };
            columns.sort_unstable();

            let tree = TreeGrower { data, rows, grad: &grad, hess: &hess, columns: &columns, params: &p }.grow(sampled);
            for (i, &r) in rows.iter().enumerate() { margin[i] += tree.predict(data.row(r)); }
            if let (Some(v), Some(vm)) = (valid, valid_margin.as_mut()) {
                for (i, &r) in v.iter().enumerate() { vm[i] += tree.predict(data.row(r)); }
            }
            self.trees.push(tree);

            if let (Some(esr), Some(labels), Some(vm)) = (p.early_stopping_rounds, valid_labels.as_deref(), valid_margin.as_deref()) {
                let auc = roc_auc(labels, vm)?;
                if auc > best_auc { best_auc = auc; best_round = round; stale = 0; } else { stale += 1; }
                if stale >= esr {
                    debug!(round, best_round, best_auc, "early stopping");
                    break;
                }
            }
        }
        if p.early_stopping_rounds.is_some() && valid.is_some() {
            self.trees.truncate(best_round + 1);
            self.best_iteration = Some(best_round);
        }
        Ok(())
    }

    fn margin(&self, row: &[f64]) -> f64 { self.trees.iter().map(|t| t.predict(row)).sum() }
}

impl Classifier for GradientBoostedTrees {
    fn fit(&mut self, data: &Dataset, rows: &[usize]) -> Result<()> { self.train(data, rows, None) }

    fn predict_proba(&self, data: &Dataset, rows: &[usize]) -> Vec<f64> {
        rows.iter().map(|&r| sigmoid(self.margin(data.row(r)))).collect()
    }
}

/// Builds boosted models from fixed settings plus decoded search values.
#[derive(Debug, Clone)]
pub struct BoostingBuilder { base: BoostingParams }

const TUNABLE: [&str; 8] = ["max_depth", "n_estimators", "learning_rate", "subsample", "colsample_bytree", "reg_lambda", "reg_alpha", "min_child_weight"];

impl BoostingBuilder {
    /// `base` carries everything the search does not touch (rounds, class weight, seed).
    pub fn new(base: BoostingParams) -> Self { Self { base } }
    pub fn base(&self) -> &BoostingParams { &self.base }

    pub fn params_for(&self, decoded: &DecodedParams) -> Result<BoostingParams> {
        let mut p = self.base.clone();
        for (name, value) in decoded.iter() {
            match name {
                "max_depth" => p.max_depth = to_count(name, value)?,
                "n_estimators" => p.n_estimators = to_count(name, value)?,
                "learning_rate" => p.learning_rate = value.as_f64(),
                "subsample" => p.subsample = value.as_f64(),
                "colsample_bytree" => p.colsample_bytree = value.as_f64(),
                "reg_lambda" => p.reg_lambda = value.as_f64(),
                "reg_alpha" => p.reg_alpha = value.as_f64(),
                "min_child_weight" => p.min_child_weight = value.as_f64(),
                other => return Err(TunerError::InvalidConfig(format!("unknown boosting hyperparameter '{other}'"))),
            }
        }
        p.validate()?;
        Ok(p)
    }
}

fn to_count(name: &str, value: ParamValue) -> Result<usize> {
    match value {
        ParamValue::Int(v) if v >= 0 => Ok(v as usize),
        ParamValue::Float(v) if v.is_finite() && v >= 0.0 => Ok(v.trunc() as usize),
        other => Err(TunerError::hyperparameter(name, other.as_f64(), "must be a non-negative integer")),
    }
}

impl ModelBuilder for BoostingBuilder {
    type Model = GradientBoostedTrees;

    fn supports(&self, name: &str) -> bool { TUNABLE.contains(&name) }

    fn build(&self, decoded: &DecodedParams) -> Result<Self::Model> { Ok(GradientBoostedTrees::new(self.params_for(decoded)?)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_space::SearchSpace;
    use rand::Rng;

    /// Two informative features, one noise feature, ~20% positives.
    fn synthetic(n: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut features = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for _ in 0..n {
            let (a, b, noise): (f64, f64, f64) = (rng.gen(), rng.gen(), rng.gen());
            labels.push(u8::from(a + 0.5 * b + 0.2 * rng.gen::<f64>() > 1.1));
            features.push(vec![a, b, noise]);
        }
        Dataset::new(features, labels).unwrap()
    }

    #[test]
    fn learns_separable_signal() {
        let data = synthetic(300, 1);
        let rows = data.all_rows();
        let mut model = GradientBoostedTrees::new(BoostingParams { n_estimators: 30, max_depth: 3, learning_rate: 0.3, ..BoostingParams::default() });
        model.fit(&data, &rows).unwrap();
        let auc = roc_auc(data.labels(), &model.predict_proba(&data, &rows)).unwrap();
        assert!(auc > 0.9, "train auc {auc}");
        assert_eq!(model.n_trees(), 30);
    }

    #[test]
    fn same_seed_same_model() {
        let data = synthetic(120, 2);
        let rows = data.all_rows();
        let params = BoostingParams { n_estimators: 10, subsample: 0.7, colsample_bytree: 0.67, seed: 9, ..BoostingParams::default() };
        let mut a = GradientBoostedTrees::new(params.clone());
        let mut b = GradientBoostedTrees::new(params);
        a.fit(&data, &rows).unwrap();
        b.fit(&data, &rows).unwrap();
        assert_eq!(a.predict_proba(&data, &rows), b.predict_proba(&data, &rows));
    }

    #[test]
    fn depth_zero_is_a_constant_model() {
        let data = synthetic(50, 3);
        let rows = data.all_rows();
        let mut model = GradientBoostedTrees::new(BoostingParams { n_estimators: 5, max_depth: 0, ..BoostingParams::default() });
        model.fit(&data, &rows).unwrap();
        let probs = model.predict_proba(&data, &rows);
        assert!(probs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn early_stopping_truncates_to_best_round() {
        let data = synthetic(200, 4);
        let train: Vec<usize> = (0..150).collect();
        let valid: Vec<usize> = (150..200).collect();
        let mut model = GradientBoostedTrees::new(BoostingParams { n_estimators: 200, max_depth: 4, early_stopping_rounds: Some(5), ..BoostingParams::default() });
        model.fit_with_validation(&data, &train, &valid).unwrap();
        let best = model.best_iteration().unwrap();
        assert_eq!(model.n_trees(), best + 1);
        assert!(model.n_trees() < 200);
    }

    #[test]
    fn invalid_params_fail_fit() {
        let data = synthetic(20, 5);
        let rows = data.all_rows();
        for bad in [
            BoostingParams { learning_rate: 0.0, ..BoostingParams::default() },
            BoostingParams { subsample: 1.5, ..BoostingParams::default() },
            BoostingParams { reg_alpha: -1.0, ..BoostingParams::default() },
            BoostingParams { colsample_bytree: f64::NAN, ..BoostingParams::default() },
        ] {
            let err = GradientBoostedTrees::new(bad).fit(&data, &rows).unwrap_err();
            assert!(matches!(err, TunerError::InvalidHyperparameter { .. }));
        }
    }

    #[test]
    fn builder_maps_decoded_values() {
        let builder = BoostingBuilder::new(BoostingParams { n_estimators: 500, scale_pos_weight: 4.0, seed: 42, ..BoostingParams::default() });
        let decoded = SearchSpace::boosting_default().decode(&[5.7, 0.05, 0.8, 0.9, 1.5, 0.2]).unwrap();
        let p = builder.params_for(&decoded).unwrap();
        assert_eq!(p.max_depth, 5);
        assert_eq!(p.learning_rate, 0.05);
        assert_eq!(p.reg_alpha, 0.2);
        assert_eq!(p.n_estimators, 500);
        assert_eq!(p.scale_pos_weight, 4.0);
        assert!(builder.supports("colsample_bytree"));
        assert!(!builder.supports("gamma"));
    }

    #[test]
    fn builder_rejects_negative_depth() {
        let space = SearchSpace::new(vec![crate::search_space::ParamSpec::new("max_depth", -3.0, -1.0, crate::search_space::Decode::Truncate)]).unwrap();
        let decoded = space.decode(&[-2.0]).unwrap();
        assert!(matches!(BoostingBuilder::new(BoostingParams::default()).build(&decoded), Err(TunerError::InvalidHyperparameter { .. })));
    }
}
