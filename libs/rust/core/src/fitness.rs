//! Cross-validated AUC as the swarm's fitness.
//!
//! A position is decoded through the [`SearchSpace`] table, handed to a
//! [`ModelBuilder`] together with the run's fixed settings, and scored by
//! stratified k-fold cross validation. The training data is shared
//! read-only; nothing is cached between calls.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::data::Dataset;
use crate::error::{Result, TunerError};
use crate::model_selection::{Fold, StratifiedKFold};
use crate::metrics::roc_auc;
use crate::pso::Objective;
use crate::search_space::{DecodedParams, SearchSpace};

pub trait Classifier {
    fn fit(&mut self, data: &Dataset, rows: &[usize]) -> Result<()>;
    /// Probability of the positive class for each of `rows`.
    fn predict_proba(&self, data: &Dataset, rows: &[usize]) -> Vec<f64>;
}

/// Turns decoded hyperparameters into an untrained classifier.
pub trait ModelBuilder: Sync {
    type Model: Classifier;
    fn supports(&self, name: &str) -> bool;
    fn build(&self, params: &DecodedParams) -> Result<Self::Model>;
}

pub struct FitnessEvaluator<B> {
    data: Arc<Dataset>,
    rows: Vec<usize>,
    space: SearchSpace,
    builder: B,
    folds: Vec<Fold>,
    parallel: bool,
}

impl<B: ModelBuilder> FitnessEvaluator<B> {
    /// `rows` selects the training rows of `data`; folds are fixed here so
    /// every evaluation sees the same splits.
    pub fn new(data: Arc<Dataset>, rows: Vec<usize>, space: SearchSpace, builder: B, cv: &StratifiedKFold) -> Result<Self> {
        if let Some(name) = space.names().find(|n| !builder.supports(n)) {
            return Err(TunerError::InvalidConfig(format!("model builder does not know hyperparameter '{name}'")));
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= data.n_rows()) {
            return Err(TunerError::InvalidDataset(format!("row {bad} out of range for {} rows", data.n_rows())));
        }
        let folds = cv.split(data.labels(), &rows)?;
        Ok(Self { data, rows, space, builder, folds, parallel: false })
    }

    /// Fits the folds on the rayon pool. Fold scores are still averaged in
    /// fold order, so the result does not depend on scheduling.
    pub fn with_parallel_folds(mut self, parallel: bool) -> Self { self.parallel = parallel; self }

    pub fn space(&self) -> &SearchSpace { &self.space }
    pub fn builder(&self) -> &B { &self.builder }
    pub fn rows(&self) -> &[usize] { &self.rows }
    pub fn n_folds(&self) -> usize { self.folds.len() }

    fn score_fold(&self, params: &DecodedParams, (train, test): &Fold) -> Result<f64> {
        let mut model = self.builder.build(params)?;
        model.fit(&self.data, train)?;
        let proba = model.predict_proba(&self.data, test);
        roc_auc(&self.data.labels_of(test), &proba)
    }

    /// Mean fold AUC for `position`.
    pub fn score(&self, position: &[f64]) -> Result<f64> {
        let params = self.space.decode(position)?;
        let scores: Vec<f64> = if self.parallel {
            self.folds.par_iter().map(|f| self.score_fold(&params, f)).collect::<Result<_>>()?
        } else {
            self.folds.iter().map(|f| self.score_fold(&params, f)).collect::<Result<_>>()?
        };
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        debug!(?scores, mean, "cross-validated");
        if !mean.is_finite() {
            return Err(TunerError::Evaluation { position: position.to_vec(), reason: format!("mean fold score {mean} is not finite") });
        }
        Ok(mean)
    }
}

impl<B: ModelBuilder> Objective for FitnessEvaluator<B> {
    fn evaluate(&self, position: &[f64]) -> Result<f64> { self.score(position) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boosting::{BoostingBuilder, BoostingParams};
    use crate::search_space::{Decode, ParamSpec};

    /// Predicts the value of one feature; its only knob picks the feature.
    struct PickFeature { feature: usize }
    impl Classifier for PickFeature {
        fn fit(&mut self, _: &Dataset, _: &[usize]) -> Result<()> { Ok(()) }
        fn predict_proba(&self, data: &Dataset, rows: &[usize]) -> Vec<f64> { rows.iter().map(|&r| data.value(r, self.feature)).collect() }
    }
    struct PickBuilder;
    impl ModelBuilder for PickBuilder {
        type Model = PickFeature;
        fn supports(&self, name: &str) -> bool { name == "feature" }
        fn build(&self, params: &DecodedParams) -> Result<PickFeature> {
            Ok(PickFeature { feature: params.get("feature").map(|v| v.as_f64() as usize).unwrap_or(0) })
        }
    }

    fn toy() -> Arc<Dataset> {
        // feature 0 separates the classes perfectly, feature 1 inverts them
        let features = (0..12).map(|i| { let y = (i % 2) as f64; vec![y + 0.01 * i as f64, 1.0 - y] }).collect();
        let labels = (0..12).map(|i| (i % 2) as u8).collect();
        Arc::new(Dataset::new(features, labels).unwrap())
    }

    fn pick_space() -> SearchSpace { SearchSpace::new(vec![ParamSpec::new("feature", 0.0, 1.0, Decode::Round)]).unwrap() }

    #[test]
    fn scores_by_decoded_parameter() {
        let data = toy();
        let rows = data.all_rows();
        let eval = FitnessEvaluator::new(data, rows, pick_space(), PickBuilder, &StratifiedKFold::new(3)).unwrap();
        assert_eq!(eval.evaluate(&[0.2]).unwrap(), 1.0);
        assert_eq!(eval.evaluate(&[0.9]).unwrap(), 0.0);
        assert_eq!(eval.n_folds(), 3);
    }

    #[test]
    fn rejects_unknown_parameter_names() {
        let data = toy();
        let rows = data.all_rows();
        let err = FitnessEvaluator::new(data, rows, SearchSpace::boosting_default(), PickBuilder, &StratifiedKFold::new(3)).err().unwrap();
        assert!(matches!(err, TunerError::InvalidConfig(_)));
    }

    #[test]
    fn boosted_evaluation_is_repeatable_and_parallel_safe() {
        let data = toy();
        let rows = data.all_rows();
        let builder = BoostingBuilder::new(BoostingParams { n_estimators: 5, seed: 42, min_child_weight: 0.0, ..BoostingParams::default() });
        let cv = StratifiedKFold::new(3).with_seed(42);
        let serial = FitnessEvaluator::new(data.clone(), rows.clone(), SearchSpace::boosting_default(), builder.clone(), &cv).unwrap();
        let parallel = FitnessEvaluator::new(data, rows, SearchSpace::boosting_default(), builder, &cv).unwrap().with_parallel_folds(true);
        let x = [4.0, 0.1, 0.8, 1.0, 1.0, 0.0];
        let a = serial.evaluate(&x).unwrap();
        assert_eq!(a, serial.evaluate(&x).unwrap());
        assert_eq!(a, parallel.evaluate(&x).unwrap());
        assert!((0.0..=1.0).contains(&a));
    }

    #[test]
    fn invalid_decoded_value_is_an_error() {
        let data = toy();
        let rows = data.all_rows();
        let space = SearchSpace::new(vec![ParamSpec::new("learning_rate", -1.0, 0.0, Decode::Identity)]).unwrap();
        let eval = FitnessEvaluator::new(data, rows, space, BoostingBuilder::new(BoostingParams::default()), &StratifiedKFold::new(3)).unwrap();
        assert!(matches!(eval.evaluate(&[-0.5]), Err(TunerError::InvalidHyperparameter { .. })));
        assert!(matches!(eval.evaluate(&[0.1, 0.2]), Err(TunerError::DimensionMismatch { .. })));
    }
}
