//! Final model training on the tuned parameters and the run report.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::boosting::{BoostingBuilder, BoostingParams, GradientBoostedTrees};
use crate::data::Dataset;
use crate::error::Result;
use crate::fitness::Classifier;
use crate::metrics::{best_threshold, roc_auc};
use crate::pso::{IterationReport, SwarmOutcome};
use crate::search_space::DecodedParams;

/// Trains the deployable model: tuned values on top of `base`, which should
/// carry the larger round budget and `early_stopping_rounds`.
pub fn train_final_model(data: &Dataset, train: &[usize], valid: &[usize], decoded: &DecodedParams, base: BoostingParams) -> Result<GradientBoostedTrees> {
    let params = BoostingBuilder::new(base).params_for(decoded)?;
    info!(?params, "training final model");
    let mut model = GradientBoostedTrees::new(params);
    model.fit_with_validation(data, train, valid)?;
    info!(trees = model.n_trees(), best_iteration = ?model.best_iteration(), "final model trained");
    Ok(model)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldoutReport {
    pub auc: f64,
    pub best_threshold: f64,
    pub best_f1: f64,
    pub positives: usize,
    pub negatives: usize,
}

pub fn evaluate_holdout<C: Classifier>(model: &C, data: &Dataset, rows: &[usize]) -> Result<HoldoutReport> {
    let labels = data.labels_of(rows);
    let proba = model.predict_proba(data, rows);
    let auc = roc_auc(&labels, &proba)?;
    let (threshold, f1) = best_threshold(&labels, &proba);
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let report = HoldoutReport { auc, best_threshold: threshold, best_f1: f1, positives, negatives: labels.len() - positives };
    info!(auc, threshold, f1, "hold-out evaluation");
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub generated_at: String,
    pub best_position: Vec<f64>,
    pub best_params: DecodedParams,
    pub best_cv_auc: f64,
    pub evaluations: usize,
    pub history: Vec<IterationReport>,
    pub scale_pos_weight: f64,
    pub final_params: BoostingParams,
    pub final_trees: usize,
    pub holdout: HoldoutReport,
}

impl TuningReport {
    pub fn new(outcome: SwarmOutcome, best_params: DecodedParams, scale_pos_weight: f64, model: &GradientBoostedTrees, holdout: HoldoutReport) -> Self {
        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            best_position: outcome.best_position,
            best_params,
            best_cv_auc: outcome.best_score,
            evaluations: outcome.evaluations,
            history: outcome.history,
            scale_pos_weight,
            final_params: model.params().clone(),
            final_trees: model.n_trees(),
            holdout,
        }
    }

    /// Writes `tuning_report_<timestamp>.json` under `dir` and returns its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("tuning_report_{}.json", chrono::Local::now().format("%Y%m%d_%H%M%S")));
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }
}
