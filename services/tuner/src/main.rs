use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use swarm_hpo::{
    evaluate_holdout, init_tracing, load_config, scale_pos_weight, stratified_split, train_final_model, BoostingBuilder, Dataset,
    FitnessEvaluator, ParticleSwarm, TunerConfig, TuningReport,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("hpo-tuner")?;
    let path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(path.as_deref())?;
    info!(target: "hpo-tuner", ?cfg, "config loaded");

    // the search is CPU bound and strictly sequential per particle
    let report_path = tokio::task::spawn_blocking(move || run(cfg)).await??;
    info!(target: "hpo-tuner", path = %report_path.display(), "tuning finished");
    Ok(())
}

fn run(cfg: TunerConfig) -> Result<PathBuf> {
    let dataset_path = cfg.input.dataset.clone().ok_or_else(|| anyhow!("input.dataset is not configured"))?;
    let data = Arc::new(Dataset::from_json_file(&dataset_path).with_context(|| format!("loading {}", dataset_path.display()))?);

    let (train, test) = stratified_split(data.labels(), cfg.split.test_size, cfg.split.seed)?;
    info!(train = train.len(), test = test.len(), "hold-out split");
    let spw = scale_pos_weight(&data.labels_of(&train));
    info!(scale_pos_weight = spw, "class weight");

    let builder = BoostingBuilder::new(cfg.model.search_params(spw));
    let evaluator = FitnessEvaluator::new(data.clone(), train.clone(), cfg.search_space.clone(), builder, &cfg.cv.kfold())?
        .with_parallel_folds(cfg.cv.parallel);

    info!(particles = cfg.pso.num_particles, max_iter = cfg.pso.max_iter, "starting particle swarm search");
    let bounds = cfg.search_space.bounds();
    let mut swarm = ParticleSwarm::new(evaluator, cfg.search_space.dim(), &bounds, cfg.pso.clone())?;
    let outcome = swarm.optimize()?;
    let best_params = cfg.search_space.decode(&outcome.best_position)?;
    info!(best_cv_auc = outcome.best_score, params = %serde_json::to_string(&best_params)?, "swarm search done");

    let model = train_final_model(&data, &train, &test, &best_params, cfg.model.final_params(spw))?;
    let holdout = evaluate_holdout(&model, &data, &test)?;
    info!(auc = holdout.auc, threshold = holdout.best_threshold, f1 = holdout.best_f1, "final model evaluated");

    let report = TuningReport::new(outcome, best_params, spw, &model, holdout);
    Ok(report.write_to(&cfg.input.output_dir)?)
}
