//! Tuning job configuration.
//!
//! Layers, lowest to highest: serde defaults, an optional YAML file (the
//! given path or `SWARM_CONFIG_FILE`), then `SWARM__`-prefixed environment
//! variables, e.g. `SWARM__PSO__MAX_ITER=30`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::boosting::BoostingParams;
use crate::error::{Result, TunerError};
use crate::model_selection::StratifiedKFold;
use crate::pso::SwarmConfig;
use crate::search_space::SearchSpace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dataset: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for InputConfig { fn default() -> Self { Self { dataset: None, output_dir: PathBuf::from("outputs") } } }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig { fn default() -> Self { Self { test_size: 0.2, seed: 42 } } }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    pub folds: usize,
    pub shuffle: bool,
    pub seed: u64,
    /// Fit folds on the rayon pool; particles are always evaluated one by one.
    pub parallel: bool,
}

impl Default for CvConfig { fn default() -> Self { Self { folds: 3, shuffle: true, seed: 42, parallel: true } } }

impl CvConfig {
    pub fn kfold(&self) -> StratifiedKFold { StratifiedKFold::new(self.folds).with_shuffle(self.shuffle).with_seed(self.seed) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Rounds per model inside the fitness function (no early stopping).
    pub search_rounds: usize,
    pub final_rounds: usize,
    pub early_stopping_rounds: usize,
    pub min_child_weight: f64,
    pub seed: u64,
}

impl Default for ModelConfig { fn default() -> Self { Self { search_rounds: 300, final_rounds: 2000, early_stopping_rounds: 50, min_child_weight: 1.0, seed: 42 } } }

impl ModelConfig {
    pub fn search_params(&self, scale_pos_weight: f64) -> BoostingParams {
        BoostingParams { n_estimators: self.search_rounds, scale_pos_weight, min_child_weight: self.min_child_weight, seed: self.seed, early_stopping_rounds: None, ..BoostingParams::default() }
    }

    pub fn final_params(&self, scale_pos_weight: f64) -> BoostingParams {
        BoostingParams { n_estimators: self.final_rounds, early_stopping_rounds: Some(self.early_stopping_rounds), ..self.search_params(scale_pos_weight) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TunerConfig {
    pub input: InputConfig,
    pub split: SplitConfig,
    pub pso: SwarmConfig,
    pub search_space: SearchSpace,
    pub cv: CvConfig,
    pub model: ModelConfig,
}

impl TunerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg = config::Config::builder().add_source(config::File::from_str(text, config::FileFormat::Yaml)).build()?;
        let cfg: Self = cfg.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail-fast checks run before any data is touched.
    pub fn validate(&self) -> Result<()> {
        self.pso.validate()?;
        SearchSpace::new(self.search_space.params().to_vec())?;
        self.cv.kfold().validate()?;
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(TunerError::InvalidConfig(format!("split.test_size must be in (0, 1), got {}", self.split.test_size)));
        }
        let m = &self.model;
        if m.search_rounds == 0 || m.final_rounds == 0 || m.early_stopping_rounds == 0 {
            return Err(TunerError::InvalidConfig("model round counts must be positive".into()));
        }
        if !(m.min_child_weight.is_finite() && m.min_child_weight >= 0.0) {
            return Err(TunerError::InvalidConfig(format!("model.min_child_weight must be >= 0, got {}", m.min_child_weight)));
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<TunerConfig> {
    let mut builder = config::Config::builder();
    let file = path.map(Path::to_path_buf).or_else(|| std::env::var("SWARM_CONFIG_FILE").ok().map(PathBuf::from));
    if let Some(file) = &file {
        builder = builder.add_source(config::File::from(file.as_path()).format(config::FileFormat::Yaml).required(true));
    }
    builder = builder.add_source(config::Environment::with_prefix("SWARM").prefix_separator("__").separator("__").try_parsing(true));
    let cfg: TunerConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    tracing::info!(file = ?file, particles = cfg.pso.num_particles, max_iter = cfg.pso.max_iter, dim = cfg.search_space.dim(), "config loaded");
    Ok(cfg)
}
