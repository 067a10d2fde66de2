//! Particle-swarm hyperparameter search for the suspicious-account classifier.
//!
//! Pipeline pieces, bottom-up:
//! - [`data`]: validated, preprocessed training matrix and label helpers
//! - [`model_selection`] / [`metrics`]: stratified k-fold and ROC AUC
//! - [`boosting`]: the gradient-boosted tree classifier being tuned
//! - [`fitness`]: position -> mean cross-validated AUC
//! - [`pso`]: the swarm that maximizes the fitness inside box bounds
//! - [`training`]: final model on the winning parameters plus run report

pub mod boosting;
pub mod config;
pub mod data;
pub mod error;
pub mod fitness;
pub mod metrics;
pub mod model_selection;
pub mod pso;
pub mod search_space;
pub mod telemetry;
pub mod training;

pub use boosting::{BoostingBuilder, BoostingParams, GradientBoostedTrees};
pub use config::{load_config, TunerConfig};
pub use data::{scale_pos_weight, stratified_split, Dataset};
pub use error::{Result, TunerError};
pub use fitness::{Classifier, FitnessEvaluator, ModelBuilder};
pub use model_selection::StratifiedKFold;
pub use pso::{Fallible, FailurePolicy, IterationReport, Objective, Particle, ParticleSwarm, SwarmConfig, SwarmOutcome};
pub use search_space::{Decode, DecodedParams, ParamSpec, ParamValue, SearchSpace};
pub use telemetry::{init_tracing, TUNER_METRICS};
pub use training::{evaluate_holdout, train_final_model, HoldoutReport, TuningReport};
