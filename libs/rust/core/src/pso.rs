//! Particle swarm optimizer over a box-bounded continuous space.
//!
//! The swarm maximizes an [`Objective`]. Construction seeds every particle
//! (uniform position inside the box, uniform velocity in [-1, 1)) and
//! evaluates it once, so building a swarm already spends `num_particles`
//! evaluations. Each sweep then visits particles in index order:
//!
//! ```text
//! v = w*v + c1*r1*(pbest - x) + c2*r2*(gbest - x)
//! x = clamp(x + v, low, high)
//! ```
//!
//! Only the position is clamped; the velocity keeps its overshoot. A
//! particle that improves the global best is visible to the particles
//! after it in the same sweep. All draws come from one seeded `StdRng`
//! owned by the swarm: initial positions (particle-major), initial
//! velocities, then `r1` and `r2` per particle per sweep.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TunerError};
use crate::search_space::validate_bound;
use crate::telemetry::TUNER_METRICS;

/// Fitness oracle maximized by the swarm. Higher is better.
pub trait Objective {
    fn evaluate(&self, position: &[f64]) -> Result<f64>;
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, position: &[f64]) -> Result<f64> { Ok(self(position)) }
}

/// Adapts a closure that can fail.
pub struct Fallible<F>(pub F);

impl<F> Objective for Fallible<F>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    fn evaluate(&self, position: &[f64]) -> Result<f64> { (self.0)(position) }
}

/// What the swarm does when an evaluation errors or returns a non-finite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run with [`TunerError::Evaluation`].
    #[default]
    Propagate,
    /// Score the position as `f64::NEG_INFINITY` and keep going.
    Sentinel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub num_particles: usize,
    pub max_iter: usize,
    /// Inertia weight `w`.
    pub inertia: f64,
    /// Cognitive coefficient `c1`.
    pub cognitive: f64,
    /// Social coefficient `c2`.
    pub social: f64,
    pub seed: Option<u64>,
    pub on_failure: FailurePolicy,
}

impl Default for SwarmConfig {
    fn default() -> Self { Self { num_particles: 10, max_iter: 10, inertia: 0.7, cognitive: 1.5, social: 1.5, seed: None, on_failure: FailurePolicy::Propagate } }
}

impl SwarmConfig {
    pub fn with_seed(mut self, seed: u64) -> Self { self.seed = Some(seed); self }

    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 { return Err(TunerError::InvalidConfig("num_particles must be positive".into())); }
        for (name, v) in [("inertia", self.inertia), ("cognitive", self.cognitive), ("social", self.social)] {
            if !v.is_finite() { return Err(TunerError::InvalidConfig(format!("{name} must be finite, got {v}"))); }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub best_position: Vec<f64>,
    pub best_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
    /// 1-based sweep number.
    pub iteration: usize,
    pub best_score: f64,
    pub best_position: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmOutcome {
    pub best_position: Vec<f64>,
    pub best_score: f64,
    pub history: Vec<IterationReport>,
    pub evaluations: usize,
}

pub struct ParticleSwarm<O> {
    objective: O,
    bounds: Vec<(f64, f64)>,
    config: SwarmConfig,
    rng: StdRng,
    particles: Vec<Particle>,
    global_best_position: Vec<f64>,
    global_best_score: f64,
    iterations: usize,
    evaluations: usize,
    history: Vec<IterationReport>,
}

impl<O: Objective> ParticleSwarm<O> {
    /// Validates the setup, draws the initial population and evaluates it.
    pub fn new(objective: O, dim: usize, bounds: &[(f64, f64)], config: SwarmConfig) -> Result<Self> {
        if dim == 0 { return Err(TunerError::InvalidConfig("dim must be positive".into())); }
        if bounds.len() != dim { return Err(TunerError::DimensionMismatch { expected: dim, actual: bounds.len() }); }
        for (d, &(low, high)) in bounds.iter().enumerate() { validate_bound(d, low, high)?; }
        config.validate()?;

        let mut rng = config.seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy);
        let positions: Vec<Vec<f64>> = (0..config.num_particles)
            .map(|_| bounds.iter().map(|&(low, high)| { let r = rng.gen::<f64>(); (low * (1.0 - r) + high * r).clamp(low, high) }).collect())
            .collect();
        let velocities: Vec<Vec<f64>> = (0..config.num_particles)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();

        let mut particles = Vec::with_capacity(config.num_particles);
        for (position, velocity) in positions.into_iter().zip(velocities) {
            let score = evaluate_with_policy(&objective, config.on_failure, &position)?;
            particles.push(Particle { best_position: position.clone(), position, velocity, best_score: score });
        }

        let mut best = 0;
        for (i, p) in particles.iter().enumerate() { if p.best_score > particles[best].best_score { best = i; } }
        let global_best_position = particles[best].best_position.clone();
        let global_best_score = particles[best].best_score;
        TUNER_METRICS.global_best_score.record(global_best_score, &[]);
        info!(particles = config.num_particles, dim, best_score = global_best_score, "swarm initialized");

        let evaluations = particles.len();
        Ok(Self { objective, bounds: bounds.to_vec(), config, rng, particles, global_best_position, global_best_score, iterations: 0, evaluations, history: Vec::new() })
    }

    /// One sweep over all particles in index order.
    pub fn step(&mut self) -> Result<IterationReport> {
        let SwarmConfig { inertia: w, cognitive: c1, social: c2, on_failure, .. } = self.config;
        let dim = self.bounds.len();
        for i in 0..self.particles.len() {
            let r1: Vec<f64> = (0..dim).map(|_| self.rng.gen::<f64>()).collect();
            let r2: Vec<f64> = (0..dim).map(|_| self.rng.gen::<f64>()).collect();

            let p = &mut self.particles[i];
            for d in 0..dim {
                p.velocity[d] = w * p.velocity[d]
                    + c1 * r1[d] * (p.best_position[d] - p.position[d])
                    + c2 * r2[d] * (self.global_best_position[d] - p.position[d]);
                let (low, high) = self.bounds[d];
                p.position[d] = (p.position[d] + p.velocity[d]).clamp(low, high);
            }

            let score = evaluate_with_policy(&self.objective, on_failure, &p.position)?;
            self.evaluations += 1;
            if score > p.best_score {
                p.best_position.clone_from(&p.position);
                p.best_score = score;
                if score > self.global_best_score {
                    self.global_best_position.clone_from(&p.position);
                    self.global_best_score = score;
                    debug!(particle = i, score, "global best improved");
                }
            }
        }

        self.iterations += 1;
        TUNER_METRICS.global_best_score.record(self.global_best_score, &[]);
        info!(iteration = self.iterations, max_iter = self.config.max_iter, best_score = self.global_best_score, "sweep complete");
        let report = IterationReport { iteration: self.iterations, best_score: self.global_best_score, best_position: self.global_best_position.clone() };
        self.history.push(report.clone());
        Ok(report)
    }

    /// Runs `max_iter` sweeps and returns the global best.
    pub fn optimize(&mut self) -> Result<SwarmOutcome> {
        for _ in 0..self.config.max_iter { self.step()?; }
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> SwarmOutcome {
        SwarmOutcome { best_position: self.global_best_position.clone(), best_score: self.global_best_score, history: self.history.clone(), evaluations: self.evaluations }
    }

    pub fn particles(&self) -> &[Particle] { &self.particles }
    pub fn global_best(&self) -> (&[f64], f64) { (&self.global_best_position, self.global_best_score) }
    pub fn bounds(&self) -> &[(f64, f64)] { &self.bounds }
    pub fn iterations_run(&self) -> usize { self.iterations }
    pub fn evaluations(&self) -> usize { self.evaluations }
    pub fn objective(&self) -> &O { &self.objective }
}

fn evaluate_with_policy<O: Objective>(objective: &O, policy: FailurePolicy, position: &[f64]) -> Result<f64> {
    let start = Instant::now();
    let outcome = objective.evaluate(position).and_then(|score| {
        if score.is_finite() { Ok(score) } else { Err(TunerError::Evaluation { position: position.to_vec(), reason: format!("non-finite score {score}") }) }
    });
    TUNER_METRICS.evaluations_total.add(1, &[]);
    TUNER_METRICS.evaluation_latency_ms.record(start.elapsed().as_secs_f64() * 1000.0, &[]);
    match outcome {
        Ok(score) => Ok(score),
        Err(err) => {
            TUNER_METRICS.evaluation_failures_total.add(1, &[]);
            match policy {
                FailurePolicy::Propagate => Err(match err {
                    TunerError::Evaluation { .. } => err,
                    other => TunerError::Evaluation { position: position.to_vec(), reason: other.to_string() },
                }),
                FailurePolicy::Sentinel => {
                    warn!(error = %err, ?position, "evaluation failed, scoring as -inf");
                    Ok(f64::NEG_INFINITY)
                }
            }
        }
    }
}
