//! Tracing subscriber setup and the tuner's metric instruments.
//!
//! Instruments come from the global OpenTelemetry meter; when no meter
//! provider is installed they are no-ops.

use once_cell::sync::{Lazy, OnceCell};
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::Result;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let json = std::env::var("SWARM_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry.with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false)).try_init()
        } else {
            registry.with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true)).try_init()
        }
    })?;
    info!(target: "swarm_hpo", service, "tracing initialized");
    Ok(())
}

#[derive(Clone)]
pub struct TunerMetrics {
    pub evaluations_total: Counter<u64>,
    pub evaluation_failures_total: Counter<u64>,
    pub evaluation_latency_ms: Histogram<f64>,
    pub global_best_score: Gauge<f64>,
}

static TUNER_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("swarm_hpo"));

pub static TUNER_METRICS: Lazy<TunerMetrics> = Lazy::new(|| TunerMetrics {
    evaluations_total: TUNER_METER.u64_counter("swarm_hpo_evaluations_total")
        .with_description("Fitness evaluations performed by the swarm")
        .build(),
    evaluation_failures_total: TUNER_METER.u64_counter("swarm_hpo_evaluation_failures_total")
        .with_description("Fitness evaluations that returned an error or a non-finite score")
        .build(),
    evaluation_latency_ms: TUNER_METER.f64_histogram("swarm_hpo_evaluation_latency_ms")
        .with_description("Wall time of one fitness evaluation (ms)")
        .with_unit("ms")
        .build(),
    global_best_score: TUNER_METER.f64_gauge("swarm_hpo_global_best_score")
        .with_description("Best fitness found so far in the current run")
        .build(),
});
