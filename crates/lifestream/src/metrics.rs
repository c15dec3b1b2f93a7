//! Minimal metrics emission helpers.
//!
//! Metrics go out as structured `tracing` events (target `metrics`) by
//! default. A test sink can be installed to capture emissions.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(u64),
    Histogram(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricLabel {
    pub key: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: MetricValue,
    pub labels: Vec<MetricLabel>,
}

pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&self, event: MetricEvent) {
        let (kind, value) = match event.value {
            MetricValue::Counter(value) => ("counter", value),
            MetricValue::Gauge(value) => ("gauge", value),
            MetricValue::Histogram(value) => ("histogram", value),
        };
        tracing::info!(
            target: "metrics",
            metric = event.name,
            kind,
            value,
            labels = ?event.labels
        );
    }
}

static METRIC_SINK: OnceLock<RwLock<Arc<dyn MetricSink>>> = OnceLock::new();

fn sink_lock() -> &'static RwLock<Arc<dyn MetricSink>> {
    METRIC_SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink)))
}

fn sink() -> Arc<dyn MetricSink> {
    sink_lock()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_sink(sink: Arc<dyn MetricSink>) {
    *sink_lock().write().unwrap_or_else(PoisonError::into_inner) = sink;
}

fn emit(name: &'static str, value: MetricValue, labels: Vec<MetricLabel>) {
    sink().record(MetricEvent {
        name,
        value,
        labels,
    });
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn algorithm_label(algorithm: &'static str) -> Vec<MetricLabel> {
    vec![MetricLabel {
        key: "algorithm",
        value: algorithm.to_string(),
    }]
}

/// Evolver call that produced a state.
pub fn compute_ok(algorithm: &'static str, generations: u64, duration: Duration) {
    emit(
        "generations_computed",
        MetricValue::Counter(generations),
        algorithm_label(algorithm),
    );
    emit(
        "compute_duration_us",
        MetricValue::Histogram(duration_us(duration)),
        algorithm_label(algorithm),
    );
}

pub fn compute_err(algorithm: &'static str, duration: Duration) {
    emit(
        "compute_err",
        MetricValue::Counter(1),
        algorithm_label(algorithm),
    );
    emit(
        "compute_duration_us",
        MetricValue::Histogram(duration_us(duration)),
        algorithm_label(algorithm),
    );
}

/// Full tick, computation plus pacing wait, from start to publish.
pub fn tick_published(duration: Duration) {
    emit("ticks_published", MetricValue::Counter(1), Vec::new());
    emit(
        "tick_duration_us",
        MetricValue::Histogram(duration_us(duration)),
        Vec::new(),
    );
}

pub fn tick_cancelled() {
    emit("ticks_cancelled", MetricValue::Counter(1), Vec::new());
}

pub fn subscriber_dropped() {
    emit("subscribers_dropped", MetricValue::Counter(1), Vec::new());
}

pub fn set_cache_nodes(nodes: usize) {
    emit("cache_nodes", MetricValue::Gauge(nodes as u64), Vec::new());
}
