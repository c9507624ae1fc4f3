//! Prometheus metrics for the warming coordinator.

use crate::cache::{CacheType, PostCaches, WarmingStateTracker};
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::sync::Arc;
use tracing::error;

/// How a warming task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Upstream returned nothing
    Empty,
    Failed,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Empty => "empty",
            TaskOutcome::Failed => "failed",
        }
    }
}

pub struct Metrics {
    pub registry: Registry,

    // Warming
    pub triggers_total: CounterVec,
    pub tasks_total: CounterVec,
    pub task_duration_seconds: HistogramVec,
    pub wait_total: CounterVec,

    // Cache state
    pub cache_entries: GaugeVec,
    pub swept_entries_total: Counter,
    pub pruned_states_total: Counter,
    pub active_states: Gauge,
    pub warming_states: Gauge,

    // System
    pub uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let triggers_total = CounterVec::new(
            Opts::new(
                "warmer_triggers_total",
                "Warm requests by result (scheduled, duplicate)",
            ),
            &["result"],
        )?;
        registry.register(Box::new(triggers_total.clone()))?;

        let tasks_total = CounterVec::new(
            Opts::new("warmer_tasks_total", "Finished warming tasks by outcome"),
            &["cache", "outcome"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let task_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "warmer_task_duration_seconds",
                "Time spent in a warming task",
            )
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            &["cache"],
        )?;
        registry.register(Box::new(task_duration_seconds.clone()))?;

        let wait_total = CounterVec::new(
            Opts::new(
                "warmer_wait_total",
                "Bounded waits by outcome (ready, timeout, absent)",
            ),
            &["cache", "outcome"],
        )?;
        registry.register(Box::new(wait_total.clone()))?;

        let cache_entries = GaugeVec::new(
            Opts::new("warmer_cache_entries", "Entries held per cache namespace"),
            &["namespace"],
        )?;
        registry.register(Box::new(cache_entries.clone()))?;

        let swept_entries_total = Counter::with_opts(Opts::new(
            "warmer_swept_entries_total",
            "Expired entries removed by the sweeper",
        ))?;
        registry.register(Box::new(swept_entries_total.clone()))?;

        let pruned_states_total = Counter::with_opts(Opts::new(
            "warmer_pruned_states_total",
            "Stale warming states removed by the sweeper",
        ))?;
        registry.register(Box::new(pruned_states_total.clone()))?;

        let active_states = Gauge::with_opts(Opts::new(
            "warmer_active_states",
            "Users with a warming state",
        ))?;
        registry.register(Box::new(active_states.clone()))?;

        let warming_states = Gauge::with_opts(Opts::new(
            "warmer_warming_states",
            "Users with warming work outstanding",
        ))?;
        registry.register(Box::new(warming_states.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "warmer_uptime_seconds",
            "Seconds since process start",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry,
            triggers_total,
            tasks_total,
            task_duration_seconds,
            wait_total,
            cache_entries,
            swept_entries_total,
            pruned_states_total,
            active_states,
            warming_states,
            uptime_seconds,
        })
    }

    pub fn record_trigger(&self, scheduled: bool) {
        let result = if scheduled { "scheduled" } else { "duplicate" };
        self.triggers_total.with_label_values(&[result]).inc();
    }

    pub fn record_task(&self, cache: CacheType, outcome: TaskOutcome, duration_secs: f64) {
        self.tasks_total
            .with_label_values(&[cache.as_str(), outcome.as_str()])
            .inc();
        self.task_duration_seconds
            .with_label_values(&[cache.as_str()])
            .observe(duration_secs);
    }

    pub fn record_wait(&self, cache: CacheType, outcome: &str) {
        self.wait_total
            .with_label_values(&[cache.as_str(), outcome])
            .inc();
    }

    pub fn record_sweep(&self, swept_entries: usize, pruned_states: usize) {
        self.swept_entries_total.inc_by(swept_entries as f64);
        self.pruned_states_total.inc_by(pruned_states as f64);
    }

    pub fn update_cache_metrics(&self, caches: &PostCaches, tracker: &WarmingStateTracker) {
        self.cache_entries
            .with_label_values(&[caches.competitor.name()])
            .set(caches.competitor.len() as f64);
        self.cache_entries
            .with_label_values(&[caches.trending.name()])
            .set(caches.trending.len() as f64);
        self.active_states.set(tracker.len() as f64);
        self.warming_states.set(tracker.warming_count() as f64);
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                String::new()
            }
        }
    }
}

/// Shared metrics instance
pub type SharedMetrics = Arc<Metrics>;

/// Create a shared metrics instance
pub fn create_metrics() -> SharedMetrics {
    Arc::new(Metrics::new().expect("Failed to create metrics"))
}
