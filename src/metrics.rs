/*!
# Run metrics

Метрики Prometheus для запусков укладки:
- Запущенные, успешные и упавшие запуски по хостам
- Длительность запуска по хостам
- Обработанные итерации, узлы и ребра
- Запуски в процессе

*/

use crate::config::MetricsConfig;
use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Сборщик метрик, общий для всех запусков движка
#[derive(Debug)]
pub struct MetricsCollector {
    registry: Registry,

    runs_total: CounterVec,
    runs_succeeded: CounterVec,
    runs_failed: CounterVec,

    run_duration: HistogramVec,

    iterations_total: Counter,
    nodes_processed: Counter,
    edges_processed: Counter,

    active_runs: IntGauge,

    start_time: Instant,
}

/// Текущие итоги для логов и JSON
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub timestamp: i64,
    pub uptime_seconds: f64,
    pub runs_total: f64,
    pub runs_failed: f64,
    pub iterations_total: f64,
    pub active_runs: i64,
}

/// Начатый запуск, возвращается в [`MetricsCollector::run_succeeded`] или
/// [`MetricsCollector::run_failed`]
#[derive(Debug)]
pub struct RunTimer {
    host: &'static str,
    started: Instant,
}

impl RunTimer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        let registry = Registry::new();
        let namespace = config.namespace.as_str();
        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(namespace);

        let runs_total = CounterVec::new(opts("runs_total", "Total number of layout runs"), &["host"])?;
        let runs_succeeded = CounterVec::new(
            opts("runs_succeeded_total", "Layout runs that produced positions"),
            &["host"],
        )?;
        let runs_failed = CounterVec::new(opts("runs_failed_total", "Layout runs that failed"), &["host"])?;

        let run_duration = HistogramVec::new(
            HistogramOpts::new("run_duration_seconds", "Duration of a layout run in seconds")
                .namespace(namespace)
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["host"],
        )?;

        let iterations_total = Counter::with_opts(opts(
            "iterations_total",
            "Simulation iterations completed by successful runs",
        ))?;
        let nodes_processed = Counter::with_opts(opts("nodes_processed_total", "Nodes laid out"))?;
        let edges_processed = Counter::with_opts(opts("edges_processed_total", "Edges laid out"))?;

        let active_runs = IntGauge::with_opts(opts("active_runs", "Layout runs in flight"))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(runs_succeeded.clone()))?;
        registry.register(Box::new(runs_failed.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;
        registry.register(Box::new(iterations_total.clone()))?;
        registry.register(Box::new(nodes_processed.clone()))?;
        registry.register(Box::new(edges_processed.clone()))?;
        registry.register(Box::new(active_runs.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            runs_succeeded,
            runs_failed,
            run_duration,
            iterations_total,
            nodes_processed,
            edges_processed,
            active_runs,
            start_time: Instant::now(),
        })
    }

    /// Регистрирует начало запуска на `host`
    pub fn run_started(&self, host: &'static str, nodes: usize, edges: usize) -> RunTimer {
        self.runs_total.with_label_values(&[host]).inc();
        self.nodes_processed.inc_by(nodes as f64);
        self.edges_processed.inc_by(edges as f64);
        self.active_runs.inc();

        RunTimer {
            host,
            started: Instant::now(),
        }
    }

    pub fn run_succeeded(&self, timer: RunTimer, iterations: usize) {
        self.iterations_total.inc_by(iterations as f64);
        self.runs_succeeded.with_label_values(&[timer.host]).inc();
        self.finish(timer);
    }

    pub fn run_failed(&self, timer: RunTimer) {
        self.runs_failed.with_label_values(&[timer.host]).inc();
        self.finish(timer);
    }

    fn finish(&self, timer: RunTimer) {
        self.active_runs.dec();
        self.run_duration
            .with_label_values(&[timer.host])
            .observe(timer.elapsed().as_secs_f64());
    }

    pub fn active_runs(&self) -> i64 {
        self.active_runs.get()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn summary(&self) -> MetricsSummary {
        let sum = |vec: &CounterVec| -> f64 {
            vec.collect()
                .iter()
                .flat_map(|family| family.get_metric())
                .map(|metric| metric.get_counter().get_value())
                .sum()
        };

        MetricsSummary {
            timestamp: chrono::Utc::now().timestamp(),
            uptime_seconds: self.uptime().as_secs_f64(),
            runs_total: sum(&self.runs_total),
            runs_failed: sum(&self.runs_failed),
            iterations_total: self.iterations_total.get(),
            active_runs: self.active_runs.get(),
        }
    }

    /// Метрики в текстовом формате Prometheus
    pub fn export_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
