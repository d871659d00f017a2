//! Best-effort statistics about the exporter process itself.
//!
//! Platform code lives behind [`ProcessStatsSource`]; on platforms without a
//! source the block is simply left out of the scrape.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::info;

use crate::render::{Labels, MetricLine, MetricValue};

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::ProcfsSource;

/// Process statistics errors.
#[derive(Debug, Error)]
pub enum ProcessStatsError {
    #[error("Process statistics are not available on this platform")]
    Unsupported,
    #[error("Failed to read process statistics: {0}")]
    Read(String),
    #[error("Invalid process statistic {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Host process counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessStats {
    pub virtual_memory_bytes: u64,
    pub resident_memory_bytes: u64,
    pub minor_faults: u64,
    pub major_faults: u64,
    pub threads: u64,
    /// User plus system CPU time.
    pub cpu_seconds: f64,
    /// Unix time the exporter started.
    pub start_time_seconds: f64,
    pub uptime_seconds: f64,
}

/// Something that can read [`ProcessStats`].
pub trait ProcessStatsSource: Send + Sync {
    fn read(&self) -> Result<ProcessStats, ProcessStatsError>;
}

/// When the exporter started, for the start time and uptime metrics.
#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    started_at: SystemTime,
    started: Instant,
}

impl ProcessClock {
    pub fn start() -> Self {
        Self {
            started_at: SystemTime::now(),
            started: Instant::now(),
        }
    }

    pub fn start_time_seconds(&self) -> f64 {
        self.started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Source for platforms without process statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl ProcessStatsSource for Unsupported {
    fn read(&self) -> Result<ProcessStats, ProcessStatsError> {
        Err(ProcessStatsError::Unsupported)
    }
}

/// The best source available on this platform.
pub fn platform_source(clock: ProcessClock) -> Box<dyn ProcessStatsSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcfsSource::new(clock))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = clock;
        Box::new(Unsupported)
    }
}

/// Read the source and render its lines; nothing on failure.
pub fn collect_lines(source: &dyn ProcessStatsSource) -> Vec<MetricLine> {
    match source.read() {
        Ok(stats) => render_lines(&stats),
        Err(e) => {
            info!(error = %e, "Skipping process metrics");
            Vec::new()
        }
    }
}

/// Render process statistics as unlabelled lines.
pub fn render_lines(stats: &ProcessStats) -> Vec<MetricLine> {
    let line = |name, value| MetricLine::new(name, Labels::none(), value);

    vec![
        line(
            "process_virtual_memory_bytes",
            MetricValue::Integer(stats.virtual_memory_bytes),
        ),
        line(
            "process_resident_memory_bytes",
            MetricValue::Integer(stats.resident_memory_bytes),
        ),
        line(
            "process_minor_faults_count",
            MetricValue::Integer(stats.minor_faults),
        ),
        line(
            "process_major_faults_count",
            MetricValue::Integer(stats.major_faults),
        ),
        line("process_thread_count", MetricValue::Integer(stats.threads)),
        line(
            "process_cpu_seconds_total",
            MetricValue::Float(stats.cpu_seconds),
        ),
        line(
            "process_start_time_seconds",
            MetricValue::Float(stats.start_time_seconds),
        ),
        line(
            "process_uptime_seconds",
            MetricValue::Float(stats.uptime_seconds),
        ),
    ]
}
