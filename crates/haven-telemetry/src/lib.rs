mod logging;
mod metrics;

pub use logging::{LogCaptureLayer, LogQuery, LogRecord, LogStore};
pub use metrics::{MetricType, MetricsQuery, MetricsRecorder, MetricsSnapshot};

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "haven_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Whether to persist logs to SQLite.
    pub log_to_sqlite: bool,
    /// Lowest level captured into the log store.
    pub capture_level: Level,
    /// Path to the log database.
    pub log_db_path: PathBuf,
    /// Whether metrics recording is enabled.
    pub metrics_enabled: bool,
    /// Path to the metrics database.
    pub metrics_db_path: PathBuf,
    /// How often to snapshot metrics to SQLite (seconds).
    pub metrics_snapshot_interval_secs: u64,
    /// How many days of metrics to retain.
    pub metrics_retention_days: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let haven_dir = dirs_fallback();
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            log_to_sqlite: true,
            capture_level: Level::WARN,
            log_db_path: haven_dir.join("database/haven-logs.db"),
            metrics_enabled: true,
            metrics_db_path: haven_dir.join("database/haven-metrics.db"),
            metrics_snapshot_interval_secs: 60,
            metrics_retention_days: 7,
        }
    }
}

/// Guard holding the live telemetry sinks. The metrics snapshot thread
/// stops once the guard (and with it the last strong recorder handle)
/// is dropped.
pub struct TelemetryGuard {
    log_store: Option<Arc<LogStore>>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl TelemetryGuard {
    /// Access the metrics recorder for recording and querying.
    pub fn metrics(&self) -> Option<&MetricsRecorder> {
        self.metrics.as_deref()
    }

    /// Shared recorder handle to thread into engine deps.
    pub fn metrics_handle(&self) -> Option<Arc<MetricsRecorder>> {
        self.metrics.clone()
    }

    /// Access the log store for querying captured logs.
    pub fn logs(&self) -> Option<&LogStore> {
        self.log_store.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // JSON formatting layer for stdout
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_span_list(true)
        .with_filter(env_filter);

    // Optional SQLite capture for incident review
    let (capture_layer, log_store) = if config.log_to_sqlite {
        match LogStore::new(&config.log_db_path) {
            Ok(store) => {
                let store = Arc::new(store);
                let layer = LogCaptureLayer::new(store.clone(), config.capture_level);
                (Some(layer), Some(store))
            }
            Err(e) => {
                eprintln!("haven-telemetry: failed to open log DB: {e}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(capture_layer)
        .init();

    let metrics = if config.metrics_enabled {
        match MetricsRecorder::new(&config.metrics_db_path) {
            Ok(recorder) => {
                let recorder = Arc::new(recorder);
                spawn_snapshot_thread(
                    Arc::downgrade(&recorder),
                    Duration::from_secs(config.metrics_snapshot_interval_secs.max(1)),
                    config.metrics_retention_days,
                );
                Some(recorder)
            }
            Err(e) => {
                tracing::warn!("haven-telemetry: failed to open metrics DB: {e}");
                None
            }
        }
    } else {
        None
    };

    TelemetryGuard { log_store, metrics }
}

/// Background snapshot loop. Holds only a weak handle so it winds down
/// when the guard drops.
fn spawn_snapshot_thread(recorder: Weak<MetricsRecorder>, interval: Duration, retention_days: u32) {
    std::thread::Builder::new()
        .name("haven-metrics-snapshot".into())
        .spawn(move || loop {
            std::thread::sleep(interval);
            let Some(recorder) = recorder.upgrade() else {
                return;
            };
            if let Err(e) = recorder.snapshot() {
                tracing::warn!(error = %e, "metrics snapshot failed");
            }
            if let Err(e) = recorder.prune(retention_days) {
                tracing::warn!(error = %e, "metrics prune failed");
            }
        })
        .ok();
}

/// Fallback home dir for default paths.
fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".haven")
}
