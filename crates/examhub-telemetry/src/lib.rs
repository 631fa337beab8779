//! Process-wide logging: a `tracing` subscriber writing to stdout, plus
//! warn+ events persisted to SQLite so security probes can be audited later.

mod logging;

pub use logging::{LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default level. `RUST_LOG` wins when set.
    pub log_level: Level,
    /// Per-module overrides, e.g. `("examhub_store", DEBUG)`.
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Where warn+ events are persisted; `None` disables the sink.
    pub log_db_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            log_db_path: Some(PathBuf::from("data/logs.db")),
        }
    }
}

impl TelemetryConfig {
    fn directives(&self) -> String {
        std::iter::once(self.log_level.to_string().to_lowercase())
            .chain(
                self.module_levels
                    .iter()
                    .map(|(module, level)| format!("{module}={}", level.to_string().to_lowercase())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }
}

/// Returned by [`init_telemetry`]; holds the persisted-log sink.
pub struct TelemetryGuard {
    log_sink: Option<Arc<SqliteLogSink>>,
}

impl TelemetryGuard {
    pub fn logs(&self) -> Option<&SqliteLogSink> {
        self.log_sink.as_deref()
    }
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let stdout: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_span_list(true)
            .with_filter(config.env_filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_filter(config.env_filter()).boxed()
    };

    let log_sink = config
        .log_db_path
        .as_deref()
        .and_then(|path| match SqliteLogSink::new(path) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                eprintln!("examhub-telemetry: log database unavailable: {e}");
                None
            }
        });
    let persisted = log_sink.clone().map(SqliteLogLayer::new);

    if let Err(e) = tracing_subscriber::registry().with(stdout).with(persisted).try_init() {
        eprintln!("examhub-telemetry: subscriber already installed: {e}");
    }

    TelemetryGuard { log_sink }
}
