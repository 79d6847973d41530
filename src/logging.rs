/// Structured logging for the warning bridge service
///
/// Installs a `tracing` subscriber that writes to the console and, when a
/// log directory is configured, to a rotating log file. Events carry a
/// `component` field so daemon logs can be filtered per pipeline stage.

use crate::config::SERVICE_NAME;
use crate::model::KnmiError;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Rotated log files kept next to the active one.
const MAX_LOG_FILES: usize = 3;

// ---------------------------------------------------------------------------
// Pipeline components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Intake,
    Acquire,
    Extract,
    Scheduler,
    Sink,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Intake => write!(f, "intake"),
            Component::Acquire => write!(f, "acquire"),
            Component::Extract => write!(f, "extract"),
            Component::Scheduler => write!(f, "scheduler"),
            Component::Sink => write!(f, "sink"),
            Component::System => write!(f, "system"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - network blips the retry policy absorbs
    Expected,
    /// Unexpected failure - indicates a configuration issue or a broken feed
    Unexpected,
    /// Unknown - server-side trouble that may or may not clear up
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a single failed call against the open data API.
pub fn classify_knmi_failure(err: &KnmiError) -> FailureType {
    match err {
        KnmiError::Request(e) if e.is_timeout() || e.is_connect() => FailureType::Expected,
        KnmiError::Request(_) => FailureType::Unknown,
        KnmiError::Stream(_) => FailureType::Expected,
        KnmiError::Http { status, .. } if *status >= 500 => FailureType::Unknown,
        KnmiError::Http { .. } => FailureType::Unexpected,
        KnmiError::Write { .. } => FailureType::Unexpected,
        KnmiError::NoFiles(_) => FailureType::Unknown,
    }
}

/// Log an open data API failure with automatic classification
pub fn log_knmi_failure(url: &str, operation: &str, err: &KnmiError) {
    let failure_type = classify_knmi_failure(err);
    let component = Component::Acquire;

    match failure_type {
        FailureType::Expected => {
            debug!(%component, url, "{} failed [{}]: {}", operation, failure_type, err)
        }
        FailureType::Unexpected => {
            error!(%component, url, "{} failed [{}]: {}", operation, failure_type, err)
        }
        FailureType::Unknown => {
            warn!(%component, url, "{} failed [{}]: {}", operation, failure_type, err)
        }
    }
}

/// Log a summary of one queue drain
pub fn log_drain_summary(total: usize, successful: usize, failed: usize) {
    let component = Component::Acquire;
    if failed == 0 {
        info!(%component, "Drain complete: {}/{} downloaded", successful, total);
    } else if successful == 0 {
        error!(%component, "Drain complete: {}/{} downloaded, {} failed", successful, total, failed);
    } else {
        warn!(%component, "Drain complete: {}/{} downloaded, {} failed", successful, total, failed);
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level {level:?}: {source}")]
    Filter {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("cannot open log directory {path}: {source}")]
    File {
        path: String,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
    #[error("logger already initialised: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. When `log_dir` is set, a daily
/// rotating file `<service>.<date>.log` is written there as well; keep the
/// returned guard alive for the process lifetime or buffered lines are lost.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|source| LoggingError::Filter {
            level: level.to_string(),
            source,
        })?,
    };

    let console = tracing_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(SERVICE_NAME)
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(dir)
                .map_err(|source| LoggingError::File {
                    path: dir.display().to_string(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_unexpected() {
        let err = KnmiError::Http { status: 403, url: "u".into() };
        assert_eq!(classify_knmi_failure(&err), FailureType::Unexpected);
    }

    #[test]
    fn test_server_errors_are_unknown() {
        let err = KnmiError::Http { status: 503, url: "u".into() };
        assert_eq!(classify_knmi_failure(&err), FailureType::Unknown);
    }

    #[test]
    fn test_write_errors_are_unexpected() {
        let err = KnmiError::Write {
            path: "/tmp/x".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(classify_knmi_failure(&err), FailureType::Unexpected);
    }

    #[test]
    fn test_component_names() {
        assert_eq!(Component::Intake.to_string(), "intake");
        assert_eq!(Component::Scheduler.to_string(), "scheduler");
    }
}
