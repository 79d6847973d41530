/// Daemon entry point.
///
/// Usage: `wxalert_service [config.toml]`
///
/// Exit codes: 0 after a requested shutdown, 1 when document acquisition
/// fails fatally, 2 for configuration or startup errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use wxalert_service::config::{self, Config, SERVICE_NAME};
use wxalert_service::ingest::acquire::{FileAcquirer, bootstrap_latest};
use wxalert_service::ingest::intake::IntakeFilter;
use wxalert_service::ingest::knmi::OpenDataApi;
use wxalert_service::ingest::mqtt::MqttTransport;
use wxalert_service::logging::{Component, init_logging};
use wxalert_service::model::{AcquireError, KnmiError, SinkError};
use wxalert_service::queue;
use wxalert_service::scheduler::{RefreshScheduler, shutdown_channel};
use wxalert_service::sink::Domoticz;
use wxalert_service::warnings::{LocalDocument, Renderer, WarningExtractor};

const EXIT_FATAL_ACQUISITION: u8 = 1;
const EXIT_SETUP: u8 = 2;

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("open data client: {0}")]
    Knmi(#[from] KnmiError),
    #[error("sink client: {0}")]
    Sink(#[from] SinkError),
    #[error("notification thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    Acquire(#[from] AcquireError),
}

fn main() -> ExitCode {
    let config_path = config::resolve_path(std::env::args().nth(1));
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ {}", err);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    let log_dir = (!config.global.log_path.is_empty()).then(|| PathBuf::from(&config.global.log_path));
    let _log_guard = match init_logging(&config.global.log_level, log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("✗ {}", err);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    config.log_summary();

    match run(&config) {
        Ok(()) => {
            info!(component = %Component::System, "{} stopped", SERVICE_NAME);
            ExitCode::SUCCESS
        }
        Err(ServiceError::Acquire(err)) => {
            error!(component = %Component::System, "Program terminated: {}", err);
            ExitCode::from(EXIT_FATAL_ACQUISITION)
        }
        Err(err) => {
            error!(component = %Component::System, "Startup failed: {}", err);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn run(config: &Config) -> Result<(), ServiceError> {
    let document_path = &config.global.document_path;
    let (queue_tx, queue_store) = queue::channel();

    let api = OpenDataApi::new(&config.dataplatform)?;
    bootstrap_latest(&api, &config.dataplatform, document_path, &queue_tx);

    let intake = Arc::new(IntakeFilter::new(config.mqtt.topic.clone(), queue_tx));
    MqttTransport::new(&config.mqtt).spawn(intake)?;

    let sink = Domoticz::new(&config.domoticz)?;
    match sink.status() {
        Ok(Some(device)) => info!(component = %Component::Sink, "Reporting to device {} ({})", device.idx, device.name),
        Ok(None) => warn!(component = %Component::Sink, "Device {} not found in Domoticz", sink.device_id()),
        Err(err) => warn!(component = %Component::Sink, "Device status check failed: {}", err),
    }

    let renderer = Renderer::new(config.domoticz.weekdays.clone(), config.text.clone());
    let extractor = LocalDocument {
        path: document_path.clone(),
        extractor: WarningExtractor::new(config.domoticz.province.clone(), renderer),
    };
    let acquirer = FileAcquirer::new(api, queue_store, document_path, &config.retry);

    let (shutdown_handle, shutdown) = shutdown_channel();
    ctrlc::set_handler(move || shutdown_handle.trigger())?;

    let audit_message = format!("{}: Has updated device {}", SERVICE_NAME, config.domoticz.device_id);
    let mut scheduler = RefreshScheduler::new(
        acquirer,
        extractor,
        sink,
        config.cycles_per_refresh(),
        config.wait_interval(),
        audit_message,
    );

    scheduler.run(&shutdown)?;
    Ok(())
}
