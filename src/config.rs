/// Service configuration.
///
/// Loaded once at startup from a TOML file, with secrets optionally supplied
/// through the environment (a `.env` file is honoured). The resulting
/// [`Config`] is immutable and handed to each component's constructor.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Config file used when neither a CLI argument nor `WXALERT_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "WeatherAlertToDomoticz.toml";

/// Name used for the log file, the local document and sink audit lines.
pub const SERVICE_NAME: &str = "WeatherAlertToDomoticz";

const ENV_CONFIG_PATH: &str = "WXALERT_CONFIG";
const ENV_API_KEY: &str = "KNMI_API_KEY";
const ENV_NOTIFICATION_TOKEN: &str = "KNMI_NOTIFICATION_TOKEN";
const ENV_DOMOTICZ_AUTH: &str = "DOMOTICZ_AUTHORIZATION";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub dataplatform: DataPlatformConfig,
    pub domoticz: DomoticzConfig,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub text: TextConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Notification broker connection.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker_domain: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    pub client_id: String,
    #[serde(default)]
    pub token: String,
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

/// KNMI open data API.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPlatformConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub dataset_name: String,
    pub dataset_version: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Download the newest file at startup when no local document exists.
    #[serde(default = "default_true")]
    pub bootstrap_latest: bool,
}

/// Home-automation sink and the location it reports on.
#[derive(Debug, Clone, Deserialize)]
pub struct DomoticzConfig {
    pub url: String,
    #[serde(default)]
    pub authorization: String,
    pub device_id: u32,
    /// Target location identifier as it appears in `location_id`.
    pub province: String,
    /// Weekday names, Monday first.
    pub weekdays: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Directory for the rotating log file; no file logging when empty.
    #[serde(default)]
    pub log_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_wait_execution")]
    pub wait_execution_secs: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_document_path")]
    pub document_path: PathBuf,
}

/// Operator-facing strings, Dutch by default.
#[derive(Debug, Clone, Deserialize)]
pub struct TextConfig {
    #[serde(default = "default_from_label")]
    pub from_label: String,
    #[serde(default = "default_until_label")]
    pub until_label: String,
    #[serde(default = "default_no_warnings")]
    pub no_warnings: String,
    #[serde(default = "default_no_data")]
    pub no_data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Exhausted acquisitions in a row before giving up on the feed.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_broker_port() -> u16 {
    443
}

fn default_keep_alive() -> u64 {
    60
}

fn default_base_url() -> String {
    "https://api.dataplatform.knmi.nl/open-data/v1".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_wait_execution() -> u64 {
    300
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_document_path() -> PathBuf {
    PathBuf::from(format!("{}.xml", SERVICE_NAME))
}

fn default_from_label() -> String {
    "Van".to_string()
}

fn default_until_label() -> String {
    "tot".to_string()
}

fn default_no_warnings() -> String {
    "Geen waarschuwingen".to_string()
}

fn default_no_data() -> String {
    "Geen data beschikbaar\nDit kan tot 5 uur duren".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_consecutive_failures() -> u32 {
    5
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            log_path: String::new(),
            log_level: default_log_level(),
            wait_execution_secs: default_wait_execution(),
            refresh_interval_secs: default_refresh_interval(),
            document_path: default_document_path(),
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        TextConfig {
            from_label: default_from_label(),
            until_label: default_until_label(),
            no_warnings: default_no_warnings(),
            no_data: default_no_data(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Resolves the config path: CLI argument, then `WXALERT_CONFIG`, then the default.
pub fn resolve_path(cli_arg: Option<String>) -> PathBuf {
    cli_arg
        .or_else(|| env::var(ENV_CONFIG_PATH).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl Config {
    /// Reads, merges environment secrets into, and validates a config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        dotenv::dotenv().ok();

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Config::from_toml(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from TOML text without touching the environment.
    pub fn from_toml(raw: &str) -> Result<Config, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var(ENV_API_KEY) {
            self.dataplatform.api_key = key;
        }
        if let Ok(token) = env::var(ENV_NOTIFICATION_TOKEN) {
            self.mqtt.token = token;
        }
        if let Ok(auth) = env::var(ENV_DOMOTICZ_AUTH) {
            self.domoticz.authorization = auth;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domoticz.weekdays.len() != 7 {
            return Err(ConfigError::Invalid {
                key: "domoticz.weekdays",
                reason: format!("expected 7 names, got {}", self.domoticz.weekdays.len()),
            });
        }
        if self.global.wait_execution_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "global.wait_execution_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.global.refresh_interval_secs < self.global.wait_execution_secs {
            return Err(ConfigError::Invalid {
                key: "global.refresh_interval_secs",
                reason: format!(
                    "{} is shorter than the wait interval of {}",
                    self.global.refresh_interval_secs, self.global.wait_execution_secs
                ),
            });
        }
        if self.domoticz.province.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "domoticz.province",
                reason: "must not be empty".to_string(),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                key: "retry.backoff_multiplier",
                reason: format!("{} must be a finite number of at least 1.0", multiplier),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.global.wait_execution_secs)
    }

    /// Empty-queue ticks between two refreshes, counting the refresh tick.
    pub fn cycles_per_refresh(&self) -> u32 {
        let cycles = self.global.refresh_interval_secs / self.global.wait_execution_secs;
        cycles.saturating_sub(1) as u32
    }

    /// Logs every loaded setting with secrets redacted.
    pub fn log_summary(&self) {
        info!("{:=^52}", format!(" {} started ", SERVICE_NAME));
        info!(
            "[mqtt] broker={}:{} client_id={} topic={} token={}",
            self.mqtt.broker_domain,
            self.mqtt.port,
            self.mqtt.client_id,
            self.mqtt.topic,
            redact(&self.mqtt.token)
        );
        info!(
            "[dataplatform] base_url={} dataset={}/{} timeout={}s bootstrap_latest={} api_key={}",
            self.dataplatform.base_url,
            self.dataplatform.dataset_name,
            self.dataplatform.dataset_version,
            self.dataplatform.request_timeout_secs,
            self.dataplatform.bootstrap_latest,
            redact(&self.dataplatform.api_key)
        );
        info!(
            "[domoticz] url={} device_id={} province={} weekdays={} authorization={}",
            self.domoticz.url,
            self.domoticz.device_id,
            self.domoticz.province,
            self.domoticz.weekdays.join(" "),
            redact(&self.domoticz.authorization)
        );
        info!(
            "[global] wait={}s refresh={}s document={} log_path={}",
            self.global.wait_execution_secs,
            self.global.refresh_interval_secs,
            self.global.document_path.display(),
            self.global.log_path
        );
        info!(
            "[retry] attempts={} initial={}ms max={}ms x{} jitter={} escalate_after={}",
            self.retry.max_attempts,
            self.retry.initial_delay_ms,
            self.retry.max_delay_ms,
            self.retry.backoff_multiplier,
            self.retry.jitter,
            self.retry.max_consecutive_failures
        );
        info!("{}", "=".repeat(52));
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}
