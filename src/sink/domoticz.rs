/// Domoticz JSON API Client
///
/// Pushes the warning level and text to a Domoticz alert device and writes
/// audit lines to the Domoticz log.
///
/// API Documentation: https://www.domoticz.com/wiki/Domoticz_API/JSON_URL%27s
/// Authorization: https://www.domoticz.com/wiki/Domoticz_API/JSON_URL%27s#Authorization

use crate::config::DomoticzConfig;
use crate::logging::Component;
use crate::model::SinkError;
use crate::scheduler::Sink;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Domoticz log level for normal status messages.
pub const LOG_LEVEL_STATUS: u8 = 2;

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub result: Vec<DeviceStatus>,
}

/// Subset of a `getdevices` entry
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatus {
    pub idx: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Data", default)]
    pub data: Option<String>,
    #[serde(rename = "LastUpdate", default)]
    pub last_update: Option<String>,
}

// ============================================================================
// API Client
// ============================================================================

pub struct Domoticz {
    client: reqwest::blocking::Client,
    endpoint: String,
    authorization: String,
    device_id: u32,
}

impl Domoticz {
    pub fn new(config: &DomoticzConfig) -> Result<Self, SinkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.url, &config.authorization, config.device_id))
    }

    pub fn with_client(
        client: reqwest::blocking::Client,
        base_url: &str,
        authorization: &str,
        device_id: u32,
    ) -> Self {
        Domoticz {
            client,
            endpoint: format!("{}/json.htm", base_url.trim_end_matches('/')),
            authorization: authorization.to_string(),
            device_id,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    fn command(&self, param: &str, params: &[(&str, String)]) -> Result<ApiResponse, SinkError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("type", "command"), ("param", param)])
            .query(params);
        if !self.authorization.is_empty() {
            request = request.header("Authorization", &self.authorization);
        }

        let response = request.send()?;
        debug!(component = %Component::Sink, url = %response.url(), "=> Domoticz");

        if !response.status().is_success() {
            return Err(SinkError::Http(response.status().as_u16()));
        }

        let body: ApiResponse = response.json()?;
        if body.status != "OK" {
            return Err(SinkError::Rejected {
                param: param.to_string(),
                status: body.status,
            });
        }
        Ok(body)
    }

    /// Status of the configured device
    pub fn status(&self) -> Result<Option<DeviceStatus>, SinkError> {
        let body = self.command("getdevices", &[("rid", self.device_id.to_string())])?;
        Ok(body.result.into_iter().next())
    }

    /// Set the device's level and text
    pub fn update(&self, nvalue: u32, svalue: &str) -> Result<(), SinkError> {
        self.command(
            "udevice",
            &[
                ("idx", self.device_id.to_string()),
                ("nvalue", nvalue.to_string()),
                ("svalue", svalue.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Append a line to the Domoticz log
    pub fn log(&self, message: &str, level: u8) -> Result<(), SinkError> {
        self.command(
            "addlogmessage",
            &[("message", message.to_string()), ("level", level.to_string())],
        )?;
        Ok(())
    }
}

impl Sink for Domoticz {
    fn update_device(&self, level: u32, text: &str) -> Result<(), SinkError> {
        self.update(level, text)
    }

    fn audit(&self, message: &str) -> Result<(), SinkError> {
        self.log(message, LOG_LEVEL_STATUS)
    }
}
