/// Core data types for the weather warning bridge.
///
/// This module defines the shared domain model imported by all other modules:
/// the inbound notification shape, the aggregated warning result, the
/// constants that tie the feed and the sink together, and the error enums
/// each boundary returns. It contains no I/O.

use chrono::NaiveDateTime;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Feed and sink constants
// ---------------------------------------------------------------------------

/// Substring a notification's filename must contain to be queued.
pub const DOCUMENT_EXTENSION: &str = "xml";

/// Added to the extracted severity before it is sent to the sink.
///
/// Domoticz alert devices use level 0 for "never set"; the warning feed uses
/// 0 for "no warning". Level 1 on the device therefore means "no warning".
pub const SEVERITY_SINK_OFFSET: u32 = 1;

// ---------------------------------------------------------------------------
// Notification types
// ---------------------------------------------------------------------------

/// Wire shape of a notification payload: `{"data": {"filename": .., "url": ..}}`.
#[derive(Debug, Deserialize)]
pub struct NotificationEnvelope {
    pub data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationData {
    pub filename: Option<String>,
    pub url: Option<String>,
}

/// One message received from the notification transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub topic: String,
    /// Whether the payload parsed and carried a `data` object.
    pub has_payload: bool,
    pub filename: Option<String>,
    pub url: Option<String>,
}

impl NotificationMessage {
    /// Builds a message from a raw transport payload.
    ///
    /// Payloads that are not JSON, or that lack a `data` object, produce a
    /// message with `has_payload == false` rather than an error.
    pub fn from_payload(topic: &str, payload: &[u8]) -> Self {
        let data = serde_json::from_slice::<NotificationEnvelope>(payload)
            .ok()
            .and_then(|envelope| envelope.data);

        match data {
            Some(data) => NotificationMessage {
                topic: topic.to_string(),
                has_payload: true,
                filename: data.filename,
                url: data.url,
            },
            None => NotificationMessage {
                topic: topic.to_string(),
                has_payload: false,
                filename: None,
                url: None,
            },
        }
    }

    /// True when the payload announces a new warning document.
    pub fn announces_document(&self) -> bool {
        self.has_payload
            && self
                .filename
                .as_deref()
                .is_some_and(|name| name.contains(DOCUMENT_EXTENSION))
    }
}

// ---------------------------------------------------------------------------
// Warning result
// ---------------------------------------------------------------------------

/// Aggregated warning state for the configured location.
///
/// Rebuilt from the full document on every extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningResult {
    /// Highest `location_warning_status` seen for the location; 0 = none.
    pub severity: u32,
    /// Timeslice of the first matched warning, in document order.
    pub start_time: Option<NaiveDateTime>,
    /// Timeslice of the last matched warning, in document order.
    pub end_time: Option<NaiveDateTime>,
    /// Warning texts in first-occurrence order, without duplicates.
    pub messages: Vec<String>,
    pub rendered_text: String,
}

impl WarningResult {
    /// The result used before any document has been downloaded.
    pub fn no_data(text: &str) -> Self {
        WarningResult {
            severity: 0,
            start_time: None,
            end_time: None,
            messages: Vec::new(),
            rendered_text: text.to_string(),
        }
    }

    /// Severity in the sink's encoding.
    pub fn sink_level(&self) -> u32 {
        self.severity + SEVERITY_SINK_OFFSET
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while reading a warning document into a tree.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("Document has no root element")]
    Empty,
}

/// Errors from the KNMI open data API.
#[derive(Debug, thiserror::Error)]
pub enum KnmiError {
    #[error("HTTP error: {status} from {url}")]
    Http { status: u16, url: String },
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Stream interrupted: {0}")]
    Stream(#[source] std::io::Error),
    #[error("Write failed for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No files listed for dataset {0}")]
    NoFiles(String),
}

/// Outcome classes of a failed document acquisition.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Retries exhausted on a failure that may clear up by itself; the URL
    /// is kept and tried again on the next tick.
    #[error("transient acquisition failure for {url}: {source}")]
    Transient {
        url: String,
        #[source]
        source: KnmiError,
    },
    /// Operator intervention needed; the service should stop.
    #[error("fatal acquisition failure for {url}: {reason}")]
    Fatal { url: String, reason: String },
    /// The queue's producer side is gone, nothing more can arrive.
    #[error("download queue disconnected")]
    QueueClosed,
}

impl AcquireError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AcquireError::Transient { .. })
    }
}

/// Errors from the home-automation sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Sink rejected {param}: status {status}")]
    Rejected { param: String, status: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_with_xml_filename_announces_document() {
        let payload = br#"{"data":{"filename":"knmi_waarschuwingen_202402120747.xml","url":"U"}}"#;
        let msg = NotificationMessage::from_payload("t", payload);
        assert!(msg.has_payload);
        assert!(msg.announces_document());
        assert_eq!(msg.url.as_deref(), Some("U"));
    }

    #[test]
    fn test_notification_without_data_has_no_payload() {
        let msg = NotificationMessage::from_payload("t", br#"{"specversion":"1.0"}"#);
        assert!(!msg.has_payload);
        assert!(!msg.announces_document());
    }

    #[test]
    fn test_non_json_payload_is_not_an_error() {
        let msg = NotificationMessage::from_payload("t", b"\x00garbage");
        assert!(!msg.has_payload);
    }

    #[test]
    fn test_other_file_types_do_not_announce_document() {
        let payload = br#"{"data":{"filename":"knmi_waarschuwingen.pdf","url":"U"}}"#;
        assert!(!NotificationMessage::from_payload("t", payload).announces_document());
    }

    #[test]
    fn test_sink_level_adds_offset() {
        let mut result = WarningResult::no_data("x");
        assert_eq!(result.sink_level(), 1);
        result.severity = 2;
        assert_eq!(result.sink_level(), 3);
    }

    #[test]
    fn test_only_transient_acquire_errors_are_recoverable() {
        let fatal = AcquireError::Fatal { url: "u".into(), reason: "HTTP 403".into() };
        assert!(fatal.is_fatal());
        assert!(AcquireError::QueueClosed.is_fatal());
    }
}
