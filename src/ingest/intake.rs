/// Notification intake.
///
/// The transport boundary is the [`NotificationHandler`] trait: a concrete
/// transport (see `ingest::mqtt`) calls it from its own connection thread.
/// [`IntakeFilter`] implements it by queueing the URL of every announced
/// warning document and ignoring everything else.
///
/// Nothing here may block for longer than a queue append; slow handlers
/// hold up QoS 1 acknowledgements on the broker connection.

use crate::logging::Component;
use crate::model::NotificationMessage;
use crate::queue::QueueSender;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Transport boundary
// ---------------------------------------------------------------------------

/// Callbacks a notification transport drives.
pub trait NotificationHandler: Send + Sync {
    /// Called after every (re)connect. Returns the topics to subscribe to.
    fn on_connect(&self, session_present: bool) -> Vec<String>;

    /// Called when the broker acknowledges a subscription.
    fn on_subscribe(&self, topic: &str);

    /// Called for every message delivered on a subscribed topic.
    fn on_message(&self, topic: &str, payload: &[u8]);
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// What the filter did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeDecision {
    Queued(String),
    Ignored,
}

pub struct IntakeFilter {
    topic: String,
    queue: QueueSender,
}

impl IntakeFilter {
    pub fn new(topic: impl Into<String>, queue: QueueSender) -> Self {
        IntakeFilter {
            topic: topic.into(),
            queue,
        }
    }

    /// Queues the document URL if `msg` announces a new warning document.
    pub fn accept(&self, msg: &NotificationMessage) -> IntakeDecision {
        let component = Component::Intake;

        if !msg.has_payload {
            info!(%component, topic = %msg.topic, "Received message without file data, ignored");
            return IntakeDecision::Ignored;
        }

        if !msg.announces_document() {
            debug!(%component, filename = ?msg.filename, "Not a warning document, ignored");
            return IntakeDecision::Ignored;
        }

        match msg.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                debug!(%component, url, "Added to queue");
                self.queue.enqueue(url.to_string());
                IntakeDecision::Queued(url.to_string())
            }
            _ => {
                warn!(%component, filename = ?msg.filename, "Document announced without a URL, ignored");
                IntakeDecision::Ignored
            }
        }
    }
}

impl NotificationHandler for IntakeFilter {
    fn on_connect(&self, session_present: bool) -> Vec<String> {
        info!(component = %Component::Intake, session_present, "Connected to notification broker");
        vec![self.topic.clone()]
    }

    fn on_subscribe(&self, topic: &str) {
        info!(component = %Component::Intake, "Subscribed to topic '{}'", topic);
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        let msg = NotificationMessage::from_payload(topic, payload);
        self.accept(&msg);
    }
}
