/// MQTT notification transport.
///
/// Connects to the KNMI notification broker over secure websockets and
/// forwards connection, subscription and message events to a
/// [`NotificationHandler`]. Runs on its own thread; reconnects are left to
/// the client's event loop, with a pause between failed attempts.
///
/// Broker documentation: https://developer.dataplatform.knmi.nl/notification-service

use crate::config::MqttConfig;
use crate::ingest::intake::NotificationHandler;
use crate::logging::Component;
use rumqttc::{Client, Event, Incoming, MqttOptions, QoS, Transport};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// The broker authenticates on the password (the token) only.
const MQTT_USERNAME: &str = "token";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 10;

pub struct MqttTransport {
    options: MqttOptions,
}

/// Websocket URL for a broker host, as the client library expects it.
pub fn broker_url(config: &MqttConfig) -> String {
    format!("wss://{}:{}/mqtt", config.broker_domain, config.port)
}

impl MqttTransport {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), broker_url(config), config.port);
        options.set_transport(Transport::wss_with_default_config());
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        // Keep the session so QoS 1 messages missed while offline are replayed.
        options.set_clean_session(false);
        options.set_credentials(MQTT_USERNAME, config.token.clone());
        MqttTransport { options }
    }

    /// Starts the connection thread.
    pub fn spawn(self, handler: Arc<dyn NotificationHandler>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("mqtt-notifications".to_string())
            .spawn(move || self.run(handler))
    }

    fn run(self, handler: Arc<dyn NotificationHandler>) {
        let component = Component::Intake;
        let (client, mut connection) = Client::new(self.options, REQUEST_CAPACITY);
        let mut awaiting_ack: VecDeque<String> = VecDeque::new();

        for notification in connection.iter() {
            match notification {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    awaiting_ack.clear();
                    for topic in handler.on_connect(ack.session_present) {
                        match client.subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            Ok(()) => awaiting_ack.push_back(topic),
                            Err(err) => error!(%component, %topic, "Subscribe request failed: {}", err),
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::SubAck(_))) => {
                    if let Some(topic) = awaiting_ack.pop_front() {
                        handler.on_subscribe(&topic);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    handler.on_message(&publish.topic, &publish.payload);
                }
                Ok(event) => debug!(%component, ?event, "MQTT event"),
                Err(err) => {
                    warn!(%component, "Notification connection lost: {}", err);
                    thread::sleep(RECONNECT_DELAY);
                }
            }
        }
    }
}
