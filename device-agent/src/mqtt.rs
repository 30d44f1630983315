use crate::config::Config;
use crate::errors::{Error, Result};
use crate::topics::{DeviceIdentity, Topics};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Outbound side of the broker connection. Everything goes out at QoS 1.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
    async fn subscribe(&self, topic: &str) -> Result<()>;
}

#[async_trait]
impl Transport for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(Error::Mqtt)
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        AsyncClient::subscribe(self, topic, QoS::AtLeastOnce)
            .await
            .map_err(Error::Mqtt)
    }
}

/// Messages the listener hands to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    RegistrationResponse(String),
    Command(String),
    /// The broker connection came back after a drop
    Reconnected,
}

pub fn build_options(config: &Config, identity: &DeviceIdentity) -> MqttOptions {
    let mut options = MqttOptions::new(
        identity.client_id(),
        &config.mqtt.mqtt_broker,
        config.mqtt.mqtt_port,
    );
    options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));
    options.set_clean_session(true);
    options.set_credentials(config.mqtt_username(), &config.mqtt.mqtt_password);
    options
}

pub fn new(options: MqttOptions) -> (AsyncClient, EventLoop) {
    AsyncClient::new(options, 100)
}

/// Drives the event loop until the broker accepts the connection.
/// Any failure before that is final; there is no retry.
pub async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(Error::Refused(ack.code));
            }
            event => debug!("Event before CONNACK: {:?}", event),
        }
    }
}

/// Maps an incoming publish onto an [`Inbound`] event, ignoring other topics.
pub fn classify(topics: &Topics, topic: &str, payload: &[u8]) -> Option<Inbound> {
    let text = String::from_utf8_lossy(payload).into_owned();

    if topic == topics.register_response {
        Some(Inbound::RegistrationResponse(text))
    } else if topic == topics.commands {
        Some(Inbound::Command(text))
    } else {
        None
    }
}

/// Polls the event loop forever, forwarding inbound messages to `tx`.
/// rumqttc reconnects on the next poll after an error.
pub async fn run_listener(mut eventloop: EventLoop, topics: Topics, tx: mpsc::Sender<Inbound>) {
    let mut connection_lost = false;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Received message on topic {}, size: {} bytes",
                    publish.topic,
                    publish.payload.len()
                );

                let Some(inbound) = classify(&topics, &publish.topic, &publish.payload) else {
                    warn!("Ignoring message on unexpected topic {}", publish.topic);
                    continue;
                };
                if tx.send(inbound).await.is_err() {
                    info!("Main loop gone, stopping MQTT listener");
                    return;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) if connection_lost => {
                info!("Reconnected to MQTT broker");
                connection_lost = false;
                if tx.send(Inbound::Reconnected).await.is_err() {
                    return;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker sent disconnect");
            }
            Ok(_) => {}
            Err(e) => {
                if !connection_lost {
                    error!("Unexpected disconnection from MQTT broker: {}", e);
                    connection_lost = true;
                } else {
                    debug!("MQTT eventloop error: {}", e);
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn topics() -> Topics {
        DeviceIdentity::new("dev", "AA:BB:CC:DD:EE:FF", "U").topics()
    }

    #[test]
    fn test_classify_command() {
        let inbound = classify(&topics(), "/U/devices/AA_BB_CC_DD_EE_FF/commands", b"STATUS");
        assert_eq!(inbound, Some(Inbound::Command("STATUS".to_string())));
    }

    #[test]
    fn test_classify_registration_response() {
        let inbound = classify(
            &topics(),
            "/U/devices/register-response",
            br#"{"status":"registered"}"#,
        );
        assert_eq!(
            inbound,
            Some(Inbound::RegistrationResponse(
                r#"{"status":"registered"}"#.to_string()
            ))
        );
    }

    #[test]
    fn test_classify_ignores_other_topics() {
        assert_eq!(classify(&topics(), "/U/devices/other/commands", b"ARM"), None);
    }

    #[test]
    fn test_build_options_uses_identity() {
        let config = Config::parse_from(["device-agent", "--mqtt-port", "1884"]);
        let identity = DeviceIdentity::from(&config.device);
        let options = build_options(&config, &identity);

        assert_eq!(options.client_id(), "esp32-AABBCCDDEEFF");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1884));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }
}
