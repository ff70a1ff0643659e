//! MQTT adapter for the broker session
//!
//! Implements [`BrokerLink`] on top of rumqttc. The event loop is not
//! spawned on its own task: the ingestion loop is cooperative, so
//! keep-alive and inbound traffic are drained in small budgeted slices
//! from [`BrokerLink::service`] each turn.

use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

use crate::link::{BrokerCredentials, BrokerLink};

/// Keep-alive negotiated with the broker.
const KEEP_ALIVE: Duration = Duration::from_secs(30);
/// Outstanding-request capacity of the rumqttc client channel.
const CHANNEL_CAPACITY: usize = 10;
/// How long one connect attempt waits for the broker's CONNACK.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-turn budget for draining the event loop.
const SERVICE_POLL_BUDGET: Duration = Duration::from_millis(5);

struct ActiveSession {
    client: AsyncClient,
    eventloop: EventLoop,
    connected: bool,
}

/// Broker session over MQTT.
pub struct MqttBroker {
    host: String,
    port: u16,
    session: Option<ActiveSession>,
}

impl MqttBroker {
    /// Create an unconnected broker adapter from a `mqtt://host:port` URL.
    /// The connection supervisor drives the actual connect.
    pub fn new(broker_url: &str) -> Result<Self> {
        let (host, port) = parse_broker_url(broker_url)?;
        Ok(Self {
            host,
            port,
            session: None,
        })
    }
}

async fn wait_for_connack(
    eventloop: &mut EventLoop,
) -> Result<ConnectReturnCode, rumqttc::ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack.code),
            Ok(event) => debug!(?event, "event before CONNACK"),
            Err(e) => return Err(e),
        }
    }
}

impl BrokerLink for MqttBroker {
    async fn connect(
        &mut self,
        client_id: &str,
        credentials: Option<&BrokerCredentials>,
    ) -> bool {
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(creds) = credentials {
            options.set_credentials(&creds.username, &creds.password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        match tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(ConnectReturnCode::Success)) => {
                self.session = Some(ActiveSession {
                    client,
                    eventloop,
                    connected: true,
                });
                true
            }
            Ok(Ok(code)) => {
                warn!(reason = ?code, "broker refused connection");
                false
            }
            Ok(Err(e)) => {
                warn!(error = %e, "broker connection error");
                false
            }
            Err(_) => {
                warn!(timeout = ?CONNECT_TIMEOUT, "broker connection timed out");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.connected)
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> bool {
        let Some(session) = self.session.as_ref().filter(|s| s.connected) else {
            return false;
        };

        // QoS 0: readings are at-most-once end to end, a dropped field
        // is replaced by the next telegram anyway.
        match session
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes())
        {
            Ok(()) => {
                debug!(topic = topic, payload = payload, "published");
                true
            }
            Err(e) => {
                warn!(topic = topic, error = %e, "publish rejected");
                false
            }
        }
    }

    async fn service(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match tokio::time::timeout(SERVICE_POLL_BUDGET, session.eventloop.poll()).await {
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                // Nothing consumes inbound messages; log and move on.
                info!(
                    topic = %publish.topic,
                    payload = %String::from_utf8_lossy(&publish.payload),
                    "inbound broker message"
                );
            }
            Ok(Ok(event)) => debug!(?event, "broker event"),
            Ok(Err(e)) => {
                warn!(error = %e, "broker session lost");
                session.connected = false;
            }
            // Nothing pending within the budget this turn.
            Err(_) => {}
        }
    }
}

/// Parse an MQTT broker URL into host and port.
///
/// Supports:
/// - mqtt://localhost:1883
/// - mqtt://192.168.1.104:1883
/// - mqtts://broker.example.com:8883 (TLS, for future)
pub fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let url_without_protocol = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("mqtts://"))
        .context("Invalid MQTT URL: must start with mqtt:// or mqtts://")?;

    if let Some((host, port_str)) = url_without_protocol.split_once(':') {
        let port = port_str
            .parse::<u16>()
            .context("Invalid port number in MQTT URL")?;
        Ok((host.to_string(), port))
    } else {
        // Default port if not specified
        Ok((url_without_protocol.to_string(), 1883))
    }
}
