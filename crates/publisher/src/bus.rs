//! Message Bus Sink

use crate::SinkError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Outbound message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one payload; returns once the message is handed to the transport
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

/// MQTT connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client id prefix; a random suffix keeps ids unique per connection
    pub client_id_prefix: String,
    /// Keep-alive interval (seconds)
    pub keep_alive_secs: u64,
    /// Time allowed for the initial CONNACK (milliseconds)
    pub connect_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "mosquitto".to_string(),
            port: 1883,
            client_id_prefix: "vibration-fft".to_string(),
            keep_alive_secs: 60,
            connect_timeout_ms: 10_000,
        }
    }
}

impl MqttConfig {
    /// Options for one connection; `role` distinguishes publisher and subscriber ids
    pub fn options(&self, role: &str) -> MqttOptions {
        let client_id = format!("{}-{}-{}", self.client_id_prefix, role, Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)));
        options
    }
}

/// Drive the event loop until the broker acknowledges the connection.
///
/// Used at startup so an unreachable broker fails fast instead of retrying forever.
pub async fn wait_for_connack(eventloop: &mut EventLoop, limit: Duration) -> Result<(), SinkError> {
    let handshake = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!("MQTT connack: {:?}", ack.code);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(SinkError::Connection(e.to_string())),
            }
        }
    };

    tokio::time::timeout(limit, handshake)
        .await
        .map_err(|_| SinkError::Connection(format!("no CONNACK within {}ms", limit.as_millis())))?
}

/// MQTT implementation of [`MessageBus`], QoS 0 and no retain
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Wrap an existing client whose event loop is driven elsewhere
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    /// Connect to the broker and spawn the event loop driver
    pub async fn connect(config: &MqttConfig) -> Result<Self, SinkError> {
        let (client, mut eventloop) = AsyncClient::new(config.options("pub"), 64);
        wait_for_connack(&mut eventloop, Duration::from_millis(config.connect_timeout_ms)).await?;
        info!("Connected to MQTT broker {}:{} for publishing", config.host, config.port);

        // Spawn event loop handler; rumqttc reconnects on the next poll
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT publisher connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self::new(client))
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| SinkError::Publish(e.to_string()))
    }
}
