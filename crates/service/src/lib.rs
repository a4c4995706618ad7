//! Vibration FFT Service
//!
//! Subscribes to raw vibration batches over MQTT, runs them through the
//! ingest dispatcher and serves a liveness endpoint alongside.

pub mod health;
mod logging;
mod settings;

pub use logging::init_logging;
pub use settings::{ConfigError, ServiceConfig};

use dispatcher::{DispatchStats, DispatcherConfig, IngestDispatcher};
use inference_engine::{AnomalyScorer, InferenceError};
use publisher::{
    wait_for_connack, FanoutPublisher, InfluxStore, MqttBus, MqttConfig, SinkError, TimeSeriesStore,
};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Raw payloads queued between the subscriber and the dispatcher
const INGEST_QUEUE_DEPTH: usize = 256;

/// Pause between subscriber reconnect attempts
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Startup failures; nothing after startup is fatal
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Scoring model unusable: {0}")]
    Model(#[from] InferenceError),
    #[error("Sink unavailable: {0}")]
    Sink(#[from] SinkError),
    #[error("Subscription to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the service until Ctrl-C
pub async fn run(config: ServiceConfig) -> Result<DispatchStats, ServiceError> {
    run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C, shutting down");
    })
    .await
}

/// Run the service until `shutdown` resolves
pub async fn run_until<S>(config: ServiceConfig, shutdown: S) -> Result<DispatchStats, ServiceError>
where
    S: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let scorer = AnomalyScorer::load(config.model_path())?;

    let mqtt = config.mqtt_config();
    let bus = Arc::new(MqttBus::connect(&mqtt).await?);

    let store = match config.influx_config() {
        Some(influx) => {
            let store = InfluxStore::new(influx, config.sink_timeout())?;
            store.ping().await?;
            Some(Arc::new(store) as Arc<dyn TimeSeriesStore>)
        }
        None => {
            warn!("INFLUX_TOKEN not set, time-series writes disabled");
            None
        }
    };

    let publisher = FanoutPublisher::new(bus, store, config.publisher_config());
    let dispatcher = IngestDispatcher::new(
        DispatcherConfig {
            window: config.window_config(),
            top_n: config.top_n,
            spectrum_mode: config.spectrum_mode,
        },
        scorer,
        publisher,
    );

    let (client, eventloop) = subscribe(&mqtt, &config.topic_in).await?;
    let health = health::spawn(config.health_port).await?;

    let (tx, rx) = mpsc::channel(INGEST_QUEUE_DEPTH);
    let topic = config.topic_in.clone();
    let forwarder = tokio::spawn(forward_payloads(client.clone(), eventloop, topic, tx, shutdown));

    let stats = dispatcher.run(rx).await;

    if let Err(e) = forwarder.await {
        warn!("Subscriber task ended abnormally: {}", e);
    }
    if let Err(e) = client.disconnect().await {
        debug!("MQTT disconnect: {}", e);
    }
    health.abort();

    info!("Service stopped");
    Ok(stats)
}

/// Connect the subscriber client and subscribe to the input topic
async fn subscribe(mqtt: &MqttConfig, topic: &str) -> Result<(AsyncClient, EventLoop), ServiceError> {
    let (client, mut eventloop) = AsyncClient::new(mqtt.options("sub"), 64);
    wait_for_connack(&mut eventloop, Duration::from_millis(mqtt.connect_timeout_ms)).await?;

    client
        .subscribe(topic, QoS::AtMostOnce)
        .await
        .map_err(|e| ServiceError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
    info!("Subscribed to '{}' on {}:{}", topic, mqtt.host, mqtt.port);

    Ok((client, eventloop))
}

/// Drive the subscriber event loop, handing each payload to the dispatcher.
///
/// Returns when `shutdown` resolves or the dispatcher goes away; dropping
/// `tx` closes the dispatcher's channel.
async fn forward_payloads<S>(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topic: String,
    tx: mpsc::Sender<Vec<u8>>,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if tx.send(publish.payload.to_vec()).await.is_err() {
                        warn!("Dispatcher stopped, no longer forwarding");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // Clean session: subscriptions do not survive a reconnect
                    info!("Reconnected to MQTT broker, resubscribing to '{}'", topic);
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                        error!("Resubscribe to '{}' failed: {}", topic, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT subscriber connection error: {}", e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            },
        }
    }

    debug!("Subscriber loop finished");
}
