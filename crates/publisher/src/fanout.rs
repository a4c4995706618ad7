//! Two-sink fan-out

use crate::bus::MessageBus;
use crate::event::OutputEvent;
use crate::line_protocol::Point;
use crate::store::TimeSeriesStore;
use crate::SinkError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Measurement name for vibration feature points
pub const DEFAULT_MEASUREMENT: &str = "vibration_features";

/// Fan-out settings
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Base output topic; messages go to `<base_topic>/<axis>`
    pub base_topic: String,
    /// Time-series measurement name
    pub measurement: String,
    /// Upper bound for each sink attempt
    pub sink_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            base_topic: "sensors/vibration_fft".to_string(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            sink_timeout: Duration::from_millis(2000),
        }
    }
}

/// Result of one sink attempt
#[derive(Debug)]
pub enum SinkOutcome {
    Delivered,
    Failed(SinkError),
    /// Sink not configured
    Skipped,
}

impl SinkOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-sink outcome of a publish
#[derive(Debug)]
pub struct PublishReport {
    pub bus: SinkOutcome,
    pub store: SinkOutcome,
}

/// Publishes each event to the bus and the store independently
pub struct FanoutPublisher {
    bus: Arc<dyn MessageBus>,
    store: Option<Arc<dyn TimeSeriesStore>>,
    config: PublisherConfig,
}

impl FanoutPublisher {
    /// `store: None` disables time-series writes
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Option<Arc<dyn TimeSeriesStore>>,
        config: PublisherConfig,
    ) -> Self {
        Self { bus, store, config }
    }

    /// Bus topic for an axis
    pub fn topic_for(&self, axis: &str) -> String {
        format!("{}/{}", self.config.base_topic.trim_end_matches('/'), axis)
    }

    /// Time-series point for an event
    pub fn point_for(&self, event: &OutputEvent) -> Result<Point, SinkError> {
        let mut point = Point::new(self.config.measurement.as_str())
            .tag("axis", event.axis.as_str())
            .tag("sensor_id", event.sensor_id.as_str())
            .field("dominant_frequency", event.dominant_frequency)
            .field("energy", event.energy)
            .field("rms", event.rms)
            .field("kurtosis", event.kurtosis)
            .timestamp(event.timestamp_ns()?);

        if let Some(score) = event.anomaly_score {
            point = point.field("anomaly_score", score);
        }
        Ok(point)
    }

    /// Deliver one event to both sinks concurrently.
    ///
    /// Never fails: each sink's outcome is logged and reported.
    pub async fn publish(&self, event: &OutputEvent) -> PublishReport {
        let (bus, store) = tokio::join!(self.publish_bus(event), self.write_store(event));

        for (sink, outcome) in [("bus", &bus), ("store", &store)] {
            if let SinkOutcome::Failed(e) = outcome {
                warn!(
                    "{} delivery failed for sensor={} axis={} time={}: {}",
                    sink, event.sensor_id, event.axis, event.timestamp_ms, e
                );
                metrics::counter!("vibration_sink_failures_total", "sink" => sink).increment(1);
            }
        }

        debug!(
            "Published {}/{} at {}: bus={:?} store={:?}",
            event.sensor_id,
            event.axis,
            event.timestamp_ms,
            bus.is_delivered(),
            store.is_delivered()
        );

        PublishReport { bus, store }
    }

    async fn publish_bus(&self, event: &OutputEvent) -> SinkOutcome {
        let payload = match serde_json::to_vec(&event.to_message()) {
            Ok(payload) => payload,
            Err(e) => return SinkOutcome::Failed(SinkError::Serialization(e.to_string())),
        };
        let topic = self.topic_for(&event.axis);

        bounded("bus", self.config.sink_timeout, self.bus.publish(&topic, payload)).await
    }

    async fn write_store(&self, event: &OutputEvent) -> SinkOutcome {
        let Some(store) = &self.store else {
            return SinkOutcome::Skipped;
        };
        let point = match self.point_for(event) {
            Ok(point) => point,
            Err(e) => return SinkOutcome::Failed(e),
        };

        bounded("store", self.config.sink_timeout, store.write(&point)).await
    }
}

async fn bounded<F>(sink: &'static str, limit: Duration, attempt: F) -> SinkOutcome
where
    F: Future<Output = Result<(), SinkError>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(())) => SinkOutcome::Delivered,
        Ok(Err(e)) => SinkOutcome::Failed(e),
        Err(_) => SinkOutcome::Failed(SinkError::Timeout {
            sink,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
