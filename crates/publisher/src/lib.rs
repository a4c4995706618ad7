//! Fan-out Publisher
//!
//! Delivers every output event to two independent sinks:
//! - MQTT topic `<base_out_topic>/<axis>` (JSON message)
//! - InfluxDB v2 (line protocol point, nanosecond precision)
//!
//! A failure or timeout on one sink never blocks or fails the other.

mod bus;
mod event;
mod fanout;
mod line_protocol;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod store;

pub use bus::{wait_for_connack, MessageBus, MqttBus, MqttConfig};
pub use event::{OutputEvent, OutputMessage, SpectrumMode, SpectrumPayload};
pub use fanout::{FanoutPublisher, PublishReport, PublisherConfig, SinkOutcome, DEFAULT_MEASUREMENT};
pub use line_protocol::Point;
pub use store::{InfluxConfig, InfluxStore, TimeSeriesStore};

use thiserror::Error;

/// Sink delivery errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store rejected write with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{sink} did not respond within {timeout_ms}ms")]
    Timeout { sink: &'static str, timeout_ms: u64 },
}
