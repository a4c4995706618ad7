//! In-memory sinks for tests

use crate::bus::MessageBus;
use crate::line_protocol::Point;
use crate::store::TimeSeriesStore;
use crate::SinkError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every publish; can be switched to fail
#[derive(Default)]
pub struct InMemoryBus {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose publishes always fail
    pub fn failing() -> Self {
        let bus = Self::default();
        bus.set_failing(true);
        bus
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Published `(topic, payload)` pairs in order
    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Publish("simulated bus failure".to_string()));
        }
        self.messages
            .lock()
            .map_err(|e| SinkError::Publish(format!("Lock error: {e}")))?
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// Records every point; can be switched to fail
#[derive(Default)]
pub struct InMemoryStore {
    points: Mutex<Vec<Point>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryStore {
    async fn write(&self, point: &Point) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Connection("simulated store failure".to_string()));
        }
        point.to_line()?;
        self.points
            .lock()
            .map_err(|e| SinkError::Connection(format!("Lock error: {e}")))?
            .push(point.clone());
        Ok(())
    }
}
