//! Window Buffer Manager

use crate::{WindowConfig, WindowReady};
use data_validator::{validate_samples, ValidationError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default cap on live `(sensor_id, axis)` buffers
pub const DEFAULT_MAX_TRACKED_BUFFERS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BufferKey {
    sensor_id: String,
    axis: String,
}

impl BufferKey {
    fn new(sensor_id: &str, axis: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            axis: axis.to_string(),
        }
    }
}

/// Samples accumulated for one `(sensor_id, axis)` pair
#[derive(Debug)]
struct SensorWindowBuffer {
    samples: Vec<f64>,
    /// Append sequence number of the last write, for LRU eviction
    last_touched: u64,
}

/// Owns every per-sensor window buffer.
///
/// Not internally synchronized: callers must serialize appends, or route all
/// batches of one sensor to the same manager.
pub struct WindowBufferManager {
    /// Samples per window
    window_len: usize,
    /// Spacing between consecutive samples (ms)
    sample_period_ms: f64,
    /// Buffer count at which the least recently used one is evicted
    max_tracked: usize,
    buffers: HashMap<BufferKey, SensorWindowBuffer>,
    /// Monotonic append counter
    tick: u64,
    /// Buffers evicted so far
    evicted: u64,
}

impl WindowBufferManager {
    /// Create a manager for the given window sizing
    pub fn new(config: &WindowConfig) -> Self {
        let mut window_len = config.window_len();
        if window_len == 0 {
            warn!(
                "Window of {} Hz x {} s is empty, using single-sample windows",
                config.sample_rate, config.span_seconds
            );
            window_len = 1;
        }

        let sample_period_ms = if config.sample_rate > 0.0 {
            1000.0 / config.sample_rate
        } else {
            0.0
        };

        info!(
            "Creating window buffer manager: window_len={}, max_tracked={}",
            window_len, config.max_tracked_buffers
        );

        Self {
            window_len,
            sample_period_ms,
            max_tracked: config.max_tracked_buffers.max(1),
            buffers: HashMap::new(),
            tick: 0,
            evicted: 0,
        }
    }

    /// Samples per window
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Append samples for one axis of a sensor.
    ///
    /// `timestamp_ms` is the time of the last value in `values`. Returns the
    /// windows completed by this call, oldest first; samples past a window
    /// boundary are carried into the next window. Invalid input is rejected
    /// before any state changes.
    pub fn append(
        &mut self,
        sensor_id: &str,
        axis: &str,
        timestamp_ms: i64,
        values: &[f64],
    ) -> Result<Vec<WindowReady>, ValidationError> {
        validate_samples(axis, values)?;

        let key = BufferKey::new(sensor_id, axis);
        if !self.buffers.contains_key(&key) && self.buffers.len() >= self.max_tracked {
            self.evict_least_recent();
        }

        self.tick += 1;
        let tick = self.tick;
        let window_len = self.window_len;
        let sample_period_ms = self.sample_period_ms;

        let buffer = self.buffers.entry(key).or_insert_with(|| {
            debug!("New window buffer for {}/{}", sensor_id, axis);
            SensorWindowBuffer {
                samples: Vec::with_capacity(window_len),
                last_touched: tick,
            }
        });
        buffer.last_touched = tick;

        let mut ready = Vec::new();
        let mut offset = 0;
        while offset < values.len() {
            let room = window_len - buffer.samples.len();
            let take = room.min(values.len() - offset);
            buffer
                .samples
                .extend_from_slice(&values[offset..offset + take]);
            offset += take;

            if buffer.samples.len() == window_len {
                let samples =
                    std::mem::replace(&mut buffer.samples, Vec::with_capacity(window_len));
                // Samples of this batch still to come after the window's last one
                let trailing = (values.len() - offset) as f64;
                let window_ts = timestamp_ms - (trailing * sample_period_ms).round() as i64;

                debug!(
                    "Window ready for {}/{}: {} samples at {}",
                    sensor_id, axis, window_len, window_ts
                );
                ready.push(WindowReady {
                    sensor_id: sensor_id.to_string(),
                    axis: axis.to_string(),
                    samples,
                    timestamp_ms: window_ts,
                });
            }
        }

        Ok(ready)
    }

    /// Samples waiting in the buffer for a pair (0 if untracked)
    pub fn pending_len(&self, sensor_id: &str, axis: &str) -> usize {
        self.buffers
            .get(&BufferKey::new(sensor_id, axis))
            .map_or(0, |b| b.samples.len())
    }

    /// Number of live buffers
    pub fn tracked(&self) -> usize {
        self.buffers.len()
    }

    /// Number of buffers evicted to respect the cap
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Drop every partially filled buffer, returning the number of samples lost.
    ///
    /// Used at shutdown; partial windows are never flushed.
    pub fn discard_all(&mut self) -> usize {
        let dropped = self.buffers.values().map(|b| b.samples.len()).sum();
        self.buffers.clear();
        dropped
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .buffers
            .iter()
            .min_by_key(|(_, b)| b.last_touched)
            .map(|(k, _)| k.clone());

        if let Some(key) = oldest {
            if let Some(buffer) = self.buffers.remove(&key) {
                self.evicted += 1;
                warn!(
                    "Evicting window buffer {}/{} ({} pending samples dropped)",
                    key.sensor_id,
                    key.axis,
                    buffer.samples.len()
                );
            }
        }
    }
}
