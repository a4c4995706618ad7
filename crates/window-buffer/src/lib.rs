//! Window Buffer
//!
//! Accumulates streamed samples per `(sensor_id, axis)` and hands out
//! non-overlapping windows of a fixed length.

mod buffer;

pub use buffer::{WindowBufferManager, DEFAULT_MAX_TRACKED_BUFFERS};

use serde::{Deserialize, Serialize};

/// Window sizing and map bound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Expected sample rate (Hz)
    pub sample_rate: f64,
    /// Window span (seconds)
    pub span_seconds: f64,
    /// Maximum number of `(sensor_id, axis)` buffers kept alive
    pub max_tracked_buffers: usize,
}

impl WindowConfig {
    /// Samples per window: `round(sample_rate * span_seconds)`
    pub fn window_len(&self) -> usize {
        let len = (self.sample_rate * self.span_seconds).round();
        if len.is_finite() && len > 0.0 {
            len as usize
        } else {
            0
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sample_rate: 200.0,
            span_seconds: 2.0,
            max_tracked_buffers: DEFAULT_MAX_TRACKED_BUFFERS,
        }
    }
}

/// A completed window handed out by the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReady {
    pub sensor_id: String,
    pub axis: String,
    pub samples: Vec<f64>,
    /// Timestamp of the last sample in the window (ms epoch)
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_len_rounding() {
        let config = WindowConfig {
            sample_rate: 200.0,
            span_seconds: 2.56,
            ..Default::default()
        };
        assert_eq!(config.window_len(), 512);
        assert_eq!(WindowConfig::default().window_len(), 400);
    }

    #[test]
    fn test_window_len_degenerate() {
        let config = WindowConfig {
            sample_rate: -1.0,
            ..Default::default()
        };
        assert_eq!(config.window_len(), 0);
    }
}
