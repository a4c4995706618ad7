//! Output Events

use crate::SinkError;
use feature_engine::{SpectralFrame, TopBin};
use serde::{Deserialize, Serialize};

/// How much of the spectrum goes into each output message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumMode {
    /// Every bin
    #[default]
    Full,
    /// Only the top-N bins
    Top,
}

/// Spectrum carried by an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpectrumPayload {
    Full {
        frequencies: Vec<f64>,
        magnitudes: Vec<f64>,
    },
    Top(Vec<TopBin>),
}

/// Unit of work handed to the fan-out publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub sensor_id: String,
    pub axis: String,
    /// Last-sample timestamp of the window (ms epoch)
    pub timestamp_ms: i64,
    pub dominant_frequency: f64,
    pub energy: f64,
    pub rms: f64,
    pub kurtosis: f64,
    pub spectrum: SpectrumPayload,
    /// Present only when a model produced a score
    pub anomaly_score: Option<f64>,
}

impl OutputEvent {
    /// Build an event from a frame, keeping the spectrum per `mode`
    pub fn from_frame(
        frame: SpectralFrame,
        mode: SpectrumMode,
        top_n: usize,
        anomaly_score: Option<f64>,
    ) -> Self {
        let spectrum = match mode {
            SpectrumMode::Top => SpectrumPayload::Top(frame.top_bins(top_n)),
            SpectrumMode::Full => SpectrumPayload::Full {
                frequencies: frame.frequencies,
                magnitudes: frame.magnitudes,
            },
        };

        Self {
            sensor_id: frame.sensor_id,
            axis: frame.axis,
            timestamp_ms: frame.timestamp_ms,
            dominant_frequency: frame.dominant_frequency,
            energy: frame.energy,
            rms: frame.rms,
            kurtosis: frame.kurtosis,
            spectrum,
            anomaly_score,
        }
    }

    /// Timestamp in nanoseconds for the time-series point
    pub fn timestamp_ns(&self) -> Result<i64, SinkError> {
        self.timestamp_ms.checked_mul(1_000_000).ok_or_else(|| {
            SinkError::Serialization(format!(
                "timestamp {}ms overflows nanosecond precision",
                self.timestamp_ms
            ))
        })
    }

    /// Bus message body
    pub fn to_message(&self) -> OutputMessage {
        let (frequencies, magnitudes) = match &self.spectrum {
            SpectrumPayload::Full {
                frequencies,
                magnitudes,
            } => (frequencies.clone(), magnitudes.clone()),
            SpectrumPayload::Top(bins) => (
                bins.iter().map(|b| b.frequency).collect(),
                bins.iter().map(|b| b.amplitude).collect(),
            ),
        };

        OutputMessage {
            time: self.timestamp_ms,
            sensor_id: self.sensor_id.clone(),
            axis: self.axis.clone(),
            dominant_frequency: self.dominant_frequency,
            energy: self.energy,
            rms: self.rms,
            kurtosis: self.kurtosis,
            frequencies,
            magnitudes,
            anomaly_score: self.anomaly_score,
        }
    }
}

/// JSON body published to `<base_out_topic>/<axis>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub time: i64,
    pub sensor_id: String,
    pub axis: String,
    pub dominant_frequency: f64,
    pub energy: f64,
    pub rms: f64,
    pub kurtosis: f64,
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
}
