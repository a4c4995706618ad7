//! Spectral Frame and Feature Vector Assembly

use crate::fft::{FftAnalyzer, TopBin};
use crate::statistics::TimeDomainStats;
use serde::{Deserialize, Serialize};
use tracing::debug;
use window_buffer::WindowReady;

/// Number of features fed to the anomaly scorer
pub const FEATURE_DIMENSION: usize = 2;

/// Feature names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_DIMENSION] = ["dominant_frequency", "energy"];

/// Spectral summary of one completed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFrame {
    pub sensor_id: String,
    pub axis: String,
    /// Timestamp of the window's last sample (ms epoch)
    pub timestamp_ms: i64,
    /// Bin frequencies (Hz)
    pub frequencies: Vec<f64>,
    /// Bin magnitudes
    pub magnitudes: Vec<f64>,
    pub dominant_frequency: f64,
    pub energy: f64,
    /// RMS of the raw window
    pub rms: f64,
    /// Pearson kurtosis of the raw window
    pub kurtosis: f64,
}

impl SpectralFrame {
    /// The `k` strongest bins, descending by magnitude
    pub fn top_bins(&self, k: usize) -> Vec<TopBin> {
        crate::fft::top_bins(&self.frequencies, &self.magnitudes, k)
    }
}

/// Feature vector for anomaly scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// `[dominant_frequency, energy, extra...]`
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Build the required two-feature vector from a frame
    pub fn from_frame(frame: &SpectralFrame) -> Self {
        Self {
            values: vec![frame.dominant_frequency, frame.energy],
        }
    }

    /// Append an extra feature after the required ones
    pub fn with_extra(mut self, value: f64) -> Self {
        self.values.push(value);
        self
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Turns completed windows into spectral frames
pub struct FeatureExtractor {
    /// FFT analyzer
    fft_analyzer: FftAnalyzer,
}

impl FeatureExtractor {
    /// Create a new feature extractor
    pub fn new(sample_rate: f64) -> Self {
        Self {
            fft_analyzer: FftAnalyzer::new(sample_rate),
        }
    }

    /// Sampling frequency (Hz)
    pub fn sample_rate(&self) -> f64 {
        self.fft_analyzer.sample_rate()
    }

    /// Analyze a window; `None` when it is too short to produce a spectrum
    pub fn extract(&mut self, window: &WindowReady) -> Option<SpectralFrame> {
        let spectrum = self.fft_analyzer.analyze(&window.samples)?;
        let stats = TimeDomainStats::compute(&window.samples);

        debug!(
            "Frame {}/{}: dominant={:.3} Hz, energy={:.6}, rms={:.4}",
            window.sensor_id, window.axis, spectrum.dominant_frequency, spectrum.energy, stats.rms
        );

        Some(SpectralFrame {
            sensor_id: window.sensor_id.clone(),
            axis: window.axis.clone(),
            timestamp_ms: window.timestamp_ms,
            frequencies: spectrum.frequencies,
            magnitudes: spectrum.magnitudes,
            dominant_frequency: spectrum.dominant_frequency,
            energy: spectrum.energy,
            rms: stats.rms,
            kurtosis: stats.kurtosis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn window(samples: Vec<f64>) -> WindowReady {
        WindowReady {
            sensor_id: "imu01".into(),
            axis: "ax".into(),
            samples,
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_feature_extraction() {
        let mut extractor = FeatureExtractor::new(200.0);
        let samples: Vec<f64> = (0..512)
            .map(|i| 2.0 * (2.0 * PI * 50.0 * i as f64 / 200.0).sin())
            .collect();

        let frame = extractor.extract(&window(samples)).unwrap();
        assert_eq!(frame.sensor_id, "imu01");
        assert_eq!(frame.axis, "ax");
        assert_eq!(frame.timestamp_ms, 1_700_000_000_000);
        assert_eq!(frame.frequencies.len(), 257);
        assert!((frame.dominant_frequency - 50.0).abs() <= 200.0 / 512.0);
        assert!((frame.rms - 2.0 / 2f64.sqrt()).abs() < 1e-6);
        assert_eq!(frame.top_bins(1)[0].frequency, frame.dominant_frequency);
    }

    #[test]
    fn test_short_window() {
        let mut extractor = FeatureExtractor::new(200.0);
        assert!(extractor.extract(&window(vec![1.0; 4])).is_none());
    }

    #[test]
    fn test_feature_vector() {
        let mut extractor = FeatureExtractor::new(100.0);
        let frame = extractor.extract(&window(vec![1.0; 16])).unwrap();

        let features = FeatureVector::from_frame(&frame);
        assert_eq!(features.len(), FEATURE_DIMENSION);
        assert_eq!(features.as_slice(), &[0.0, 0.0]);

        let extended = features.with_extra(frame.rms);
        assert_eq!(extended.len(), 3);
    }
}
