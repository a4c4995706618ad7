//! Feature Engineering Engine
//!
//! Converts completed sample windows into spectral frames: Hann-windowed
//! amplitude spectrum, dominant frequency, spectral energy and time-domain
//! indicators.

mod features;
mod fft;
mod statistics;

pub use features::{FeatureExtractor, FeatureVector, SpectralFrame, FEATURE_DIMENSION, FEATURE_NAMES};
pub use fft::{analyze, top_bins, FftAnalyzer, Spectrum, TopBin, MIN_WINDOW_SAMPLES};
pub use statistics::TimeDomainStats;
