//! FFT-based Spectral Analysis

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{trace, warn};

/// Windows shorter than this are skipped rather than analyzed
pub const MIN_WINDOW_SAMPLES: usize = 8;

/// One frequency bin picked out of a spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopBin {
    /// Bin frequency (Hz)
    pub frequency: f64,
    /// Bin magnitude
    pub amplitude: f64,
}

/// Single-sided amplitude spectrum of one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Bin frequencies (Hz), `N/2 + 1` entries
    pub frequencies: Vec<f64>,
    /// Bin magnitudes, same length as `frequencies`
    pub magnitudes: Vec<f64>,
    /// Frequency of the largest magnitude (lowest bin on ties)
    pub dominant_frequency: f64,
    /// Sum of squared magnitudes
    pub energy: f64,
}

impl Spectrum {
    /// Number of bins
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    /// True if the spectrum has no bins
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// The `k` largest bins by magnitude, descending, ties by ascending bin index
    pub fn top_bins(&self, k: usize) -> Vec<TopBin> {
        top_bins(&self.frequencies, &self.magnitudes, k)
    }
}

/// Select the `k` largest-magnitude bins.
///
/// Returns `min(k, len)` entries ordered by descending magnitude; equal
/// magnitudes keep ascending bin order.
pub fn top_bins(frequencies: &[f64], magnitudes: &[f64], k: usize) -> Vec<TopBin> {
    let mut order: Vec<usize> = (0..magnitudes.len().min(frequencies.len())).collect();
    order.sort_by(|&a, &b| {
        magnitudes[b]
            .total_cmp(&magnitudes[a])
            .then_with(|| a.cmp(&b))
    });

    order
        .into_iter()
        .take(k)
        .map(|i| TopBin {
            frequency: frequencies[i],
            amplitude: magnitudes[i],
        })
        .collect()
}

/// Analyze one window at the given sample rate.
///
/// Convenience wrapper that plans a fresh FFT; prefer a long-lived
/// [`FftAnalyzer`] when analyzing a stream of windows.
pub fn analyze(samples: &[f64], sample_rate: f64) -> Option<Spectrum> {
    FftAnalyzer::new(sample_rate).analyze(samples)
}

/// FFT analyzer with a cached planner
pub struct FftAnalyzer {
    /// FFT planner, caches plans per window length
    planner: FftPlanner<f64>,
    /// Sampling frequency (Hz)
    sample_rate: f64,
}

impl FftAnalyzer {
    /// Create a new FFT analyzer
    pub fn new(sample_rate: f64) -> Self {
        Self {
            planner: FftPlanner::new(),
            sample_rate,
        }
    }

    /// Sampling frequency (Hz)
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Hann window coefficient for sample `i` of `n`
    fn hann(i: usize, n: usize) -> f64 {
        0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos()
    }

    /// Compute the amplitude spectrum of a window.
    ///
    /// Returns `None` for windows shorter than [`MIN_WINDOW_SAMPLES`] or whose
    /// energy is not representable. The
    /// signal is de-meaned and Hann-windowed before the transform, and
    /// magnitudes are scaled by `2/N`.
    pub fn analyze(&mut self, samples: &[f64]) -> Option<Spectrum> {
        let n = samples.len();
        if n < MIN_WINDOW_SAMPLES {
            trace!("Skipping {}-sample window", n);
            return None;
        }

        let bins = n / 2 + 1;
        let frequencies: Vec<f64> = (0..bins)
            .map(|k| k as f64 * self.sample_rate / n as f64)
            .collect();

        // Zero variance: nothing left after DC removal. Checked on the raw
        // samples; de-meaning an inexact constant leaves a rounding residue.
        if samples.iter().all(|&v| v == samples[0]) {
            return Some(Spectrum {
                frequencies,
                magnitudes: vec![0.0; bins],
                dominant_frequency: 0.0,
                energy: 0.0,
            });
        }

        let mean = samples.iter().sum::<f64>() / n as f64;
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .enumerate()
            .map(|(i, &v)| Complex::new((v - mean) * Self::hann(i, n), 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let scale = n as f64 / 2.0;
        let magnitudes: Vec<f64> = buffer
            .iter()
            .take(bins)
            .map(|c| c.norm() / scale)
            .collect();

        let mut dominant_idx = 0;
        for (i, &m) in magnitudes.iter().enumerate() {
            if m > magnitudes[dominant_idx] {
                dominant_idx = i;
            }
        }

        let energy: f64 = magnitudes.iter().map(|m| m * m).sum();
        if !energy.is_finite() {
            warn!("Skipping {}-sample window: spectral energy overflows", n);
            return None;
        }

        Some(Spectrum {
            dominant_frequency: frequencies[dominant_idx],
            frequencies,
            magnitudes,
            energy,
        })
    }
}
