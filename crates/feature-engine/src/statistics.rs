//! Time-Domain Statistics

use serde::{Deserialize, Serialize};

/// Time-domain condition indicators for a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeDomainStats {
    /// Mean value
    pub mean: f64,
    /// Standard deviation (population)
    pub std_dev: f64,
    /// Root mean square of the raw signal
    pub rms: f64,
    /// Pearson kurtosis E[(X-μ)⁴] / σ⁴, 0.0 for zero-variance input
    pub kurtosis: f64,
}

impl TimeDomainStats {
    /// Compute statistics from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let rms = (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt();

        let mut m2 = 0.0;
        let mut m4 = 0.0;
        for &v in values {
            let d = v - mean;
            let d2 = d * d;
            m2 += d2;
            m4 += d2 * d2;
        }

        // An inexact constant mean leaves a rounding residue in `m2`
        let constant = values.iter().all(|&v| v == values[0]);
        let variance = if constant { 0.0 } else { m2 / n };
        let kurtosis = if variance > 0.0 {
            (m4 / n) / (variance * variance)
        } else {
            0.0
        };

        Self {
            mean,
            std_dev: variance.sqrt(),
            rms,
            kurtosis,
        }
    }
}
