//! Sample and Timestamp Checks

use crate::error::ValidationError;

/// Largest millisecond timestamp whose nanosecond form still fits an `i64`
pub const MAX_TIMESTAMP_MS: i64 = i64::MAX / 1_000_000;

/// Largest accepted absolute sample value.
///
/// Far beyond any accelerometer range, and small enough that fourth powers
/// summed over a window stay finite.
pub const MAX_SAMPLE_MAGNITUDE: f64 = 1e12;

/// Validate one axis worth of samples: non-empty, finite and within
/// [`MAX_SAMPLE_MAGNITUDE`].
pub fn validate_samples(axis: &str, values: &[f64]) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::EmptySamples {
            axis: axis.to_string(),
        });
    }

    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::NonFiniteSample {
            axis: axis.to_string(),
            index,
        });
    }

    if let Some(index) = values.iter().position(|v| v.abs() > MAX_SAMPLE_MAGNITUDE) {
        return Err(ValidationError::SampleOutOfRange {
            axis: axis.to_string(),
            index,
        });
    }

    Ok(())
}

/// Validate a millisecond epoch timestamp.
///
/// Accepts `0..=MAX_TIMESTAMP_MS` so downstream nanosecond conversion cannot overflow.
pub fn validate_timestamp(timestamp_ms: i64) -> Result<(), ValidationError> {
    if (0..=MAX_TIMESTAMP_MS).contains(&timestamp_ms) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTimestamp(timestamp_ms))
    }
}
