//! Validation Error Types

use thiserror::Error;

/// Errors raised while validating an inbound sample batch.
///
/// Every variant is scoped to a single message: the batch is dropped and
/// processing continues with the next one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Payload is not a JSON object or cannot be decoded
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Axis carried no samples
    #[error("Axis '{axis}' has no samples")]
    EmptySamples { axis: String },

    /// Axis value is not a number or an array of numbers
    #[error("Axis '{axis}' contains a non-numeric sample")]
    NonNumericSample { axis: String },

    /// NaN or infinite sample
    #[error("Axis '{axis}' sample {index} is not finite")]
    NonFiniteSample { axis: String, index: usize },

    /// Finite sample too large to analyze
    #[error("Axis '{axis}' sample {index} exceeds the accepted magnitude")]
    SampleOutOfRange { axis: String, index: usize },

    /// Timestamp outside the representable range
    #[error("Timestamp {0}ms is out of range")]
    InvalidTimestamp(i64),
}
