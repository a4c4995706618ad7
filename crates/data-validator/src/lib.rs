//! Input Validation
//!
//! Decodes inbound vibration sample batches and enforces the sample
//! invariants shared by the buffering and analysis stages.

mod batch;
mod error;
mod validator;

pub use batch::SampleBatch;
pub use error::ValidationError;
pub use validator::{validate_samples, validate_timestamp, MAX_SAMPLE_MAGNITUDE, MAX_TIMESTAMP_MS};
