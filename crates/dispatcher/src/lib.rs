//! Ingest Dispatcher
//!
//! Single consumer of raw sample batches. Each batch is decoded, appended to
//! the window buffers, and every completed window runs through analysis,
//! optional scoring and fan-out before the next batch is taken.

mod dispatcher;

pub use dispatcher::{BatchSummary, DispatchStats, IngestDispatcher, WindowOutcome};

use data_validator::ValidationError;
use publisher::SpectrumMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use window_buffer::WindowConfig;

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub window: WindowConfig,
    /// Bins kept in `top` spectrum mode
    pub top_n: usize,
    pub spectrum_mode: SpectrumMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            top_n: 20,
            spectrum_mode: SpectrumMode::Full,
        }
    }
}

/// A batch the dispatcher refused
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Rejected batch: {0}")]
    Validation(#[from] ValidationError),
}
