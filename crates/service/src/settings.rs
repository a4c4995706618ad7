//! Service configuration

use config::{Config, Environment, File};
use feature_engine::MIN_WINDOW_SAMPLES;
use publisher::{InfluxConfig, MqttConfig, PublisherConfig, SpectrumMode, DEFAULT_MEASUREMENT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use window_buffer::{WindowConfig, DEFAULT_MAX_TRACKED_BUFFERS};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Flat service settings.
///
/// Every field can be set from the environment by its upper-case name
/// (`MQTT_HOST`, `RATE`, `INFLUX_TOKEN`, ...), overriding the optional file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Input topic carrying sample batches
    pub topic_in: String,
    /// Base output topic; the axis name is appended
    pub topic_out: String,
    /// Sample rate (Hz)
    pub rate: f64,
    /// Window span (seconds)
    pub span: f64,
    pub top_n: usize,
    pub spectrum_mode: SpectrumMode,
    pub health_port: u16,
    pub influx_url: String,
    /// Empty or missing disables the time-series sink
    pub influx_token: Option<String>,
    pub influx_org: String,
    pub influx_bucket: String,
    /// Empty or missing disables anomaly scoring
    pub model_path: Option<PathBuf>,
    pub sink_timeout_ms: u64,
    pub max_tracked_buffers: usize,
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "mosquitto".to_string(),
            mqtt_port: 1883,
            topic_in: "sensors/vibration".to_string(),
            topic_out: "sensors/vibration_fft".to_string(),
            rate: 200.0,
            span: 2.0,
            top_n: 20,
            spectrum_mode: SpectrumMode::Full,
            health_port: 5000,
            influx_url: "http://influxdb:8086".to_string(),
            influx_token: None,
            influx_org: "iiot".to_string(),
            influx_bucket: "features".to_string(),
            model_path: None,
            sink_timeout_ms: 2000,
            max_tracked_buffers: DEFAULT_MAX_TRACKED_BUFFERS,
            log_json: false,
        }
    }
}

impl ServiceConfig {
    /// Load from an optional file layered under the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(path, Environment::default().try_parsing(true))
    }

    /// Load from explicit sources and validate
    pub fn from_sources(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(ConfigError::Invalid(format!("rate must be positive, got {}", self.rate)));
        }
        if !(self.span.is_finite() && self.span > 0.0) {
            return Err(ConfigError::Invalid(format!("span must be positive, got {}", self.span)));
        }

        let window_len = self.window_config().window_len();
        if window_len < MIN_WINDOW_SAMPLES {
            return Err(ConfigError::Invalid(format!(
                "window of {} samples is shorter than the minimum {}",
                window_len, MIN_WINDOW_SAMPLES
            )));
        }
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be at least 1".to_string()));
        }
        if self.sink_timeout_ms == 0 {
            return Err(ConfigError::Invalid("sink_timeout_ms must be positive".to_string()));
        }
        if self.topic_in.trim().is_empty() || self.topic_out.trim().is_empty() {
            return Err(ConfigError::Invalid("topics must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            sample_rate: self.rate,
            span_seconds: self.span,
            max_tracked_buffers: self.max_tracked_buffers,
        }
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            ..Default::default()
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            base_topic: self.topic_out.clone(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            sink_timeout: self.sink_timeout(),
        }
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    /// Store settings, or `None` when no token is configured
    pub fn influx_config(&self) -> Option<InfluxConfig> {
        let token = self.influx_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        Some(InfluxConfig {
            url: self.influx_url.clone(),
            token: token.to_string(),
            org: self.influx_org.clone(),
            bucket: self.influx_bucket.clone(),
        })
    }

    /// Model artifact path, or `None` when scoring is off
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}
