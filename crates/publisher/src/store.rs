//! Time-Series Store Sink

use crate::line_protocol::Point;
use crate::SinkError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Outbound time-series store
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn write(&self, point: &Point) -> Result<(), SinkError>;
}

/// InfluxDB v2 connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// Writes points through the InfluxDB v2 HTTP write API
pub struct InfluxStore {
    http: reqwest::Client,
    base_url: String,
    config: InfluxConfig,
}

impl InfluxStore {
    /// Create a store client; `timeout` bounds every HTTP request
    pub fn new(config: InfluxConfig, timeout: Duration) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            config,
        })
    }

    /// Check that the server answers its health endpoint
    pub async fn ping(&self) -> Result<(), SinkError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            info!("InfluxDB reachable at {}", self.base_url);
            Ok(())
        } else {
            Err(SinkError::Http {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn write(&self, point: &Point) -> Result<(), SinkError> {
        let line = point.to_line()?;
        debug!("Influx write: {}", line);

        let resp = self
            .http
            .post(format!("{}/api/v2/write", self.base_url))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.config.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Http {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}
