//! Dispatch loop

use crate::{DispatchError, DispatcherConfig};
use data_validator::SampleBatch;
use feature_engine::{FeatureExtractor, FeatureVector};
use inference_engine::AnomalyScorer;
use publisher::{FanoutPublisher, OutputEvent, PublishReport};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use window_buffer::{WindowBufferManager, WindowReady};

/// What happened to one completed window
#[derive(Debug)]
pub enum WindowOutcome {
    /// Not analyzable (too short or overflowing); nothing published
    Skipped,
    Published(PublishReport),
}

/// Result of one accepted batch
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub windows: Vec<WindowOutcome>,
}

impl BatchSummary {
    pub fn published(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| matches!(w, WindowOutcome::Published(_)))
            .count()
    }
}

/// Totals over a dispatcher run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches_accepted: u64,
    pub batches_rejected: u64,
    pub windows_published: u64,
    pub windows_skipped: u64,
    /// Partial-window samples dropped at shutdown
    pub samples_discarded: usize,
}

/// Serial batch processor.
///
/// Owns the window buffers, so batches must reach it from one task.
pub struct IngestDispatcher {
    buffers: WindowBufferManager,
    extractor: FeatureExtractor,
    scorer: AnomalyScorer,
    publisher: FanoutPublisher,
    config: DispatcherConfig,
}

impl IngestDispatcher {
    pub fn new(config: DispatcherConfig, scorer: AnomalyScorer, publisher: FanoutPublisher) -> Self {
        info!(
            "Creating ingest dispatcher: rate={} Hz, span={} s, spectrum={:?}, scoring={}",
            config.window.sample_rate,
            config.window.span_seconds,
            config.spectrum_mode,
            scorer.is_active()
        );

        Self {
            buffers: WindowBufferManager::new(&config.window),
            extractor: FeatureExtractor::new(config.window.sample_rate),
            scorer,
            publisher,
            config,
        }
    }

    /// Window buffers, for inspection
    pub fn buffers(&self) -> &WindowBufferManager {
        &self.buffers
    }

    /// Decode a raw payload and process it
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Result<BatchSummary, DispatchError> {
        let batch = SampleBatch::from_json(payload)?;
        self.handle_batch(batch).await
    }

    /// Append every axis of a batch and process the windows it completes.
    ///
    /// The whole batch is validated first, so a rejected batch leaves every
    /// buffer untouched.
    pub async fn handle_batch(&mut self, batch: SampleBatch) -> Result<BatchSummary, DispatchError> {
        batch.validate()?;

        let mut ready = Vec::new();
        for (axis, values) in &batch.axes {
            ready.extend(
                self.buffers
                    .append(&batch.sensor_id, axis, batch.timestamp_ms, values)?,
            );
        }

        let mut summary = BatchSummary::default();
        for window in ready {
            summary.windows.push(self.process_window(window).await);
        }
        Ok(summary)
    }

    /// Analyze, score and publish one window
    pub async fn process_window(&mut self, window: WindowReady) -> WindowOutcome {
        let Some(frame) = self.extractor.extract(&window) else {
            debug!(
                "Skipping {}-sample window for {}/{}",
                window.samples.len(),
                window.sensor_id,
                window.axis
            );
            return WindowOutcome::Skipped;
        };
        metrics::counter!("vibration_windows_total").increment(1);

        let score = self.scorer.score(&FeatureVector::from_frame(&frame));
        let event = OutputEvent::from_frame(
            frame,
            self.config.spectrum_mode,
            self.config.top_n,
            score.value(),
        );

        WindowOutcome::Published(self.publisher.publish(&event).await)
    }

    /// Consume payloads until the channel closes, then drop partial windows
    pub async fn run(mut self, mut receiver: mpsc::Receiver<Vec<u8>>) -> DispatchStats {
        info!("Starting ingest dispatcher");
        let mut stats = DispatchStats::default();

        while let Some(payload) = receiver.recv().await {
            match self.handle_payload(&payload).await {
                Ok(summary) => {
                    stats.batches_accepted += 1;
                    metrics::counter!("vibration_batches_total", "outcome" => "accepted").increment(1);
                    for window in &summary.windows {
                        match window {
                            WindowOutcome::Published(_) => stats.windows_published += 1,
                            WindowOutcome::Skipped => stats.windows_skipped += 1,
                        }
                    }
                }
                Err(e) => {
                    stats.batches_rejected += 1;
                    metrics::counter!("vibration_batches_total", "outcome" => "rejected").increment(1);
                    warn!("Dropping batch ({} bytes): {}", payload.len(), e);
                }
            }
        }

        let tracked = self.buffers.tracked();
        stats.samples_discarded = self.buffers.discard_all();
        info!(
            "Ingest dispatcher stopped: {} batches, {} rejected, {} windows; discarded {} samples from {} partial buffers",
            stats.batches_accepted,
            stats.batches_rejected,
            stats.windows_published,
            stats.samples_discarded,
            tracked
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::{GaussianOutlierModel, ScoringStrategy};
    use publisher::memory::{InMemoryBus, InMemoryStore};
    use publisher::{OutputMessage, PublisherConfig, SpectrumMode};
    use std::f64::consts::PI;
    use std::sync::Arc;
    use window_buffer::WindowConfig;

    struct Harness {
        dispatcher: IngestDispatcher,
        bus: Arc<InMemoryBus>,
        store: Arc<InMemoryStore>,
    }

    fn harness(window: WindowConfig, scorer: AnomalyScorer) -> Harness {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryStore::new());
        let publisher = FanoutPublisher::new(
            bus.clone(),
            Some(store.clone()),
            PublisherConfig::default(),
        );
        let config = DispatcherConfig {
            window,
            ..Default::default()
        };
        Harness {
            dispatcher: IngestDispatcher::new(config, scorer, publisher),
            bus,
            store,
        }
    }

    fn small_window() -> WindowConfig {
        WindowConfig {
            sample_rate: 8.0,
            span_seconds: 2.0,
            ..Default::default()
        }
    }

    fn payload(sensor: &str, time: i64, samples: &[f64]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "sensor_id": sensor,
            "time": time,
            "ax": samples,
        }))
        .unwrap()
    }

    fn sine(len: usize, freq: f64, rate: f64) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / rate).sin())
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_sine() {
        let window = WindowConfig {
            sample_rate: 200.0,
            span_seconds: 2.56,
            ..Default::default()
        };
        let mut h = harness(window, AnomalyScorer::Disabled);
        let samples = sine(512, 50.0, 200.0);

        let mut published = 0;
        for (i, chunk) in samples.chunks(64).enumerate() {
            let time = 1_700_000_000_000 + (i as i64 + 1) * 320;
            let summary = h.dispatcher.handle_payload(&payload("imu01", time, chunk)).await.unwrap();
            published += summary.published();
        }
        assert_eq!(published, 1);
        assert_eq!(h.dispatcher.buffers().pending_len("imu01", "ax"), 0);

        let messages = h.bus.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "sensors/vibration_fft/ax");
        let message: OutputMessage = serde_json::from_slice(&messages[0].1).unwrap();
        assert_eq!(message.frequencies.len(), 257);
        assert!((message.dominant_frequency - 50.0).abs() <= 200.0 / 512.0);
        assert_eq!(message.time, 1_700_000_000_000 + 8 * 320);
        assert!(message.anomaly_score.is_none());

        let points = h.store.points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].tag_value("sensor_id"), Some("imu01"));
    }

    #[tokio::test]
    async fn test_malformed_input_isolated() {
        let mut h = harness(small_window(), AnomalyScorer::Disabled);

        h.dispatcher
            .handle_payload(&payload("good", 1_000, &[1.0; 5]))
            .await
            .unwrap();

        let bad: [&[u8]; 4] = [
            b"not json",
            br#"{"time": 1, "ax": [1.0]}"#,
            br#"{"sensor_id": "good", "time": 1}"#,
            br#"{"sensor_id": "good", "time": 1, "ax": [1.0, "x"], "ay": [1.0]}"#,
        ];
        for raw in bad {
            assert!(h.dispatcher.handle_payload(raw).await.is_err());
        }

        assert_eq!(h.dispatcher.buffers().pending_len("good", "ax"), 5);
        assert_eq!(h.dispatcher.buffers().pending_len("good", "ay"), 0);
        assert!(h.bus.messages().is_empty());
    }

    #[tokio::test]
    async fn test_sensor_at_rest_publishes_zero_spectrum() {
        let mut h = harness(small_window(), AnomalyScorer::Disabled);

        h.dispatcher
            .handle_payload(&payload("imu01", 1, &[9.81; 16]))
            .await
            .unwrap();

        let message: OutputMessage = serde_json::from_slice(&h.bus.messages()[0].1).unwrap();
        assert_eq!(message.energy, 0.0);
        assert_eq!(message.dominant_frequency, 0.0);
        assert_eq!(message.kurtosis, 0.0);
        assert!(message.magnitudes.iter().all(|&m| m == 0.0));
    }

    #[tokio::test]
    async fn test_out_of_range_sample_rejected() {
        let mut h = harness(small_window(), AnomalyScorer::Disabled);
        let mut samples = sine(16, 2.0, 8.0);
        samples[3] = 1e154;

        assert!(h.dispatcher.handle_payload(&payload("imu01", 1, &samples)).await.is_err());
        assert_eq!(h.dispatcher.buffers().pending_len("imu01", "ax"), 0);
        assert!(h.bus.messages().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_batch_emits_every_window() {
        let mut h = harness(small_window(), AnomalyScorer::Disabled);
        let samples = sine(40, 2.0, 8.0);

        let summary = h
            .dispatcher
            .handle_payload(&payload("imu01", 10_000, &samples))
            .await
            .unwrap();

        assert_eq!(summary.published(), 2);
        assert_eq!(h.dispatcher.buffers().pending_len("imu01", "ax"), 8);
        let times: Vec<i64> = h
            .bus
            .messages()
            .iter()
            .map(|(_, body)| serde_json::from_slice::<OutputMessage>(body).unwrap().time)
            .collect();
        // 125 ms per sample; 24 then 8 samples follow each window's last one
        assert_eq!(times, vec![10_000 - 3_000, 10_000 - 1_000]);
    }

    #[tokio::test]
    async fn test_short_window_skipped() {
        let window = WindowConfig {
            sample_rate: 2.0,
            span_seconds: 2.0,
            ..Default::default()
        };
        let mut h = harness(window, AnomalyScorer::Disabled);

        let summary = h
            .dispatcher
            .handle_payload(&payload("imu01", 1, &[1.0, 2.0, 3.0, 4.0]))
            .await
            .unwrap();

        assert!(matches!(summary.windows[..], [WindowOutcome::Skipped]));
        assert!(h.bus.messages().is_empty());
        assert!(h.store.points().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_keeps_bus_flowing() {
        let mut h = harness(small_window(), AnomalyScorer::Disabled);
        h.store.set_failing(true);

        let summary = h
            .dispatcher
            .handle_payload(&payload("imu01", 1, &sine(16, 2.0, 8.0)))
            .await
            .unwrap();

        match &summary.windows[..] {
            [WindowOutcome::Published(report)] => {
                assert!(report.bus.is_delivered());
                assert!(report.store.is_failed());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.bus.messages().len(), 1);

        h.store.set_failing(false);
        h.bus.set_failing(true);
        h.dispatcher
            .handle_payload(&payload("imu01", 2, &sine(16, 2.0, 8.0)))
            .await
            .unwrap();
        assert_eq!(h.store.points().len(), 1);
    }

    #[tokio::test]
    async fn test_scored_event() {
        let model = GaussianOutlierModel::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let scorer = AnomalyScorer::with_strategy(ScoringStrategy::OutlierProbability(Box::new(model)));
        let mut h = harness(small_window(), scorer);

        h.dispatcher
            .handle_payload(&payload("imu01", 1, &sine(16, 2.0, 8.0)))
            .await
            .unwrap();

        let message: OutputMessage = serde_json::from_slice(&h.bus.messages()[0].1).unwrap();
        let score = message.anomaly_score.unwrap();
        assert!((0.0..=1.0).contains(&score));
        let stored = h.store.points()[0].field_value("anomaly_score").unwrap();
        assert!((stored - score).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_top_spectrum_mode() {
        let bus = Arc::new(InMemoryBus::new());
        let publisher = FanoutPublisher::new(bus.clone(), None, PublisherConfig::default());
        let config = DispatcherConfig {
            window: small_window(),
            top_n: 3,
            spectrum_mode: SpectrumMode::Top,
        };
        let mut dispatcher = IngestDispatcher::new(config, AnomalyScorer::Disabled, publisher);

        dispatcher
            .handle_payload(&payload("imu01", 1, &sine(16, 2.0, 8.0)))
            .await
            .unwrap();

        let message: OutputMessage = serde_json::from_slice(&bus.messages()[0].1).unwrap();
        assert_eq!(message.frequencies.len(), 3);
        assert_eq!(message.frequencies[0], message.dominant_frequency);
    }

    #[tokio::test]
    async fn test_run_until_closed() {
        let h = harness(small_window(), AnomalyScorer::Disabled);
        let (tx, rx) = mpsc::channel(8);

        tx.send(payload("a", 1, &sine(16, 2.0, 8.0))).await.unwrap();
        tx.send(b"{".to_vec()).await.unwrap();
        tx.send(payload("b", 2, &[0.5; 3])).await.unwrap();
        drop(tx);

        let stats = h.dispatcher.run(rx).await;
        assert_eq!(
            stats,
            DispatchStats {
                batches_accepted: 2,
                batches_rejected: 1,
                windows_published: 1,
                windows_skipped: 0,
                samples_discarded: 3,
            }
        );
        assert_eq!(h.bus.messages().len(), 1);
    }
}
