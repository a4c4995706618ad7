//! Sample Batch Decoding
//!
//! Inbound payloads are flat JSON objects:
//!
//! ```json
//! {"sensor_id": "imu01", "time": 1700000000000, "ax": [0.1, 0.2], "ay": [0.0, -0.1]}
//! ```
//!
//! Every key other than `sensor_id`, `time`/`ts` and `axes` names an axis.
//! A nested `axes` object and scalar one-sample axes are accepted as well.

use crate::error::ValidationError;
use crate::validator::{validate_samples, validate_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::trace;

const SENSOR_ID_KEY: &str = "sensor_id";
const TIME_KEY: &str = "time";
const TIME_ALIAS_KEY: &str = "ts";
const AXES_KEY: &str = "axes";

/// One decoded batch of per-axis samples from a single sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    /// Sensor identifier
    pub sensor_id: String,
    /// Timestamp of the last sample in the batch (ms epoch)
    pub timestamp_ms: i64,
    /// Samples keyed by axis name, in arrival order
    pub axes: BTreeMap<String, Vec<f64>>,
}

impl SampleBatch {
    /// Create a batch from already-decoded parts
    pub fn new(
        sensor_id: impl Into<String>,
        timestamp_ms: i64,
        axes: BTreeMap<String, Vec<f64>>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp_ms,
            axes,
        }
    }

    /// Decode and validate a raw bus payload
    pub fn from_json(payload: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::InvalidFormat(e.to_string()))?;

        match value {
            Value::Object(map) => Self::from_object(map),
            other => Err(ValidationError::InvalidFormat(format!(
                "expected a JSON object, got {}",
                value_kind(&other)
            ))),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Result<Self, ValidationError> {
        let sensor_id = match map.remove(SENSOR_ID_KEY) {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            None | Some(Value::Null) | Some(Value::String(_)) => {
                return Err(ValidationError::MissingField(SENSOR_ID_KEY));
            }
            Some(other) => {
                return Err(ValidationError::InvalidFormat(format!(
                    "sensor_id must be a string, got {}",
                    value_kind(&other)
                )));
            }
        };

        let time = map.remove(TIME_KEY);
        let alias = map.remove(TIME_ALIAS_KEY);
        let timestamp_ms = parse_timestamp(time.or(alias))?;

        let mut axes = BTreeMap::new();
        if let Some(nested) = map.remove(AXES_KEY) {
            match nested {
                Value::Object(inner) => collect_axes(inner, &mut axes)?,
                other => {
                    return Err(ValidationError::InvalidFormat(format!(
                        "axes must be an object, got {}",
                        value_kind(&other)
                    )));
                }
            }
        }
        collect_axes(map, &mut axes)?;

        let batch = Self::new(sensor_id, timestamp_ms, axes);
        batch.validate()?;
        trace!(
            "Decoded batch from {}: {} axes, {} samples",
            batch.sensor_id,
            batch.axes.len(),
            batch.sample_count()
        );
        Ok(batch)
    }

    /// Check every invariant of the batch without consuming it
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sensor_id.trim().is_empty() {
            return Err(ValidationError::MissingField(SENSOR_ID_KEY));
        }
        validate_timestamp(self.timestamp_ms)?;
        if self.axes.is_empty() {
            return Err(ValidationError::MissingField(AXES_KEY));
        }
        for (axis, values) in &self.axes {
            validate_samples(axis, values)?;
        }
        Ok(())
    }

    /// Total samples across all axes
    pub fn sample_count(&self) -> usize {
        self.axes.values().map(Vec::len).sum()
    }
}

fn parse_timestamp(value: Option<Value>) -> Result<i64, ValidationError> {
    let timestamp_ms = match value {
        None | Some(Value::Null) => chrono::Utc::now().timestamp_millis(),
        Some(Value::Number(n)) => {
            if let Some(ms) = n.as_i64() {
                ms
            } else if n.as_u64().is_some() {
                return Err(ValidationError::InvalidTimestamp(i64::MAX));
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
                    _ => {
                        return Err(ValidationError::InvalidFormat(format!(
                            "time must be an integer, got {n}"
                        )));
                    }
                }
            }
        }
        Some(other) => {
            return Err(ValidationError::InvalidFormat(format!(
                "time must be an integer, got {}",
                value_kind(&other)
            )));
        }
    };

    validate_timestamp(timestamp_ms)?;
    Ok(timestamp_ms)
}

fn collect_axes(
    map: Map<String, Value>,
    axes: &mut BTreeMap<String, Vec<f64>>,
) -> Result<(), ValidationError> {
    for (axis, value) in map {
        let samples = parse_axis(&axis, value)?;
        if axes.insert(axis.clone(), samples).is_some() {
            return Err(ValidationError::InvalidFormat(format!(
                "axis '{axis}' given twice"
            )));
        }
    }
    Ok(())
}

fn parse_axis(axis: &str, value: Value) -> Result<Vec<f64>, ValidationError> {
    let non_numeric = || ValidationError::NonNumericSample {
        axis: axis.to_string(),
    };

    match value {
        Value::Number(n) => n.as_f64().map(|v| vec![v]).ok_or_else(non_numeric),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_f64().ok_or_else(non_numeric))
            .collect(),
        _ => Err(non_numeric()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_payload() {
        let payload = br#"{"sensor_id":"imu01","time":1700000000000,"ax":[0.1,0.2,0.3],"ay":[1,2,3]}"#;
        let batch = SampleBatch::from_json(payload).unwrap();

        assert_eq!(batch.sensor_id, "imu01");
        assert_eq!(batch.timestamp_ms, 1_700_000_000_000);
        assert_eq!(batch.axes["ax"], vec![0.1, 0.2, 0.3]);
        assert_eq!(batch.axes["ay"], vec![1.0, 2.0, 3.0]);
        assert_eq!(batch.sample_count(), 6);
    }

    #[test]
    fn test_unknown_axis_keys_are_accepted() {
        let payload = br#"{"sensor_id":"s1","time":5,"az":[0.5],"gyro_x":[1.5,2.5]}"#;
        let batch = SampleBatch::from_json(payload).unwrap();
        assert_eq!(batch.axes.len(), 2);
        assert!(batch.axes.contains_key("gyro_x"));
    }

    #[test]
    fn test_nested_axes_object() {
        let payload = br#"{"sensor_id":"s1","time":5,"axes":{"ax":[1.0,2.0]}}"#;
        let batch = SampleBatch::from_json(payload).unwrap();
        assert_eq!(batch.axes["ax"], vec![1.0, 2.0]);
    }

    #[test]
    fn test_scalar_sample_and_ts_alias() {
        let payload = br#"{"sensor_id":"s1","ts":42,"ax":0.25,"ay":-0.5}"#;
        let batch = SampleBatch::from_json(payload).unwrap();
        assert_eq!(batch.timestamp_ms, 42);
        assert_eq!(batch.axes["ax"], vec![0.25]);
        assert_eq!(batch.axes["ay"], vec![-0.5]);
    }

    #[test]
    fn test_missing_time_uses_wall_clock() {
        let before = chrono::Utc::now().timestamp_millis();
        let batch = SampleBatch::from_json(br#"{"sensor_id":"s1","ax":[1.0]}"#).unwrap();
        assert!(batch.timestamp_ms >= before);
    }

    #[test]
    fn test_missing_sensor_id() {
        let err = SampleBatch::from_json(br#"{"time":1,"ax":[1.0]}"#).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("sensor_id"));

        let err = SampleBatch::from_json(br#"{"sensor_id":"  ","time":1,"ax":[1.0]}"#).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("sensor_id"));
    }

    #[test]
    fn test_missing_axes() {
        let err = SampleBatch::from_json(br#"{"sensor_id":"s1","time":1}"#).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("axes"));
    }

    #[test]
    fn test_non_numeric_sample() {
        let err =
            SampleBatch::from_json(br#"{"sensor_id":"s1","time":1,"ax":[1.0,"x"]}"#).unwrap_err();
        assert_eq!(err, ValidationError::NonNumericSample { axis: "ax".into() });

        let err = SampleBatch::from_json(br#"{"sensor_id":"s1","time":1,"ax":"fast"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::NonNumericSample { .. }));
    }

    #[test]
    fn test_empty_axis() {
        let err = SampleBatch::from_json(br#"{"sensor_id":"s1","time":1,"ax":[]}"#).unwrap_err();
        assert_eq!(err, ValidationError::EmptySamples { axis: "ax".into() });
    }

    #[test]
    fn test_unparseable_payloads() {
        assert!(matches!(
            SampleBatch::from_json(b"not json"),
            Err(ValidationError::InvalidFormat(_))
        ));
        assert!(matches!(
            SampleBatch::from_json(b"[1,2,3]"),
            Err(ValidationError::InvalidFormat(_))
        ));
        assert!(matches!(
            SampleBatch::from_json(br#"{"sensor_id":"s1","time":"noon","ax":[1.0]}"#),
            Err(ValidationError::InvalidFormat(_))
        ));
        assert!(matches!(
            SampleBatch::from_json(br#"{"sensor_id":"s1","time":1,"axes":[1.0]}"#),
            Err(ValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let err = SampleBatch::from_json(br#"{"sensor_id":"s1","time":-5,"ax":[1.0]}"#).unwrap_err();
        assert_eq!(err, ValidationError::InvalidTimestamp(-5));
    }

    #[test]
    fn test_duplicate_axis_rejected() {
        let payload = br#"{"sensor_id":"s1","time":1,"ax":[1.0],"axes":{"ax":[2.0]}}"#;
        assert!(matches!(
            SampleBatch::from_json(payload),
            Err(ValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validate_programmatic_batch() {
        let mut axes = BTreeMap::new();
        axes.insert("ax".to_string(), vec![1.0, f64::NAN]);
        let batch = SampleBatch::new("s1", 10, axes);
        assert!(matches!(
            batch.validate(),
            Err(ValidationError::NonFiniteSample { index: 1, .. })
        ));
    }
}
