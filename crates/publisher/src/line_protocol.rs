//! InfluxDB Line Protocol

use crate::SinkError;
use tracing::debug;

/// A single time-series point
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp_ns: Option<i64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ns: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn timestamp(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = Some(timestamp_ns);
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn field_value(&self, key: &str) -> Option<f64> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn timestamp_ns(&self) -> Option<i64> {
        self.timestamp_ns
    }

    /// Render as one line of line protocol.
    ///
    /// Tags are sorted by key and empty tag values dropped. Non-finite
    /// fields cannot be represented and are skipped; a point left without
    /// fields is an error.
    pub fn to_line(&self) -> Result<String, SinkError> {
        let mut line = escape(&self.measurement, &[',', ' ']);

        let mut tags: Vec<_> = self.tags.iter().filter(|(_, v)| !v.is_empty()).collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in tags {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            if value.is_finite() {
                fields.push(format!("{}={:?}", escape(key, &[',', '=', ' ']), value));
            } else {
                debug!("Dropping non-finite field {}={}", key, value);
            }
        }
        if fields.is_empty() {
            return Err(SinkError::Serialization(format!(
                "point '{}' has no finite fields",
                self.measurement
            )));
        }

        line.push(' ');
        line.push_str(&fields.join(","));

        if let Some(ts) = self.timestamp_ns {
            line.push(' ');
            line.push_str(&ts.to_string());
        }

        Ok(line)
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_line() {
        let line = Point::new("vibration_features")
            .tag("sensor_id", "imu01")
            .tag("axis", "ax")
            .field("dominant_frequency", 50.0)
            .field("energy", 0.125)
            .timestamp(1_700_000_000_000_000_000)
            .to_line()
            .unwrap();

        assert_eq!(
            line,
            "vibration_features,axis=ax,sensor_id=imu01 dominant_frequency=50.0,energy=0.125 1700000000000000000"
        );
    }

    #[test]
    fn test_escaping() {
        let line = Point::new("vib features")
            .tag("axis", "a,x=1 2")
            .field("my field", 1.0)
            .to_line()
            .unwrap();
        assert_eq!(line, r"vib\ features,axis=a\,x\=1\ 2 my\ field=1.0");
    }

    #[test]
    fn test_non_finite_fields_skipped() {
        let point = Point::new("m").field("a", f64::NAN).field("b", 2.5);
        assert_eq!(point.to_line().unwrap(), "m b=2.5");

        let empty = Point::new("m").field("a", f64::INFINITY);
        assert!(empty.to_line().is_err());
    }

    #[test]
    fn test_empty_tag_dropped() {
        let line = Point::new("m").tag("axis", "").field("a", 1.0).to_line().unwrap();
        assert_eq!(line, "m a=1.0");
    }
}
