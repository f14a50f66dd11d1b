//! Domain model for the metrics pipeline.
//!
//! The wire form ([`MetricSample`]) is a loose JSON object shared by agent
//! and server; everything behind the validation boundary works with the
//! strict [`MetricKey`]/[`MetricValue`] pair.

use crate::core::error::{MetricaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two supported metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last reported reading wins.
    Gauge,
    /// Running total of reported deltas.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }

    /// Parses a kind from a URL path segment.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(MetricaError::InvalidMetric(format!(
                "unknown metric kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated metric value; the kind is implied by the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gauge(v) => write!(f, "{v}"),
            Self::Counter(v) => write!(f, "{v}"),
        }
    }
}

/// Store key: a name may hold a gauge and a counter independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub name: String,
    pub kind: MetricKind,
}

impl MetricKey {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Server-resident state for one `(name, kind)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub name: String,
    pub value: MetricValue,
}

impl MetricRecord {
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.name.clone(), self.kind())
    }
}

/// Wire form of one metric, as exchanged over HTTP and stored in snapshot
/// files. `delta` is set for counters, `value` for gauges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricSample {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            id: name.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            id: name.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Validates the wire form into a key/value pair.
    pub fn validated(&self) -> Result<(MetricKey, MetricValue)> {
        if self.id.is_empty() {
            return Err(MetricaError::InvalidMetric("metric id is empty".into()));
        }
        let value = match self.kind {
            MetricKind::Gauge => {
                let v = self.value.ok_or_else(|| {
                    MetricaError::InvalidMetric(format!("gauge {} has no value", self.id))
                })?;
                if !v.is_finite() {
                    return Err(MetricaError::InvalidMetric(format!(
                        "gauge {} is not a finite number",
                        self.id
                    )));
                }
                MetricValue::Gauge(v)
            },
            MetricKind::Counter => {
                let d = self.delta.ok_or_else(|| {
                    MetricaError::InvalidMetric(format!("counter {} has no delta", self.id))
                })?;
                MetricValue::Counter(d)
            },
        };
        Ok((MetricKey::new(self.id.clone(), self.kind), value))
    }

    /// Wire form of a stored record; counters carry the running total.
    pub fn from_record(record: &MetricRecord) -> Self {
        match record.value {
            MetricValue::Gauge(v) => Self::gauge(record.name.clone(), v),
            MetricValue::Counter(v) => Self::counter(record.name.clone(), v),
        }
    }
}

/// One reporting cycle's worth of samples.
pub type Batch = Vec<MetricSample>;

/// Full durable image of the store. Serialized as a JSON array of wire
/// samples, with counter `delta` holding the running total, so restoring
/// into an empty store reproduces the exact value set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub records: Vec<MetricSample>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_json_shape() {
        let gauge = MetricSample::gauge("Alloc", 150.5);
        let json = serde_json::to_string(&gauge).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":150.5}"#);

        let counter = MetricSample::counter("PollCount", 5);
        let json = serde_json::to_string(&counter).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":5}"#);
    }

    #[test]
    fn test_wire_roundtrip() {
        let raw = r#"{"id":"Alloc","type":"gauge","value":1.25}"#;
        let sample: MetricSample = serde_json::from_str(raw).unwrap();
        let (key, value) = sample.validated().unwrap();
        assert_eq!(key, MetricKey::new("Alloc", MetricKind::Gauge));
        assert_eq!(value, MetricValue::Gauge(1.25));
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let sample = MetricSample {
            id: "PollCount".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: Some(3.0),
        };
        assert!(sample.validated().is_err());

        let sample = MetricSample {
            id: "Alloc".into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(f64::NAN),
        };
        assert!(sample.validated().is_err());

        let sample = MetricSample::gauge("", 1.0);
        assert!(sample.validated().is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(MetricKind::parse("histogram").is_err());
        let raw = r#"{"id":"x","type":"histogram","value":1.0}"#;
        assert!(serde_json::from_str::<MetricSample>(raw).is_err());
    }

    #[test]
    fn test_same_name_distinct_kinds() {
        let a = MetricKey::new("load", MetricKind::Gauge);
        let b = MetricKey::new("load", MetricKind::Counter);
        assert_ne!(a, b);
    }
}
