use serde::{Deserialize, Serialize};

/// Metric class carried in the wire `type` field.
///
/// # Examples
///
/// ```
/// use pushmon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(format!("unknown metric kind: {s}")),
        }
    }
}

/// Metric payload. The variant is authoritative for the metric's kind, so a
/// gauge can never carry a delta and a counter can never carry a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{value}"),
            MetricValue::Counter(delta) => write!(f, "{delta}"),
        }
    }
}

/// One named metric observation.
///
/// On the wire a metric is `{"id", "type", "value"|"delta"}` with exactly one
/// payload field present; decoding rejects unknown kinds and payloads that do
/// not match the declared kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMetric", into = "WireMetric")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Identity-only request body for metric reads (`POST /value`), where payload
/// fields are absent by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricKey {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// Codec-level rejection of a malformed wire metric.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("metric '{id}' is missing its '{field}' payload")]
    MissingPayload { id: String, field: &'static str },
}

/// JSON shape of a metric as it travels between agent and server. Kept
/// private: everything past the codec works with the validated [`Metric`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMetric {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<WireMetric> for Metric {
    type Error = CodecError;

    fn try_from(wire: WireMetric) -> Result<Self, Self::Error> {
        let kind: MetricKind = wire
            .kind
            .parse()
            .map_err(|_| CodecError::UnknownKind(wire.kind.clone()))?;
        let value = match kind {
            MetricKind::Gauge => {
                let value = wire.value.ok_or(CodecError::MissingPayload {
                    id: wire.id.clone(),
                    field: "value",
                })?;
                MetricValue::Gauge(value)
            }
            MetricKind::Counter => {
                let delta = wire.delta.ok_or(CodecError::MissingPayload {
                    id: wire.id.clone(),
                    field: "delta",
                })?;
                MetricValue::Counter(delta)
            }
        };
        Ok(Metric { id: wire.id, value })
    }
}

impl From<Metric> for WireMetric {
    fn from(metric: Metric) -> Self {
        match metric.value {
            MetricValue::Gauge(value) => WireMetric {
                id: metric.id,
                kind: "gauge".to_string(),
                delta: None,
                value: Some(value),
            },
            MetricValue::Counter(delta) => WireMetric {
                id: metric.id,
                kind: "counter".to_string(),
                delta: Some(delta),
                value: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_gauge() {
        let metric: Metric = serde_json::from_str(r#"{"id":"temp","type":"gauge","value":36.6}"#)
            .expect("gauge should decode");
        assert_eq!(metric, Metric::gauge("temp", 36.6));
    }

    #[test]
    fn decodes_counter() {
        let metric: Metric = serde_json::from_str(r#"{"id":"hits","type":"counter","delta":5}"#)
            .expect("counter should decode");
        assert_eq!(metric, Metric::counter("hits", 5));
    }

    #[test]
    fn rejects_unknown_kind() {
        let result = serde_json::from_str::<Metric>(r#"{"id":"x","type":"bogus"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_payload() {
        assert!(serde_json::from_str::<Metric>(r#"{"id":"x","type":"gauge"}"#).is_err());
        assert!(serde_json::from_str::<Metric>(r#"{"id":"x","type":"counter","value":1.0}"#).is_err());
    }

    #[test]
    fn serializes_exactly_one_payload_field() {
        let gauge = serde_json::to_value(Metric::gauge("temp", 1.5)).unwrap();
        assert_eq!(gauge["type"], "gauge");
        assert_eq!(gauge["value"], 1.5);
        assert!(gauge.get("delta").is_none());

        let counter = serde_json::to_value(Metric::counter("hits", 2)).unwrap();
        assert_eq!(counter["type"], "counter");
        assert_eq!(counter["delta"], 2);
        assert!(counter.get("value").is_none());
    }

    #[test]
    fn decodes_batch() {
        let batch: Vec<Metric> = serde_json::from_str(
            r#"[{"id":"a","type":"gauge","value":1.0},{"id":"b","type":"counter","delta":3}]"#,
        )
        .expect("batch should decode");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].kind(), MetricKind::Counter);
    }

    #[test]
    fn metric_key_validates_kind() {
        let key: MetricKey = serde_json::from_str(r#"{"id":"temp","type":"gauge"}"#).unwrap();
        assert_eq!(key.kind, MetricKind::Gauge);
        assert!(serde_json::from_str::<MetricKey>(r#"{"id":"temp","type":"bogus"}"#).is_err());
    }
}
