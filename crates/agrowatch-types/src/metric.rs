//! Metric observations and tag handling.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered key/value labels attached to an observation.
pub type Tags = BTreeMap<String, String>;

/// Build a [`Tags`] map from key/value pairs.
pub fn tags<I, K, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Render the storage key of a metric: `name` or `name[k1=v1,k2=v2]`.
///
/// Tags are emitted in key order so equal tag sets always map to one key.
pub fn metric_key(name: &str, tags: Option<&Tags>) -> String {
    match tags {
        Some(tags) if !tags.is_empty() => {
            let rendered: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("{}[{}]", name, rendered.join(","))
        }
        _ => name.to_string(),
    }
}

/// A single recorded observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    /// Unit label such as `%`, `ms`, `s` or `count`.
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            timestamp,
            tags: Tags::new(),
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Storage key including tags.
    pub fn key(&self) -> String {
        metric_key(&self.name, Some(&self.tags))
    }
}

/// Anything that may carry a numeric metric value.
///
/// Rule evaluation accepts loosely-typed input (API payloads, parsed strings);
/// a reading that cannot be interpreted as a number yields `None` and simply
/// never triggers an alert.
pub trait MetricReading {
    fn as_metric_value(&self) -> Option<f64>;
}

impl MetricReading for f64 {
    fn as_metric_value(&self) -> Option<f64> {
        (!self.is_nan()).then_some(*self)
    }
}

impl MetricReading for f32 {
    fn as_metric_value(&self) -> Option<f64> {
        f64::from(*self).as_metric_value()
    }
}

macro_rules! integer_reading {
    ($($ty:ty),*) => {
        $(
            impl MetricReading for $ty {
                fn as_metric_value(&self) -> Option<f64> {
                    Some(*self as f64)
                }
            }
        )*
    };
}

integer_reading!(i32, i64, u32, u64, usize);

impl MetricReading for str {
    fn as_metric_value(&self) -> Option<f64> {
        self.trim().parse::<f64>().ok()?.as_metric_value()
    }
}

impl MetricReading for String {
    fn as_metric_value(&self) -> Option<f64> {
        self.as_str().as_metric_value()
    }
}

impl MetricReading for serde_json::Value {
    fn as_metric_value(&self) -> Option<f64> {
        match self {
            serde_json::Value::Number(n) => n.as_f64()?.as_metric_value(),
            serde_json::Value::String(s) => s.as_metric_value(),
            _ => None,
        }
    }
}

impl<T: MetricReading> MetricReading for Option<T> {
    fn as_metric_value(&self) -> Option<f64> {
        self.as_ref().and_then(MetricReading::as_metric_value)
    }
}

impl<T: MetricReading + ?Sized> MetricReading for &T {
    fn as_metric_value(&self) -> Option<f64> {
        (**self).as_metric_value()
    }
}
