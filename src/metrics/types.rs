//! Core metric types shared between the host and the output

use crate::clock::Timestamp;
use crate::metrics::sink::{Sink, TrendStat};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Semantic kind of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Cumulative total
    /// Use for: request counts, bytes sent, iterations
    Counter,

    /// Point-in-time value, last write wins
    /// Use for: active virtual users, queue depth
    Gauge,

    /// Ratio of non-zero observations to all observations
    /// Use for: failure rate, check pass rate
    Rate,

    /// Distribution summarised by min/max/avg/percentiles
    /// Use for: latency, response sizes
    Trend,

    /// Any kind name the output does not recognise
    #[serde(other)]
    Unknown,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
            MetricKind::Unknown => "unknown",
        }
    }

    /// Parse a kind name; anything unrecognised maps to `Unknown`
    pub fn parse(s: &str) -> MetricKind {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "rate" => MetricKind::Rate,
            "trend" => MetricKind::Trend,
            _ => MetricKind::Unknown,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, host-mutated sink
pub type SharedSink = Arc<RwLock<Sink>>;

/// Metric identity: a stable name, a kind tag and the sink accumulating
/// observations for it. The name is the dedup key within a flush window.
#[derive(Debug)]
pub struct Metric {
    name: String,
    kind: MetricKind,
    sink: SharedSink,
}

impl Metric {
    /// Create a metric with the default sink for its kind
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self::with_sink(name, kind, Sink::for_kind(kind, TrendStat::defaults()))
    }

    /// Create a metric around an explicit sink
    pub fn with_sink(name: impl Into<String>, kind: MetricKind, sink: Sink) -> Self {
        Metric {
            name: name.into(),
            kind,
            sink: Arc::new(RwLock::new(sink)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }
}

/// One observation of a metric
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric: Arc<Metric>,
    pub value: f64,
    pub time: Timestamp,
}

impl Sample {
    pub fn new(metric: Arc<Metric>, value: f64, time: Timestamp) -> Self {
        Sample {
            metric,
            value,
            time,
        }
    }

    pub fn name(&self) -> &str {
        self.metric.name()
    }

    pub fn kind(&self) -> MetricKind {
        self.metric.kind()
    }
}

/// Constant labels attached to every series of a run
/// Stored sorted so rendering is deterministic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        LabelSet { labels }
    }

    pub fn empty() -> Self {
        LabelSet::default()
    }

    /// Create LabelSet from slice of (key, value) tuples
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let labels = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LabelSet { labels }
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.labels.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}
