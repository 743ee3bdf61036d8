//! Output series definitions
//!
//! A series carries its value in one of two ways:
//!
//! - **Deferred**: an accessor evaluated when the registry is gathered, so a
//!   push that happens after conversion still sees the freshest value
//! - **Snapshot**: a number frozen when the series was created
//!
//! Registration turns a series into a `prometheus` collector: snapshots
//! become plain `Gauge`/`Counter` instruments, deferred series a
//! `DeferredCollector` that reads its accessor inside `collect()`.

use super::collector::DeferredCollector;
use crate::metrics::LabelSet;
use prometheus::core::Collector;
use prometheus::proto::MetricType;
use prometheus::{Counter, Gauge, Opts};
use std::fmt;
use std::sync::Arc;

/// Accessor re-read at gather time
pub type ValueFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Kind of a series at the exposition boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Counter,
    Gauge,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Counter => "counter",
            SeriesKind::Gauge => "gauge",
        }
    }

    pub fn from_metric_type(metric_type: MetricType) -> Option<SeriesKind> {
        match metric_type {
            MetricType::COUNTER => Some(SeriesKind::Counter),
            MetricType::GAUGE => Some(SeriesKind::Gauge),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub enum SeriesValue {
    Deferred(ValueFn),
    Snapshot(f64),
}

impl SeriesValue {
    pub fn read(&self) -> f64 {
        match self {
            SeriesValue::Deferred(f) => f(),
            SeriesValue::Snapshot(v) => *v,
        }
    }
}

impl fmt::Debug for SeriesValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesValue::Deferred(_) => f.write_str("Deferred(..)"),
            SeriesValue::Snapshot(v) => f.debug_tuple("Snapshot").field(v).finish(),
        }
    }
}

/// Counter or gauge instrument backing one series
pub(crate) enum Instrument {
    Counter(Counter),
    Gauge(Gauge),
}

impl Instrument {
    fn new(kind: SeriesKind, opts: Opts) -> prometheus::Result<Self> {
        Ok(match kind {
            SeriesKind::Counter => Instrument::Counter(Counter::with_opts(opts)?),
            SeriesKind::Gauge => Instrument::Gauge(Gauge::with_opts(opts)?),
        })
    }

    /// Counters only move up from zero; a negative or NaN total reads as 0
    pub(crate) fn set(&self, value: f64) {
        match self {
            Instrument::Counter(c) => {
                c.reset();
                c.inc_by(value.max(0.0));
            }
            Instrument::Gauge(g) => g.set(value),
        }
    }

    pub(crate) fn collector(&self) -> &dyn Collector {
        match self {
            Instrument::Counter(c) => c,
            Instrument::Gauge(g) => g,
        }
    }

    fn into_collector(self) -> Box<dyn Collector> {
        match self {
            Instrument::Counter(c) => Box::new(c),
            Instrument::Gauge(g) => Box::new(g),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSeries {
    name: String,
    kind: SeriesKind,
    labels: Arc<LabelSet>,
    value: SeriesValue,
}

impl OutputSeries {
    pub fn deferred(
        name: String,
        kind: SeriesKind,
        labels: Arc<LabelSet>,
        accessor: impl Fn() -> f64 + Send + Sync + 'static,
    ) -> Self {
        OutputSeries {
            name,
            kind,
            labels,
            value: SeriesValue::Deferred(Arc::new(accessor)),
        }
    }

    pub fn snapshot(name: String, kind: SeriesKind, labels: Arc<LabelSet>, value: f64) -> Self {
        OutputSeries {
            name,
            kind,
            labels,
            value: SeriesValue::Snapshot(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Current value; deferred accessors are evaluated on every call
    pub fn value(&self) -> f64 {
        self.value.read()
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.value, SeriesValue::Deferred(_))
    }

    pub fn opts(&self) -> Opts {
        Opts::new(self.name.clone(), format!("k6 {} {}", self.kind, self.name)).const_labels(
            self.labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Build the collector registered for this series
    ///
    /// Fails when the name or a label name is not a valid exposition name.
    pub fn into_collector(self) -> prometheus::Result<Box<dyn Collector>> {
        let instrument = Instrument::new(self.kind, self.opts())?;
        match self.value {
            SeriesValue::Snapshot(v) => {
                instrument.set(v);
                Ok(instrument.into_collector())
            }
            SeriesValue::Deferred(accessor) => Ok(Box::new(DeferredCollector::new(
                self.name, instrument, accessor,
            ))),
        }
    }
}

/// Join the non-empty parts of a series name with `_`
pub fn series_name(prefix: &str, metric: &str, suffix: Option<&str>) -> String {
    [Some(prefix), Some(metric), suffix]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
