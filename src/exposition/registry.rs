//! Per-cycle series registry
//!
//! A fresh `prometheus::Registry` for every flush cycle, dropped after the
//! push attempt. `Registry::register` refuses invalid names and repeated
//! series rather than merging them.

use super::series::{OutputSeries, SeriesKind};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

pub struct SeriesRegistry {
    registry: Registry,
    names: Vec<String>,
}

impl Default for SeriesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesRegistry {
    pub fn new() -> Self {
        SeriesRegistry {
            registry: Registry::new(),
            names: Vec::new(),
        }
    }

    pub fn register(&mut self, series: OutputSeries) -> prometheus::Result<()> {
        let name = series.name().to_string();
        self.registry.register(series.into_collector()?)?;
        self.names.push(name);
        Ok(())
    }

    /// Read every series now; families come back sorted by name
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Encode gathered families in the text exposition format
pub fn encode_text(families: &[MetricFamily]) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Value of the family's first sample, for counters and gauges
pub fn family_value(family: &MetricFamily) -> Option<f64> {
    let metric = family.get_metric().first()?;
    match SeriesKind::from_metric_type(family.get_field_type())? {
        SeriesKind::Counter => Some(metric.get_counter().get_value()),
        SeriesKind::Gauge => Some(metric.get_gauge().get_value()),
    }
}

/// Labels of the family's first sample as `(name, value)` pairs
pub fn family_labels(family: &MetricFamily) -> Vec<(String, String)> {
    family
        .get_metric()
        .first()
        .map(|m| {
            m.get_label()
                .iter()
                .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
                .collect()
        })
        .unwrap_or_default()
}
