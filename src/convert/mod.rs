//! Metric-kind resolution and conversion
//!
//! `resolve` maps a metric kind to the converter responsible for it; each
//! converter turns one sample into output series:
//!
//! | kind    | series                          | value strategy |
//! |---------|---------------------------------|----------------|
//! | Counter | 1 counter `<name>`              | deferred       |
//! | Gauge   | 1 gauge `<name>`                | deferred       |
//! | Rate    | 1 gauge `<name>`                | deferred       |
//! | Trend   | 1 gauge `<name>_<stat>` per stat | snapshot       |
//!
//! Series names are not checked here; the per-cycle registry refuses
//! invalid ones one series at a time.

mod kinds;

use crate::clock::SharedClock;
use crate::exposition::OutputSeries;
use crate::metrics::{LabelSet, MetricKind, Sample};
use std::sync::Arc;

/// Error type for converting a single sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// The metric's sink does not match what its kind requires
    SinkMismatch { metric: String, expected: &'static str },
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvertError::SinkMismatch { metric, expected } => {
                write!(f, "metric {} does not carry a {} sink", metric, expected)
            }
        }
    }
}

impl std::error::Error for ConvertError {}

/// Immutable inputs shared by every conversion of an output's lifetime
#[derive(Clone)]
pub struct ConversionContext {
    pub labels: Arc<LabelSet>,
    pub prefix: String,
    pub clock: SharedClock,
}

impl ConversionContext {
    pub fn new(labels: LabelSet, prefix: impl Into<String>, clock: SharedClock) -> Self {
        ConversionContext {
            labels: Arc::new(labels),
            prefix: prefix.into(),
            clock,
        }
    }
}

impl std::fmt::Debug for ConversionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionContext")
            .field("labels", &self.labels)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// One converter per known metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Converter {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// Converter for a kind, or `None` when the kind is not recognised
///
/// Callers drop samples without a converter from the cycle.
pub fn resolve(kind: MetricKind) -> Option<Converter> {
    match kind {
        MetricKind::Counter => Some(Converter::Counter),
        MetricKind::Gauge => Some(Converter::Gauge),
        MetricKind::Rate => Some(Converter::Rate),
        MetricKind::Trend => Some(Converter::Trend),
        MetricKind::Unknown => None,
    }
}

impl Converter {
    pub fn convert(
        &self,
        sample: &Sample,
        ctx: &ConversionContext,
    ) -> Result<Vec<OutputSeries>, ConvertError> {
        match self {
            Converter::Counter => kinds::convert_counter(sample, ctx),
            Converter::Gauge => kinds::convert_gauge(sample, ctx),
            Converter::Rate => kinds::convert_rate(sample, ctx),
            Converter::Trend => kinds::convert_trend(sample, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resolve_known_kinds_are_distinct() {
        let kinds = [
            MetricKind::Counter,
            MetricKind::Gauge,
            MetricKind::Rate,
            MetricKind::Trend,
        ];
        let converters: HashSet<Converter> = kinds
            .iter()
            .map(|k| resolve(*k).expect("known kind must resolve"))
            .collect();
        assert_eq!(converters.len(), 4);

        assert_eq!(resolve(MetricKind::Counter), Some(Converter::Counter));
        assert_eq!(resolve(MetricKind::Gauge), Some(Converter::Gauge));
        assert_eq!(resolve(MetricKind::Rate), Some(Converter::Rate));
        assert_eq!(resolve(MetricKind::Trend), Some(Converter::Trend));
    }

    #[test]
    fn test_resolve_unknown_kind() {
        assert_eq!(resolve(MetricKind::Unknown), None);
        assert_eq!(resolve(MetricKind::parse("histogram")), None);
    }
}
