//! Host-side metric registry
//!
//! Owns one `Metric` per name, feeds observations into sinks and hands back
//! the `Sample` the producer appends to the output's buffer.

use crate::clock::SharedClock;
use crate::metrics::sink::{Sink, TrendStat};
use crate::metrics::types::{Metric, MetricKind, Sample};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Longest metric name the registry accepts
pub const MAX_METRIC_NAME_LEN: usize = 128;

/// Error type for metric registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// Name is empty or longer than `MAX_METRIC_NAME_LEN`
    InvalidName(String),
    /// Name already registered with another kind
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
}

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::InvalidName(name) => write!(f, "invalid metric name: {:?}", name),
            MetricError::KindMismatch {
                name,
                existing,
                requested,
            } => write!(
                f,
                "metric {} already registered as {}, requested {}",
                name, existing, requested
            ),
        }
    }
}

impl std::error::Error for MetricError {}

pub struct MetricRegistry {
    metrics: RwLock<HashMap<String, Arc<Metric>>>,
    trend_stats: Arc<[TrendStat]>,
    clock: SharedClock,
}

impl MetricRegistry {
    pub fn new(clock: SharedClock, trend_stats: Arc<[TrendStat]>) -> Self {
        MetricRegistry {
            metrics: RwLock::new(HashMap::new()),
            trend_stats,
            clock,
        }
    }

    /// Register a metric, or return the existing one for a repeated name and kind
    pub fn new_metric(&self, name: &str, kind: MetricKind) -> Result<Arc<Metric>, MetricError> {
        if name.is_empty() || name.chars().count() > MAX_METRIC_NAME_LEN {
            return Err(MetricError::InvalidName(name.to_string()));
        }

        if let Some(existing) = self.metrics.read().get(name) {
            return Self::check_kind(existing, kind);
        }

        let mut metrics = self.metrics.write();
        // Re-check under the write lock: another producer may have won the race
        if let Some(existing) = metrics.get(name) {
            return Self::check_kind(existing, kind);
        }

        let sink = Sink::for_kind(kind, self.trend_stats.clone());
        let metric = Arc::new(Metric::with_sink(name, kind, sink));
        metrics.insert(name.to_string(), metric.clone());
        Ok(metric)
    }

    fn check_kind(existing: &Arc<Metric>, kind: MetricKind) -> Result<Arc<Metric>, MetricError> {
        if existing.kind() == kind {
            Ok(existing.clone())
        } else {
            Err(MetricError::KindMismatch {
                name: existing.name().to_string(),
                existing: existing.kind(),
                requested: kind,
            })
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Metric>> {
        self.metrics.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Record one observation and return the sample describing it
    ///
    /// Rate samples carry the sink's ratio after this observation, so the
    /// output can relay it without recomputing anything.
    pub fn observe(&self, metric: &Arc<Metric>, value: f64) -> Sample {
        let time = self.clock.now();
        let sample_value = {
            let mut sink = metric.sink().write();
            sink.add(value, time);
            match &*sink {
                Sink::Rate(rate) => rate.rate(),
                _ => value,
            }
        };
        Sample::new(metric.clone(), sample_value, time)
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.len())
            .field("trend_stats", &self.trend_stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Timestamp};
    use std::time::Duration;

    fn registry() -> (MetricRegistry, ManualClock) {
        let clock = ManualClock::new(1_000);
        (MetricRegistry::new(clock.shared(), TrendStat::defaults()), clock)
    }

    #[test]
    fn test_new_metric_is_idempotent() {
        let (registry, _) = registry();
        let a = registry.new_metric("http_reqs", MetricKind::Counter).unwrap();
        let b = registry.new_metric("http_reqs", MetricKind::Counter).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_new_metric_kind_mismatch() {
        let (registry, _) = registry();
        registry.new_metric("vus", MetricKind::Gauge).unwrap();

        let err = registry.new_metric("vus", MetricKind::Counter).unwrap_err();
        assert_eq!(
            err,
            MetricError::KindMismatch {
                name: "vus".to_string(),
                existing: MetricKind::Gauge,
                requested: MetricKind::Counter,
            }
        );
    }

    #[test]
    fn test_new_metric_rejects_bad_names() {
        let (registry, _) = registry();
        assert!(registry.new_metric("", MetricKind::Gauge).is_err());
        let long = "x".repeat(MAX_METRIC_NAME_LEN + 1);
        assert!(registry.new_metric(&long, MetricKind::Gauge).is_err());
    }

    #[test]
    fn test_observe_counter_tracks_first_time() {
        let (registry, clock) = registry();
        let reqs = registry.new_metric("http_reqs", MetricKind::Counter).unwrap();

        let first = registry.observe(&reqs, 1.0);
        clock.advance(Duration::from_secs(5));
        let second = registry.observe(&reqs, 1.0);

        assert_eq!(first.time, Timestamp(1_000));
        assert_eq!(second.time, Timestamp(6_000));
        let sink = reqs.sink().read();
        assert_eq!(sink.first_seen(), Some(Timestamp(1_000)));
        assert_eq!(sink.format(Duration::from_secs(5))["count"], 2.0);
    }

    #[test]
    fn test_observe_rate_carries_ratio() {
        let (registry, _) = registry();
        let failed = registry.new_metric("http_req_failed", MetricKind::Rate).unwrap();

        registry.observe(&failed, 1.0);
        registry.observe(&failed, 0.0);
        registry.observe(&failed, 0.0);
        let sample = registry.observe(&failed, 1.0);

        assert_eq!(sample.value, 0.5);
    }
}
