//! Collector for series read at gather time
//!
//! The accessor runs inside `collect()`. A panicking accessor costs only its
//! own series: `collect()` logs it and yields no families.

use super::series::{Instrument, ValueFn};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

pub struct DeferredCollector {
    name: String,
    instrument: Instrument,
    accessor: ValueFn,
}

impl DeferredCollector {
    pub(crate) fn new(name: String, instrument: Instrument, accessor: ValueFn) -> Self {
        DeferredCollector {
            name,
            instrument,
            accessor,
        }
    }
}

impl Collector for DeferredCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.instrument.collector().desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match catch_unwind(AssertUnwindSafe(|| (self.accessor)())) {
            Ok(value) => {
                self.instrument.set(value);
                self.instrument.collector().collect()
            }
            Err(_) => {
                warn!(series = %self.name, "Series accessor panicked, dropping series from this push");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::exposition::{OutputSeries, SeriesKind};
    use crate::metrics::LabelSet;
    use prometheus::core::Collector;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_collect_reads_accessor_each_time() {
        let cell = Arc::new(AtomicU64::new(3));
        let reader = cell.clone();
        let collector = OutputSeries::deferred(
            "http_reqs".to_string(),
            SeriesKind::Counter,
            Arc::new(LabelSet::empty()),
            move || reader.load(Ordering::SeqCst) as f64,
        )
        .into_collector()
        .unwrap();

        let first = collector.collect();
        assert_eq!(first[0].get_metric()[0].get_counter().get_value(), 3.0);

        // A counter re-reads the total rather than adding to it
        cell.store(5, Ordering::SeqCst);
        let second = collector.collect();
        assert_eq!(second[0].get_metric()[0].get_counter().get_value(), 5.0);
    }

    #[test]
    fn test_panicking_accessor_yields_nothing() {
        let collector = OutputSeries::deferred(
            "vus".to_string(),
            SeriesKind::Gauge,
            Arc::new(LabelSet::empty()),
            || panic!("sink gone"),
        )
        .into_collector()
        .unwrap();

        assert_eq!(collector.desc().len(), 1);
        assert!(collector.collect().is_empty());
    }
}
