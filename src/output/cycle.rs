//! One flush cycle: drained samples in, one push attempt out
//!
//! dedup -> resolve/convert -> register -> gather -> push
//!
//! Every step after the drain is per-cycle state. A cycle never touches
//! the buffer and never sees another cycle's registry, so cycles left
//! running by a slow gateway cannot interfere with later ones.

use super::stats::FlushStats;
use crate::convert::{resolve, ConversionContext, ConvertError};
use crate::exposition::{MetricFamily, OutputSeries, SeriesRegistry};
use crate::metrics::Sample;
use crate::push::PushTransport;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn, Level};

/// Keep the last sample per metric name, in drain order
///
/// Output is sorted by metric name.
pub fn dedup(samples: Vec<Sample>) -> Vec<Sample> {
    let mut latest: BTreeMap<String, Sample> = BTreeMap::new();
    for sample in samples {
        latest.insert(sample.name().to_string(), sample);
    }
    latest.into_values().collect()
}

pub(crate) struct CycleRunner {
    pub ctx: ConversionContext,
    pub transport: Arc<dyn PushTransport>,
    pub endpoint: String,
    pub job: String,
    pub log_dropped: bool,
    pub stats: FlushStats,
}

impl CycleRunner {
    /// Convert deduplicated samples into a fresh registry
    ///
    /// A sample that fails or panics while converting is skipped, as is any
    /// series the registry refuses. Neither stops the rest of the cycle.
    pub(crate) fn build_registry(&self, samples: Vec<Sample>) -> SeriesRegistry {
        let dump = tracing::enabled!(Level::DEBUG);
        let mut registry = SeriesRegistry::new();

        for sample in dedup(samples) {
            if dump {
                debug!(
                    metric = sample.name(),
                    kind = %sample.kind(),
                    value = sample.value,
                    time = sample.time.as_millis(),
                    "Sample"
                );
            }

            let Some(converter) = resolve(sample.kind()) else {
                self.stats.record_dropped();
                if self.log_dropped {
                    warn!(
                        metric = sample.name(),
                        kind = %sample.kind(),
                        "Dropping sample with unsupported metric kind"
                    );
                }
                continue;
            };

            let Some(series) = self.guarded_convert(&sample, |sample| {
                converter.convert(sample, &self.ctx)
            }) else {
                continue;
            };

            for s in series {
                if dump {
                    debug!(
                        name = s.name(),
                        kind = %s.kind(),
                        labels = %s.labels(),
                        deferred = s.is_deferred(),
                        "Series"
                    );
                }
                if let Err(e) = registry.register(s) {
                    self.stats.record_rejected(1);
                    warn!(error = %e, metric = sample.name(), "Skipping series");
                }
            }
        }

        registry
    }

    /// Run one sample's conversion, counting an error or a panic as a
    /// conversion failure
    pub(crate) fn guarded_convert(
        &self,
        sample: &Sample,
        convert: impl FnOnce(&Sample) -> Result<Vec<OutputSeries>, ConvertError>,
    ) -> Option<Vec<OutputSeries>> {
        match panic::catch_unwind(AssertUnwindSafe(|| convert(sample))) {
            Ok(Ok(series)) => Some(series),
            Ok(Err(e)) => {
                self.stats.record_conversion_failure();
                warn!(error = %e, "Skipping sample");
                None
            }
            Err(_) => {
                self.stats.record_conversion_failure();
                warn!(metric = sample.name(), "Conversion panicked, skipping sample");
                None
            }
        }
    }

    /// Run the cycle to completion. Push failures are logged and counted;
    /// they never propagate.
    pub(crate) async fn run(&self, samples: Vec<Sample>) {
        self.push_registry(self.build_registry(samples)).await;
    }

    /// Gather and push a built registry, then mark the cycle completed
    pub(crate) async fn push_registry(&self, registry: SeriesRegistry) {
        let families: Vec<MetricFamily> = registry.gather();
        // Series whose accessor panicked during gather yield no family
        let lost = registry.len().saturating_sub(families.len());
        if lost > 0 {
            self.stats.record_rejected(lost);
        }

        if families.is_empty() {
            self.stats.record_skipped();
            debug!("No series to push");
        } else {
            match self
                .transport
                .push(&self.endpoint, &self.job, &families)
                .await
            {
                Ok(()) => {
                    self.stats.record_push(families.len(), true);
                    debug!(series = families.len(), job = %self.job, "Pushed to Pushgateway");
                }
                Err(e) => {
                    self.stats.record_push(families.len(), false);
                    error!("Could not add to Pushgateway: {}", e);
                }
            }
        }

        self.stats.record_cycle_completed();
    }
}
