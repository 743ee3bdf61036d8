//! Load-test metrics as the host produces them
//!
//! - **Metric**: immutable name + kind, with a sink accumulating observations
//! - **Sample**: one observation of a metric
//! - **SampleBuffer**: where the producer leaves samples for the next flush
//! - **MetricRegistry**: host-side registration and observation helper

mod types;
mod sink;
mod buffer;
mod registry;

pub use types::{MetricKind, Metric, Sample, LabelSet, SharedSink};
pub use sink::{Sink, CounterSink, GaugeSink, RateSink, TrendSink, TrendStat, DEFAULT_TREND_WINDOW};
pub use buffer::SampleBuffer;
pub use registry::{MetricRegistry, MetricError, MAX_METRIC_NAME_LEN};
