pub mod clock;
pub mod config;
pub mod convert;
pub mod exposition;
pub mod metrics;
pub mod observability;
pub mod output;
pub mod push;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, Timestamp};
pub use config::{ConfigError, PushConfig};
pub use convert::{resolve, ConversionContext, ConvertError, Converter};
pub use exposition::{encode_text, MetricFamily, OutputSeries, SeriesKind, SeriesRegistry};
pub use metrics::{LabelSet, Metric, MetricKind, MetricRegistry, Sample, SampleBuffer, Sink};
pub use output::{FlushStatsSnapshot, OutputError, PushOutput};
pub use push::{HttpPushTransport, InMemoryPushTransport, PushError, PushTransport};
