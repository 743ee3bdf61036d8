//! Exposition boundary
//!
//! What a flush cycle hands to the push transport:
//!
//! ```text
//! OutputSeries ──register──► SeriesRegistry ──gather──► [MetricFamily] ──encode_text──► payload
//! ```
//!
//! `MetricFamily` is `prometheus::proto::MetricFamily`.

pub mod collector;
pub mod registry;
pub mod series;

pub use collector::DeferredCollector;
pub use prometheus::proto::MetricFamily;
pub use registry::{encode_text, family_labels, family_value, SeriesRegistry, CONTENT_TYPE};
pub use series::{series_name, OutputSeries, SeriesKind, SeriesValue, ValueFn};
