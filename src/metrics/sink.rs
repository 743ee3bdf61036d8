//! Sinks: running aggregators behind each metric
//!
//! The host feeds observations into a sink; the output only ever reads
//! them through `format`, which renders the sink as a map from statistic
//! name to value.

use crate::clock::Timestamp;
use crate::metrics::types::MetricKind;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of recent values a trend sink keeps for percentiles
pub const DEFAULT_TREND_WINDOW: usize = 10_000;

/// A statistic a trend sink can report
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendStat {
    Avg,
    Min,
    Med,
    Max,
    Count,
    Sum,
    /// Percentile in the range 0..=100
    Percentile(f64),
}

impl TrendStat {
    /// The statistic list reported when nothing else is configured
    pub fn defaults() -> Arc<[TrendStat]> {
        Arc::from(
            &[
                TrendStat::Avg,
                TrendStat::Min,
                TrendStat::Med,
                TrendStat::Max,
                TrendStat::Percentile(90.0),
                TrendStat::Percentile(95.0),
            ][..],
        )
    }

    /// Parse a statistic name such as `avg` or `p(99.9)`
    pub fn parse(s: &str) -> Option<TrendStat> {
        match s.trim() {
            "avg" => Some(TrendStat::Avg),
            "min" => Some(TrendStat::Min),
            "med" => Some(TrendStat::Med),
            "max" => Some(TrendStat::Max),
            "count" => Some(TrendStat::Count),
            "sum" => Some(TrendStat::Sum),
            other => {
                let inner = other.strip_prefix("p(")?.strip_suffix(')')?;
                let pct: f64 = inner.trim().parse().ok()?;
                if (0.0..=100.0).contains(&pct) {
                    Some(TrendStat::Percentile(pct))
                } else {
                    None
                }
            }
        }
    }

    /// Parse a comma-separated list, failing on the first bad entry
    pub fn parse_list(s: &str) -> Result<Vec<TrendStat>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| TrendStat::parse(part).ok_or_else(|| part.to_string()))
            .collect()
    }

    pub fn name(&self) -> String {
        match self {
            TrendStat::Avg => "avg".to_string(),
            TrendStat::Min => "min".to_string(),
            TrendStat::Med => "med".to_string(),
            TrendStat::Max => "max".to_string(),
            TrendStat::Count => "count".to_string(),
            TrendStat::Sum => "sum".to_string(),
            TrendStat::Percentile(p) => format!("p({})", p),
        }
    }
}

impl fmt::Display for TrendStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Cumulative total plus the time of the first observation
#[derive(Debug, Clone, Default)]
pub struct CounterSink {
    pub value: f64,
    pub first: Option<Timestamp>,
}

impl CounterSink {
    pub fn add(&mut self, value: f64, time: Timestamp) {
        self.value += value;
        self.first.get_or_insert(time);
    }

    /// `count` is the running total; `rate` is that total per second of `elapsed`
    pub fn format(&self, elapsed: Duration) -> BTreeMap<String, f64> {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { self.value / secs } else { 0.0 };
        BTreeMap::from([("count".to_string(), self.value), ("rate".to_string(), rate)])
    }
}

/// Last observed value
#[derive(Debug, Clone, Default)]
pub struct GaugeSink {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    observed: bool,
}

impl GaugeSink {
    pub fn add(&mut self, value: f64) {
        self.value = value;
        if !self.observed || value < self.min {
            self.min = value;
        }
        if !self.observed || value > self.max {
            self.max = value;
        }
        self.observed = true;
    }

    pub fn format(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("value".to_string(), self.value)])
    }
}

/// Non-zero observations over all observations
#[derive(Debug, Clone, Default)]
pub struct RateSink {
    pub trues: u64,
    pub total: u64,
}

impl RateSink {
    pub fn add(&mut self, value: f64) {
        self.total += 1;
        if value != 0.0 {
            self.trues += 1;
        }
    }

    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.trues as f64 / self.total as f64
        }
    }

    pub fn format(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("rate".to_string(), self.rate())])
    }
}

/// Running summary plus a bounded window of recent values
#[derive(Debug, Clone)]
pub struct TrendSink {
    values: VecDeque<f64>,
    max_values: usize,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    stats: Arc<[TrendStat]>,
}

impl Default for TrendSink {
    fn default() -> Self {
        TrendSink::new(TrendStat::defaults())
    }
}

impl TrendSink {
    pub fn new(stats: Arc<[TrendStat]>) -> Self {
        TrendSink::with_window(stats, DEFAULT_TREND_WINDOW)
    }

    pub fn with_window(stats: Arc<[TrendStat]>, max_values: usize) -> Self {
        TrendSink {
            values: VecDeque::new(),
            max_values: max_values.max(1),
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
            stats,
        }
    }

    /// Build a sink from a series of observations with the default statistics
    pub fn from_values(values: &[f64]) -> Self {
        let mut sink = TrendSink::default();
        for &v in values {
            sink.add(v);
        }
        sink
    }

    pub fn add(&mut self, value: f64) {
        if self.count == 0 || value < self.min {
            self.min = value;
        }
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;

        if self.values.len() == self.max_values {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn stats(&self) -> &[TrendStat] {
        &self.stats
    }

    /// Number of values currently retained for percentile calculation
    pub fn retained(&self) -> usize {
        self.values.len()
    }

    /// One entry per configured statistic
    pub fn format(&self) -> BTreeMap<String, f64> {
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        self.stats
            .iter()
            .map(|stat| {
                let value = match stat {
                    TrendStat::Avg => self.avg(),
                    TrendStat::Min => self.min,
                    TrendStat::Max => self.max,
                    TrendStat::Count => self.count as f64,
                    TrendStat::Sum => self.sum,
                    TrendStat::Med => percentile(&sorted, 0.5),
                    TrendStat::Percentile(p) => percentile(&sorted, p / 100.0),
                };
                (stat.name(), value)
            })
            .collect()
    }
}

/// Linear interpolation between the closest ranks of a sorted slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let i = pct * (n - 1) as f64;
            let lower_idx = i.floor() as usize;
            let upper_idx = (i.ceil() as usize).min(n - 1);
            let lower = sorted[lower_idx];
            let upper = sorted[upper_idx];
            lower + (upper - lower) * (i - lower_idx as f64)
        }
    }
}

/// Tagged union over the sink variants
#[derive(Debug, Clone)]
pub enum Sink {
    Counter(CounterSink),
    Gauge(GaugeSink),
    Rate(RateSink),
    Trend(TrendSink),
}

impl Sink {
    /// Default sink for a kind; unknown kinds keep their last value
    pub fn for_kind(kind: MetricKind, trend_stats: Arc<[TrendStat]>) -> Sink {
        match kind {
            MetricKind::Counter => Sink::Counter(CounterSink::default()),
            MetricKind::Gauge | MetricKind::Unknown => Sink::Gauge(GaugeSink::default()),
            MetricKind::Rate => Sink::Rate(RateSink::default()),
            MetricKind::Trend => Sink::Trend(TrendSink::new(trend_stats)),
        }
    }

    pub fn add(&mut self, value: f64, time: Timestamp) {
        match self {
            Sink::Counter(s) => s.add(value, time),
            Sink::Gauge(s) => s.add(value),
            Sink::Rate(s) => s.add(value),
            Sink::Trend(s) => s.add(value),
        }
    }

    /// Render the sink as statistic name -> value
    ///
    /// `elapsed` only matters for counters, whose `rate` is per second of it.
    pub fn format(&self, elapsed: Duration) -> BTreeMap<String, f64> {
        match self {
            Sink::Counter(s) => s.format(elapsed),
            Sink::Gauge(s) => s.format(),
            Sink::Rate(s) => s.format(),
            Sink::Trend(s) => s.format(),
        }
    }

    /// Time of the first observation, tracked by counters only
    pub fn first_seen(&self) -> Option<Timestamp> {
        match self {
            Sink::Counter(s) => s.first,
            _ => None,
        }
    }
}
