//! Per-kind converters
//!
//! Counter, Gauge and Rate register deferred accessors; Trend bakes its
//! statistics into snapshots because they already summarise a finished
//! window.

use super::{ConversionContext, ConvertError};
use crate::exposition::{series_name, OutputSeries, SeriesKind};
use crate::metrics::{Sample, Sink};
use std::time::Duration;

/// Series-name suffix for a trend statistic: `p(90)` -> `p90`, `p(99.9)` -> `p99_9`
pub(super) fn stat_suffix(stat: &str) -> String {
    stat.chars()
        .filter(|c| *c != '(' && *c != ')')
        .map(|c| if c == '.' { '_' } else { c })
        .collect()
}

/// One counter whose value is the sink's `count`, evaluated at read time
/// over the time elapsed since the sink's first observation
pub(super) fn convert_counter(
    sample: &Sample,
    ctx: &ConversionContext,
) -> Result<Vec<OutputSeries>, ConvertError> {
    if !matches!(*sample.metric.sink().read(), Sink::Counter(_)) {
        return Err(ConvertError::SinkMismatch {
            metric: sample.name().to_string(),
            expected: "counter",
        });
    }
    let name = series_name(&ctx.prefix, sample.name(), None);

    let metric = sample.metric.clone();
    let clock = ctx.clock.clone();
    let fallback_first = sample.time;
    let series = OutputSeries::deferred(name, SeriesKind::Counter, ctx.labels.clone(), move || {
        let sink = metric.sink().read();
        let first = sink.first_seen().unwrap_or(fallback_first);
        let elapsed = clock.now().saturating_sub(first);
        sink.format(elapsed).get("count").copied().unwrap_or(0.0)
    });
    Ok(vec![series])
}

/// One gauge relaying the sample's instantaneous value
pub(super) fn convert_gauge(
    sample: &Sample,
    ctx: &ConversionContext,
) -> Result<Vec<OutputSeries>, ConvertError> {
    let name = series_name(&ctx.prefix, sample.name(), None);
    let value = sample.value;
    Ok(vec![OutputSeries::deferred(
        name,
        SeriesKind::Gauge,
        ctx.labels.clone(),
        move || value,
    )])
}

/// One gauge relaying the ratio the host already computed into the sample
pub(super) fn convert_rate(
    sample: &Sample,
    ctx: &ConversionContext,
) -> Result<Vec<OutputSeries>, ConvertError> {
    let name = series_name(&ctx.prefix, sample.name(), None);
    let ratio = sample.value;
    Ok(vec![OutputSeries::deferred(
        name,
        SeriesKind::Gauge,
        ctx.labels.clone(),
        move || ratio,
    )])
}

/// One gauge snapshot per statistic the sink reports
pub(super) fn convert_trend(
    sample: &Sample,
    ctx: &ConversionContext,
) -> Result<Vec<OutputSeries>, ConvertError> {
    let summary = {
        let sink = sample.metric.sink().read();
        if !matches!(*sink, Sink::Trend(_)) {
            return Err(ConvertError::SinkMismatch {
                metric: sample.name().to_string(),
                expected: "trend",
            });
        }
        sink.format(Duration::ZERO)
    };

    // Names are checked per series at registration, so one bad statistic
    // does not cost the others
    Ok(summary
        .into_iter()
        .map(|(stat, value)| {
            let name = series_name(&ctx.prefix, sample.name(), Some(&stat_suffix(&stat)));
            OutputSeries::snapshot(name, SeriesKind::Gauge, ctx.labels.clone(), value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::clock::{Clock, ManualClock, Timestamp};
    use crate::convert::{resolve, ConversionContext, ConvertError, Converter};
    use crate::exposition::{SeriesKind, SeriesRegistry};
    use crate::metrics::{
        CounterSink, LabelSet, Metric, MetricKind, RateSink, Sample, Sink, TrendSink, TrendStat,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(clock: &ManualClock) -> ConversionContext {
        ConversionContext::new(LabelSet::empty(), "", clock.shared())
    }

    #[test]
    fn test_counter_delegates_to_sink() {
        let t0 = Timestamp(946_684_800_000);
        let t1 = t0 + Duration::from_secs(1);
        let clock = ManualClock::new(t1.as_millis());

        let sink = CounterSink {
            value: 100.0,
            first: Some(t0),
        };
        let metric = Arc::new(Metric::with_sink(
            "sample_metric",
            MetricKind::Counter,
            Sink::Counter(sink),
        ));
        let sample = Sample::new(metric.clone(), 100.0, t1);

        let series = Converter::Counter.convert(&sample, &ctx(&clock)).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name(), "sample_metric");
        assert_eq!(series[0].kind(), SeriesKind::Counter);
        assert!(series[0].is_deferred());

        let expected = metric.sink().read().format(t1.saturating_sub(t0))["count"];
        assert_eq!(series[0].value(), expected);
        assert_eq!(series[0].value(), 100.0);
    }

    #[test]
    fn test_counter_reads_fresh_total_at_gather_time() {
        let clock = ManualClock::new(1_000);
        let metric = Arc::new(Metric::new("iterations", MetricKind::Counter));
        metric.sink().write().add(10.0, Timestamp(1_000));
        let sample = Sample::new(metric.clone(), 10.0, Timestamp(1_000));

        let series = Converter::Counter.convert(&sample, &ctx(&clock)).unwrap();

        // Host keeps accumulating after conversion
        clock.advance(Duration::from_secs(3));
        metric.sink().write().add(5.0, clock.now());

        assert_eq!(series[0].value(), 15.0);
    }

    #[test]
    fn test_counter_requires_counter_sink() {
        let clock = ManualClock::new(0);
        let metric = Arc::new(Metric::with_sink(
            "http_reqs",
            MetricKind::Counter,
            Sink::Rate(RateSink::default()),
        ));
        let sample = Sample::new(metric, 1.0, Timestamp(0));

        let err = Converter::Counter.convert(&sample, &ctx(&clock)).unwrap_err();
        assert!(matches!(err, ConvertError::SinkMismatch { expected: "counter", .. }));
    }

    #[test]
    fn test_gauge_relays_sample_value() {
        let clock = ManualClock::new(0);
        let metric = Arc::new(Metric::new("sample_metric", MetricKind::Gauge));
        metric.sink().write().add(100.0, Timestamp(0));
        let sample = Sample::new(metric, 100.0, Timestamp(0));

        let series = Converter::Gauge.convert(&sample, &ctx(&clock)).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name(), "sample_metric");
        assert_eq!(series[0].kind(), SeriesKind::Gauge);
        assert!(series[0].is_deferred());
        assert_eq!(series[0].value(), 100.0);
    }

    #[test]
    fn test_rate_relays_precomputed_ratio() {
        let clock = ManualClock::new(0);
        let sink = RateSink {
            trues: 50,
            total: 100,
        };
        let ratio = sink.trues as f64 / sink.total as f64;
        let metric = Arc::new(Metric::with_sink(
            "sample_metric",
            MetricKind::Rate,
            Sink::Rate(sink),
        ));
        let sample = Sample::new(metric, ratio, Timestamp(0));

        let series = Converter::Rate.convert(&sample, &ctx(&clock)).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].kind(), SeriesKind::Gauge);
        assert_eq!(series[0].value(), 0.5);
    }

    #[test]
    fn test_trend_expands_one_snapshot_per_stat() {
        let clock = ManualClock::new(0);
        let sink = TrendSink::from_values(&[50.0, 10.0, 90.0]);
        assert_eq!(sink.sum, 150.0);
        let metric = Arc::new(Metric::with_sink(
            "sample_metric",
            MetricKind::Trend,
            Sink::Trend(sink),
        ));
        let sample = Sample::new(metric.clone(), 3.0, Timestamp(0));

        let series = Converter::Trend.convert(&sample, &ctx(&clock)).unwrap();

        assert_eq!(series.len(), 6);
        for s in &series {
            assert_eq!(s.kind(), SeriesKind::Gauge);
            assert!(s.name().starts_with("sample_metric_"), "{}", s.name());
            assert!(!s.name().contains('(') && !s.name().contains(')'));
            assert!(!s.is_deferred());
        }
        let before: Vec<f64> = series.iter().map(|s| s.value()).collect();

        // Snapshots do not follow later sink updates
        metric.sink().write().add(1_000.0, Timestamp(1));
        let after: Vec<f64> = series.iter().map(|s| s.value()).collect();
        assert_eq!(before, after);

        let names: Vec<&str> = series.iter().map(|s| s.name()).collect();
        assert!(names.contains(&"sample_metric_p90"));
        assert!(names.contains(&"sample_metric_p95"));
        assert!(names.contains(&"sample_metric_min"));

        // All six register cleanly together
        let mut registry = SeriesRegistry::new();
        for s in series {
            registry.register(s).unwrap();
        }
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_trend_applies_prefix_and_labels() {
        let clock = ManualClock::new(0);
        let ctx = ConversionContext::new(
            LabelSet::from_pairs(&[("env", "prod")]),
            "k6",
            clock.shared(),
        );
        let metric = Arc::new(Metric::with_sink(
            "http_req_duration",
            MetricKind::Trend,
            Sink::Trend(TrendSink::from_values(&[1.0])),
        ));
        let sample = Sample::new(metric, 1.0, Timestamp(0));

        let series = Converter::Trend.convert(&sample, &ctx).unwrap();
        assert!(series
            .iter()
            .all(|s| s.name().starts_with("k6_http_req_duration_")));
        assert!(series
            .iter()
            .all(|s| s.labels().get("env").map(String::as_str) == Some("prod")));
    }

    #[test]
    fn test_stat_suffix() {
        assert_eq!(super::stat_suffix("avg"), "avg");
        assert_eq!(super::stat_suffix("p(90)"), "p90");
        assert_eq!(super::stat_suffix("p(99.9)"), "p99_9");
    }

    #[test]
    fn test_trend_fractional_percentile_registers() {
        let clock = ManualClock::new(0);
        let stats: Arc<[TrendStat]> = ["avg", "min", "max", "p(99.9)"]
            .iter()
            .map(|s| TrendStat::parse(s).unwrap())
            .collect();
        let metric = Arc::new(Metric::with_sink(
            "http_req_duration",
            MetricKind::Trend,
            Sink::Trend(TrendSink::new(stats)),
        ));
        metric.sink().write().add(12.0, Timestamp(0));
        let sample = Sample::new(metric, 12.0, Timestamp(0));

        let series = Converter::Trend.convert(&sample, &ctx(&clock)).unwrap();
        let mut registry = SeriesRegistry::new();
        for s in series {
            registry.register(s).unwrap();
        }

        let mut names: Vec<&str> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "http_req_duration_avg",
                "http_req_duration_max",
                "http_req_duration_min",
                "http_req_duration_p99_9",
            ]
        );
    }

    #[test]
    fn test_invalid_series_name_refused_at_registration() {
        let clock = ManualClock::new(0);
        let metric = Arc::new(Metric::new("http.reqs", MetricKind::Gauge));
        let sample = Sample::new(metric, 1.0, Timestamp(0));

        let converter = resolve(sample.kind()).unwrap();
        let series = converter.convert(&sample, &ctx(&clock)).unwrap();
        assert_eq!(series[0].name(), "http.reqs");

        let mut registry = SeriesRegistry::new();
        assert!(registry.register(series[0].clone()).is_err());
        assert!(registry.is_empty());
    }
}
