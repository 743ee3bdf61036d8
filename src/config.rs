//! Output Configuration
//!
//! Resolved once when the output is constructed. Sources, applied in order:
//!
//! 1. Defaults
//! 2. Label dictionary from the script options (`ext.pushgateway`, JSON)
//! 3. Environment variables:
//!    - `K6_PUSHGATEWAY_URL`: gateway endpoint (default: http://localhost:9091)
//!    - `K6_PUSH_INTERVAL`: flush interval, Go duration syntax (default: 10s)
//!    - `K6_JOB_NAME`: job grouping key (default: k6_load_testing)
//!    - `K6_LABEL_<KEY>`: constant label `<key>` (key and value lower-cased)
//!    - `K6_PUSHGATEWAY_NAMESPACE`: prefix for every series name
//!    - `K6_SUMMARY_TREND_STATS`: trend statistics, e.g. `avg,p(99)`
//!    - `K6_PUSHGATEWAY_LOG_DROPPED`: log samples of unknown kind when dropped
//!    - `K6_PUSHGATEWAY_FLUSH_ON_STOP`: run one last flush when stopping
//!
//! The same fields can also be read from a TOML file.

use crate::metrics::{LabelSet, TrendStat};
use crate::push::HttpPushTransport;
use prometheus::{Gauge, Opts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PUSH_GATEWAY_URL: &str = "http://localhost:9091";
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_JOB_NAME: &str = "k6_load_testing";

/// Env var holding the JSON label dictionary when read by `from_env`
pub const LABELS_JSON_VAR: &str = "K6_PUSHGATEWAY_LABELS";

const LABEL_VAR_PREFIX: &str = "K6_LABEL_";

/// Error type for configuration resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Duration string could not be parsed
    InvalidDuration {
        var: String,
        value: String,
        reason: String,
    },
    /// Push interval must be positive
    ZeroInterval,
    /// Label dictionary is not a JSON object of strings
    InvalidLabelsJson(String),
    /// Label name violates the exposition naming rules
    InvalidLabelName(String),
    /// Endpoint is not an http(s) URL
    InvalidEndpoint(String),
    /// Job name is empty
    EmptyJobName,
    /// Namespace is not a valid series name prefix
    InvalidNamespace(String),
    /// Trend statistic name is not recognised
    InvalidTrendStat(String),
    /// Boolean flag has an unrecognised value
    InvalidBool { var: String, value: String },
    /// TOML file could not be parsed
    Toml(String),
    /// Config file could not be read
    Io(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidDuration { var, value, reason } => {
                write!(f, "error parsing '{}' value {:?}: {}", var, value, reason)
            }
            ConfigError::ZeroInterval => write!(f, "push interval must be greater than zero"),
            ConfigError::InvalidLabelsJson(msg) => write!(
                f,
                "unable to get labels for JSON options.ext.pushgateway dictionary: {}",
                msg
            ),
            ConfigError::InvalidLabelName(name) => write!(f, "invalid label name: {:?}", name),
            ConfigError::InvalidEndpoint(msg) => write!(f, "invalid pushgateway URL: {}", msg),
            ConfigError::EmptyJobName => write!(f, "job name must not be empty"),
            ConfigError::InvalidNamespace(ns) => write!(f, "invalid namespace: {:?}", ns),
            ConfigError::InvalidTrendStat(stat) => write!(f, "invalid trend stat: {:?}", stat),
            ConfigError::InvalidBool { var, value } => {
                write!(f, "error parsing '{}': {:?} is not a boolean", var, value)
            }
            ConfigError::Toml(msg) => write!(f, "invalid config file: {}", msg),
            ConfigError::Io(msg) => write!(f, "unable to read config file: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Pushgateway endpoint
    pub push_gateway_url: String,
    /// Time between flush cycles
    #[serde(with = "duration_str")]
    pub push_interval: Duration,
    /// Job name the series are grouped under
    pub job_name: String,
    /// Constant labels attached to every series
    pub labels: BTreeMap<String, String>,
    /// Prefix for every series name (empty = none)
    pub namespace: String,
    /// Statistics reported for trend metrics
    pub trend_stats: Vec<String>,
    /// Log each sample dropped for having an unknown kind
    pub log_dropped_samples: bool,
    /// Run one final flush cycle when the output stops
    pub flush_on_stop: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            push_gateway_url: DEFAULT_PUSH_GATEWAY_URL.to_string(),
            push_interval: DEFAULT_PUSH_INTERVAL,
            job_name: DEFAULT_JOB_NAME.to_string(),
            labels: BTreeMap::new(),
            namespace: String::new(),
            trend_stats: TrendStat::defaults().iter().map(|s| s.name()).collect(),
            log_dropped_samples: false,
            flush_on_stop: false,
        }
    }
}

impl PushConfig {
    /// Resolve from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let labels_json = std::env::var(LABELS_JSON_VAR).ok();
        Self::from_sources(labels_json.as_deref(), std::env::vars())
    }

    /// Resolve from a label dictionary and a set of environment variables
    ///
    /// Environment labels override dictionary labels with the same key.
    pub fn from_sources<I>(labels_json: Option<&str>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cfg = PushConfig::default();

        if let Some(json) = labels_json {
            cfg.labels = serde_json::from_str(json)
                .map_err(|e| ConfigError::InvalidLabelsJson(e.to_string()))?;
            debug!(labels = ?cfg.labels, "Pushgateway labels from JSON options.ext.pushgateway dictionary");
        }

        for (key, value) in vars {
            match key.as_str() {
                "K6_PUSH_INTERVAL" => {
                    cfg.push_interval =
                        parse_duration(&value).map_err(|reason| ConfigError::InvalidDuration {
                            var: key.clone(),
                            value: value.clone(),
                            reason,
                        })?;
                }
                "K6_PUSHGATEWAY_URL" => cfg.push_gateway_url = value,
                "K6_JOB_NAME" => cfg.job_name = value,
                "K6_PUSHGATEWAY_NAMESPACE" => cfg.namespace = value,
                "K6_SUMMARY_TREND_STATS" => {
                    cfg.trend_stats = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                "K6_PUSHGATEWAY_LOG_DROPPED" => {
                    cfg.log_dropped_samples = parse_bool(&key, &value)?;
                }
                "K6_PUSHGATEWAY_FLUSH_ON_STOP" => {
                    cfg.flush_on_stop = parse_bool(&key, &value)?;
                }
                _ => {
                    if let Some(label) = key.strip_prefix(LABEL_VAR_PREFIX) {
                        cfg.labels.insert(label.to_lowercase(), value.to_lowercase());
                    }
                }
            }
        }

        debug!(labels = ?cfg.labels, "Pushgateway labels");
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: PushConfig = toml::from_str(s).map_err(|e| ConfigError::Toml(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.job_name.is_empty() {
            return Err(ConfigError::EmptyJobName);
        }
        HttpPushTransport::push_url(&self.push_gateway_url, &self.job_name)
            .map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))?;
        if let Some(name) = self.labels.keys().find(|k| !accepts_label(k)) {
            return Err(ConfigError::InvalidLabelName(name.clone()));
        }
        if !self.namespace.is_empty() && !accepts_namespace(&self.namespace) {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }
        self.parsed_trend_stats()?;
        Ok(())
    }

    pub fn label_set(&self) -> LabelSet {
        LabelSet::new(self.labels.clone())
    }

    pub fn parsed_trend_stats(&self) -> Result<Arc<[TrendStat]>, ConfigError> {
        if self.trend_stats.is_empty() {
            return Err(ConfigError::InvalidTrendStat(String::new()));
        }
        self.trend_stats
            .iter()
            .map(|s| TrendStat::parse(s).ok_or_else(|| ConfigError::InvalidTrendStat(s.clone())))
            .collect::<Result<Vec<_>, _>>()
            .map(Arc::from)
    }
}

// Names are checked by building a throwaway gauge, so the rules are
// exactly the ones the per-cycle registry applies
fn accepts_label(name: &str) -> bool {
    Gauge::with_opts(Opts::new("up", "label check").const_label(name, "")).is_ok()
}

fn accepts_namespace(namespace: &str) -> bool {
    Gauge::with_opts(Opts::new("up", "namespace check").namespace(namespace)).is_ok()
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse a Go-style duration: `300ms`, `1.5h`, `2h45m`, `0`
///
/// Units: ns, us (µs), ms, s, m, h. Negative durations are refused.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s.starts_with('-') {
        return Err("negative durations are not allowed".to_string());
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_end);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration {:?}", s))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {:?}", s)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, s)),
        };

        total_nanos += value * scale;
        rest = next;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(format!("duration {:?} out of range", s));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Render a duration in the syntax `parse_duration` accepts
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else if d.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}ns", d.as_nanos())
    }
}

/// Serde adapter for durations written as `"10s"`
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
