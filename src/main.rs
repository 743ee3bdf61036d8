//! Demo host for the pushgateway output
//!
//! Simulates a handful of virtual users issuing fake requests and pushes
//! the resulting metrics to the configured gateway.
//!
//! Environment, in addition to the output's own settings:
//! - `K6_DEMO_VUS`: number of simulated virtual users (default: 5)
//! - `K6_DEMO_DURATION`: stop after this long, e.g. `30s` (default: run
//!   until Ctrl+C)

use pushgateway_output::config::parse_duration;
use pushgateway_output::observability::init_logging;
use pushgateway_output::{Metric, MetricKind, MetricRegistry, PushConfig, PushOutput, SystemClock};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const DEFAULT_VUS: usize = 5;

struct VuMetrics {
    http_reqs: Arc<Metric>,
    http_req_duration: Arc<Metric>,
    http_req_failed: Arc<Metric>,
    data_received: Arc<Metric>,
}

impl VuMetrics {
    fn register(registry: &MetricRegistry) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(VuMetrics {
            http_reqs: registry.new_metric("http_reqs", MetricKind::Counter)?,
            http_req_duration: registry.new_metric("http_req_duration", MetricKind::Trend)?,
            http_req_failed: registry.new_metric("http_req_failed", MetricKind::Rate)?,
            data_received: registry.new_metric("data_received", MetricKind::Counter)?,
        })
    }
}

async fn virtual_user(
    id: usize,
    metrics: Arc<VuMetrics>,
    registry: Arc<MetricRegistry>,
    output: Arc<PushOutput>,
    cancel: CancellationToken,
) {
    let mut requests = 0u64;
    loop {
        let (latency_ms, failed, bytes) = {
            let mut rng = rand::thread_rng();
            let latency: f64 = rng.gen_range(20.0..400.0);
            (latency, rng.gen_bool(0.05), rng.gen_range(512..8192) as f64)
        };

        output.add_samples([
            registry.observe(&metrics.http_reqs, 1.0),
            registry.observe(&metrics.http_req_duration, latency_ms),
            registry.observe(&metrics.http_req_failed, if failed { 1.0 } else { 0.0 }),
            registry.observe(&metrics.data_received, bytes),
        ]);
        requests += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(latency_ms as u64)) => {}
        }
    }
    info!(vu = id, requests, "Virtual user finished");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = PushConfig::from_env()?;
    let run_for = match std::env::var("K6_DEMO_DURATION") {
        Ok(v) => Some(parse_duration(&v).map_err(|e| format!("K6_DEMO_DURATION: {}", e))?),
        Err(_) => None,
    };
    let vus = std::env::var("K6_DEMO_VUS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_VUS);

    let registry = Arc::new(MetricRegistry::new(
        SystemClock::shared(),
        config.parsed_trend_stats()?,
    ));
    let output = Arc::new(PushOutput::new(config)?);

    println!("Pushgateway demo agent");
    println!("======================");
    println!("  Output:        {}", output.description());
    println!("  Virtual users: {}", vus);
    match run_for {
        Some(d) => println!("  Duration:      {:?}", d),
        None => println!("  Duration:      until Ctrl+C"),
    }
    println!();

    let metrics = Arc::new(VuMetrics::register(&registry)?);
    let vus_metric = registry.new_metric("vus", MetricKind::Gauge)?;
    output.buffer().append(registry.observe(&vus_metric, vus as f64));

    output.start()?;

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    for id in 0..vus {
        tracker.spawn(virtual_user(
            id,
            metrics.clone(),
            registry.clone(),
            output.clone(),
            cancel.clone(),
        ));
    }
    tracker.close();

    match run_for {
        Some(d) => {
            tokio::select! {
                _ = tokio::time::sleep(d) => info!("Demo duration elapsed"),
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Unable to listen for Ctrl+C, stopping");
            } else {
                info!("Shutdown signal received");
            }
        }
    }

    cancel.cancel();
    tracker.wait().await;
    output.buffer().append(registry.observe(&vus_metric, 0.0));
    output.stop().await;

    let stats = output.stats();
    println!();
    println!("Flush statistics");
    println!("================");
    println!("Cycles:            {}", stats.cycles_completed);
    println!("Samples drained:   {}", stats.samples_drained);
    println!("Pushes succeeded:  {}", stats.pushes_succeeded);
    println!("Pushes failed:     {}", stats.pushes_failed);
    println!("Last series count: {}", stats.last_series_count);

    Ok(())
}
