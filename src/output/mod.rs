//! Pushgateway output
//!
//! The host appends samples to the output's buffer. Every push interval the
//! timer drains the buffer and hands the samples to a new cycle task, which
//! converts them and pushes the result. The timer does not wait for the
//! cycle, so a slow gateway delays only its own cycle.
//!
//! ```text
//! host ──append──▶ SampleBuffer
//!                      │ drain (timer tick)
//!                      ▼
//!                  cycle task ──▶ convert ──▶ SeriesRegistry ──▶ PushTransport
//! ```

mod cycle;
mod flusher;
mod stats;

pub use cycle::dedup;
pub use flusher::PeriodicFlusher;
pub use stats::{FlushStats, FlushStatsSnapshot};

use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigError, PushConfig};
use crate::convert::ConversionContext;
use crate::metrics::{Sample, SampleBuffer};
use crate::push::{HttpPushTransport, PushError, PushTransport};
use cycle::CycleRunner;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Error type for output construction and lifecycle
#[derive(Debug)]
pub enum OutputError {
    /// Configuration could not be resolved or is invalid
    Config(ConfigError),
    /// Transport could not be built
    Push(PushError),
    /// Flush period must be positive
    InvalidPeriod,
    /// Called outside a tokio runtime
    NoRuntime,
    /// `start` called on a running output
    AlreadyStarted,
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Config(e) => write!(f, "configuration error: {}", e),
            OutputError::Push(e) => write!(f, "push transport error: {}", e),
            OutputError::InvalidPeriod => write!(f, "flush period must be greater than zero"),
            OutputError::NoRuntime => write!(f, "no tokio runtime available"),
            OutputError::AlreadyStarted => write!(f, "output already started"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Config(e) => Some(e),
            OutputError::Push(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for OutputError {
    fn from(e: ConfigError) -> Self {
        OutputError::Config(e)
    }
}

impl From<PushError> for OutputError {
    fn from(e: PushError) -> Self {
        OutputError::Push(e)
    }
}

/// State shared by the output handle, the timer callback and cycle tasks
struct Shared {
    buffer: SampleBuffer,
    runner: Arc<CycleRunner>,
    tracker: TaskTracker,
}

impl Shared {
    /// Drain now, convert and push on a tracked task. Must run inside a
    /// tokio runtime.
    fn tick(&self) {
        let samples = self.buffer.drain_all();
        self.runner.stats.record_tick(samples.len());
        debug!(samples = samples.len(), "Flushing");

        let runner = self.runner.clone();
        self.tracker.spawn(async move { runner.run(samples).await });
    }
}

pub struct PushOutput {
    config: PushConfig,
    shared: Arc<Shared>,
    flusher: Mutex<Option<PeriodicFlusher>>,
}

impl PushOutput {
    /// Build an output pushing over HTTP, timed by the system clock
    pub fn new(config: PushConfig) -> Result<Self, OutputError> {
        config.validate()?;
        let transport = HttpPushTransport::new()?;
        Self::with_transport(config, Arc::new(transport), SystemClock::shared())
    }

    pub fn with_transport(
        config: PushConfig,
        transport: Arc<dyn PushTransport>,
        clock: SharedClock,
    ) -> Result<Self, OutputError> {
        config.validate()?;

        let runner = CycleRunner {
            ctx: ConversionContext::new(config.label_set(), config.namespace.clone(), clock),
            transport,
            endpoint: config.push_gateway_url.clone(),
            job: config.job_name.clone(),
            log_dropped: config.log_dropped_samples,
            stats: FlushStats::new(),
        };

        debug!(labels = %config.label_set(), job = %config.job_name, "Output configured");
        Ok(PushOutput {
            config,
            shared: Arc::new(Shared {
                buffer: SampleBuffer::new(),
                runner: Arc::new(runner),
                tracker: TaskTracker::new(),
            }),
            flusher: Mutex::new(None),
        })
    }

    pub fn description(&self) -> String {
        format!(
            "pushgateway: {}, job: {}, labels: {}",
            self.config.push_gateway_url,
            self.config.job_name,
            self.config.label_set()
        )
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Buffer the host appends samples to
    pub fn buffer(&self) -> &SampleBuffer {
        &self.shared.buffer
    }

    pub fn add_samples(&self, samples: impl IntoIterator<Item = Sample>) {
        self.shared.buffer.append_all(samples);
    }

    /// Start the periodic flush timer
    pub fn start(&self) -> Result<(), OutputError> {
        let mut slot = self.flusher.lock();
        if slot.is_some() {
            return Err(OutputError::AlreadyStarted);
        }

        let shared = self.shared.clone();
        let flusher = PeriodicFlusher::start(self.config.push_interval, move || shared.tick())?;
        self.shared.tracker.reopen();
        *slot = Some(flusher);

        info!(
            description = %self.description(),
            interval_ms = self.config.push_interval.as_millis() as u64,
            "Pushgateway output started"
        );
        Ok(())
    }

    /// Run one tick immediately, outside the timer
    ///
    /// Returns once the buffer is drained; the cycle itself runs on a
    /// tracked task that `stop` waits for.
    pub fn flush(&self) -> Result<(), OutputError> {
        Handle::try_current().map_err(|_| OutputError::NoRuntime)?;
        self.shared.tick();
        Ok(())
    }

    /// Stop the timer and wait for every cycle still in flight
    ///
    /// Safe to call more than once, and on an output that never started.
    pub async fn stop(&self) {
        let flusher = self.flusher.lock().take();
        let was_running = flusher.is_some();

        if let Some(flusher) = flusher {
            flusher.stop().await;
            if self.config.flush_on_stop {
                self.shared.tick();
            }
        }

        let pending = self.shared.tracker.len();
        if pending > 0 {
            debug!(pending, "Waiting for in-flight flush cycles");
        }
        self.shared.tracker.close();
        self.shared.tracker.wait().await;

        if was_running {
            info!("Pushgateway output stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.flusher.lock().is_some()
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.shared.runner.stats.snapshot()
    }
}

impl std::fmt::Debug for PushOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushOutput")
            .field("config", &self.config)
            .field("buffered", &self.shared.buffer.len())
            .field("running", &self.is_running())
            .finish()
    }
}
