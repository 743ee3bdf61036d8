//! Periodic flush timer
//!
//! One tokio task drives an interval and invokes the callback on every tick.
//! The callback must return quickly; long work belongs on its own task.

use super::OutputError;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct PeriodicFlusher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicFlusher {
    /// Start ticking. The first tick fires one full period after start;
    /// ticks missed while the runtime was busy are skipped, not replayed.
    pub fn start<F>(period: Duration, callback: F) -> Result<Self, OutputError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(OutputError::InvalidPeriod);
        }
        let runtime = Handle::try_current().map_err(|_| OutputError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => callback(),
                }
            }
            debug!("Periodic flusher stopped");
        });

        debug!(period_ms = period.as_millis() as u64, "Periodic flusher started");
        Ok(PeriodicFlusher { cancel, handle })
    }

    /// Cancel the timer and wait for its task. No tick begins after this
    /// returns; work a tick already spawned is not awaited here.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Periodic flusher task ended abnormally");
        }
    }
}

impl Drop for PeriodicFlusher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        (ticks, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (ticks, callback) = counting();
        let flusher = PeriodicFlusher::start(Duration::from_secs(10), callback).unwrap();

        tokio::time::sleep(Duration::from_millis(9_999)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        flusher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let (ticks, callback) = counting();
        let flusher = PeriodicFlusher::start(Duration::from_secs(1), callback).unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        flusher.stop().await;
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let err = PeriodicFlusher::start(Duration::ZERO, || {}).unwrap_err();
        assert!(matches!(err, OutputError::InvalidPeriod));
    }

    #[test]
    fn test_requires_runtime() {
        let err = PeriodicFlusher::start(Duration::from_secs(1), || {}).unwrap_err();
        assert!(matches!(err, OutputError::NoRuntime));
    }
}
