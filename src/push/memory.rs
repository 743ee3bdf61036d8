//! In-memory push transport for tests and simulation
//!
//! Records every delivered series set and can:
//! - fail the next N pushes, or every push
//! - hold pushes in flight until released, to exercise shutdown

use super::{PushError, PushFuture, PushTransport};
use crate::exposition::{encode_text, family_labels, family_value, MetricFamily, SeriesKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// One delivered push
#[derive(Debug, Clone)]
pub struct PushRecord {
    pub endpoint: String,
    pub job: String,
    pub families: Vec<MetricFamily>,
    pub payload: String,
}

impl PushRecord {
    fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.get_name() == name)
    }

    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.family(name).and_then(family_value)
    }

    pub fn kind_of(&self, name: &str) -> Option<SeriesKind> {
        self.family(name)
            .and_then(|f| SeriesKind::from_metric_type(f.get_field_type()))
    }

    pub fn labels_of(&self, name: &str) -> Option<Vec<(String, String)>> {
        self.family(name).map(family_labels)
    }

    /// Pushed series names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.families.iter().map(|f| f.get_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    records: Mutex<Vec<PushRecord>>,
    attempts: AtomicUsize,
    fail_remaining: AtomicUsize,
    fail_always: AtomicBool,
    in_flight: AtomicUsize,
    /// true = pushes may proceed
    gate: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct InMemoryPushTransport {
    inner: Arc<Inner>,
}

impl Default for InMemoryPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPushTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        InMemoryPushTransport {
            inner: Arc::new(Inner {
                records: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                fail_remaining: AtomicUsize::new(0),
                fail_always: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                gate,
            }),
        }
    }

    /// Fail the next `n` push attempts
    pub fn fail_next(&self, n: usize) {
        self.inner.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self, fail: bool) {
        self.inner.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Block subsequent pushes until `release` is called
    pub fn hold(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Pushes currently waiting or executing
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Push attempts, successful or not
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered pushes, oldest first
    pub fn records(&self) -> Vec<PushRecord> {
        self.inner.records.lock().clone()
    }

    pub fn last(&self) -> Option<PushRecord> {
        self.inner.records.lock().last().cloned()
    }

    fn should_fail(&self) -> bool {
        if self.inner.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.inner
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl PushTransport for InMemoryPushTransport {
    fn push<'a>(
        &'a self,
        endpoint: &'a str,
        job: &'a str,
        families: &'a [MetricFamily],
    ) -> PushFuture<'a> {
        Box::pin(async move {
            self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            self.inner.attempts.fetch_add(1, Ordering::SeqCst);

            let mut gate = self.inner.gate.subscribe();
            // The sender lives in `inner`, so the channel cannot close here
            let _ = gate.wait_for(|open| *open).await;

            let result = if self.should_fail() {
                Err(PushError::Injected(format!("push to {} refused", endpoint)))
            } else {
                encode_text(families)
                    .map(|payload| {
                        self.inner.records.lock().push(PushRecord {
                            endpoint: endpoint.to_string(),
                            job: job.to_string(),
                            families: families.to_vec(),
                            payload,
                        });
                    })
                    .map_err(PushError::from)
            };

            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::{OutputSeries, SeriesRegistry};
    use crate::metrics::LabelSet;
    use std::time::Duration;

    fn families() -> Vec<MetricFamily> {
        let mut registry = SeriesRegistry::new();
        registry
            .register(OutputSeries::snapshot(
                "vus".to_string(),
                SeriesKind::Gauge,
                Arc::new(LabelSet::empty()),
                3.0,
            ))
            .unwrap();
        registry.gather()
    }

    #[tokio::test]
    async fn test_records_pushes() {
        let transport = InMemoryPushTransport::new();
        transport
            .push("http://gw:9091", "job", &families())
            .await
            .unwrap();

        let record = transport.last().unwrap();
        assert_eq!(record.job, "job");
        assert_eq!(record.value_of("vus"), Some(3.0));
        assert_eq!(record.kind_of("vus"), Some(SeriesKind::Gauge));
        assert_eq!(record.labels_of("vus"), Some(vec![]));
        assert_eq!(record.names(), vec!["vus"]);
        assert_eq!(record.payload, "# HELP vus k6 gauge vus\n# TYPE vus gauge\nvus 3\n");
    }

    #[tokio::test]
    async fn test_fail_next() {
        let transport = InMemoryPushTransport::new();
        transport.fail_next(1);

        let fams = families();
        assert!(transport.push("http://gw", "job", &fams).await.is_err());
        assert!(transport.push("http://gw", "job", &fams).await.is_ok());
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.records().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_always_until_cleared() {
        let transport = InMemoryPushTransport::new();
        transport.fail_always(true);

        let fams = families();
        for _ in 0..3 {
            assert!(matches!(
                transport.push("http://gw", "job", &fams).await,
                Err(PushError::Injected(_))
            ));
        }
        transport.fail_always(false);
        assert!(transport.push("http://gw", "job", &fams).await.is_ok());
        assert_eq!(transport.attempts(), 4);
        assert_eq!(transport.records().len(), 1);
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let transport = InMemoryPushTransport::new();
        transport.hold();

        let pushing = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.push("http://gw", "job", &families()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.in_flight(), 1);
        assert!(!pushing.is_finished());

        transport.release();
        pushing.await.unwrap().unwrap();
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.records().len(), 1);
    }
}
