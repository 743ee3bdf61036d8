//! Sample buffer shared by the producer and the flush loop
//!
//! ```text
//! producer ──append──► [ Vec<Sample> ] ──drain_all──► flush cycle
//! ```
//!
//! `drain_all` swaps the backing vector out under the same lock producers
//! append under, so every sample lands in exactly one flush window.
//! There is no capacity limit and appends never fail, whatever the push
//! outcome of the previous cycle was.

use crate::metrics::types::Sample;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Mutex<Vec<Sample>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        SampleBuffer::default()
    }

    pub fn append(&self, sample: Sample) {
        self.samples.lock().push(sample);
    }

    pub fn append_all(&self, samples: impl IntoIterator<Item = Sample>) {
        let mut guard = self.samples.lock();
        guard.extend(samples);
    }

    /// Take every sample buffered since the previous drain
    pub fn drain_all(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.samples.lock())
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}
