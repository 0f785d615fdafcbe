//! Timeline metrics: the extension point the trace manager dispatches to.
//!
//! Grounded on `ion/profile/timelinemetric.h` (`TimelineMetric::Run`); the
//! statistics engine itself (`ion/analytics/benchmark.h`) is out of scope
//! here — `Benchmark` is kept to exactly the shape `TraceManager` needs to
//! collect named samples, not a full analytics library.

use std::collections::BTreeMap;

use crate::timeline::Timeline;

/// A named collection of numeric samples produced by one or more metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Benchmark {
    samples: BTreeMap<String, Vec<f64>>,
}

impl Benchmark {
    pub fn record(&mut self, name: impl Into<String>, value: f64) {
        self.samples.entry(name.into()).or_default().push(value);
    }

    pub fn samples(&self, name: &str) -> &[f64] {
        self.samples.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        let values = self.samples(name);
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// A named computation over a reconstructed [`Timeline`].
///
/// Implementations inspect `timeline` (typically via
/// [`crate::timeline::TimelineSearch`]) and record whatever samples they
/// compute into `benchmark`.
pub trait TimelineMetric: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, timeline: &Timeline, benchmark: &mut Benchmark);
}
