//! Records externally supplied vsync timestamps into a named recorder.
//!
//! Grounded on `ion/profile/vsyncprofiler.h`/`.cc`, which is this small
//! almost verbatim: reject non-monotonic input, otherwise emit a timestamp
//! event named after the vsync number.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::errors::log_once;
use crate::recorder::Recorder;

/// Feeds vsync timestamps into the [`crate::manager::NamedSlot::VSync`] recorder.
pub struct VSyncProfiler {
    recorder: Arc<Recorder>,
    last_ts: AtomicU32,
}

impl VSyncProfiler {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder, last_ts: AtomicU32::new(0) }
    }

    /// Records a vsync at `ts` microseconds, numbered `vsync_number`.
    /// Rejects (logs once, no-op) any `ts` earlier than the last accepted one.
    pub fn record(&self, ts: u32, vsync_number: u64) {
        let last = self.last_ts.load(Ordering::Relaxed);
        if ts < last {
            log_once!(warn, "tracewtf: vsync timestamp {} is earlier than last accepted {}", ts, last);
            return;
        }
        self.last_ts.store(ts, Ordering::Relaxed);
        self.recorder.create_time_stamp_at(ts, &format!("VSync{}", vsync_number), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::stringtable::StringTable;

    fn make_recorder() -> Arc<Recorder> {
        Arc::new(Recorder::new(1, "VSync", 4096, StringTable::new(), StringTable::new(), Arc::new(Clock::new())))
    }

    #[test]
    fn monotonic_vsyncs_are_all_recorded() {
        let recorder = make_recorder();
        let profiler = VSyncProfiler::new(Arc::clone(&recorder));
        profiler.record(100, 0);
        profiler.record(200, 1);
        assert_eq!(recorder.event_count(), 2);
    }

    #[test]
    fn non_monotonic_vsync_is_rejected() {
        let recorder = make_recorder();
        let profiler = VSyncProfiler::new(Arc::clone(&recorder));
        profiler.record(200, 0);
        profiler.record(100, 1);
        assert_eq!(recorder.event_count(), 1);
    }
}
