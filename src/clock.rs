//! Monotonic clock used to timestamp every recorded event.

use std::time::Instant;

/// Wraps a process-start reference instant.
///
/// Monotonic within a single process; not comparable across processes or
/// meaningful as a wall-clock time.
#[derive(Debug)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Microseconds elapsed since construction, truncated to 32 bits.
    ///
    /// Wraps after about 71 minutes. This is not an error condition: WTF
    /// consumers only rely on relative ordering within the range they see.
    #[inline]
    pub fn now_us(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }

    /// Nanoseconds elapsed since construction.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
