//! Error types for string tables, snapshotting and the GPU adapter.
//!
//! The core never propagates usage mistakes as `Result` on the hot path: a
//! bad call is logged once and treated as a no-op. These types exist for
//! the handful of operations that *can* meaningfully fail (construction,
//! snapshotting, GPU device sync).

/// Errors that can occur during [`crate::manager::TraceManager::write_file`].
#[derive(thiserror::Error, Debug)]
pub enum RecorderError {
    #[error("failed to open trace file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize the WTF file header: {0}")]
    HeaderEncoding(#[from] serde_json::Error),
}

/// Errors that can occur while looking up a string by index.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum StringTableError {
    #[error("string index {index} is out of range (table has {size} entries)")]
    OutOfRange { index: u32, size: usize },
}

/// Errors that can occur during [`crate::manager::TraceManagerSettings::validate`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("TraceManagerSettings::default_buffer_bytes must be at least 4 (one word).")]
    BufferTooSmall,
}

/// Errors that can occur while syncing or polling the GPU profiler adapter.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GpuProfilerError {
    #[error("the device does not advertise GPU timer query support")]
    Unsupported,

    #[error("failed to sync the GPU timebase: disjoint GPU events on every retry")]
    TimebaseSyncFailed,
}

/// Logs a message through the `log` crate at most once per call site.
///
/// Usage errors must be logged once and then treated as a no-op; repeating
/// the same warning on every frame would flood the log for what is, after
/// the first occurrence, already a known and ignored mistake.
macro_rules! log_once {
    ($level:ident, $($arg:tt)+) => {{
        static LOGGED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
        if !LOGGED.swap(true, std::sync::atomic::Ordering::Relaxed) {
            log::$level!($($arg)+);
        }
    }};
}

pub(crate) use log_once;
