//! Process-wide coordinator: recorder registry, string tables, snapshotting.
//!
//! Grounded on `ion/profile/calltracemanager.h`/`.cc`
//! (`GetTraceRecorder`, `GetNamedTraceRecorder`, `AllocateTraceRecorder`,
//! `SnapshotCallTraces`, `BuildTimeline`, `RegisterTimelineMetric`,
//! `WriteFile`). The registry is an `RwLock<Vec<Arc<Recorder>>>`: one lock
//! per shared resource, plenty of independently-lockable `Arc`s underneath,
//! the same shape wgpu-profiler uses for its query pools.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::clock::Clock;
use crate::errors::{RecorderError, SettingsError};
use crate::metrics::{Benchmark, TimelineMetric};
use crate::recorder::{next_thread_id, Recorder};
use crate::stringtable::StringTable;
use crate::timeline::{build_timeline, Timeline};
use crate::wtf;

/// A well-known, non-thread-local recorder slot.
///
/// Extensible in spirit (the manager keyed by name internally), but these
/// two are the ones the core itself feeds: [`crate::gpu`] and
/// [`crate::vsync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedSlot {
    Gpu,
    VSync,
}

impl NamedSlot {
    fn recorder_name(self) -> &'static str {
        match self {
            NamedSlot::Gpu => "GPU",
            NamedSlot::VSync => "VSync",
        }
    }
}

/// Process-wide tunables. Both are applied when a recorder is first
/// created; changing them afterwards has no effect on existing recorders.
#[derive(Debug, Clone)]
pub struct TraceManagerSettings {
    /// Gates [`crate::gpu`]'s adapter; left `false` by default since most
    /// processes have no GPU device to attach to.
    pub enable_gpu_tracing: bool,
    /// Backing size for each new recorder's ring buffer.
    pub default_buffer_bytes: usize,
    /// If true, the ring buffer's backing storage is allocated up front
    /// instead of left to the allocator's default behavior. `Vec::with_capacity`
    /// already does this unconditionally, so this flag is kept only to mirror
    /// the tunable the original system exposes — `Recorder::new` always
    /// pre-allocates regardless of its value.
    pub reserve_buffer: bool,
}

impl Default for TraceManagerSettings {
    fn default() -> Self {
        Self { enable_gpu_tracing: false, default_buffer_bytes: 1024 * 1024, reserve_buffer: true }
    }
}

impl TraceManagerSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.default_buffer_bytes < 4 {
            return Err(SettingsError::BufferTooSmall);
        }
        Ok(())
    }
}

struct NamedRecorders {
    gpu: Option<Arc<Recorder>>,
    vsync: Option<Arc<Recorder>>,
}

thread_local! {
    static CURRENT_RECORDER: std::cell::RefCell<Option<Arc<Recorder>>> = const { std::cell::RefCell::new(None) };
}

/// Owns every recorder, the shared string tables, the clock, and the
/// registered timeline metrics for one process.
pub struct TraceManager {
    settings: TraceManagerSettings,
    clock: Arc<Clock>,
    general: StringTable,
    scope_names: StringTable,
    registry: RwLock<Vec<Arc<Recorder>>>,
    named: RwLock<NamedRecorders>,
    metrics: RwLock<Vec<Box<dyn TimelineMetric>>>,
    app_name: String,
}

impl TraceManager {
    pub fn new(app_name: impl Into<String>, settings: TraceManagerSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings,
            clock: Arc::new(Clock::new()),
            general: StringTable::new(),
            scope_names: StringTable::new(),
            registry: RwLock::new(Vec::new()),
            named: RwLock::new(NamedRecorders { gpu: None, vsync: None }),
            metrics: RwLock::new(Vec::new()),
            app_name: app_name.into(),
        })
    }

    pub fn settings(&self) -> &TraceManagerSettings {
        &self.settings
    }

    fn allocate_recorder(&self, name: impl Into<String>) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::new(
            next_thread_id(),
            name,
            self.settings.default_buffer_bytes,
            self.general.clone(),
            self.scope_names.clone(),
            Arc::clone(&self.clock),
        ));
        self.registry.write().push(Arc::clone(&recorder));
        recorder
    }

    /// Returns the calling thread's recorder, creating it on first use.
    ///
    /// The pointer is cached in thread-local storage so hot-path recording
    /// never touches the registry lock after the first call.
    pub fn trace_recorder(&self) -> Arc<Recorder> {
        if let Some(recorder) = CURRENT_RECORDER.with(|cell| cell.borrow().clone()) {
            return recorder;
        }
        let recorder = self.allocate_recorder("UnnamedThread");
        CURRENT_RECORDER.with(|cell| *cell.borrow_mut() = Some(Arc::clone(&recorder)));
        recorder
    }

    /// Returns the recorder bound to `slot`, creating and naming it on first use.
    ///
    /// Not thread-local: any number of producers may call this concurrently,
    /// each serialized by the recorder's own lock.
    pub fn named_trace_recorder(&self, slot: NamedSlot) -> Arc<Recorder> {
        {
            let named = self.named.read();
            let existing = match slot {
                NamedSlot::Gpu => &named.gpu,
                NamedSlot::VSync => &named.vsync,
            };
            if let Some(recorder) = existing {
                return Arc::clone(recorder);
            }
        }
        let mut named = self.named.write();
        let slot_ref = match slot {
            NamedSlot::Gpu => &mut named.gpu,
            NamedSlot::VSync => &mut named.vsync,
        };
        if let Some(recorder) = slot_ref {
            return Arc::clone(recorder);
        }
        let recorder = self.allocate_recorder(slot.recorder_name());
        *slot_ref = Some(Arc::clone(&recorder));
        recorder
    }

    fn recorders(&self) -> Vec<Arc<Recorder>> {
        self.registry.read().clone()
    }

    /// Produces a full WTF binary stream.
    pub fn snapshot(&self) -> Vec<u8> {
        let timebase = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
        wtf::emit_snapshot(&self.recorders(), &self.general, &self.scope_names, &self.app_name, timebase, self.clock.now_us())
    }

    /// Reconstructs the hierarchical timeline from every recorder's current contents.
    pub fn build_timeline(&self) -> Timeline {
        build_timeline(&self.recorders(), &self.general, &self.scope_names)
    }

    pub fn register_metric(&self, metric: Box<dyn TimelineMetric>) {
        self.metrics.write().push(metric);
    }

    pub fn clear_metrics(&self) {
        self.metrics.write().clear();
    }

    /// Runs every registered metric against a freshly built timeline.
    pub fn run_metrics(&self) -> Benchmark {
        let timeline = self.build_timeline();
        let mut benchmark = Benchmark::default();
        for metric in self.metrics.read().iter() {
            metric.run(&timeline, &mut benchmark);
        }
        benchmark
    }

    /// Convenience sink for [`TraceManager::snapshot`].
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        debug_assert!(!path.as_ref().as_os_str().is_empty(), "write_file called with an empty path");
        let bytes = self.snapshot();
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_reject_undersized_buffer() {
        let settings = TraceManagerSettings { default_buffer_bytes: 0, ..Default::default() };
        assert_eq!(settings.validate(), Err(SettingsError::BufferTooSmall));
    }

    #[test]
    fn trace_recorder_is_cached_per_thread() {
        let manager = TraceManager::new("test", TraceManagerSettings::default()).unwrap();
        let a = manager.trace_recorder();
        let b = manager.trace_recorder();
        assert_eq!(a.thread_id(), b.thread_id());
    }

    #[test]
    fn named_recorders_are_created_once() {
        let manager = TraceManager::new("test", TraceManagerSettings::default()).unwrap();
        let a = manager.named_trace_recorder(NamedSlot::Gpu);
        let b = manager.named_trace_recorder(NamedSlot::Gpu);
        assert_eq!(a.thread_id(), b.thread_id());
        assert_eq!(a.name(), "GPU");
    }

    #[test]
    fn snapshot_of_empty_manager_is_well_formed() {
        let manager = TraceManager::new("test", TraceManagerSettings::default()).unwrap();
        let bytes = manager.snapshot();
        assert!(bytes.len() >= 12);
    }

    #[test]
    fn write_file_roundtrips_through_disk() {
        let manager = TraceManager::new("test", TraceManagerSettings::default()).unwrap();
        manager.trace_recorder().enter_scope(manager.trace_recorder().scope_id_for("Foo"));
        manager.trace_recorder().leave_scope();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.wtf-trace");
        manager.write_file(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() >= 12);
        assert_eq!(&bytes[0..12], &manager.snapshot()[0..12]);
    }
}
