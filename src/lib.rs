/*!

Low-overhead, in-process performance tracing.

`tracewtf` records timestamped events from many threads into per-thread
ring buffers, reconstructs them into a timeline on demand, and emits a
binary trace in the [Web Tracing Framework](https://github.com/google/tracing-framework)
wire format that external viewers consume.

# How to use

```
use tracewtf::{TraceManager, TraceManagerSettings};

let manager = TraceManager::new("my-app", TraceManagerSettings::default()).unwrap();

{
    let recorder = manager.trace_recorder();
    let scope = recorder.scope("do_work");
    // ... do work ...
    drop(scope);
}

let trace_bytes = manager.snapshot();
# let _ = trace_bytes;
```

Entering/leaving a scope only ever touches that thread's own recorder: no
cross-thread synchronization happens on the hot path beyond a short
per-recorder lock (see [`recorder`] for the state machine, and [`manager`]
for how recorders are created, looked up, and snapshotted).

*/

pub mod buffer_builder;
pub mod clock;
pub mod errors;
pub mod manager;
pub mod metrics;
pub mod recorder;
pub mod stringtable;
pub mod timeline;
pub mod vsync;
pub mod wtf;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use errors::{GpuProfilerError, RecorderError, SettingsError, StringTableError};
pub use manager::{NamedSlot, TraceManager, TraceManagerSettings};
pub use metrics::{Benchmark, TimelineMetric};
pub use recorder::{FrameGuard, Recorder, ScopeGuard, CUSTOM_SCOPE_BASE, EMPTY_SCOPE_MARKER};
pub use timeline::{Node, NodeKind, Timeline, TimelineSearch};
pub use vsync::VSyncProfiler;

#[cfg(feature = "gpu")]
pub use gpu::GpuProfiler;
