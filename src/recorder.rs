//! Per-thread ring buffer and the scope/frame/time-range state machine.
//!
//! Grounded almost 1:1 on `ion/profile/tracerecorder.h`/`.cc`: the wire ids,
//! argument counts, the empty-scope marker, and the open/close bookkeeping
//! all come from there. The lock is a `parking_lot::Mutex` standing in for
//! Ion's spinlock: per-recorder sections are short enough that spinning
//! would be fine, but a standard mutex is what wgpu-profiler reaches for
//! everywhere it protects a short section, e.g. `QueryPool`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer_builder::BufferBuilder;
use crate::clock::Clock;
use crate::errors::log_once;
use crate::stringtable::{StringTable, StringTableView, NO_STRING_INDEX};

/// Sentinel written whenever open-scope depth returns to zero.
///
/// The serializer scans for this value to find a safe replay start point
/// after the ring buffer has wrapped; it can never collide with a real wire
/// id because wire ids never approach this magnitude.
pub const EMPTY_SCOPE_MARKER: u32 = 0xFEEB1E57;

/// First wire id available for user-named (custom) scopes. Values below this
/// are reserved for the built-in events in [`wire`].
pub const CUSTOM_SCOPE_BASE: u32 = 100;

/// Initial capacity of each recorder's per-thread string-table front cache.
/// A thread rarely touches more than a few dozen distinct scope/annotation
/// names, so this avoids the first handful of reallocations without
/// over-committing memory per recorder.
const DEFAULT_VIEW_CACHE_CAPACITY: usize = 64;

/// Built-in WTF wire ids, exactly as listed in the event-definition table.
pub mod wire {
    pub const EVENT_DEFINE: u32 = 1;
    pub const TRACE_DISCONTINUITY: u32 = 2;
    pub const ZONE_CREATE: u32 = 3;
    pub const ZONE_DELETE: u32 = 4;
    pub const ZONE_SET: u32 = 5;
    pub const SCOPE_ENTER: u32 = 6;
    pub const SCOPE_ENTER_TRACING: u32 = 7;
    pub const SCOPE_LEAVE: u32 = 8;
    pub const SCOPE_APPEND_DATA: u32 = 9;
    pub const TRACE_MARK: u32 = 10;
    pub const TRACE_TIME_STAMP: u32 = 11;
    pub const TIME_RANGE_BEGIN: u32 = 12;
    pub const TIME_RANGE_END: u32 = 13;
    pub const TIMING_FRAME_START: u32 = 14;
    pub const TIMING_FRAME_END: u32 = 15;
    pub const SCOPE_APPEND_DATA_URL_UTF8: u32 = 16;
    pub const SCOPE_APPEND_DATA_READY_STATE_INT32: u32 = 17;
}

/// Number of trailing `u32` arguments for a given wire id.
///
/// A `match` over the closed built-in enumeration rather than a lookup
/// table of raw integers. Mirrors Ion's `GetNumArgsForEvent`
/// (`calltracemanager.cc`), whose backing array is `{0,5,0,4,1,1,1,0,0,2,2,
/// 2,3,1,1,1,1,1}` indexed by wire id.
pub fn arg_count(wire_id: u32) -> usize {
    use wire::*;
    match wire_id {
        EVENT_DEFINE => 5,
        TRACE_DISCONTINUITY => 0,
        ZONE_CREATE => 4,
        ZONE_DELETE => 1,
        ZONE_SET => 1,
        SCOPE_ENTER => 1,
        SCOPE_ENTER_TRACING => 0,
        SCOPE_LEAVE => 0,
        SCOPE_APPEND_DATA => 2,
        TRACE_MARK => 2,
        TRACE_TIME_STAMP => 2,
        TIME_RANGE_BEGIN => 3,
        TIME_RANGE_END => 1,
        TIMING_FRAME_START => 1,
        TIMING_FRAME_END => 1,
        SCOPE_APPEND_DATA_URL_UTF8 => 1,
        SCOPE_APPEND_DATA_READY_STATE_INT32 => 1,
        id if id >= CUSTOM_SCOPE_BASE => 0,
        _ => 0,
    }
}

/// One decoded event: a wire id, a timestamp, and its trailing arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub wire_id: u32,
    pub timestamp: u32,
    pub args: Vec<u32>,
}

struct RecorderState {
    buffer: Vec<u32>,
    /// Total words ever written. `write_pos % buffer.len()` is the next slot.
    write_pos: u64,
    scope_depth: u32,
    frame_depth: u32,
    current_frame_number: u32,
    open_ranges: HashSet<u32>,
    last_timestamp: u32,
    general_view: StringTableView,
    scope_view: StringTableView,
}

impl RecorderState {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, word: u32) {
        let cap = self.capacity();
        let slot = (self.write_pos % cap as u64) as usize;
        self.buffer[slot] = word;
        self.write_pos += 1;
    }

    fn read(&self, logical_index: u64) -> u32 {
        let cap = self.capacity() as u64;
        self.buffer[(logical_index % cap) as usize]
    }

    /// Logical index of the oldest word still present in the buffer.
    fn logical_start(&self) -> u64 {
        let cap = self.capacity() as u64;
        self.write_pos.saturating_sub(cap)
    }
}

/// A single thread's (or named slot's) event stream.
///
/// All mutating operations take the recorder's own lock; they never touch
/// any other recorder or the registry.
pub struct Recorder {
    thread_id: u64,
    name: Mutex<String>,
    state: Mutex<RecorderState>,
    clock: Arc<Clock>,
}

impl Recorder {
    pub(crate) fn new(
        thread_id: u64,
        name: impl Into<String>,
        capacity_bytes: usize,
        general: StringTable,
        scope_names: StringTable,
        clock: Arc<Clock>,
    ) -> Self {
        let capacity_words = (capacity_bytes / 4).max(1);
        Self {
            thread_id,
            name: Mutex::new(name.into()),
            state: Mutex::new(RecorderState {
                buffer: vec![0; capacity_words],
                write_pos: 0,
                scope_depth: 0,
                frame_depth: 0,
                current_frame_number: 0,
                open_ranges: HashSet::new(),
                last_timestamp: 0,
                general_view: general.view(DEFAULT_VIEW_CACHE_CAPACITY),
                scope_view: scope_names.view(DEFAULT_VIEW_CACHE_CAPACITY),
            }),
            clock,
        }
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock() = name.into();
    }

    fn now(&self) -> u32 {
        self.clock.now_us()
    }

    /// Interns `name` in the scope-name table and returns its wire id
    /// (`CUSTOM_SCOPE_BASE + index`).
    pub fn scope_id_for(&self, name: &str) -> u32 {
        let mut state = self.state.lock();
        CUSTOM_SCOPE_BASE + state.scope_view.intern(name)
    }

    fn record_timestamp(state: &mut RecorderState, ts: u32) {
        if ts < state.last_timestamp {
            log_once!(
                warn,
                "tracewtf: recorder saw a timestamp go backwards ({} < {}); recording anyway",
                ts,
                state.last_timestamp
            );
        }
        state.last_timestamp = ts.max(state.last_timestamp);
    }

    pub fn enter_scope(&self, id: u32) {
        self.enter_scope_at(self.now(), id)
    }

    pub fn enter_scope_at(&self, ts: u32, id: u32) {
        let mut state = self.state.lock();
        Self::record_timestamp(&mut state, ts);
        state.push(id);
        state.push(ts);
        state.scope_depth += 1;
    }

    pub fn annotate_current_scope(&self, name: &str, value: &serde_json::Value) {
        self.annotate_current_scope_at(self.now(), name, value)
    }

    pub fn annotate_current_scope_at(&self, ts: u32, name: &str, value: &serde_json::Value) {
        debug_assert!(
            !matches!(value, serde_json::Value::Number(n) if n.as_f64().is_some_and(|f| !f.is_finite())),
            "annotate value must be finite JSON"
        );
        let mut state = self.state.lock();
        if state.scope_depth == 0 {
            log_once!(warn, "tracewtf: annotate_current_scope called with no open scope");
            return;
        }
        Self::record_timestamp(&mut state, ts);
        let name_idx = state.general_view.intern(name);
        let value_idx = state.general_view.intern(&value.to_string());
        state.push(wire::SCOPE_APPEND_DATA);
        state.push(ts);
        state.push(name_idx);
        state.push(value_idx);
    }

    pub fn leave_scope(&self) {
        self.leave_scope_at(self.now())
    }

    pub fn leave_scope_at(&self, ts: u32) {
        let mut state = self.state.lock();
        if state.scope_depth == 0 {
            log_once!(warn, "tracewtf: leave_scope called with no open scope");
            return;
        }
        Self::record_timestamp(&mut state, ts);
        state.push(wire::SCOPE_LEAVE);
        state.push(ts);
        state.scope_depth -= 1;
        if state.scope_depth == 0 {
            state.push(EMPTY_SCOPE_MARKER);
        }
    }

    /// Returns a [`ScopeGuard`] that calls `scope_id_for` and `enter_scope`
    /// now, and `leave_scope` when dropped.
    pub fn scope<'a>(&'a self, name: &str) -> ScopeGuard<'a> {
        let id = self.scope_id_for(name);
        self.enter_scope(id);
        ScopeGuard { recorder: self }
    }

    pub fn enter_frame(&self, frame_number: u32) {
        let mut state = self.state.lock();
        let ts = self.now();
        Self::record_timestamp(&mut state, ts);
        if state.frame_depth == 0 {
            state.push(wire::TIMING_FRAME_START);
            state.push(ts);
            state.push(frame_number);
            state.current_frame_number = frame_number;
        }
        state.frame_depth += 1;
    }

    pub fn leave_frame(&self) {
        let mut state = self.state.lock();
        if state.frame_depth == 0 {
            log_once!(warn, "tracewtf: leave_frame called with no open frame");
            return;
        }
        state.frame_depth -= 1;
        if state.frame_depth == 0 {
            let ts = self.now();
            Self::record_timestamp(&mut state, ts);
            state.push(wire::TIMING_FRAME_END);
            state.push(ts);
            state.push(state.current_frame_number);
        }
    }

    /// Returns a [`FrameGuard`] that calls `enter_frame` now and
    /// `leave_frame` when dropped.
    pub fn frame<'a>(&'a self, frame_number: u32) -> FrameGuard<'a> {
        self.enter_frame(frame_number);
        FrameGuard { recorder: self }
    }

    /// Opens time range `id`, named `name`, with an optional JSON value.
    /// A no-op (logged once) if `id` is already open.
    pub fn enter_time_range(&self, id: u32, name: &str, value: Option<&serde_json::Value>) {
        let mut state = self.state.lock();
        if !state.open_ranges.insert(id) {
            log_once!(warn, "tracewtf: time range {} opened while already open", id);
            return;
        }
        let ts = self.now();
        Self::record_timestamp(&mut state, ts);
        let name_idx = state.general_view.intern(name);
        let value_idx = match value {
            Some(v) => state.general_view.intern(&v.to_string()),
            None => NO_STRING_INDEX,
        };
        state.push(wire::TIME_RANGE_BEGIN);
        state.push(ts);
        state.push(id);
        state.push(name_idx);
        state.push(value_idx);
    }

    /// Opens a time range named `name`, using the name's interned index as
    /// its id. Two concurrent ranges sharing a name collide; use
    /// [`Recorder::enter_time_range`] with an explicit id to avoid that.
    pub fn enter_time_range_named(&self, name: &str, value: Option<&serde_json::Value>) -> u32 {
        let id = {
            let mut state = self.state.lock();
            state.general_view.intern(name)
        };
        self.enter_time_range(id, name, value);
        id
    }

    pub fn leave_time_range(&self, id: u32) {
        let mut state = self.state.lock();
        if !state.open_ranges.remove(&id) {
            log_once!(warn, "tracewtf: time range {} closed while not open", id);
            return;
        }
        let ts = self.now();
        Self::record_timestamp(&mut state, ts);
        state.push(wire::TIME_RANGE_END);
        state.push(ts);
        state.push(id);
    }

    pub fn create_time_stamp(&self, name: &str, value: Option<&serde_json::Value>) {
        self.create_time_stamp_at(self.now(), name, value)
    }

    pub fn create_time_stamp_at(&self, ts: u32, name: &str, value: Option<&serde_json::Value>) {
        let mut state = self.state.lock();
        Self::record_timestamp(&mut state, ts);
        let name_idx = state.general_view.intern(name);
        let value_idx = match value {
            Some(v) => state.general_view.intern(&v.to_string()),
            None => NO_STRING_INDEX,
        };
        state.push(wire::TRACE_TIME_STAMP);
        state.push(ts);
        state.push(name_idx);
        state.push(value_idx);
    }

    /// Resets the buffer. Valid only when no scope or frame is open; a
    /// mismatched call is logged once and ignored.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if state.scope_depth != 0 || state.frame_depth != 0 {
            log_once!(warn, "tracewtf: clear() called with scopes or frames still open");
            return;
        }
        state.write_pos = 0;
        state.open_ranges.clear();
        state.last_timestamp = 0;
        state.push(EMPTY_SCOPE_MARKER);
    }

    /// Number of events `dump` would emit, including synthesized closes but
    /// excluding the empty-scope marker itself.
    pub fn event_count(&self) -> usize {
        self.replay().len()
    }

    /// Replays the buffer from the first empty-scope marker onward, then
    /// synthesizes closes for anything still open.
    pub(crate) fn replay(&self) -> Vec<Record> {
        let state = self.state.lock();
        let mut records = Vec::new();

        let wrapped = state.write_pos > state.capacity() as u64;
        let end = state.write_pos;
        let mut i = state.logical_start();
        if wrapped {
            // The oldest words may belong to a record the writer half
            // overwrote; skip forward to the first clean depth-zero
            // boundary before trusting the stream.
            while i < end && state.read(i) != EMPTY_SCOPE_MARKER {
                i += 1;
            }
            if i < end {
                i += 1;
            } else {
                i = state.logical_start();
            }
        }

        while i < end {
            let word = state.read(i);
            i += 1;
            if word == EMPTY_SCOPE_MARKER {
                continue;
            }
            if i >= end {
                break;
            }
            let timestamp = state.read(i);
            i += 1;
            let n = arg_count(word);
            let mut args = Vec::with_capacity(n);
            for _ in 0..n {
                if i >= end {
                    break;
                }
                args.push(state.read(i));
                i += 1;
            }
            records.push(Record { wire_id: word, timestamp, args });
        }

        let now = self.now();
        for &id in &state.open_ranges {
            records.push(Record { wire_id: wire::TIME_RANGE_END, timestamp: now, args: vec![id] });
        }
        for _ in 0..state.scope_depth {
            records.push(Record { wire_id: wire::SCOPE_LEAVE, timestamp: now, args: vec![] });
        }
        if state.frame_depth > 0 {
            records.push(Record {
                wire_id: wire::TIMING_FRAME_END,
                timestamp: now,
                args: vec![state.current_frame_number],
            });
        }

        records
    }

    /// Streams this recorder's events (including synthesized closes) into
    /// `out` as `(wire_id, timestamp, args...)` words.
    pub fn dump(&self, out: &mut BufferBuilder) {
        for record in self.replay() {
            out.append_scalar(record.wire_id);
            out.append_scalar(record.timestamp);
            for arg in record.args {
                out.append_scalar(arg);
            }
        }
    }
}

/// RAII wrapper: closes the scope it opened when dropped.
pub struct ScopeGuard<'a> {
    recorder: &'a Recorder,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.recorder.leave_scope();
    }
}

/// RAII wrapper: closes the frame it opened when dropped.
pub struct FrameGuard<'a> {
    recorder: &'a Recorder,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.recorder.leave_frame();
    }
}

/// Hands out unique thread ids for new recorders (`std::thread::ThreadId`
/// has no stable numeric conversion, so the manager mints its own).
pub(crate) fn next_thread_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
