//! GPU timer query adapter, feeding a named recorder.
//!
//! The query-set/resolve-buffer/readback-buffer plumbing and the
//! `map_async` completion-counting idiom come from wgpu-profiler's own
//! query pool, cut down from a multi-frame-in-flight pipeline to a single
//! poll-driven pool. The disjoint handling and timebase sync/correction
//! loop come from `ion/gfxprofile/gpuprofiler.cc`'s `SyncGlTimebase`/
//! `PollGlTimerQueries`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::errors::{log_once, GpuProfilerError};
use crate::recorder::Recorder;

const QUERY_CAPACITY: u32 = 4096;
const SYNC_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Begin,
    End,
    /// Written once per `poll()` call, whether or not a real scope is in
    /// flight. Participates in the begin-side offset correction below so
    /// `gl_timer_offset_ns` stays fresh during stretches with GPU tracing
    /// enabled but no scopes recorded; never delivered to the recorder.
    BeginFrame,
}

struct PendingQuery {
    kind: QueryKind,
    scope_event_id: u32,
    query_index: u32,
    enqueued_host_us: u32,
}

struct GpuState {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    read_buffer: wgpu::Buffer,
    capacity: u32,
    next_query_index: u32,
    num_resolved: u32,
    pending: VecDeque<PendingQuery>,
    mapped: Arc<AtomicBool>,
    gl_timer_offset_ns: i64,
}

/// Enqueues GPU timer queries and translates their results into
/// `scope#enter`/`scope#leave` pairs on a recorder, usually the manager's
/// [`crate::manager::NamedSlot::Gpu`] slot.
pub struct GpuProfiler {
    recorder: Arc<Recorder>,
    clock: Arc<Clock>,
    enabled: AtomicBool,
    state: Mutex<Option<GpuState>>,
    next_query_id: AtomicU32,
}

impl GpuProfiler {
    pub fn new(recorder: Arc<Recorder>, clock: Arc<Clock>) -> Self {
        Self { recorder, clock, enabled: AtomicBool::new(false), state: Mutex::new(None), next_query_id: AtomicU32::new(0) }
    }

    /// True iff the device advertises timer query support.
    pub fn supported(device: &wgpu::Device) -> bool {
        device.features().contains(wgpu::Features::TIMESTAMP_QUERY)
    }

    /// Records `device`/`queue` and syncs the host/device timebase.
    pub fn attach(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<(), GpuProfilerError> {
        if !Self::supported(device) {
            log_once!(warn, "tracewtf: GPU device has no timer query support; GPU tracing disabled");
            return Err(GpuProfilerError::Unsupported);
        }

        let capacity = QUERY_CAPACITY.min(wgpu::QUERY_SET_MAX_QUERIES);
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("tracewtf-gpu-timer-queries"),
            ty: wgpu::QueryType::Timestamp,
            count: capacity,
        });
        let byte_size = (capacity as u64) * (wgpu::QUERY_SIZE as u64);
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tracewtf-gpu-resolve"),
            size: byte_size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let read_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tracewtf-gpu-readback"),
            size: byte_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        *self.state.lock() = Some(GpuState {
            query_set,
            resolve_buffer,
            read_buffer,
            capacity,
            next_query_index: 0,
            num_resolved: 0,
            pending: VecDeque::new(),
            mapped: Arc::new(AtomicBool::new(false)),
            gl_timer_offset_ns: 0,
        });

        self.sync_timebase(device, queue)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn write_timestamp(&self, encoder: &mut wgpu::CommandEncoder, kind: QueryKind, scope_event_id: u32) {
        if !self.is_enabled() {
            return;
        }
        let mut guard = self.state.lock();
        let Some(state) = guard.as_mut() else {
            log_once!(warn, "tracewtf: GPU scope recorded before attach()");
            return;
        };
        if state.next_query_index >= state.capacity {
            log_once!(warn, "tracewtf: GPU query pool exhausted; dropping scope");
            return;
        }
        let query_index = state.next_query_index;
        state.next_query_index += 1;
        encoder.write_timestamp(&state.query_set, query_index);

        let enqueued_host_us = self.clock.now_us();
        state.pending.push_back(PendingQuery { kind, scope_event_id, query_index, enqueued_host_us });
    }

    pub fn enter_scope(&self, encoder: &mut wgpu::CommandEncoder, name: &str) {
        let scope_event_id = self.recorder.scope_id_for(name);
        self.write_timestamp(encoder, QueryKind::Begin, scope_event_id);
    }

    pub fn leave_scope(&self, encoder: &mut wgpu::CommandEncoder) {
        self.write_timestamp(encoder, QueryKind::End, 0);
    }

    /// Emits a `BeginFrame` query, then resolves and maps whatever queries
    /// are ready and drains completed ones into the recorder. Call once per
    /// frame, after submitting any encoder that wrote GPU-side queries.
    pub fn poll(&self, device: &wgpu::Device, queue: &wgpu::Queue, timestamp_period_ns: f32) {
        if !self.is_enabled() {
            return;
        }

        {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            self.write_timestamp(&mut encoder, QueryKind::BeginFrame, 0);
            queue.submit(Some(encoder.finish()));
        }

        let mut guard = self.state.lock();
        let Some(state) = guard.as_mut() else { return };

        if state.num_resolved < state.next_query_index {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            encoder.resolve_query_set(
                &state.query_set,
                state.num_resolved..state.next_query_index,
                &state.resolve_buffer,
                (state.num_resolved as u64) * (wgpu::QUERY_SIZE as u64),
            );
            let copy_len = ((state.next_query_index - state.num_resolved) as u64) * (wgpu::QUERY_SIZE as u64);
            encoder.copy_buffer_to_buffer(&state.resolve_buffer, 0, &state.read_buffer, 0, copy_len);
            queue.submit(Some(encoder.finish()));
            state.num_resolved = state.next_query_index;

            let mapped = Arc::clone(&state.mapped);
            state.read_buffer.slice(0..copy_len).map_async(wgpu::MapMode::Read, move |result| {
                if result.is_ok() {
                    mapped.store(true, Ordering::Release);
                }
            });
        }

        device.poll(wgpu::Maintain::Wait);
        if !state.mapped.swap(false, Ordering::AcqRel) {
            return;
        }

        let disjoint = Self::device_reports_disjoint(device);
        if disjoint {
            log_once!(warn, "tracewtf: discarding GPU timer queries across a disjoint event");
            state.pending.clear();
            state.read_buffer.unmap();
            return;
        }

        let timestamp_to_ns = timestamp_period_ns as f64;
        let data = state.read_buffer.slice(..).get_mapped_range();

        while let Some(query) = state.pending.front() {
            let byte_offset = (query.query_index as usize) * (wgpu::QUERY_SIZE as usize);
            let Some(word) = data.get(byte_offset..byte_offset + wgpu::QUERY_SIZE as usize) else { break };
            let device_ticks = u64::from_le_bytes(word.try_into().unwrap());
            let device_ns = (device_ticks as f64 * timestamp_to_ns) as i64;
            let mut host_ns = device_ns + state.gl_timer_offset_ns;
            if matches!(query.kind, QueryKind::Begin | QueryKind::BeginFrame) {
                let enqueue_ns = (query.enqueued_host_us as i64) * 1000;
                if enqueue_ns > host_ns {
                    state.gl_timer_offset_ns += enqueue_ns - host_ns;
                    host_ns = enqueue_ns;
                }
            }
            let host_us = (host_ns / 1000) as u32;
            match query.kind {
                QueryKind::Begin => self.recorder.enter_scope_at(host_us, query.scope_event_id),
                QueryKind::End => self.recorder.leave_scope_at(host_us),
                QueryKind::BeginFrame => {}
            }
            state.pending.pop_front();
        }
        drop(data);
        state.read_buffer.unmap();
    }

    /// Samples the device and host clocks and resets the correction offset.
    /// Retries while the device reports a disjoint event.
    pub fn sync_timebase(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<(), GpuProfilerError> {
        for _ in 0..SYNC_RETRIES {
            if Self::device_reports_disjoint(device) {
                continue;
            }
            let host_ns = self.clock.now_ns() as i64;
            let device_ns = Self::sample_device_clock(device, queue);
            let mut guard = self.state.lock();
            if let Some(state) = guard.as_mut() {
                state.gl_timer_offset_ns = host_ns - device_ns;
            }
            return Ok(());
        }
        log_once!(warn, "tracewtf: GPU timebase sync failed after {} retries; offset reset to zero", SYNC_RETRIES);
        let mut guard = self.state.lock();
        if let Some(state) = guard.as_mut() {
            state.gl_timer_offset_ns = 0;
        }
        Err(GpuProfilerError::TimebaseSyncFailed)
    }

    fn device_reports_disjoint(_device: &wgpu::Device) -> bool {
        // wgpu has no portable disjoint-timestamp signal today; treat the
        // clock as always trustworthy until a backend exposes one.
        false
    }

    /// Writes a single timestamp query and reads it back synchronously.
    /// Only used by [`GpuProfiler::sync_timebase`], which runs far off the
    /// hot path, so a dedicated one-off query set is acceptable.
    fn sample_device_clock(device: &wgpu::Device, queue: &wgpu::Queue) -> i64 {
        let query_set =
            device.create_query_set(&wgpu::QuerySetDescriptor { label: None, ty: wgpu::QueryType::Timestamp, count: 1 });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: wgpu::QUERY_SIZE as u64,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let read_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: wgpu::QUERY_SIZE as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.write_timestamp(&query_set, 0);
        encoder.resolve_query_set(&query_set, 0..1, &resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&resolve_buffer, 0, &read_buffer, 0, wgpu::QUERY_SIZE as u64);
        queue.submit(Some(encoder.finish()));

        let mapped = Arc::new(AtomicBool::new(false));
        let mapped_clone = Arc::clone(&mapped);
        read_buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            if result.is_ok() {
                mapped_clone.store(true, Ordering::Release);
            }
        });
        device.poll(wgpu::Maintain::Wait);

        let ticks = {
            let data = read_buffer.slice(..).get_mapped_range();
            u64::from_le_bytes(data[0..wgpu::QUERY_SIZE as usize].try_into().unwrap())
        };
        read_buffer.unmap();

        let timestamp_period_ns = queue.get_timestamp_period() as f64;
        (ticks as f64 * timestamp_period_ns) as i64
    }
}
