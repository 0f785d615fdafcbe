//! WTF (Web Tracing Framework) binary trace emitter.
//!
//! Chunk layout, magic numbers, and the built-in event-definition table are
//! taken directly from `ion/profile/calltracemanager.cc`'s
//! `SnapshotCallTraces` (the `Chunk`/`PartInfo`/`StringTable`/`EventBuffer`
//! helpers there assemble exactly these three chunks).

use std::sync::Arc;

use crate::buffer_builder::BufferBuilder;
use crate::recorder::{wire, Recorder, CUSTOM_SCOPE_BASE};
use crate::stringtable::{StringTable, NO_STRING_INDEX};

const STREAM_MAGIC_0: u32 = 0xDEADBEEF;
const STREAM_MAGIC_1: u32 = 0xE8214400;
const STREAM_FORMAT_VERSION: u32 = 10;

const PART_TYPE_HEADER: u32 = 0x10000;
const PART_TYPE_EVENT_BUFFER: u32 = 0x20002;
const PART_TYPE_STRING_TABLE: u32 = 0x30000;

const CHUNK_TYPE_HEADER: u32 = 1;
const CHUNK_TYPE_EVENTS: u32 = 2;

const CHUNK_ID_TRACE: u32 = 1;
const CHUNK_ID_HEADER: u32 = 2;
const CHUNK_ID_EVENT_DEFS: u32 = 3;

/// Fixed name, argument-signature pairs for the built-in wire ids, in the
/// order the WTF event-definition table lists them. `None` means the event takes no arguments and so
/// has no signature string.
const BUILTIN_EVENT_DEFS: &[(u32, &str, Option<&str>)] = &[
    (wire::EVENT_DEFINE, "wtf.event#define", Some("uint16 wireId, uint16 eventClass, uint32 flags, ascii name, ascii args")),
    (wire::TRACE_DISCONTINUITY, "wtf.trace#discontinuity", None),
    (wire::ZONE_CREATE, "wtf.zone#create", Some("uint16 zoneId, ascii name, ascii type, ascii location")),
    (wire::ZONE_DELETE, "wtf.zone#delete", Some("uint16 zoneId")),
    (wire::ZONE_SET, "wtf.zone#set", Some("uint16 zoneId")),
    (wire::SCOPE_ENTER, "wtf.scope#enter", Some("ascii name")),
    (wire::SCOPE_ENTER_TRACING, "wtf.scope#enterTracing", None),
    (wire::SCOPE_LEAVE, "wtf.scope#leave", None),
    (wire::SCOPE_APPEND_DATA, "wtf.scope#appendData", Some("ascii name, any value")),
    (wire::TRACE_MARK, "wtf.trace#mark", Some("ascii name, any value")),
    (wire::TRACE_TIME_STAMP, "wtf.trace#timeStamp", Some("ascii name, any value")),
    (wire::TIME_RANGE_BEGIN, "wtf.timeRange#begin", Some("uint32 id, ascii name, any value")),
    (wire::TIME_RANGE_END, "wtf.timeRange#end", Some("uint32 id")),
    (wire::TIMING_FRAME_START, "wtf.timing#frameStart", Some("uint32 number")),
    (wire::TIMING_FRAME_END, "wtf.timing#frameEnd", Some("uint32 number")),
    (wire::SCOPE_APPEND_DATA_URL_UTF8, "wtf.scope#appendData_url_utf8", Some("utf8 url")),
    (wire::SCOPE_APPEND_DATA_READY_STATE_INT32, "wtf.scope#appendData_readyState_int32", Some("int32 readyState")),
];

/// A NUL-separated string table local to one WTF chunk (distinct from the
/// process-wide [`StringTable`] — its indices only make sense within the
/// chunk they were built for).
#[derive(Default)]
struct LocalStrings {
    bytes: Vec<u8>,
    count: u32,
}

impl LocalStrings {
    fn push(&mut self, s: &str) -> u32 {
        let index = self.count;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.count += 1;
        index
    }
}

fn align_up(n: usize, align: usize) -> usize {
    let remainder = n % align;
    if remainder == 0 {
        n
    } else {
        n + (align - remainder)
    }
}

struct Part {
    part_type: u32,
    payload: Vec<u8>,
}

fn write_chunk(out: &mut BufferBuilder, chunk_id: u32, chunk_type: u32, start_time: u32, end_time: u32, parts: &[Part]) {
    out.append_scalar(STREAM_MAGIC_0);
    out.append_scalar(STREAM_MAGIC_1);
    out.append_scalar(STREAM_FORMAT_VERSION);

    let header_len = (6 + 3 * parts.len()) * 4;
    let mut infos = Vec::with_capacity(parts.len());
    let mut payloads = Vec::with_capacity(header_len);
    let mut offset = header_len as u32;
    for part in parts {
        let aligned_len = align_up(part.payload.len(), 4);
        infos.push((part.part_type, offset, aligned_len as u32));
        payloads.extend_from_slice(&part.payload);
        payloads.resize(payloads.len() + (aligned_len - part.payload.len()), 0);
        offset += aligned_len as u32;
    }

    out.append_scalar(chunk_id);
    out.append_scalar(chunk_type);
    out.append_scalar(offset);
    out.append_scalar(start_time);
    out.append_scalar(end_time);
    out.append_scalar(parts.len() as u32);
    for (part_type, part_offset, part_length) in infos {
        out.append_scalar(part_type);
        out.append_scalar(part_offset);
        out.append_scalar(part_length);
    }
    out.append(&payloads);
}

/// The opaque WTF file-header JSON payload. Emitted verbatim, no
/// terminating NUL.
pub fn file_header_json(app_name: &str, timebase: f64) -> String {
    serde_json::json!({
        "type": "file_header",
        "flags": ["has_high_resolution_times"],
        "timebase": timebase,
        "contextInfo": {
            "contextType": "script",
            "title": app_name,
            "args": [],
            "taskId": "",
            "userAgent": {},
            "icon": {},
        }
    })
    .to_string()
}

fn event_definitions_parts(scope_names: &StringTable) -> (Part, Part) {
    let mut strings = LocalStrings::default();
    let mut events = BufferBuilder::new();

    for &(wire_id, name, args) in BUILTIN_EVENT_DEFS {
        let name_idx = strings.push(name);
        let args_idx = args.map(|a| strings.push(a)).unwrap_or(NO_STRING_INDEX);
        let event_class = u32::from(wire_id == wire::SCOPE_ENTER);
        events.append_scalar(wire::EVENT_DEFINE);
        events.append_scalar(0u32);
        events.append_scalar(wire_id);
        events.append_scalar(event_class);
        events.append_scalar(0u32);
        events.append_scalar(name_idx);
        events.append_scalar(args_idx);
    }

    for (i, name) in scope_names.snapshot().iter().enumerate() {
        let name_idx = strings.push(name);
        let wire_id = CUSTOM_SCOPE_BASE + i as u32;
        events.append_scalar(wire::EVENT_DEFINE);
        events.append_scalar(0u32);
        events.append_scalar(wire_id);
        events.append_scalar(1u32);
        events.append_scalar(0u32);
        events.append_scalar(name_idx);
        events.append_scalar(NO_STRING_INDEX);
    }

    (
        Part { part_type: PART_TYPE_STRING_TABLE, payload: strings.bytes },
        Part { part_type: PART_TYPE_EVENT_BUFFER, payload: events.build() },
    )
}

fn trace_chunk_parts(recorders: &[Arc<Recorder>], general: &StringTable) -> (Part, Part) {
    let mut zone_names = Vec::with_capacity(recorders.len());
    for (i, _) in recorders.iter().enumerate() {
        let idx = general.intern(&format!("Thread_{}", i + 1));
        zone_names.push(idx);
    }

    let mut strings = LocalStrings::default();
    for name in general.snapshot() {
        strings.push(&name);
    }
    let script_idx = strings.push("script");
    let location_idx = strings.push("Some_Location");

    let mut events = BufferBuilder::new();
    for (i, recorder) in recorders.iter().enumerate() {
        let zone_id = i as u32 + 1;
        events.append_scalar(wire::ZONE_CREATE);
        events.append_scalar(0u32);
        events.append_scalar(zone_id);
        events.append_scalar(zone_names[i]);
        events.append_scalar(script_idx);
        events.append_scalar(location_idx);

        events.append_scalar(wire::ZONE_SET);
        events.append_scalar(0u32);
        events.append_scalar(zone_id);

        recorder.dump(&mut events);
    }

    (
        Part { part_type: PART_TYPE_STRING_TABLE, payload: strings.bytes },
        Part { part_type: PART_TYPE_EVENT_BUFFER, payload: events.build() },
    )
}

/// Assembles the full three-chunk WTF binary stream.
pub fn emit_snapshot(
    recorders: &[Arc<Recorder>],
    general: &StringTable,
    scope_names: &StringTable,
    app_name: &str,
    timebase: f64,
    now_us: u32,
) -> Vec<u8> {
    let mut out = BufferBuilder::new();

    let header_json = file_header_json(app_name, timebase);
    write_chunk(
        &mut out,
        CHUNK_ID_HEADER,
        CHUNK_TYPE_HEADER,
        0,
        0,
        &[Part { part_type: PART_TYPE_HEADER, payload: header_json.into_bytes() }],
    );

    let (def_strings, def_events) = event_definitions_parts(scope_names);
    write_chunk(&mut out, CHUNK_ID_EVENT_DEFS, CHUNK_TYPE_EVENTS, 0, 0, &[def_strings, def_events]);

    let (trace_strings, trace_events) = trace_chunk_parts(recorders, general);
    write_chunk(&mut out, CHUNK_ID_TRACE, CHUNK_TYPE_EVENTS, 0, now_us, &[trace_strings, trace_events]);

    out.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    #[test]
    fn snapshot_starts_with_stream_magic_three_times() {
        let general = StringTable::new();
        let scope_names = StringTable::new();
        let recorder =
            Arc::new(Recorder::new(1, "Test", 4096, general.clone(), scope_names.clone(), Arc::new(Clock::new())));
        let bytes = emit_snapshot(&[recorder], &general, &scope_names, "test-app", 0.0, 0);

        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), STREAM_MAGIC_0);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), STREAM_MAGIC_1);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), STREAM_FORMAT_VERSION);
    }

    #[test]
    fn empty_recorder_set_still_yields_well_formed_prefix() {
        let general = StringTable::new();
        let scope_names = StringTable::new();
        let bytes = emit_snapshot(&[], &general, &scope_names, "test-app", 0.0, 0);
        assert!(bytes.len() >= 12);
    }

    #[test]
    fn file_header_json_contains_required_fields() {
        let json = file_header_json("MyApp", 1.5);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "file_header");
        assert_eq!(value["contextInfo"]["title"], "MyApp");
    }
}
