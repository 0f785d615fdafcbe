mod common;

use tracewtf::{NamedSlot, VSyncProfiler};

#[test]
fn accepted_vsyncs_reach_the_named_recorder() {
    let manager = common::manager();
    let recorder = manager.named_trace_recorder(NamedSlot::VSync);
    let profiler = VSyncProfiler::new(recorder.clone());

    profiler.record(1000, 0);
    profiler.record(2000, 1);
    profiler.record(3000, 2);

    assert_eq!(recorder.event_count(), 3);
}

/// A timestamp earlier than the last accepted one is rejected and logged
/// once, not recorded.
#[test]
fn regressed_timestamp_is_dropped() {
    let manager = common::manager();
    let recorder = manager.named_trace_recorder(NamedSlot::VSync);
    let profiler = VSyncProfiler::new(recorder.clone());

    profiler.record(5000, 0);
    profiler.record(1000, 1);
    profiler.record(5001, 2);

    assert_eq!(recorder.event_count(), 2);
}

#[test]
fn vsync_events_show_up_in_the_reconstructed_timeline() {
    let manager = common::manager();
    let recorder = manager.named_trace_recorder(NamedSlot::VSync);
    let profiler = VSyncProfiler::new(recorder);

    profiler.record(100, 7);

    let timeline = manager.build_timeline();
    let thread = &timeline.root().children[0];
    assert_eq!(thread.children.len(), 1);
    assert_eq!(thread.children[0].name(), Some("VSync7"));
}
