mod common;

use tracewtf::NodeKind;

/// P3: every child node's interval lies within its parent's interval.
#[test]
fn p3_child_intervals_lie_within_parent() {
    let manager = common::manager();
    let recorder = manager.trace_recorder();
    let outer = recorder.scope_id_for("Outer");
    let inner = recorder.scope_id_for("Inner");

    recorder.enter_scope_at(0, outer);
    recorder.enter_scope_at(10, inner);
    recorder.leave_scope_at(20);
    recorder.leave_scope_at(30);

    let timeline = manager.build_timeline();

    fn check(node: &tracewtf::Node) {
        for child in &node.children {
            assert!(child.begin_us >= node.begin_us, "child begins before parent");
            assert!(child.end_us <= node.end_us, "child ends after parent");
            check(child);
        }
    }
    check(timeline.root());
}

/// P4: an annotation lands on the innermost currently-open scope, not an
/// ancestor.
#[test]
fn p4_annotation_lands_on_innermost_open_scope() {
    let manager = common::manager();
    let recorder = manager.trace_recorder();
    let outer = recorder.scope_id_for("Outer");
    let inner = recorder.scope_id_for("Inner");

    recorder.enter_scope_at(0, outer);
    recorder.enter_scope_at(1, inner);
    recorder.annotate_current_scope_at(2, "Depth", &serde_json::json!(2));
    recorder.leave_scope_at(3);
    recorder.leave_scope_at(4);

    let timeline = manager.build_timeline();
    let thread = &timeline.root().children[0];
    let outer_node = &thread.children[0];
    let inner_node = &outer_node.children[0];

    assert!(outer_node.args.get("Depth").is_none());
    assert_eq!(inner_node.args.get("Depth"), Some(&serde_json::json!(2)));
}

/// S4: two threads, each with 7 scope pairs, timestamps monotonic per thread.
#[test]
fn s4_two_threads_seven_pairs_each() {
    let manager = common::manager();

    let a = manager.trace_recorder();
    let id = a.scope_id_for("Shared");
    for i in 0..7u32 {
        a.enter_scope_at(i * 10, id);
        a.leave_scope_at(i * 10 + 5);
    }

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let b = manager.trace_recorder();
            let id = b.scope_id_for("Shared");
            for i in 0..7u32 {
                b.enter_scope_at(i * 10, id);
                b.leave_scope_at(i * 10 + 5);
            }
        });
    });

    let timeline = manager.build_timeline();
    assert_eq!(timeline.root().children.len(), 2);
    for thread in &timeline.root().children {
        assert!(matches!(thread.kind, NodeKind::Thread { .. }));
        assert_eq!(thread.children.len(), 7);
        let mut last_end = 0;
        for scope in &thread.children {
            assert!(scope.begin_us >= last_end);
            last_end = scope.end_us;
        }
    }
}
