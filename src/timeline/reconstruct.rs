//! Flat event stream → timeline tree.
//!
//! Grounded on `ion/profile/timeline.cc`'s `TimelineNode::BuildTimelineNode`
//! stack-walk (and `tracerecorder.cc`'s `DumpTrace`, whose replay loop
//! decides record boundaries). Parent/child links are built over an arena
//! of indices rather than a virtual node graph — this is just Rust's usual
//! way of giving nodes a "weak" parent back-pointer without `Rc<RefCell<_>>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::recorder::{wire, Recorder, CUSTOM_SCOPE_BASE};
use crate::stringtable::{StringTable, NO_STRING_INDEX};

use super::node::{Node, NodeKind};
use super::Timeline;

struct Builder {
    kind: NodeKind,
    begin_us: u32,
    end_us: u32,
    args: BTreeMap<String, Value>,
    children: Vec<usize>,
    parent: Option<usize>,
    closed: bool,
}

fn resolve(table: &StringTable, index: u32) -> String {
    if index == NO_STRING_INDEX {
        return String::new();
    }
    table.get(index).unwrap_or_else(|_| "(missing)".to_string())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Builds the full timeline tree from every recorder's current contents.
///
/// Any scope, frame, or time range still open at call time is closed with a
/// synthesized event timestamped at call time — that work
/// happens inside [`Recorder::replay`], which this reads via `dump`'s
/// underlying record stream.
pub fn build_timeline(recorders: &[Arc<Recorder>], general: &StringTable, scope_names: &StringTable) -> Timeline {
    let mut arena: Vec<Builder> = vec![Builder {
        kind: NodeKind::Root,
        begin_us: 0,
        end_us: 0,
        args: BTreeMap::new(),
        children: Vec::new(),
        parent: None,
        closed: false,
    }];

    for recorder in recorders {
        let thread_idx = push(
            &mut arena,
            Builder {
                kind: NodeKind::Thread { thread_id: recorder.thread_id(), name: recorder.name() },
                begin_us: 0,
                end_us: 0,
                args: BTreeMap::new(),
                children: Vec::new(),
                parent: Some(0),
                closed: false,
            },
        );
        arena[0].children.push(thread_idx);

        let mut stack: Vec<usize> = Vec::new();
        let mut parent_candidate = thread_idx;
        let mut last_timestamp = 0u32;

        for record in recorder.replay() {
            debug_assert!(record.timestamp >= last_timestamp, "timeline events must be monotonic");
            last_timestamp = record.timestamp;

            advance_parent_candidate(&arena, &mut parent_candidate, stack.last().copied(), record.timestamp);

            match record.wire_id {
                wire::TIME_RANGE_BEGIN => {
                    let id = record.args[0];
                    let name = resolve(general, record.args[1]);
                    let idx = open_node(
                        &mut arena,
                        NodeKind::Range { id, name },
                        record.timestamp,
                        parent_candidate,
                    );
                    stack.push(idx);
                    parent_candidate = idx;
                }
                wire::TIMING_FRAME_START => {
                    let frame_number = record.args[0];
                    let idx =
                        open_node(&mut arena, NodeKind::Frame { frame_number }, record.timestamp, parent_candidate);
                    stack.push(idx);
                    parent_candidate = idx;
                }
                wire::TIME_RANGE_END | wire::TIMING_FRAME_END | wire::SCOPE_LEAVE => {
                    if let Some(idx) = stack.pop() {
                        arena[idx].end_us = record.timestamp;
                        arena[idx].closed = true;
                        parent_candidate = arena[idx].parent.unwrap_or(thread_idx);
                    }
                }
                wire::SCOPE_APPEND_DATA => {
                    if let Some(&top) = stack.last() {
                        let name = resolve(general, record.args[0]);
                        let value = parse_value(&resolve(general, record.args[1]));
                        arena[top].args.insert(name, value);
                    }
                }
                wire::TRACE_TIME_STAMP => {
                    let name = resolve(general, record.args[0]);
                    let idx = push(
                        &mut arena,
                        Builder {
                            kind: NodeKind::Event { name },
                            begin_us: record.timestamp,
                            end_us: record.timestamp,
                            args: BTreeMap::new(),
                            children: Vec::new(),
                            parent: Some(parent_candidate),
                            closed: true,
                        },
                    );
                    arena[parent_candidate].children.push(idx);
                }
                id if id >= CUSTOM_SCOPE_BASE => {
                    let name = resolve(scope_names, id - CUSTOM_SCOPE_BASE);
                    let idx = open_node(&mut arena, NodeKind::Scope { name }, record.timestamp, parent_candidate);
                    stack.push(idx);
                    parent_candidate = idx;
                }
                _ => {}
            }
        }
    }

    Timeline { root: materialize(&arena, 0) }
}

fn push(arena: &mut Vec<Builder>, builder: Builder) -> usize {
    arena.push(builder);
    arena.len() - 1
}

fn open_node(arena: &mut Vec<Builder>, kind: NodeKind, begin_us: u32, parent: usize) -> usize {
    let idx = push(
        arena,
        Builder {
            kind,
            begin_us,
            end_us: begin_us,
            args: BTreeMap::new(),
            children: Vec::new(),
            parent: Some(parent),
            closed: false,
        },
    );
    arena[parent].children.push(idx);
    idx
}

/// Walks `parent_candidate` up toward the root while it has already closed
/// and ended strictly before `current_ts` — this lets a new sibling attach
/// to an ancestor once an older sibling at the same level has already
/// finished, instead of nesting incorrectly under it.
fn advance_parent_candidate(arena: &[Builder], parent_candidate: &mut usize, stack_top: Option<usize>, current_ts: u32) {
    loop {
        let node = &arena[*parent_candidate];
        let is_stack_top = stack_top == Some(*parent_candidate);
        let already_ended = node.closed && node.end_us <= current_ts;
        match node.parent {
            Some(parent) if !is_stack_top && already_ended => *parent_candidate = parent,
            _ => break,
        }
    }
}

fn materialize(arena: &[Builder], idx: usize) -> Node {
    let builder = &arena[idx];
    Node {
        kind: builder.kind.clone(),
        begin_us: builder.begin_us,
        end_us: builder.end_us,
        args: builder.args.clone(),
        children: builder.children.iter().map(|&child| materialize(arena, child)).collect(),
    }
}
