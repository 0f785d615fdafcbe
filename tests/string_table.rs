use tracewtf::StringTableError;
use tracewtf::manager::{TraceManager, TraceManagerSettings};

/// P7: a string's index, once handed out, keeps resolving to the same text
/// for the lifetime of the table, even after new strings are interned.
#[test]
fn p7_indices_are_stable_across_further_interning() {
    let manager = TraceManager::new("string-table-test", TraceManagerSettings::default()).unwrap();
    let recorder = manager.trace_recorder();

    let first = recorder.scope_id_for("First");
    let _second = recorder.scope_id_for("Second");
    let first_again = recorder.scope_id_for("First");

    assert_eq!(first, first_again);
}

#[test]
fn out_of_range_lookup_is_a_typed_error() {
    let table = tracewtf::stringtable::StringTable::new();
    table.intern("only_one");
    let err = table.get(99).unwrap_err();
    assert_eq!(err, StringTableError::OutOfRange { index: 99, size: 1 });
}

#[test]
fn no_string_index_resolves_to_empty_string() {
    let table = tracewtf::stringtable::StringTable::new();
    assert_eq!(table.get(tracewtf::stringtable::NO_STRING_INDEX).unwrap(), "");
}

/// Cloning a [`StringTable`] shares the same backing storage.
#[test]
fn clones_share_the_same_backing_table() {
    let table = tracewtf::stringtable::StringTable::new();
    let clone = table.clone();
    let index = table.intern("shared");
    assert_eq!(clone.get(index).unwrap(), "shared");
}
