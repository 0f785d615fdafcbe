//! Grow-only string interning shared by every recorder in a process.
//!
//! Mirrors the WTF string-table contract Ion's `CallTraceManager` exposes
//! through `tracerecorder.h`'s `string_table_view_`: strings are interned
//! once, referenced afterwards by a stable `u32` index, and never removed
//! (an index handed out before a `clear()` stays valid after it).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::StringTableError;

/// Sentinel meaning "no string" in both the ring buffer and the WTF wire format.
pub const NO_STRING_INDEX: u32 = u32::MAX;

#[derive(Debug, Default)]
struct Inner {
    strings: Vec<String>,
    indices: HashMap<String, u32>,
}

/// Shared, grow-only table of interned strings.
///
/// Cloning a `StringTable` clones the `Arc`, not the contents — every clone
/// sees the same table.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    inner: Arc<Mutex<Inner>>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its stable index. Repeated calls with the same
    /// string return the same index.
    pub fn intern(&self, s: &str) -> u32 {
        let mut inner = self.inner.lock();
        if let Some(&index) = inner.indices.get(s) {
            return index;
        }
        let index = inner.strings.len() as u32;
        inner.strings.push(s.to_owned());
        inner.indices.insert(s.to_owned(), index);
        index
    }

    /// Looks up the string at `index`.
    pub fn get(&self, index: u32) -> Result<String, StringTableError> {
        if index == NO_STRING_INDEX {
            return Ok(String::new());
        }
        let inner = self.inner.lock();
        inner
            .strings
            .get(index as usize)
            .cloned()
            .ok_or(StringTableError::OutOfRange { index, size: inner.strings.len() })
    }

    pub fn size(&self) -> usize {
        self.inner.lock().strings.len()
    }

    /// Snapshots every interned string in index order, for WTF's string table part.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().strings.clone()
    }

    /// A per-thread front-cache over this table, preallocated to hold
    /// `initial_cache_capacity` entries before its first reallocation.
    pub fn view(&self, initial_cache_capacity: usize) -> StringTableView {
        StringTableView { table: self.clone(), cache: HashMap::with_capacity(initial_cache_capacity) }
    }
}

/// Per-thread cache in front of a shared [`StringTable`].
///
/// Ring-buffer events are recorded far more often than new strings appear,
/// so each thread keeps its own map of `&'static str` pointer identity (via
/// the string's contents) to the index the shared table already assigned,
/// avoiding a lock acquisition on every repeated scope entry.
///
/// Survives [`crate::recorder::Recorder::clear`]: `clear()` only discards
/// ring-buffer contents, not string identities, so the cache stays valid.
#[derive(Debug)]
pub struct StringTableView {
    table: StringTable,
    cache: HashMap<String, u32>,
}

impl StringTableView {
    /// Interns `s`, consulting the local cache before the shared table.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.cache.get(s) {
            return index;
        }
        let index = self.table.intern(s);
        self.cache.insert(s.to_owned(), index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_string_twice_returns_same_index() {
        let table = StringTable::new();
        let a = table.intern("scope_a");
        let b = table.intern("scope_a");
        assert_eq!(a, b);
    }

    #[test]
    fn interning_distinct_strings_returns_distinct_indices() {
        let table = StringTable::new();
        let a = table.intern("scope_a");
        let b = table.intern("scope_b");
        assert_ne!(a, b);
    }

    #[test]
    fn get_out_of_range_errors() {
        let table = StringTable::new();
        table.intern("only_one");
        assert_eq!(table.get(5), Err(StringTableError::OutOfRange { index: 5, size: 1 }));
    }

    #[test]
    fn get_no_string_index_returns_empty() {
        let table = StringTable::new();
        assert_eq!(table.get(NO_STRING_INDEX).unwrap(), "");
    }

    #[test]
    fn view_shares_indices_with_backing_table() {
        let table = StringTable::new();
        let mut view = table.view(8);
        let via_view = view.intern("shared");
        let via_table = table.intern("shared");
        assert_eq!(via_view, via_table);
    }
}
