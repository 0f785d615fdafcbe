use tracewtf::{TraceManager, TraceManagerSettings};

/// A manager with a small buffer, handy for wraparound-sensitive tests.
pub fn manager_with_buffer_bytes(bytes: usize) -> TraceManager {
    TraceManager::new("tracewtf-tests", TraceManagerSettings { default_buffer_bytes: bytes, ..Default::default() })
        .expect("valid settings")
}

pub fn manager() -> TraceManager {
    TraceManager::new("tracewtf-tests", TraceManagerSettings::default()).expect("valid settings")
}

/// Decodes a `Recorder::dump` buffer back into `(wire_id, timestamp, args)` triples.
pub fn parse_dump(bytes: &[u8]) -> Vec<(u32, u32, Vec<u32>)> {
    let mut words = bytes.chunks_exact(4).map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()));
    let mut records = Vec::new();
    while let Some(wire_id) = words.next() {
        let Some(timestamp) = words.next() else { break };
        let n = tracewtf::recorder::arg_count(wire_id);
        let args: Vec<u32> = (0..n).filter_map(|_| words.next()).collect();
        records.push((wire_id, timestamp, args));
    }
    records
}
