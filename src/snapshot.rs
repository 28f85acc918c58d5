//! The dehydrate/hydrate wire format (spec §6, I6, P2).

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::value::{Record, RecordId};

/// `dehydrate() -> Snapshot` (spec §6): `{records: Array<[RecordId, Record]>}`,
/// JSON-serializable as-is since [`RecordId`] and [`crate::value::FieldValue`]
/// both round-trip through `serde`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<(RecordId, Record)>,
}

/// `dehydrate()` — a point-in-time copy of the full store (spec I6).
pub fn dehydrate(graph: &Graph) -> Snapshot {
    let records = graph
        .keys()
        .into_iter()
        .filter_map(|id| graph.get_record(&id).map(|record| (id, record)))
        .collect();
    Snapshot { records }
}

/// `hydrate(snapshot)` — clears the store and restores records (spec §6).
/// Malformed entries are dropped rather than failing the whole call (spec §7
/// "hydrate accepts garbage"); since [`Snapshot`] is already typed, the only
/// garbage that can reach here from raw JSON is handled in
/// [`hydrate_from_json`].
pub fn hydrate(graph: &Graph, snapshot: Snapshot) {
    graph.clear();
    for (id, record) in snapshot.records {
        graph.restore_record(id, record);
    }
}

/// Hydrates from untyped JSON, tolerating the malformed shapes spec §7
/// describes (null entries, non-object snapshots, missing fields) by
/// skipping them instead of failing.
pub fn hydrate_from_json(graph: &Graph, raw: &serde_json::Value) {
    graph.clear();
    let Some(records) = raw.get("records").and_then(|v| v.as_array()) else {
        return;
    };
    for entry in records {
        let Some(pair) = entry.as_array() else { continue };
        if pair.len() != 2 {
            continue;
        }
        let Some(id_str) = pair[0].as_str() else { continue };
        let Some(fields) = pair[1].as_object() else { continue };
        let mut record = Record::new();
        for (key, value) in fields {
            record.insert(key.clone(), crate::value::FieldValue::from_json(value));
        }
        graph.restore_record(RecordId::from(id_str), record);
    }
}

/// The streaming form of `hydrate` (spec §6 "a function receives an emit
/// callback and delivers snapshot(s)"), modeled as a synchronous callback
/// since the core offers no async runtime (§5). Each emitted snapshot is
/// merged additively rather than clearing the store, matching a source that
/// delivers the store in chunks.
pub fn hydrate_stream(graph: &Graph, emitter: impl FnOnce(&mut dyn FnMut(Snapshot))) {
    graph.clear();
    emitter(&mut |snapshot: Snapshot| {
        for (id, record) in snapshot.records {
            graph.restore_record(id, record);
        }
    });
}
