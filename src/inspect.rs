//! Administrative enumeration over the store (spec §6 `inspect`): entities
//! by typename, fetch by id, list connection/canonical keys, dump the whole
//! store.

use crate::graph::Graph;
use crate::value::{Record, RecordId};

/// All record ids recognized as entities (`Typename:id`) whose typename
/// equals `typename`.
pub fn entities_by_typename(graph: &Graph, typename: &str) -> Vec<RecordId> {
    graph
        .keys()
        .into_iter()
        .filter(|id| id.entity_typename() == Some(typename))
        .collect()
}

/// `inspect.get(id)` — a direct snapshot fetch, the same shape `getRecord`
/// returns.
pub fn get(graph: &Graph, id: &RecordId) -> Option<Record> {
    graph.get_record(id)
}

/// Every concrete connection page key currently in the store (`<parent>.
/// <field>(<argsJSON>)`, excluding canonical/meta/pageInfo/edge records).
pub fn connection_keys(graph: &Graph) -> Vec<RecordId> {
    graph
        .keys()
        .into_iter()
        .filter(|id| {
            let s = id.as_str();
            s.contains('(') && !s.starts_with("@connection.") && !s.ends_with(".pageInfo") && !s.contains(".edges:")
        })
        .collect()
}

/// Every canonical connection key (`@connection.<path>.<field>(<filtersJSON>)`),
/// excluding its `::meta` and `.pageInfo` satellites.
pub fn canonical_keys(graph: &Graph) -> Vec<RecordId> {
    graph
        .keys()
        .into_iter()
        .filter(|id| {
            let s = id.as_str();
            s.starts_with("@connection.") && !s.ends_with("::meta") && !s.ends_with(".pageInfo")
        })
        .collect()
}

/// A full dump of every record currently in the store, for debugging —
/// the same data `dehydrate` serializes, but as live pairs rather than a
/// wire `Snapshot`.
pub fn dump(graph: &Graph) -> Vec<(RecordId, Record)> {
    graph
        .keys()
        .into_iter()
        .filter_map(|id| graph.get_record(&id).map(|record| (id, record)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{partial_from_record, IdentityConfig};
    use crate::value::FieldValue;
    use serde_json::json;

    #[test]
    fn entities_by_typename_filters_structural_ids() {
        let graph = Graph::new(IdentityConfig::new());
        let user = RecordId::entity("User", "u1");
        let mut record = Record::new();
        record.insert("name".to_string(), FieldValue::Scalar(json!("a")));
        graph.put_record(&user, partial_from_record(record));

        let page = RecordId::connection(&RecordId::root(), "users", "{}");
        graph.put_record(&page, partial_from_record(Record::new()));

        assert_eq!(entities_by_typename(&graph, "User"), vec![user]);
        assert!(entities_by_typename(&graph, "Page").is_empty());
    }

    #[test]
    fn connection_and_canonical_keys_are_distinguished() {
        let graph = Graph::new(IdentityConfig::new());
        let page = RecordId::connection(&RecordId::root(), "users", r#"{"first":1}"#);
        graph.put_record(&page, partial_from_record(Record::new()));
        let canonical = RecordId::canonical("@", "users", "{}");
        graph.put_record(&canonical, partial_from_record(Record::new()));
        let meta = RecordId::canonical_meta(&canonical);
        graph.put_record(&meta, partial_from_record(Record::new()));

        assert_eq!(connection_keys(&graph), vec![page]);
        assert_eq!(canonical_keys(&graph), vec![canonical]);
    }
}
