//! Document-guided write: entities, pages, edges, and connections
//! (spec §4.3).
//!
//! The recursive dispatch mirrors the teacher's selection walk in
//! `query_plan/operation.rs` (recurse into a sub-selection per matched
//! field), generalized from "expand a selection for planning" to "write a
//! selection's value into the store".

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::canonical;
use crate::compiler::plan::{Plan, SelectionSetPlan};
use crate::graph::{partial_from_record, Graph, PartialRecord};
use crate::value::{FieldValue, Record, RecordId};

/// `normalizeDocument({document, variables, data})` (spec §4.3).
pub fn normalize_document(graph: &Graph, plan: &Plan, variables: &IndexMap<String, Json>, data: &Json) {
    let root = RecordId::root();
    ensure_root_exists(graph, &root);
    let Json::Object(data) = data else {
        return;
    };
    write_selection_set(graph, &root, &plan.root, variables, data);
}

fn ensure_root_exists(graph: &Graph, root: &RecordId) {
    if graph.has_record(root) {
        return;
    }
    let mut record = Record::new();
    record.insert("id".to_owned(), FieldValue::Scalar(Json::String("@".to_owned())));
    record.insert("__typename".to_owned(), FieldValue::Scalar(Json::String("@".to_owned())));
    graph.put_record(root, partial_from_record(record));
}

/// `writeFragment({id, fragment, data, variables})` (spec §4.6): writes the
/// root entity (merge) and, for each arg'd field, stores the subtree at
/// `id.field(args)` — exactly [`write_selection_set`]'s per-field dispatch,
/// just rooted at an arbitrary entity id instead of `"@"`.
pub fn write_fragment(graph: &Graph, id: &RecordId, selection: &SelectionSetPlan, variables: &IndexMap<String, Json>, data: &Json) {
    let Json::Object(data) = data else {
        return;
    };
    write_selection_set(graph, id, selection, variables, data);
}

/// Writes every selection in `selections` whose response key is present in
/// `data` onto `parent_id` (spec §4.3 step 2 onward).
fn write_selection_set(
    graph: &Graph,
    parent_id: &RecordId,
    selections: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    data: &serde_json::Map<String, Json>,
) {
    let mut parent_partial: PartialRecord = IndexMap::new();

    for field in selections.values() {
        let Some(value) = data.get(&field.response_key) else {
            continue;
        };

        let field_key = if field.has_args() {
            format!("{}({})", field.field_name, field.stringify_args(variables))
        } else {
            field.field_name.clone()
        };

        if field.is_connection() {
            if let Json::Object(page_data) = value {
                let page_ref = write_connection(graph, parent_id, field, variables, page_data);
                parent_partial.insert(field_key, Some(FieldValue::Ref(page_ref)));
            } else if value.is_null() {
                parent_partial.insert(field_key, Some(FieldValue::Null));
            }
            continue;
        }

        let written = write_value(graph, parent_id, &field_key, &field.selection, variables, value);
        parent_partial.insert(field_key, Some(written));
    }

    if !parent_partial.is_empty() {
        graph.put_record(parent_id, parent_partial);
    }
}

/// Writes an arbitrary field value, recursing into entities/inline objects
/// and leaving scalars/arrays-of-scalars inline (spec §4.3 steps 3–4).
fn write_value(
    graph: &Graph,
    parent_id: &RecordId,
    field_key: &str,
    sub_selection: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    value: &Json,
) -> FieldValue {
    match value {
        Json::Null => FieldValue::Null,
        Json::Object(obj) => write_object(graph, parent_id, field_key, sub_selection, variables, obj),
        Json::Array(items) => FieldValue::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let nested_key = format!("{field_key}:{i}");
                    write_value(graph, parent_id, &nested_key, sub_selection, variables, item)
                })
                .collect(),
        ),
        scalar => FieldValue::Scalar(scalar.clone()),
    }
}

fn write_object(
    graph: &Graph,
    parent_id: &RecordId,
    field_key: &str,
    sub_selection: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    obj: &serde_json::Map<String, Json>,
) -> FieldValue {
    let as_record = json_object_to_record(obj);
    if let Some(entity_id) = graph.identify(&as_record) {
        // Entity object (spec §4.3 step 3): write as its own record, merge,
        // and reference it.
        write_selection_set(graph, &entity_id, sub_selection, variables, obj);
        write_scalar_only_fields(graph, &entity_id, obj, sub_selection);
        return FieldValue::Ref(entity_id);
    }

    // Inline object with no identity (spec §4.3 step 4): a nested record at
    // a structural path.
    let nested_id = RecordId::nested(parent_id, field_key, "");
    write_selection_set(graph, &nested_id, sub_selection, variables, obj);
    write_scalar_only_fields(graph, &nested_id, obj, sub_selection);
    FieldValue::Ref(nested_id)
}

/// Writes fields present in `obj` that the plan's sub-selection doesn't name
/// (e.g. `__typename` when the document didn't explicitly select it) so the
/// record still carries the data needed to re-identify it later.
fn write_scalar_only_fields(
    graph: &Graph,
    record_id: &RecordId,
    obj: &serde_json::Map<String, Json>,
    sub_selection: &SelectionSetPlan,
) {
    let mut extra: PartialRecord = IndexMap::new();
    for key in ["__typename", "id"] {
        if sub_selection.contains_key(key) {
            continue;
        }
        if let Some(value) = obj.get(key) {
            extra.insert(key.to_owned(), Some(FieldValue::from_json(value)));
        }
    }
    if !extra.is_empty() {
        graph.put_record(record_id, extra);
    }
}

fn json_object_to_record(obj: &serde_json::Map<String, Json>) -> Record {
    let mut record = Record::new();
    for (k, v) in obj {
        record.insert(k.clone(), FieldValue::from_json(v));
    }
    record
}

/// Writes a connection's page, edges, and pageInfo, then hands the page off
/// to the canonical engine (spec §4.3 step 5).
fn write_connection(
    graph: &Graph,
    parent_id: &RecordId,
    field: &crate::compiler::plan::FieldPlan,
    variables: &IndexMap<String, Json>,
    page_data: &serde_json::Map<String, Json>,
) -> RecordId {
    let full_args = field.stringify_args(variables);
    let page_id = RecordId::connection(parent_id, &field.field_name, &full_args);

    let edges_selection = field
        .selection
        .get("edges")
        .map(|f| &f.selection)
        .cloned()
        .unwrap_or_default();
    let page_info_selection = field
        .selection
        .get("pageInfo")
        .map(|f| &f.selection)
        .cloned()
        .unwrap_or_default();
    let node_selection = edges_selection
        .get("node")
        .map(|f| &f.selection)
        .cloned()
        .unwrap_or_default();

    let mut edge_ids = Vec::new();
    if let Some(Json::Array(edges)) = page_data.get("edges") {
        for (index, edge) in edges.iter().enumerate() {
            let Json::Object(edge_obj) = edge else { continue };
            let edge_id = RecordId::edge(&page_id, index);
            let mut edge_partial: PartialRecord = IndexMap::new();
            for (key, value) in edge_obj {
                if key == "node" {
                    continue;
                }
                edge_partial.insert(key.clone(), Some(FieldValue::from_json(value)));
            }
            // Missing `node` leaves the edge without a `__ref` until a
            // later write supplies it (spec §4.3 edge cases).
            if let Some(node_value) = edge_obj.get("node") {
                let written = write_value(
                    graph,
                    &edge_id,
                    "node",
                    &node_selection,
                    variables,
                    node_value,
                );
                edge_partial.insert("node".to_owned(), Some(written));
            }
            graph.put_record(&edge_id, edge_partial);
            edge_ids.push(edge_id);
        }
    }

    let page_info_id = RecordId::page_info(&page_id);
    if let Some(page_info_value) = page_data.get("pageInfo") {
        if let Json::Object(page_info_obj) = page_info_value {
            // pageInfo always lives at the dedicated `<page>.pageInfo` id
            // (not the generic nested-object path) so materializer reads
            // via `RecordId::page_info` find what the normalizer wrote.
            write_selection_set(graph, &page_info_id, &page_info_selection, variables, page_info_obj);
            write_scalar_only_fields(graph, &page_info_id, page_info_obj, &page_info_selection);
            let mut page_partial: PartialRecord = IndexMap::new();
            page_partial.insert("pageInfo".to_owned(), Some(FieldValue::Ref(page_info_id.clone())));
            graph.put_record(&page_id, page_partial);
        }
    } else {
        // No pageInfo in the payload: still create an empty record so reads
        // get a stable, if empty, reference (spec boundary: "pageInfo
        // reflects nulls").
        graph.put_record(&page_info_id, IndexMap::new());
        let mut page_partial: PartialRecord = IndexMap::new();
        page_partial.insert("pageInfo".to_owned(), Some(FieldValue::Ref(page_info_id.clone())));
        graph.put_record(&page_id, page_partial);
    }

    let mut page_partial: PartialRecord = IndexMap::new();
    page_partial.insert(
        "__typename".to_owned(),
        page_data
            .get("__typename")
            .map(|v| Some(FieldValue::from_json(v)))
            .unwrap_or(Some(FieldValue::Scalar(Json::String("Connection".to_owned())))),
    );
    page_partial.insert(
        "edges".to_owned(),
        Some(FieldValue::Refs(edge_ids)),
    );
    for (key, value) in page_data {
        if matches!(key.as_str(), "edges" | "pageInfo" | "__typename") {
            continue;
        }
        page_partial.insert(key.clone(), Some(FieldValue::from_json(value)));
    }
    graph.put_record(&page_id, page_partial);

    canonical::on_page_written(
        graph,
        field,
        parent_id,
        variables,
        &page_id,
        canonical::Origin::Network,
    );

    page_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::graph::IdentityConfig;
    use serde_json::json;

    fn setup() -> (Compiler, Graph) {
        (Compiler::new(), Graph::new(IdentityConfig::new()))
    }

    #[test]
    fn single_entity_scenario() {
        // spec §8 scenario 1
        let (compiler, graph) = setup();
        let plan = compiler.compile(r#"query($id: ID!) { user(id: $id) { id email } }"#).unwrap();
        let mut vars = IndexMap::new();
        vars.insert("id".to_string(), json!("u1"));
        let data = json!({"user": {"__typename": "User", "id": "u1", "email": "a"}});

        normalize_document(&graph, &plan, &vars, &data);

        let root = graph.get_record(&RecordId::root()).unwrap();
        let key = r#"user({"id":"u1"})"#;
        assert_eq!(root.get(key).unwrap().as_ref_id().unwrap().as_str(), "User:u1");

        let user = graph.get_record(&RecordId::entity("User", "u1")).unwrap();
        assert_eq!(user.get("email").unwrap().as_scalar().unwrap(), "a");
    }

    #[test]
    fn writing_same_payload_twice_does_not_bump_version() {
        let (compiler, graph) = setup();
        let plan = compiler.compile(r#"query { user(id: "u1") { id email } }"#).unwrap();
        let vars = IndexMap::new();
        let data = json!({"user": {"__typename": "User", "id": "u1", "email": "a"}});
        normalize_document(&graph, &plan, &vars, &data);
        let v1 = graph.version(&RecordId::entity("User", "u1"));
        normalize_document(&graph, &plan, &vars, &data);
        let v2 = graph.version(&RecordId::entity("User", "u1"));
        assert_eq!(v1, v2);
    }
}
