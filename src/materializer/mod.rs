//! Plan-guided reactive reads (spec §4.5): `materializeDocument`,
//! `readFragment`, `materializeEntity`.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::compiler::plan::{FieldPlan, Plan, SelectionSetPlan};
use crate::graph::{Graph, RecordProxy, WatcherId};
use crate::value::{FieldValue, RecordId};

/// `decisionMode: "canonical" | "strict"` (spec §4.5). Canonical reads are
/// the default — strict is reserved for tests, page-mode UIs, and
/// deterministic cold reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString)]
pub enum DecisionMode {
    #[default]
    #[strum(serialize = "canonical")]
    Canonical,
    #[strum(serialize = "strict")]
    Strict,
}

/// `materializeDocument({document, variables}) -> T` (spec §4.5). `watcher`,
/// when present, has every record transitively read registered as one of its
/// dependencies via [`Graph::watchers`].
pub fn materialize_document(
    graph: &Graph,
    plan: &Plan,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Json {
    read_record(graph, &RecordId::root(), &plan.root, variables, watcher, mode)
}

/// `readFragment({id, fragment, variables})` (spec §4.6).
pub fn read_fragment(
    graph: &Graph,
    id: &RecordId,
    selection: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Json {
    read_record(graph, id, selection, variables, watcher, mode)
}

/// `materializeEntity(id)` (spec §4.5) — the live proxy of a specific
/// record, independent of any plan.
pub fn materialize_entity(graph: &Graph, id: &RecordId) -> Rc<RecordProxy> {
    graph.materialize_record(id)
}

fn read_record(
    graph: &Graph,
    id: &RecordId,
    selection: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Json {
    if let Some(watcher) = watcher {
        graph.watchers().track_dependency(watcher, id.clone());
    }
    let proxy = graph.materialize_record(id);
    read_selection_set(graph, &proxy, selection, variables, watcher, mode)
}

fn read_selection_set(
    graph: &Graph,
    proxy: &RecordProxy,
    selections: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Json {
    let mut object = serde_json::Map::with_capacity(selections.len());
    for field in selections.values() {
        let value = if field.is_connection() {
            read_connection(graph, proxy.id(), field, variables, watcher, mode)
        } else {
            let field_key = if field.has_args() {
                format!("{}({})", field.field_name, field.stringify_args(variables))
            } else {
                field.field_name.clone()
            };
            match proxy.get(&field_key) {
                Some(raw) => read_value(graph, &raw, &field.selection, variables, watcher, mode),
                None => Json::Null,
            }
        };
        object.insert(field.response_key.clone(), value);
    }
    Json::Object(object)
}

/// Projects a stored [`FieldValue`] into its JSON read shape, recursing into
/// refs/ref-lists and tracking per-element dependencies (spec §4.5
/// "Reactivity").
fn read_value(
    graph: &Graph,
    value: &FieldValue,
    sub_selection: &SelectionSetPlan,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Json {
    match value {
        FieldValue::Null => Json::Null,
        FieldValue::Scalar(v) => v.clone(),
        FieldValue::Ref(id) => read_record(graph, id, sub_selection, variables, watcher, mode),
        FieldValue::Refs(ids) => Json::Array(
            ids.iter()
                .map(|id| read_record(graph, id, sub_selection, variables, watcher, mode))
                .collect(),
        ),
        FieldValue::Object(fields) => {
            if sub_selection.is_empty() {
                return value.to_json();
            }
            let mut object = serde_json::Map::with_capacity(sub_selection.len());
            for field in sub_selection.values() {
                let raw = fields.get(&field.response_key);
                let projected = match raw {
                    Some(v) => read_value(graph, v, &field.selection, variables, watcher, mode),
                    None => Json::Null,
                };
                object.insert(field.response_key.clone(), projected);
            }
            Json::Object(object)
        }
        FieldValue::List(items) => Json::Array(
            items
                .iter()
                .map(|item| read_value(graph, item, sub_selection, variables, watcher, mode))
                .collect(),
        ),
    }
}

/// Resolves a `@connection` field to the page it should read from: the
/// canonical union (falling back to the single concrete page when no
/// canonical record exists yet) or, in strict mode, the exact concrete page
/// matching `variables` (spec §4.5 "Decision modes").
fn read_connection(
    graph: &Graph,
    parent_id: &RecordId,
    field: &FieldPlan,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Json {
    let concrete_key = RecordId::connection(parent_id, &field.field_name, &field.stringify_args(variables));

    let page_id = match mode {
        DecisionMode::Strict => concrete_key,
        DecisionMode::Canonical => {
            // `read_connection` is only reached for `@connection` fields, so
            // `field.connection` is always present here.
            let connection_key = field
                .connection
                .as_ref()
                .map(|meta| meta.connection_key.as_str())
                .unwrap_or(&field.field_name);
            let canonical_key = RecordId::canonical(
                parent_id.as_str(),
                connection_key,
                &field.canonical_args_json(variables),
            );
            if graph.has_record(&canonical_key) {
                canonical_key
            } else {
                concrete_key
            }
        }
    };

    if !graph.has_record(&page_id) {
        return Json::Null;
    }
    read_record(graph, &page_id, &field.selection, variables, watcher, mode)
}
