//! The canonical connection engine (spec §4.4): merges paginated pages into a
//! deduplicated, ordered union with anchored pageInfo.

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde_json::Value as Json;

use crate::compiler::plan::FieldPlan;
use crate::graph::{partial_from_record, Graph, PartialRecord};
use crate::value::{FieldValue, Record, RecordId};

/// `mode: "infinite" | "page"` (spec §4.1/§4.4) — reuses the compiled plan's
/// connection mode rather than redeclaring the same two variants.
pub use crate::compiler::plan::ConnectionMode as Mode;

/// Where a page sits relative to the connection's leader (spec §4.4
/// "Rebuild algorithm").
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
pub enum PageRole {
    #[strum(serialize = "before")]
    Before,
    #[strum(serialize = "leader")]
    Leader,
    #[strum(serialize = "after")]
    After,
}

/// Whether a page arrived from the network or was replayed from a cache
/// prewarm (spec §4.4 "Modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
pub enum Origin {
    #[strum(serialize = "cache")]
    Cache,
    #[strum(serialize = "network")]
    Network,
}

/// The `::meta` record's logical shape (spec §4.4 "State per canonical key").
#[derive(Debug, Clone, Default)]
pub struct CanonicalMeta {
    pub pages: Vec<RecordId>,
    pub leader: Option<RecordId>,
    pub hints: IndexMap<RecordId, PageRole>,
    pub origin: IndexMap<RecordId, Origin>,
}

impl CanonicalMeta {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("pages".to_owned(), FieldValue::Refs(self.pages.clone()));
        if let Some(leader) = &self.leader {
            record.insert("leader".to_owned(), FieldValue::Ref(leader.clone()));
        }
        let mut hints = IndexMap::new();
        for (id, role) in &self.hints {
            hints.insert(id.as_str().to_owned(), FieldValue::Scalar(Json::String(role.to_string())));
        }
        record.insert("hints".to_owned(), FieldValue::Object(hints));
        let mut origin = IndexMap::new();
        for (id, o) in &self.origin {
            origin.insert(id.as_str().to_owned(), FieldValue::Scalar(Json::String(o.to_string())));
        }
        record.insert("origin".to_owned(), FieldValue::Object(origin));
        record
    }

    fn from_record(record: &Record) -> Self {
        let pages = record
            .get("pages")
            .and_then(FieldValue::as_refs)
            .map(|ids| ids.to_vec())
            .unwrap_or_default();
        let leader = record.get("leader").and_then(FieldValue::as_ref_id).cloned();
        let hints = record
            .get("hints")
            .and_then(FieldValue::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| {
                        let role: PageRole = v.as_scalar()?.as_str()?.parse().ok()?;
                        Some((RecordId::from(k.as_str()), role))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let origin = record
            .get("origin")
            .and_then(FieldValue::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| {
                        let o: Origin = v.as_scalar()?.as_str()?.parse().ok()?;
                        Some((RecordId::from(k.as_str()), o))
                    })
                    .collect()
            })
            .unwrap_or_default();
        CanonicalMeta { pages, leader, hints, origin }
    }
}

/// Invoked by the normalizer after a page has been written (spec §4.3 step
/// 5e: "Invoke Canonical with `(planField, parentId, variables, pageKey,
/// pageSnapshot, origin="network")`"). A no-op for fields with no
/// `@connection` directive.
pub fn on_page_written(
    graph: &Graph,
    field: &FieldPlan,
    parent_id: &RecordId,
    variables: &IndexMap<String, Json>,
    page_id: &RecordId,
    origin: Origin,
) {
    let Some(meta) = &field.connection else { return };

    let canonical_key = RecordId::canonical(
        parent_id.as_str(),
        &meta.connection_key,
        &field.canonical_args_json(variables),
    );

    match meta.mode {
        Mode::Page => rebuild_page_mode(graph, &canonical_key, page_id),
        Mode::Infinite => rebuild_infinite_mode(graph, &canonical_key, field, variables, page_id, origin),
    }
}

fn args_bool_present(field: &FieldPlan, variables: &IndexMap<String, Json>, name: &str) -> bool {
    field
        .build_args(variables)
        .get(name)
        .map(|v| !v.is_null())
        .unwrap_or(false)
}

/// `mode: "page"` — the canonical record always mirrors the latest page
/// verbatim; no `::meta` record is kept (spec §4.4).
fn rebuild_page_mode(graph: &Graph, canonical_key: &RecordId, page_id: &RecordId) {
    let Some(page) = graph.get_record(page_id) else { return };
    write_canonical_from_pages(graph, canonical_key, &[page_id.clone()], &page);
}

/// `mode: "infinite"` — union semantics across all known pages (spec §4.4).
fn rebuild_infinite_mode(
    graph: &Graph,
    canonical_key: &RecordId,
    field: &FieldPlan,
    variables: &IndexMap<String, Json>,
    page_id: &RecordId,
    origin: Origin,
) {
    let has_after = args_bool_present(field, variables, "after");
    let has_before = args_bool_present(field, variables, "before");
    let is_leader = !has_after && !has_before;

    let meta_id = RecordId::canonical_meta(canonical_key);
    let mut meta = graph
        .get_record(&meta_id)
        .map(|r| CanonicalMeta::from_record(&r))
        .unwrap_or_default();

    if is_leader && origin == Origin::Network {
        // A network leader always collapses prior pages (spec: "collapse
        // happens only when a network leader arrives").
        meta.pages = vec![page_id.clone()];
        meta.leader = Some(page_id.clone());
        meta.hints = IndexMap::from([(page_id.clone(), PageRole::Leader)]);
        meta.origin = IndexMap::from([(page_id.clone(), origin)]);
    } else {
        if !meta.pages.contains(page_id) {
            meta.pages.push(page_id.clone());
        }
        meta.origin.insert(page_id.clone(), origin);
        if is_leader {
            // A cache-observed leader establishes `meta.leader` without
            // collapsing other pages.
            meta.leader = Some(page_id.clone());
            meta.hints.insert(page_id.clone(), PageRole::Leader);
        } else {
            let role = if has_before { PageRole::Before } else { PageRole::After };
            meta.hints.insert(page_id.clone(), role);
        }
    }

    graph.put_record(&meta_id, partial_from_record(meta.to_record()));

    let Some(page) = graph.get_record(page_id) else { return };
    let ordered = ordered_pages(&meta);
    write_canonical_from_pages(graph, canonical_key, &ordered, &page);
}

/// Orders pages per spec §4.4 step 1: before-pages outermost-first, then the
/// leader, then after-pages in insertion order. Unknown hints default to
/// "after".
fn ordered_pages(meta: &CanonicalMeta) -> Vec<RecordId> {
    let mut before = Vec::new();
    let mut after = Vec::new();
    for page in &meta.pages {
        if Some(page) == meta.leader.as_ref() {
            continue;
        }
        match meta.hints.get(page) {
            Some(PageRole::Before) => before.push(page.clone()),
            _ => after.push(page.clone()),
        }
    }
    before
        .into_iter()
        .rev()
        .chain(meta.leader.clone())
        .chain(after)
        .collect_vec()
}

/// Walks `pages` in order, builds the deduplicated edge list (spec §4.4 steps
/// 2–5), and emits the canonical record plus its pageInfo record.
fn write_canonical_from_pages(
    graph: &Graph,
    canonical_key: &RecordId,
    pages: &[RecordId],
    latest_page: &Record,
) {
    let mut seen_nodes: IndexMap<RecordId, RecordId> = IndexMap::new();
    let mut final_edges: Vec<RecordId> = Vec::new();
    let mut included: IndexSet<RecordId> = IndexSet::new();

    for page_id in pages {
        let Some(page) = graph.get_record(page_id) else { continue };
        let Some(edge_ids) = page.get("edges").and_then(FieldValue::as_refs) else { continue };
        for edge_id in edge_ids {
            if included.contains(edge_id) {
                continue;
            }
            let Some(edge_record) = graph.get_record(edge_id) else { continue };
            let node_ref = edge_record.get("node").and_then(FieldValue::as_ref_id);
            match node_ref.and_then(|n| seen_nodes.get(n)) {
                Some(retained_id) => {
                    // Later occurrence of an already-included node: refresh
                    // non-structural fields on the retained edge (spec I4).
                    let mut partial: PartialRecord = IndexMap::new();
                    for (key, value) in &edge_record {
                        if key == "node" || key == "__typename" {
                            continue;
                        }
                        partial.insert(key.clone(), Some(value.clone()));
                    }
                    graph.put_record(retained_id, partial);
                }
                None => {
                    if let Some(node_ref) = node_ref {
                        seen_nodes.insert(node_ref.clone(), edge_id.clone());
                    }
                    included.insert(edge_id.clone());
                    final_edges.push(edge_id.clone());
                }
            }
        }
    }

    let page_info_id = RecordId::page_info(canonical_key);
    if let (Some(first), Some(last)) = (pages.first(), pages.last()) {
        let first_info = graph.get_record(&RecordId::page_info(first)).unwrap_or_default();
        let last_info = graph.get_record(&RecordId::page_info(last)).unwrap_or_default();
        let mut page_info: PartialRecord = IndexMap::new();
        if let Some(v) = first_info.get("startCursor") {
            page_info.insert("startCursor".to_owned(), Some(v.clone()));
        }
        if let Some(v) = first_info.get("hasPreviousPage") {
            page_info.insert("hasPreviousPage".to_owned(), Some(v.clone()));
        }
        if let Some(v) = last_info.get("endCursor") {
            page_info.insert("endCursor".to_owned(), Some(v.clone()));
        }
        if let Some(v) = last_info.get("hasNextPage") {
            page_info.insert("hasNextPage".to_owned(), Some(v.clone()));
        }
        graph.put_record(&page_info_id, page_info);
    }

    let mut canonical: PartialRecord = IndexMap::new();
    canonical.insert(
        "__typename".to_owned(),
        Some(latest_page.get("__typename").cloned().unwrap_or(FieldValue::Null)),
    );
    canonical.insert("edges".to_owned(), Some(FieldValue::Refs(final_edges)));
    canonical.insert("pageInfo".to_owned(), Some(FieldValue::Ref(page_info_id)));
    for (key, value) in latest_page {
        if matches!(key.as_str(), "edges" | "pageInfo" | "__typename") {
            continue;
        }
        canonical.insert(key.clone(), Some(value.clone()));
    }
    graph.put_record(canonical_key, canonical);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::plan::ConnectionMeta;
    use crate::graph::IdentityConfig;
    use crate::value::Record;
    use serde_json::json;

    fn field_with_connection(name: &str) -> FieldPlan {
        FieldPlan {
            response_key: name.to_owned(),
            field_name: name.to_owned(),
            args: IndexMap::new(),
            selection: IndexMap::new(),
            connection: Some(ConnectionMeta {
                connection_key: name.to_owned(),
                mode: Mode::Infinite,
                filters: Vec::new(),
            }),
        }
    }

    fn write_page(graph: &Graph, page_id: &RecordId, node_ids: &[&str], start: &str, end: &str, prev: bool, next: bool) {
        let mut edge_ids = Vec::new();
        for (i, node) in node_ids.iter().enumerate() {
            let edge_id = RecordId::edge(page_id, i);
            let mut edge = Record::new();
            edge.insert("cursor".to_owned(), FieldValue::Scalar(json!(node)));
            edge.insert("node".to_owned(), FieldValue::Ref(RecordId::entity("Item", node)));
            graph.put_record(&edge_id, partial_from_record(edge));
            edge_ids.push(edge_id);
        }
        let page_info_id = RecordId::page_info(page_id);
        let mut page_info = Record::new();
        page_info.insert("startCursor".to_owned(), FieldValue::Scalar(json!(start)));
        page_info.insert("endCursor".to_owned(), FieldValue::Scalar(json!(end)));
        page_info.insert("hasPreviousPage".to_owned(), FieldValue::Scalar(json!(prev)));
        page_info.insert("hasNextPage".to_owned(), FieldValue::Scalar(json!(next)));
        graph.put_record(&page_info_id, partial_from_record(page_info));

        let mut page = Record::new();
        page.insert("__typename".to_owned(), FieldValue::Scalar(json!("ItemConnection")));
        page.insert("edges".to_owned(), FieldValue::Refs(edge_ids));
        page.insert("pageInfo".to_owned(), FieldValue::Ref(page_info_id));
        graph.put_record(page_id, partial_from_record(page));
    }

    #[test]
    fn before_leader_after_merge_dedups_and_orders() {
        // spec §8 scenario 3
        let graph = Graph::new(IdentityConfig::new());
        let parent = RecordId::root();
        let field = field_with_connection("items");
        let mut vars = IndexMap::new();

        let p1_2 = RecordId::connection(&parent, "items", r#"{"after":null,"first":2}"#);
        write_page(&graph, &p1_2, &["p1", "p2"], "p1", "p2", false, true);
        on_page_written(&graph, &field, &parent, &vars, &p1_2, Origin::Network);

        vars.insert("after".to_string(), json!("p2"));
        let p3_4 = RecordId::connection(&parent, "items", r#"{"after":"p2","first":2}"#);
        write_page(&graph, &p3_4, &["p3", "p4"], "p3", "p4", true, true);
        on_page_written(&graph, &field, &parent, &vars, &p3_4, Origin::Network);

        let p0 = RecordId::connection(&parent, "items", r#"{"before":"p3","last":1}"#);
        write_page(&graph, &p0, &["p0"], "p0", "p0", true, false);
        let mut vars_before = IndexMap::new();
        vars_before.insert("before".to_string(), json!("p3"));
        on_page_written(&graph, &field, &parent, &vars_before, &p0, Origin::Network);

        let canonical_key = RecordId::canonical(parent.as_str(), "items", "{}");
        let canonical = graph.get_record(&canonical_key).unwrap();
        let edges = canonical.get("edges").unwrap().as_refs().unwrap();
        assert_eq!(edges.len(), 5);

        let page_info = graph.get_record(&RecordId::page_info(&canonical_key)).unwrap();
        assert_eq!(page_info.get("startCursor").unwrap().as_scalar().unwrap(), "p0");
        assert_eq!(page_info.get("endCursor").unwrap().as_scalar().unwrap(), "p4");
        assert_eq!(page_info.get("hasPreviousPage").unwrap().as_scalar().unwrap(), true);
        assert_eq!(page_info.get("hasNextPage").unwrap().as_scalar().unwrap(), true);
    }

    #[test]
    fn explicit_connection_key_overrides_field_name_in_canonical_id() {
        use crate::compiler::Compiler;
        use crate::graph::IdentityConfig as GraphIdentity;

        let compiler = Compiler::new();
        let graph = Graph::new(GraphIdentity::new());
        let plan = compiler
            .compile(r#"query { feed(first: 1) @connection(key: "timeline") { edges { node { id } } } }"#)
            .unwrap();
        let vars = IndexMap::new();
        let data = json!({
            "feed": {
                "__typename": "ItemConnection",
                "edges": [{"cursor": "a", "node": {"__typename": "Item", "id": "a"}}],
                "pageInfo": {"startCursor": "a", "endCursor": "a", "hasPreviousPage": false, "hasNextPage": false}
            }
        });
        crate::normalizer::normalize_document(&graph, &plan, &vars, &data);

        let by_directive_key = RecordId::canonical(RecordId::root().as_str(), "timeline", "{}");
        let by_field_name = RecordId::canonical(RecordId::root().as_str(), "feed", "{}");
        assert!(graph.has_record(&by_directive_key));
        assert!(!graph.has_record(&by_field_name));
    }

    #[test]
    fn network_leader_collapses_prior_pages() {
        let graph = Graph::new(IdentityConfig::new());
        let parent = RecordId::root();
        let field = field_with_connection("items");
        let vars = IndexMap::new();

        let p1 = RecordId::connection(&parent, "items", r#"{"first":1}"#);
        write_page(&graph, &p1, &["a"], "a", "a", false, true);
        on_page_written(&graph, &field, &parent, &vars, &p1, Origin::Network);

        let p2 = RecordId::connection(&parent, "items", r#"{"first":1,"seed":2}"#);
        write_page(&graph, &p2, &["b"], "b", "b", false, false);
        on_page_written(&graph, &field, &parent, &vars, &p2, Origin::Network);

        let canonical_key = RecordId::canonical(parent.as_str(), "items", "{}");
        let canonical = graph.get_record(&canonical_key).unwrap();
        let edges = canonical.get("edges").unwrap().as_refs().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0], RecordId::edge(&p2, 0));
    }
}
