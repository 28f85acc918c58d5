//! Layered transactional mutations with revert (spec §4, "Optimistic"; §8 P6).
//!
//! `modify_optimistic` records, for every record a layer's writes touch, the
//! exact pre-layer snapshot (or its absence). `commit` leaves those writes in
//! place; `revert` restores every touched record — including any canonical
//! connection and `::meta` record the write touched, since those are
//! ordinary records in the same store — to what it held before the layer ran.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::graph::{Capture, Graph};
use crate::value::RecordId;

/// The handle returned by [`modify_optimistic`] (spec §6
/// `modifyOptimistic(build) -> {commit(), revert()}`).
pub struct OptimisticLayer<'a> {
    graph: &'a Graph,
    capture: Capture,
}

impl<'a> OptimisticLayer<'a> {
    /// Leaves the layer's writes in the store permanently.
    pub fn commit(self) {}

    /// Restores every record the layer touched to its pre-layer state.
    pub fn revert(self) {
        let captured: IndexMap<RecordId, Option<crate::value::Record>> =
            self.capture.borrow().clone();
        for (id, record) in captured {
            self.graph.restore_snapshot(&id, record);
        }
    }
}

/// `modifyOptimistic(build)` (spec §6): runs `build` with exclusive capture
/// of every record it writes through `graph`, then returns a layer the
/// caller can commit or revert.
pub fn modify_optimistic<'a>(graph: &'a Graph, build: impl FnOnce(&Graph)) -> OptimisticLayer<'a> {
    let capture: Capture = Rc::new(std::cell::RefCell::new(IndexMap::new()));
    graph.push_capture(capture.clone());
    build(graph);
    graph.pop_capture();
    OptimisticLayer { graph, capture }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Origin;
    use crate::compiler::Compiler;
    use crate::graph::{partial_from_record, IdentityConfig};
    use crate::normalizer::normalize_document;
    use crate::value::{FieldValue, Record};
    use serde_json::json;

    #[test]
    fn add_and_revert_restores_prior_state() {
        // spec §8 scenario 6
        let compiler = Compiler::new();
        let graph = Graph::new(IdentityConfig::new());
        let plan = compiler
            .compile(r#"query { posts(first: 1) @connection(key: "posts") { edges { cursor node { id title } } pageInfo { hasNextPage } } }"#)
            .unwrap();
        let vars = IndexMap::new();
        let data = json!({
            "posts": {
                "__typename": "PostConnection",
                "edges": [{"cursor": "1", "node": {"__typename": "Post", "id": "1", "title": "first"}}],
                "pageInfo": {"hasNextPage": false}
            }
        });
        normalize_document(&graph, &plan, &vars, &data);

        let page_key = RecordId::connection(&RecordId::root(), "posts", r#"{"first":1}"#);
        let before_edges = graph.get_record(&page_key).unwrap().get("edges").unwrap().as_refs().unwrap().to_vec();
        assert_eq!(before_edges.len(), 1);

        let layer = modify_optimistic(&graph, |g| {
            let post9 = RecordId::entity("Post", "9");
            let mut post = Record::new();
            post.insert("title".to_string(), FieldValue::Scalar(json!("optimistic")));
            g.put_record(&post9, partial_from_record(post));

            let new_edge = RecordId::edge(&page_key, 99);
            let mut edge = Record::new();
            edge.insert("cursor".to_string(), FieldValue::Scalar(json!("9")));
            edge.insert("node".to_string(), FieldValue::Ref(post9));
            g.put_record(&new_edge, partial_from_record(edge));

            let mut new_edges = vec![new_edge];
            new_edges.extend(before_edges.clone());
            let mut page_partial = crate::graph::PartialRecord::new();
            page_partial.insert("edges".to_string(), Some(FieldValue::Refs(new_edges)));
            g.put_record(&page_key, page_partial);
        });

        assert_eq!(graph.get_record(&page_key).unwrap().get("edges").unwrap().as_refs().unwrap().len(), 2);
        assert!(graph.has_record(&RecordId::entity("Post", "9")));

        layer.revert();

        assert!(!graph.has_record(&RecordId::entity("Post", "9")));
        assert_eq!(
            graph.get_record(&page_key).unwrap().get("edges").unwrap().as_refs().unwrap(),
            &before_edges[..]
        );
    }

    #[test]
    fn commit_leaves_writes_in_place() {
        let graph = Graph::new(IdentityConfig::new());
        let id = RecordId::entity("User", "u1");
        let layer = modify_optimistic(&graph, |g| {
            let mut record = Record::new();
            record.insert("name".to_string(), FieldValue::Scalar(json!("a")));
            g.put_record(&id, partial_from_record(record));
        });
        layer.commit();
        assert!(graph.has_record(&id));
    }

    #[test]
    fn revert_on_canonical_connection_restores_prior_union() {
        let compiler = Compiler::new();
        let graph = Graph::new(IdentityConfig::new());
        let plan = compiler
            .compile(
                r#"query($after: String) { posts(first: 1, after: $after) @connection(key: "posts") { edges { node { id } } pageInfo { hasNextPage } } }"#,
            )
            .unwrap();
        let vars = IndexMap::new();
        let data = json!({
            "posts": {
                "__typename": "PostConnection",
                "edges": [{"cursor": "1", "node": {"__typename": "Post", "id": "1"}}],
                "pageInfo": {"hasNextPage": false}
            }
        });
        normalize_document(&graph, &plan, &vars, &data);
        let field = &plan.root["posts"];
        let canonical_key = RecordId::canonical("@", "posts", &field.canonical_args_json(&vars));
        let before = graph.get_record(&canonical_key).unwrap();

        let layer = modify_optimistic(&graph, |g| {
            let second_page = RecordId::connection(&RecordId::root(), "posts", r#"{"after":"1","first":1}"#);
            let mut edge = Record::new();
            edge.insert("node".to_string(), FieldValue::Ref(RecordId::entity("Post", "2")));
            let edge_id = RecordId::edge(&second_page, 0);
            g.put_record(&edge_id, partial_from_record(edge));
            let mut page = Record::new();
            page.insert("__typename".to_string(), FieldValue::Scalar(json!("PostConnection")));
            page.insert("edges".to_string(), FieldValue::Refs(vec![edge_id]));
            g.put_record(&second_page, partial_from_record(page));

            let mut after_vars = IndexMap::new();
            after_vars.insert("after".to_string(), json!("1"));
            crate::canonical::on_page_written(g, field, &RecordId::root(), &after_vars, &second_page, Origin::Network);
        });

        assert_eq!(graph.get_record(&canonical_key).unwrap().get("edges").unwrap().as_refs().unwrap().len(), 2);

        layer.revert();

        assert_eq!(graph.get_record(&canonical_key).unwrap(), before);
    }
}
