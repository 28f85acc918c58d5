//! A normalized, reactive client-side cache for GraphQL responses.
//!
//! [`Cache`] ingests query/mutation/subscription results, decomposes them
//! into a flat store of records addressed by stable identity, and
//! re-materializes arbitrary queries and fragments from that store with live
//! propagation: when a constituent record changes, every view that
//! transitively depends on it observes the change without re-running the
//! network request. Relay-style paginated connections get a specialized,
//! deduplicated *canonical* union across pages while each concrete page keeps
//! its literal shape.
//!
//! The cache is `!Send`/`!Sync` — it runs single-threaded and cooperatively,
//! the same way the teacher's `Supergraph` composition runs synchronously on
//! one thread; there is no internal locking to reason about.

pub mod canonical;
pub mod compiler;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod inspect;
pub mod materializer;
pub mod normalizer;
pub mod optimistic;
pub mod snapshot;
pub mod value;

use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;

pub use compiler::Compiler;
pub use error::CacheError;
pub use graph::{Graph, IdentityConfig, RecordProxy, WatcherFn, WatcherId};
pub use materializer::DecisionMode;
pub use optimistic::OptimisticLayer;
pub use snapshot::Snapshot;
pub use value::{Record, RecordId};

/// The cache facade: ties the compiler, the record store, and the
/// normalizer/canonical/materializer/optimistic subsystems together into the
/// public surface spec §6 describes.
///
/// Mirrors the teacher's `Supergraph` — a struct that owns its subsystems and
/// exposes thin inherent methods delegating to free functions in their
/// modules, rather than re-implementing logic at this layer.
pub struct Cache {
    graph: Graph,
    compiler: Compiler,
    hydrating: Cell<bool>,
}

impl Cache {
    pub fn new(identity: IdentityConfig) -> Self {
        Cache {
            graph: Graph::new(identity),
            compiler: Compiler::new(),
            hydrating: Cell::new(false),
        }
    }

    /// Direct access to the underlying store — used by adapters that need to
    /// drive `put_record`/watchers directly (e.g. an optimistic `build`
    /// closure).
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// `identify(obj) -> id | null` (spec §6).
    pub fn identify(&self, obj: &Record) -> Option<RecordId> {
        self.graph.identify(obj)
    }

    /// `readQuery({query, variables, decisionMode}) -> {data}` (spec §6).
    /// Never fails on absent data; only a malformed `query` document can
    /// return `Err` (spec §7: malformed documents are a caller usage error,
    /// not absorbed like absent records).
    pub fn read_query(
        &self,
        query: &str,
        variables: &IndexMap<String, Json>,
        watcher: Option<WatcherId>,
        mode: DecisionMode,
    ) -> Result<Json, CacheError> {
        let plan = self.compiler.compile(query)?;
        Ok(materializer::materialize_document(&self.graph, &plan, variables, watcher, mode))
    }

    /// `writeQuery({query, variables, data})` (spec §6).
    pub fn write_query(&self, query: &str, variables: &IndexMap<String, Json>, data: &Json) -> Result<(), CacheError> {
        let plan = self.compiler.compile(query)?;
        normalizer::normalize_document(&self.graph, &plan, variables, data);
        Ok(())
    }

    /// `readFragment({id, fragment, variables, materialized?})` (spec §6).
    pub fn read_fragment(
        &self,
        id: &str,
        fragment: &str,
        variables: &IndexMap<String, Json>,
        watcher: Option<WatcherId>,
        mode: DecisionMode,
    ) -> Result<Json, CacheError> {
        fragment::read_fragment(&self.graph, &self.compiler, id, fragment, variables, watcher, mode)
    }

    /// `writeFragment({id, fragment, data, variables})` (spec §6).
    pub fn write_fragment(&self, id: &str, fragment: &str, data: &Json, variables: &IndexMap<String, Json>) -> Result<(), CacheError> {
        fragment::write_fragment(&self.graph, &self.compiler, id, fragment, data, variables)
    }

    /// `materializeEntity(id) -> proxy` (spec §6) — never fails; an absent
    /// record simply yields an empty proxy.
    pub fn materialize_entity(&self, id: &RecordId) -> Rc<RecordProxy> {
        materializer::materialize_entity(&self.graph, id)
    }

    /// `modifyOptimistic(build) -> {commit(), revert()}` (spec §6).
    pub fn modify_optimistic(&self, build: impl FnOnce(&Graph)) -> OptimisticLayer<'_> {
        optimistic::modify_optimistic(&self.graph, build)
    }

    /// `dehydrate() -> Snapshot` (spec §6).
    pub fn dehydrate(&self) -> Snapshot {
        snapshot::dehydrate(&self.graph)
    }

    /// `hydrate(snapshot, opts?)` (spec §6) — clears the store and restores
    /// records. `is_hydrating()` reports `true` only for the synchronous
    /// extent of this call: the core has no task queue to defer past (§5,
    /// "no operation suspends"), so "until the next task" collapses to "until
    /// this call returns" for a purely synchronous cache.
    pub fn hydrate(&self, snapshot: Snapshot) {
        self.hydrating.set(true);
        snapshot::hydrate(&self.graph, snapshot);
        self.hydrating.set(false);
    }

    /// Hydrates from untyped JSON, tolerating malformed entries (spec §7
    /// "hydrate accepts garbage").
    pub fn hydrate_json(&self, raw: &Json) {
        self.hydrating.set(true);
        snapshot::hydrate_from_json(&self.graph, raw);
        self.hydrating.set(false);
    }

    /// The streamed hydrate form (spec §6): an emitter delivers one or more
    /// snapshots via a callback.
    pub fn hydrate_stream(&self, emitter: impl FnOnce(&mut dyn FnMut(Snapshot))) {
        self.hydrating.set(true);
        snapshot::hydrate_stream(&self.graph, emitter);
        self.hydrating.set(false);
    }

    pub fn is_hydrating(&self) -> bool {
        self.hydrating.get()
    }

    /// `inspect.entities(typename)`.
    pub fn inspect_entities(&self, typename: &str) -> Vec<RecordId> {
        inspect::entities_by_typename(&self.graph, typename)
    }

    /// `inspect.get(id)`.
    pub fn inspect_get(&self, id: &RecordId) -> Option<Record> {
        inspect::get(&self.graph, id)
    }

    /// `inspect.connections()`.
    pub fn inspect_connections(&self) -> Vec<RecordId> {
        inspect::connection_keys(&self.graph)
    }

    /// `inspect.canonicalConnections()`.
    pub fn inspect_canonical_connections(&self) -> Vec<RecordId> {
        inspect::canonical_keys(&self.graph)
    }

    /// `inspect.dump()`.
    pub fn inspect_dump(&self) -> Vec<(RecordId, Record)> {
        inspect::dump(&self.graph)
    }

    /// `registerWatcher(run)` (spec §6).
    pub fn register_watcher(&self, run: WatcherFn) -> WatcherId {
        self.graph.watchers().register(run)
    }

    /// `unregisterWatcher(id)` (spec §6).
    pub fn unregister_watcher(&self, id: WatcherId) {
        self.graph.watchers().unregister(id)
    }

    /// `trackDependency(id, recordId)` (spec §6).
    pub fn track_dependency(&self, watcher: WatcherId, record: RecordId) {
        self.graph.watchers().track_dependency(watcher, record)
    }

    /// Type-membership variant of `trackDependency` (spec §6 "plus
    /// type-membership variants").
    pub fn track_type_dependency(&self, watcher: WatcherId, typename: String) {
        self.graph.watchers().track_type_dependency(watcher, typename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_then_read_query_round_trips() {
        // spec §8 scenario 1
        let cache = Cache::new(IdentityConfig::new());
        let vars = IndexMap::new();
        cache
            .write_query(
                r#"query { user(id: "u1") { id email } }"#,
                &vars,
                &json!({"user": {"__typename": "User", "id": "u1", "email": "a@example.com"}}),
            )
            .unwrap();

        let out = cache
            .read_query(r#"query { user(id: "u1") { id email } }"#, &vars, None, DecisionMode::Canonical)
            .unwrap();
        assert_eq!(out["user"]["email"], json!("a@example.com"));
    }

    #[test]
    fn read_on_absent_record_yields_null_shape_not_an_error() {
        let cache = Cache::new(IdentityConfig::new());
        let vars = IndexMap::new();
        let out = cache
            .read_query(r#"query { user(id: "missing") { id email } }"#, &vars, None, DecisionMode::Canonical)
            .unwrap();
        assert!(out["user"].is_null());
    }

    #[test]
    fn malformed_document_is_a_usage_error() {
        let cache = Cache::new(IdentityConfig::new());
        let vars = IndexMap::new();
        let err = cache.write_query("", &vars, &json!({})).unwrap_err();
        assert!(matches!(err, CacheError::GraphQlSyntax { .. }));
    }

    #[test]
    fn dehydrate_hydrate_preserves_reads() {
        // spec P2
        let cache = Cache::new(IdentityConfig::new());
        let vars = IndexMap::new();
        let query = r#"query { user(id: "u1") { id email } }"#;
        cache
            .write_query(query, &vars, &json!({"user": {"__typename": "User", "id": "u1", "email": "a"}}))
            .unwrap();

        let snapshot = cache.dehydrate();
        let cache2 = Cache::new(IdentityConfig::new());
        cache2.hydrate(snapshot);
        assert!(!cache2.is_hydrating());

        let out = cache2.read_query(query, &vars, None, DecisionMode::Canonical).unwrap();
        assert_eq!(out["user"]["email"], json!("a"));
    }

    #[test]
    fn watcher_registration_and_unregistration_roundtrip() {
        let cache = Cache::new(IdentityConfig::new());
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let watcher = cache.register_watcher(Rc::new(move || calls_clone.set(calls_clone.get() + 1)));
        cache.track_dependency(watcher, RecordId::entity("User", "u1"));

        cache
            .write_query(
                r#"query { user(id: "u1") { id email } }"#,
                &IndexMap::new(),
                &json!({"user": {"__typename": "User", "id": "u1", "email": "a"}}),
            )
            .unwrap();
        assert_eq!(calls.get(), 1);

        cache.unregister_watcher(watcher);
        cache
            .write_query(
                r#"query { user(id: "u1") { id email } }"#,
                &IndexMap::new(),
                &json!({"user": {"__typename": "User", "id": "u1", "email": "b"}}),
            )
            .unwrap();
        assert_eq!(calls.get(), 1);
    }
}
