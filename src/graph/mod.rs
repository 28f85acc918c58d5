//! The record store (spec §4.2): a flat map from record identifier to field
//! snapshot, with reactive proxies and versioning.

pub mod identity;
pub mod proxy;
pub mod watch;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

pub use identity::IdentityConfig;
pub use proxy::RecordProxy;
pub use watch::{WatcherFn, WatcherId, WatcherRegistry};

use crate::value::{FieldValue, Record, RecordId};

/// A write passed to [`Graph::put_record`]: `None` deletes the field
/// (spec §4.2 "`undefined` value deletes a field"), `Some` sets it.
pub type PartialRecord = IndexMap<String, Option<FieldValue>>;

/// Builds a [`PartialRecord`] from an iterator of `(field, value)` pairs,
/// setting every field (never deleting) — the common case for normalizer
/// writes.
pub fn partial_from_record(record: Record) -> PartialRecord {
    record.into_iter().map(|(k, v)| (k, Some(v))).collect()
}

/// The pre-layer snapshot an active optimistic layer accumulates: `None`
/// means the record did not exist before the layer started.
pub type Capture = Rc<RefCell<IndexMap<RecordId, Option<Record>>>>;

pub struct Graph {
    records: RefCell<IndexMap<RecordId, Record>>,
    versions: RefCell<HashMap<RecordId, u64>>,
    proxies: RefCell<HashMap<RecordId, Weak<RecordProxy>>>,
    identity: IdentityConfig,
    watchers: WatcherRegistry,
    active_captures: RefCell<Vec<Capture>>,
}

impl Graph {
    pub fn new(identity: IdentityConfig) -> Self {
        Graph {
            records: RefCell::new(IndexMap::new()),
            versions: RefCell::new(HashMap::new()),
            proxies: RefCell::new(HashMap::new()),
            identity,
            watchers: WatcherRegistry::new(),
            active_captures: RefCell::new(Vec::new()),
        }
    }

    /// Starts recording pre-write snapshots for every record a subsequent
    /// `put_record`/`remove_record` touches, until [`Graph::pop_capture`] is
    /// called — the basis of an optimistic layer's revert (spec §4, "Optimistic").
    pub fn push_capture(&self, capture: Capture) {
        self.active_captures.borrow_mut().push(capture);
    }

    pub fn pop_capture(&self) {
        self.active_captures.borrow_mut().pop();
    }

    fn record_pre_state(&self, id: &RecordId) {
        let captures = self.active_captures.borrow();
        if captures.is_empty() {
            return;
        }
        let current = self.records.borrow().get(id).cloned();
        for capture in captures.iter() {
            capture.borrow_mut().entry(id.clone()).or_insert_with(|| current.clone());
        }
    }

    /// Replaces (or removes, if `record` is `None`) a record wholesale and
    /// notifies dependents — used by optimistic revert to restore an exact
    /// pre-layer snapshot (spec P6).
    pub fn restore_snapshot(&self, id: &RecordId, record: Option<Record>) {
        match record {
            Some(record) => {
                self.record_pre_state(id);
                self.records.borrow_mut().insert(id.clone(), record.clone());
                let new_version = self.bump_version(id);
                if let Some(proxy) = self.live_proxy(id) {
                    proxy.full_overlay(&record, new_version);
                }
                self.watchers.notify(id);
            }
            None => self.remove_record(id),
        }
    }

    pub fn watchers(&self) -> &WatcherRegistry {
        &self.watchers
    }

    /// `identify(obj) -> id | null` (spec §4.2).
    pub fn identify(&self, obj: &Record) -> Option<RecordId> {
        self.identity.identify(obj)
    }

    pub fn identity_config(&self) -> &IdentityConfig {
        &self.identity
    }

    /// `getRecord(id)` — snapshot read; `None` if absent.
    pub fn get_record(&self, id: &RecordId) -> Option<Record> {
        self.records.borrow().get(id).cloned()
    }

    pub fn has_record(&self, id: &RecordId) -> bool {
        self.records.borrow().contains_key(id)
    }

    pub fn version(&self, id: &RecordId) -> u64 {
        *self.versions.borrow().get(id).unwrap_or(&0)
    }

    /// `putRecord(id, partial)` (spec §4.2): field-wise merge. Returns
    /// whether anything actually changed (spec I5/P3: "A write increments
    /// `versions[id]` iff any field actually changed").
    pub fn put_record(&self, id: &RecordId, partial: PartialRecord) -> bool {
        self.record_pre_state(id);
        let is_new_entity = !self.has_record(id) && !id.is_root();
        let mut touched = Vec::with_capacity(partial.len());
        {
            let mut records = self.records.borrow_mut();
            let entry = records.entry(id.clone()).or_default();
            for (key, value) in partial {
                let value = normalize_identity_field(&key, value);
                match value {
                    None => {
                        if entry.shift_remove(&key).is_some() {
                            touched.push(key);
                        }
                    }
                    Some(new_value) => {
                        let changed = entry.get(&key).map(|old| old != &new_value).unwrap_or(true);
                        if changed {
                            entry.insert(key.clone(), new_value);
                            touched.push(key);
                        }
                    }
                }
            }
        }

        if touched.is_empty() {
            return false;
        }

        let new_version = self.bump_version(id);
        self.patch_proxy(id, &touched, new_version);
        tracing::trace!(record = %id, fields = touched.len(), "put_record");
        self.watchers.notify(id);

        if is_new_entity {
            if let Some(typename) = id.entity_typename() {
                self.watchers.notify_type(typename);
            }
        }

        true
    }

    /// `removeRecord(id)` — deletes the record and clears its proxy.
    pub fn remove_record(&self, id: &RecordId) {
        self.record_pre_state(id);
        let removed = self.records.borrow_mut().shift_remove(id);
        if removed.is_none() {
            return;
        }
        let new_version = self.bump_version(id);
        if let Some(proxy) = self.live_proxy(id) {
            proxy.clear(new_version);
        }
        self.watchers.notify(id);
        if let Some(typename) = id.entity_typename() {
            self.watchers.notify_type(typename);
        }
    }

    /// `materializeRecord(id)` — a stable, weakly-retained live proxy
    /// (spec §4.2, §9).
    pub fn materialize_record(&self, id: &RecordId) -> Rc<RecordProxy> {
        if let Some(proxy) = self.live_proxy(id) {
            let current_version = self.version(id);
            if proxy.version() != current_version {
                let snapshot = self.get_record(id).unwrap_or_default();
                proxy.full_overlay(&snapshot, current_version);
            }
            return proxy;
        }
        let snapshot = self.get_record(id).unwrap_or_default();
        let version = self.version(id);
        let proxy = Rc::new(RecordProxy::new(id.clone(), snapshot, version));
        self.proxies.borrow_mut().insert(id.clone(), Rc::downgrade(&proxy));
        proxy
    }

    fn live_proxy(&self, id: &RecordId) -> Option<Rc<RecordProxy>> {
        self.proxies.borrow().get(id).and_then(Weak::upgrade)
    }

    fn patch_proxy(&self, id: &RecordId, touched: &[String], new_version: u64) {
        if let Some(proxy) = self.live_proxy(id) {
            let snapshot = self.get_record(id).unwrap_or_default();
            proxy.overlay(&snapshot, touched, new_version);
        }
    }

    fn bump_version(&self, id: &RecordId) -> u64 {
        let mut versions = self.versions.borrow_mut();
        let entry = versions.entry(id.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// All known record ids, in insertion order.
    pub fn keys(&self) -> Vec<RecordId> {
        self.records.borrow().keys().cloned().collect()
    }

    /// Drops every record (used by `hydrate`); any live proxy is reset to
    /// empty rather than left dangling on stale data.
    pub fn clear(&self) {
        let ids: Vec<RecordId> = self.keys();
        let mut records = self.records.borrow_mut();
        records.clear();
        drop(records);
        for id in ids {
            let new_version = self.bump_version(&id);
            if let Some(proxy) = self.live_proxy(&id) {
                proxy.clear(new_version);
            }
            self.watchers.notify(&id);
        }
    }

    /// Writes a full record snapshot directly, bypassing field-wise merge —
    /// used only by `hydrate` (spec §6), which replaces the store wholesale.
    pub fn restore_record(&self, id: RecordId, record: Record) {
        self.records.borrow_mut().insert(id.clone(), record);
        self.bump_version(&id);
    }
}

/// `id` is stringified; `__typename` is stored as-is. No other fields get
/// special handling (spec §4.2).
fn normalize_identity_field(key: &str, value: Option<FieldValue>) -> Option<FieldValue> {
    if key != "id" {
        return value;
    }
    match value {
        Some(FieldValue::Scalar(v)) => Some(FieldValue::Scalar(match v {
            serde_json::Value::String(_) => v,
            other => serde_json::Value::String(other.to_string()),
        })),
        other => other,
    }
}
