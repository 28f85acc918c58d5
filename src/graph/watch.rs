//! The watcher registry (spec §4.2): `registerWatcher`, `trackDependency`,
//! `notify`, and the type-membership notification channel.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexSet;
use multimap::MultiMap;

use crate::value::RecordId;

pub type WatcherId = u64;
pub type WatcherFn = Rc<dyn Fn()>;

#[derive(Default)]
pub struct WatcherRegistry {
    next_id: Cell<WatcherId>,
    watchers: RefCell<std::collections::HashMap<WatcherId, WatcherFn>>,
    record_deps: RefCell<MultiMap<RecordId, WatcherId>>,
    type_deps: RefCell<MultiMap<String, WatcherId>>,
    watched_records: RefCell<std::collections::HashMap<WatcherId, IndexSet<RecordId>>>,
    watched_types: RefCell<std::collections::HashMap<WatcherId, IndexSet<String>>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run: WatcherFn) -> WatcherId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.watchers.borrow_mut().insert(id, run);
        id
    }

    pub fn unregister(&self, id: WatcherId) {
        self.watchers.borrow_mut().remove(&id);
        if let Some(records) = self.watched_records.borrow_mut().remove(&id) {
            let mut deps = self.record_deps.borrow_mut();
            for record in records {
                remove_from_multimap(&mut deps, &record, id);
            }
        }
        if let Some(types) = self.watched_types.borrow_mut().remove(&id) {
            let mut deps = self.type_deps.borrow_mut();
            for typename in types {
                remove_from_multimap(&mut deps, &typename, id);
            }
        }
    }

    /// `trackDependency(id, recordId)` (spec §4.2).
    pub fn track_dependency(&self, watcher: WatcherId, record: RecordId) {
        self.watched_records
            .borrow_mut()
            .entry(watcher)
            .or_default()
            .insert(record.clone());
        self.record_deps.borrow_mut().insert(record, watcher);
    }

    /// Subscribes `watcher` to membership changes (entity add/remove) for
    /// `typename`.
    pub fn track_type_dependency(&self, watcher: WatcherId, typename: String) {
        self.watched_types
            .borrow_mut()
            .entry(watcher)
            .or_default()
            .insert(typename.clone());
        self.type_deps.borrow_mut().insert(typename, watcher);
    }

    /// `notify(recordId)` — runs every watcher depending on `record`.
    pub fn notify(&self, record: &RecordId) {
        let ids: Vec<WatcherId> = self
            .record_deps
            .borrow()
            .get_vec(record)
            .cloned()
            .unwrap_or_default();
        self.run_all(&ids);
    }

    /// Notifies every watcher subscribed to `typename`'s membership channel.
    pub fn notify_type(&self, typename: &str) {
        let ids: Vec<WatcherId> = self
            .type_deps
            .borrow()
            .get_vec(typename)
            .cloned()
            .unwrap_or_default();
        self.run_all(&ids);
    }

    fn run_all(&self, ids: &[WatcherId]) {
        let watchers = self.watchers.borrow();
        for id in ids {
            if let Some(run) = watchers.get(id) {
                run();
            }
        }
    }
}

fn remove_from_multimap<K: std::hash::Hash + Eq + Clone>(
    map: &mut MultiMap<K, WatcherId>,
    key: &K,
    watcher: WatcherId,
) {
    if let Some(values) = map.get_vec_mut(key) {
        values.retain(|w| *w != watcher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn notify_runs_only_tracked_watchers() {
        let registry = WatcherRegistry::new();
        let calls = Rc::new(StdRefCell::new(0));
        let calls_clone = calls.clone();
        let id = registry.register(Rc::new(move || *calls_clone.borrow_mut() += 1));
        registry.track_dependency(id, RecordId::entity("User", "u1"));

        registry.notify(&RecordId::entity("User", "u2"));
        assert_eq!(*calls.borrow(), 0);

        registry.notify(&RecordId::entity("User", "u1"));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn unregister_stops_future_notifications() {
        let registry = WatcherRegistry::new();
        let calls = Rc::new(StdRefCell::new(0));
        let calls_clone = calls.clone();
        let id = registry.register(Rc::new(move || *calls_clone.borrow_mut() += 1));
        registry.track_dependency(id, RecordId::entity("User", "u1"));
        registry.unregister(id);
        registry.notify(&RecordId::entity("User", "u1"));
        assert_eq!(*calls.borrow(), 0);
    }
}
