//! Reactive proxies with a versioned overlay (spec §3, §9).
//!
//! A proxy mirrors a record's fields; writes patch only the changed keys so
//! consumer-held references stay valid (spec §9: "stable identity,
//! field-granular change notification, weak retention"). The store holds
//! proxies by `Weak` — only a consumer (or a watcher closure) keeps one
//! alive via the returned `Rc`.

use std::cell::{Cell, RefCell};

use crate::value::{FieldValue, Record, RecordId};

/// A live handle onto one record. Stable for as long as any consumer (or
/// watcher) holds the `Rc` it came wrapped in.
pub struct RecordProxy {
    id: RecordId,
    data: RefCell<Record>,
    version: Cell<u64>,
}

impl RecordProxy {
    pub(crate) fn new(id: RecordId, data: Record, version: u64) -> Self {
        RecordProxy {
            id,
            data: RefCell::new(data),
            version: Cell::new(version),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.data.borrow().get(field).cloned()
    }

    /// A point-in-time copy of every field currently on the proxy.
    pub fn snapshot(&self) -> Record {
        self.data.borrow().clone()
    }

    /// The record version this proxy was last brought up to date with
    /// (spec I5: "a proxy's overlay version equals its source record version
    /// after any observation").
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Patches only the given keys from `source`, leaving every other field
    /// on the proxy untouched — the minimal-diff overlay spec §4.2 describes.
    pub(crate) fn overlay(&self, source: &Record, touched: &[String], new_version: u64) {
        let mut data = self.data.borrow_mut();
        for key in touched {
            match source.get(key) {
                Some(value) => {
                    data.insert(key.clone(), value.clone());
                }
                None => {
                    data.shift_remove(key);
                }
            }
        }
        self.version.set(new_version);
    }

    /// Replaces every field at once — used when the proxy has drifted from
    /// its source record (e.g. after an optimistic revert) and a minimal
    /// diff can't be trusted (spec §4.2: "a full overlay repairs it").
    pub(crate) fn full_overlay(&self, source: &Record, new_version: u64) {
        *self.data.borrow_mut() = source.clone();
        self.version.set(new_version);
    }

    pub(crate) fn clear(&self, new_version: u64) {
        self.data.borrow_mut().clear();
        self.version.set(new_version);
    }
}
