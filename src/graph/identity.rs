//! Per-typename key functions and the interface-to-canonical-typename map
//! (spec §4.2, §9 "Polymorphism and interfaces").

use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{FieldValue, Record, RecordId};

type KeyFn = Rc<dyn Fn(&Record) -> Option<String>>;

/// Configures how entities are identified: a default `id`-field reader, any
/// number of per-typename overrides (spec §8: "Custom key functions… integrate
/// without change"), and an interface-to-implementation canonicalization map
/// (spec §8: "Interface polymorphism").
#[derive(Clone, Default)]
pub struct IdentityConfig {
    key_fns: IndexMap<String, KeyFn>,
    interfaces: IndexMap<String, String>,
}

impl IdentityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom key function for `typename`, e.g. `Stat` keyed by
    /// `key`, `Profile` by `slug` (spec §8).
    pub fn with_key_fn(
        mut self,
        typename: impl Into<String>,
        key_fn: impl Fn(&Record) -> Option<String> + 'static,
    ) -> Self {
        self.key_fns.insert(typename.into(), Rc::new(key_fn));
        self
    }

    /// Declares `implementation` as collapsing to `interface` for identity
    /// purposes (spec §8: `AudioPost`/`VideoPost` both collapse to `Post`).
    pub fn with_interface(
        mut self,
        implementation: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        self.interfaces.insert(implementation.into(), interface.into());
        self
    }

    pub fn canonical_typename<'a>(&'a self, typename: &'a str) -> &'a str {
        self.interfaces
            .get(typename)
            .map(String::as_str)
            .unwrap_or(typename)
    }

    /// `identify(obj) -> id | null` (spec §4.2/§6).
    pub fn identify(&self, obj: &Record) -> Option<RecordId> {
        let typename = match obj.get("__typename")? {
            FieldValue::Scalar(v) => v.as_str()?,
            _ => return None,
        };
        let canonical = self.canonical_typename(typename).to_owned();
        let id = if let Some(key_fn) = self.key_fns.get(&canonical) {
            key_fn(obj)?
        } else {
            stringify_id_field(obj.get("id")?)?
        };
        Some(RecordId::entity(&canonical, &id))
    }
}

/// `id` is stringified regardless of its wire representation (spec §4.2).
pub fn stringify_id_field(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Scalar(v) => Some(match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: &[(&str, FieldValue)]) -> Record {
        fields.iter().cloned().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn default_identity_reads_id_field() {
        let config = IdentityConfig::new();
        let rec = record(&[
            ("__typename", FieldValue::Scalar(json!("User"))),
            ("id", FieldValue::Scalar(json!("u1"))),
        ]);
        assert_eq!(config.identify(&rec).unwrap().as_str(), "User:u1");
    }

    #[test]
    fn custom_key_fn_used_over_default() {
        let config = IdentityConfig::new().with_key_fn("Stat", |r| {
            r.get("key").and_then(|v| v.as_scalar()).and_then(|v| v.as_str()).map(str::to_owned)
        });
        let rec = record(&[
            ("__typename", FieldValue::Scalar(json!("Stat"))),
            ("key", FieldValue::Scalar(json!("daily-active"))),
        ]);
        assert_eq!(config.identify(&rec).unwrap().as_str(), "Stat:daily-active");
    }

    #[test]
    fn interface_canonicalizes_typename() {
        let config = IdentityConfig::new().with_interface("AudioPost", "Post").with_interface("VideoPost", "Post");
        let audio = record(&[
            ("__typename", FieldValue::Scalar(json!("AudioPost"))),
            ("id", FieldValue::Scalar(json!("1"))),
        ]);
        let video = record(&[
            ("__typename", FieldValue::Scalar(json!("VideoPost"))),
            ("id", FieldValue::Scalar(json!("1"))),
        ]);
        assert_eq!(config.identify(&audio).unwrap(), config.identify(&video).unwrap());
        assert_eq!(config.identify(&audio).unwrap().as_str(), "Post:1");
    }
}
