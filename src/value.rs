//! Record identifiers and field values (spec §3).
//!
//! `RecordId` enumerates the identifier grammar the store uses to address
//! records; `FieldValue` enumerates the value shapes a record field can hold.
//! Both round-trip through `serde` so they can appear in a [`crate::snapshot::Snapshot`].

use std::fmt;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;

/// The stable string address of a record (spec §3).
///
/// Construct one of these through the named constructors rather than by
/// formatting strings by hand — they encode the exact grammar the spec
/// defines, and centralizing it here is what lets the normalizer, canonical
/// engine, and materializer agree on addressing without duplicating string
/// templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display, derive_more::From, derive_more::Deref)]
pub struct RecordId(String);

impl RecordId {
    /// The singleton root record for operation roots (Query/Mutation/Subscription).
    pub fn root() -> Self {
        RecordId("@".to_owned())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "@"
    }

    /// `"<Typename>:<id>"` — an entity with a resolvable key.
    pub fn entity(typename: &str, id: &str) -> Self {
        RecordId(format!("{typename}:{id}"))
    }

    /// `@.<field>(<argsJSON>)` or `<ParentId>.<field>(<argsJSON>)`.
    pub fn connection(parent: &RecordId, field: &str, args_json: &str) -> Self {
        RecordId(format!("{parent}.{field}({args_json})"))
    }

    /// A non-entity nested record at a structural path under its parent.
    pub fn nested(parent: &RecordId, field: &str, args_json: &str) -> Self {
        Self::connection(parent, field, args_json)
    }

    /// `<PageId>.pageInfo`.
    pub fn page_info(page: &RecordId) -> Self {
        RecordId(format!("{page}.pageInfo"))
    }

    /// `<PageId>.edges:<index>`.
    pub fn edge(page: &RecordId, index: usize) -> Self {
        RecordId(format!("{page}.edges:{index}"))
    }

    /// `@connection.<path>.<field>(<filtersJSON>)`.
    pub fn canonical(parent_path: &str, field: &str, filters_json: &str) -> Self {
        RecordId(format!("@connection.{parent_path}.{field}({filters_json})"))
    }

    /// `<canonicalKey>::meta`.
    pub fn canonical_meta(canonical: &RecordId) -> Self {
        RecordId(format!("{canonical}::meta"))
    }

    /// `<canonicalKey>.pageInfo`.
    pub fn canonical_page_info(canonical: &RecordId) -> Self {
        Self::page_info(canonical)
    }

    /// If this id matches the `<Typename>:<id>` entity grammar (no
    /// structural path characters), returns the typename — used to decide
    /// whether a write is a membership change for the type-watcher channel.
    pub fn entity_typename(&self) -> Option<&str> {
        if self.0 == "@" || self.0.contains('(') || self.0.contains('.') {
            return None;
        }
        self.0.split_once(':').map(|(typename, _)| typename)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(RecordId)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_owned())
    }
}

/// A field's value inside a [`Record`] (spec §3): a scalar, null, a single
/// reference, a reference list, an inline object, or an array of
/// scalars/objects.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Scalar(Json),
    Ref(RecordId),
    Refs(Vec<RecordId>),
    Object(IndexMap<String, FieldValue>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_ref_id(&self) -> Option<&RecordId> {
        match self {
            FieldValue::Ref(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_refs(&self) -> Option<&[RecordId]> {
        match self {
            FieldValue::Refs(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Json> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, FieldValue>> {
        match self {
            FieldValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Converts an arbitrary JSON value read out of a network/cache payload
    /// into a `FieldValue`, recognizing the wire forms `{"__ref": id}` and
    /// `{"__refs": [id, ...]}`. Plain objects and arrays are kept inline
    /// (the normalizer decides, based on the plan, whether an object needs
    /// to be split into its own record).
    pub fn from_json(value: &Json) -> FieldValue {
        match value {
            Json::Null => FieldValue::Null,
            Json::Object(map) => {
                if let Some(Json::String(id)) = map.get("__ref") {
                    return FieldValue::Ref(RecordId::from(id.as_str()));
                }
                if let Some(Json::Array(ids)) = map.get("__refs") {
                    return FieldValue::Refs(
                        ids.iter()
                            .filter_map(|v| v.as_str())
                            .map(RecordId::from)
                            .collect(),
                    );
                }
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), FieldValue::from_json(v));
                }
                FieldValue::Object(out)
            }
            Json::Array(items) => {
                FieldValue::List(items.iter().map(FieldValue::from_json).collect())
            }
            scalar => FieldValue::Scalar(scalar.clone()),
        }
    }

    /// Inverse of [`FieldValue::from_json`] — used by `dehydrate` and by
    /// `inspect` to hand callers plain JSON.
    pub fn to_json(&self) -> Json {
        match self {
            FieldValue::Null => Json::Null,
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::Ref(id) => {
                let mut map = serde_json::Map::new();
                map.insert("__ref".to_owned(), Json::String(id.as_str().to_owned()));
                Json::Object(map)
            }
            FieldValue::Refs(ids) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    "__refs".to_owned(),
                    Json::Array(ids.iter().map(|id| Json::String(id.as_str().to_owned())).collect()),
                );
                Json::Object(map)
            }
            FieldValue::Object(fields) => {
                let mut map = serde_json::Map::new();
                for (k, v) in fields {
                    map.insert(k.clone(), v.to_json());
                }
                Json::Object(map)
            }
            FieldValue::List(items) => Json::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Json::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(FieldValue::from_json(&value))
    }
}

/// An ordered field -> value mapping (spec §3: "a record is an ordered mapping
/// from field name to value").
pub type Record = IndexMap<String, FieldValue>;

/// Stable-JSON stringification of an arguments object: object keys sorted
/// recursively, `null` retained explicitly (spec §3).
pub fn stringify_args(args: &Json) -> String {
    serde_json::to_string(&canonicalize(args)).unwrap_or_else(|_| "{}".to_owned())
}

fn canonicalize(value: &Json) -> Json {
    match value {
        Json::Object(map) => {
            let mut sorted: Vec<(&String, &Json)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
