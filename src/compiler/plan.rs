//! The compiled, variable-parameterized plan produced by [`super::Compiler`]
//! (spec §4.1).

use indexmap::IndexMap;
use serde_json::Value as Json;

/// The operation kind named by an operation's root (spec §3: "operation roots
/// (Query/Mutation/Subscription)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum OperationKind {
    #[strum(serialize = "Query")]
    Query,
    #[strum(serialize = "Mutation")]
    Mutation,
    #[strum(serialize = "Subscription")]
    Subscription,
}

/// `connectionMode` (spec §4.1), default `Infinite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString)]
pub enum ConnectionMode {
    #[default]
    #[strum(serialize = "infinite")]
    Infinite,
    #[strum(serialize = "page")]
    Page,
}

/// Connection metadata present on a selection when `@connection` is applied
/// (spec §4.1).
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    pub connection_key: String,
    pub mode: ConnectionMode,
    /// Argument names retained in the canonical key. Pagination args
    /// (`first`, `last`, `after`, `before`) are always excluded regardless of
    /// whether they appear here.
    pub filters: Vec<String>,
}

const PAGINATION_ARGS: [&str; 4] = ["first", "last", "after", "before"];

impl ConnectionMeta {
    pub fn is_pagination_arg(name: &str) -> bool {
        PAGINATION_ARGS.contains(&name)
    }
}

/// An argument value as it appeared in the document: either a literal or a
/// reference to an operation variable, recursively for list/object values.
#[derive(Debug, Clone)]
pub enum ArgTemplate {
    Const(Json),
    Variable(String),
    List(Vec<ArgTemplate>),
    Object(IndexMap<String, ArgTemplate>),
}

impl ArgTemplate {
    fn resolve(&self, variables: &IndexMap<String, Json>) -> Json {
        match self {
            ArgTemplate::Const(v) => v.clone(),
            ArgTemplate::Variable(name) => variables.get(name).cloned().unwrap_or(Json::Null),
            ArgTemplate::List(items) => {
                Json::Array(items.iter().map(|i| i.resolve(variables)).collect())
            }
            ArgTemplate::Object(fields) => {
                let mut map = serde_json::Map::with_capacity(fields.len());
                for (k, v) in fields {
                    map.insert(k.clone(), v.resolve(variables));
                }
                Json::Object(map)
            }
        }
    }

    /// Names of variables referenced anywhere inside this template.
    pub fn variable_names(&self, out: &mut Vec<String>) {
        match self {
            ArgTemplate::Const(_) => {}
            ArgTemplate::Variable(name) => out.push(name.clone()),
            ArgTemplate::List(items) => items.iter().for_each(|i| i.variable_names(out)),
            ArgTemplate::Object(fields) => fields.values().for_each(|v| v.variable_names(out)),
        }
    }
}

/// A compiled field selection: carries everything the normalizer and
/// materializer need without re-walking the document (spec §4.1).
#[derive(Debug, Clone)]
pub struct FieldPlan {
    /// Alias if present, else the field name — the key under which this
    /// selection is written/read on its parent record.
    pub response_key: String,
    pub field_name: String,
    pub args: IndexMap<String, ArgTemplate>,
    pub selection: SelectionSetPlan,
    pub connection: Option<ConnectionMeta>,
}

impl FieldPlan {
    pub fn has_args(&self) -> bool {
        !self.args.is_empty()
    }

    pub fn is_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// `buildArgs(variables)` (spec §4.1): materializes the concrete argument
    /// object for this selection.
    pub fn build_args(&self, variables: &IndexMap<String, Json>) -> Json {
        let mut map = serde_json::Map::with_capacity(self.args.len());
        for (name, template) in &self.args {
            map.insert(name.clone(), template.resolve(variables));
        }
        Json::Object(map)
    }

    /// `stringifyArgs(variables)` (spec §4.1): the canonical JSON key for
    /// this selection's full argument set.
    pub fn stringify_args(&self, variables: &IndexMap<String, Json>) -> String {
        crate::value::stringify_args(&self.build_args(variables))
    }

    /// The arguments retained on a canonical connection key: all declared
    /// `connectionFilters`, with pagination args always excluded (spec §3,
    /// §4.1).
    pub fn canonical_args(&self, variables: &IndexMap<String, Json>) -> Json {
        let Some(meta) = &self.connection else {
            return self.build_args(variables);
        };
        let full = self.build_args(variables);
        let Json::Object(full) = full else {
            return Json::Object(Default::default());
        };
        let mut map = serde_json::Map::new();
        for name in &meta.filters {
            if ConnectionMeta::is_pagination_arg(name) {
                continue;
            }
            if let Some(v) = full.get(name) {
                map.insert(name.clone(), v.clone());
            }
        }
        Json::Object(map)
    }

    pub fn canonical_args_json(&self, variables: &IndexMap<String, Json>) -> String {
        crate::value::stringify_args(&self.canonical_args(variables))
    }
}

/// A selection map keyed by response key, mirroring how the normalizer and
/// materializer address fields on a record (spec §4.1: "a recursive map of
/// selections").
pub type SelectionSetPlan = IndexMap<String, FieldPlan>;

/// The compiled representation of one GraphQL operation (spec §4.1).
#[derive(Debug, Clone)]
pub struct Plan {
    pub operation_kind: OperationKind,
    pub operation_name: Option<String>,
    pub root: SelectionSetPlan,
}

/// The compiled representation of a standalone fragment document (spec §4.6).
#[derive(Debug, Clone)]
pub struct FragmentPlan {
    pub name: String,
    pub type_condition: String,
    pub selection: SelectionSetPlan,
}
