//! Document compiler (spec §4.1): `compile(document) -> Plan`.
//!
//! Selection normalization — expanding fragments and merging duplicate
//! selections by response key into an `IndexMap` — is adapted from the
//! teacher's `query_plan/operation.rs::normalize_selections`, generalized to
//! run on the unvalidated `apollo_compiler::ast` representation instead of a
//! schema-resolved `apollo_compiler::executable` one, since this crate never
//! validates against a schema (spec §1 Non-goals).

pub mod plan;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use apollo_compiler::ast::{
    Definition, Document, OperationType, Selection as AstSelection, Value as AstValue,
};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::CacheError;
pub use plan::{ArgTemplate, ConnectionMeta, ConnectionMode, FieldPlan, FragmentPlan, OperationKind, Plan, SelectionSetPlan};

/// Parses documents once and caches the resulting [`Plan`] (spec §4.1: "The
/// plan is cached by document identity").
///
/// Rust has no stable notion of "the same parsed document object" the way a
/// long-lived JS runtime does, so plans are cached by the document's source
/// text instead — semantically equivalent for a cache whose callers pass the
/// same operation string on every call, which is the normal usage pattern for
/// a compiled GraphQL client.
pub struct Compiler {
    plans: RefCell<HashMap<Rc<str>, Rc<Plan>>>,
    fragment_plans: RefCell<HashMap<Rc<str>, Rc<FragmentPlan>>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            plans: RefCell::new(HashMap::new()),
            fragment_plans: RefCell::new(HashMap::new()),
        }
    }

    /// `compile(document) -> Plan` (spec §4.1).
    pub fn compile(&self, document: &str) -> Result<Rc<Plan>, CacheError> {
        if let Some(plan) = self.plans.borrow().get(document) {
            return Ok(plan.clone());
        }
        let plan = Rc::new(compile_operation(document)?);
        self.plans
            .borrow_mut()
            .insert(Rc::from(document), plan.clone());
        Ok(plan)
    }

    /// Compiles a standalone fragment document for `readFragment`/
    /// `writeFragment` (spec §4.6). Usage error if the document does not
    /// contain exactly one fragment definition (spec §7).
    pub fn compile_fragment(&self, document: &str) -> Result<Rc<FragmentPlan>, CacheError> {
        if let Some(plan) = self.fragment_plans.borrow().get(document) {
            return Ok(plan.clone());
        }
        let plan = Rc::new(compile_fragment_document(document)?);
        self.fragment_plans
            .borrow_mut()
            .insert(Rc::from(document), plan.clone());
        Ok(plan)
    }
}

fn parse(document: &str) -> Result<Document, CacheError> {
    let ast = Document::parse(document, "operation.graphql").map_err(|e| CacheError::from_diagnostics(e.errors))?;
    if ast.definitions.is_empty() {
        return Err(CacheError::from_diagnostics("document has no definitions"));
    }
    Ok(ast)
}

fn fragment_definitions(ast: &Document) -> IndexMap<String, apollo_compiler::Node<apollo_compiler::ast::FragmentDefinition>> {
    let mut fragments = IndexMap::new();
    for def in &ast.definitions {
        if let Definition::FragmentDefinition(frag) = def {
            fragments.insert(frag.name.to_string(), frag.clone());
        }
    }
    fragments
}

fn compile_operation(document: &str) -> Result<Plan, CacheError> {
    let ast = parse(document)?;
    let fragments = fragment_definitions(&ast);

    let operation = ast
        .definitions
        .iter()
        .find_map(|def| match def {
            Definition::OperationDefinition(op) => Some(op.clone()),
            _ => None,
        })
        .ok_or_else(|| CacheError::from_diagnostics("document contains no operation definition"))?;

    let operation_kind = match operation.operation_type {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    };

    let mut visiting = Vec::new();
    let root = compile_selection_set(&operation.selection_set, &fragments, &mut visiting);

    Ok(Plan {
        operation_kind,
        operation_name: operation.name.as_ref().map(|n| n.to_string()),
        root,
    })
}

fn compile_fragment_document(document: &str) -> Result<FragmentPlan, CacheError> {
    let ast = parse(document)?;
    let fragments = fragment_definitions(&ast);
    let fragment_defs: Vec<_> = ast
        .definitions
        .iter()
        .filter_map(|def| match def {
            Definition::FragmentDefinition(frag) => Some(frag.clone()),
            _ => None,
        })
        .collect();

    if fragment_defs.len() != 1 {
        return Err(CacheError::FragmentDocumentShape {
            found: fragment_defs.len(),
        });
    }
    let fragment = &fragment_defs[0];
    let mut visiting = Vec::new();
    let selection = compile_selection_set(&fragment.selection_set, &fragments, &mut visiting);

    Ok(FragmentPlan {
        name: fragment.name.to_string(),
        type_condition: fragment.type_condition.to_string(),
        selection,
    })
}

/// Walks a selection set, flattening named fragment spreads and inline
/// fragments into the parent map (spec §4.1: "Fragments are inlined at
/// compile time"). There is no schema to check type conditions against, so —
/// like the rest of the write/read paths in this cache — a fragment's fields
/// are merged unconditionally; the normalizer only ever writes fields that
/// are actually present in the response data.
fn compile_selection_set(
    selections: &[AstSelection],
    fragments: &IndexMap<String, apollo_compiler::Node<apollo_compiler::ast::FragmentDefinition>>,
    visiting: &mut Vec<String>,
) -> SelectionSetPlan {
    let mut out: SelectionSetPlan = IndexMap::new();
    for selection in selections {
        match selection {
            AstSelection::Field(field) => {
                let response_key = field
                    .alias
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| field.name.to_string());
                let sub_visiting = &mut visiting.clone();
                let sub_selection =
                    compile_selection_set(&field.selection_set, fragments, sub_visiting);
                let args = compile_arguments(&field.arguments);
                let connection = compile_connection_meta(field, &field.name.to_string(), &args);

                match out.entry(response_key.clone()) {
                    indexmap::map::Entry::Occupied(mut existing) => {
                        merge_sub_selection(&mut existing.get_mut().selection, sub_selection);
                    }
                    indexmap::map::Entry::Vacant(slot) => {
                        slot.insert(FieldPlan {
                            response_key,
                            field_name: field.name.to_string(),
                            args,
                            selection: sub_selection,
                            connection,
                        });
                    }
                }
            }
            AstSelection::FragmentSpread(spread) => {
                let name = spread.fragment_name.to_string();
                if visiting.contains(&name) {
                    continue; // cyclic fragment reference; ignore rather than recurse forever
                }
                let Some(fragment) = fragments.get(&name) else {
                    continue; // unknown fragment; nothing to expand
                };
                visiting.push(name);
                let expanded =
                    compile_selection_set(&fragment.selection_set, fragments, visiting);
                visiting.pop();
                merge_selection_sets(&mut out, expanded);
            }
            AstSelection::InlineFragment(inline) => {
                let expanded =
                    compile_selection_set(&inline.selection_set, fragments, visiting);
                merge_selection_sets(&mut out, expanded);
            }
        }
    }
    out
}

fn merge_selection_sets(into: &mut SelectionSetPlan, from: SelectionSetPlan) {
    for (key, field) in from {
        match into.entry(key) {
            indexmap::map::Entry::Occupied(mut existing) => {
                merge_sub_selection(&mut existing.get_mut().selection, field.selection);
            }
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(field);
            }
        }
    }
}

fn merge_sub_selection(into: &mut SelectionSetPlan, from: SelectionSetPlan) {
    merge_selection_sets(into, from);
}

fn compile_arguments(
    args: &[apollo_compiler::Node<apollo_compiler::ast::Argument>],
) -> IndexMap<String, ArgTemplate> {
    let mut out = IndexMap::with_capacity(args.len());
    for arg in args {
        out.insert(arg.name.to_string(), value_to_template(&arg.value));
    }
    out
}

fn value_to_template(value: &AstValue) -> ArgTemplate {
    match value {
        AstValue::Null => ArgTemplate::Const(Json::Null),
        AstValue::Variable(name) => ArgTemplate::Variable(name.to_string()),
        AstValue::Enum(name) => ArgTemplate::Const(Json::String(name.to_string())),
        AstValue::String(s) => ArgTemplate::Const(Json::String(s.as_str().to_owned())),
        AstValue::Int(i) => ArgTemplate::Const(
            i.try_to_i32()
                .map(|v| Json::from(v))
                .unwrap_or_else(|| Json::String(i.to_string())),
        ),
        AstValue::Float(f) => ArgTemplate::Const(
            serde_json::Number::from_f64(f.try_to_f64().unwrap_or_default())
                .map(Json::Number)
                .unwrap_or(Json::Null),
        ),
        AstValue::Boolean(b) => ArgTemplate::Const(Json::Bool(*b)),
        AstValue::List(items) => {
            ArgTemplate::List(items.iter().map(|i| value_to_template(i)).collect())
        }
        AstValue::Object(fields) => {
            let mut map = IndexMap::with_capacity(fields.len());
            for (name, v) in fields {
                map.insert(name.to_string(), value_to_template(v));
            }
            ArgTemplate::Object(map)
        }
    }
}

/// Reads the `@connection` directive (spec §4.1) off a field selection, if
/// present.
fn compile_connection_meta(
    field: &apollo_compiler::ast::Field,
    field_name: &str,
    args: &IndexMap<String, ArgTemplate>,
) -> Option<ConnectionMeta> {
    let directive = field.directives.get("connection")?;

    let connection_key = directive
        .argument_by_name("key")
        .and_then(|v| match &**v {
            AstValue::String(s) => Some(s.as_str().to_owned()),
            _ => None,
        })
        .unwrap_or_else(|| field_name.to_owned());

    let mode = directive
        .argument_by_name("mode")
        .and_then(|v| match &**v {
            AstValue::String(s) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or_default();

    let filters = directive
        .argument_by_name("filter")
        .and_then(|v| match &**v {
            AstValue::List(items) => Some(
                items
                    .iter()
                    .filter_map(|i| match &**i {
                        AstValue::String(s) => Some(s.as_str().to_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .unwrap_or_else(|| {
            // Default: all non-pagination args declared on the field (spec §4.1).
            args.keys()
                .filter(|name| !ConnectionMeta::is_pagination_arg(name))
                .cloned()
                .collect()
        });

    Some(ConnectionMeta {
        connection_key,
        mode,
        filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_field_with_args() {
        let compiler = Compiler::new();
        let plan = compiler
            .compile(r#"query($id: ID!) { user(id: $id) { id email } }"#)
            .unwrap();
        let user = plan.root.get("user").expect("user selection");
        assert_eq!(user.field_name, "user");
        assert!(user.has_args());
        let mut vars = IndexMap::new();
        vars.insert("id".to_string(), json!("u1"));
        assert_eq!(user.stringify_args(&vars), r#"{"id":"u1"}"#);
        assert!(user.selection.contains_key("id"));
        assert!(user.selection.contains_key("email"));
    }

    #[test]
    fn expands_named_fragment() {
        let compiler = Compiler::new();
        let plan = compiler
            .compile(
                r#"query { user(id: "u1") { ...UserFields } } fragment UserFields on User { id email }"#,
            )
            .unwrap();
        let user = plan.root.get("user").unwrap();
        assert!(user.selection.contains_key("id"));
        assert!(user.selection.contains_key("email"));
    }

    #[test]
    fn reads_connection_directive() {
        let compiler = Compiler::new();
        let plan = compiler
            .compile(
                r#"query($role: String) {
                    users(role: $role, first: 2, after: null) @connection(key: "users") {
                        edges { cursor node { id } }
                        pageInfo { hasNextPage endCursor }
                    }
                }"#,
            )
            .unwrap();
        let users = plan.root.get("users").unwrap();
        let meta = users.connection.as_ref().expect("connection metadata");
        assert_eq!(meta.connection_key, "users");
        assert_eq!(meta.mode, ConnectionMode::Infinite);
        assert_eq!(meta.filters, vec!["role".to_string()]);
    }

    #[test]
    fn compile_fragment_requires_single_definition() {
        let compiler = Compiler::new();
        let err = compiler.compile_fragment("query { x }").unwrap_err();
        assert!(matches!(err, CacheError::FragmentDocumentShape { found: 0 }));
    }
}
