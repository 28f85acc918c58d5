//! `readFragment`/`writeFragment` (spec §4.6): composes the compiler,
//! normalizer, and materializer rather than implementing its own algorithm —
//! the same way the teacher's `Supergraph` composes `merge`/`api_schema`/
//! `query_graph` instead of re-deriving them.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::compiler::Compiler;
use crate::error::CacheError;
use crate::graph::{Graph, WatcherId};
use crate::materializer::{self, DecisionMode};
use crate::normalizer;
use crate::value::RecordId;

/// `readFragment({id, fragment, variables})` (spec §6). Usage errors
/// (`id`/fragment shape) fail synchronously; once past that, this never
/// fails — an absent record simply yields a null-shaped projection
/// (spec §7 "never throws from read paths").
#[allow(clippy::too_many_arguments)]
pub fn read_fragment(
    graph: &Graph,
    compiler: &Compiler,
    id: &str,
    fragment: &str,
    variables: &IndexMap<String, Json>,
    watcher: Option<WatcherId>,
    mode: DecisionMode,
) -> Result<Json, CacheError> {
    let record_id = parse_id(id)?;
    let plan = compile_fragment(compiler, fragment)?;
    Ok(materializer::read_fragment(graph, &record_id, &plan.selection, variables, watcher, mode))
}

/// `writeFragment({id, fragment, data, variables})` (spec §6).
pub fn write_fragment(
    graph: &Graph,
    compiler: &Compiler,
    id: &str,
    fragment: &str,
    data: &Json,
    variables: &IndexMap<String, Json>,
) -> Result<(), CacheError> {
    let record_id = parse_id(id)?;
    let plan = compile_fragment(compiler, fragment)?;
    normalizer::write_fragment(graph, &record_id, &plan.selection, variables, data);
    Ok(())
}

fn parse_id(id: &str) -> Result<RecordId, CacheError> {
    if id.is_empty() {
        return Err(CacheError::EmptyId);
    }
    Ok(RecordId::from(id))
}

/// Rejects an empty fragment document before compiling it (spec §7: "non-string
/// or empty id/fragment" is a usage error, symmetric with [`parse_id`]).
fn compile_fragment(compiler: &Compiler, fragment: &str) -> Result<std::rc::Rc<crate::compiler::FragmentPlan>, CacheError> {
    if fragment.is_empty() {
        return Err(CacheError::EmptyFragmentName);
    }
    compiler.compile_fragment(fragment)
}
