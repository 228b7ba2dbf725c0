//! Parses the client's raw operation text once per request, so resolvers can
//! recover the fragment-preserving selection set and type conditions that
//! `async_graphql::context::SelectionField` has already flattened away by
//! the time a resolver sees it (it inlines fragment spreads and drops their
//! type conditions during look-ahead). [`ProxySchema`] installs the parsed
//! operation via [`with_parsed_operation`]; [`current`] reads it back out
//! from inside a resolver closure.

use apollo_compiler::ast::{Definition, Document, FragmentDefinition, Name, OperationDefinition, Selection};
use apollo_compiler::Node;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

tokio::task_local! {
    static CURRENT_OPERATION: ParsedOperation;
}

/// The client's operation, parsed independently of `async-graphql`'s own
/// look-ahead. Fragment spreads are kept as spreads (not inlined) and type
/// conditions survive intact; `crate::proxy`/`crate::splice` do the inlining
/// themselves, type-condition-aware.
#[derive(Clone)]
pub struct ParsedOperation {
    pub selection_set: Vec<Selection>,
    pub fragments: IndexMap<Name, Node<FragmentDefinition>>,
    pub variable_values: serde_json::Map<String, JsonValue>,
}

impl ParsedOperation {
    /// Parses `query` at the AST level only (no schema validation — the
    /// client's operation was already validated by the time it reached this
    /// host) and picks out the selected operation by name, or the sole
    /// operation if the document defines only one. Returns `None` on a
    /// malformed document or an unresolvable operation name; callers fall
    /// back to the per-field look-ahead in that case.
    pub fn parse(
        query: &str,
        operation_name: Option<&str>,
        variable_values: serde_json::Map<String, JsonValue>,
    ) -> Option<Self> {
        let document = Document::parse(query, "operation.graphql").ok()?;
        let mut fragments = IndexMap::new();
        let mut operations: Vec<Node<OperationDefinition>> = Vec::new();
        for definition in &document.definitions {
            match definition {
                Definition::FragmentDefinition(fragment) => {
                    fragments.insert(fragment.name.clone(), fragment.clone());
                }
                Definition::OperationDefinition(operation) => operations.push(operation.clone()),
                _ => {}
            }
        }
        let operation = match operation_name {
            Some(name) => operations
                .into_iter()
                .find(|op| op.name.as_ref().map(|n| n.as_str()) == Some(name))?,
            None => operations.into_iter().next()?,
        };
        Some(Self {
            selection_set: operation.selection_set.clone(),
            fragments,
            variable_values,
        })
    }
}

/// Runs `fut` with `parsed` visible to every resolver it calls, via
/// [`current`], for that future's whole lifetime.
pub async fn with_parsed_operation<F: std::future::Future>(parsed: ParsedOperation, fut: F) -> F::Output {
    CURRENT_OPERATION.scope(parsed, fut).await
}

/// The current request's parsed operation, if one was installed. Absent
/// outside request execution — e.g. in unit tests that drive resolver-
/// building functions directly rather than through `ProxySchema::execute`.
pub fn current() -> Option<ParsedOperation> {
    CURRENT_OPERATION.try_with(Clone::clone).ok()
}
