//! Converts `async-graphql`'s dynamic-schema resolve context into the
//! `apollo_compiler` AST fragments [`crate::proxy`]/[`crate::link`] work
//! with. This is the seam between the two GraphQL crates this project
//! depends on for different reasons (`apollo_compiler` for schema/document
//! manipulation, `async-graphql::dynamic` for serving a schema decided at
//! runtime) — see `DESIGN.md`.
//!
//! `SelectionField::selection_set()` has already inlined fragment spreads and
//! dropped inline fragments' type conditions by the time a resolver sees it,
//! so [`selection_field_to_ast`]/[`child_selection_set`] can't reconstruct an
//! upstream-safe sub-query for a selection that branches on type — a field
//! selected only inside `... on SomeType { ... }` would come back ungated.
//! `crate::request_context` parses the client's raw operation text up front
//! precisely to avoid this; these two functions remain as the fallback for
//! when that lookup misses (operation name mismatch, unparseable document).

use apollo_compiler::ast::{Argument, Field, IntValue, Name, Selection, Value};
use apollo_compiler::Node;
use async_graphql::context::SelectionField;

fn async_graphql_value_to_ast(value: &async_graphql::Value) -> Value {
    use async_graphql::Value as V;
    match value {
        V::Null => Value::Null,
        V::Boolean(b) => Value::Boolean(*b),
        V::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(IntValue::new_parsed(&i.to_string()))
            } else {
                Value::Float(n.as_f64().unwrap_or_default().into())
            }
        }
        V::String(s) => Value::String(s.clone().into()),
        V::Enum(e) => Value::Enum(Name::new(e.as_str()).unwrap_or_else(|_| Name::new("value").unwrap())),
        V::List(items) => Value::List(items.iter().map(|v| Node::new(async_graphql_value_to_ast(v))).collect()),
        V::Object(fields) => Value::Object(
            fields
                .iter()
                .filter_map(|(k, v)| {
                    Name::new(k.as_str())
                        .ok()
                        .map(|name| (name, Node::new(async_graphql_value_to_ast(v))))
                })
                .collect(),
        ),
        V::Binary(_) => Value::Null,
    }
}

/// Recursively rebuilds one selection field (and its children) as an
/// `apollo_compiler` AST field with no selection-set translation — callers
/// apply namespace reversal separately via `crate::proxy`'s helpers.
pub fn selection_field_to_ast(field: &SelectionField) -> Node<Field> {
    let name = Name::new(field.name()).unwrap_or_else(|_| Name::new("field").unwrap());
    let arguments: Vec<Node<Argument>> = field
        .arguments()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(arg_name, value)| {
            Name::new(arg_name.as_str()).ok().map(|name| {
                Node::new(Argument {
                    name,
                    value: Node::new(async_graphql_value_to_ast(&value)),
                })
            })
        })
        .collect();
    let selection_set: Vec<Selection> = field
        .selection_set()
        .map(|child| Selection::Field(selection_field_to_ast(&child)))
        .collect();
    Node::new(Field {
        alias: None,
        name,
        arguments,
        directives: Default::default(),
        selection_set,
    })
}

/// Flattens the field's own children into a selection set, since the root
/// field itself is represented separately by the caller (it becomes the
/// dispatched sub-query's own root, not a selection within one).
pub fn child_selection_set(field: &SelectionField) -> Vec<Selection> {
    field
        .selection_set()
        .map(|child| Selection::Field(selection_field_to_ast(&child)))
        .collect()
}
