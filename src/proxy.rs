//! The proxy resolver: reconstructs an upstream sub-query
//! from a merged-schema field's resolve info, dispatches it, and rewrites
//! the result back into the merged response's shape.
//!
//! Field *names* never get namespaced (only type names do — see
//! [`crate::transform`]/[`crate::merge`]), so the only rewriting a
//! reconstructed sub-query needs is on type conditions (inline fragments,
//! fragment spreads) and on variable values, which are substituted inline
//! rather than carried as a separate `variables` document — this crate's
//! merged operations never share a sub-query across two root fields, so
//! there's no reuse to lose by inlining.

use std::fmt;

use apollo_compiler::ast::{
    Argument, Directive, DirectiveList, Field, FragmentDefinition, InlineFragment, IntValue, Name,
    Selection, Value,
};
use apollo_compiler::schema::{ExtendedType, Type};
use apollo_compiler::{Node, Schema};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::path::ResponsePathStep;
use crate::ast::selection::add_field_selection_safely;
use crate::client::{GraphQlClient, GraphQlResponse};
use crate::config::LinkSpec;
use crate::error::SingleWeaverError;
use crate::error_path::rewrite_errors;
use crate::LinkKey;

/// Everything the proxy resolver needs about one merged-schema root field
/// invocation; the `async-graphql` `dynamic` integration (`src/lib.rs`)
/// builds this from a `ResolverContext`.
pub struct ResolveInfo {
    /// The field's original name on the upstream schema (before namespacing;
    /// from `RootFieldRoute::old_field_name`).
    pub upstream_field_name: Name,
    pub arguments: Vec<Node<Argument>>,
    pub selection_set: Vec<Selection>,
    pub fragments: IndexMap<Name, Node<FragmentDefinition>>,
    pub variable_values: serde_json::Map<String, JsonValue>,
    /// Full response path to this field in the overall merged response,
    /// used to rewrite any errors the sub-query reports.
    pub response_path: Vec<ResponsePathStep>,
}

/// Strips `{namespace}_` from `name` if present; type conditions in the
/// client's selection set are always namespaced (they reference merged
/// schema types), so this recovers the name the upstream schema actually
/// uses.
pub fn reverse_rename(namespace: &str, name: &Name) -> Name {
    let prefix = format!("{namespace}_");
    match name.as_str().strip_prefix(&prefix) {
        Some(rest) => Name::new(rest).unwrap_or_else(|_| name.clone()),
        None => name.clone(),
    }
}

/// Rejects a client selection that aliases a non-`__typename` field to the
/// literal name `__typename` — that alias is reserved for the discriminator
/// this module injects wherever fragments appear, and checking before
/// dispatch (rather than after, when the upstream response arrives) avoids
/// an upstream network round trip for a request that can never succeed.
pub fn check_no_reserved_field_alias(
    selections: &[Selection],
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
) -> Result<(), SingleWeaverError> {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    if alias.as_str() == "__typename" && field.name.as_str() != "__typename" {
                        return Err(SingleWeaverError::ReservedFieldAlias {
                            field: field.name.to_string(),
                        });
                    }
                }
                check_no_reserved_field_alias(&field.selection_set, fragments)?;
            }
            Selection::InlineFragment(inline) => {
                check_no_reserved_field_alias(&inline.selection_set, fragments)?;
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    check_no_reserved_field_alias(&fragment.selection_set, fragments)?;
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn json_to_graphql_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(IntValue::new_parsed(&i.to_string()))
            } else {
                Value::Float(n.as_f64().unwrap_or_default().into())
            }
        }
        JsonValue::String(s) => Value::String(s.clone().into()),
        JsonValue::Array(items) => Value::List(items.iter().map(|v| Node::new(json_to_graphql_value(v))).collect()),
        JsonValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| {
                    (
                        Name::new(k).unwrap_or_else(|_| Name::new("field").unwrap()),
                        Node::new(json_to_graphql_value(v)),
                    )
                })
                .collect(),
        ),
    }
}

/// Inverse of [`json_to_graphql_value`]: reads a (variable-substituted) AST
/// value back as JSON, so a client-supplied argument can be merged with a
/// JSON value built elsewhere (`crate::link`'s key-set filter merge).
/// `Value::Variable` should never reach here — callers substitute first.
pub(crate) fn graphql_value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null | Value::Variable(_) => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Int(i) => i
            .try_to_i32()
            .ok()
            .map(|i| JsonValue::Number(i.into()))
            .unwrap_or(JsonValue::Null),
        Value::Float(f) => f
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::Enum(e) => JsonValue::String(e.to_string()),
        Value::List(items) => JsonValue::Array(items.iter().map(|v| graphql_value_to_json(v)).collect()),
        Value::Object(fields) => {
            JsonValue::Object(fields.iter().map(|(k, v)| (k.to_string(), graphql_value_to_json(v))).collect())
        }
    }
}

/// Replaces every `Value::Variable` leaf with its bound value, recursing into
/// lists and objects. Variables with no bound value (shouldn't happen for a
/// validated client operation) become `null`.
pub(crate) fn substitute_variables(value: &Value, variable_values: &serde_json::Map<String, JsonValue>) -> Value {
    match value {
        Value::Variable(name) => variable_values
            .get(name.as_str())
            .map(json_to_graphql_value)
            .unwrap_or(Value::Null),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| Node::new(substitute_variables(v, variable_values)))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Node::new(substitute_variables(v, variable_values))))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub(crate) fn substitute_arguments(
    arguments: &[Node<Argument>],
    variable_values: &serde_json::Map<String, JsonValue>,
) -> Vec<Node<Argument>> {
    arguments
        .iter()
        .map(|arg| {
            Node::new(Argument {
                name: arg.name.clone(),
                value: Node::new(substitute_variables(&arg.value, variable_values)),
            })
        })
        .collect()
}

fn substitute_directives(
    directives: &DirectiveList,
    variable_values: &serde_json::Map<String, JsonValue>,
) -> DirectiveList {
    DirectiveList(
        directives
            .iter()
            .map(|directive| {
                Node::new(Directive {
                    name: directive.name.clone(),
                    arguments: substitute_arguments(&directive.arguments, variable_values),
                })
            })
            .collect(),
    )
}

/// The merged schema's own name for `ty`, unwrapping list/non-null wrappers —
/// the named type a link table or a field-return-type lookup keys on.
pub(crate) fn base_type_name(ty: &Type) -> Name {
    match ty {
        Type::Named(name) | Type::NonNullNamed(name) => name.clone(),
        Type::List(inner) | Type::NonNullList(inner) => base_type_name(inner),
    }
}

/// The merged-schema return type of `type_name.field_name`, if `type_name`
/// names an object or interface that declares it. `None` covers both "not
/// an object/interface" (scalars, unions with no own fields) and "field not
/// found" — callers fall back to forwarding the selection untranslated.
pub(crate) fn field_return_type_name(merged: &Schema, type_name: &Name, field_name: &Name) -> Option<Name> {
    let fields = match merged.types.get(type_name)? {
        ExtendedType::Object(obj) => &obj.fields,
        ExtendedType::Interface(iface) => &iface.fields,
        _ => return None,
    };
    Some(base_type_name(&fields.get(field_name)?.ty))
}

/// Recursively rewrites a selection set for upstream dispatch: fragment
/// spreads are inlined (the upstream has no idea what the client's fragment
/// definitions were named), type conditions are reverse-renamed, variable
/// references are substituted with literal values, `__typename` is injected
/// into any selection set that branches on type via a fragment (this crate's
/// own resolution of the returned JSON against the merged schema's
/// interfaces/unions needs that discriminator), and a field configured as a
/// link on `type_name` has its own nested selection dropped — the upstream
/// only ever has the bare join-key scalar there, the joined object is
/// resolved separately (`crate::splice`) against the *target* endpoint.
pub(crate) fn translate_selection_set(
    namespace: &str,
    selections: &[Selection],
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
    variable_values: &serde_json::Map<String, JsonValue>,
    type_name: &Name,
    merged: &Schema,
    links: &IndexMap<LinkKey, LinkSpec>,
) -> Vec<Selection> {
    let mut out = Vec::new();
    let mut saw_fragment = false;

    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let is_link = links.contains_key(&(type_name.clone(), field.name.clone()));
                let translated_inner = if is_link || field.selection_set.is_empty() {
                    Vec::new()
                } else {
                    let child_type =
                        field_return_type_name(merged, type_name, &field.name).unwrap_or_else(|| type_name.clone());
                    translate_selection_set(namespace, &field.selection_set, fragments, variable_values, &child_type, merged, links)
                };
                out.push(Selection::Field(Node::new(Field {
                    alias: field.alias.clone(),
                    name: field.name.clone(),
                    arguments: substitute_arguments(&field.arguments, variable_values),
                    directives: substitute_directives(&field.directives, variable_values),
                    selection_set: translated_inner,
                })));
            }
            Selection::InlineFragment(inline) => {
                saw_fragment = true;
                let inner_type = inline.type_condition.clone().unwrap_or_else(|| type_name.clone());
                out.push(Selection::InlineFragment(Node::new(InlineFragment {
                    type_condition: inline.type_condition.as_ref().map(|tc| reverse_rename(namespace, tc)),
                    directives: substitute_directives(&inline.directives, variable_values),
                    selection_set: translate_selection_set(
                        namespace,
                        &inline.selection_set,
                        fragments,
                        variable_values,
                        &inner_type,
                        merged,
                        links,
                    ),
                })));
            }
            Selection::FragmentSpread(spread) => {
                saw_fragment = true;
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    let inner_type = fragment.type_condition.clone();
                    out.push(Selection::InlineFragment(Node::new(InlineFragment {
                        type_condition: Some(reverse_rename(namespace, &fragment.type_condition)),
                        directives: substitute_directives(&spread.directives, variable_values),
                        selection_set: translate_selection_set(
                            namespace,
                            &fragment.selection_set,
                            fragments,
                            variable_values,
                            &inner_type,
                            merged,
                            links,
                        ),
                    })));
                }
            }
        }
    }

    if saw_fragment {
        add_field_selection_safely(&out, "__typename", fragments).selection_set
    } else {
        out
    }
}

/// The response key the dispatched field is sent under — fixed, rather than
/// derived from the client's alias, so this module never has to validate
/// that an arbitrary client alias is safe to use as an upstream alias too.
pub const DISPATCH_ALIAS: &str = "weaverResult";

pub struct SubqueryPlan {
    pub document_text: String,
    pub response_alias: Name,
}

/// Renders a single root field as a complete anonymous-operation document,
/// aliased to [`DISPATCH_ALIAS`]. Shared by the proxy resolver and the link
/// resolver (`crate::link`), which both dispatch exactly one root field per
/// sub-query.
pub(crate) fn render_single_field_document(
    field_name: &Name,
    arguments: Vec<Node<Argument>>,
    selection_set: Vec<Selection>,
) -> SubqueryPlan {
    let response_alias = Name::new(DISPATCH_ALIAS).expect("constant is a valid GraphQL name");
    let root_field = Field {
        alias: Some(response_alias.clone()),
        name: field_name.clone(),
        arguments,
        directives: DirectiveList::default(),
        selection_set,
    };
    SubqueryPlan {
        document_text: format!("{{\n{root_field}\n}}"),
        response_alias,
    }
}

/// Builds the GraphQL document text to send upstream for one merged root
/// field invocation. `type_name` is the field's own merged return type —
/// the type context `translate_selection_set` needs to recognize configured
/// links among its direct selections.
pub fn build_root_subquery(
    namespace: &str,
    info: &ResolveInfo,
    type_name: &Name,
    merged: &Schema,
    links: &IndexMap<LinkKey, LinkSpec>,
) -> Result<SubqueryPlan, SingleWeaverError> {
    check_no_reserved_field_alias(&info.selection_set, &info.fragments)?;
    let translated = translate_selection_set(
        namespace,
        &info.selection_set,
        &info.fragments,
        &info.variable_values,
        type_name,
        merged,
        links,
    );
    Ok(render_single_field_document(
        &info.upstream_field_name,
        substitute_arguments(&info.arguments, &info.variable_values),
        translated,
    ))
}

/// Dispatches `plan` to `endpoint_url`, extracts the leaf value at
/// `plan.response_alias`, and rewrites any errors' paths to be relative to
/// `outer_path` (the field's position in the overall merged response).
pub async fn dispatch_and_splice(
    client: &dyn GraphQlClient,
    endpoint_name: &str,
    endpoint_url: &str,
    plan: &SubqueryPlan,
    outer_path: &[JsonValue],
) -> Result<(Option<JsonValue>, Vec<JsonValue>), SingleWeaverError> {
    let GraphQlResponse { data, errors } = client
        .execute(endpoint_url, &plan.document_text, None, None)
        .await
        .map_err(|err| SingleWeaverError::Subquery {
            endpoint: endpoint_name.to_owned(),
            errors: vec![err.to_string()],
        })?;
    let leaf = data.and_then(|mut value| value.get_mut(plan.response_alias.as_str()).map(JsonValue::take));
    let rewritten_errors = rewrite_errors(&errors, outer_path, 1);
    Ok((leaf, rewritten_errors))
}

impl fmt::Debug for ResolveInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveInfo")
            .field("upstream_field_name", &self.upstream_field_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Node<Field> {
        Node::new(Field {
            alias: None,
            name: Name::new(name).unwrap(),
            arguments: Vec::new(),
            directives: DirectiveList::default(),
            selection_set: Vec::new(),
        })
    }

    #[test]
    fn reverse_rename_strips_namespace_prefix() {
        let name = Name::new("inventory_Item").unwrap();
        assert_eq!(reverse_rename("inventory", &name).as_str(), "Item");
    }

    #[test]
    fn reverse_rename_leaves_unprefixed_names_alone() {
        let name = Name::new("String").unwrap();
        assert_eq!(reverse_rename("inventory", &name).as_str(), "String");
    }

    #[test]
    fn reserved_alias_on_non_typename_field_is_rejected() {
        let mut f = field("sku").make_mut().clone();
        f.alias = Some(Name::new("__typename").unwrap());
        let selections = vec![Selection::Field(Node::new(f))];
        let err = check_no_reserved_field_alias(&selections, &IndexMap::new()).unwrap_err();
        assert!(matches!(err, SingleWeaverError::ReservedFieldAlias { .. }));
    }

    #[test]
    fn typename_aliased_to_itself_is_allowed() {
        let mut f = field("__typename").make_mut().clone();
        f.alias = Some(Name::new("__typename").unwrap());
        let selections = vec![Selection::Field(Node::new(f))];
        assert!(check_no_reserved_field_alias(&selections, &IndexMap::new()).is_ok());
    }

    #[test]
    fn build_root_subquery_dispatches_under_fixed_alias() {
        let info = ResolveInfo {
            upstream_field_name: Name::new("sku").unwrap(),
            arguments: Vec::new(),
            selection_set: vec![Selection::Field(field("id"))],
            fragments: IndexMap::new(),
            variable_values: serde_json::Map::new(),
            response_path: Vec::new(),
        };
        let merged = apollo_compiler::Schema::parse("type Query { sku: Sku } type Sku { id: ID }", "s.graphql")
            .validate()
            .unwrap()
            .into_inner();
        let type_name = Name::new("Sku").unwrap();
        let links = IndexMap::new();
        let plan = build_root_subquery("inventory", &info, &type_name, &merged, &links).unwrap();
        assert_eq!(plan.response_alias.as_str(), DISPATCH_ALIAS);
        assert!(plan.document_text.contains("sku"));
    }
}
