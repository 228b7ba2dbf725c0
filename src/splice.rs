//! Eager link splicing: after a root field's sub-query comes back, walks the
//! returned JSON in lockstep with the client's own (fragment-preserving,
//! untranslated) selection set and resolves every configured link found
//! anywhere in the subtree before the value is ever handed to
//! `async-graphql` as a `FieldValue`.
//!
//! Doing this eagerly, inside the root field's own resolver, means a linked
//! field is already a fully-joined JSON value by the time `async-graphql`
//! asks for it — it needs no resolver of its own beyond the same generic
//! JSON-property passthrough every other field gets. Batching falls out the
//! same way: when the walk reaches a JSON array whose element type has a
//! configured batch-mode link, every sibling's join key is visible at once,
//! so one upstream call covers the whole array instead of one per element.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use apollo_compiler::ast::{Argument, FragmentDefinition, Name, Selection};
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::{Node, Schema};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::client::GraphQlClient;
use crate::config::LinkSpec;
use crate::error::SingleWeaverError;
use crate::link::{build_batched_join_subquery, build_single_join_subquery, build_target_selection, remap_by_key_field, remap_order_preserving};
use crate::proxy::{dispatch_and_splice, field_return_type_name, graphql_value_to_json, substitute_arguments, translate_selection_set};
use crate::{EndpointRuntime, LinkKey};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a splice pass needs about the woven schema and its live
/// endpoints; borrowed for the duration of one root field's resolution.
pub struct SpliceContext<'a> {
    pub client: &'a dyn GraphQlClient,
    pub merged: &'a Schema,
    pub links: &'a IndexMap<LinkKey, LinkSpec>,
    pub link_target_types: &'a IndexMap<LinkKey, Name>,
    pub runtimes: &'a HashMap<String, EndpointRuntime>,
}

impl<'a> SpliceContext<'a> {
    fn endpoint_url(&self, endpoint_name: &str) -> Option<String> {
        self.runtimes.get(endpoint_name).map(|r| r.url.clone())
    }

    fn namespace_of(&self, endpoint_name: &str) -> String {
        self.runtimes
            .get(endpoint_name)
            .map(|r| r.namespace.clone())
            .unwrap_or_else(|| endpoint_name.to_owned())
    }
}

fn flatten_fields(
    selections: &[Selection],
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
    out: &mut Vec<Node<apollo_compiler::ast::Field>>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => out.push(field.clone()),
            Selection::InlineFragment(inline) => flatten_fields(&inline.selection_set, fragments, out),
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    flatten_fields(&fragment.selection_set, fragments, out);
                }
            }
        }
    }
}

/// Resolves `type_name` down to the concrete type a JSON object actually is,
/// via its (already-namespaced-on-the-merged-schema) `__typename`, when
/// `type_name` names an interface or union. Gives up and keeps `type_name`
/// as-is if `__typename` is absent or unrecognized — splice simply won't
/// descend into that object's own links in that case, a scoped limitation
/// for abstract types recorded in `DESIGN.md`.
fn resolve_concrete_type(merged: &Schema, value: &JsonValue, type_name: &Name, namespace: &str) -> Name {
    match merged.types.get(type_name) {
        Some(ExtendedType::Interface(_)) | Some(ExtendedType::Union(_)) => value
            .get("__typename")
            .and_then(JsonValue::as_str)
            .and_then(|raw| Name::new(format!("{namespace}_{raw}")).ok())
            .filter(|concrete| merged.types.contains_key(concrete))
            .unwrap_or_else(|| type_name.clone()),
        _ => type_name.clone(),
    }
}

fn extract_client_filter(
    spec: &LinkSpec,
    raw_arguments: &[Node<Argument>],
    variable_values: &serde_json::Map<String, JsonValue>,
) -> Option<JsonValue> {
    spec.argument.filter_field.as_ref()?;
    substitute_arguments(raw_arguments, variable_values)
        .into_iter()
        .find(|arg| arg.name.as_str() == spec.argument.argument)
        .map(|arg| graphql_value_to_json(&arg.value))
}

fn forwarded_paging_arguments(
    spec: &LinkSpec,
    raw_arguments: &[Node<Argument>],
    variable_values: &serde_json::Map<String, JsonValue>,
) -> Vec<Node<Argument>> {
    if spec.argument.filter_field.is_none() {
        return Vec::new();
    }
    substitute_arguments(raw_arguments, variable_values)
        .into_iter()
        .filter(|arg| matches!(arg.name.as_str(), "orderBy" | "first" | "skip"))
        .collect()
}

/// Walks `value` against `selection_set` (interpreted against `type_name`
/// on the merged schema) and resolves every configured link found, mutating
/// `value` in place. `value` is a leaf-level JSON value already returned by
/// one upstream dispatch — nested link fields in it are still unresolved
/// scalars/IDs at this point.
pub fn resolve_links_in_value<'a>(
    cx: &'a SpliceContext<'a>,
    value: &'a mut JsonValue,
    selection_set: &'a [Selection],
    fragments: &'a IndexMap<Name, Node<FragmentDefinition>>,
    variable_values: &'a serde_json::Map<String, JsonValue>,
    type_name: &'a Name,
    namespace: &'a str,
) -> BoxFuture<'a, Result<(), SingleWeaverError>> {
    Box::pin(async move {
        match value {
            JsonValue::Array(items) => {
                let mut fields = Vec::new();
                flatten_fields(selection_set, fragments, &mut fields);
                let skip = dispatch_batched_links(cx, items, &fields, type_name, fragments, variable_values, namespace).await?;
                for item in items.iter_mut() {
                    resolve_object_fields(cx, item, &fields, fragments, variable_values, type_name, namespace, &skip).await?;
                }
                Ok(())
            }
            JsonValue::Object(_) => {
                let effective_type = resolve_concrete_type(cx.merged, value, type_name, namespace);
                let mut fields = Vec::new();
                flatten_fields(selection_set, fragments, &mut fields);
                resolve_object_fields(cx, value, &fields, fragments, variable_values, &effective_type, namespace, &HashSet::new()).await
            }
            _ => Ok(()),
        }
    })
}

/// Resolves every direct field of `value` (an object) against `fields`,
/// recursing into non-link children and dispatching any configured single
/// (non-batched) link found. `skip` names output keys already resolved by
/// an enclosing batched dispatch (array path only).
fn resolve_object_fields<'a>(
    cx: &'a SpliceContext<'a>,
    value: &'a mut JsonValue,
    fields: &'a [Node<apollo_compiler::ast::Field>],
    fragments: &'a IndexMap<Name, Node<FragmentDefinition>>,
    variable_values: &'a serde_json::Map<String, JsonValue>,
    type_name: &'a Name,
    namespace: &'a str,
    skip: &'a HashSet<Name>,
) -> BoxFuture<'a, Result<(), SingleWeaverError>> {
    Box::pin(async move {
        for raw_field in fields {
            let output_key = raw_field.alias.clone().unwrap_or_else(|| raw_field.name.clone());
            if output_key.as_str() == "__typename" || skip.contains(&output_key) {
                continue;
            }
            let link_key = (type_name.clone(), raw_field.name.clone());
            if let Some(spec) = cx.links.get(&link_key) {
                resolve_single_link(cx, value, &output_key, raw_field, spec, &link_key, fragments, variable_values, namespace).await?;
                continue;
            }
            if raw_field.selection_set.is_empty() {
                continue;
            }
            let Some(child_value) = value.get_mut(output_key.as_str()) else { continue };
            if child_value.is_null() {
                continue;
            }
            let child_type = field_return_type_name(cx.merged, type_name, &raw_field.name).unwrap_or_else(|| type_name.clone());
            resolve_links_in_value(cx, child_value, &raw_field.selection_set, fragments, variable_values, &child_type, namespace).await?;
        }
        Ok(())
    })
}

async fn resolve_single_link<'a>(
    cx: &SpliceContext<'a>,
    value: &mut JsonValue,
    output_key: &Name,
    raw_field: &Node<apollo_compiler::ast::Field>,
    spec: &LinkSpec,
    link_key: &LinkKey,
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
    variable_values: &serde_json::Map<String, JsonValue>,
    namespace: &str,
) -> Result<(), SingleWeaverError> {
    let key_value = value.get(output_key.as_str()).cloned().unwrap_or(JsonValue::Null);
    let joined = if key_value.is_null() {
        None
    } else {
        let joined = dispatch_link(cx, spec, link_key, &[key_value.clone()], raw_field, fragments, variable_values, namespace).await?;
        let remapped = match &spec.key_field {
            Some(key_field) if spec.batch_mode => remap_by_key_field(&[key_value], joined.as_slice(), key_field)?,
            _ => remap_order_preserving(&[JsonValue::Null], joined),
        };
        remapped.into_iter().next().flatten()
    };

    let target_namespace = cx.namespace_of(&spec.target_endpoint);
    let mut joined = joined;
    if let (Some(joined_value), Some(target_type)) = (joined.as_mut(), cx.link_target_types.get(link_key)) {
        resolve_links_in_value(cx, joined_value, &raw_field.selection_set, fragments, variable_values, target_type, &target_namespace).await?;
    }
    if let JsonValue::Object(map) = value {
        map.insert(output_key.to_string(), joined.unwrap_or(JsonValue::Null));
    }
    Ok(())
}

/// Dispatches one upstream call for `key_values` (a single-element slice for
/// a non-batched link, or a whole sibling group for a batched one) and
/// returns the raw target-field results, un-remapped.
async fn dispatch_link<'a>(
    cx: &SpliceContext<'a>,
    spec: &LinkSpec,
    link_key: &LinkKey,
    key_values: &[JsonValue],
    raw_field: &Node<apollo_compiler::ast::Field>,
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
    variable_values: &serde_json::Map<String, JsonValue>,
    namespace: &str,
) -> Result<Vec<JsonValue>, SingleWeaverError> {
    let target_namespace = cx.namespace_of(&spec.target_endpoint);
    let target_url = cx.endpoint_url(&spec.target_endpoint).ok_or_else(|| SingleWeaverError::Weaving {
        parent_type: link_key.0.to_string(),
        field: link_key.1.to_string(),
        message: format!("link target endpoint `{}` not found at request time", spec.target_endpoint),
    })?;

    let raw_target_selection = build_target_selection(spec, &raw_field.selection_set, fragments);
    let target_type = cx.link_target_types.get(link_key);
    let target_selection = match target_type {
        Some(tt) => translate_selection_set(&target_namespace, &raw_target_selection, fragments, variable_values, tt, cx.merged, cx.links),
        None => raw_target_selection,
    };

    let client_filter = extract_client_filter(spec, &raw_field.arguments, variable_values);
    let extra_arguments = forwarded_paging_arguments(spec, &raw_field.arguments, variable_values);

    let plan = if spec.batch_mode {
        build_batched_join_subquery(spec, key_values, client_filter, extra_arguments, target_selection)?
    } else {
        build_single_join_subquery(spec, key_values[0].clone(), client_filter, extra_arguments, target_selection)?
    };

    let outer_path = vec![JsonValue::String(link_key.1.to_string())];
    let (leaf, _errors) = dispatch_and_splice(cx.client, &spec.target_endpoint, &target_url, &plan, &outer_path).await?;
    Ok(match leaf {
        Some(JsonValue::Array(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    })
}

/// Detects every batch-mode link among `fields` (declared on `type_name`)
/// and, for each, dispatches one upstream call covering every element of
/// `items` with a non-null join key, splicing results back into place.
/// Returns the set of output keys it handled, so the per-item pass that
/// follows doesn't dispatch them again.
async fn dispatch_batched_links<'a>(
    cx: &SpliceContext<'a>,
    items: &mut [JsonValue],
    fields: &[Node<apollo_compiler::ast::Field>],
    type_name: &Name,
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
    variable_values: &serde_json::Map<String, JsonValue>,
    namespace: &str,
) -> Result<HashSet<Name>, SingleWeaverError> {
    let mut handled = HashSet::new();

    for raw_field in fields {
        let link_key = (type_name.clone(), raw_field.name.clone());
        let Some(spec) = cx.links.get(&link_key) else { continue };
        if !spec.batch_mode {
            continue;
        }
        let output_key = raw_field.alias.clone().unwrap_or_else(|| raw_field.name.clone());
        if !handled.insert(output_key.clone()) {
            continue;
        }

        let key_values: Vec<JsonValue> = items
            .iter()
            .map(|item| item.get(output_key.as_str()).cloned().unwrap_or(JsonValue::Null))
            .collect();
        let live_keys: Vec<JsonValue> = key_values.iter().cloned().filter(|v| !v.is_null()).collect();
        if live_keys.is_empty() {
            continue;
        }

        let results = dispatch_link(cx, spec, &link_key, &live_keys, raw_field, fragments, variable_values, namespace).await?;
        let remapped = match &spec.key_field {
            Some(key_field) => remap_by_key_field(&live_keys, &results, key_field)?,
            None => remap_order_preserving(&live_keys, results),
        };

        let mut remapped_iter = remapped.into_iter();
        for (item, key_value) in items.iter_mut().zip(key_values.iter()) {
            let joined = if key_value.is_null() { None } else { remapped_iter.next().flatten() };
            if let JsonValue::Object(map) = item {
                map.insert(output_key.to_string(), joined.unwrap_or(JsonValue::Null));
            }
        }

        if let Some(target_type) = cx.link_target_types.get(&link_key) {
            let target_namespace = cx.namespace_of(&spec.target_endpoint);
            for item in items.iter_mut() {
                if let Some(child) = item.get_mut(output_key.as_str()) {
                    if !child.is_null() {
                        resolve_links_in_value(cx, child, &raw_field.selection_set, fragments, variable_values, target_type, &target_namespace).await?;
                    }
                }
            }
        }
    }

    Ok(handled)
}
