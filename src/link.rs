//! The link resolver: joins a scalar foreign-key field on
//! one endpoint's type to a root query on another endpoint.
//!
//! A link is configured on the endpoint that *owns* the foreign key, keyed
//! by the dotted `TypeName.fieldName` path of the field to replace (see
//! `EndpointConfig::links`). Once installed, that field's declared type
//! becomes the target object type instead of the raw scalar; this module
//! provides the sub-query construction and result remapping `crate::splice`
//! drives while walking a dispatched response. Coalescing many parents'
//! join keys into one batched upstream call happens there too, since the
//! whole batch (a JSON array of siblings) is visible in one place at the
//! point the splice walk reaches it — no per-tick request coalescer needed.

use apollo_compiler::ast::{Argument, FragmentDefinition, Name, Selection};
use apollo_compiler::Node;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::selection::add_field_selection_safely;
use crate::config::LinkSpec;
use crate::error::SingleWeaverError;
use crate::proxy::{json_to_graphql_value, render_single_field_document, SubqueryPlan};

/// Builds the argument value bound to the target field, merging a
/// user-supplied filter object with the key-set constraint for join/filter
/// mode (`argument: "filter.code"`). The key-set value always wins at
/// `filter_field` even if the client also supplied it there; other fields
/// of a client-supplied filter object pass through untouched. Plain mode
/// (`argument: "code"`, no `filter_field`) ignores `client_filter` and
/// returns the bare key/keys value.
pub fn merge_client_filter(spec: &LinkSpec, key_argument_value: JsonValue, client_filter: Option<JsonValue>) -> JsonValue {
    match &spec.argument.filter_field {
        Some(filter_field) => {
            let mut object = match client_filter {
                Some(JsonValue::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
            object.insert(filter_field.clone(), key_argument_value);
            JsonValue::Object(object)
        }
        None => key_argument_value,
    }
}

fn build_argument_value(spec: &LinkSpec, key_value: JsonValue) -> JsonValue {
    merge_client_filter(spec, key_value, None)
}

fn target_field_name(spec: &LinkSpec) -> Result<Name, SingleWeaverError> {
    let field_name = spec
        .field
        .last()
        .ok_or_else(|| SingleWeaverError::Weaving {
            parent_type: String::new(),
            field: String::new(),
            message: "link `field` path must name a root field".to_owned(),
        })?;
    Name::new(field_name).map_err(|err| SingleWeaverError::Weaving {
        parent_type: String::new(),
        field: String::new(),
        message: format!("link target field `{field_name}` is not a valid GraphQL name: {err}"),
    })
}

fn argument_name(spec: &LinkSpec) -> Result<Name, SingleWeaverError> {
    Name::new(&spec.argument.argument).map_err(|err| SingleWeaverError::Weaving {
        parent_type: String::new(),
        field: String::new(),
        message: format!("link argument name invalid: {err}"),
    })
}

/// The target selection set a link's sub-query sends upstream: the client's
/// own nested selection, plus (batched + keyed mode only) `key_field`
/// appended if the client didn't already select it — `remap_by_key_field`
/// reads `result[key_field]` off every returned object, so it has to be
/// there even when nobody asked for it.
pub fn build_target_selection(
    spec: &LinkSpec,
    client_selection: &[Selection],
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
) -> Vec<Selection> {
    match &spec.key_field {
        Some(key_field) if spec.batch_mode => {
            add_field_selection_safely(client_selection, key_field, fragments).selection_set
        }
        _ => client_selection.to_vec(),
    }
}

/// Single-object mode (`batch_mode: false`): one upstream call per parent,
/// the target field returning exactly one object. `client_filter` and
/// `extra_arguments` (forwarded `orderBy`/`first`/`skip`) are join/filter
/// mode only; both are empty/`None` in plain scalar-argument mode.
pub fn build_single_join_subquery(
    spec: &LinkSpec,
    key_value: JsonValue,
    client_filter: Option<JsonValue>,
    extra_arguments: Vec<Node<Argument>>,
    target_selection_set: Vec<Selection>,
) -> Result<SubqueryPlan, SingleWeaverError> {
    let field_name = target_field_name(spec)?;
    let argument_value = merge_client_filter(spec, key_value, client_filter);
    let mut arguments = vec![Node::new(Argument {
        name: argument_name(spec)?,
        value: Node::new(json_to_graphql_value(&argument_value)),
    })];
    arguments.extend(extra_arguments);
    Ok(render_single_field_document(&field_name, arguments, target_selection_set))
}

/// Batched mode (`batch_mode: true`): one upstream call for every parent in
/// the current wave, with `key_values` collected by the caller across all
/// siblings that need this link this round.
pub fn build_batched_join_subquery(
    spec: &LinkSpec,
    key_values: &[JsonValue],
    client_filter: Option<JsonValue>,
    extra_arguments: Vec<Node<Argument>>,
    target_selection_set: Vec<Selection>,
) -> Result<SubqueryPlan, SingleWeaverError> {
    let field_name = target_field_name(spec)?;
    let argument_value = merge_client_filter(spec, JsonValue::Array(key_values.to_vec()), client_filter);
    let mut arguments = vec![Node::new(Argument {
        name: argument_name(spec)?,
        value: Node::new(json_to_graphql_value(&argument_value)),
    })];
    arguments.extend(extra_arguments);
    Ok(render_single_field_document(&field_name, arguments, target_selection_set))
}

/// Order-preserving remap (`batch_mode: true`, no `key_field`): the Nth
/// result corresponds to the Nth requested key, by the target field's own
/// contract. `results` shorter than `key_values` pads with `None`.
pub fn remap_order_preserving(key_values: &[JsonValue], mut results: Vec<JsonValue>) -> Vec<Option<JsonValue>> {
    results.truncate(key_values.len());
    let mut remapped: Vec<Option<JsonValue>> = results.into_iter().map(Some).collect();
    remapped.resize(key_values.len(), None);
    remapped
}

/// Key-field remap (`batch_mode: true`, `key_field: Some(_)`): results may
/// come back in any order, or a different count, so each is matched back to
/// its requesting parent by comparing `result[key_field]` against the
/// parent's join key value.
pub fn remap_by_key_field(
    key_values: &[JsonValue],
    results: &[JsonValue],
    key_field: &str,
) -> Result<Vec<Option<JsonValue>>, SingleWeaverError> {
    let mut by_key: std::collections::HashMap<String, &JsonValue> = std::collections::HashMap::new();
    for result in results {
        let key = result.get(key_field).ok_or_else(|| SingleWeaverError::KeyFieldError {
            path: key_field.to_owned(),
        })?;
        if !key.is_string() && !key.is_number() && !key.is_boolean() {
            return Err(SingleWeaverError::KeyFieldError {
                path: key_field.to_owned(),
            });
        }
        by_key.insert(canonical_key(key), result);
    }
    Ok(key_values
        .iter()
        .map(|key_value| by_key.get(&canonical_key(key_value)).map(|v| (*v).clone()))
        .collect())
}

fn canonical_key(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
