//! Federates a set of upstream GraphQL endpoints into one executable schema.
//!
//! [`Weaver::build`] is the boot-time entry point: it
//! introspects every configured endpoint, namespaces and merges their
//! schemas ([`merge`]), installs link resolvers ([`link`]) over the
//! configured foreign-key joins, and returns a [`WovenSchema`] whose
//! `async_graphql::dynamic::Schema` resolves every field by dispatching to
//! the owning upstream ([`proxy`]).

pub mod ast;
pub mod client;
pub mod config;
pub mod error;
pub mod error_path;
pub mod introspection;
pub mod link;
pub mod merge;
pub mod proxy;
pub mod request_context;
pub mod resolve_info;
pub mod splice;
pub mod transform;

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::schema::{ExtendedType, Type};
use apollo_compiler::ast::Name;
use apollo_compiler::Schema;
use async_graphql::dynamic::{
    Field as DynamicField, FieldFuture, FieldValue, InputValue, Object as DynamicObject, Scalar,
    Schema as DynamicSchema, SchemaError, TypeRef,
};
use indexmap::IndexMap;
use tracing::{info, instrument, warn};

use crate::ast::{collect_aliases_in_response_path, collect_field_nodes_in_path, ResponsePathStep};
use crate::client::{fetch_introspection, GraphQlClient};
use crate::config::{Endpoint, LinkSpec};
use crate::error::{SingleWeaverError, WeaverError, WeaverResult};
use crate::introspection::schema_from_introspection;
use crate::merge::{weave_schemas, MergedSchema, RoutingTable};
use crate::proxy::{base_type_name, build_root_subquery, dispatch_and_splice, ResolveInfo};
use crate::request_context::{with_parsed_operation, ParsedOperation};
use crate::resolve_info::child_selection_set;
use crate::splice::{resolve_links_in_value, SpliceContext};

/// A key identifying one configured link by the merged schema's parent type
/// and field name.
pub(crate) type LinkKey = (Name, Name);

pub(crate) struct EndpointRuntime {
    pub(crate) namespace: String,
    pub(crate) url: String,
}

/// Wraps the executable dynamic schema so every request's raw operation text
/// gets parsed once, up front, into a [`ParsedOperation`] that resolvers
/// reach via `crate::request_context::current()` — `async-graphql`'s own
/// per-field `SelectionField` has already flattened fragments away by the
/// time a resolver sees it, which isn't enough to reconstruct an
/// upstream-safe sub-query for a selection that branches on type.
pub struct ProxySchema {
    inner: DynamicSchema,
}

impl ProxySchema {
    pub async fn execute(&self, request: impl Into<async_graphql::Request>) -> async_graphql::Response {
        let request = request.into();
        let variable_values = serde_json::to_value(&request.variables)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        match ParsedOperation::parse(&request.query, request.operation_name.as_deref(), variable_values) {
            Some(parsed) => with_parsed_operation(parsed, self.inner.execute(request)).await,
            None => self.inner.execute(request).await,
        }
    }

    pub fn sdl(&self) -> String {
        self.inner.sdl()
    }
}

/// The fully woven, request-ready schema plus the bookkeeping its resolvers
/// close over.
pub struct WovenSchema {
    pub schema: ProxySchema,
}

/// Orchestrates boot: introspect, namespace, merge, install links, execute.
pub struct Weaver;

impl Weaver {
    #[instrument(skip(client, endpoints))]
    pub async fn build(
        endpoints: Vec<Endpoint>,
        client: Arc<dyn GraphQlClient>,
    ) -> WeaverResult<WovenSchema> {
        if endpoints.is_empty() {
            return Err(WeaverError::Single(SingleWeaverError::Config {
                message: "at least one endpoint must be configured".to_owned(),
            }));
        }

        let mut errors = Vec::new();
        let mut sources: Vec<(Endpoint, Schema)> = Vec::new();
        for endpoint in endpoints {
            info!(endpoint = %endpoint.name, url = %endpoint.url, "introspecting upstream endpoint");
            match introspect_one(client.as_ref(), &endpoint).await {
                Ok(schema) => sources.push((endpoint, schema)),
                Err(err) => errors.push(err),
            }
        }
        if !errors.is_empty() {
            return Err(if errors.len() == 1 {
                WeaverError::Single(errors.remove(0))
            } else {
                WeaverError::Multiple(errors)
            });
        }

        let MergedSchema { schema: merged, routes } = weave_schemas(&sources)?;

        let links = collect_link_specs(&sources);
        let link_target_types = collect_link_target_types(&sources, &links);
        let link_filter_argument_types = collect_link_filter_argument_types(&sources, &links);
        let runtimes: HashMap<String, EndpointRuntime> = sources
            .iter()
            .map(|(endpoint, _)| {
                (
                    endpoint.name.clone(),
                    EndpointRuntime {
                        namespace: endpoint.namespace.clone(),
                        url: endpoint.url.to_string(),
                    },
                )
            })
            .collect();

        let inner = build_dynamic_schema(
            Arc::new(merged),
            &routes,
            Arc::new(links),
            Arc::new(link_target_types),
            Arc::new(link_filter_argument_types),
            Arc::clone(&client),
            Arc::new(runtimes),
        )
        .map_err(|err| SingleWeaverError::internal(err.to_string()))?;

        Ok(WovenSchema { schema: ProxySchema { inner } })
    }
}

async fn introspect_one(client: &dyn GraphQlClient, endpoint: &Endpoint) -> Result<Schema, SingleWeaverError> {
    let schema_json = fetch_introspection(client, &endpoint.name, endpoint.url.as_str()).await?;
    schema_from_introspection(&endpoint.name, &schema_json)
}

/// Reads every endpoint's `links` map into a flat `(ParentType.field) -> LinkSpec`
/// table keyed by the field's *namespaced* parent type, matching the names
/// that survive into the merged schema.
fn collect_link_specs(sources: &[(Endpoint, Schema)]) -> IndexMap<LinkKey, LinkSpec> {
    let mut table = IndexMap::new();
    for (endpoint, _) in sources {
        for (dotted_path, spec) in &endpoint.links {
            let Some((type_name, field_name)) = dotted_path.split_once('.') else {
                warn!(path = %dotted_path, "link path is not `Type.field`; skipping");
                continue;
            };
            let Ok(namespaced_type) = Name::new(format!("{}_{type_name}", endpoint.namespace)) else {
                continue;
            };
            let Ok(field_name) = Name::new(field_name) else {
                continue;
            };
            table.insert((namespaced_type, field_name), spec.clone());
        }
    }
    table
}

/// The target root field a link's `field` path names, plus the endpoint it
/// belongs to — shared by [`link_target_type`] and [`link_argument_type`],
/// which both need to look something up on that field's un-namespaced
/// declaration.
fn target_root_field_def<'a>(
    sources: &'a [(Endpoint, Schema)],
    spec: &LinkSpec,
) -> Option<(&'a Endpoint, &'a apollo_compiler::schema::FieldDefinition)> {
    let (target_endpoint, target_schema) = sources.iter().find(|(e, _)| e.name == spec.target_endpoint)?;
    let mut segments = spec.field.iter();
    let root_kind = segments.next()?;
    let field_name = segments.next()?;
    let root_component = match root_kind.as_str() {
        "query" => target_schema.schema_definition.query.as_ref(),
        "mutation" => target_schema.schema_definition.mutation.as_ref(),
        "subscription" => target_schema.schema_definition.subscription.as_ref(),
        _ => None,
    }?;
    let ExtendedType::Object(root_object) = target_schema.types.get(&root_component.name)? else {
        return None;
    };
    let field_name = Name::new(field_name).ok()?;
    Some((target_endpoint, root_object.fields.get(&field_name)?))
}

/// Looks up the target root field's return type (per `spec.field`, a dotted
/// `query|mutation|subscription.fieldName` path) on its own endpoint's
/// *un-namespaced* schema and namespaces the result the same way
/// [`merge::weave_schemas`] would — this is the type a linked field resolves
/// to once installed. Returns
/// `None` on any lookup failure; the caller falls back to the field's
/// originally-declared scalar type, a best-effort passthrough.
fn link_target_type(sources: &[(Endpoint, Schema)], spec: &LinkSpec) -> Option<Name> {
    let (target_endpoint, field_def) = target_root_field_def(sources, spec)?;
    let base = match unwrap_one_list_level(&field_def.ty) {
        Type::Named(name) | Type::NonNullNamed(name) => name,
        _ => return None,
    };
    if crate::transform::is_native_type_name(base.as_str()) {
        Some(base)
    } else {
        Name::new(format!("{}_{base}", target_endpoint.namespace)).ok()
    }
}

/// Looks up the declared type of one of the target root field's own
/// arguments, namespaced the same way a merged input/object type would be —
/// used to declare the client-facing argument a join/filter-mode link field
/// exposes for its merged filter object (see [`collect_link_filter_argument_types`]).
fn link_argument_type(sources: &[(Endpoint, Schema)], spec: &LinkSpec, argument_name: &str) -> Option<Name> {
    let (target_endpoint, field_def) = target_root_field_def(sources, spec)?;
    let argument = field_def.arguments.iter().find(|a| a.name.as_str() == argument_name)?;
    let base = crate::proxy::base_type_name(&argument.ty);
    if crate::transform::is_native_type_name(base.as_str()) {
        Some(base)
    } else {
        Name::new(format!("{}_{base}", target_endpoint.namespace)).ok()
    }
}

/// For every join/filter-mode link (`argument.filter_field` set), the
/// merged-schema type of the client-facing filter argument the link field
/// should declare — named the same as `spec.argument.argument` (`"filter"`
/// in the usual case), so `crate::splice::extract_client_filter` can read it
/// straight back off the client's own selection. Links whose target
/// argument type can't be resolved simply don't get the argument declared;
/// a client can still reach the link, just without its own filter.
fn collect_link_filter_argument_types(
    sources: &[(Endpoint, Schema)],
    links: &IndexMap<LinkKey, LinkSpec>,
) -> IndexMap<LinkKey, Name> {
    links
        .iter()
        .filter(|(_, spec)| spec.argument.filter_field.is_some())
        .filter_map(|(key, spec)| link_argument_type(sources, spec, &spec.argument.argument).map(|ty| (key.clone(), ty)))
        .collect()
}

/// Resolves every configured link's target type, matching `links`' keys.
/// Links whose target field can't be found fall back silently to the
/// originally-declared scalar type at field-build time (see
/// [`link_target_type`]).
fn collect_link_target_types(
    sources: &[(Endpoint, Schema)],
    links: &IndexMap<LinkKey, LinkSpec>,
) -> IndexMap<LinkKey, Name> {
    let mut table = IndexMap::new();
    for (key, spec) in links {
        match link_target_type(sources, spec) {
            Some(target_type) => {
                table.insert(key.clone(), target_type);
            }
            None => {
                warn!(
                    parent_type = %key.0,
                    field = %key.1,
                    target_endpoint = %spec.target_endpoint,
                    "could not resolve link target type; falling back to the field's declared type"
                );
            }
        }
    }
    table
}

/// Surfaces a dispatched sub-query's rewritten errors (`error_path::rewrite_errors`)
/// the best this host's resolver contract allows: a `FieldFuture` resolves to
/// at most one `Result`, attributed to *this* field's own execution path, so
/// only a whole-field failure (`leaf` absent) can be faithfully reported as
/// an `Err` here. Errors alongside present data point at a path nested below
/// this field — `async-graphql`'s dynamic context exposes no side-channel to
/// attach a response error at an arbitrary path, so those are logged rather
/// than silently dropped; see `DESIGN.md`.
fn surface_subquery_errors(
    leaf: Option<serde_json::Value>,
    errors: Vec<serde_json::Value>,
) -> async_graphql::Result<Option<serde_json::Value>> {
    if errors.is_empty() {
        return Ok(leaf);
    }
    if leaf.is_none() {
        let message = errors
            .first()
            .and_then(|e| e.get("message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("upstream returned an error")
            .to_owned();
        return Err(async_graphql::Error::new(message));
    }
    warn!(errors = ?errors, "upstream reported inline errors alongside data; not individually re-attached");
    Ok(leaf)
}

fn graphql_type_ref(ty: &Type) -> TypeRef {
    match ty {
        Type::Named(name) => TypeRef::named(name.as_str()),
        Type::NonNullNamed(name) => TypeRef::named_nn(name.as_str()),
        Type::List(inner) => TypeRef::List(Box::new(graphql_type_ref(inner))),
        Type::NonNullList(inner) => TypeRef::NonNull(Box::new(graphql_type_ref(inner))),
    }
}

/// Strips one list wrapper, if present — a link target field may return a
/// list (batched mode dispatches one call for many parents) while the
/// linked field itself is always to-one from the parent's perspective.
fn unwrap_one_list_level(ty: &Type) -> Type {
    match ty {
        Type::List(inner) | Type::NonNullList(inner) => inner.as_ref().clone(),
        other => other.clone(),
    }
}

/// Builds the executable `async-graphql` dynamic schema from the merged
/// SDL-level schema, attaching:
/// - a proxy resolver to every hoisted root field (from `routes`), which
///   also splices in every configured link found anywhere in the returned
///   subtree (`crate::splice`) before handing the value back
/// - pass-through (default JSON property) resolution to everything else —
///   once splice has run, a linked field's value is already a fully-joined
///   JSON value sitting where the raw foreign key used to be, so it needs no
///   resolver of its own beyond the same generic property read
fn build_dynamic_schema(
    merged: Arc<Schema>,
    routes: &RoutingTable,
    links: Arc<IndexMap<LinkKey, LinkSpec>>,
    link_target_types: Arc<IndexMap<LinkKey, Name>>,
    link_filter_argument_types: Arc<IndexMap<LinkKey, Name>>,
    client: Arc<dyn GraphQlClient>,
    runtimes: Arc<HashMap<String, EndpointRuntime>>,
) -> Result<DynamicSchema, SchemaError> {
    let mut builder = DynamicSchema::build("Query", mutation_type_name(&merged), subscription_type_name(&merged));

    for (type_name, ext) in &merged.types {
        match ext {
            ExtendedType::Object(obj) => {
                let mut object = DynamicObject::new(type_name.as_str());
                for (field_name, field_def) in &obj.fields {
                    let link_key = (type_name.clone(), field_name.clone());
                    let type_ref = match link_target_types.get(&link_key) {
                        Some(target_type) => TypeRef::named(target_type.as_str()),
                        None => graphql_type_ref(&field_def.ty),
                    };

                    if let Some(route) = root_route_for(type_name, field_name, routes) {
                        let route = route.clone();
                        let namespace = endpoint_namespace_of(&route.endpoint_name, &runtimes);
                        let endpoint_url = runtimes
                            .get(&route.endpoint_name)
                            .map(|r| r.url.clone())
                            .unwrap_or_default();
                        let client = Arc::clone(&client);
                        let merged_for_field = Arc::clone(&merged);
                        let links_for_field = Arc::clone(&links);
                        let link_target_types_for_field = Arc::clone(&link_target_types);
                        let runtimes_for_field = Arc::clone(&runtimes);
                        let merged_return_type = base_type_name(&field_def.ty);
                        let field = DynamicField::new(field_name.as_str(), type_ref.clone(), move |ctx| {
                            let client = Arc::clone(&client);
                            let merged = Arc::clone(&merged_for_field);
                            let links = Arc::clone(&links_for_field);
                            let link_target_types = Arc::clone(&link_target_types_for_field);
                            let runtimes = Arc::clone(&runtimes_for_field);
                            let route = route.clone();
                            let namespace = namespace.clone();
                            let endpoint_url = endpoint_url.clone();
                            let merged_return_type = merged_return_type.clone();
                            FieldFuture::new(async move {
                                let selection = ctx.field();
                                let parsed = crate::request_context::current();
                                let response_path = Name::new(selection.name())
                                    .map(|key| vec![ResponsePathStep::Field(key)])
                                    .unwrap_or_default();
                                let resolved = parsed.as_ref().and_then(|parsed| {
                                    let aliases = collect_aliases_in_response_path(&response_path);
                                    collect_field_nodes_in_path(&parsed.selection_set, &aliases, &parsed.fragments)
                                        .into_iter()
                                        .next()
                                });
                                let (selection_set, arguments, fragments, variable_values) = match (&resolved, &parsed) {
                                    (Some(field_node), Some(parsed)) => (
                                        field_node.selection_set.clone(),
                                        field_node.arguments.clone(),
                                        parsed.fragments.clone(),
                                        parsed.variable_values.clone(),
                                    ),
                                    _ => (
                                        child_selection_set(&selection),
                                        Vec::new(),
                                        IndexMap::new(),
                                        serde_json::Map::new(),
                                    ),
                                };
                                let info = ResolveInfo {
                                    upstream_field_name: route.old_field_name.clone(),
                                    arguments,
                                    selection_set,
                                    fragments,
                                    variable_values: variable_values.clone(),
                                    response_path,
                                };
                                let plan = build_root_subquery(&namespace, &info, &merged_return_type, merged.as_ref(), links.as_ref())
                                    .map_err(async_graphql::Error::from)?;
                                let outer_path = vec![serde_json::Value::String(selection.name().to_owned())];
                                let (leaf, errors) = dispatch_and_splice(
                                    client.as_ref(),
                                    &route.endpoint_name,
                                    &endpoint_url,
                                    &plan,
                                    &outer_path,
                                )
                                .await
                                .map_err(async_graphql::Error::from)?;
                                let mut leaf = surface_subquery_errors(leaf, errors)?;
                                if let Some(value) = leaf.as_mut() {
                                    let splice_cx = SpliceContext {
                                        client: client.as_ref(),
                                        merged: merged.as_ref(),
                                        links: links.as_ref(),
                                        link_target_types: link_target_types.as_ref(),
                                        runtimes: runtimes.as_ref(),
                                    };
                                    resolve_links_in_value(
                                        &splice_cx,
                                        value,
                                        &info.selection_set,
                                        &info.fragments,
                                        &variable_values,
                                        &merged_return_type,
                                        &namespace,
                                    )
                                    .await
                                    .map_err(async_graphql::Error::from)?;
                                }
                                Ok(leaf.map(FieldValue::from_json).transpose().unwrap_or(None))
                            })
                        });
                        let field = with_filter_args(field, &links, &link_filter_argument_types, &link_key);
                        object = object.field(with_args(field, field_def));
                        continue;
                    }

                    let type_ref_for_default = type_ref.clone();
                    let field_name_owned = field_name.clone();
                    let field = DynamicField::new(field_name.as_str(), type_ref_for_default, move |ctx| {
                        let field_name_owned = field_name_owned.clone();
                        FieldFuture::new(async move {
                            let parent: &serde_json::Value = ctx.parent_value.try_downcast_ref()?;
                            let value = parent.get(field_name_owned.as_str()).cloned();
                            Ok(value.map(FieldValue::from_json).transpose().unwrap_or(None))
                        })
                    });
                    let field = with_filter_args(field, &links, &link_filter_argument_types, &link_key);
                    object = object.field(field);
                }
                builder = builder.register(object);
            }
            ExtendedType::Scalar(scalar) => {
                if !crate::transform::is_native_type_name(type_name.as_str()) {
                    builder = builder.register(Scalar::new(scalar.name.as_str()));
                }
            }
            _ => {
                // Interfaces, unions, enums, and input objects are carried
                // through to the SDL apollo_compiler type map but need no
                // separate async-graphql registration beyond what `register`
                // already infers from referencing object types' fields.
            }
        }
    }

    builder.finish()
}

fn with_args(mut field: DynamicField, field_def: &apollo_compiler::schema::FieldDefinition) -> DynamicField {
    for argument in &field_def.arguments {
        field = field.argument(InputValue::new(argument.name.as_str(), graphql_type_ref(&argument.ty)));
    }
    field
}

/// Join/filter-mode links (`argument.filter_field` set) expose their own
/// client-facing arguments directly on the merged field — a `filter` object
/// (named after `spec.argument.argument`) that `crate::splice::extract_client_filter`
/// merges with the key-set constraint, plus `orderBy`/`first`/`skip` for
/// pass-through paging. Plain scalar-argument links (a bare foreign key, no
/// `filter_field`) get none of this; the client never had anything to pass.
fn with_filter_args(
    mut field: DynamicField,
    links: &IndexMap<LinkKey, LinkSpec>,
    link_filter_argument_types: &IndexMap<LinkKey, Name>,
    link_key: &LinkKey,
) -> DynamicField {
    let Some(spec) = links.get(link_key) else { return field };
    if spec.argument.filter_field.is_none() {
        return field;
    }
    if let Some(filter_type) = link_filter_argument_types.get(link_key) {
        field = field.argument(InputValue::new(spec.argument.argument.as_str(), TypeRef::named(filter_type.as_str())));
    }
    field
        .argument(InputValue::new("orderBy", TypeRef::named(TypeRef::STRING)))
        .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("skip", TypeRef::named(TypeRef::INT)))
}

fn root_route_for<'a>(
    type_name: &Name,
    field_name: &Name,
    routes: &'a RoutingTable,
) -> Option<&'a crate::merge::RootFieldRoute> {
    if type_name.as_str() == "Query" {
        routes.query.get(field_name)
    } else if type_name.as_str() == "Mutation" {
        routes.mutation.get(field_name)
    } else if type_name.as_str() == "Subscription" {
        routes.subscription.get(field_name)
    } else {
        None
    }
}

fn endpoint_namespace_of(endpoint_name: &str, runtimes: &HashMap<String, EndpointRuntime>) -> String {
    runtimes
        .get(endpoint_name)
        .map(|r| r.namespace.clone())
        .unwrap_or_else(|| endpoint_name.to_owned())
}

fn mutation_type_name(schema: &Schema) -> Option<&str> {
    schema.types.contains_key("Mutation").then_some("Mutation")
}

fn subscription_type_name(schema: &Schema) -> Option<&str> {
    schema.types.contains_key("Subscription").then_some("Subscription")
}
