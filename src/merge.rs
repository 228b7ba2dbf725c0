//! The schema merger: namespaces every upstream schema via
//! [`crate::transform`] and hoists their root operation fields into one
//! synthesized `Query`/`Mutation`/`Subscription`.
//!
//! This module only produces the merged *type system* (an
//! [`apollo_compiler::Schema`]) plus a [`RoutingTable`] recording which
//! endpoint owns each hoisted root field. Attaching resolvers to that shape
//! is [`crate::Weaver`]'s job (the proxy resolver reads the
//! table at request time).

use std::sync::Arc;

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::ast::Name;
use apollo_compiler::{Node, Schema};
use indexmap::IndexMap;

use crate::config::Endpoint;
use crate::error::{SingleWeaverError, WeaverError};
use crate::transform::{is_native_type_name, transform, TransformerSet};

/// Which endpoint (and under what original field name) a hoisted root field
/// routes to.
#[derive(Debug, Clone)]
pub struct RootFieldRoute {
    pub endpoint_name: String,
    pub old_field_name: Name,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub query: IndexMap<Name, RootFieldRoute>,
    pub mutation: IndexMap<Name, RootFieldRoute>,
    pub subscription: IndexMap<Name, RootFieldRoute>,
}

pub struct MergedSchema {
    pub schema: Schema,
    pub routes: RoutingTable,
}

fn namespace_prefix(namespace: &str) -> Arc<dyn Fn(&Name) -> Name + Send + Sync> {
    let namespace = namespace.to_owned();
    Arc::new(move |name: &Name| {
        Name::new(format!("{namespace}_{name}")).expect("namespace + valid GraphQL name is valid")
    })
}

/// Hoists the fields of `root_type_name` (an already-namespaced type, e.g.
/// `inventory_Query`) into `merged_fields`/`routes`, renaming each field to
/// `{namespace}_{fieldName}` so two endpoints' root fields never collide
/// unless their namespaces collide too — caught as a [`SingleWeaverError::NamespaceCollision`].
fn hoist_root_fields(
    namespaced_schema: &Schema,
    root_type_name: &Name,
    namespace: &str,
    endpoint_name: &str,
    merged_fields: &mut IndexMap<Name, apollo_compiler::schema::FieldDefinition>,
    routes: &mut IndexMap<Name, RootFieldRoute>,
    operation_label: &str,
) -> Result<(), SingleWeaverError> {
    let Some(ExtendedType::Object(root_object)) = namespaced_schema.types.get(root_type_name) else {
        return Ok(());
    };
    for (field_name, field_def) in &root_object.fields {
        let hoisted_name = Name::new(format!("{namespace}_{field_name}"))
            .expect("namespace + valid GraphQL name is valid");
        let mut hoisted = field_def.as_ref().clone();
        hoisted.name = hoisted_name.clone();
        if merged_fields.insert(hoisted_name.clone(), hoisted).is_some() {
            return Err(SingleWeaverError::NamespaceCollision {
                type_name: format!("{operation_label}.{hoisted_name}"),
            });
        }
        routes.insert(
            hoisted_name,
            RootFieldRoute {
                endpoint_name: endpoint_name.to_owned(),
                old_field_name: field_name.clone(),
            },
        );
    }
    Ok(())
}

fn build_object_type(
    name: Name,
    fields: IndexMap<Name, apollo_compiler::schema::FieldDefinition>,
) -> ExtendedType {
    use apollo_compiler::schema::{DirectiveList, ObjectType};
    let fields = fields.into_iter().map(|(k, v)| (k, Node::new(v))).collect();
    ExtendedType::Object(Node::new(ObjectType {
        description: None,
        name,
        directives: DirectiveList::default(),
        implements_interfaces: Default::default(),
        fields,
    }))
}

/// Namespaces and merges every `(endpoint, upstream schema)` pair into one
/// schema. Endpoints are processed in the order given; the first endpoint to
/// claim a type or root-field name wins the collision report.
pub fn weave_schemas(sources: &[(Endpoint, Schema)]) -> Result<MergedSchema, WeaverError> {
    let mut errors = Vec::new();
    let mut merged_types: IndexMap<Name, ExtendedType> = IndexMap::new();
    let mut merged_directives = IndexMap::new();
    let mut routes = RoutingTable::default();
    let mut merged_query_fields = IndexMap::new();
    let mut merged_mutation_fields = IndexMap::new();
    let mut merged_subscription_fields = IndexMap::new();

    for (endpoint, old_schema) in sources {
        let rename = namespace_prefix(&endpoint.namespace);
        let transformers = TransformerSet {
            rename_type: Some(Arc::clone(&rename)),
            rename_directive: Some(Arc::clone(&rename)),
            ..Default::default()
        };
        let namespaced = match transform(old_schema, &transformers) {
            Ok(schema) => schema,
            Err(err) => {
                errors.push(err);
                continue;
            }
        };

        let old_query = old_schema.schema_definition.query.as_ref().map(|c| c.name.clone());
        let old_mutation = old_schema.schema_definition.mutation.as_ref().map(|c| c.name.clone());
        let old_subscription = old_schema
            .schema_definition
            .subscription
            .as_ref()
            .map(|c| c.name.clone());

        let root_type_names: [(Option<Name>, &mut IndexMap<Name, _>, &str); 3] = [
            (old_query.clone(), &mut merged_query_fields, "Query"),
            (old_mutation.clone(), &mut merged_mutation_fields, "Mutation"),
            (
                old_subscription.clone(),
                &mut merged_subscription_fields,
                "Subscription",
            ),
        ];
        for (old_root_name, merged_fields, label) in root_type_names {
            let Some(old_root_name) = old_root_name else {
                continue;
            };
            let namespaced_root_name = rename(&old_root_name);
            if let Err(err) = hoist_root_fields(
                &namespaced,
                &namespaced_root_name,
                &endpoint.namespace,
                &endpoint.name,
                merged_fields,
                match label {
                    "Query" => &mut routes.query,
                    "Mutation" => &mut routes.mutation,
                    _ => &mut routes.subscription,
                },
                label,
            ) {
                errors.push(err);
            }
        }

        let skip_names: Vec<Name> = [old_query, old_mutation, old_subscription]
            .into_iter()
            .flatten()
            .map(|n| rename(&n))
            .collect();

        for (name, ext) in &namespaced.types {
            if is_native_type_name(name.as_str()) {
                merged_types.entry(name.clone()).or_insert_with(|| ext.clone());
                continue;
            }
            if skip_names.contains(name) {
                continue;
            }
            if merged_types.insert(name.clone(), ext.clone()).is_some() {
                errors.push(SingleWeaverError::NamespaceCollision {
                    type_name: name.to_string(),
                });
            }
        }

        for (name, def) in &namespaced.directive_definitions {
            merged_directives.entry(name.clone()).or_insert_with(|| def.clone());
        }
    }

    if !errors.is_empty() {
        return Err(if errors.len() == 1 {
            WeaverError::Single(errors.remove(0))
        } else {
            WeaverError::Multiple(errors)
        });
    }

    merged_types.insert(
        Name::new("Query").unwrap(),
        build_object_type(Name::new("Query").unwrap(), merged_query_fields),
    );
    if !merged_mutation_fields.is_empty() {
        merged_types.insert(
            Name::new("Mutation").unwrap(),
            build_object_type(Name::new("Mutation").unwrap(), merged_mutation_fields),
        );
    }
    if !merged_subscription_fields.is_empty() {
        merged_types.insert(
            Name::new("Subscription").unwrap(),
            build_object_type(Name::new("Subscription").unwrap(), merged_subscription_fields),
        );
    }

    let mutation_name = Name::new("Mutation").unwrap();
    let subscription_name = Name::new("Subscription").unwrap();

    let first_schema = &sources.first().expect("at least one endpoint").1;
    let mut schema_definition = first_schema.schema_definition.as_ref().clone();
    schema_definition.query = Some(apollo_compiler::schema::ComponentName::from(Name::new("Query").unwrap()));
    schema_definition.mutation = merged_types
        .contains_key(&mutation_name)
        .then(|| apollo_compiler::schema::ComponentName::from(mutation_name.clone()));
    schema_definition.subscription = merged_types
        .contains_key(&subscription_name)
        .then(|| apollo_compiler::schema::ComponentName::from(subscription_name.clone()));

    let schema = Schema {
        sources: first_schema.sources.clone(),
        schema_definition: Node::new(schema_definition),
        directive_definitions: merged_directives,
        types: merged_types,
    };

    Ok(MergedSchema { schema, routes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::Schema as ApolloSchema;
    use url::Url;

    fn endpoint(name: &str) -> Endpoint {
        Endpoint {
            name: name.to_owned(),
            url: Url::parse("https://example.test/graphql").unwrap(),
            namespace: name.to_owned(),
            links: IndexMap::new(),
        }
    }

    fn parse(sdl: &str) -> Schema {
        ApolloSchema::parse(sdl, "schema.graphql")
            .validate()
            .expect("valid schema")
            .into_inner()
    }

    #[test]
    fn two_endpoints_hoist_disjoint_root_fields() {
        let inventory = parse("type Query { sku(id: ID!): String }");
        let billing = parse("type Query { invoice(id: ID!): String }");
        let merged = weave_schemas(&[
            (endpoint("inventory"), inventory),
            (endpoint("billing"), billing),
        ])
        .unwrap();
        assert!(merged.routes.query.contains_key("inventory_sku"));
        assert!(merged.routes.query.contains_key("billing_invoice"));
    }

    #[test]
    fn shared_namespace_with_clashing_root_field_is_a_collision() {
        let a = parse("type Query { widget: String }");
        let b = parse("type Query { widget: Int }");
        let mut ep_a = endpoint("a");
        ep_a.namespace = "shared".to_owned();
        let mut ep_b = endpoint("b");
        ep_b.namespace = "shared".to_owned();
        let result = weave_schemas(&[(ep_a, a), (ep_b, b)]);
        assert!(result.is_err());
    }

    #[test]
    fn namespaced_object_types_are_merged_without_collision() {
        let inventory = parse("type Query { item: Item } type Item { id: ID! }");
        let billing = parse("type Query { order: Order } type Order { id: ID! }");
        let merged = weave_schemas(&[
            (endpoint("inventory"), inventory),
            (endpoint("billing"), billing),
        ])
        .unwrap();
        assert!(merged.schema.types.contains_key("inventory_Item"));
        assert!(merged.schema.types.contains_key("billing_Order"));
    }
}
