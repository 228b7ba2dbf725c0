//! Shared test doubles and schema builders for the integration suite.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use schema_weaver::client::{GraphQlClient, GraphQlResponse};
use schema_weaver::error::SingleWeaverError;
use serde_json::Value;

/// A [`GraphQlClient`] scripted ahead of time: one fixed introspection result
/// per endpoint URL, plus a FIFO queue of data responses per endpoint URL.
/// Requests containing `__schema` are routed to the introspection table;
/// everything else pops the next queued response.
#[derive(Default)]
pub struct ScriptedClient {
    introspection: HashMap<String, Value>,
    data: Mutex<HashMap<String, VecDeque<GraphQlResponse>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_introspection(mut self, endpoint_url: &str, schema_json: Value) -> Self {
        self.introspection.insert(endpoint_url.to_owned(), schema_json);
        self
    }

    pub fn with_response(self, endpoint_url: &str, response: GraphQlResponse) -> Self {
        self.data
            .lock()
            .unwrap()
            .entry(endpoint_url.to_owned())
            .or_default()
            .push_back(response);
        self
    }

    pub fn with_data(self, endpoint_url: &str, data: Value) -> Self {
        self.with_response(
            endpoint_url,
            GraphQlResponse {
                data: Some(data),
                errors: Vec::new(),
            },
        )
    }
}

#[async_trait]
impl GraphQlClient for ScriptedClient {
    async fn execute(
        &self,
        endpoint_url: &str,
        query: &str,
        _variables: Option<&Value>,
        _operation_name: Option<&str>,
    ) -> Result<GraphQlResponse, SingleWeaverError> {
        if query.contains("__schema") {
            let schema = self.introspection.get(endpoint_url).cloned().ok_or_else(|| {
                SingleWeaverError::IntrospectionFailure {
                    endpoint: endpoint_url.to_owned(),
                    message: "no introspection scripted for this endpoint".to_owned(),
                }
            })?;
            return Ok(GraphQlResponse {
                data: Some(serde_json::json!({ "__schema": schema })),
                errors: Vec::new(),
            });
        }
        let mut guard = self.data.lock().unwrap();
        let queue = guard
            .get_mut(endpoint_url)
            .ok_or_else(|| SingleWeaverError::Subquery {
                endpoint: endpoint_url.to_owned(),
                errors: vec!["no response scripted for this endpoint".to_owned()],
            })?;
        queue.pop_front().ok_or_else(|| SingleWeaverError::Subquery {
            endpoint: endpoint_url.to_owned(),
            errors: vec!["response queue exhausted".to_owned()],
        })
    }
}

fn scalar_field(name: &str, args: Value, type_name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "args": args,
        "type": { "kind": "SCALAR", "name": type_name },
    })
}

fn object_field(name: &str, args: Value, type_name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "args": args,
        "type": { "kind": "OBJECT", "name": type_name },
    })
}

fn id_arg(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "ID" } },
    })
}

/// A minimal introspection `__schema` document with one `Query` type
/// exposing `field_name(id: ID!): String`.
pub fn single_scalar_query_schema(field_name: &str) -> Value {
    serde_json::json!({
        "queryType": { "name": "Query" },
        "types": [
            {
                "kind": "OBJECT",
                "name": "Query",
                "fields": [scalar_field(field_name, serde_json::json!([id_arg("id")]), "String")],
            }
        ],
    })
}

/// An introspection document for an endpoint exposing `Query.item(id: ID!):
/// Item` where `Item` has a plain scalar field plus the named link-source
/// scalar field.
pub fn inventory_schema_with_link_field(link_field_name: &str) -> Value {
    serde_json::json!({
        "queryType": { "name": "Query" },
        "types": [
            {
                "kind": "OBJECT",
                "name": "Query",
                "fields": [object_field("item", serde_json::json!([id_arg("id")]), "Item")],
            },
            {
                "kind": "OBJECT",
                "name": "Item",
                "fields": [
                    scalar_field("id", serde_json::json!([]), "ID"),
                    scalar_field(link_field_name, serde_json::json!([]), "String"),
                ],
            }
        ],
    })
}

/// An introspection document for an endpoint exposing `Query.items: [Item!]!`
/// where `Item` has a plain scalar field plus the named link-source scalar
/// field — the list-returning counterpart of
/// [`inventory_schema_with_link_field`], for batch-mode link scenarios.
pub fn inventory_list_schema_with_link_field(link_field_name: &str) -> Value {
    serde_json::json!({
        "queryType": { "name": "Query" },
        "types": [
            {
                "kind": "OBJECT",
                "name": "Query",
                "fields": [{
                    "name": "items",
                    "args": [],
                    "type": {
                        "kind": "NON_NULL",
                        "ofType": {
                            "kind": "LIST",
                            "ofType": { "kind": "NON_NULL", "ofType": { "kind": "OBJECT", "name": "Item" } },
                        },
                    },
                }],
            },
            {
                "kind": "OBJECT",
                "name": "Item",
                "fields": [
                    scalar_field("id", serde_json::json!([]), "ID"),
                    scalar_field(link_field_name, serde_json::json!([]), "String"),
                ],
            }
        ],
    })
}

/// An introspection document for an endpoint exposing
/// `Query.suppliersByCodes(codes: [String]): [Supplier]`, the batched
/// counterpart of [`billing_supplier_schema`] (order-preserving remap, no
/// `keyField`).
pub fn billing_batched_suppliers_schema() -> Value {
    serde_json::json!({
        "queryType": { "name": "Query" },
        "types": [
            {
                "kind": "OBJECT",
                "name": "Query",
                "fields": [{
                    "name": "suppliersByCodes",
                    "args": [{
                        "name": "codes",
                        "type": { "kind": "LIST", "ofType": { "kind": "SCALAR", "name": "String" } },
                    }],
                    "type": { "kind": "LIST", "ofType": { "kind": "OBJECT", "name": "Supplier" } },
                }],
            },
            {
                "kind": "OBJECT",
                "name": "Supplier",
                "fields": [scalar_field("name", serde_json::json!([]), "String")],
            }
        ],
    })
}

/// An introspection document for an endpoint exposing
/// `Query.suppliersByFilter(filter: SupplierFilter, orderBy: String, first:
/// Int, skip: Int): [Supplier]`, for join/filter-mode link scenarios —
/// `SupplierFilter` has a `code: [String]` field (the key-set slot) plus an
/// `active: Boolean` field a client can filter on independently.
pub fn billing_filterable_suppliers_schema() -> Value {
    serde_json::json!({
        "queryType": { "name": "Query" },
        "types": [
            {
                "kind": "OBJECT",
                "name": "Query",
                "fields": [{
                    "name": "suppliersByFilter",
                    "args": [
                        { "name": "filter", "type": { "kind": "INPUT_OBJECT", "name": "SupplierFilter" } },
                        { "name": "orderBy", "type": { "kind": "SCALAR", "name": "String" } },
                        { "name": "first", "type": { "kind": "SCALAR", "name": "Int" } },
                        { "name": "skip", "type": { "kind": "SCALAR", "name": "Int" } },
                    ],
                    "type": { "kind": "LIST", "ofType": { "kind": "OBJECT", "name": "Supplier" } },
                }],
            },
            {
                "kind": "INPUT_OBJECT",
                "name": "SupplierFilter",
                "inputFields": [
                    { "name": "code", "type": { "kind": "LIST", "ofType": { "kind": "SCALAR", "name": "String" } } },
                    { "name": "active", "type": { "kind": "SCALAR", "name": "Boolean" } },
                ],
            },
            {
                "kind": "OBJECT",
                "name": "Supplier",
                "fields": [
                    scalar_field("code", serde_json::json!([]), "String"),
                    scalar_field("name", serde_json::json!([]), "String"),
                ],
            }
        ],
    })
}

/// An introspection document for an endpoint exposing
/// `Query.supplierByCode(code: String): Supplier` where `Supplier` has a
/// `name` scalar field.
pub fn billing_supplier_schema() -> Value {
    serde_json::json!({
        "queryType": { "name": "Query" },
        "types": [
            {
                "kind": "OBJECT",
                "name": "Query",
                "fields": [object_field(
                    "supplierByCode",
                    serde_json::json!([{
                        "name": "code",
                        "type": { "kind": "SCALAR", "name": "String" },
                    }]),
                    "Supplier",
                )],
            },
            {
                "kind": "OBJECT",
                "name": "Supplier",
                "fields": [scalar_field("name", serde_json::json!([]), "String")],
            }
        ],
    })
}
