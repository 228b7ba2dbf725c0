//! End-to-end: a link-configured scalar field resolves to a cross-endpoint
//! joined object, across all three link modes (single-object, batched
//! order-preserving, batched join/filter with a `keyField`).

use std::collections::BTreeMap;
use std::sync::Arc;

use schema_weaver::config::{EndpointConfig, LinkConfig, WeaverConfig};
use schema_weaver::Weaver;

use crate::fixtures::{
    billing_batched_suppliers_schema, billing_filterable_suppliers_schema, billing_supplier_schema,
    inventory_list_schema_with_link_field, inventory_schema_with_link_field, ScriptedClient,
};

#[tokio::test]
async fn linked_scalar_field_resolves_to_the_joined_object() {
    let mut links = BTreeMap::new();
    links.insert(
        "Item.supplierCode".to_owned(),
        LinkConfig {
            target_endpoint: "billing".to_owned(),
            field: "query.supplierByCode".to_owned(),
            argument: "code".to_owned(),
            batch_mode: false,
            key_field: None,
        },
    );
    let config = WeaverConfig {
        endpoints: vec![
            EndpointConfig {
                name: "inventory".to_owned(),
                url: "https://inventory.example/graphql".to_owned(),
                namespace: None,
                links,
            },
            EndpointConfig {
                name: "billing".to_owned(),
                url: "https://billing.example/graphql".to_owned(),
                namespace: None,
                links: BTreeMap::new(),
            },
        ],
    };
    let endpoints = config.validate().unwrap();

    let client = Arc::new(
        ScriptedClient::new()
            .with_introspection(
                "https://inventory.example/graphql",
                inventory_schema_with_link_field("supplierCode"),
            )
            .with_introspection("https://billing.example/graphql", billing_supplier_schema())
            .with_data(
                "https://inventory.example/graphql",
                serde_json::json!({ "weaverResult": { "id": "I-1", "supplierCode": "SUP-1" } }),
            )
            .with_data(
                "https://billing.example/graphql",
                serde_json::json!({ "weaverResult": { "name": "Acme Supply" } }),
            ),
    );

    let woven = Weaver::build(endpoints, client).await.unwrap();
    let response = woven
        .schema
        .execute(r#"{ inventory_item(id: "1") { id supplierCode { name } } }"#)
        .await;

    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    let data = serde_json::to_value(&response.data).unwrap();
    assert_eq!(data["inventory_item"]["id"], "I-1");
    assert_eq!(data["inventory_item"]["supplierCode"]["name"], "Acme Supply");
}

#[tokio::test]
async fn null_join_key_short_circuits_without_dispatch() {
    let mut links = BTreeMap::new();
    links.insert(
        "Item.supplierCode".to_owned(),
        LinkConfig {
            target_endpoint: "billing".to_owned(),
            field: "query.supplierByCode".to_owned(),
            argument: "code".to_owned(),
            batch_mode: false,
            key_field: None,
        },
    );
    let config = WeaverConfig {
        endpoints: vec![
            EndpointConfig {
                name: "inventory".to_owned(),
                url: "https://inventory.example/graphql".to_owned(),
                namespace: None,
                links,
            },
            EndpointConfig {
                name: "billing".to_owned(),
                url: "https://billing.example/graphql".to_owned(),
                namespace: None,
                links: BTreeMap::new(),
            },
        ],
    };
    let endpoints = config.validate().unwrap();

    let client = Arc::new(
        ScriptedClient::new()
            .with_introspection(
                "https://inventory.example/graphql",
                inventory_schema_with_link_field("supplierCode"),
            )
            .with_introspection("https://billing.example/graphql", billing_supplier_schema())
            .with_data(
                "https://inventory.example/graphql",
                serde_json::json!({ "weaverResult": { "id": "I-1", "supplierCode": null } }),
            ),
    );

    let woven = Weaver::build(endpoints, client).await.unwrap();
    let response = woven
        .schema
        .execute(r#"{ inventory_item(id: "1") { id supplierCode { name } } }"#)
        .await;

    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    let data = serde_json::to_value(&response.data).unwrap();
    assert!(data["inventory_item"]["supplierCode"].is_null());
}

#[tokio::test]
async fn batched_link_dispatches_one_upstream_call_for_every_sibling() {
    let mut links = BTreeMap::new();
    links.insert(
        "Item.supplierCode".to_owned(),
        LinkConfig {
            target_endpoint: "billing".to_owned(),
            field: "query.suppliersByCodes".to_owned(),
            argument: "codes".to_owned(),
            batch_mode: true,
            key_field: None,
        },
    );
    let config = WeaverConfig {
        endpoints: vec![
            EndpointConfig {
                name: "inventory".to_owned(),
                url: "https://inventory.example/graphql".to_owned(),
                namespace: None,
                links,
            },
            EndpointConfig {
                name: "billing".to_owned(),
                url: "https://billing.example/graphql".to_owned(),
                namespace: None,
                links: BTreeMap::new(),
            },
        ],
    };
    let endpoints = config.validate().unwrap();

    let client = Arc::new(
        ScriptedClient::new()
            .with_introspection(
                "https://inventory.example/graphql",
                inventory_list_schema_with_link_field("supplierCode"),
            )
            .with_introspection("https://billing.example/graphql", billing_batched_suppliers_schema())
            .with_data(
                "https://inventory.example/graphql",
                serde_json::json!({ "weaverResult": [
                    { "id": "I-1", "supplierCode": "SUP-1" },
                    { "id": "I-2", "supplierCode": "SUP-2" },
                    { "id": "I-3", "supplierCode": null },
                ] }),
            )
            // one call covering both live keys, in request order.
            .with_data(
                "https://billing.example/graphql",
                serde_json::json!({ "weaverResult": [{ "name": "Acme Supply" }, { "name": "Globex" }] }),
            ),
    );

    let woven = Weaver::build(endpoints, client).await.unwrap();
    let response = woven
        .schema
        .execute(r#"{ inventory_items { id supplierCode { name } } }"#)
        .await;

    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    let data = serde_json::to_value(&response.data).unwrap();
    let items = data["inventory_items"].as_array().unwrap();
    assert_eq!(items[0]["supplierCode"]["name"], "Acme Supply");
    assert_eq!(items[1]["supplierCode"]["name"], "Globex");
    assert!(items[2]["supplierCode"].is_null());
}

#[tokio::test]
async fn join_filter_link_merges_client_filter_and_remaps_by_key_field() {
    let mut links = BTreeMap::new();
    links.insert(
        "Item.supplierCode".to_owned(),
        LinkConfig {
            target_endpoint: "billing".to_owned(),
            field: "query.suppliersByFilter".to_owned(),
            argument: "filter.code".to_owned(),
            batch_mode: true,
            key_field: Some("code".to_owned()),
        },
    );
    let config = WeaverConfig {
        endpoints: vec![
            EndpointConfig {
                name: "inventory".to_owned(),
                url: "https://inventory.example/graphql".to_owned(),
                namespace: None,
                links,
            },
            EndpointConfig {
                name: "billing".to_owned(),
                url: "https://billing.example/graphql".to_owned(),
                namespace: None,
                links: BTreeMap::new(),
            },
        ],
    };
    let endpoints = config.validate().unwrap();

    let client = Arc::new(
        ScriptedClient::new()
            .with_introspection(
                "https://inventory.example/graphql",
                inventory_list_schema_with_link_field("supplierCode"),
            )
            .with_introspection("https://billing.example/graphql", billing_filterable_suppliers_schema())
            .with_data(
                "https://inventory.example/graphql",
                serde_json::json!({ "weaverResult": [
                    { "id": "I-1", "supplierCode": "SUP-1" },
                    { "id": "I-2", "supplierCode": "SUP-2" },
                ] }),
            )
            // results come back out of request order; remap_by_key_field must
            // still land each on the right parent.
            .with_data(
                "https://billing.example/graphql",
                serde_json::json!({ "weaverResult": [
                    { "code": "SUP-2", "name": "Globex" },
                    { "code": "SUP-1", "name": "Acme Supply" },
                ] }),
            ),
    );

    let woven = Weaver::build(endpoints, client).await.unwrap();
    let response = woven
        .schema
        .execute(
            r#"{ inventory_items { id supplierCode(filter: { active: true }, orderBy: "name", first: 2) { code name } } }"#,
        )
        .await;

    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    let data = serde_json::to_value(&response.data).unwrap();
    let items = data["inventory_items"].as_array().unwrap();
    assert_eq!(items[0]["supplierCode"]["name"], "Acme Supply");
    assert_eq!(items[1]["supplierCode"]["name"], "Globex");
}
