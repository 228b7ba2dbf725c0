//! End-to-end: boot two endpoints, execute a query against the merged,
//! request-ready schema.

use std::sync::Arc;

use schema_weaver::config::{EndpointConfig, WeaverConfig};
use schema_weaver::Weaver;

use crate::fixtures::{single_scalar_query_schema, ScriptedClient};

fn weaver_config(entries: &[(&str, &str)]) -> WeaverConfig {
    WeaverConfig {
        endpoints: entries
            .iter()
            .map(|(name, url)| EndpointConfig {
                name: (*name).to_owned(),
                url: (*url).to_owned(),
                namespace: None,
                links: Default::default(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn two_endpoints_merge_and_resolve_independently() {
    let config = weaver_config(&[
        ("inventory", "https://inventory.example/graphql"),
        ("billing", "https://billing.example/graphql"),
    ]);
    let endpoints = config.validate().unwrap();

    let client = Arc::new(
        ScriptedClient::new()
            .with_introspection("https://inventory.example/graphql", single_scalar_query_schema("sku"))
            .with_introspection("https://billing.example/graphql", single_scalar_query_schema("invoice"))
            .with_data(
                "https://inventory.example/graphql",
                serde_json::json!({ "weaverResult": "SKU-1" }),
            )
            .with_data(
                "https://billing.example/graphql",
                serde_json::json!({ "weaverResult": "INV-1" }),
            ),
    );

    let woven = Weaver::build(endpoints, client).await.unwrap();
    let response = woven
        .schema
        .execute(r#"{ inventory_sku(id: "1") billing_invoice(id: "9") }"#)
        .await;

    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    let data = serde_json::to_value(&response.data).unwrap();
    assert_eq!(data["inventory_sku"], "SKU-1");
    assert_eq!(data["billing_invoice"], "INV-1");
}

#[tokio::test]
async fn boot_fails_with_no_endpoints_configured() {
    let client = Arc::new(ScriptedClient::new());
    let err = Weaver::build(Vec::new(), client).await.unwrap_err();
    assert!(matches!(
        err,
        schema_weaver::error::WeaverError::Single(schema_weaver::error::SingleWeaverError::Config { .. })
    ));
}

#[tokio::test]
async fn namespace_collision_aborts_boot() {
    let mut config = weaver_config(&[
        ("a", "https://a.example/graphql"),
        ("b", "https://b.example/graphql"),
    ]);
    config.endpoints[0].namespace = Some("shared".to_owned());
    config.endpoints[1].namespace = Some("shared".to_owned());
    let endpoints = config.validate().unwrap();

    let client = Arc::new(
        ScriptedClient::new()
            .with_introspection("https://a.example/graphql", single_scalar_query_schema("widget"))
            .with_introspection("https://b.example/graphql", single_scalar_query_schema("widget")),
    );

    let err = Weaver::build(endpoints, client).await.unwrap_err();
    assert!(err
        .errors()
        .iter()
        .any(|e| matches!(e, schema_weaver::error::SingleWeaverError::NamespaceCollision { .. })));
}
