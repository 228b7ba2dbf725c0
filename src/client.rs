//! The upstream GraphQL transport: an injectable [`GraphQlClient`] trait plus a `reqwest`-backed default,
//! used both for boot-time introspection and per-request sub-query
//! execution.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SingleWeaverError;

/// A single upstream GraphQL response, pre-stitching. `errors` keeps its
/// original shape (`path`, `message`, etc. as raw JSON) since [`crate::proxy`]
/// only needs to rewrite `path`, not interpret the rest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
struct GraphQlRequestBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
}

/// Sends a GraphQL request to one endpoint and returns its raw response.
/// Implementors only need to speak the GraphQL-over-HTTP wire format; the
/// weaver owns query construction and response stitching.
#[async_trait]
pub trait GraphQlClient: Send + Sync {
    async fn execute(
        &self,
        endpoint_url: &str,
        query: &str,
        variables: Option<&Value>,
        operation_name: Option<&str>,
    ) -> Result<GraphQlResponse, SingleWeaverError>;
}

/// The introspection query used at boot to fetch each upstream's own SDL.
pub const INTROSPECTION_QUERY: &str = include_str!("introspection_query.graphql");

/// Fetches and returns the raw introspection result's `__schema` JSON for
/// `endpoint_url`, used by [`crate::Weaver::build`] to obtain each upstream's
/// SDL before namespacing it.
pub async fn fetch_introspection(
    client: &dyn GraphQlClient,
    endpoint_name: &str,
    endpoint_url: &str,
) -> Result<Value, SingleWeaverError> {
    let response = client
        .execute(endpoint_url, INTROSPECTION_QUERY, None, None)
        .await
        .map_err(|err| SingleWeaverError::IntrospectionFailure {
            endpoint: endpoint_name.to_owned(),
            message: err.to_string(),
        })?;
    if !response.errors.is_empty() {
        return Err(SingleWeaverError::IntrospectionFailure {
            endpoint: endpoint_name.to_owned(),
            message: format!("{:?}", response.errors),
        });
    }
    response
        .data
        .and_then(|mut data| data.get_mut("__schema").map(Value::take))
        .ok_or_else(|| SingleWeaverError::IntrospectionFailure {
            endpoint: endpoint_name.to_owned(),
            message: "introspection response missing `__schema`".to_owned(),
        })
}

/// `reqwest`-backed [`GraphQlClient`]. One client is shared across all
/// endpoints; `reqwest::Client` is internally connection-pooled and cheap to
/// clone.
#[derive(Clone)]
pub struct HttpGraphQlClient {
    http: reqwest::Client,
    headers: HashMap<String, String>,
}

impl HttpGraphQlClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            headers: HashMap::new(),
        }
    }

    /// Extra headers (e.g. an auth passthrough) sent with every sub-query.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl Default for HttpGraphQlClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphQlClient for HttpGraphQlClient {
    async fn execute(
        &self,
        endpoint_url: &str,
        query: &str,
        variables: Option<&Value>,
        operation_name: Option<&str>,
    ) -> Result<GraphQlResponse, SingleWeaverError> {
        let body = GraphQlRequestBody {
            query,
            variables,
            operation_name,
        };
        let mut request = self.http.post(endpoint_url).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|err| SingleWeaverError::Subquery {
            endpoint: endpoint_url.to_owned(),
            errors: vec![err.to_string()],
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SingleWeaverError::Subquery {
                endpoint: endpoint_url.to_owned(),
                errors: vec![format!("upstream responded with status {status}")],
            });
        }
        response
            .json::<GraphQlResponse>()
            .await
            .map_err(|err| SingleWeaverError::Subquery {
                endpoint: endpoint_url.to_owned(),
                errors: vec![format!("invalid JSON response: {err}")],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticClient {
        response: GraphQlResponse,
    }

    #[async_trait]
    impl GraphQlClient for StaticClient {
        async fn execute(
            &self,
            _endpoint_url: &str,
            _query: &str,
            _variables: Option<&Value>,
            _operation_name: Option<&str>,
        ) -> Result<GraphQlResponse, SingleWeaverError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn fetch_introspection_extracts_schema_field() {
        let client = StaticClient {
            response: GraphQlResponse {
                data: Some(serde_json::json!({ "__schema": { "types": [] } })),
                errors: vec![],
            },
        };
        let schema = fetch_introspection(&client, "inventory", "https://example.test")
            .await
            .unwrap();
        assert!(schema.get("types").is_some());
    }

    #[tokio::test]
    async fn fetch_introspection_surfaces_upstream_errors() {
        let client = StaticClient {
            response: GraphQlResponse {
                data: None,
                errors: vec![serde_json::json!({ "message": "nope" })],
            },
        };
        let err = fetch_introspection(&client, "inventory", "https://example.test")
            .await
            .unwrap_err();
        assert!(matches!(err, SingleWeaverError::IntrospectionFailure { .. }));
    }
}
