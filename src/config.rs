//! The configuration document and the validated data model it
//! builds (`Endpoint`, `LinkSpec`). Loading this document from
//! a file or CLI flags is an external collaborator's job; this module only
//! owns the shape and the validation rules.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

use crate::error::SingleWeaverError;

/// On-disk/in-memory shape of the weaver's configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeaverConfig {
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub links: BTreeMap<String, LinkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Name of the other endpoint (`EndpointConfig::name`) that serves the
    /// joined object.
    pub target_endpoint: String,
    pub field: String,
    pub argument: String,
    #[serde(default)]
    pub batch_mode: bool,
    #[serde(default)]
    pub key_field: Option<String>,
}

/// A dotted argument path: the argument name, plus an optional nested filter
/// field for join/filter-mode links (see `LinkSpec::argument`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentPath {
    pub argument: String,
    pub filter_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub target_endpoint: String,
    pub field: Vec<String>,
    pub argument: ArgumentPath,
    pub batch_mode: bool,
    pub key_field: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub url: Url,
    pub namespace: String,
    pub links: IndexMap<String, LinkSpec>,
}

pub(crate) fn parse_dotted_path(path: &str) -> Result<Vec<String>, SingleWeaverError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(SingleWeaverError::Config {
            message: format!("`{path}` is not a valid dotted path"),
        });
    }
    Ok(path.split('.').map(str::to_owned).collect())
}

fn parse_argument_path(path: &str) -> Result<ArgumentPath, SingleWeaverError> {
    let mut segments = parse_dotted_path(path)?.into_iter();
    let argument = segments.next().expect("non-empty after parse_dotted_path");
    let filter_field = segments.next();
    if segments.next().is_some() {
        return Err(SingleWeaverError::Config {
            message: format!("`{path}` has more than one nested filter segment"),
        });
    }
    Ok(ArgumentPath {
        argument,
        filter_field,
    })
}

impl LinkConfig {
    pub fn validate(&self) -> Result<LinkSpec, SingleWeaverError> {
        if self.target_endpoint.is_empty() {
            return Err(SingleWeaverError::Config {
                message: "link `target_endpoint` must not be empty".to_owned(),
            });
        }
        let field = parse_dotted_path(&self.field)?;
        let argument = parse_argument_path(&self.argument)?;
        Ok(LinkSpec {
            target_endpoint: self.target_endpoint.clone(),
            field,
            argument,
            batch_mode: self.batch_mode,
            key_field: self.key_field.clone(),
        })
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<Endpoint, SingleWeaverError> {
        if self.name.is_empty() {
            return Err(SingleWeaverError::Config {
                message: "endpoint `name` must not be empty".to_owned(),
            });
        }
        let url = Url::parse(&self.url).map_err(|err| SingleWeaverError::Config {
            message: format!("endpoint `{}` has an invalid url: {err}", self.name),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SingleWeaverError::Config {
                message: format!(
                    "endpoint `{}` url must be absolute http/https, got `{}`",
                    self.name, self.url
                ),
            });
        }
        let namespace = self.namespace.clone().unwrap_or_else(|| self.name.clone());
        let mut links = IndexMap::new();
        for (key, link) in &self.links {
            let spec = link.validate().map_err(|err| SingleWeaverError::Config {
                message: format!("link `{key}` on endpoint `{}`: {err}", self.name),
            })?;
            links.insert(key.clone(), spec);
        }
        Ok(Endpoint {
            name: self.name.clone(),
            url,
            namespace,
            links,
        })
    }
}

impl WeaverConfig {
    /// Validates the whole document: per-endpoint validation plus the
    /// cross-endpoint "names must be unique" rule.
    pub fn validate(&self) -> Result<Vec<Endpoint>, SingleWeaverError> {
        let mut seen = std::collections::HashSet::new();
        let mut endpoints = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.clone()) {
                return Err(SingleWeaverError::Config {
                    message: format!("duplicate endpoint name `{}`", endpoint.name),
                });
            }
            endpoints.push(endpoint.validate()?);
        }
        let known_names: std::collections::HashSet<&str> =
            endpoints.iter().map(|e| e.name.as_str()).collect();
        for endpoint in &endpoints {
            for link in endpoint.links.values() {
                if !known_names.contains(link.target_endpoint.as_str()) {
                    return Err(SingleWeaverError::Config {
                        message: format!(
                            "endpoint `{}` links to unknown target endpoint `{}`",
                            endpoint.name, link.target_endpoint
                        ),
                    });
                }
            }
        }
        Ok(endpoints)
    }
}
