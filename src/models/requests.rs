//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::SearchParameter;

/// Request body for PUT /items
///
/// `ttl_ms` of zero or below stores an item that never expires; omitted uses the default.
#[derive(Debug, Clone, Deserialize)]
pub struct PutRequest {
    pub key: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub parameters: Vec<SearchParameter>,
    pub value: Value,
    #[serde(default)]
    pub ttl_ms: Option<i64>,
}

impl PutRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        invalid_parameter(&self.parameters)
    }
}

/// Request body for POST /search
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub parameters: Vec<SearchParameter>,
    /// Drop the most specific level until something matches
    #[serde(default)]
    pub degrade: bool,
}

/// Request body for POST /link/id
#[derive(Debug, Clone, Deserialize)]
pub struct LinkIdRequest {
    pub key: String,
    pub id: i64,
}

/// Request body for POST /link/parameters
///
/// The target is found by `key` when given, otherwise by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkParametersRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    pub parameters: Vec<SearchParameter>,
}

impl LinkParametersRequest {
    pub fn validate(&self) -> Option<String> {
        if self.key.is_none() && self.id.is_none() {
            return Some("Either key or id is required".to_string());
        }
        if self.parameters.is_empty() {
            return Some("Parameters cannot be empty".to_string());
        }
        invalid_parameter(&self.parameters)
    }
}

fn invalid_parameter(parameters: &[SearchParameter]) -> Option<String> {
    parameters
        .iter()
        .any(|p| p.name.is_empty())
        .then(|| "Parameter name cannot be empty".to_string())
}
