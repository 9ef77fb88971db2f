use crate::constants::upstream;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::transport::{HttpMethod, HttpTransport, OutboundRequest};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::sync::Arc;

const CATALOG_METHODS: [&str; 4] = ["get", "post", "put", "delete"];
const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationEntry {
    pub method: String,
    pub summary: String,
    pub description: String,
    pub requires_auth: bool,
    pub parameters: Vec<String>,
    pub requires_body: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointEntry {
    pub path: String,
    pub operations: Vec<OperationEntry>,
}

/// Category groups in the order the document first mentions them.
/// Serializes as a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Categories(Vec<(String, Vec<EndpointEntry>)>);

impl Categories {
    pub fn get(&self, name: &str) -> Option<&[EndpointEntry]> {
        self.0
            .iter()
            .find(|(category, _)| category == name)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, name: String, entry: EndpointEntry) {
        match self.0.iter_mut().find(|(category, _)| *category == name) {
            Some((_, entries)) => entries.push(entry),
            None => self.0.push((name, vec![entry])),
        }
    }
}

impl Serialize for Categories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, entries)| (name, entries)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointCatalog {
    pub total_endpoints: usize,
    pub total_operations: usize,
    pub categories: Categories,
    pub base_url: String,
    pub authentication: String,
}

fn text_field(node: &Value, key: &str) -> String {
    node.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty(node: Option<&Value>) -> bool {
    match node {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn operation_entry(method: &str, node: &Value) -> OperationEntry {
    let parameters = node
        .get("parameters")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(|param| param.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    OperationEntry {
        method: method.to_ascii_uppercase(),
        summary: text_field(node, "summary"),
        description: text_field(node, "description"),
        requires_auth: non_empty(node.get("security")),
        parameters,
        requires_body: non_empty(node.get("requestBody")),
    }
}

fn first_tag(node: &Value) -> Option<String> {
    node.get("tags")
        .and_then(Value::as_array)
        .and_then(|tags| tags.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Groups an OpenAPI document's paths by the first tag of their first
/// catalogued operation. Paths whose first operation is untagged land in
/// `general`.
pub fn build_catalog(docs: &Value, base_url: &str) -> EndpointCatalog {
    let mut categories = Categories::default();
    let mut total_endpoints = 0;
    let mut total_operations = 0;

    let paths = docs.get("paths").and_then(Value::as_object);
    for (path, methods) in paths.into_iter().flatten() {
        let Some(methods) = methods.as_object() else {
            continue;
        };
        let mut category: Option<Option<String>> = None;
        let mut operations = Vec::new();
        for (method, node) in methods {
            let lowered = method.to_ascii_lowercase();
            if !CATALOG_METHODS.contains(&lowered.as_str()) {
                continue;
            }
            if category.is_none() {
                category = Some(first_tag(node));
            }
            operations.push(operation_entry(&lowered, node));
        }
        if operations.is_empty() {
            continue;
        }
        total_endpoints += 1;
        total_operations += operations.len();
        categories.push(
            category
                .flatten()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            EndpointEntry {
                path: path.clone(),
                operations,
            },
        );
    }

    EndpointCatalog {
        total_endpoints,
        total_operations,
        categories,
        base_url: base_url.to_string(),
        authentication: upstream::AUTHENTICATION_NOTE.to_string(),
    }
}

/// Reads the upstream API description.
pub struct EndpointCatalogBuilder {
    logger: Logger,
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl EndpointCatalogBuilder {
    pub fn new(logger: Logger, transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            logger: logger.child("endpoints"),
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single fetch, no retries.
    pub async fn fetch_docs(&self) -> Result<Value, ToolError> {
        let request = OutboundRequest::new(
            HttpMethod::Get,
            format!("{}{}", self.base_url, upstream::API_DOCS_PATH),
        )
        .header("Accept", "application/json");
        let response = self.transport.send(&request).await.map_err(|err| {
            ToolError::unavailable(format!("Error fetching API documentation: {}", err))
        })?;
        if response.status != 200 {
            return Err(ToolError::unavailable(format!(
                "Failed to fetch API docs: {}",
                response.status
            )));
        }
        serde_json::from_str(&response.body).map_err(|err| {
            ToolError::unavailable(format!("Error fetching API documentation: {}", err))
        })
    }

    pub async fn list_endpoints(&self) -> Result<EndpointCatalog, ToolError> {
        let docs = self.fetch_docs().await.map_err(|err| {
            self.logger
                .warn("API docs unavailable", Some(&json!({ "error": err.message })));
            err
        })?;
        let catalog = build_catalog(&docs, &self.base_url);
        self.logger.debug(
            "Endpoint catalog built",
            Some(&json!({
                "endpoints": catalog.total_endpoints,
                "categories": catalog.categories.len(),
            })),
        );
        Ok(catalog)
    }
}

#[async_trait]
impl ToolHandler for EndpointCatalogBuilder {
    async fn handle(&self, _args: Value) -> Result<Value, ToolError> {
        match self.list_endpoints().await {
            Ok(catalog) => Ok(serde_json::to_value(catalog)?),
            Err(err) => Ok(json!({ "error": err.message })),
        }
    }
}
