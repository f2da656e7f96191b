//! Tool definitions and dispatch shared by the HTTP and stdio transports.

use chrono::Utc;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, ValidationError};
use crate::types::{
    ErrorInfo, Performance, SearchMode, SearchResponse, VisualMode, WebSearchArgs,
};
use crate::AppState;

pub const WEB_SEARCH: &str = "web_search";
pub const GET_SEARCH_CONFIG: &str = "get_search_config";
pub const HEALTH_CHECK: &str = "health_check";

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Map<String, Value>,
}

/// Result of a tool call as text content
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: WEB_SEARCH,
            description: "Search the web and return normalized results with titles, URLs and snippets. \
                Set extraction_mode to full_text or full_content_with_media to also fetch each result \
                page and extract its readable content, metadata and quality score.",
            input_schema: web_search_schema(),
        },
        ToolSpec {
            name: GET_SEARCH_CONFIG,
            description: "Return the effective search configuration: backend, limits, timeouts, cache and extraction settings.",
            input_schema: empty_schema(),
        },
        ToolSpec {
            name: HEALTH_CHECK,
            description: "Report service health, the active search backend and cache statistics.",
            input_schema: empty_schema(),
        },
    ]
}

fn web_search_schema() -> Map<String, Value> {
    let schema = schemars::schema_for!(WebSearchArgs);
    match serde_json::to_value(schema) {
        Ok(Value::Object(mut map)) => {
            map.remove("$schema");
            map
        }
        _ => Map::new(),
    }
}

fn empty_schema() -> Map<String, Value> {
    match json!({"type": "object", "properties": {}}) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub async fn dispatch(
    state: &AppState,
    name: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<ToolOutput, ToolError> {
    match name {
        WEB_SEARCH => {
            let response = web_search(state, Value::Object(arguments.unwrap_or_default())).await;
            Ok(ToolOutput {
                is_error: !response.success,
                text: to_pretty_json(&response),
            })
        }
        GET_SEARCH_CONFIG => Ok(ToolOutput {
            text: to_pretty_json(&search_config(state)),
            is_error: false,
        }),
        HEALTH_CHECK => Ok(ToolOutput {
            text: to_pretty_json(&health(state)),
            is_error: false,
        }),
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// Validate raw `web_search` arguments and run the pipeline. Invalid
/// arguments produce a `validation_error` response without a backend call.
pub async fn web_search(state: &AppState, arguments: Value) -> SearchResponse {
    let args: WebSearchArgs = match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(e) => {
            let query = arguments
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let err = ValidationError::InvalidArguments(e.to_string());
            warn!("Rejected web_search call: {}", err);
            return SearchResponse::failure(
                query,
                Default::default(),
                Uuid::new_v4().to_string(),
                ErrorInfo {
                    kind: ErrorKind::ValidationError,
                    message: err.to_string(),
                },
                Performance::default(),
            );
        }
    };

    let request = match args.validate() {
        Ok(request) => request,
        Err(err) => {
            warn!("Rejected web_search call: {}", err);
            return SearchResponse::invalid(&args, Uuid::new_v4().to_string(), &err);
        }
    };

    if args.search_mode == Some(SearchMode::SearchAndCrawl) {
        warn!("search_and_crawl is not available, continuing with search_only");
    }
    if args.visual_mode == Some(VisualMode::Screenshots) {
        warn!("Screenshots are not available, continuing without visuals");
    }

    state.pipeline.search(&request).await
}

pub fn search_config(state: &AppState) -> Value {
    json!({
        "success": true,
        "config": state.config.snapshot(),
        "timestamp": Utc::now(),
    })
}

pub fn health(state: &AppState) -> Value {
    let cache = state.pipeline.cache().map(|cache| cache.stats());
    info!("Health check");
    json!({
        "success": true,
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.pipeline.backend_name(),
        "cache": cache,
        "timestamp": Utc::now(),
    })
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()}).to_string())
}
