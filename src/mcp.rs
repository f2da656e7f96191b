//! MCP-style tool endpoints over plain HTTP.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::tools::{self, ToolError};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpToolsResponse {
    pub tools: Vec<McpTool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallResponse {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

pub async fn list_tools() -> Json<McpToolsResponse> {
    let tools = tools::tool_specs()
        .into_iter()
        .map(|tool| McpTool {
            name: tool.name.to_string(),
            description: tool.description.to_string(),
            input_schema: Value::Object(tool.input_schema),
        })
        .collect();

    Json(McpToolsResponse { tools })
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpCallRequest>,
) -> Result<Json<McpCallResponse>, ApiError> {
    info!("MCP tool call: {}", request.name);

    let arguments = match request.arguments {
        Value::Object(map) => Some(map),
        Value::Null => None,
        _ => return Err(bad_request("arguments must be a JSON object".to_string())),
    };

    match tools::dispatch(&state, &request.name, arguments).await {
        Ok(output) => {
            if output.is_error {
                error!("Tool {} returned an error result", request.name);
            }
            Ok(Json(McpCallResponse {
                content: vec![McpContent {
                    content_type: "text".to_string(),
                    text: output.text,
                }],
                is_error: output.is_error,
            }))
        }
        Err(e @ ToolError::UnknownTool(_)) => Err(bad_request(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixed_state;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_tools() {
        let Json(response) = list_tools().await;
        let names: Vec<_> = response.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["web_search", "get_search_config", "health_check"]);
        assert_eq!(response.tools[0].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn test_call_tool_wraps_output_as_text() {
        let (state, _) = fixed_state();
        let request = McpCallRequest {
            name: "web_search".to_string(),
            arguments: json!({"query": "tokio"}),
        };
        let Json(response) = call_tool(State(Arc::new(state)), Json(request))
            .await
            .unwrap();
        assert!(!response.is_error);
        assert_eq!(response.content[0].content_type, "text");
        let body: Value = serde_json::from_str(&response.content[0].text).unwrap();
        assert_eq!(body["results"][0]["title"], "tokio");
    }

    #[tokio::test]
    async fn test_call_tool_rejects_non_object_arguments() {
        let (state, _) = fixed_state();
        let request = McpCallRequest {
            name: "web_search".to_string(),
            arguments: json!(["tokio"]),
        };
        let (status, _) = call_tool(State(Arc::new(state)), Json(request))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
