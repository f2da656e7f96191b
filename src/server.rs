//! HTTP transport.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ErrorKind;
use crate::types::SearchResponse;
use crate::{mcp, tools, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search", post(search_handler))
        .route("/config", get(config_handler))
        .route("/mcp/tools", get(mcp::list_tools))
        .route("/mcp/call", post(mcp::call_tool))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until the process exits
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web search MCP server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(tools::health(&state))
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(tools::search_config(&state))
}

/// Same contract as the `web_search` tool; the body is always a search response
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(arguments): Json<Value>,
) -> (StatusCode, Json<SearchResponse>) {
    let response = tools::web_search(&state, arguments).await;
    let status = match response.error.as_ref().map(|e| e.kind) {
        None => StatusCode::OK,
        Some(ErrorKind::ValidationError) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::BackendTimeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(response))
}
