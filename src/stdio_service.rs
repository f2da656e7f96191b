use rmcp::{model::*, ServiceExt};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::tools::{self, ToolError, ToolOutput};
use crate::{init_tracing, AppState};

#[derive(Clone)]
pub struct McpService {
    pub state: Arc<AppState>,
}

impl McpService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

fn tool_list() -> Vec<Tool> {
    tools::tool_specs()
        .into_iter()
        .map(|tool| Tool {
            name: Cow::Borrowed(tool.name),
            description: Some(Cow::Borrowed(tool.description)),
            input_schema: Arc::new(tool.input_schema),
            output_schema: None,
            annotations: None,
        })
        .collect()
}

fn call_result(output: ToolOutput) -> CallToolResult {
    let content = vec![Content::text(output.text)];
    if output.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

impl rmcp::ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Web search with optional page content extraction. Use web_search for queries, get_search_config to inspect limits, and health_check for service status.".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: tool_list(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("MCP tool call: {}", request.name);

        match tools::dispatch(&self.state, request.name.as_ref(), request.arguments).await {
            Ok(output) => {
                if output.is_error {
                    error!("Tool {} returned an error result", request.name);
                }
                Ok(call_result(output))
            }
            Err(e @ ToolError::UnknownTool(_)) => {
                Err(ErrorData::new(ErrorCode::METHOD_NOT_FOUND, e.to_string(), None))
            }
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config.logging.level, true);
    match Config::source_path() {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }
    info!("Starting MCP stdio service");
    info!("Search backend: {}", config.search.backend.as_str());

    let state = Arc::new(AppState::new(config)?);
    let server = McpService::new(state).serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio server running");
    let _quit_reason = server.waiting().await?;
    Ok(())
}
