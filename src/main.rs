use std::sync::Arc;
use tracing::info;

use web_search_mcp::config::Config;
use web_search_mcp::{init_tracing, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config.logging.level, false);
    match Config::source_path() {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    info!("Starting web search MCP server");
    info!("Search backend: {}", config.search.backend.as_str());
    info!(
        "Cache: {} (ttl {}s, max {} entries)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.ttl,
        config.cache.max_size
    );

    let state = Arc::new(AppState::new(config)?);
    server::serve(state).await
}
