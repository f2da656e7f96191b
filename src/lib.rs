pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod mcp;
pub mod normalize;
pub mod quality;
pub mod readability;
pub mod scrape;
pub mod search;
pub mod server;
pub mod stdio_service;
pub mod tools;
pub mod types;
pub mod user_agent;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use backend::SearchBackend;
use cache::SearchCache;
use config::Config;
use extractor::ContentExtractor;
use search::{PipelineSettings, SearchPipeline};
use user_agent::UserAgentPool;

pub use types::*;

/// Process-wide state shared by both transports
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: SearchPipeline,
}

impl AppState {
    /// Build the state for the configured backend
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = http_client()?;
        let user_agents = Arc::new(UserAgentPool::new(config.search.user_agent_rotation));
        let backend = backend::from_config(&config.search, client.clone(), user_agents);
        Ok(Self::with_backend(config, client, backend))
    }

    /// Build the state around an explicit backend
    pub fn with_backend(
        config: Config,
        client: reqwest::Client,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        let user_agents = Arc::new(UserAgentPool::new(config.search.user_agent_rotation));
        let extractor = ContentExtractor::from_config(client, &config.extraction, user_agents);
        let cache = config
            .cache
            .enabled
            .then(|| SearchCache::from_config(&config.cache));
        let pipeline = SearchPipeline::new(
            backend,
            Arc::new(extractor),
            cache,
            PipelineSettings::from_config(&config),
        );

        Self {
            config: Arc::new(config),
            pipeline,
        }
    }
}

/// Shared outbound client; per-request timeouts are set by each caller
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if to_stderr {
        // stdout carries protocol frames
        builder.with_writer(std::io::stderr).with_ansi(false).init();
    } else {
        builder.init();
    }
}
