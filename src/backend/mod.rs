//! Search backend implementations
//!
//! Every provider implements [`SearchBackend`]: exactly one outbound query
//! per call, no retries and no caching. Retry policy belongs to the
//! pipeline in [`crate::search`].

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::config::{BackendKind, SearchConfig};
use crate::error::BackendError;
use crate::types::SearchRequest;
use crate::user_agent::UserAgentPool;

pub mod duckduckgo;
pub mod searxng;

pub use duckduckgo::DuckDuckGoBackend;
pub use searxng::SearxngBackend;

/// One provider-native record, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Name of the backend that produced the record
    pub source: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    pub fn new(
        source: impl Into<String>,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            source: source.into(),
            fields,
        }
    }

    /// Build a record from a JSON object literal; non-objects yield no fields
    pub fn from_json(source: impl Into<String>, value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(fields) => Self::new(source, fields),
            _ => Self::new(source, serde_json::Map::new()),
        }
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Name reported as the `source` of every result
    fn name(&self) -> &str;

    /// Issue one query to the provider
    async fn query(&self, request: &SearchRequest) -> Result<Vec<RawRecord>, BackendError>;
}

/// Construct the backend selected by `search.backend`
pub fn from_config(
    config: &SearchConfig,
    client: Client,
    user_agents: Arc<UserAgentPool>,
) -> Arc<dyn SearchBackend> {
    match config.backend {
        BackendKind::Duckduckgo => Arc::new(DuckDuckGoBackend::new(
            client,
            config.duckduckgo_url.clone(),
            config.timeout(),
            user_agents,
        )),
        BackendKind::Searxng => Arc::new(SearxngBackend::new(
            client,
            config.searxng_url.clone(),
            config.searxng_engines.clone(),
            config.timeout(),
            user_agents,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selection() {
        let pool = Arc::new(UserAgentPool::new(false));
        let mut config = SearchConfig::default();
        assert_eq!(from_config(&config, Client::new(), pool.clone()).name(), "duckduckgo");
        config.backend = BackendKind::Searxng;
        assert_eq!(from_config(&config, Client::new(), pool).name(), "searxng");
    }

    #[test]
    fn test_raw_record_from_non_object() {
        let record = RawRecord::from_json("stub", serde_json::json!(["not", "an", "object"]));
        assert!(record.fields.is_empty());
        assert_eq!(record.source, "stub");
    }
}
