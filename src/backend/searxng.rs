//! SearXNG backend
//!
//! Queries the JSON API of a SearXNG instance.
//! See: https://docs.searxng.org/dev/search_api.html

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{RawRecord, SearchBackend};
use crate::error::BackendError;
use crate::types::{SearchRequest, SearchType};
use crate::user_agent::UserAgentPool;

pub struct SearxngBackend {
    client: Client,
    base_url: String,
    engines: Option<String>,
    timeout: Duration,
    user_agents: Arc<UserAgentPool>,
}

// Results are kept as raw JSON objects so one odd record cannot fail the batch
#[derive(Debug, Deserialize)]
struct SearxngResponse {
    results: Vec<serde_json::Value>,
    #[serde(default)]
    number_of_results: Option<f64>,
}

impl SearxngBackend {
    pub fn new(
        client: Client,
        base_url: String,
        engines: Option<String>,
        timeout: Duration,
        user_agents: Arc<UserAgentPool>,
    ) -> Self {
        Self {
            client,
            base_url,
            engines,
            timeout,
            user_agents,
        }
    }

    fn category(search_type: SearchType) -> &'static str {
        match search_type {
            SearchType::Web => "general",
            SearchType::News => "news",
            SearchType::Images => "images",
        }
    }
}

#[async_trait]
impl SearchBackend for SearxngBackend {
    fn name(&self) -> &str {
        "searxng"
    }

    async fn query(&self, request: &SearchRequest) -> Result<Vec<RawRecord>, BackendError> {
        let search_url = format!("{}/search", self.base_url.trim_end_matches('/'));
        debug!("Search URL: {}", search_url);

        let mut params: Vec<(&str, String)> = vec![
            ("q", request.query().to_string()),
            ("format", "json".into()),
            ("pageno", "1".into()),
            ("safesearch", "0".into()),
            ("categories", Self::category(request.search_type()).into()),
        ];
        if let Some(range) = request.time_range() {
            params.push(("time_range", range.as_str().into()));
        }
        if let Some(engines) = &self.engines {
            params.push(("engines", engines.clone()));
        }

        let response = self
            .client
            .get(&search_url)
            .query(&params)
            .header(USER_AGENT, self.user_agents.next())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &body));
        }

        let body = response.text().await.map_err(BackendError::from_reqwest)?;
        let parsed: SearxngResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::MalformedResponse(format!("invalid SearXNG JSON: {}", e)))?;

        info!(
            "SearXNG returned {} results (estimated total {:?})",
            parsed.results.len(),
            parsed.number_of_results
        );

        Ok(parsed
            .results
            .into_iter()
            .filter(|value| value.is_object())
            .map(|value| RawRecord::from_json(self.name(), value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, timeout: Duration) -> SearxngBackend {
        SearxngBackend::new(
            Client::new(),
            server.uri(),
            None,
            timeout,
            Arc::new(UserAgentPool::new(true)),
        )
    }

    #[tokio::test]
    async fn test_query_returns_raw_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust async"))
            .and(query_param("format", "json"))
            .and(query_param("categories", "news"))
            .and(query_param("time_range", "week"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": "rust async",
                "number_of_results": 2,
                "results": [
                    {"url": "https://tokio.rs/", "title": "Tokio", "content": "Async runtime", "engine": "google"},
                    {"url": "https://docs.rs/", "title": "Docs"},
                    "garbage"
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = SearchRequest::builder("rust async")
            .search_type(SearchType::News)
            .time_range(crate::types::TimeRange::Week)
            .build()
            .unwrap();
        let records = backend(&server, Duration::from_secs(5))
            .query(&request)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "searxng");
        assert_eq!(records[0].fields["title"], "Tokio");
        assert!(records[1].fields.get("content").is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_secs(5))
            .query(&SearchRequest::new("q").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_secs(5))
            .query(&SearchRequest::new("q").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_secs(5))
            .query(&SearchRequest::new("q").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_millis(200))
            .query(&SearchRequest::new("q").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let backend = SearxngBackend::new(
            Client::new(),
            "http://127.0.0.1:9".to_string(),
            None,
            Duration::from_secs(2),
            Arc::new(UserAgentPool::new(false)),
        );
        let err = backend
            .query(&SearchRequest::new("q").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
