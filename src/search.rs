//! Search pipeline: cache check, backend query with retry, normalization,
//! optional extraction and response assembly.

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::{RawRecord, SearchBackend};
use crate::cache::SearchCache;
use crate::config::Config;
use crate::error::{BackendError, ErrorKind};
use crate::extractor::ContentExtractor;
use crate::normalize::normalize_batch;
use crate::scrape::enrich_results;
use crate::types::{ErrorInfo, Performance, SearchRequest, SearchResponse};

/// Read-only knobs of the pipeline, fixed at construction
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Server-side cap on top of the request's `max_results`
    pub max_results_cap: usize,
    /// Outer bound over querying and extraction combined
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub extraction_concurrency: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_results_cap: config.search.max_results,
            request_timeout: config.search.request_timeout(),
            retry_attempts: config.search.retry_attempts,
            retry_delay: config.search.retry_delay(),
            extraction_concurrency: config.extraction.concurrency,
        }
    }
}

#[derive(Clone)]
pub struct SearchPipeline {
    backend: Arc<dyn SearchBackend>,
    extractor: Arc<ContentExtractor>,
    cache: Option<SearchCache>,
    settings: PipelineSettings,
}

impl SearchPipeline {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        extractor: Arc<ContentExtractor>,
        cache: Option<SearchCache>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            backend,
            extractor,
            cache,
            settings,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn cache(&self) -> Option<&SearchCache> {
        self.cache.as_ref()
    }

    /// Run one request to completion. Never fails: backend errors come back
    /// as a response with `success == false`.
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("search", request_id = %request_id);
        self.run(request, request_id).instrument(span).await
    }

    async fn run(&self, request: &SearchRequest, request_id: String) -> SearchResponse {
        let started = Instant::now();
        let deadline = started + self.settings.request_timeout;
        info!(
            "Searching for: {} ({}, {})",
            request.query(),
            request.search_type().as_str(),
            request.extraction_mode().as_str()
        );

        let fingerprint = request.fingerprint();
        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get(&fingerprint).await {
                debug!("search cache hit for query");
                cached.request_id = request_id;
                cached.query = request.query().to_string();
                cached.cached = true;
                cached.performance = Performance {
                    total_time_seconds: Performance::seconds(started.elapsed()),
                    cache_hit: true,
                    ..Default::default()
                };
                return cached;
            }
        }

        let records = match timeout_at(deadline, self.query_with_retry(request)).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => return self.failure(request, request_id, &e, started),
            Err(_) => {
                let e = BackendError::Timeout(format!(
                    "no backend response within the {}s request deadline",
                    self.settings.request_timeout.as_secs()
                ));
                return self.failure(request, request_id, &e, started);
            }
        };
        let search_time = started.elapsed();

        let mut results = normalize_batch(records, request);
        results.truncate(request.max_results().min(self.settings.max_results_cap));

        let mut performance = Performance {
            search_time_seconds: Performance::seconds(search_time),
            ..Default::default()
        };

        let mode = request.extraction_mode();
        if mode.fetches_pages() {
            let extraction_started = Instant::now();
            let outcome = enrich_results(
                &self.extractor,
                &mut results,
                mode,
                self.settings.extraction_concurrency,
                deadline,
            )
            .await;
            performance.extraction_time_seconds =
                Performance::seconds(extraction_started.elapsed());
            performance.partial = outcome.partial();
            performance.degraded_results = outcome.degraded;
        }
        performance.total_time_seconds = Performance::seconds(started.elapsed());

        let response = SearchResponse::success(request, request_id, results, performance);
        info!(
            "Search completed with {} results in {:.3}s",
            response.total_results, response.performance.total_time_seconds
        );

        if let Some(cache) = &self.cache {
            if response.performance.partial {
                debug!("Not caching partial response");
            } else {
                cache.put(fingerprint, &response).await;
            }
        }
        response
    }

    /// Query the backend, retrying transient errors with exponential backoff
    async fn query_with_retry(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<RawRecord>, BackendError> {
        let max_attempts = self.settings.retry_attempts.max(1);
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.retry_delay)
            .with_max_interval(self.settings.retry_delay * 4)
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let backend = &self.backend;
        retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match backend.query(request).await {
                Ok(records) => Ok(records),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        backend.name(),
                        attempt,
                        max_attempts,
                        e
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    fn failure(
        &self,
        request: &SearchRequest,
        request_id: String,
        err: &BackendError,
        started: Instant,
    ) -> SearchResponse {
        warn!("Search failed: {}", err);
        let elapsed = Performance::seconds(started.elapsed());
        SearchResponse::failure(
            request.query(),
            request.extraction_mode(),
            request_id,
            ErrorInfo {
                kind: ErrorKind::from(err),
                message: err.to_string(),
            },
            Performance {
                total_time_seconds: elapsed,
                search_time_seconds: elapsed,
                ..Default::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractionMode;
    use crate::user_agent::UserAgentPool;
    use async_trait::async_trait;
    use reqwest::Client;
    use serde_json::json;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = "<html><body><article><p>Python's asyncio library provides an event loop, coroutines, and tasks for concurrent code.</p></article></body></html>";

    struct StubBackend {
        records: Vec<RawRecord>,
        scripted: Mutex<VecDeque<BackendError>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn new(records: Vec<RawRecord>) -> Self {
            Self {
                records,
                scripted: Mutex::new(VecDeque::new()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        /// Fail with these errors, in order, before returning records
        fn failing_with(mut self, errors: Vec<BackendError>) -> Self {
            self.scripted = Mutex::new(errors.into());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn query(&self, _request: &SearchRequest) -> Result<Vec<RawRecord>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(err) = self.scripted.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(self.records.clone())
        }
    }

    fn record(url: &str, title: &str) -> RawRecord {
        RawRecord::from_json(
            "stub",
            json!({"url": url, "title": title, "content": format!("About {}", title)}),
        )
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            max_results_cap: 20,
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(10),
            extraction_concurrency: 5,
        }
    }

    fn pipeline(
        backend: Arc<StubBackend>,
        cache: Option<SearchCache>,
        settings: PipelineSettings,
    ) -> SearchPipeline {
        let extractor = ContentExtractor::new(
            Client::new(),
            Duration::from_secs(5),
            1024 * 1024,
            Arc::new(UserAgentPool::new(true)),
        );
        SearchPipeline::new(backend, Arc::new(extractor), cache, settings)
    }

    fn request(mode: ExtractionMode) -> SearchRequest {
        SearchRequest::builder("python async programming")
            .max_results(2)
            .extraction_mode(mode)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_snippet_only_end_to_end() {
        let backend = Arc::new(StubBackend::new(vec![
            record("https://docs.python.org/3/library/asyncio.html", "asyncio"),
            record("https://realpython.com/async-io-python/", "Async IO"),
        ]));
        let pipeline = pipeline(backend.clone(), None, settings());

        let response = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert!(response.success);
        assert_eq!(response.total_results, 2);
        assert_eq!(response.results.len(), 2);
        assert!(response.results.iter().all(|r| r.extracted_content.is_none()));
        assert_eq!(response.performance.extraction_time_seconds, 0.0);
        assert_eq!(response.results[0].title, "asyncio");
        assert_eq!(response.results[0].source, "stub");
        assert!(response.error.is_none());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_full_text_end_to_end_with_one_dead_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guide"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = Arc::new(StubBackend::new(vec![
            record(&format!("{}/gone", server.uri()), "Gone"),
            record(&format!("{}/guide", server.uri()), "Guide"),
        ]));
        let pipeline = pipeline(backend, None, settings());

        let response = pipeline.search(&request(ExtractionMode::FullText)).await;
        assert!(response.success);
        assert_eq!(response.total_results, 2);
        let enriched: Vec<_> = response
            .results
            .iter()
            .filter(|r| r.extracted_content.is_some())
            .collect();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].title, "Guide");
        // Backend order survives concurrent extraction
        assert_eq!(response.results[0].title, "Gone");
        assert!(response.results[0].extraction_error.is_some());
        assert!(!response.performance.partial);
        let content = enriched[0].extracted_content.as_ref().unwrap();
        assert_eq!(content.reading_time_minutes, 1);
    }

    #[tokio::test]
    async fn test_second_identical_request_is_served_from_cache() {
        let backend = Arc::new(StubBackend::new(vec![
            record("https://a.example/", "A"),
            record("https://b.example/", "B"),
        ]));
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let pipeline = pipeline(backend.clone(), Some(cache.clone()), settings());

        let first = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        let equivalent = SearchRequest::builder("  Python   ASYNC programming ")
            .max_results(2)
            .build()
            .unwrap();
        let second = pipeline.search(&equivalent).await;

        assert_eq!(backend.calls(), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.query, "python async programming");
        assert_eq!(second.query, "Python   ASYNC programming");
        assert!(second.performance.cache_hit);
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(
            serde_json::to_vec(&first.results).unwrap(),
            serde_json::to_vec(&second.results).unwrap()
        );
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_queries() {
        let backend = Arc::new(StubBackend::new(vec![record("https://a.example/", "A")]));
        let pipeline = pipeline(backend.clone(), None, settings());
        pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_backend_error_fails_without_retry() {
        let backend = Arc::new(
            StubBackend::new(vec![record("https://a.example/", "A")])
                .failing_with(vec![BackendError::RateLimited("slow down".into())]),
        );
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let pipeline = pipeline(backend.clone(), Some(cache), settings());

        let response = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert!(!response.success);
        assert!(response.results.is_empty());
        assert_eq!(response.total_results, 0);
        let error = response.error.unwrap();
        assert_eq!(error.kind, ErrorKind::BackendRateLimited);
        assert!(error.message.contains("slow down"));
        assert_eq!(backend.calls(), 1);

        // Failures are not cached
        let retried = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert!(retried.success);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let backend = Arc::new(
            StubBackend::new(vec![record("https://a.example/", "A")]).failing_with(vec![
                BackendError::Unreachable("connection reset".into()),
                BackendError::Timeout("slow".into()),
            ]),
        );
        let pipeline = pipeline(backend.clone(), None, settings());

        let response = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert!(response.success);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_attempt_limit() {
        let backend = Arc::new(StubBackend::new(Vec::new()).failing_with(vec![
            BackendError::Unreachable("down".into()),
            BackendError::Unreachable("down".into()),
            BackendError::Unreachable("down".into()),
        ]));
        let pipeline = pipeline(
            backend.clone(),
            None,
            PipelineSettings {
                retry_attempts: 2,
                ..settings()
            },
        );

        let response = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::BackendUnreachable);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_hanging_backend_hits_request_deadline() {
        let mut stub = StubBackend::new(vec![record("https://a.example/", "A")]);
        stub.delay = Duration::from_secs(5);
        let backend = Arc::new(stub);
        let pipeline = pipeline(
            backend,
            None,
            PipelineSettings {
                request_timeout: Duration::from_millis(200),
                ..settings()
            },
        );

        let response = pipeline.search(&request(ExtractionMode::SnippetOnly)).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, ErrorKind::BackendTimeout);
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_results_uncached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(ARTICLE, "text/html")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let backend = Arc::new(StubBackend::new(vec![
            record(&format!("{}/fast", server.uri()), "Fast"),
            record(&format!("{}/slow", server.uri()), "Slow"),
        ]));
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let pipeline = pipeline(
            backend.clone(),
            Some(cache),
            PipelineSettings {
                request_timeout: Duration::from_millis(800),
                ..settings()
            },
        );

        let response = pipeline.search(&request(ExtractionMode::FullText)).await;
        assert!(response.success);
        assert!(response.performance.partial);
        assert_eq!(response.performance.degraded_results, 1);
        assert!(response.results[0].extracted_content.is_some());
        assert_eq!(
            response.results[1].extraction_error.as_ref().unwrap().kind,
            crate::error::ExtractionErrorKind::DeadlineExceeded
        );

        pipeline.search(&request(ExtractionMode::FullText)).await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_results_are_unique_ordered_and_capped() {
        let backend = Arc::new(StubBackend::new(vec![
            record("https://one.example/a", "1"),
            record("https://two.example/", "2"),
            record("https://one.example/a/", "duplicate"),
            RawRecord::from_json("stub", json!({"title": "no url"})),
            record("https://three.example/", "3"),
            record("https://four.example/", "4"),
        ]));
        let pipeline = pipeline(
            backend,
            None,
            PipelineSettings {
                max_results_cap: 3,
                ..settings()
            },
        );
        let request = SearchRequest::builder("q").max_results(10).build().unwrap();

        let response = pipeline.search(&request).await;
        let titles: Vec<_> = response.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["1", "2", "3"]);
        assert_eq!(response.total_results, response.results.len());
        let urls: HashSet<_> = response.results.iter().map(|r| &r.url).collect();
        assert_eq!(urls.len(), response.results.len());
    }
}
