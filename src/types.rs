use crate::error::{ErrorKind, ExtractionErrorKind, ValidationError};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const MAX_QUERY_CHARS: usize = 500;
pub const MAX_RESULTS_LIMIT: u32 = 20;
pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const MAX_CRAWL_DEPTH: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Web,
    News,
    Images,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Web => "web",
            SearchType::News => "news",
            SearchType::Images => "images",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    SnippetOnly,
    FullText,
    FullContentWithMedia,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::SnippetOnly => "snippet_only",
            ExtractionMode::FullText => "full_text",
            ExtractionMode::FullContentWithMedia => "full_content_with_media",
        }
    }

    /// Whether this mode requires fetching result pages
    pub fn fetches_pages(&self) -> bool {
        !matches!(self, ExtractionMode::SnippetOnly)
    }

    pub fn includes_media(&self) -> bool {
        matches!(self, ExtractionMode::FullContentWithMedia)
    }
}

// Crawling and screenshots are not implemented; these are accepted and
// validated at the tool boundary only.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    SearchOnly,
    SearchAndCrawl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisualMode {
    #[default]
    None,
    Screenshots,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotViewport {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

/// Arguments of the `web_search` tool as they arrive from a client
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// The search query to execute (1-500 characters)
    pub query: String,
    /// Maximum number of results to return (1-20, default 10)
    #[serde(default)]
    pub max_results: Option<u32>,
    /// Type of search: web, news or images
    #[serde(default)]
    pub search_type: Option<SearchType>,
    /// Restrict results to a recent time window
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// How much page content to extract for each result
    #[serde(default)]
    pub extraction_mode: Option<ExtractionMode>,
    /// Only keep results from these domains (subdomains included)
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
    /// Drop results from these domains (subdomains included)
    #[serde(default)]
    pub blocked_domains: Option<Vec<String>>,
    /// search_only or search_and_crawl (crawling is currently unavailable)
    #[serde(default)]
    pub search_mode: Option<SearchMode>,
    /// none or screenshots (screenshots are currently unavailable)
    #[serde(default)]
    pub visual_mode: Option<VisualMode>,
    /// Maximum crawl depth for search_and_crawl (1-5)
    #[serde(default)]
    pub crawl_depth: Option<u32>,
    /// Viewport for screenshots: desktop, mobile or tablet
    #[serde(default)]
    pub screenshot_viewport: Option<ScreenshotViewport>,
}

impl WebSearchArgs {
    /// Validate the arguments into an immutable [`SearchRequest`]
    pub fn validate(&self) -> Result<SearchRequest, ValidationError> {
        if let Some(depth) = self.crawl_depth {
            if depth == 0 || depth > MAX_CRAWL_DEPTH {
                return Err(ValidationError::CrawlDepthOutOfRange(depth));
            }
        }

        let mut builder = SearchRequest::builder(&self.query)
            .max_results(self.max_results.unwrap_or(DEFAULT_MAX_RESULTS))
            .search_type(self.search_type.unwrap_or_default())
            .extraction_mode(self.extraction_mode.unwrap_or_default());
        if let Some(range) = self.time_range {
            builder = builder.time_range(range);
        }
        if let Some(domains) = &self.allowed_domains {
            builder = builder.allowed_domains(domains.iter().cloned());
        }
        if let Some(domains) = &self.blocked_domains {
            builder = builder.blocked_domains(domains.iter().cloned());
        }
        builder.build()
    }
}

/// A validated search request. Fields can only be set through
/// [`SearchRequestBuilder`], so every instance has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    query: String,
    max_results: u32,
    search_type: SearchType,
    time_range: Option<TimeRange>,
    extraction_mode: ExtractionMode,
    allowed_domains: Vec<String>,
    blocked_domains: Vec<String>,
}

impl SearchRequest {
    pub fn builder(query: impl Into<String>) -> SearchRequestBuilder {
        SearchRequestBuilder {
            query: query.into(),
            max_results: DEFAULT_MAX_RESULTS,
            search_type: SearchType::default(),
            time_range: None,
            extraction_mode: ExtractionMode::default(),
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
        }
    }

    /// Validate a query with every other field at its default
    pub fn new(query: impl Into<String>) -> Result<Self, ValidationError> {
        Self::builder(query).build()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn max_results(&self) -> usize {
        self.max_results as usize
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    pub fn extraction_mode(&self) -> ExtractionMode {
        self.extraction_mode
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn blocked_domains(&self) -> &[String] {
        &self.blocked_domains
    }

    /// Deterministic cache key covering every field, defaults included.
    /// The query is case-folded and whitespace-collapsed first.
    pub fn fingerprint(&self) -> String {
        let normalized_query = self
            .query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let key = serde_json::json!([
            normalized_query,
            self.max_results,
            self.search_type.as_str(),
            self.time_range.map(|r| r.as_str()),
            self.extraction_mode.as_str(),
            self.allowed_domains,
            self.blocked_domains,
        ]);
        let bytes = serde_json::to_vec(&key).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequestBuilder {
    query: String,
    max_results: u32,
    search_type: SearchType,
    time_range: Option<TimeRange>,
    extraction_mode: ExtractionMode,
    allowed_domains: Vec<String>,
    blocked_domains: Vec<String>,
}

impl SearchRequestBuilder {
    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub fn time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.extraction_mode = mode;
        self
    }

    pub fn allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains.extend(domains.into_iter().map(Into::into));
        self
    }

    pub fn blocked_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_domains.extend(domains.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<SearchRequest, ValidationError> {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        let chars = query.chars().count();
        if chars > MAX_QUERY_CHARS {
            return Err(ValidationError::QueryTooLong(chars));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(ValidationError::MaxResultsOutOfRange(self.max_results));
        }

        Ok(SearchRequest {
            query,
            max_results: self.max_results,
            search_type: self.search_type,
            time_range: self.time_range,
            extraction_mode: self.extraction_mode,
            allowed_domains: canonical_domains(self.allowed_domains)?,
            blocked_domains: canonical_domains(self.blocked_domains)?,
        })
    }
}

/// Lowercase, strip leading dots and `www.`, sort and dedup. Only hostname
/// characters are accepted; internationalized names must be punycode.
fn canonical_domains(domains: Vec<String>) -> Result<Vec<String>, ValidationError> {
    let mut out = Vec::with_capacity(domains.len());
    for raw in domains {
        let domain = raw.trim().trim_start_matches('.').to_lowercase();
        let domain = domain.strip_prefix("www.").unwrap_or(&domain).to_string();
        if domain.is_empty()
            || !domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(ValidationError::InvalidDomain(raw));
        }
        out.push(domain);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// One normalized search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
    pub snippet: String,
    /// Backend that produced this result
    pub source: String,
    /// Time of retrieval
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<ExtractedContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<ExtractionNote>,
}

/// Page content attached to a result when extraction was requested and succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub content: String,
    pub word_count: usize,
    pub reading_time_minutes: usize,
    pub quality_score: f64,
    pub language: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

/// Why a result carries no extracted content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionNote {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub total_time_seconds: f64,
    pub search_time_seconds: f64,
    pub extraction_time_seconds: f64,
    #[serde(default)]
    pub cache_hit: bool,
    /// Set when the request deadline cut extraction short
    #[serde(default)]
    pub partial: bool,
    /// Results left without content because the deadline passed
    #[serde(default)]
    pub degraded_results: usize,
}

impl Performance {
    /// Seconds rounded to milliseconds
    pub fn seconds(duration: Duration) -> f64 {
        (duration.as_secs_f64() * 1000.0).round() / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub request_id: String,
    pub query: String,
    pub extraction_mode: ExtractionMode,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    #[serde(default)]
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
    pub performance: Performance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl SearchResponse {
    pub fn success(
        request: &SearchRequest,
        request_id: String,
        results: Vec<SearchResult>,
        performance: Performance,
    ) -> Self {
        Self {
            success: true,
            request_id,
            query: request.query().to_string(),
            extraction_mode: request.extraction_mode(),
            total_results: results.len(),
            results,
            cached: false,
            timestamp: Utc::now(),
            performance,
            error: None,
        }
    }

    /// A well-formed failure; never carries partial results
    pub fn failure(
        query: &str,
        extraction_mode: ExtractionMode,
        request_id: String,
        error: ErrorInfo,
        performance: Performance,
    ) -> Self {
        Self {
            success: false,
            request_id,
            query: query.trim().to_string(),
            extraction_mode,
            results: Vec::new(),
            total_results: 0,
            cached: false,
            timestamp: Utc::now(),
            performance,
            error: Some(error),
        }
    }

    pub fn invalid(args: &WebSearchArgs, request_id: String, err: &ValidationError) -> Self {
        Self::failure(
            &args.query,
            args.extraction_mode.unwrap_or_default(),
            request_id,
            ErrorInfo {
                kind: ErrorKind::ValidationError,
                message: err.to_string(),
            },
            Performance::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_applied() {
        let request = assert_ok!(SearchRequest::new("  rust async  "));
        assert_eq!(request.query(), "rust async");
        assert_eq!(request.max_results(), 10);
        assert_eq!(request.search_type(), SearchType::Web);
        assert_eq!(request.time_range(), None);
        assert_eq!(request.extraction_mode(), ExtractionMode::SnippetOnly);
    }

    #[test]
    fn test_query_bounds() {
        assert_eq!(SearchRequest::new("   "), Err(ValidationError::EmptyQuery));
        assert_ok!(SearchRequest::new("a".repeat(500)));
        assert_eq!(
            SearchRequest::new("a".repeat(501)),
            Err(ValidationError::QueryTooLong(501))
        );
        // Counted in characters, not bytes
        assert_ok!(SearchRequest::new("é".repeat(500)));
    }

    #[test]
    fn test_max_results_bounds() {
        assert_err!(SearchRequest::builder("q").max_results(0).build());
        assert_err!(SearchRequest::builder("q").max_results(21).build());
        assert_ok!(SearchRequest::builder("q").max_results(1).build());
        assert_ok!(SearchRequest::builder("q").max_results(20).build());
    }

    #[test]
    fn test_args_parse_and_validate() {
        let args: WebSearchArgs = serde_json::from_value(serde_json::json!({
            "query": "python async programming",
            "max_results": 2,
            "search_type": "news",
            "time_range": "week",
            "extraction_mode": "full_text",
            "search_mode": "search_and_crawl",
            "crawl_depth": 2
        }))
        .unwrap();
        let request = args.validate().unwrap();
        assert_eq!(request.max_results(), 2);
        assert_eq!(request.search_type(), SearchType::News);
        assert_eq!(request.time_range(), Some(TimeRange::Week));
        assert_eq!(request.extraction_mode(), ExtractionMode::FullText);
    }

    #[test]
    fn test_args_reject_unknown_enum_value() {
        let parsed = serde_json::from_value::<WebSearchArgs>(serde_json::json!({
            "query": "q",
            "search_type": "videos"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_crawl_depth_bounds() {
        let args = WebSearchArgs {
            query: "q".into(),
            crawl_depth: Some(6),
            ..Default::default()
        };
        assert_eq!(args.validate(), Err(ValidationError::CrawlDepthOutOfRange(6)));
    }

    #[test]
    fn test_domain_filters_are_canonical() {
        let request = SearchRequest::builder("q")
            .allowed_domains(["WWW.Example.com", "docs.rs", ".example.com"])
            .build()
            .unwrap();
        assert_eq!(request.allowed_domains(), &["docs.rs", "example.com"]);

        let err = SearchRequest::builder("q")
            .blocked_domains(["https://bad.com/path"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDomain(_)));

        for bad in ["a.com,b.com", "a|block=b", "münchen.de", "under_score.com"] {
            let err = SearchRequest::builder("q")
                .allowed_domains([bad])
                .build()
                .unwrap_err();
            assert!(matches!(err, ValidationError::InvalidDomain(_)), "{}", bad);
        }
        assert_ok!(SearchRequest::builder("q")
            .allowed_domains(["xn--mnchen-3ya.de", "my-site.co.uk"])
            .build());
    }

    #[test]
    fn test_fingerprint_keeps_domain_lists_apart() {
        let one_list = SearchRequest::builder("q")
            .allowed_domains(["a.com", "b.com"])
            .build()
            .unwrap();
        let split = SearchRequest::builder("q")
            .allowed_domains(["a.com"])
            .blocked_domains(["b.com"])
            .build()
            .unwrap();
        let swapped = SearchRequest::builder("q")
            .allowed_domains(["b.com"])
            .blocked_domains(["a.com"])
            .build()
            .unwrap();
        assert_ne!(one_list.fingerprint(), split.fingerprint());
        assert_ne!(split.fingerprint(), swapped.fingerprint());
        // Query text cannot spill into other fields
        let tricky = SearchRequest::new("rust\",10").unwrap();
        assert_ne!(tricky.fingerprint(), SearchRequest::new("rust").unwrap().fingerprint());
    }

    #[test]
    fn test_fingerprint_collides_for_equivalent_requests() {
        let a = SearchRequest::new("Rust   Programming").unwrap();
        let b = SearchRequest::builder("rust programming")
            .max_results(10)
            .search_type(SearchType::Web)
            .extraction_mode(ExtractionMode::SnippetOnly)
            .build()
            .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_covers_every_field() {
        let base = SearchRequest::new("rust").unwrap().fingerprint();
        let variants = [
            SearchRequest::builder("rust").max_results(5).build(),
            SearchRequest::builder("rust").search_type(SearchType::News).build(),
            SearchRequest::builder("rust").time_range(TimeRange::Day).build(),
            SearchRequest::builder("rust")
                .extraction_mode(ExtractionMode::FullText)
                .build(),
            SearchRequest::builder("rust").allowed_domains(["docs.rs"]).build(),
            SearchRequest::builder("rust").blocked_domains(["docs.rs"]).build(),
        ];
        for variant in variants {
            assert_ne!(variant.unwrap().fingerprint(), base);
        }
    }

    #[test]
    fn test_failure_response_shape() {
        let args = WebSearchArgs {
            query: "".into(),
            ..Default::default()
        };
        let err = args.validate().unwrap_err();
        let response = SearchResponse::invalid(&args, "id".into(), &err);
        assert!(!response.success);
        assert_eq!(response.total_results, 0);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["kind"], "validation_error");
        assert!(json["error"]["message"].as_str().unwrap().contains("empty"));
    }
}
