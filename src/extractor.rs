//! Content extraction for a single result page.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use whatlang::{detect, Lang};

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::quality::{self, QualitySignals};
use crate::readability;
use crate::types::{ExtractedContent, ExtractionMode};
use crate::user_agent::UserAgentPool;

/// (selector, attribute) pairs tried in order; element text is used when
/// the attribute is absent
const AUTHOR_SOURCES: &[(&str, &str)] = &[
    ("meta[name=\"author\"]", "content"),
    ("meta[property=\"article:author\"]", "content"),
    ("meta[name=\"twitter:creator\"]", "content"),
    ("[itemprop=\"author\"]", "content"),
    ("[rel=\"author\"]", "title"),
];

const DATE_SOURCES: &[(&str, &str)] = &[
    ("meta[property=\"article:published_time\"]", "content"),
    ("meta[name=\"publish-date\"]", "content"),
    ("meta[name=\"publish_date\"]", "content"),
    ("meta[name=\"date\"]", "content"),
    ("[itemprop=\"datePublished\"]", "content"),
    ("time[datetime]", "datetime"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Html,
    PlainText,
}

struct FetchedPage {
    kind: PageKind,
    body: String,
}

/// Fetches result pages and turns them into [`ExtractedContent`]
pub struct ContentExtractor {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
    user_agents: Arc<UserAgentPool>,
}

impl ContentExtractor {
    pub fn new(
        client: Client,
        timeout: Duration,
        max_bytes: usize,
        user_agents: Arc<UserAgentPool>,
    ) -> Self {
        Self {
            client,
            timeout,
            max_bytes,
            user_agents,
        }
    }

    pub fn from_config(
        client: Client,
        config: &ExtractionConfig,
        user_agents: Arc<UserAgentPool>,
    ) -> Self {
        Self::new(client, config.timeout(), config.max_bytes, user_agents)
    }

    /// Fetch `url` and extract its readable content under the per-page timeout
    pub async fn extract(
        &self,
        url: &str,
        mode: ExtractionMode,
    ) -> Result<ExtractedContent, ExtractionError> {
        let base_url = Url::parse(url)
            .map_err(|e| ExtractionError::FetchFailed(format!("invalid URL '{}': {}", url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ExtractionError::FetchFailed(format!(
                "unsupported URL scheme '{}'",
                base_url.scheme()
            )));
        }

        let page = tokio::time::timeout(self.timeout, self.fetch(&base_url))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))??;

        let extracted = match page.kind {
            PageKind::Html => analyze_html(&page.body, &base_url, mode)?,
            PageKind::PlainText => analyze_text(&page.body)?,
        };
        info!(
            "Extracted {} words from {} (quality {:.2})",
            extracted.word_count, url, extracted.quality_score
        );
        Ok(extracted)
    }

    async fn fetch(&self, url: &Url) -> Result<FetchedPage, ExtractionError> {
        let mut response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.user_agents.next())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.5",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::FetchFailed(format!("HTTP {}", status)));
        }

        // Reject binary content before reading the body
        let declared = match response.headers().get(CONTENT_TYPE) {
            Some(value) => {
                let content_type = value.to_str().unwrap_or_default();
                Some(classify_content_type(content_type)?)
            }
            None => None,
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport_error(e))? {
            let room = self.max_bytes.saturating_sub(bytes.len());
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                debug!("Truncated {} at {} bytes", url, self.max_bytes);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        let kind = declared.unwrap_or_else(|| sniff(&body));
        Ok(FetchedPage { kind, body })
    }

    fn transport_error(&self, err: reqwest::Error) -> ExtractionError {
        if err.is_timeout() {
            ExtractionError::Timeout(self.timeout)
        } else {
            ExtractionError::FetchFailed(err.to_string())
        }
    }
}

fn classify_content_type(content_type: &str) -> Result<PageKind, ExtractionError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => Ok(PageKind::Html),
        "" => Ok(PageKind::Html),
        m if m.starts_with("text/") => Ok(PageKind::PlainText),
        _ => Err(ExtractionError::UnsupportedContentType(mime)),
    }
}

fn sniff(body: &str) -> PageKind {
    if body.trim_start().starts_with('<') {
        PageKind::Html
    } else {
        PageKind::PlainText
    }
}

/// Derive [`ExtractedContent`] from an HTML document
pub fn analyze_html(
    html: &str,
    base_url: &Url,
    mode: ExtractionMode,
) -> Result<ExtractedContent, ExtractionError> {
    let document = Html::parse_document(html);

    let content = readability::main_content(html, &document, base_url)
        .ok_or_else(|| ExtractionError::ParseFailed("no readable text found".to_string()))?;
    let words = quality::word_count(&content);
    if words == 0 {
        return Err(ExtractionError::ParseFailed("page has no text".to_string()));
    }

    let author = first_metadata(&document, AUTHOR_SOURCES)
        .or_else(|| json_ld_field(&document, "author"));
    let publish_date = first_metadata(&document, DATE_SOURCES)
        .or_else(|| json_ld_field(&document, "datePublished"));
    let link_density = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .map(readability::link_density)
        .unwrap_or_default();

    let (images, links) = if mode.includes_media() {
        (
            absolute_urls(&document, "img[src]", "src", base_url),
            absolute_urls(&document, "a[href]", "href", base_url),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    let quality_score = quality::quality_score(&QualitySignals {
        words,
        has_author: author.is_some(),
        has_publish_date: publish_date.is_some(),
        link_density,
    });

    Ok(ExtractedContent {
        language: detect_language(&document, &content),
        reading_time_minutes: quality::reading_time_minutes(words),
        word_count: words,
        quality_score,
        content,
        author,
        publish_date,
        images,
        links,
    })
}

/// Derive [`ExtractedContent`] from a plain-text page
pub fn analyze_text(text: &str) -> Result<ExtractedContent, ExtractionError> {
    let content = readability::clean_text(text);
    let words = quality::word_count(&content);
    if words == 0 {
        return Err(ExtractionError::ParseFailed("page has no text".to_string()));
    }
    Ok(ExtractedContent {
        language: language_from_text(&content),
        reading_time_minutes: quality::reading_time_minutes(words),
        word_count: words,
        quality_score: quality::quality_score(&QualitySignals {
            words,
            ..Default::default()
        }),
        content,
        author: None,
        publish_date: None,
        images: Vec::new(),
        links: Vec::new(),
    })
}

fn first_metadata(document: &Html, sources: &[(&str, &str)]) -> Option<String> {
    for (selector, attr) in sources {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let value = match element.value().attr(attr) {
                Some(value) => value.to_string(),
                None => element.text().collect::<Vec<_>>().join(" "),
            };
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// `key` from the page's `application/ld+json` blocks, searching top-level
/// arrays and `@graph` members
fn json_ld_field(document: &Html, key: &str) -> Option<String> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]").ok()?;
    document
        .select(&selector)
        .filter_map(|script| {
            let raw: String = script.text().collect();
            serde_json::from_str::<Value>(&raw).ok()
        })
        .find_map(|data| json_ld_lookup(&data, key))
}

fn json_ld_lookup(data: &Value, key: &str) -> Option<String> {
    match data {
        Value::Array(items) => items.iter().find_map(|item| json_ld_lookup(item, key)),
        Value::Object(map) => map
            .get(key)
            .and_then(json_ld_text)
            .or_else(|| map.get("@graph").and_then(|graph| json_ld_lookup(graph, key))),
        _ => None,
    }
}

/// A string, a `{"name": ...}` object, or the first usable list entry
fn json_ld_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.as_str(),
        Value::Object(map) => map.get("name")?.as_str()?,
        Value::Array(items) => return items.iter().find_map(json_ld_text),
        _ => return None,
    };
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Language from markup first, then from the extracted text
fn detect_language(document: &Html, content: &str) -> String {
    if let Ok(selector) = Selector::parse("html") {
        if let Some(lang) = document
            .select(&selector)
            .next()
            .and_then(|html| html.value().attr("lang"))
            .and_then(primary_subtag)
        {
            return lang;
        }
    }

    if let Ok(selector) = Selector::parse("meta[http-equiv=\"content-language\"]") {
        if let Some(lang) = document
            .select(&selector)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .and_then(primary_subtag)
        {
            return lang;
        }
    }

    language_from_text(content)
}

fn primary_subtag(tag: &str) -> Option<String> {
    let primary = tag.trim().split(['-', '_']).next()?.to_lowercase();
    (!primary.is_empty() && primary.chars().all(|c| c.is_ascii_alphabetic())).then_some(primary)
}

fn language_from_text(text: &str) -> String {
    match detect(text) {
        Some(info) => match info.lang() {
            Lang::Eng => "en".to_string(),
            Lang::Spa => "es".to_string(),
            Lang::Fra => "fr".to_string(),
            Lang::Deu => "de".to_string(),
            Lang::Ita => "it".to_string(),
            Lang::Por => "pt".to_string(),
            Lang::Rus => "ru".to_string(),
            Lang::Jpn => "ja".to_string(),
            Lang::Kor => "ko".to_string(),
            Lang::Cmn => "zh".to_string(),
            other => other.code().to_string(),
        },
        None => "unknown".to_string(),
    }
}

/// Absolute http(s) URLs from `attr` of every element matching `selector`,
/// deduplicated in document order
fn absolute_urls(document: &Html, selector: &str, attr: &str, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .filter_map(|value| base_url.join(value.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| url.to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
