//! Result normalization: provider records onto the canonical result model.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::backend::RawRecord;
use crate::types::{SearchRequest, SearchResult};

const URL_FIELDS: &[&str] = &["url", "href", "link"];
const TITLE_FIELDS: &[&str] = &["title"];
const DESCRIPTION_FIELDS: &[&str] = &["description", "content", "body"];
const SNIPPET_FIELDS: &[&str] = &["snippet", "content", "description"];
const DATE_FIELDS: &[&str] = &["publishedDate", "published_date", "date"];

/// Why a raw record was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    MissingUrl,
    InvalidUrl(String),
    MissingTitle,
}

/// Map one raw record onto a [`SearchResult`]. Missing optional fields are
/// left empty; a record without an absolute http(s) URL or a title is rejected.
pub fn normalize_record(record: &RawRecord) -> Result<SearchResult, RecordRejection> {
    let raw_url = first_text(record, URL_FIELDS).ok_or(RecordRejection::MissingUrl)?;
    let url = match Url::parse(&raw_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url,
        _ => return Err(RecordRejection::InvalidUrl(raw_url)),
    };
    let title = first_text(record, TITLE_FIELDS).ok_or(RecordRejection::MissingTitle)?;

    let description = first_text(record, DESCRIPTION_FIELDS).unwrap_or_default();
    let snippet = first_text(record, SNIPPET_FIELDS).unwrap_or_else(|| description.clone());

    Ok(SearchResult {
        title,
        url: url.to_string(),
        description,
        snippet,
        source: record.source.clone(),
        timestamp: Utc::now(),
        published_date: first_text(record, DATE_FIELDS),
        extracted_content: None,
        extraction_error: None,
    })
}

/// Normalize a backend batch: drop invalid records, dedup by normalized URL
/// keeping the first occurrence, then apply the request's domain filters.
/// Backend order is preserved.
pub fn normalize_batch(records: Vec<RawRecord>, request: &SearchRequest) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(records.len());

    for record in &records {
        let result = match normalize_record(record) {
            Ok(result) => result,
            Err(reason) => {
                debug!("Dropping {} record: {:?}", record.source, reason);
                continue;
            }
        };
        let Some(key) = normalized_url_key(&result.url) else {
            continue;
        };
        if !seen.insert(key) {
            debug!("Dropping duplicate result {}", result.url);
            continue;
        }
        if !passes_domain_filters(&result.url, request) {
            debug!("Result {} filtered by domain rules", result.url);
            continue;
        }
        results.push(result);
    }

    debug!("Normalized {} of {} records", results.len(), records.len());
    results
}

/// Dedup key: scheme, host and non-default port lowercased, path without a
/// trailing slash, query pairs sorted. Fragments are ignored.
pub fn normalized_url_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();

    let mut key = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(url.path().trim_end_matches('/'));

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        pairs.sort();
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&query);
    }
    Some(key)
}

fn passes_domain_filters(url: &str, request: &SearchRequest) -> bool {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    else {
        return false;
    };

    if request
        .blocked_domains()
        .iter()
        .any(|domain| host_matches(&host, domain))
    {
        return false;
    }
    request.allowed_domains().is_empty()
        || request
            .allowed_domains()
            .iter()
            .any(|domain| host_matches(&host, domain))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// First non-empty string among `keys`, whitespace-collapsed
fn first_text(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.fields.get(*key))
        .filter_map(Value::as_str)
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|s| !s.is_empty())
}
