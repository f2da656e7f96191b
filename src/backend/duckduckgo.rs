//! DuckDuckGo backend
//!
//! Scrapes the JavaScript-free HTML endpoint. The endpoint has no news or
//! image verticals, so every search type is served from the web index.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{RawRecord, SearchBackend};
use crate::error::BackendError;
use crate::types::{SearchRequest, SearchType, TimeRange};
use crate::user_agent::UserAgentPool;

pub struct DuckDuckGoBackend {
    client: Client,
    endpoint: String,
    timeout: Duration,
    user_agents: Arc<UserAgentPool>,
}

impl DuckDuckGoBackend {
    pub fn new(
        client: Client,
        endpoint: String,
        timeout: Duration,
        user_agents: Arc<UserAgentPool>,
    ) -> Self {
        Self {
            client,
            endpoint,
            timeout,
            user_agents,
        }
    }

    fn date_filter(range: TimeRange) -> &'static str {
        match range {
            TimeRange::Day => "d",
            TimeRange::Week => "w",
            TimeRange::Month => "m",
            TimeRange::Year => "y",
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn query(&self, request: &SearchRequest) -> Result<Vec<RawRecord>, BackendError> {
        if request.search_type() != SearchType::Web {
            debug!(
                "DuckDuckGo HTML has no {} vertical, using web results",
                request.search_type().as_str()
            );
        }

        let mut params: Vec<(&str, &str)> = vec![("q", request.query()), ("kl", "us-en")];
        if let Some(range) = request.time_range() {
            params.push(("df", Self::date_filter(range)));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .header(USER_AGENT, self.user_agents.next())
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        // DuckDuckGo answers suspected bots with a 202 challenge page
        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Err(BackendError::RateLimited(
                "DuckDuckGo served a bot challenge (HTTP 202)".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &body));
        }

        let html = response.text().await.map_err(BackendError::from_reqwest)?;
        let records = parse_results(&html, self.name())?;
        info!("DuckDuckGo returned {} results", records.len());
        Ok(records)
    }
}

/// Parse a DuckDuckGo HTML results page into raw records
pub(crate) fn parse_results(html: &str, source: &str) -> Result<Vec<RawRecord>, BackendError> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel), Ok(container_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
        Selector::parse("#links, .results, .no-results"),
    ) else {
        return Err(BackendError::MalformedResponse(
            "invalid result selectors".to_string(),
        ));
    };

    let mut records = Vec::new();
    for result in document.select(&result_sel) {
        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        records.push(RawRecord::from_json(
            source,
            json!({
                "title": element_text(link),
                "url": decode_redirect(href),
                "snippet": snippet,
            }),
        ));
    }

    if records.is_empty() && document.select(&container_sel).next().is_none() {
        return Err(BackendError::MalformedResponse(
            "unrecognized DuckDuckGo results page".to_string(),
        ));
    }
    Ok(records)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unwrap `//duckduckgo.com/l/?uddg=<encoded>` redirect links
pub(crate) fn decode_redirect(href: &str) -> String {
    if let Some(start) = href.find("uddg=") {
        let encoded = href[start + "uddg=".len()..]
            .split('&')
            .next()
            .unwrap_or_default();
        if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
            return decoded.into_owned();
        }
    }
    if href.starts_with("//") {
        return format!("https:{}", href);
    }
    href.to_string()
}
