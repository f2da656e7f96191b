//! Extraction fan-out for one response.
//!
//! Pages are fetched with bounded parallelism and written back at their
//! original index, so completion order never reorders results. Work still in
//! flight when the deadline passes is dropped and its results are marked
//! `deadline_exceeded`.

use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::error::ExtractionErrorKind;
use crate::extractor::ContentExtractor;
use crate::types::{ExtractionMode, ExtractionNote, SearchResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// Results not enriched because the deadline passed first
    pub degraded: usize,
}

impl EnrichmentOutcome {
    pub fn partial(&self) -> bool {
        self.degraded > 0
    }
}

pub async fn enrich_results(
    extractor: &ContentExtractor,
    results: &mut [SearchResult],
    mode: ExtractionMode,
    concurrency: usize,
    deadline: Instant,
) -> EnrichmentOutcome {
    let mut outcome = EnrichmentOutcome::default();
    if results.is_empty() {
        return outcome;
    }

    let jobs: Vec<(usize, String)> = results
        .iter()
        .enumerate()
        .map(|(index, result)| (index, result.url.clone()))
        .collect();
    let mut pending: BTreeSet<usize> = (0..results.len()).collect();
    let width = concurrency.clamp(1, results.len());

    let mut pages = stream::iter(jobs)
        .map(move |(index, url)| async move { (index, extractor.extract(&url, mode).await) })
        .buffer_unordered(width);

    loop {
        match timeout_at(deadline, pages.next()).await {
            Ok(Some((index, extracted))) => {
                pending.remove(&index);
                let result = &mut results[index];
                match extracted {
                    Ok(content) => {
                        result.extracted_content = Some(content);
                        outcome.succeeded += 1;
                    }
                    Err(e) => {
                        warn!("Extraction failed for {}: {}", result.url, e);
                        result.extraction_error = Some(ExtractionNote {
                            kind: ExtractionErrorKind::from(&e),
                            message: e.to_string(),
                        });
                        outcome.failed += 1;
                    }
                }
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "Request deadline reached with {} extractions unfinished",
                    pending.len()
                );
                break;
            }
        }
    }
    // Cancels in-flight fetches
    drop(pages);

    for index in pending {
        results[index].extraction_error = Some(ExtractionNote {
            kind: ExtractionErrorKind::DeadlineExceeded,
            message: "request deadline passed before the page was extracted".to_string(),
        });
        outcome.degraded += 1;
    }

    info!(
        "Extraction finished: {} succeeded, {} failed, {} degraded",
        outcome.succeeded, outcome.failed, outcome.degraded
    );
    outcome
}
