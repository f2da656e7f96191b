//! Fixtures shared by transport-level tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{RawRecord, SearchBackend};
use crate::config::Config;
use crate::error::BackendError;
use crate::types::SearchRequest;
use crate::AppState;

/// Answers every query with one result titled after the query
#[derive(Default)]
pub struct FixedBackend {
    calls: AtomicUsize,
}

impl FixedBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn query(&self, request: &SearchRequest) -> Result<Vec<RawRecord>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RawRecord::from_json(
            "fixed",
            json!({"url": "https://example.com/", "title": request.query()}),
        )])
    }
}

pub fn fixed_state() -> (AppState, Arc<FixedBackend>) {
    let backend = Arc::new(FixedBackend::default());
    let state = AppState::with_backend(Config::default(), reqwest::Client::new(), backend.clone());
    (state, backend)
}
