//! Mock implementation of the `WebSearch` trait for testing.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use veritas_ops::{SearchResult, UpstreamError, WebSearch};

struct MockSearchInner {
    results: Vec<SearchResult>,
    failure: Option<UpstreamError>,
    queries: Vec<String>,
}

/// A mock search backend returning a fixed result list.
#[derive(Clone)]
pub struct MockSearch {
    inner: Arc<RwLock<MockSearchInner>>,
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::empty()
    }
}

impl MockSearch {
    /// A backend that finds nothing.
    pub fn empty() -> Self {
        Self::with_results(Vec::new())
    }

    /// A backend that always returns `results` (truncated to the limit).
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockSearchInner {
                results,
                failure: None,
                queries: Vec::new(),
            })),
        }
    }

    /// A backend with `n` numbered results pointing at example.org.
    pub fn numbered(n: usize) -> Self {
        Self::with_results((1..=n).map(sample_result).collect())
    }

    /// A backend whose every call fails.
    pub fn failing(error: UpstreamError) -> Self {
        let mock = Self::empty();
        mock.inner.write().unwrap().failure = Some(error);
        mock
    }

    /// Queries received, in order.
    pub fn queries(&self) -> Vec<String> {
        self.inner.read().unwrap().queries.clone()
    }
}

/// The `n`-th sample result.
pub fn sample_result(n: usize) -> SearchResult {
    SearchResult {
        title: format!("Source {}", n),
        url: format!("https://example.org/source/{}", n),
        snippet: format!("Snippet for source {}", n),
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, UpstreamError> {
        let mut inner = self.inner.write().unwrap();
        inner.queries.push(query.to_string());
        if let Some(error) = &inner.failure {
            return Err(error.clone());
        }
        Ok(inner.results.iter().take(limit).cloned().collect())
    }
}
