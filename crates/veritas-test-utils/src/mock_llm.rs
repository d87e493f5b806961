//! Mock implementation of the `LanguageModel` trait for testing.
//!
//! Replies with a configurable answer and records every request it sees.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use veritas_ops::{Completion, CompletionRequest, LanguageModel, UpstreamError};

struct MockLanguageModelInner {
    /// Reply used when the queue is empty.
    default_reply: Completion,
    /// Replies consumed one per call, before the default.
    queued: VecDeque<Result<Completion, UpstreamError>>,
    /// When set, every call fails with this error.
    failure: Option<UpstreamError>,
    /// Every request received, in order.
    requests: Vec<CompletionRequest>,
}

/// A mock language model.
///
/// Uses `Arc<RwLock<...>>` internally, so it is cheap to clone and all
/// clones share the same state.
#[derive(Clone)]
pub struct MockLanguageModel {
    inner: Arc<RwLock<MockLanguageModelInner>>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLanguageModel {
    /// Create a model that answers "Mock answer." with no usage report.
    pub fn new() -> Self {
        Self::replying("Mock answer.")
    }

    /// Create a model that always answers `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLanguageModelInner {
                default_reply: Completion {
                    text: text.into(),
                    completion_units: None,
                },
                queued: VecDeque::new(),
                failure: None,
                requests: Vec::new(),
            })),
        }
    }

    /// Report `units` completion units with every default reply.
    pub fn with_completion_units(self, units: u64) -> Self {
        self.inner.write().unwrap().default_reply.completion_units = Some(units);
        self
    }

    /// Configure the mock to fail every call.
    pub fn with_failure(self, error: UpstreamError) -> Self {
        self.set_failure(Some(error));
        self
    }

    /// Set or clear the failure mode at runtime.
    pub fn set_failure(&self, error: Option<UpstreamError>) {
        self.inner.write().unwrap().failure = error;
    }

    /// Queue a one-off result for the next call.
    pub fn push_result(&self, result: Result<Completion, UpstreamError>) {
        self.inner.write().unwrap().queued.push_back(result);
    }

    // =========================================================================
    // Assertion Helpers
    // =========================================================================

    /// Number of completion calls made.
    pub fn call_count(&self) -> usize {
        self.inner.read().unwrap().requests.len()
    }

    /// All requests received.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.read().unwrap().requests.clone()
    }

    /// Prompt of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .requests
            .last()
            .map(|r| r.prompt.clone())
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError> {
        let mut inner = self.inner.write().unwrap();
        inner.requests.push(request.clone());
        if let Some(error) = &inner.failure {
            return Err(error.clone());
        }
        match inner.queued.pop_front() {
            Some(result) => result,
            None => Ok(inner.default_reply.clone()),
        }
    }
}
