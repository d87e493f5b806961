//! Configuration for the query backends.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use veritas_types::constants::{DEFAULT_MODEL_ID, MAX_SEARCH_RESULTS};

/// Default OpenAI-compatible API base.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default DuckDuckGo HTML endpoint.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Language model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,
    /// Bearer token; usually `${OPENAI_API_KEY}` in the config file
    pub api_key: String,
    /// Model id, also used for pricing
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL_ID.to_string(),
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("llm.base_url must not be empty".into());
        }
        if self.model.trim().is_empty() {
            return Err("llm.model must not be empty".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.temperature
            ));
        }
        if self.timeout_secs == 0 {
            return Err("llm.timeout_secs must be positive".into());
        }
        Ok(())
    }
}

/// Web search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Whether queries may request web search at all
    pub enabled: bool,
    /// HTML search endpoint
    pub endpoint: String,
    /// Maximum results fed into the prompt
    pub max_results: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            max_results: MAX_SEARCH_RESULTS,
            timeout_secs: 10,
        }
    }
}

impl SearchConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.endpoint.trim().is_empty() {
            return Err("search.endpoint must not be empty".into());
        }
        if self.max_results == 0 || self.max_results > MAX_SEARCH_RESULTS {
            return Err(format!(
                "search.max_results must be between 1 and {}",
                MAX_SEARCH_RESULTS
            ));
        }
        if self.timeout_secs == 0 {
            return Err("search.timeout_secs must be positive".into());
        }
        Ok(())
    }
}
