//! Query orchestration for Veritas.
//!
//! This crate ties pricing, payment and generation together for one user
//! query:
//!
//! 1. Optionally search the web for context ([`search`])
//! 2. Assemble the prompt for the chosen [`Mode`] ([`prompt`])
//! 3. Price the prompt and charge the user ([`veritas_econ`], [`veritas_pay`])
//! 4. Call the language model ([`llm`])
//! 5. Resolve citation markers and report usage
//!
//! The [`QueryOrchestrator`] enforces the ordering: the model is never called
//! unless the charge-and-burn completed.
//!
//! # Backends
//!
//! Both external services sit behind object-safe traits so tests and
//! alternative providers can be swapped in:
//!
//! - [`LanguageModel`]: [`OpenAiClient`] for OpenAI-compatible chat APIs
//! - [`WebSearch`]: [`DuckDuckGoSearch`] scraping the HTML endpoint

pub mod config;
pub mod error;
pub mod llm;
pub mod mode;
pub mod orchestrator;
pub mod prompt;
pub mod search;

pub use config::{LlmConfig, SearchConfig};
pub use error::{OpsError, OpsResult, UpstreamError};
pub use llm::{Completion, CompletionRequest, LanguageModel, OpenAiClient};
pub use mode::Mode;
pub use orchestrator::{
    QueryFailure, QueryOrchestrator, QueryOutcome, QueryRequest, QueryStage, Usage,
    EMPTY_RESPONSE_TEXT,
};
pub use prompt::{assemble_prompt, extract_citations, search_context, Citation};
pub use search::{parse_results, DuckDuckGoSearch, SearchResult, WebSearch};
