//! Query orchestration.
//!
//! A query walks through a fixed sequence of stages:
//!
//! ```text
//! Idle → SearchingWeb → Pricing → Charging → Generating → Formatting → Done
//! ```
//!
//! Search is optional and best effort. Charging is the gate: if it fails the
//! model is never called. A generation failure after a successful charge is
//! reported with the charge attached and flagged for reconciliation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use veritas_econ::PriceEstimator;
use veritas_pay::{ChargeExecutor, ChargeReceipt};
use veritas_types::constants::MAX_SEARCH_RESULTS;
use veritas_types::{Address, ChargeId, ChargeRequest, RawAmount};

use crate::error::OpsError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::mode::Mode;
use crate::prompt::{assemble_prompt, extract_citations, Citation};
use crate::search::{SearchResult, WebSearch};

/// Text returned when the model answers with nothing.
pub const EMPTY_RESPONSE_TEXT: &str = "No response generated.";

/// Where a query is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Idle,
    SearchingWeb,
    Pricing,
    Charging,
    Generating,
    Formatting,
    Done,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStage::Idle => "idle",
            QueryStage::SearchingWeb => "searching_web",
            QueryStage::Pricing => "pricing",
            QueryStage::Charging => "charging",
            QueryStage::Generating => "generating",
            QueryStage::Formatting => "formatting",
            QueryStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A query that stopped before `Done`.
#[derive(Debug, Clone, Error)]
#[error("query failed while {stage}: {error}")]
pub struct QueryFailure {
    /// Stage that failed
    pub stage: QueryStage,
    /// Cause
    #[source]
    pub error: OpsError,
}

impl QueryFailure {
    fn at(stage: QueryStage, error: impl Into<OpsError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// One user query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// The user's statement or question
    pub input: String,
    /// Answer mode
    pub mode: Mode,
    /// Whether to enrich the prompt with web results
    pub search: bool,
    /// Wallet that pays for the query
    pub payer: Address,
    /// Idempotency key; generated when absent
    pub charge_id: Option<ChargeId>,
}

impl QueryRequest {
    /// A truth-mode query without search.
    pub fn new(input: impl Into<String>, payer: Address) -> Self {
        Self {
            input: input.into(),
            mode: Mode::default(),
            search: false,
            payer,
            charge_id: None,
        }
    }

    /// Set the mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable web search.
    pub fn with_search(mut self, search: bool) -> Self {
        self.search = search;
        self
    }

    /// Use a caller-chosen charge id.
    pub fn with_charge_id(mut self, charge_id: ChargeId) -> Self {
        self.charge_id = Some(charge_id);
        self
    }
}

/// Billing breakdown of an answered query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Model that answered
    pub model: String,
    /// Estimated prompt units
    pub prompt_units: u64,
    /// Completion units reported by the model, or the budget
    pub completion_units: u64,
    /// USD charged, six decimals
    pub usd_charged: String,
    /// Whole application tokens charged
    pub tokens_charged: u64,
    /// Raw amount moved from the payer
    pub raw_amount: RawAmount,
    /// Raw amount burned
    pub burned_raw: RawAmount,
    /// Mint decimals of the raw amounts
    pub decimals: u8,
    /// Charge id
    pub charge_id: ChargeId,
}

/// An answered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Model answer
    pub result: String,
    /// Mode used
    pub mode: Mode,
    /// Web results given to the model
    pub sources: Vec<SearchResult>,
    /// Markers in the answer resolved against `sources`
    pub citations: Vec<Citation>,
    /// Billing breakdown
    pub usage: Usage,
    /// Charge that paid for the answer
    pub receipt: ChargeReceipt,
}

/// Runs queries end to end.
#[derive(Clone)]
pub struct QueryOrchestrator {
    estimator: PriceEstimator,
    executor: ChargeExecutor,
    llm: Arc<dyn LanguageModel>,
    search: Option<Arc<dyn WebSearch>>,
    model: String,
    temperature: f32,
    max_results: usize,
}

impl QueryOrchestrator {
    /// Create an orchestrator using the price table's default model and no search.
    pub fn new(
        estimator: PriceEstimator,
        executor: ChargeExecutor,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let model = estimator.table().default_model().to_string();
        Self {
            estimator,
            executor,
            llm,
            search: None,
            model,
            temperature: 0.3,
            max_results: MAX_SEARCH_RESULTS,
        }
    }

    /// Attach a search backend.
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Use a specific model id for pricing and generation.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the number of web results, never above the global maximum.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.min(MAX_SEARCH_RESULTS);
        self
    }

    /// The charge executor, for reconciliation.
    pub fn executor(&self) -> &ChargeExecutor {
        &self.executor
    }

    /// The price estimator.
    pub fn estimator(&self) -> &PriceEstimator {
        &self.estimator
    }

    /// Model id in use.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer one query, charging the payer before the model is called.
    pub async fn run(&self, request: QueryRequest) -> Result<QueryOutcome, QueryFailure> {
        let input = request.input.trim();
        if input.is_empty() {
            return Err(QueryFailure::at(
                QueryStage::Idle,
                OpsError::invalid_input("input must not be empty"),
            ));
        }

        let sources = if request.search {
            debug!(stage = %QueryStage::SearchingWeb, "Query stage");
            self.search_web(input).await
        } else {
            Vec::new()
        };

        debug!(stage = %QueryStage::Pricing, "Query stage");
        let prompt = assemble_prompt(request.mode, &sources, input);
        let estimate = self
            .estimator
            .estimate(&prompt, &self.model)
            .map_err(|e| QueryFailure::at(QueryStage::Pricing, e))?;
        let decimals = self
            .executor
            .decimals()
            .await
            .map_err(|e| QueryFailure::at(QueryStage::Pricing, e))?;
        let raw_amount = estimate
            .raw_amount(decimals)
            .map_err(|e| QueryFailure::at(QueryStage::Pricing, e))?;

        debug!(stage = %QueryStage::Charging, raw_amount, "Query stage");
        let charge = ChargeRequest::with_id(
            request.charge_id.unwrap_or_else(ChargeId::generate),
            request.payer,
            raw_amount,
        );
        let receipt = self
            .executor
            .charge_and_burn(&charge)
            .await
            .map_err(|e| QueryFailure::at(QueryStage::Charging, e))?;

        debug!(stage = %QueryStage::Generating, charge_id = %receipt.charge_id, "Query stage");
        let completion = match self
            .llm
            .complete(&CompletionRequest {
                model: self.model.clone(),
                prompt,
                max_tokens: self.estimator.config().completion_budget,
                temperature: self.temperature,
            })
            .await
        {
            Ok(c) => c,
            Err(e) => {
                let reason = e.to_string();
                if let Err(book_err) = self
                    .executor
                    .mark_generation_failed(&receipt.charge_id, reason.clone())
                    .await
                {
                    error!(charge_id = %receipt.charge_id, error = %book_err, "Could not flag charge for reconciliation");
                }
                return Err(QueryFailure::at(
                    QueryStage::Generating,
                    OpsError::UpstreamGenerationFailure {
                        charge: Box::new(receipt),
                        reason,
                    },
                ));
            }
        };

        debug!(stage = %QueryStage::Formatting, "Query stage");
        let result = if completion.text.is_empty() {
            EMPTY_RESPONSE_TEXT.to_string()
        } else {
            completion.text
        };
        let citations = extract_citations(&result, &sources);
        let usage = Usage {
            model: estimate.model.clone(),
            prompt_units: estimate.prompt_units,
            completion_units: completion
                .completion_units
                .unwrap_or(estimate.completion_units),
            usd_charged: estimate.usd_charged(),
            tokens_charged: estimate.tokens,
            raw_amount: receipt.amount,
            burned_raw: receipt.split.burned,
            decimals: receipt.decimals,
            charge_id: receipt.charge_id,
        };

        info!(
            charge_id = %receipt.charge_id,
            mode = %request.mode,
            tokens = usage.tokens_charged,
            burned = usage.burned_raw,
            sources = sources.len(),
            "Query answered"
        );
        Ok(QueryOutcome {
            result,
            mode: request.mode,
            sources,
            citations,
            usage,
            receipt,
        })
    }

    async fn search_web(&self, input: &str) -> Vec<SearchResult> {
        let Some(search) = &self.search else {
            debug!("Search requested but no backend configured");
            return Vec::new();
        };
        match search.search(input, self.max_results).await {
            Ok(mut results) => {
                results.truncate(self.max_results);
                results
            }
            Err(e) => {
                warn!(error = %e, "Web search failed, continuing without context");
                Vec::new()
            }
        }
    }
}
