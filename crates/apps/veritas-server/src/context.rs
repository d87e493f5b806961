//! Application context shared by every request.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use veritas_econ::PriceEstimator;
use veritas_ops::{DuckDuckGoSearch, LanguageModel, OpenAiClient, QueryOrchestrator, WebSearch};
use veritas_pay::{ChargeBook, ChargeExecutor, PaymentRequester, PaymentVerifier, PaymentsConfig};
use veritas_settle::{Ledger, LedgerConfig, LedgerNetwork, MintCache, RetryPolicy};
use veritas_types::Address;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::metrics::{Metrics, SharedMetrics};

/// Everything a handler needs, built once at startup.
pub struct AppContext {
    /// Ledger all components share.
    pub ledger: Arc<dyn Ledger>,
    /// Builds unsigned transactions.
    pub requester: PaymentRequester,
    /// Verifies user-signed payments.
    pub verifier: PaymentVerifier,
    /// Runs queries.
    pub orchestrator: QueryOrchestrator,
    /// Payment defaults.
    pub payments: PaymentsConfig,
    /// Whether queries may request web search.
    pub search_enabled: bool,
    /// Prometheus metrics.
    pub metrics: SharedMetrics,
    /// Bearer token for operator routes; `None` disables them.
    pub admin_token: Option<String>,
    /// When the context was built.
    pub started_at: Instant,
}

/// Shared handle passed to the router.
pub type SharedContext = Arc<AppContext>;

impl AppContext {
    /// Build the context from configuration, connecting to the ledger and
    /// the model and search backends.
    pub fn build(config: &ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let ledger_config = fill_mock_addresses(&config.ledger);
        let ledger = veritas_settle::connect(&ledger_config)?;
        let policy = RetryPolicy::from_ledger_config(&ledger_config);

        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(&config.llm)?);
        let search: Option<Arc<dyn WebSearch>> = if config.search.enabled {
            Some(Arc::new(DuckDuckGoSearch::new(&config.search)?))
        } else {
            None
        };

        let ctx = Self::from_parts(
            ledger,
            policy,
            config.pricing.estimator()?,
            llm,
            search,
            config.payments.clone(),
        )
        .with_model(&config.llm.model, config.llm.temperature, config.search.max_results)
        .with_admin_token(config.server.admin_token.clone());

        ctx.metrics
            .server_info
            .with_label_values(&[env!("CARGO_PKG_VERSION"), ledger_config.network.as_str()])
            .set(1);
        info!(
            network = %ledger_config.network,
            mint = %ctx.ledger.mint(),
            fee_collector = %ctx.ledger.fee_collector(),
            model = %config.llm.model,
            search = config.search.enabled,
            admin_routes = ctx.admin_token.is_some(),
            "Application context ready"
        );
        Ok(ctx)
    }

    /// Assemble a context from already-built parts.
    pub fn from_parts(
        ledger: Arc<dyn Ledger>,
        policy: RetryPolicy,
        estimator: PriceEstimator,
        llm: Arc<dyn LanguageModel>,
        search: Option<Arc<dyn WebSearch>>,
        payments: PaymentsConfig,
    ) -> Self {
        let mint_cache = MintCache::new();
        let book = ChargeBook::new();
        let executor = ChargeExecutor::new(
            ledger.clone(),
            policy.clone(),
            mint_cache.clone(),
            book.clone(),
        );
        let search_enabled = search.is_some();
        let mut orchestrator = QueryOrchestrator::new(estimator, executor, llm);
        if let Some(search) = search {
            orchestrator = orchestrator.with_search(search);
        }
        Self {
            requester: PaymentRequester::new(ledger.clone(), policy.clone(), mint_cache),
            verifier: PaymentVerifier::with_window(ledger.clone(), policy, payments.verify_window)
                .with_book(book),
            orchestrator,
            payments,
            search_enabled,
            metrics: Arc::new(Metrics::new()),
            admin_token: None,
            started_at: Instant::now(),
            ledger,
        }
    }

    fn with_model(mut self, model: &str, temperature: f32, max_results: usize) -> Self {
        self.orchestrator = self
            .orchestrator
            .with_model(model)
            .with_temperature(temperature)
            .with_max_results(max_results);
        self
    }

    /// Enable the operator routes behind `token`.
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    /// Seconds since startup.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// The mock network needs no real accounts; invent any that are missing.
fn fill_mock_addresses(config: &LedgerConfig) -> LedgerConfig {
    let mut config = config.clone();
    if config.network != LedgerNetwork::Mock {
        return config;
    }
    if config.mint.trim().is_empty() {
        config.mint = Address::random().to_string();
        warn!(mint = %config.mint, "No mint configured for the mock ledger, using a random one");
    }
    if config.fee_wallet.trim().is_empty() {
        config.fee_wallet = Address::random().to_string();
        warn!(fee_wallet = %config.fee_wallet, "No fee wallet configured for the mock ledger, using a random one");
    }
    config
}
