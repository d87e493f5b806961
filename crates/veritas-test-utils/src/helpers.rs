//! Helper functions for creating test fixtures.
//!
//! Provides a fast retry policy, funded users and a fully wired
//! `QueryOrchestrator` over `MockLedger`.

use std::sync::Arc;
use std::time::Duration;

use veritas_econ::{count_prompt_units, PriceEstimator};
use veritas_ops::{assemble_prompt, LanguageModel, Mode, QueryOrchestrator};
use veritas_pay::{ChargeBook, ChargeExecutor, PaymentRequester, PaymentVerifier};
use veritas_settle::{Ledger, MintCache, MockLedger, RetryPolicy};
use veritas_types::Address;

use crate::{MockLanguageModel, MockSearch};

/// A retry policy with millisecond backoff so tests stay fast.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(
        2,
        Duration::from_millis(1),
        Duration::from_millis(2),
        Duration::from_secs(5),
    )
}

/// Create a user holding `balance` raw units with `allowance` delegated to
/// the ledger's backend delegate.
pub fn funded_user(ledger: &MockLedger, balance: u64, allowance: u64) -> Address {
    let user = Address::random();
    ledger.fund(&user, balance);
    if allowance > 0 {
        ledger.approve(&user, &ledger.delegate(), allowance);
    }
    user
}

/// Query input whose `mode` prompt, with no search results, is exactly
/// `units` prompt units for `model`.
///
/// Built from single-letter words, each of which is one BPE token.
pub fn input_for_prompt_units(mode: Mode, model: &str, units: u64) -> String {
    let mut words = vec!["a"];
    while count_prompt_units(&assemble_prompt(mode, &[], &words.join(" ")), model) < units {
        words.push("a");
    }
    words.join(" ")
}

/// Everything a query test needs, sharing one mock ledger.
pub struct TestHarness {
    /// The ledger all components talk to
    pub ledger: MockLedger,
    /// Model the orchestrator calls
    pub llm: MockLanguageModel,
    /// Search backend the orchestrator calls
    pub search: MockSearch,
    /// Builds unsigned transactions
    pub requester: PaymentRequester,
    /// Verifies user-signed payments
    pub verifier: PaymentVerifier,
    /// Runs queries
    pub orchestrator: QueryOrchestrator,
}

impl TestHarness {
    /// A harness over a fresh ledger with `decimals`, the default price
    /// table, a model answering "Mock answer." and an empty search backend.
    pub fn new(decimals: u8) -> Self {
        Self::with_backends(decimals, MockLanguageModel::new(), MockSearch::empty())
    }

    /// A harness with caller-provided backends.
    pub fn with_backends(decimals: u8, llm: MockLanguageModel, search: MockSearch) -> Self {
        let ledger = MockLedger::random(decimals);
        let shared: Arc<dyn Ledger> = Arc::new(ledger.clone());
        let cache = MintCache::new();
        let book = ChargeBook::new();
        let executor = ChargeExecutor::new(
            shared.clone(),
            fast_policy(),
            cache.clone(),
            book.clone(),
        );
        let model: Arc<dyn LanguageModel> = Arc::new(llm.clone());
        let orchestrator = QueryOrchestrator::new(PriceEstimator::default(), executor, model)
            .with_search(Arc::new(search.clone()));
        Self {
            requester: PaymentRequester::new(shared.clone(), fast_policy(), cache),
            verifier: PaymentVerifier::new(shared, fast_policy()).with_book(book),
            orchestrator,
            ledger,
            llm,
            search,
        }
    }

    /// A user with `balance` raw units, all of it delegated.
    pub fn user(&self, balance: u64) -> Address {
        funded_user(&self.ledger, balance, balance)
    }
}
