//! Payment verifier for user-signed transfers.
//!
//! Scans the fee collector's most recent transactions for a transfer from
//! the user's token account of at least the expected amount. This is a
//! heuristic: any qualifying transfer in the window counts, including one
//! made for another purpose. A signature that verified once is remembered
//! and never verifies again.
//!
//! Delegate charges made by the executor land in the same account from the
//! same source. When the verifier shares the executor's [`ChargeBook`],
//! signatures the book recorded as charge transfers are skipped. A charge
//! whose transfer confirmed but is not yet recorded can still slip through.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use veritas_settle::{Ledger, RetryPolicy};
use veritas_types::constants::{DEFAULT_VERIFY_WINDOW, MAX_SEEN_SIGNATURES};
use veritas_types::{Address, RawAmount, TxSignature};

use crate::book::ChargeBook;
use crate::error::{PayError, PayResult};
use crate::types::Verification;

#[derive(Default)]
struct SeenSignatures {
    set: HashSet<TxSignature>,
    /// Oldest first, for eviction
    order: VecDeque<TxSignature>,
}

impl SeenSignatures {
    /// Returns false if the signature was already present.
    fn insert(&mut self, signature: TxSignature) -> bool {
        if !self.set.insert(signature) {
            return false;
        }
        self.order.push_back(signature);
        while self.order.len() > MAX_SEEN_SIGNATURES {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

/// Verifies that a user paid the fee collector.
#[derive(Clone)]
pub struct PaymentVerifier {
    ledger: Arc<dyn Ledger>,
    policy: RetryPolicy,
    window: usize,
    seen: Arc<RwLock<SeenSignatures>>,
    book: Option<ChargeBook>,
}

impl PaymentVerifier {
    /// Create a verifier scanning the default window.
    pub fn new(ledger: Arc<dyn Ledger>, policy: RetryPolicy) -> Self {
        Self::with_window(ledger, policy, DEFAULT_VERIFY_WINDOW)
    }

    /// Create a verifier scanning the `window` most recent signatures.
    pub fn with_window(ledger: Arc<dyn Ledger>, policy: RetryPolicy, window: usize) -> Self {
        Self {
            ledger,
            policy,
            window: window.max(1),
            seen: Arc::new(RwLock::new(SeenSignatures::default())),
            book: None,
        }
    }

    /// Never count the executor's own delegate transfers, as recorded in `book`.
    pub fn with_book(mut self, book: ChargeBook) -> Self {
        self.book = Some(book);
        self
    }

    /// Number of recent signatures scanned.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Look for a transfer of at least `expected_raw` from `user` to the fee collector.
    pub async fn verify_payment(
        &self,
        user: &Address,
        expected_raw: RawAmount,
    ) -> PayResult<Verification> {
        if expected_raw == 0 {
            return Err(PayError::invalid_input("expected amount must be positive"));
        }

        let ledger = self.ledger.as_ref();
        let fee_account = ledger.token_account(&ledger.fee_collector());
        let user_account = ledger.token_account(user);
        let signatures = self
            .policy
            .execute(|| ledger.recent_signatures(&fee_account, self.window))
            .await?;
        debug!(user = %user, scanned = signatures.len(), "Scanning fee account history");

        for signature in signatures {
            if self.seen.read().await.set.contains(&signature) {
                continue;
            }
            if let Some(book) = &self.book {
                if book.has_transfer_signature(&signature).await {
                    debug!(signature = %signature, "Skipping delegate charge transfer");
                    continue;
                }
            }
            let transfers = self
                .policy
                .execute(|| ledger.token_transfers(&signature))
                .await?;
            let matched = transfers.iter().find(|t| {
                t.destination == fee_account && t.source == user_account && t.amount >= expected_raw
            });
            if let Some(transfer) = matched {
                if !self.seen.write().await.insert(signature) {
                    continue;
                }
                info!(user = %user, signature = %signature, amount = transfer.amount, "Payment verified");
                return Ok(Verification::Verified {
                    signature,
                    amount: transfer.amount,
                });
            }
        }

        debug!(user = %user, expected = expected_raw, "No matching payment in window");
        Ok(Verification::NotFound)
    }
}
