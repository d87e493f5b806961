//! Charge-and-burn executor.
//!
//! Moves the full charge from the user to the fee collector under the
//! backend delegate's allowance, then burns 1% of it out of the fee
//! collector's account. The two ledger writes are not atomic together; a
//! confirmed transfer followed by a failed burn is reported as a partial
//! charge and recorded for `retry_burn`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use veritas_settle::{Ledger, LedgerError, MintCache, RetryPolicy};
use veritas_types::{ChargeId, ChargeRequest, RawAmount};

use crate::book::{ChargeBook, ChargeRecord};
use crate::error::{PayError, PayResult};
use crate::types::ChargeReceipt;

/// Executes delegate charges and burns, one charge id at a time.
#[derive(Clone)]
pub struct ChargeExecutor {
    ledger: Arc<dyn Ledger>,
    policy: RetryPolicy,
    mint_cache: MintCache,
    book: ChargeBook,
}

impl ChargeExecutor {
    /// Create an executor over a ledger and a charge book.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        policy: RetryPolicy,
        mint_cache: MintCache,
        book: ChargeBook,
    ) -> Self {
        Self {
            ledger,
            policy,
            mint_cache,
            book,
        }
    }

    /// The charge book this executor records into.
    pub fn book(&self) -> &ChargeBook {
        &self.book
    }

    /// Mint decimals, fetched once and cached.
    pub async fn decimals(&self) -> PayResult<u8> {
        Ok(self
            .mint_cache
            .decimals(self.ledger.as_ref(), &self.policy)
            .await?)
    }

    /// Charge `request.amount` from the payer and burn 1% of it.
    ///
    /// Succeeds only when the transfer and the burn both confirm. A charge id
    /// already in the book is rejected before the ledger is touched.
    pub async fn charge_and_burn(&self, request: &ChargeRequest) -> PayResult<ChargeReceipt> {
        if request.amount == 0 {
            return Err(PayError::invalid_input("charge amount must be positive"));
        }
        let charge_id = request.charge_id;
        let split = request.split();
        self.book.begin(request).await?;

        let decimals = match self
            .mint_cache
            .decimals(self.ledger.as_ref(), &self.policy)
            .await
        {
            Ok(d) => d,
            Err(e) => return Err(self.fail(&charge_id, e.into()).await),
        };

        if let Err(e) = self.check_allowance(request).await {
            return Err(self.fail(&charge_id, e).await);
        }

        let ledger = self.ledger.as_ref();
        let transfer = self
            .policy
            .execute_submit(|| ledger.delegate_transfer(&request.payer, request.amount, decimals))
            .await;
        let transfer_signature = match transfer {
            Ok(sig) => sig,
            Err(LedgerError::Timeout(reason)) => {
                error!(
                    charge_id = %charge_id,
                    payer = %request.payer,
                    amount = request.amount,
                    reason = %reason,
                    "Transfer outcome unknown; needs reconciliation"
                );
                self.book
                    .mark_transfer_unconfirmed(&charge_id, reason.clone())
                    .await?;
                return Err(PayError::NetworkTransient(reason));
            }
            Err(LedgerError::InsufficientAllowance { need }) => {
                // Lost a race with a concurrent charge on the same allowance.
                let remaining = self.remaining_allowance(request).await;
                let err = PayError::InsufficientAllowance {
                    required: need,
                    remaining,
                };
                return Err(self.fail(&charge_id, err).await);
            }
            Err(e) => return Err(self.fail(&charge_id, e.into()).await),
        };
        self.book
            .mark_transferred(&charge_id, transfer_signature)
            .await?;
        debug!(charge_id = %charge_id, signature = %transfer_signature, "Transfer confirmed");

        if !split.has_burn() {
            self.book.mark_completed(&charge_id, None).await?;
            info!(charge_id = %charge_id, amount = request.amount, "Charge completed, nothing to burn");
            return Ok(ChargeReceipt {
                charge_id,
                payer: request.payer,
                amount: request.amount,
                split,
                transfer_signature,
                burn_signature: None,
                decimals,
            });
        }

        let burn = self
            .policy
            .execute_submit(|| ledger.burn_collected(split.burned, decimals))
            .await;
        match burn {
            Ok(burn_signature) => {
                self.book
                    .mark_completed(&charge_id, Some(burn_signature))
                    .await?;
                info!(
                    charge_id = %charge_id,
                    payer = %request.payer,
                    amount = request.amount,
                    burned = split.burned,
                    "Charge and burn completed"
                );
                Ok(ChargeReceipt {
                    charge_id,
                    payer: request.payer,
                    amount: request.amount,
                    split,
                    transfer_signature,
                    burn_signature: Some(burn_signature),
                    decimals,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    charge_id = %charge_id,
                    transfer = %transfer_signature,
                    burn_amount = split.burned,
                    error = %reason,
                    "Burn failed after transfer"
                );
                self.book.mark_burn_pending(&charge_id, reason.clone()).await?;
                Err(PayError::PartialChargeFailure {
                    charge_id,
                    transfer_signature,
                    burn_amount: split.burned,
                    reason,
                })
            }
        }
    }

    /// Retry the burn of a partially failed charge. Never re-sends the transfer.
    ///
    /// The record is claimed in the book before anything is submitted, so
    /// concurrent retries of one charge burn at most once; the losers get
    /// `InvalidTransition`.
    pub async fn retry_burn(&self, charge_id: &ChargeId) -> PayResult<ChargeRecord> {
        let record = self.book.claim_burn_retry(charge_id).await?;
        let burned = record.split.burned;
        let Some(transfer_signature) = record.transfer_signature else {
            self.book
                .mark_burn_pending(charge_id, "no confirmed transfer on record")
                .await?;
            return Err(PayError::invalid_input("charge has no confirmed transfer"));
        };

        let ledger = self.ledger.as_ref();
        let result = match self.mint_cache.decimals(ledger, &self.policy).await {
            Ok(decimals) => {
                self.policy
                    .execute_submit(|| ledger.burn_collected(burned, decimals))
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(sig) => {
                info!(charge_id = %charge_id, burned, signature = %sig, "Pending burn completed");
                self.book.mark_completed(charge_id, Some(sig)).await
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(charge_id = %charge_id, error = %reason, "Burn retry failed");
                self.book.mark_burn_pending(charge_id, reason.clone()).await?;
                Err(PayError::PartialChargeFailure {
                    charge_id: *charge_id,
                    transfer_signature,
                    burn_amount: burned,
                    reason,
                })
            }
        }
    }

    /// Flag a completed charge whose answer was never delivered.
    ///
    /// Only a `Completed` record can be flagged; a charge with a pending
    /// burn keeps its state so the burn can still be retried.
    pub async fn mark_generation_failed(
        &self,
        charge_id: &ChargeId,
        reason: impl Into<String>,
    ) -> PayResult<ChargeRecord> {
        let reason = reason.into();
        error!(charge_id = %charge_id, reason = %reason, "Generation failed after charge; needs reconciliation");
        self.book.mark_generation_failed(charge_id, reason).await
    }

    async fn check_allowance(&self, request: &ChargeRequest) -> PayResult<()> {
        let ledger = self.ledger.as_ref();
        let delegate = ledger.delegate();
        let allowance = self
            .policy
            .execute(|| ledger.delegation(&request.payer))
            .await?;
        match allowance {
            Some(a) if a.covers(&delegate, request.amount) => Ok(()),
            Some(a) if a.delegate == delegate => Err(PayError::InsufficientAllowance {
                required: request.amount,
                remaining: Some(a.remaining),
            }),
            _ => Err(PayError::InsufficientAllowance {
                required: request.amount,
                remaining: None,
            }),
        }
    }

    async fn remaining_allowance(&self, request: &ChargeRequest) -> Option<RawAmount> {
        let ledger = self.ledger.as_ref();
        let delegate = ledger.delegate();
        self.policy
            .execute(|| ledger.delegation(&request.payer))
            .await
            .ok()
            .flatten()
            .filter(|a| a.delegate == delegate)
            .map(|a| a.remaining)
    }

    /// Record a failure where nothing moved and hand the error back.
    async fn fail(&self, charge_id: &ChargeId, err: PayError) -> PayError {
        debug!(charge_id = %charge_id, error = %err, "Charge rejected");
        if let Err(e) = self.book.mark_failed(charge_id, err.to_string()).await {
            warn!(charge_id = %charge_id, error = %e, "Could not record failed charge");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::ChargeStatus;
    use std::time::Duration;
    use veritas_settle::{MockLedger, MockOp};
    use veritas_types::Address;

    fn executor(ledger: &MockLedger) -> ChargeExecutor {
        ChargeExecutor::new(
            Arc::new(ledger.clone()),
            RetryPolicy::new(
                2,
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_secs(5),
            ),
            MintCache::new(),
            ChargeBook::new(),
        )
    }

    fn funded(ledger: &MockLedger, balance: RawAmount, allowance: RawAmount) -> Address {
        let user = Address::random();
        ledger.fund(&user, balance);
        ledger.approve(&user, &ledger.delegate(), allowance);
        user
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let ledger = MockLedger::random(2);
        let err = executor(&ledger)
            .charge_and_burn(&ChargeRequest::new(Address::random(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_no_delegation() {
        let ledger = MockLedger::random(2);
        let user = Address::random();
        ledger.fund(&user, 10_000);
        let exec = executor(&ledger);
        let req = ChargeRequest::new(user, 100);

        let err = exec.charge_and_burn(&req).await.unwrap_err();
        assert_eq!(
            err,
            PayError::InsufficientAllowance {
                required: 100,
                remaining: None
            }
        );
        assert_eq!(ledger.calls(MockOp::DelegateTransfer), 0);
        let record = exec.book().get(&req.charge_id).await.unwrap();
        assert_eq!(record.status, ChargeStatus::Failed);
    }

    #[tokio::test]
    async fn test_small_charge_skips_burn() {
        let ledger = MockLedger::random(2);
        let user = funded(&ledger, 1_000, 1_000);
        let receipt = executor(&ledger)
            .charge_and_burn(&ChargeRequest::new(user, 99))
            .await
            .unwrap();
        assert_eq!(receipt.burn_signature, None);
        assert_eq!(ledger.calls(MockOp::Burn), 0);
        assert_eq!(ledger.balance_of(&ledger.fee_collector()), 99);
    }

    #[tokio::test]
    async fn test_transfer_timeout_not_resubmitted() {
        let ledger = MockLedger::random(2);
        let user = funded(&ledger, 10_000, 10_000);
        ledger.inject_failure_after_commit(MockOp::DelegateTransfer, LedgerError::timeout("slow"));
        let exec = executor(&ledger);
        let req = ChargeRequest::new(user, 6_600);

        let err = exec.charge_and_burn(&req).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.calls(MockOp::DelegateTransfer), 1);
        assert_eq!(ledger.balance_of(&user), 3_400);

        let pending = exec.book().needs_reconciliation().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, ChargeStatus::TransferUnconfirmed);
    }

    #[tokio::test]
    async fn test_transfer_network_error_resubmitted_once() {
        let ledger = MockLedger::random(2);
        let user = funded(&ledger, 10_000, 10_000);
        ledger.inject_failure(MockOp::DelegateTransfer, LedgerError::network("refused"));

        let receipt = executor(&ledger)
            .charge_and_burn(&ChargeRequest::new(user, 6_600))
            .await
            .unwrap();
        assert_eq!(receipt.amount, 6_600);
        assert_eq!(ledger.calls(MockOp::DelegateTransfer), 2);
        assert_eq!(ledger.delegate_transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_burn_requires_burn_pending() {
        let ledger = MockLedger::random(2);
        let user = funded(&ledger, 10_000, 10_000);
        let exec = executor(&ledger);
        let req = ChargeRequest::new(user, 6_600);
        exec.charge_and_burn(&req).await.unwrap();

        let err = exec.retry_burn(&req.charge_id).await.unwrap_err();
        assert!(matches!(
            err,
            PayError::InvalidTransition {
                from: ChargeStatus::Completed,
                to: ChargeStatus::BurnRetrying,
                ..
            }
        ));
        assert_eq!(ledger.burns().len(), 1);

        let unknown = ChargeId::generate();
        assert_eq!(
            exec.retry_burn(&unknown).await.unwrap_err(),
            PayError::ChargeNotFound(unknown)
        );
    }

    #[tokio::test]
    async fn test_decimals_failure_records_failed() {
        let ledger = MockLedger::random(2);
        let user = funded(&ledger, 10_000, 10_000);
        ledger.inject_failure(MockOp::MintInfo, LedgerError::rpc("mint gone"));
        let exec = executor(&ledger);
        let req = ChargeRequest::new(user, 100);

        let err = exec.charge_and_burn(&req).await.unwrap_err();
        assert_eq!(err.reason_code(), "ledger_error");
        assert_eq!(
            exec.book().get(&req.charge_id).await.unwrap().status,
            ChargeStatus::Failed
        );
    }
}
