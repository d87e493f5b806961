//! Charge book: the idempotency and audit record of every charge.
//!
//! Every charge id passes through the book before the ledger is touched. A
//! known id is rejected, so a charge id can move funds at most once. Records
//! that ended between the transfer and a clean finish are kept for
//! reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use veritas_types::{
    current_timestamp, Address, BurnSplit, ChargeId, ChargeRequest, RawAmount, Timestamp,
    TxSignature,
};

use crate::error::{PayError, PayResult};

/// Lifecycle of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// Recorded; nothing sent to the ledger yet.
    Pending,
    /// Transfer confirmed; burn not yet attempted.
    Transferred,
    /// Transfer submitted but its outcome is unknown.
    TransferUnconfirmed,
    /// Transfer and burn both confirmed.
    Completed,
    /// Rejected before any funds moved.
    Failed,
    /// Transfer confirmed; burn failed and must be retried.
    BurnPending,
    /// A burn retry has claimed the record and is in flight.
    BurnRetrying,
    /// Charge completed but the answer was never generated.
    GenerationFailed,
}

impl ChargeStatus {
    /// Whether an operator needs to look at records in this state.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            Self::TransferUnconfirmed | Self::BurnPending | Self::GenerationFailed
        )
    }

    /// Whether funds left the payer.
    pub fn is_charged(&self) -> bool {
        matches!(
            self,
            Self::Transferred
                | Self::Completed
                | Self::BurnPending
                | Self::BurnRetrying
                | Self::GenerationFailed
        )
    }

    /// Whether a record may move from this state to `next`.
    ///
    /// `Failed`, `TransferUnconfirmed` and `GenerationFailed` are terminal
    /// as far as the book is concerned; an operator settles them against
    /// the ledger.
    pub fn can_transition_to(&self, next: ChargeStatus) -> bool {
        use ChargeStatus::*;
        matches!(
            (*self, next),
            (Pending, Transferred | TransferUnconfirmed | Failed)
                | (Transferred, Completed | BurnPending)
                | (BurnPending, BurnRetrying)
                | (BurnRetrying, Completed | BurnPending)
                | (Completed, GenerationFailed)
        )
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Transferred => "transferred",
            Self::TransferUnconfirmed => "transfer_unconfirmed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::BurnPending => "burn_pending",
            Self::BurnRetrying => "burn_retrying",
            Self::GenerationFailed => "generation_failed",
        };
        f.write_str(s)
    }
}

/// Record of one charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRecord {
    /// Idempotency key
    pub charge_id: ChargeId,
    /// Account charged
    pub payer: Address,
    /// Total raw amount
    pub amount: RawAmount,
    /// Fee/burn split of the amount
    pub split: BurnSplit,
    /// Current state
    pub status: ChargeStatus,
    /// Confirmed transfer, if any
    pub transfer_signature: Option<TxSignature>,
    /// Confirmed burn, if any
    pub burn_signature: Option<TxSignature>,
    /// When the charge was recorded (ms)
    pub created_at: Timestamp,
    /// Last state change (ms)
    pub updated_at: Timestamp,
    /// Reason for the last failure, if any
    pub note: Option<String>,
}

impl ChargeRecord {
    fn new(request: &ChargeRequest) -> Self {
        let now = current_timestamp();
        Self {
            charge_id: request.charge_id,
            payer: request.payer,
            amount: request.amount,
            split: request.split(),
            status: ChargeStatus::Pending,
            transfer_signature: None,
            burn_signature: None,
            created_at: now,
            updated_at: now,
            note: None,
        }
    }
}

/// Totals over the book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeSummary {
    /// Records of any status
    pub total_charges: usize,
    /// Completed records
    pub completed: usize,
    /// Records rejected before funds moved
    pub failed: usize,
    /// Records needing an operator
    pub pending_reconciliation: usize,
    /// Raw units moved from payers
    pub total_charged: RawAmount,
    /// Raw units burned
    pub total_burned: RawAmount,
    /// Raw units kept by the fee collector
    pub total_retained: RawAmount,
}

#[derive(Default)]
struct BookInner {
    records: HashMap<ChargeId, ChargeRecord>,
    /// Charge ids in insertion order
    order: Vec<ChargeId>,
}

/// In-memory charge book shared across requests.
#[derive(Clone, Default)]
pub struct ChargeBook {
    inner: Arc<RwLock<BookInner>>,
}

impl ChargeBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new charge as `Pending`.
    ///
    /// Fails with `DuplicateCharge` if the id has been seen before, whatever
    /// its status.
    pub async fn begin(&self, request: &ChargeRequest) -> PayResult<ChargeRecord> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&request.charge_id) {
            return Err(PayError::DuplicateCharge(request.charge_id));
        }
        let record = ChargeRecord::new(request);
        inner.records.insert(request.charge_id, record.clone());
        inner.order.push(request.charge_id);
        debug!(charge_id = %request.charge_id, amount = request.amount, "Charge recorded");
        Ok(record)
    }

    /// Fetch a record.
    pub async fn get(&self, charge_id: &ChargeId) -> Option<ChargeRecord> {
        self.inner.read().await.records.get(charge_id).cloned()
    }

    /// Move a record to `next`, applying `f` under the write lock.
    ///
    /// Fails with `InvalidTransition` if the record's current state does
    /// not allow the move; the record is left untouched.
    async fn transition<F>(
        &self,
        charge_id: &ChargeId,
        next: ChargeStatus,
        f: F,
    ) -> PayResult<ChargeRecord>
    where
        F: FnOnce(&mut ChargeRecord),
    {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(charge_id)
            .ok_or(PayError::ChargeNotFound(*charge_id))?;
        if !record.status.can_transition_to(next) {
            return Err(PayError::InvalidTransition {
                charge_id: *charge_id,
                from: record.status,
                to: next,
            });
        }
        record.status = next;
        f(record);
        record.updated_at = current_timestamp();
        Ok(record.clone())
    }

    /// The transfer confirmed.
    pub async fn mark_transferred(
        &self,
        charge_id: &ChargeId,
        signature: TxSignature,
    ) -> PayResult<ChargeRecord> {
        self.transition(charge_id, ChargeStatus::Transferred, |r| {
            r.transfer_signature = Some(signature);
        })
        .await
    }

    /// The transfer was submitted but never confirmed.
    pub async fn mark_transfer_unconfirmed(
        &self,
        charge_id: &ChargeId,
        reason: impl Into<String>,
    ) -> PayResult<ChargeRecord> {
        let reason = reason.into();
        self.transition(charge_id, ChargeStatus::TransferUnconfirmed, |r| {
            r.note = Some(reason);
        })
        .await
    }

    /// Both steps confirmed.
    pub async fn mark_completed(
        &self,
        charge_id: &ChargeId,
        burn_signature: Option<TxSignature>,
    ) -> PayResult<ChargeRecord> {
        self.transition(charge_id, ChargeStatus::Completed, |r| {
            r.burn_signature = burn_signature;
            r.note = None;
        })
        .await
    }

    /// Rejected before funds moved.
    pub async fn mark_failed(
        &self,
        charge_id: &ChargeId,
        reason: impl Into<String>,
    ) -> PayResult<ChargeRecord> {
        let reason = reason.into();
        self.transition(charge_id, ChargeStatus::Failed, |r| {
            r.note = Some(reason);
        })
        .await
    }

    /// Claim a `BurnPending` record for a burn retry.
    ///
    /// Only one caller can hold the claim; any other caller gets
    /// `InvalidTransition` until the record is released with
    /// [`mark_completed`](Self::mark_completed) or
    /// [`mark_burn_pending`](Self::mark_burn_pending).
    pub async fn claim_burn_retry(&self, charge_id: &ChargeId) -> PayResult<ChargeRecord> {
        self.transition(charge_id, ChargeStatus::BurnRetrying, |_| {})
            .await
    }

    /// The burn failed after a confirmed transfer.
    pub async fn mark_burn_pending(
        &self,
        charge_id: &ChargeId,
        reason: impl Into<String>,
    ) -> PayResult<ChargeRecord> {
        let reason = reason.into();
        self.transition(charge_id, ChargeStatus::BurnPending, |r| {
            r.note = Some(reason);
        })
        .await
    }

    /// The charge went through but the answer was never produced.
    pub async fn mark_generation_failed(
        &self,
        charge_id: &ChargeId,
        reason: impl Into<String>,
    ) -> PayResult<ChargeRecord> {
        let reason = reason.into();
        self.transition(charge_id, ChargeStatus::GenerationFailed, |r| {
            r.note = Some(reason);
        })
        .await
    }

    /// Whether `signature` is the transfer of a charge this book executed.
    pub async fn has_transfer_signature(&self, signature: &TxSignature) -> bool {
        self.inner
            .read()
            .await
            .records
            .values()
            .any(|r| r.transfer_signature.as_ref() == Some(signature))
    }

    /// All records, oldest first.
    pub async fn records(&self) -> Vec<ChargeRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Records an operator needs to look at, oldest first.
    pub async fn needs_reconciliation(&self) -> Vec<ChargeRecord> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.status.needs_reconciliation())
            .collect()
    }

    /// Totals over the book.
    pub async fn summary(&self) -> ChargeSummary {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .fold(ChargeSummary::default(), |mut acc, r| {
                acc.total_charges += 1;
                match r.status {
                    ChargeStatus::Completed => acc.completed += 1,
                    ChargeStatus::Failed => acc.failed += 1,
                    s if s.needs_reconciliation() => acc.pending_reconciliation += 1,
                    _ => {}
                }
                if r.status.is_charged() {
                    acc.total_charged += r.amount;
                }
                if r.burn_signature.is_some() {
                    acc.total_burned += r.split.burned;
                }
                acc.total_retained = acc.total_charged - acc.total_burned;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: RawAmount) -> ChargeRequest {
        ChargeRequest::new(Address::random(), amount)
    }

    #[tokio::test]
    async fn test_begin_rejects_duplicate() {
        let book = ChargeBook::new();
        let req = request(100);
        book.begin(&req).await.unwrap();
        let err = book.begin(&req).await.unwrap_err();
        assert_eq!(err, PayError::DuplicateCharge(req.charge_id));
    }

    #[tokio::test]
    async fn test_failed_id_still_duplicate() {
        let book = ChargeBook::new();
        let req = request(100);
        book.begin(&req).await.unwrap();
        book.mark_failed(&req.charge_id, "no allowance").await.unwrap();
        assert!(matches!(
            book.begin(&req).await,
            Err(PayError::DuplicateCharge(_))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_charge() {
        let book = ChargeBook::new();
        let id = ChargeId::generate();
        assert_eq!(
            book.mark_failed(&id, "x").await.unwrap_err(),
            PayError::ChargeNotFound(id)
        );
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let book = ChargeBook::new();
        let req = request(6600);
        book.begin(&req).await.unwrap();

        let sig = TxSignature::random();
        let record = book.mark_transferred(&req.charge_id, sig).await.unwrap();
        assert_eq!(record.status, ChargeStatus::Transferred);
        assert_eq!(record.transfer_signature, Some(sig));

        let record = book
            .mark_completed(&req.charge_id, Some(TxSignature::random()))
            .await
            .unwrap();
        assert_eq!(record.status, ChargeStatus::Completed);
        assert!(record.updated_at >= record.created_at);
    }

    #[tokio::test]
    async fn test_reconciliation_and_summary() {
        let book = ChargeBook::new();

        let done = request(6600);
        book.begin(&done).await.unwrap();
        book.mark_transferred(&done.charge_id, TxSignature::random())
            .await
            .unwrap();
        book.mark_completed(&done.charge_id, Some(TxSignature::random()))
            .await
            .unwrap();

        let partial = request(1000);
        book.begin(&partial).await.unwrap();
        book.mark_transferred(&partial.charge_id, TxSignature::random())
            .await
            .unwrap();
        book.mark_burn_pending(&partial.charge_id, "rpc down")
            .await
            .unwrap();

        let rejected = request(50);
        book.begin(&rejected).await.unwrap();
        book.mark_failed(&rejected.charge_id, "no allowance")
            .await
            .unwrap();

        let pending = book.needs_reconciliation().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].charge_id, partial.charge_id);
        assert_eq!(pending[0].note.as_deref(), Some("rpc down"));

        let summary = book.summary().await;
        assert_eq!(summary.total_charges, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending_reconciliation, 1);
        assert_eq!(summary.total_charged, 7600);
        assert_eq!(summary.total_burned, 66);
        assert_eq!(summary.total_retained, 7534);
    }

    #[tokio::test]
    async fn test_records_in_insertion_order() {
        let book = ChargeBook::new();
        let ids: Vec<_> = (0..5)
            .map(|i| ChargeRequest::new(Address::random(), 10 + i))
            .collect();
        for req in &ids {
            book.begin(req).await.unwrap();
        }
        let records = book.records().await;
        let got: Vec<_> = records.iter().map(|r| r.charge_id).collect();
        let want: Vec<_> = ids.iter().map(|r| r.charge_id).collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_rejected_transitions() {
        let book = ChargeBook::new();
        let req = request(6600);
        let id = req.charge_id;
        book.begin(&req).await.unwrap();

        // Nothing has been transferred yet.
        let err = book.mark_completed(&id, None).await.unwrap_err();
        assert_eq!(
            err,
            PayError::InvalidTransition {
                charge_id: id,
                from: ChargeStatus::Pending,
                to: ChargeStatus::Completed,
            }
        );
        assert!(book.mark_burn_pending(&id, "x").await.is_err());
        assert!(book.mark_generation_failed(&id, "x").await.is_err());

        book.mark_transferred(&id, TxSignature::random())
            .await
            .unwrap();
        book.mark_burn_pending(&id, "rpc down").await.unwrap();

        // A pending burn must survive a late generation failure.
        let err = book.mark_generation_failed(&id, "model down").await.unwrap_err();
        assert_eq!(err.http_status(), 409);
        assert!(book.mark_failed(&id, "x").await.is_err());
        assert!(book.mark_completed(&id, None).await.is_err());
        let record = book.get(&id).await.unwrap();
        assert_eq!(record.status, ChargeStatus::BurnPending);
        assert_eq!(record.note.as_deref(), Some("rpc down"));
    }

    #[tokio::test]
    async fn test_terminal_states_stay_put() {
        let book = ChargeBook::new();

        let failed = request(10);
        book.begin(&failed).await.unwrap();
        book.mark_failed(&failed.charge_id, "no allowance")
            .await
            .unwrap();
        assert!(book
            .mark_transferred(&failed.charge_id, TxSignature::random())
            .await
            .is_err());
        assert!(book.mark_completed(&failed.charge_id, None).await.is_err());

        let unconfirmed = request(10);
        book.begin(&unconfirmed).await.unwrap();
        book.mark_transfer_unconfirmed(&unconfirmed.charge_id, "timeout")
            .await
            .unwrap();
        assert!(book
            .mark_completed(&unconfirmed.charge_id, None)
            .await
            .is_err());
        assert_eq!(
            book.get(&unconfirmed.charge_id).await.unwrap().status,
            ChargeStatus::TransferUnconfirmed
        );
    }

    #[tokio::test]
    async fn test_burn_retry_claim_is_exclusive() {
        let book = ChargeBook::new();
        let req = request(6600);
        let id = req.charge_id;
        book.begin(&req).await.unwrap();
        book.mark_transferred(&id, TxSignature::random())
            .await
            .unwrap();

        // Only a pending burn can be claimed.
        assert!(book.claim_burn_retry(&id).await.is_err());
        book.mark_burn_pending(&id, "rpc down").await.unwrap();

        let claimed = book.claim_burn_retry(&id).await.unwrap();
        assert_eq!(claimed.status, ChargeStatus::BurnRetrying);
        assert!(matches!(
            book.claim_burn_retry(&id).await,
            Err(PayError::InvalidTransition {
                from: ChargeStatus::BurnRetrying,
                ..
            })
        ));
        assert!(book.needs_reconciliation().await.is_empty());

        // Released after a failed attempt, then claimable again.
        book.mark_burn_pending(&id, "still down").await.unwrap();
        book.claim_burn_retry(&id).await.unwrap();
        let done = book
            .mark_completed(&id, Some(TxSignature::random()))
            .await
            .unwrap();
        assert_eq!(done.status, ChargeStatus::Completed);
        assert_eq!(done.note, None);
    }

    #[tokio::test]
    async fn test_has_transfer_signature() {
        let book = ChargeBook::new();
        let req = request(100);
        let sig = TxSignature::random();
        book.begin(&req).await.unwrap();
        assert!(!book.has_transfer_signature(&sig).await);
        book.mark_transferred(&req.charge_id, sig).await.unwrap();
        assert!(book.has_transfer_signature(&sig).await);
        assert!(!book.has_transfer_signature(&TxSignature::random()).await);
    }

    #[test]
    fn test_status_display_matches_serde() {
        for status in [
            ChargeStatus::Pending,
            ChargeStatus::BurnRetrying,
            ChargeStatus::GenerationFailed,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.to_string());
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(ChargeStatus::BurnPending).unwrap();
        assert_eq!(json, "burn_pending");
    }
}
