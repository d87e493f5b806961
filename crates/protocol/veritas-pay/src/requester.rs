//! Payment requester: builds unsigned transactions for the user's wallet.
//!
//! The requester never signs. It reads the ledger to decide which
//! instructions are needed, attaches a fresh blockhash and hands the encoded
//! transaction back to the client. Its balance check is advisory; the ledger
//! enforces balances when the user submits.

use std::sync::Arc;

use tracing::{debug, info};
use veritas_settle::{Ledger, MintCache, RetryPolicy};
use veritas_types::{Address, RawAmount, TokenInstruction, UnsignedTransaction};

use crate::error::{PayError, PayResult};
use crate::types::{AllowanceOutcome, UnsignedPayload};

/// Builds transfer and approval transactions for users to sign.
#[derive(Clone)]
pub struct PaymentRequester {
    ledger: Arc<dyn Ledger>,
    policy: RetryPolicy,
    mint_cache: MintCache,
}

impl PaymentRequester {
    /// Create a requester over a ledger.
    pub fn new(ledger: Arc<dyn Ledger>, policy: RetryPolicy, mint_cache: MintCache) -> Self {
        Self {
            ledger,
            policy,
            mint_cache,
        }
    }

    /// Mint decimals, fetched once and cached.
    pub async fn decimals(&self) -> PayResult<u8> {
        Ok(self
            .mint_cache
            .decimals(self.ledger.as_ref(), &self.policy)
            .await?)
    }

    /// Build a transfer of `raw_amount` from `user` to the fee collector.
    ///
    /// Prepends creation of the fee-collection token account, paid by the
    /// user, when it does not exist yet. Each call returns an independent
    /// transaction with its own blockhash.
    pub async fn build_charge_transaction(
        &self,
        user: &Address,
        raw_amount: RawAmount,
    ) -> PayResult<UnsignedPayload> {
        if raw_amount == 0 {
            return Err(PayError::invalid_input("amount must be positive"));
        }

        let ledger = self.ledger.as_ref();
        let available = self.policy.execute(|| ledger.token_balance(user)).await?;
        if available < raw_amount {
            return Err(PayError::InsufficientFunds {
                required: raw_amount,
                available,
            });
        }

        let decimals = self.decimals().await?;
        let mint = ledger.mint();
        let fee_collector = ledger.fee_collector();
        let fee_account = ledger.token_account(&fee_collector);
        let fee_account_exists = self
            .policy
            .execute(|| ledger.token_account_exists(&fee_account))
            .await?;

        let mut instructions = Vec::with_capacity(2);
        if !fee_account_exists {
            debug!(account = %fee_account, "Fee-collection account missing, user will create it");
            instructions.push(TokenInstruction::CreateAssociatedAccount {
                payer: *user,
                owner: fee_collector,
                mint,
            });
        }
        instructions.push(TokenInstruction::TransferChecked {
            source: ledger.token_account(user),
            destination: fee_account,
            authority: *user,
            mint,
            amount: raw_amount,
            decimals,
        });

        let payload = self.finish(user, instructions).await?;
        info!(user = %user, amount = raw_amount, "Built charge transaction");
        Ok(payload)
    }

    /// Build an approval letting the backend delegate move up to `allowance_raw`.
    ///
    /// Returns `AlreadyApproved` without building anything when the existing
    /// delegation already covers the amount.
    pub async fn build_allowance_transaction(
        &self,
        user: &Address,
        allowance_raw: RawAmount,
    ) -> PayResult<AllowanceOutcome> {
        if allowance_raw == 0 {
            return Err(PayError::invalid_input("allowance must be positive"));
        }

        let ledger = self.ledger.as_ref();
        let delegate = ledger.delegate();
        let current = self.policy.execute(|| ledger.delegation(user)).await?;
        if let Some(allowance) = current.filter(|a| a.covers(&delegate, allowance_raw)) {
            debug!(user = %user, remaining = allowance.remaining, "Allowance already sufficient");
            return Ok(AllowanceOutcome::AlreadyApproved {
                remaining: allowance.remaining,
            });
        }

        let decimals = self.decimals().await?;
        let mint = ledger.mint();
        let user_account = ledger.token_account(user);
        let user_account_exists = self
            .policy
            .execute(|| ledger.token_account_exists(&user_account))
            .await?;

        let mut instructions = Vec::with_capacity(2);
        if !user_account_exists {
            instructions.push(TokenInstruction::CreateAssociatedAccount {
                payer: *user,
                owner: *user,
                mint,
            });
        }
        instructions.push(TokenInstruction::ApproveChecked {
            source: user_account,
            delegate,
            owner: *user,
            mint,
            amount: allowance_raw,
            decimals,
        });

        let payload = self.finish(user, instructions).await?;
        info!(user = %user, allowance = allowance_raw, "Built allowance transaction");
        Ok(AllowanceOutcome::Transaction(payload))
    }

    async fn finish(
        &self,
        fee_payer: &Address,
        instructions: Vec<TokenInstruction>,
    ) -> PayResult<UnsignedPayload> {
        let ledger = self.ledger.as_ref();
        let blockhash = self.policy.execute(|| ledger.latest_blockhash()).await?;
        let tx = UnsignedTransaction::new(*fee_payer, blockhash, instructions);
        let bytes = ledger.encode_unsigned(&tx)?;
        Ok(UnsignedPayload::from_bytes(&bytes))
    }
}
