//! Ledger trait definition.

use async_trait::async_trait;
use veritas_types::{
    Address, Blockhash, DelegateAllowance, MintInfo, RawAmount, TokenTransfer, TxSignature,
    UnsignedTransaction,
};

use crate::error::LedgerResult;

/// Trait for the token ledger the charge flow runs against.
///
/// This trait abstracts the blockchain, allowing for:
/// - A real Solana implementation for production
/// - A mock implementation for testing and local runs
///
/// The ledger is the single source of truth for balances and allowances.
/// Implementations must enforce both atomically at commit time; callers'
/// own checks are advisory.
#[async_trait]
pub trait Ledger: Send + Sync {
    // =========================================================================
    // Identity
    // =========================================================================

    /// The application token mint.
    fn mint(&self) -> Address;

    /// The fee-collection wallet.
    fn fee_collector(&self) -> Address;

    /// The backend-held delegate that moves funds under an allowance.
    fn delegate(&self) -> Address;

    /// Derive the associated token account of `owner` for the mint.
    fn token_account(&self, owner: &Address) -> Address;

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the mint record (decimals and supply).
    async fn mint_info(&self) -> LedgerResult<MintInfo>;

    /// Whether a token account exists.
    async fn token_account_exists(&self, account: &Address) -> LedgerResult<bool>;

    /// Token balance of `owner`'s associated account; zero when it does not exist.
    async fn token_balance(&self, owner: &Address) -> LedgerResult<RawAmount>;

    /// Current delegation on `owner`'s associated account, if any.
    async fn delegation(&self, owner: &Address) -> LedgerResult<Option<DelegateAllowance>>;

    /// A recent blockhash to attach to new transactions.
    async fn latest_blockhash(&self) -> LedgerResult<Blockhash>;

    /// Most recent confirmed signatures touching `account`, newest first.
    async fn recent_signatures(
        &self,
        account: &Address,
        limit: usize,
    ) -> LedgerResult<Vec<TxSignature>>;

    /// Token transfers parsed from a confirmed transaction.
    async fn token_transfers(&self, signature: &TxSignature) -> LedgerResult<Vec<TokenTransfer>>;

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Serialize an unsigned transaction into the ledger's wire format.
    fn encode_unsigned(&self, tx: &UnsignedTransaction) -> LedgerResult<Vec<u8>>;

    // =========================================================================
    // Backend-signed writes
    // =========================================================================

    /// Move `amount` from `owner`'s token account to the fee-collection token
    /// account, signed by the delegate. Creates the fee-collection account if
    /// it does not exist.
    ///
    /// Fails with `InsufficientAllowance` when the delegation does not cover
    /// `amount`, and `InsufficientFunds` when the balance does not.
    async fn delegate_transfer(
        &self,
        owner: &Address,
        amount: RawAmount,
        decimals: u8,
    ) -> LedgerResult<TxSignature>;

    /// Burn `amount` from the fee-collection token account, signed by the fee wallet.
    async fn burn_collected(&self, amount: RawAmount, decimals: u8) -> LedgerResult<TxSignature>;
}
