//! In-memory mock implementation of the [`Ledger`] trait.
//!
//! Enforces the same rules the real ledger does: balances, delegate
//! allowances, supply accounting and blockhash liveness. Failures can be
//! injected per operation, either before the state change (the request
//! never landed) or after it (the request landed but the caller saw an
//! error).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use veritas_types::{
    Address, Blockhash, DelegateAllowance, MintInfo, RawAmount, TokenInstruction, TokenTransfer,
    TxSignature, UnsignedTransaction,
};

use crate::error::{LedgerError, LedgerResult};
use crate::traits::Ledger;

/// Ledger operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `mint_info`
    MintInfo,
    /// `token_account_exists`
    AccountExists,
    /// `token_balance`
    Balance,
    /// `delegation`
    Delegation,
    /// `latest_blockhash`
    Blockhash,
    /// `recent_signatures`
    Signatures,
    /// `token_transfers`
    Transfers,
    /// `delegate_transfer`
    DelegateTransfer,
    /// `burn_collected`
    Burn,
    /// `submit_signed`
    SubmitSigned,
}

#[derive(Debug, Clone)]
struct TokenAccountState {
    owner: Address,
    balance: RawAmount,
    delegate: Option<(Address, RawAmount)>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    signature: TxSignature,
    accounts: Vec<Address>,
    transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    error: LedgerError,
    after_commit: bool,
}

struct MockLedgerInner {
    mint: Address,
    decimals: u8,
    supply: RawAmount,
    fee_collector: Address,
    delegate: Address,
    /// Token accounts keyed by token account address.
    accounts: HashMap<Address, TokenAccountState>,
    /// Confirmed transactions, oldest first.
    history: Vec<HistoryEntry>,
    /// Blockhashes handed out by `latest_blockhash`.
    issued_blockhashes: HashSet<Blockhash>,
    failures: HashMap<MockOp, VecDeque<InjectedFailure>>,
    should_fail: bool,
    /// Delay applied before an operation takes the ledger lock.
    latency: HashMap<MockOp, Duration>,
    calls: HashMap<MockOp, u32>,
    burns: Vec<RawAmount>,
    delegate_transfers: Vec<(Address, RawAmount)>,
}

/// A mock token ledger for tests and the `mock` network.
///
/// Uses `Arc<RwLock<...>>` internally, so it is cheap to clone and all
/// clones share the same state.
#[derive(Clone)]
pub struct MockLedger {
    inner: Arc<RwLock<MockLedgerInner>>,
}

/// Deterministic stand-in for associated token account derivation.
fn derive_token_account(owner: &Address, mint: &Address) -> Address {
    let mut bytes = [0u8; 32];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = owner.as_bytes()[i] ^ mint.as_bytes()[i].rotate_left(3) ^ 0x5A;
    }
    Address::new(bytes)
}

impl MockLedger {
    /// Create a ledger with an empty mint.
    pub fn new(mint: Address, fee_collector: Address, delegate: Address, decimals: u8) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLedgerInner {
                mint,
                decimals,
                supply: 0,
                fee_collector,
                delegate,
                accounts: HashMap::new(),
                history: Vec::new(),
                issued_blockhashes: HashSet::new(),
                failures: HashMap::new(),
                should_fail: false,
                latency: HashMap::new(),
                calls: HashMap::new(),
                burns: Vec::new(),
                delegate_transfers: Vec::new(),
            })),
        }
    }

    /// Create a ledger with random addresses where the fee collector is also the delegate.
    pub fn random(decimals: u8) -> Self {
        let fee = Address::random();
        Self::new(Address::random(), fee, fee, decimals)
    }

    fn read(&self) -> RwLockReadGuard<'_, MockLedgerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockLedgerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Mint `amount` new tokens into `owner`'s token account, creating it.
    pub fn fund(&self, owner: &Address, amount: RawAmount) -> &Self {
        let mut inner = self.write();
        let account = derive_token_account(owner, &inner.mint);
        inner
            .accounts
            .entry(account)
            .or_insert_with(|| TokenAccountState {
                owner: *owner,
                balance: 0,
                delegate: None,
            })
            .balance += amount;
        inner.supply += amount;
        self
    }

    /// Create an empty token account for `owner`.
    pub fn create_account(&self, owner: &Address) -> &Self {
        let mut inner = self.write();
        let account = derive_token_account(owner, &inner.mint);
        inner.accounts.entry(account).or_insert_with(|| TokenAccountState {
            owner: *owner,
            balance: 0,
            delegate: None,
        });
        self
    }

    /// Set a delegation directly, as if the owner had signed an approval.
    pub fn approve(&self, owner: &Address, delegate: &Address, amount: RawAmount) -> &Self {
        let mut inner = self.write();
        let account = derive_token_account(owner, &inner.mint);
        let state = inner.accounts.entry(account).or_insert_with(|| TokenAccountState {
            owner: *owner,
            balance: 0,
            delegate: None,
        });
        state.delegate = Some((*delegate, amount));
        self
    }

    /// Make the next call to `op` fail before touching state.
    pub fn inject_failure(&self, op: MockOp, error: LedgerError) -> &Self {
        self.push_failure(op, error, false)
    }

    /// Make the next call to `op` apply its state change, then fail.
    pub fn inject_failure_after_commit(&self, op: MockOp, error: LedgerError) -> &Self {
        self.push_failure(op, error, true)
    }

    fn push_failure(&self, op: MockOp, error: LedgerError, after_commit: bool) -> &Self {
        self.write()
            .failures
            .entry(op)
            .or_default()
            .push_back(InjectedFailure {
                error,
                after_commit,
            });
        self
    }

    /// Make every call to `op` wait `delay` before it runs, like a slow RPC.
    pub fn set_latency(&self, op: MockOp, delay: Duration) -> &Self {
        self.write().latency.insert(op, delay);
        self
    }

    async fn wait(&self, op: MockOp) {
        let delay = self.read().latency.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Set the failure mode for every operation at runtime.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.write().should_fail = should_fail;
    }

    // =========================================================================
    // Assertion Helpers
    // =========================================================================

    /// Raw balance of `owner`'s token account.
    pub fn balance_of(&self, owner: &Address) -> RawAmount {
        let inner = self.read();
        let account = derive_token_account(owner, &inner.mint);
        inner.accounts.get(&account).map(|a| a.balance).unwrap_or(0)
    }

    /// Remaining delegated amount on `owner`'s token account.
    pub fn allowance_of(&self, owner: &Address) -> RawAmount {
        let inner = self.read();
        let account = derive_token_account(owner, &inner.mint);
        inner
            .accounts
            .get(&account)
            .and_then(|a| a.delegate)
            .map(|(_, remaining)| remaining)
            .unwrap_or(0)
    }

    /// Current total supply.
    pub fn supply(&self) -> RawAmount {
        self.read().supply
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: MockOp) -> u32 {
        self.read().calls.get(&op).copied().unwrap_or(0)
    }

    /// Amounts burned, in order.
    pub fn burns(&self) -> Vec<RawAmount> {
        self.read().burns.clone()
    }

    /// Delegate transfers committed, in order.
    pub fn delegate_transfers(&self) -> Vec<(Address, RawAmount)> {
        self.read().delegate_transfers.clone()
    }

    /// Number of confirmed transactions.
    pub fn transaction_count(&self) -> usize {
        self.read().history.len()
    }

    // =========================================================================
    // Wallet simulation
    // =========================================================================

    /// Decode bytes produced by [`Ledger::encode_unsigned`].
    pub fn decode_unsigned(bytes: &[u8]) -> LedgerResult<UnsignedTransaction> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::encoding(e.to_string()))
    }

    /// Sign and submit a transaction as its required signers would.
    ///
    /// Instructions apply atomically: either all succeed or none do.
    pub fn submit_signed(&self, tx: &UnsignedTransaction) -> LedgerResult<TxSignature> {
        let mut inner = self.write();
        let injected = Self::begin(&mut inner, MockOp::SubmitSigned)?;

        if !inner.issued_blockhashes.contains(&tx.recent_blockhash) {
            return Err(LedgerError::transaction_failed("blockhash not found"));
        }

        let mint = inner.mint;
        let mut accounts = inner.accounts.clone();
        let mut transfers = Vec::new();
        let mut touched = tx.required_signers();

        for ix in &tx.instructions {
            match ix {
                TokenInstruction::CreateAssociatedAccount { owner, mint: m, .. } => {
                    if *m != mint {
                        return Err(LedgerError::transaction_failed("mint mismatch"));
                    }
                    let account = derive_token_account(owner, &mint);
                    if accounts.contains_key(&account) {
                        return Err(LedgerError::transaction_failed(
                            "associated account already exists",
                        ));
                    }
                    accounts.insert(
                        account,
                        TokenAccountState {
                            owner: *owner,
                            balance: 0,
                            delegate: None,
                        },
                    );
                    touched.push(account);
                }
                TokenInstruction::TransferChecked {
                    source,
                    destination,
                    authority,
                    mint: m,
                    amount,
                    decimals,
                } => {
                    if *m != mint || *decimals != inner.decimals {
                        return Err(LedgerError::transaction_failed("mint or decimals mismatch"));
                    }
                    let src = accounts
                        .get_mut(source)
                        .ok_or_else(|| LedgerError::account_not_found(source))?;
                    if src.owner != *authority {
                        return Err(LedgerError::transaction_failed("owner does not match"));
                    }
                    if src.balance < *amount {
                        return Err(LedgerError::insufficient_funds(src.balance, *amount));
                    }
                    src.balance -= amount;
                    accounts
                        .get_mut(destination)
                        .ok_or_else(|| LedgerError::account_not_found(destination))?
                        .balance += amount;
                    transfers.push((*source, *destination, *amount));
                    touched.extend([*source, *destination]);
                }
                TokenInstruction::ApproveChecked {
                    source,
                    delegate,
                    owner,
                    mint: m,
                    amount,
                    decimals,
                } => {
                    if *m != mint || *decimals != inner.decimals {
                        return Err(LedgerError::transaction_failed("mint or decimals mismatch"));
                    }
                    let src = accounts
                        .get_mut(source)
                        .ok_or_else(|| LedgerError::account_not_found(source))?;
                    if src.owner != *owner {
                        return Err(LedgerError::transaction_failed("owner does not match"));
                    }
                    src.delegate = Some((*delegate, *amount));
                    touched.push(*source);
                }
            }
        }

        inner.accounts = accounts;
        let signature = TxSignature::random();
        inner.history.push(HistoryEntry {
            signature,
            accounts: touched,
            transfers: transfers
                .into_iter()
                .map(|(source, destination, amount)| TokenTransfer {
                    signature,
                    source,
                    destination,
                    amount,
                })
                .collect(),
        });
        Self::finish(injected)?;
        Ok(signature)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Count the call and surface a pre-commit failure, if any.
    fn begin(inner: &mut MockLedgerInner, op: MockOp) -> LedgerResult<Option<LedgerError>> {
        *inner.calls.entry(op).or_default() += 1;
        if inner.should_fail {
            return Err(LedgerError::transaction_failed("mock ledger failure"));
        }
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(InjectedFailure {
                error,
                after_commit: false,
            }) => Err(error),
            Some(InjectedFailure {
                error,
                after_commit: true,
            }) => Ok(Some(error)),
            None => Ok(None),
        }
    }

    fn finish(injected: Option<LedgerError>) -> LedgerResult<()> {
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn read_op(&self, op: MockOp) -> LedgerResult<RwLockWriteGuard<'_, MockLedgerInner>> {
        let mut inner = self.write();
        let injected = Self::begin(&mut inner, op)?;
        Self::finish(injected)?;
        Ok(inner)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn mint(&self) -> Address {
        self.read().mint
    }

    fn fee_collector(&self) -> Address {
        self.read().fee_collector
    }

    fn delegate(&self) -> Address {
        self.read().delegate
    }

    fn token_account(&self, owner: &Address) -> Address {
        derive_token_account(owner, &self.read().mint)
    }

    async fn mint_info(&self) -> LedgerResult<MintInfo> {
        let inner = self.read_op(MockOp::MintInfo)?;
        Ok(MintInfo {
            address: inner.mint,
            decimals: inner.decimals,
            supply: inner.supply,
        })
    }

    async fn token_account_exists(&self, account: &Address) -> LedgerResult<bool> {
        let inner = self.read_op(MockOp::AccountExists)?;
        Ok(inner.accounts.contains_key(account))
    }

    async fn token_balance(&self, owner: &Address) -> LedgerResult<RawAmount> {
        let inner = self.read_op(MockOp::Balance)?;
        let account = derive_token_account(owner, &inner.mint);
        Ok(inner.accounts.get(&account).map(|a| a.balance).unwrap_or(0))
    }

    async fn delegation(&self, owner: &Address) -> LedgerResult<Option<DelegateAllowance>> {
        let inner = self.read_op(MockOp::Delegation)?;
        let account = derive_token_account(owner, &inner.mint);
        Ok(inner.accounts.get(&account).and_then(|a| {
            a.delegate.map(|(delegate, remaining)| DelegateAllowance {
                owner: *owner,
                delegate,
                remaining,
            })
        }))
    }

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        let mut inner = self.read_op(MockOp::Blockhash)?;
        let hash = Blockhash::random();
        inner.issued_blockhashes.insert(hash);
        Ok(hash)
    }

    async fn recent_signatures(
        &self,
        account: &Address,
        limit: usize,
    ) -> LedgerResult<Vec<TxSignature>> {
        let inner = self.read_op(MockOp::Signatures)?;
        Ok(inner
            .history
            .iter()
            .rev()
            .filter(|entry| entry.accounts.contains(account))
            .take(limit)
            .map(|entry| entry.signature)
            .collect())
    }

    async fn token_transfers(&self, signature: &TxSignature) -> LedgerResult<Vec<TokenTransfer>> {
        let inner = self.read_op(MockOp::Transfers)?;
        inner
            .history
            .iter()
            .find(|entry| entry.signature == *signature)
            .map(|entry| entry.transfers.clone())
            .ok_or_else(|| LedgerError::rpc(format!("transaction {} not found", signature)))
    }

    fn encode_unsigned(&self, tx: &UnsignedTransaction) -> LedgerResult<Vec<u8>> {
        serde_json::to_vec(tx).map_err(|e| LedgerError::encoding(e.to_string()))
    }

    async fn delegate_transfer(
        &self,
        owner: &Address,
        amount: RawAmount,
        decimals: u8,
    ) -> LedgerResult<TxSignature> {
        self.wait(MockOp::DelegateTransfer).await;
        let mut inner = self.write();
        let injected = Self::begin(&mut inner, MockOp::DelegateTransfer)?;

        if decimals != inner.decimals {
            return Err(LedgerError::transaction_failed("decimals mismatch"));
        }
        let mint = inner.mint;
        let delegate = inner.delegate;
        let fee_collector = inner.fee_collector;
        let source = derive_token_account(owner, &mint);
        let destination = derive_token_account(&fee_collector, &mint);

        let src = inner
            .accounts
            .get_mut(&source)
            .ok_or_else(|| LedgerError::account_not_found(source))?;
        match src.delegate {
            Some((d, remaining)) if d == delegate && remaining >= amount => {}
            _ => return Err(LedgerError::InsufficientAllowance { need: amount }),
        }
        if src.balance < amount {
            return Err(LedgerError::insufficient_funds(src.balance, amount));
        }
        src.balance -= amount;
        if let Some((_, remaining)) = src.delegate.as_mut() {
            *remaining -= amount;
        }

        inner
            .accounts
            .entry(destination)
            .or_insert_with(|| TokenAccountState {
                owner: fee_collector,
                balance: 0,
                delegate: None,
            })
            .balance += amount;

        let signature = TxSignature::random();
        inner.history.push(HistoryEntry {
            signature,
            accounts: vec![delegate, source, destination],
            transfers: vec![TokenTransfer {
                signature,
                source,
                destination,
                amount,
            }],
        });
        inner.delegate_transfers.push((*owner, amount));
        debug!(owner = %owner, amount, "Mock delegate transfer committed");

        Self::finish(injected)?;
        Ok(signature)
    }

    async fn burn_collected(&self, amount: RawAmount, decimals: u8) -> LedgerResult<TxSignature> {
        self.wait(MockOp::Burn).await;
        let mut inner = self.write();
        let injected = Self::begin(&mut inner, MockOp::Burn)?;

        if decimals != inner.decimals {
            return Err(LedgerError::transaction_failed("decimals mismatch"));
        }
        let fee_collector = inner.fee_collector;
        let account = derive_token_account(&fee_collector, &inner.mint);
        let state = inner
            .accounts
            .get_mut(&account)
            .ok_or_else(|| LedgerError::account_not_found(account))?;
        if state.balance < amount {
            return Err(LedgerError::insufficient_funds(state.balance, amount));
        }
        state.balance -= amount;
        inner.supply -= amount;

        let signature = TxSignature::random();
        inner.history.push(HistoryEntry {
            signature,
            accounts: vec![fee_collector, account],
            transfers: Vec::new(),
        });
        inner.burns.push(amount);
        debug!(amount, "Mock burn committed");

        Self::finish(injected)?;
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fund_updates_supply_and_balance() {
        let ledger = MockLedger::random(6);
        let user = Address::random();
        ledger.fund(&user, 500);
        assert_eq!(ledger.token_balance(&user).await.unwrap(), 500);
        assert_eq!(ledger.supply(), 500);
        assert_eq!(ledger.mint_info().await.unwrap().decimals, 6);
    }

    #[tokio::test]
    async fn test_missing_account_balance_is_zero() {
        let ledger = MockLedger::random(9);
        assert_eq!(ledger.token_balance(&Address::random()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_token_account_is_deterministic() {
        let ledger = MockLedger::random(9);
        let user = Address::random();
        assert_eq!(ledger.token_account(&user), ledger.token_account(&user));
        assert_ne!(ledger.token_account(&user), user);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let ledger = MockLedger::random(9);
        ledger.inject_failure(MockOp::Blockhash, LedgerError::network("down"));
        assert!(ledger.latest_blockhash().await.is_err());
        assert!(ledger.latest_blockhash().await.is_ok());
        assert_eq!(ledger.calls(MockOp::Blockhash), 2);
    }

    #[tokio::test]
    async fn test_should_fail() {
        let ledger = MockLedger::random(9);
        ledger.set_should_fail(true);
        assert!(ledger.mint_info().await.is_err());
        ledger.set_should_fail(false);
        assert!(ledger.mint_info().await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_blockhash_rejected() {
        let ledger = MockLedger::random(9);
        let tx = UnsignedTransaction::new(Address::random(), Blockhash::random(), vec![]);
        let err = ledger.submit_signed(&tx).unwrap_err();
        assert!(matches!(err, LedgerError::TransactionFailed(msg) if msg.contains("blockhash")));
    }

    #[tokio::test]
    async fn test_encode_decode() {
        let ledger = MockLedger::random(9);
        let tx = UnsignedTransaction::new(Address::random(), Blockhash::random(), vec![]);
        let bytes = ledger.encode_unsigned(&tx).unwrap();
        assert_eq!(MockLedger::decode_unsigned(&bytes).unwrap(), tx);
    }
}
