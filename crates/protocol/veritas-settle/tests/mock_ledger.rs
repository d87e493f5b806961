//! Integration tests for the Ledger trait using MockLedger.
//!
//! These tests cover the rules every ledger must enforce: balances,
//! delegate allowances, supply accounting on burn, signature history and
//! blockhash liveness, plus the mint cache and ledger selection.

use std::time::Duration;

use veritas_settle::{
    connect, Ledger, LedgerConfig, LedgerError, MintCache, MockLedger, MockOp, RetryPolicy,
};
use veritas_types::{Address, TokenInstruction, UnsignedTransaction};

fn setup(decimals: u8) -> (MockLedger, Address) {
    let ledger = MockLedger::random(decimals);
    let user = Address::random();
    (ledger, user)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(
        2,
        Duration::from_millis(1),
        Duration::from_millis(5),
        Duration::from_secs(5),
    )
}

// =============================================================================
// Delegate Transfers
// =============================================================================

#[tokio::test]
async fn test_delegate_transfer_moves_funds_and_consumes_allowance() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 10_000);
    ledger.approve(&user, &ledger.delegate(), 8_000);

    ledger.delegate_transfer(&user, 6_600, 2).await.unwrap();

    assert_eq!(ledger.balance_of(&user), 3_400);
    assert_eq!(ledger.balance_of(&ledger.fee_collector()), 6_600);
    assert_eq!(ledger.allowance_of(&user), 1_400);
    assert_eq!(ledger.supply(), 10_000);
}

#[tokio::test]
async fn test_delegate_transfer_requires_allowance() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 10_000);
    ledger.approve(&user, &ledger.delegate(), 100);

    let err = ledger.delegate_transfer(&user, 6_600, 2).await.unwrap_err();
    assert_eq!(err, LedgerError::InsufficientAllowance { need: 6_600 });
    assert_eq!(ledger.balance_of(&user), 10_000);
    assert_eq!(ledger.transaction_count(), 0);
}

#[tokio::test]
async fn test_delegate_transfer_rejects_other_delegate() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 10_000);
    ledger.approve(&user, &Address::random(), 10_000);

    let err = ledger.delegate_transfer(&user, 1, 2).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
}

#[tokio::test]
async fn test_delegate_transfer_requires_balance() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 50);
    ledger.approve(&user, &ledger.delegate(), 1_000);

    let err = ledger.delegate_transfer(&user, 100, 2).await.unwrap_err();
    assert_eq!(err, LedgerError::insufficient_funds(50, 100));
    assert_eq!(ledger.allowance_of(&user), 1_000);
}

#[tokio::test]
async fn test_delegate_transfer_wrong_decimals() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 100);
    ledger.approve(&user, &ledger.delegate(), 100);

    assert!(ledger.delegate_transfer(&user, 10, 9).await.is_err());
}

#[tokio::test]
async fn test_failure_after_commit_still_moves_funds() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 1_000);
    ledger.approve(&user, &ledger.delegate(), 1_000);
    ledger.inject_failure_after_commit(MockOp::DelegateTransfer, LedgerError::timeout("lost"));

    let err = ledger.delegate_transfer(&user, 500, 2).await.unwrap_err();
    assert!(matches!(err, LedgerError::Timeout(_)));
    assert_eq!(ledger.balance_of(&user), 500);
    assert_eq!(ledger.delegate_transfers(), vec![(user, 500)]);
}

// =============================================================================
// Burns
// =============================================================================

#[tokio::test]
async fn test_burn_reduces_supply() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 10_000);
    ledger.approve(&user, &ledger.delegate(), 10_000);
    ledger.delegate_transfer(&user, 6_600, 2).await.unwrap();

    ledger.burn_collected(66, 2).await.unwrap();

    assert_eq!(ledger.supply(), 10_000 - 66);
    assert_eq!(ledger.balance_of(&ledger.fee_collector()), 6_534);
    assert_eq!(ledger.burns(), vec![66]);
    assert_eq!(ledger.mint_info().await.unwrap().supply, 9_934);
}

#[tokio::test]
async fn test_burn_without_fee_account_fails() {
    let (ledger, _) = setup(2);
    let err = ledger.burn_collected(1, 2).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)));
}

// =============================================================================
// Wallet Submission
// =============================================================================

#[tokio::test]
async fn test_wallet_signed_transfer_and_history() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 1_000);
    ledger.create_account(&ledger.fee_collector());

    let source = ledger.token_account(&user);
    let destination = ledger.token_account(&ledger.fee_collector());
    let tx = UnsignedTransaction::new(
        user,
        ledger.latest_blockhash().await.unwrap(),
        vec![TokenInstruction::TransferChecked {
            source,
            destination,
            authority: user,
            mint: ledger.mint(),
            amount: 100,
            decimals: 2,
        }],
    );
    let bytes = ledger.encode_unsigned(&tx).unwrap();
    let decoded = MockLedger::decode_unsigned(&bytes).unwrap();
    let signature = ledger.submit_signed(&decoded).unwrap();

    let recent = ledger.recent_signatures(&destination, 10).await.unwrap();
    assert_eq!(recent, vec![signature]);

    let transfers = ledger.token_transfers(&signature).await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].source, source);
    assert_eq!(transfers[0].destination, destination);
    assert_eq!(transfers[0].amount, 100);
}

#[tokio::test]
async fn test_wallet_approve_sets_delegation() {
    let (ledger, user) = setup(9);
    ledger.create_account(&user);

    let tx = UnsignedTransaction::new(
        user,
        ledger.latest_blockhash().await.unwrap(),
        vec![TokenInstruction::ApproveChecked {
            source: ledger.token_account(&user),
            delegate: ledger.delegate(),
            owner: user,
            mint: ledger.mint(),
            amount: 1_000,
            decimals: 9,
        }],
    );
    ledger.submit_signed(&tx).unwrap();

    let delegation = ledger.delegation(&user).await.unwrap().unwrap();
    assert!(delegation.covers(&ledger.delegate(), 1_000));
    assert!(!delegation.covers(&ledger.delegate(), 1_001));
}

#[tokio::test]
async fn test_failed_instruction_rolls_back_whole_transaction() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 10);
    let fee = ledger.fee_collector();

    let tx = UnsignedTransaction::new(
        user,
        ledger.latest_blockhash().await.unwrap(),
        vec![
            TokenInstruction::CreateAssociatedAccount {
                payer: user,
                owner: fee,
                mint: ledger.mint(),
            },
            TokenInstruction::TransferChecked {
                source: ledger.token_account(&user),
                destination: ledger.token_account(&fee),
                authority: user,
                mint: ledger.mint(),
                amount: 11,
                decimals: 2,
            },
        ],
    );
    assert!(ledger.submit_signed(&tx).is_err());
    assert!(!ledger
        .token_account_exists(&ledger.token_account(&fee))
        .await
        .unwrap());
    assert_eq!(ledger.balance_of(&user), 10);
}

#[tokio::test]
async fn test_recent_signatures_newest_first_and_limited() {
    let (ledger, user) = setup(2);
    ledger.fund(&user, 1_000);
    ledger.approve(&user, &ledger.delegate(), 1_000);

    let first = ledger.delegate_transfer(&user, 1, 2).await.unwrap();
    let second = ledger.delegate_transfer(&user, 2, 2).await.unwrap();
    let third = ledger.delegate_transfer(&user, 3, 2).await.unwrap();

    let fee_account = ledger.token_account(&ledger.fee_collector());
    let recent = ledger.recent_signatures(&fee_account, 2).await.unwrap();
    assert_eq!(recent, vec![third, second]);
    assert!(!recent.contains(&first));
}

// =============================================================================
// Mint Cache
// =============================================================================

#[tokio::test]
async fn test_mint_cache_fetches_once() {
    let (ledger, _) = setup(6);
    let cache = MintCache::new();
    let policy = fast_policy();

    assert_eq!(cache.peek().await, None);
    assert_eq!(cache.decimals(&ledger, &policy).await.unwrap(), 6);
    assert_eq!(cache.decimals(&ledger, &policy).await.unwrap(), 6);
    assert_eq!(ledger.calls(MockOp::MintInfo), 1);

    cache.invalidate().await;
    assert_eq!(cache.decimals(&ledger, &policy).await.unwrap(), 6);
    assert_eq!(ledger.calls(MockOp::MintInfo), 2);
}

#[tokio::test]
async fn test_mint_cache_retries_transient_read() {
    let (ledger, _) = setup(6);
    ledger.inject_failure(MockOp::MintInfo, LedgerError::network("reset"));
    let cache = MintCache::new();

    assert_eq!(cache.decimals(&ledger, &fast_policy()).await.unwrap(), 6);
    assert_eq!(ledger.calls(MockOp::MintInfo), 2);
}

// =============================================================================
// Ledger Selection
// =============================================================================

#[tokio::test]
async fn test_connect_mock_network() {
    let mint = Address::random();
    let fee = Address::random();
    let mut config = LedgerConfig::mock(&mint, &fee);
    config.mock_decimals = 4;

    let ledger = connect(&config).unwrap();
    assert_eq!(ledger.mint(), mint);
    assert_eq!(ledger.fee_collector(), fee);
    assert_eq!(ledger.delegate(), fee);
    assert_eq!(ledger.mint_info().await.unwrap().decimals, 4);
}

#[tokio::test]
async fn test_connect_rejects_invalid_config() {
    let config = LedgerConfig::default();
    assert!(matches!(connect(&config), Err(LedgerError::Config(_))));
}
