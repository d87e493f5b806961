//! Unsigned transaction payloads and parsed token transfers.
//!
//! An [`UnsignedTransaction`] is a ledger-agnostic description of what the
//! user is asked to sign. The ledger layer turns it into wire bytes; this
//! crate never serializes it into a ledger format.

use serde::{Deserialize, Serialize};

use crate::address::{Address, Blockhash, TxSignature};
use crate::amount::RawAmount;

/// A single token-program instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenInstruction {
    /// Create the associated token account of `owner` for `mint`.
    CreateAssociatedAccount {
        /// Pays the account rent
        payer: Address,
        /// Wallet the new account belongs to
        owner: Address,
        /// Token mint
        mint: Address,
    },
    /// Move tokens between token accounts, checked against mint decimals.
    TransferChecked {
        /// Source token account
        source: Address,
        /// Destination token account
        destination: Address,
        /// Owner or delegate of the source account
        authority: Address,
        /// Token mint
        mint: Address,
        /// Raw units to move
        amount: RawAmount,
        /// Mint decimals
        decimals: u8,
    },
    /// Grant a delegate authority over a token account.
    ApproveChecked {
        /// Token account being delegated
        source: Address,
        /// Account receiving the authority
        delegate: Address,
        /// Owner of the source account
        owner: Address,
        /// Token mint
        mint: Address,
        /// Raw units the delegate may move
        amount: RawAmount,
        /// Mint decimals
        decimals: u8,
    },
}

impl TokenInstruction {
    /// The wallet whose signature this instruction needs.
    pub fn signer(&self) -> &Address {
        match self {
            Self::CreateAssociatedAccount { payer, .. } => payer,
            Self::TransferChecked { authority, .. } => authority,
            Self::ApproveChecked { owner, .. } => owner,
        }
    }
}

/// A transaction ready for the user's wallet to sign.
///
/// Immutable once built; the requester hands it out and forgets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Account that pays the network fee
    pub fee_payer: Address,
    /// Liveness token; the transaction expires with it
    pub recent_blockhash: Blockhash,
    /// Instructions in execution order
    pub instructions: Vec<TokenInstruction>,
}

impl UnsignedTransaction {
    /// Build a transaction from its parts.
    pub fn new(
        fee_payer: Address,
        recent_blockhash: Blockhash,
        instructions: Vec<TokenInstruction>,
    ) -> Self {
        Self {
            fee_payer,
            recent_blockhash,
            instructions,
        }
    }

    /// Distinct signers required, fee payer first.
    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = vec![self.fee_payer];
        for ix in &self.instructions {
            let signer = ix.signer();
            if !signers.contains(signer) {
                signers.push(*signer);
            }
        }
        signers
    }
}

/// A token transfer parsed out of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    /// Transaction that carried the transfer
    pub signature: TxSignature,
    /// Source token account
    pub source: Address,
    /// Destination token account
    pub destination: Address,
    /// Raw units moved
    pub amount: RawAmount,
}
