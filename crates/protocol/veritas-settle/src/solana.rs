//! Solana ledger implementation.
//!
//! This module is only available when the `solana-sdk` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{Instruction, InstructionError};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};
use solana_transaction_status::UiTransactionEncoding;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use spl_token::solana_program::program_option::COption;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::{Account as SplAccount, Mint as SplMint};
use tracing::{debug, info, warn};
use veritas_types::{
    Address, Blockhash, DelegateAllowance, MintInfo, RawAmount, TokenInstruction, TokenTransfer,
    TxSignature, UnsignedTransaction,
};

use crate::config::{Commitment, LedgerConfig};
use crate::error::{LedgerError, LedgerResult, SubmitPhase};
use crate::traits::Ledger;

/// spl-token `TokenError::InsufficientFunds`; raised for both balance and delegated amount.
const TOKEN_ERROR_INSUFFICIENT_FUNDS: u32 = 1;

/// Delay between signature status polls while confirming.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Solana ledger implementation.
///
/// Reads go through the RPC node; backend-signed writes are signed with the
/// fee wallet and delegate keypairs loaded at startup.
pub struct SolanaLedger {
    /// Nonblocking RPC client
    rpc: RpcClient,
    /// Application token mint
    mint: Pubkey,
    /// Fee wallet keypair; owns the fee token account and signs burns
    fee_wallet: Keypair,
    /// Delegate keypair; signs transfers out of user accounts
    delegate: Keypair,
    /// Commitment used for reads and confirmation
    commitment: CommitmentConfig,
    /// How long to poll for a sent transaction's confirmation
    confirm_timeout: Duration,
}

fn to_pubkey(address: &Address) -> Pubkey {
    Pubkey::new_from_array(*address.as_bytes())
}

fn to_address(pubkey: &Pubkey) -> Address {
    Address::new(pubkey.to_bytes())
}

fn to_signature(signature: &Signature) -> LedgerResult<TxSignature> {
    TxSignature::from_slice(signature.as_ref()).map_err(|e| LedgerError::encoding(e.to_string()))
}

fn commitment_config(commitment: Commitment) -> CommitmentConfig {
    match commitment {
        Commitment::Processed => CommitmentConfig::processed(),
        Commitment::Confirmed => CommitmentConfig::confirmed(),
        Commitment::Finalized => CommitmentConfig::finalized(),
    }
}

fn load_keypair(path: &std::path::Path) -> LedgerResult<Keypair> {
    read_keypair_file(path).map_err(|e| {
        LedgerError::config(format!("failed to read keypair {}: {}", path.display(), e))
    })
}

fn classify_transaction_error(err: &TransactionError) -> LedgerError {
    match err {
        TransactionError::InstructionError(
            _,
            InstructionError::Custom(TOKEN_ERROR_INSUFFICIENT_FUNDS),
        ) => LedgerError::InsufficientFunds { have: 0, need: 0 },
        TransactionError::BlockhashNotFound => LedgerError::network("blockhash expired"),
        other => LedgerError::transaction_failed(other.to_string()),
    }
}

/// Map a client error onto the ledger error taxonomy.
///
/// Connection failures come back as `Network`. For a submission that is
/// only true before the node accepted it; see [`SubmitPhase`].
fn classify(err: ClientError) -> LedgerError {
    if let Some(tx_err) = err.get_transaction_error() {
        return classify_transaction_error(&tx_err);
    }
    match err.kind() {
        ClientErrorKind::Io(e) => LedgerError::network(e.to_string()),
        ClientErrorKind::Reqwest(e) if e.is_connect() => LedgerError::network(e.to_string()),
        ClientErrorKind::Reqwest(e) if e.is_timeout() => LedgerError::timeout(e.to_string()),
        ClientErrorKind::Reqwest(e) => LedgerError::timeout(e.to_string()),
        ClientErrorKind::SerdeJson(e) => LedgerError::encoding(e.to_string()),
        _ => LedgerError::rpc(err.to_string()),
    }
}

fn build_instruction(ix: &TokenInstruction) -> LedgerResult<Instruction> {
    let token_program = spl_token::id();
    let built = match ix {
        TokenInstruction::CreateAssociatedAccount { payer, owner, mint } => {
            create_associated_token_account_idempotent(
                &to_pubkey(payer),
                &to_pubkey(owner),
                &to_pubkey(mint),
                &token_program,
            )
        }
        TokenInstruction::TransferChecked {
            source,
            destination,
            authority,
            mint,
            amount,
            decimals,
        } => spl_token::instruction::transfer_checked(
            &token_program,
            &to_pubkey(source),
            &to_pubkey(mint),
            &to_pubkey(destination),
            &to_pubkey(authority),
            &[],
            *amount,
            *decimals,
        )
        .map_err(|e| LedgerError::encoding(e.to_string()))?,
        TokenInstruction::ApproveChecked {
            source,
            delegate,
            owner,
            mint,
            amount,
            decimals,
        } => spl_token::instruction::approve_checked(
            &token_program,
            &to_pubkey(source),
            &to_pubkey(mint),
            &to_pubkey(delegate),
            &to_pubkey(owner),
            &[],
            *amount,
            *decimals,
        )
        .map_err(|e| LedgerError::encoding(e.to_string()))?,
    };
    Ok(built)
}

/// Pull a raw amount out of a parsed spl-token instruction's `info` object.
fn parsed_amount(info: &Value) -> Option<RawAmount> {
    info.get("amount")
        .or_else(|| info.pointer("/tokenAmount/amount"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn parsed_address(info: &Value, key: &str) -> Option<Address> {
    info.get(key)
        .and_then(Value::as_str)
        .and_then(|s| Address::parse(s).ok())
}

/// Collect token transfers from the JSON-parsed form of a transaction.
fn collect_transfers(signature: TxSignature, tx: &Value) -> Vec<TokenTransfer> {
    let top_level = tx
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    let inner = tx
        .pointer("/meta/innerInstructions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|group| group.get("instructions").and_then(Value::as_array))
        .flatten();

    top_level
        .chain(inner)
        .filter(|ix| ix.get("program").and_then(Value::as_str) == Some("spl-token"))
        .filter_map(|ix| {
            let parsed = ix.get("parsed")?;
            let kind = parsed.get("type").and_then(Value::as_str)?;
            if kind != "transfer" && kind != "transferChecked" {
                return None;
            }
            let info = parsed.get("info")?;
            Some(TokenTransfer {
                signature,
                source: parsed_address(info, "source")?,
                destination: parsed_address(info, "destination")?,
                amount: parsed_amount(info)?,
            })
        })
        .collect()
}

impl SolanaLedger {
    /// Create a new Solana ledger.
    ///
    /// Loads the fee wallet and delegate keypairs and checks that the fee
    /// wallet keypair matches the configured address.
    pub fn new(config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let rpc_url = config.rpc_url()?;
        let mint = to_pubkey(&config.parse_mint()?);

        let fee_path = config
            .fee_wallet_keypair
            .as_ref()
            .ok_or_else(|| LedgerError::config("fee_wallet_keypair is required"))?;
        let fee_wallet = load_keypair(fee_path)?;
        if to_address(&fee_wallet.pubkey()) != config.parse_fee_wallet()? {
            return Err(LedgerError::config(
                "fee_wallet_keypair does not match fee_wallet",
            ));
        }
        let delegate = match &config.delegate_keypair {
            Some(path) => load_keypair(path)?,
            None => load_keypair(fee_path)?,
        };

        let commitment = commitment_config(config.commitment);
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url.clone(),
            config.call_timeout,
            commitment,
        );

        info!(
            network = %config.network,
            rpc = %rpc_url,
            mint = %mint,
            fee_wallet = %fee_wallet.pubkey(),
            delegate = %delegate.pubkey(),
            "Solana ledger initialized"
        );

        Ok(Self {
            rpc,
            mint,
            fee_wallet,
            delegate,
            commitment,
            confirm_timeout: config.call_timeout,
        })
    }

    async fn token_account_state(&self, account: &Pubkey) -> LedgerResult<Option<SplAccount>> {
        let response = self
            .rpc
            .get_account_with_commitment(account, self.commitment)
            .await
            .map_err(classify)?;
        match response.value {
            Some(acc) => SplAccount::unpack(&acc.data)
                .map(Some)
                .map_err(|e| LedgerError::encoding(format!("token account {}: {}", account, e))),
            None => Ok(None),
        }
    }

    /// Sign, send and wait for confirmation.
    ///
    /// Sending and confirming are separate calls so that a failure after the
    /// node accepted the transaction is reported as an unknown outcome and
    /// never resubmitted.
    async fn sign_and_send(
        &self,
        instructions: &[Instruction],
        signer: &Keypair,
    ) -> LedgerResult<TxSignature> {
        let blockhash = self.rpc.get_latest_blockhash().await.map_err(classify)?;
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&signer.pubkey()),
            &[signer],
            blockhash,
        );
        let signature = self
            .rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| classify(e).in_phase(SubmitPhase::Sending))?;
        debug!(signature = %signature, "Transaction sent");

        self.confirm(&signature)
            .await
            .map_err(|e| e.in_phase(SubmitPhase::Confirming))?;
        to_signature(&signature)
    }

    async fn confirm(&self, signature: &Signature) -> LedgerResult<()> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            let status = self
                .rpc
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
                .map_err(classify)?;
            match status {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => return Err(classify_transaction_error(&e)),
                None => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::timeout(format!(
                    "{} not confirmed within {:?}",
                    signature, self.confirm_timeout
                )));
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Ledger for SolanaLedger {
    fn mint(&self) -> Address {
        to_address(&self.mint)
    }

    fn fee_collector(&self) -> Address {
        to_address(&self.fee_wallet.pubkey())
    }

    fn delegate(&self) -> Address {
        to_address(&self.delegate.pubkey())
    }

    fn token_account(&self, owner: &Address) -> Address {
        to_address(&get_associated_token_address(&to_pubkey(owner), &self.mint))
    }

    async fn mint_info(&self) -> LedgerResult<MintInfo> {
        let account = self
            .rpc
            .get_account_with_commitment(&self.mint, self.commitment)
            .await
            .map_err(classify)?
            .value
            .ok_or_else(|| LedgerError::account_not_found(self.mint))?;
        let mint = SplMint::unpack(&account.data)
            .map_err(|e| LedgerError::encoding(format!("mint {}: {}", self.mint, e)))?;
        Ok(MintInfo {
            address: to_address(&self.mint),
            decimals: mint.decimals,
            supply: mint.supply,
        })
    }

    async fn token_account_exists(&self, account: &Address) -> LedgerResult<bool> {
        let response = self
            .rpc
            .get_account_with_commitment(&to_pubkey(account), self.commitment)
            .await
            .map_err(classify)?;
        Ok(response.value.is_some())
    }

    async fn token_balance(&self, owner: &Address) -> LedgerResult<RawAmount> {
        let ata = get_associated_token_address(&to_pubkey(owner), &self.mint);
        Ok(self
            .token_account_state(&ata)
            .await?
            .map(|acc| acc.amount)
            .unwrap_or(0))
    }

    async fn delegation(&self, owner: &Address) -> LedgerResult<Option<DelegateAllowance>> {
        let ata = get_associated_token_address(&to_pubkey(owner), &self.mint);
        let Some(state) = self.token_account_state(&ata).await? else {
            return Ok(None);
        };
        Ok(match state.delegate {
            COption::Some(delegate) => Some(DelegateAllowance {
                owner: *owner,
                delegate: to_address(&delegate),
                remaining: state.delegated_amount,
            }),
            COption::None => None,
        })
    }

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        let hash = self.rpc.get_latest_blockhash().await.map_err(classify)?;
        Ok(Blockhash::new(hash.to_bytes()))
    }

    async fn recent_signatures(
        &self,
        account: &Address,
        limit: usize,
    ) -> LedgerResult<Vec<TxSignature>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(&to_pubkey(account), config)
            .await
            .map_err(classify)?;

        statuses
            .into_iter()
            .filter(|status| status.err.is_none())
            .map(|status| {
                TxSignature::parse(&status.signature)
                    .map_err(|e| LedgerError::encoding(e.to_string()))
            })
            .collect()
    }

    async fn token_transfers(&self, signature: &TxSignature) -> LedgerResult<Vec<TokenTransfer>> {
        let sig = Signature::from(*signature.as_bytes());
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let tx = self
            .rpc
            .get_transaction_with_config(&sig, config)
            .await
            .map_err(classify)?;
        let json = serde_json::to_value(&tx.transaction)
            .map_err(|e| LedgerError::encoding(e.to_string()))?;
        let transfers = collect_transfers(*signature, &json);
        debug!(signature = %signature, count = transfers.len(), "Parsed token transfers");
        Ok(transfers)
    }

    fn encode_unsigned(&self, tx: &UnsignedTransaction) -> LedgerResult<Vec<u8>> {
        let instructions = tx
            .instructions
            .iter()
            .map(build_instruction)
            .collect::<LedgerResult<Vec<_>>>()?;
        let mut message = Message::new(&instructions, Some(&to_pubkey(&tx.fee_payer)));
        message.recent_blockhash = Hash::new_from_array(*tx.recent_blockhash.as_bytes());
        let transaction = Transaction::new_unsigned(message);
        bincode::serialize(&transaction).map_err(|e| LedgerError::encoding(e.to_string()))
    }

    async fn delegate_transfer(
        &self,
        owner: &Address,
        amount: RawAmount,
        decimals: u8,
    ) -> LedgerResult<TxSignature> {
        let token_program = spl_token::id();
        let source = get_associated_token_address(&to_pubkey(owner), &self.mint);
        let fee_wallet = self.fee_wallet.pubkey();
        let destination = get_associated_token_address(&fee_wallet, &self.mint);

        let mut instructions = Vec::with_capacity(2);
        if !self.token_account_exists(&to_address(&destination)).await? {
            debug!(account = %destination, "Creating fee-collection token account");
            instructions.push(create_associated_token_account_idempotent(
                &self.delegate.pubkey(),
                &fee_wallet,
                &self.mint,
                &token_program,
            ));
        }
        instructions.push(
            spl_token::instruction::transfer_checked(
                &token_program,
                &source,
                &self.mint,
                &destination,
                &self.delegate.pubkey(),
                &[],
                amount,
                decimals,
            )
            .map_err(|e| LedgerError::encoding(e.to_string()))?,
        );

        match self.sign_and_send(&instructions, &self.delegate).await {
            Err(LedgerError::InsufficientFunds { .. }) => {
                // The token program reports both shortfalls with one code.
                let state = self.token_account_state(&source).await?;
                let have = state.map(|s| s.amount).unwrap_or(0);
                if have < amount {
                    Err(LedgerError::insufficient_funds(have, amount))
                } else {
                    warn!(owner = %owner, amount, "Delegate transfer rejected by allowance");
                    Err(LedgerError::InsufficientAllowance { need: amount })
                }
            }
            other => other,
        }
    }

    async fn burn_collected(&self, amount: RawAmount, decimals: u8) -> LedgerResult<TxSignature> {
        let fee_wallet = self.fee_wallet.pubkey();
        let account = get_associated_token_address(&fee_wallet, &self.mint);
        let instruction = spl_token::instruction::burn_checked(
            &spl_token::id(),
            &account,
            &self.mint,
            &fee_wallet,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| LedgerError::encoding(e.to_string()))?;

        match self.sign_and_send(&[instruction], &self.fee_wallet).await {
            Err(LedgerError::InsufficientFunds { .. }) => {
                let have = self
                    .token_account_state(&account)
                    .await?
                    .map(|s| s.amount)
                    .unwrap_or(0);
                Err(LedgerError::insufficient_funds(have, amount))
            }
            other => other,
        }
    }
}
