//! Configuration for the token ledger connection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use veritas_types::Address;

use crate::error::{LedgerError, LedgerResult};

/// Which ledger cluster to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerNetwork {
    /// In-process mock ledger
    #[default]
    Mock,
    /// Public devnet
    Devnet,
    /// Mainnet beta
    Mainnet,
    /// Any RPC url given in `rpc_url`
    Custom,
}

impl LedgerNetwork {
    /// Get the network name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Devnet => "devnet",
            Self::Mainnet => "mainnet",
            Self::Custom => "custom",
        }
    }

    /// Default public RPC endpoint, if the network has one.
    pub fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            Self::Devnet => Some("https://api.devnet.solana.com"),
            Self::Mainnet => Some("https://api.mainnet-beta.solana.com"),
            Self::Mock | Self::Custom => None,
        }
    }
}

impl std::fmt::Display for LedgerNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confirmation level waited for on reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Seen by the connected node
    Processed,
    /// Voted on by a supermajority
    #[default]
    Confirmed,
    /// Rooted
    Finalized,
}

/// Configuration for the token ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Which network to use
    pub network: LedgerNetwork,

    /// RPC endpoint; defaults to the network's public endpoint
    pub rpc_url: Option<String>,

    /// Application token mint (base58)
    pub mint: String,

    /// Fee-collection wallet (base58); owns the fee token account
    pub fee_wallet: String,

    /// Keypair file of the fee wallet; signs burns
    pub fee_wallet_keypair: Option<PathBuf>,

    /// Keypair file of the delegate; defaults to the fee wallet keypair
    pub delegate_keypair: Option<PathBuf>,

    /// Delegate address for the mock network; defaults to the fee wallet
    pub delegate: Option<String>,

    /// Mint decimals used by the mock network
    pub mock_decimals: u8,

    /// Confirmation level
    pub commitment: Commitment,

    /// Deadline for a single ledger call
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,

    /// Retry policy for transient failures
    pub retry: RetryConfig,
}

impl LedgerConfig {
    /// Create a mock-network configuration.
    pub fn mock(mint: &Address, fee_wallet: &Address) -> Self {
        Self {
            network: LedgerNetwork::Mock,
            mint: mint.to_string(),
            fee_wallet: fee_wallet.to_string(),
            ..Self::default()
        }
    }

    /// The RPC url to connect to.
    pub fn rpc_url(&self) -> LedgerResult<String> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        self.network
            .default_rpc_url()
            .map(str::to_string)
            .ok_or_else(|| {
                LedgerError::config(format!("network '{}' requires rpc_url", self.network))
            })
    }

    /// Parse the mint address.
    pub fn parse_mint(&self) -> LedgerResult<Address> {
        Address::parse(&self.mint)
            .map_err(|e| LedgerError::config(format!("invalid mint '{}': {}", self.mint, e)))
    }

    /// Parse the fee wallet address.
    pub fn parse_fee_wallet(&self) -> LedgerResult<Address> {
        Address::parse(&self.fee_wallet).map_err(|e| {
            LedgerError::config(format!("invalid fee wallet '{}': {}", self.fee_wallet, e))
        })
    }

    /// Parse the mock delegate address, falling back to the fee wallet.
    pub fn parse_delegate(&self) -> LedgerResult<Address> {
        match &self.delegate {
            Some(d) => Address::parse(d)
                .map_err(|e| LedgerError::config(format!("invalid delegate '{}': {}", d, e))),
            None => self.parse_fee_wallet(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LedgerResult<()> {
        self.parse_mint()?;
        self.parse_fee_wallet()?;
        if self.retry.max_attempts == 0 {
            return Err(LedgerError::config("retry.max_attempts must be at least 1"));
        }
        if self.call_timeout.is_zero() {
            return Err(LedgerError::config("call_timeout must be positive"));
        }

        if self.network == LedgerNetwork::Mock {
            self.parse_delegate()?;
            return Ok(());
        }

        self.rpc_url()?;
        let keypair = self.fee_wallet_keypair.as_ref().ok_or_else(|| {
            LedgerError::config("fee_wallet_keypair is required outside the mock network")
        })?;
        for path in std::iter::once(keypair).chain(self.delegate_keypair.as_ref()) {
            if !path.exists() {
                return Err(LedgerError::config(format!(
                    "keypair file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: LedgerNetwork::Mock,
            rpc_url: None,
            mint: String::new(),
            fee_wallet: String::new(),
            fee_wallet_keypair: None,
            delegate_keypair: None,
            delegate: None,
            mock_decimals: 9,
            commitment: Commitment::default(),
            call_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Serde helper for Duration as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 32])
    }

    #[test]
    fn test_mock_config_validates() {
        let config = LedgerConfig::mock(&addr(1), &addr(2));
        assert!(config.validate().is_ok());
        assert_eq!(config.parse_delegate().unwrap(), addr(2));
    }

    #[test]
    fn test_invalid_mint() {
        let mut config = LedgerConfig::mock(&addr(1), &addr(2));
        config.mint = "bogus!".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LedgerError::Config(msg) if msg.contains("mint")));
    }

    #[test]
    fn test_devnet_requires_keypair() {
        let mut config = LedgerConfig::mock(&addr(1), &addr(2));
        config.network = LedgerNetwork::Devnet;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_requires_rpc_url() {
        let mut config = LedgerConfig::mock(&addr(1), &addr(2));
        config.network = LedgerNetwork::Custom;
        assert!(config.rpc_url().is_err());
        config.rpc_url = Some("http://localhost:8899/".to_string());
        assert_eq!(config.rpc_url().unwrap(), "http://localhost:8899");
    }

    #[test]
    fn test_default_rpc_urls() {
        assert_eq!(
            LedgerNetwork::Devnet.default_rpc_url(),
            Some("https://api.devnet.solana.com")
        );
        assert_eq!(LedgerNetwork::Mock.default_rpc_url(), None);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = LedgerConfig::mock(&addr(1), &addr(2));
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_durations_as_millis() {
        let config = RetryConfig::default();
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["base_delay"], 250);
        assert_eq!(json["max_delay"], 2000);
    }
}
