//! Server error types.

use thiserror::Error;

/// Server result type.
pub type ServerResult<T> = Result<T, ServerError>;

/// Startup and command errors.
///
/// Request-level failures never reach this type; they are rendered as JSON
/// error bodies by the routes.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger connection error.
    #[error("{0}")]
    Ledger(#[from] veritas_settle::LedgerError),

    /// Pricing configuration error.
    #[error("{0}")]
    Pricing(#[from] veritas_econ::EconError),

    /// Payment configuration error.
    #[error("{0}")]
    Payment(#[from] veritas_pay::PayError),

    /// Model or search backend could not be set up.
    #[error("{0}")]
    Upstream(#[from] veritas_ops::UpstreamError),

    /// IO error.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// User-facing error with actionable message.
    #[error("{0}")]
    User(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a user-facing error.
    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors: 1
            Self::User(_) => 1,
            // Config errors: 3
            Self::Config(_) | Self::Toml(_) | Self::TomlSer(_) | Self::Pricing(_) => 3,
            // Payment errors: 4
            Self::Payment(_) => 4,
            // Ledger errors: 5
            Self::Ledger(_) => 5,
            // Upstream errors: 6
            Self::Upstream(_) => 6,
            // IO errors: 9
            Self::Io(_) => 9,
        }
    }

    /// Get a recovery hint, if there is one.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Config(_) | Self::Toml(_) => {
                Some("Check the config file, or run 'veritas-server init' to write a fresh one")
            }
            Self::Ledger(_) => Some("Check the [ledger] section: network, rpc_url, mint and keypairs"),
            Self::Pricing(_) => Some("Check the [pricing] section"),
            Self::Payment(e) => Some(e.suggestion()),
            Self::Upstream(_) => Some("Check the [llm] and [search] sections; is OPENAI_API_KEY set?"),
            Self::Io(_) | Self::TomlSer(_) | Self::User(_) => None,
        }
    }
}
