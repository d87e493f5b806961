//! Server configuration.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use veritas_econ::{usd_to_nano, ModelPrice, PriceEstimator, PriceTable, PricingConfig};
use veritas_ops::{LlmConfig, SearchConfig};
use veritas_pay::PaymentsConfig;
use veritas_settle::LedgerConfig;
use veritas_types::constants::{
    DEFAULT_COMPLETION_BUDGET, DEFAULT_MARKUP_PERCENT, DEFAULT_MODEL_ID,
    DEFAULT_TOKEN_PRICE_NANO_USD,
};

use crate::error::{ServerError, ServerResult};

/// Expand environment variables in a string.
/// Supports `${VAR_NAME}` syntax; unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Server configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener.
    pub server: HttpConfig,
    /// Token ledger connection.
    pub ledger: LedgerConfig,
    /// Query pricing.
    pub pricing: PricingSection,
    /// Payment defaults.
    pub payments: PaymentsConfig,
    /// Language model.
    pub llm: LlmConfig,
    /// Web search.
    pub search: SearchConfig,
}

impl ServerConfig {
    /// Load configuration from a file.
    ///
    /// A missing file yields the defaults. `${VAR}` references are expanded
    /// in secrets and endpoints.
    pub fn load(path: &Path) -> ServerResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.expand_env();
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ServerResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn expand_env(&mut self) {
        self.llm.api_key = expand_env_vars(&self.llm.api_key);
        self.llm.base_url = expand_env_vars(&self.llm.base_url);
        self.ledger.mint = expand_env_vars(&self.ledger.mint);
        self.ledger.fee_wallet = expand_env_vars(&self.ledger.fee_wallet);
        if let Some(url) = &self.ledger.rpc_url {
            self.ledger.rpc_url = Some(expand_env_vars(url));
        }
        if let Some(token) = &self.server.admin_token {
            self.server.admin_token = Some(expand_env_vars(token));
        }
    }

    /// Check the sections are consistent.
    ///
    /// Ledger addresses are checked when the ledger connects, since the mock
    /// network may fill them in.
    pub fn validate(&self) -> ServerResult<()> {
        self.server.validate()?;
        self.pricing.estimator()?;
        self.payments.validate()?;
        self.llm.validate().map_err(ServerError::config)?;
        self.search.validate().map_err(ServerError::config)?;
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind, e.g. `127.0.0.1:3000`.
    pub bind: String,
    /// Origins allowed by CORS; empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Bearer token for the operator routes under `/api/charges`; those
    /// routes are disabled when unset.
    pub admin_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            cors_origins: Vec::new(),
            admin_token: None,
        }
    }
}

impl HttpConfig {
    /// Parse the bind address.
    pub fn bind_addr(&self) -> ServerResult<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| ServerError::config(format!("invalid server.bind '{}': {}", self.bind, e)))
    }

    /// Check the listener settings.
    pub fn validate(&self) -> ServerResult<()> {
        self.bind_addr()?;
        if let Some(token) = &self.admin_token {
            if token.trim().is_empty() {
                return Err(ServerError::config("server.admin_token must not be empty"));
            }
            if token.contains("${") {
                return Err(ServerError::config(format!(
                    "server.admin_token references an unset variable: {}",
                    token
                )));
            }
        }
        Ok(())
    }
}

/// Per-1K-unit USD prices for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPriceUsd {
    /// USD per 1K prompt units.
    pub prompt_per_1k: f64,
    /// USD per 1K completion units.
    pub completion_per_1k: f64,
}

/// Pricing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSection {
    /// Model priced when a model id is not in the table.
    pub default_model: String,
    /// Completion units budgeted per query.
    pub completion_budget: u64,
    /// Markup in percent (200 = 2x).
    pub markup_percent: u64,
    /// USD price of one application token.
    pub token_price_usd: f64,
    /// Additional or overriding model prices.
    pub models: BTreeMap<String, ModelPriceUsd>,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL_ID.to_string(),
            completion_budget: DEFAULT_COMPLETION_BUDGET,
            markup_percent: DEFAULT_MARKUP_PERCENT,
            token_price_usd: DEFAULT_TOKEN_PRICE_NANO_USD as f64 / 1e9,
            models: BTreeMap::new(),
        }
    }
}

impl PricingSection {
    /// Build the price table and estimator.
    pub fn estimator(&self) -> ServerResult<PriceEstimator> {
        let mut table = PriceTable::standard();
        for (model, price) in &self.models {
            table = table.with_model(
                model.clone(),
                ModelPrice::from_usd(price.prompt_per_1k, price.completion_per_1k)?,
            );
        }
        let table = table.with_default_model(self.default_model.clone())?;
        let config = PricingConfig {
            completion_budget: self.completion_budget,
            markup_percent: self.markup_percent,
            token_price_nano_usd: usd_to_nano(self.token_price_usd)?,
        };
        Ok(PriceEstimator::new(table, config)?)
    }
}

/// Get the default config file path.
///
/// `VERITAS_CONFIG` overrides the platform config directory.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("VERITAS_CONFIG") {
        return PathBuf::from(path);
    }
    directories::ProjectDirs::from("io", "veritas", "veritas")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("veritas.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use veritas_settle::LedgerNetwork;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.ledger.network, LedgerNetwork::Mock);
        assert_eq!(config.pricing.completion_budget, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_pricing_matches_standard() {
        let estimator = PricingSection::default().estimator().unwrap();
        assert_eq!(estimator.config(), &PricingConfig::default());
        assert_eq!(estimator.table().default_model(), "gpt-4");
    }

    #[test]
    fn test_model_override() {
        let mut pricing = PricingSection::default();
        pricing.models.insert(
            "tiny".into(),
            ModelPriceUsd {
                prompt_per_1k: 0.001,
                completion_per_1k: 0.002,
            },
        );
        pricing.default_model = "tiny".into();
        let estimator = pricing.estimator().unwrap();
        assert_eq!(estimator.table().default_model(), "tiny");
    }

    #[test]
    fn test_unknown_default_model_rejected() {
        let pricing = PricingSection {
            default_model: "nope".into(),
            ..Default::default()
        };
        assert!(matches!(
            pricing.estimator(),
            Err(ServerError::Pricing(_))
        ));
    }

    #[test]
    fn test_bad_bind_rejected() {
        let mut config = ServerConfig::default();
        config.server.bind = "not an address".into();
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_admin_token_validation() {
        let mut config = ServerConfig::default();
        assert!(config.server.admin_token.is_none());

        config.server.admin_token = Some("  ".into());
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));

        config.server.admin_token = Some("${VERITAS_TEST_UNSET_ADMIN}".into());
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));

        config.server.admin_token = Some("s3cret".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_admin_token_from_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
admin_token = "${VERITAS_TEST_ADMIN_TOKEN}"
"#,
        )
        .unwrap();
        std::env::set_var("VERITAS_TEST_ADMIN_TOKEN", "ops-token");

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.server.admin_token.as_deref(), Some("ops-token"));
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("VERITAS_TEST_API_KEY", "sk-test");
        assert_eq!(expand_env_vars("${VERITAS_TEST_API_KEY}"), "sk-test");
        assert_eq!(
            expand_env_vars("${VERITAS_TEST_UNSET_VAR}"),
            "${VERITAS_TEST_UNSET_VAR}"
        );
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig::load(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = ServerConfig::default();
        config.server.bind = "0.0.0.0:8080".into();
        config.payments.verify_window = 25;
        config.search.enabled = false;
        config.save(&path).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.server.bind, "0.0.0.0:8080");
        assert_eq!(loaded.payments.verify_window, 25);
        assert!(!loaded.search.enabled);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
api_key = "${VERITAS_TEST_PARTIAL_KEY}"
model = "gpt-3.5-turbo"

[pricing]
markup_percent = 300
"#,
        )
        .unwrap();
        std::env::set_var("VERITAS_TEST_PARTIAL_KEY", "sk-partial");

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.llm.api_key, "sk-partial");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.pricing.markup_percent, 300);
        assert_eq!(config.pricing.completion_budget, 300);
        assert_eq!(config.payments.verify_window, 10);
    }
}
