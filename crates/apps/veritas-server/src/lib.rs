//! HTTP server for the Veritas pay-per-query service.
//!
//! Each answered query is paid for in application tokens: the server prices
//! the prompt, moves the tokens from the user's account with its delegate
//! authority, burns 1% of the charge, and only then asks the model.
//!
//! # Quick Start
//!
//! ```bash
//! # Write a config file
//! veritas-server init
//!
//! # Check it
//! OPENAI_API_KEY=sk-... veritas-server check-config
//!
//! # Price a query offline
//! veritas-server quote "Is coffee good for you?" --mode audit
//!
//! # Serve
//! veritas-server serve --bind 0.0.0.0:3000
//! ```
//!
//! # Configuration
//!
//! Configuration is read from the platform config directory, `VERITAS_CONFIG`
//! or `--config`. A missing file means defaults: the in-memory mock ledger,
//! standard model prices and DuckDuckGo search.

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod signals;

pub use config::ServerConfig;
pub use context::{AppContext, SharedContext};
pub use error::{ServerError, ServerResult};
pub use routes::router;
