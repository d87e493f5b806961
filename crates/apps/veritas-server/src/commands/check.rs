//! Validate configuration without serving.

use std::path::Path;

use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::error::ServerResult;

/// Execute the check-config command.
///
/// Builds the full application context, so a bad ledger or missing API key
/// fails here the same way it would at startup.
pub fn check_config(path: &Path, config: &ServerConfig) -> ServerResult<String> {
    let ctx = AppContext::build(config)?;
    Ok(format!(
        "{} is valid\n  bind:          {}\n  network:       {}\n  mint:          {}\n  fee collector: {}\n  model:         {}\n  search:        {}",
        path.display(),
        config.server.bind,
        config.ledger.network,
        ctx.ledger.mint(),
        ctx.ledger.fee_collector(),
        ctx.orchestrator.model(),
        if ctx.search_enabled { "enabled" } else { "disabled" },
    ))
}
