//! Write a default configuration file.

use std::path::Path;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Execute the init command.
pub fn init(path: &Path, force: bool) -> ServerResult<String> {
    if path.exists() && !force {
        return Err(ServerError::user(format!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        )));
    }
    ServerConfig::default().save(path)?;
    Ok(format!(
        "Wrote {}\nSet llm.api_key (or OPENAI_API_KEY via \"${{OPENAI_API_KEY}}\") before serving.",
        path.display()
    ))
}
