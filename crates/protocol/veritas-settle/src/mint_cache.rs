//! Cached mint decimals.
//!
//! Decimals come from the mint record, never from a constant. The record is
//! fetched on first use and kept until [`MintCache::invalidate`] is called.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::LedgerResult;
use crate::retry::RetryPolicy;
use crate::traits::Ledger;

/// Shared cache of the mint's decimals.
#[derive(Debug, Clone, Default)]
pub struct MintCache {
    decimals: Arc<RwLock<Option<u8>>>,
}

impl MintCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached decimals, fetching them from the ledger on a miss.
    pub async fn decimals(&self, ledger: &dyn Ledger, policy: &RetryPolicy) -> LedgerResult<u8> {
        if let Some(decimals) = *self.decimals.read().await {
            return Ok(decimals);
        }

        let mut slot = self.decimals.write().await;
        if let Some(decimals) = *slot {
            return Ok(decimals);
        }
        let info = policy.execute(|| ledger.mint_info()).await?;
        debug!(mint = %info.address, decimals = info.decimals, "Cached mint decimals");
        *slot = Some(info.decimals);
        Ok(info.decimals)
    }

    /// Drop the cached value; the next call refetches.
    pub async fn invalidate(&self) {
        *self.decimals.write().await = None;
    }

    /// The cached value without fetching.
    pub async fn peek(&self) -> Option<u8> {
        *self.decimals.read().await
    }
}
