use std::future::Future;

use crate::error::{DbError, DbResult};

/// Blocking facade over the async transport primitives.
///
/// The cursor contract is strictly synchronous while the management API
/// client is async; the bridge parks the caller on a current-thread runtime
/// until the single in-flight call settles. No cancellation, no timeout at
/// this layer; at most one call runs per cursor at a time.
pub struct SyncBridge {
    rt: tokio::runtime::Runtime,
}

impl SyncBridge {
    pub fn new() -> DbResult<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::Internal(e.to_string()))?;
        Ok(Self { rt })
    }

    pub fn run_blocking<F: Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SyncBridge")
    }
}
