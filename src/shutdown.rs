//! Operator interrupts.
//!
//! Ctrl-C never kills the process outright: it stops the running operation
//! so the caller can still close the session and return the front panel.

use anyhow::Result;
use std::future::Future;
use tracing::{info, warn};

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Run `work` until it finishes or `shutdown` resolves, whichever comes
/// first. `Ok(None)` means the work was abandoned; a command already
/// in flight is dropped with it.
pub async fn or_interrupt<T, W, S>(work: W, shutdown: S) -> Result<Option<T>>
where
    W: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    tokio::select! {
        biased;
        outcome = work => outcome.map(Some),
        _ = shutdown => {
            info!("interrupted, releasing instrument");
            Ok(None)
        }
    }
}
