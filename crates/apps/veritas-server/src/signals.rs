//! Shutdown signal handling.

use tokio::sync::watch;
use tracing::info;

/// Which signal asked the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

/// Watch for SIGINT or SIGTERM.
///
/// The receiver holds `None` until a signal arrives. It can be cloned and
/// handed to every task that needs to drain.
pub fn shutdown_signal() -> watch::Receiver<Option<ShutdownReason>> {
    let (tx, rx) = watch::channel(None);

    tokio::spawn(async move {
        let reason = wait_for_shutdown_signal().await;
        info!(?reason, "Shutdown signal received");
        let _ = tx.send(Some(reason));
    });

    rx
}

/// Resolve once the receiver reports a shutdown.
pub async fn wait_for(mut rx: watch::Receiver<Option<ShutdownReason>>) {
    while rx.borrow().is_none() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_for_shutdown_signal() -> ShutdownReason {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => ShutdownReason::Interrupt,
        () = terminate => ShutdownReason::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signal_initial_state() {
        let rx = shutdown_signal();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_send() {
        let (tx, rx) = watch::channel(None);
        let waiter = tokio::spawn(wait_for(rx));
        tx.send(Some(ShutdownReason::Terminate)).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(None);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for(rx))
            .await
            .unwrap();
    }
}
