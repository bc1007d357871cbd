//! Stop — turn Ctrl+C / SIGTERM into cooperative cancellation.

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Resolves on the first shutdown signal. If a handler cannot be installed
/// that signal simply never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, cancelling in-flight ingestions...");
        },
        _ = terminate => {
            warn!("Received SIGTERM, cancelling in-flight ingestions...");
        },
    }
}

/// Cancel `token` when a shutdown signal arrives.
pub fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}
