use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Token cancelled on Ctrl+C or SIGTERM.
///
/// Workers finish the item they hold and stop dequeuing; a second signal is
/// not handled, so the process can still be killed the usual way.
pub fn cancel_on_signal() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::warn!("Received Ctrl+C, cancelling batch"),
            _ = terminate => tracing::warn!("Received terminate signal, cancelling batch"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });

    cancel
}
