use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Watch for SIGTERM and SIGINT and cancel the returned token.
///
/// The accept loop and the periodic tasks monitor the token and drain instead
/// of dying mid-request. Clients holding CPUs are released as their sockets
/// close with the process.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGINT handler");
                return;
            }
        };

        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!(signal = received, "Shutting down");
        signalled.cancel();
    });

    token
}
