use std::future::Future;

use tokio::signal;

/// Signal that interrupted a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Wait for SIGINT or SIGTERM.
///
/// If a handler cannot be installed that signal is never reported.
pub async fn wait_for_shutdown() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, abandoning run...");
            ShutdownSignal::Interrupt
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, abandoning run...");
            ShutdownSignal::Terminate
        }
    }
}

/// Run `work` until it finishes or `shutdown` resolves, whichever comes first.
///
/// The work future is dropped on shutdown. The hub holds the durable state,
/// so an abandoned run is resumed by invoking the driver again.
pub async fn run_until_shutdown<F, S>(work: F, shutdown: S) -> Result<F::Output, ShutdownSignal>
where
    F: Future,
    S: Future<Output = ShutdownSignal>,
{
    tokio::select! {
        output = work => Ok(output),
        signal = shutdown => Err(signal),
    }
}
