//! Shutdown on SIGTERM and SIGINT.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `token` when the process is asked to stop.
#[cfg(unix)]
pub(crate) fn cancel_on_shutdown(token: CancellationToken) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = token.cancelled() => return,
        }
        info!("Finishing the current job before exit");
        token.cancel();
    });

    Ok(())
}

/// Cancel `token` when the process is asked to stop.
#[cfg(not(unix))]
pub(crate) fn cancel_on_shutdown(token: CancellationToken) -> anyhow::Result<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("Received Ctrl+C");
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    });

    Ok(())
}
