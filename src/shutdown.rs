//! Two-phase process shutdown: the first stop signal starts a graceful
//! drain, a second signal (or the optional drain timeout) ends it.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome<T> {
    Completed(T),
    Interrupted,
    TimedOut,
}

/// Run `drain` until it completes, `interrupt` resolves, or `timeout`
/// elapses, whichever comes first.
pub async fn drain_or_abort<F, I>(drain: F, interrupt: I, timeout: Option<Duration>) -> DrainOutcome<F::Output>
where
    F: Future,
    I: Future<Output = ()>,
{
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        output = drain => DrainOutcome::Completed(output),
        _ = interrupt => DrainOutcome::Interrupted,
        _ = deadline => DrainOutcome::TimedOut,
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
