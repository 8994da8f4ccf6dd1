use tokio_util::sync::CancellationToken;

// ============================================================================
// Signal handling for graceful shutdown
// ============================================================================

/// Wait for a shutdown signal (SIGINT or SIGTERM on Unix).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {
            tracing::info!(signal = "SIGINT", "Signal received");
        }
        _ = sigterm.recv() => {
            tracing::info!(signal = "SIGTERM", "Signal received");
        }
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for ctrl-c");
    } else {
        tracing::info!(signal = "ctrl-c", "Signal received");
    }
}

/// Spawn a background task that cancels the returned token on the first
/// shutdown signal. Clones of the token share cancellation state.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    token
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_clones_share_cancellation() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();

        assert!(clone.is_cancelled());
    }
}
