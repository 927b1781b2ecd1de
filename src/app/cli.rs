use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use super::error::AppError;

/// Reusable CLI application runner that handles:
/// - Tracing initialisation (`RUST_LOG`, falling back to a default filter)
/// - Signal handling (SIGINT, SIGTERM, SIGHUP)
/// - Graceful shutdown through a cancellation token
/// - Exit codes (0 = success, 1 = error, 130 = SIGINT, 143 = SIGTERM, 129 = SIGHUP)
pub struct CliApp {
    name: String,
    default_filter: String,
    shutdown_grace: Duration,
}

impl CliApp {
    /// Create a new CLI application runner
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default_filter: "info".to_string(),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    /// Log filter used when `RUST_LOG` is not set
    pub fn with_default_filter(mut self, filter: &str) -> Self {
        self.default_filter = filter.to_string();
        self
    }

    /// How long the application may take to stop after a signal
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Run the application until it finishes or a signal arrives
    ///
    /// On a signal the token passed to `main_fn` is cancelled and the
    /// application gets the shutdown grace period to wind down.
    ///
    /// This function never returns - it calls std::process::exit with the appropriate code
    pub async fn run<F, Fut>(self, main_fn: F) -> !
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        self.init_tracing();
        info!(app = %self.name, "Starting");

        let cancel = CancellationToken::new();
        let main = main_fn(cancel.clone());
        tokio::pin!(main);

        let code = tokio::select! {
            result = &mut main => exit_code(&result),
            signal = wait_for_signal() => match signal {
                Ok(signal_code) => {
                    cancel.cancel();
                    match tokio::time::timeout(self.shutdown_grace, &mut main).await {
                        Ok(Err(e)) => warn!(error = %e, "Error during shutdown"),
                        Ok(Ok(())) => info!("Shut down cleanly"),
                        Err(_) => warn!(grace = ?self.shutdown_grace, "Shutdown timed out"),
                    }
                    signal_code
                }
                Err(e) => {
                    error!(error = %e, "Signal handling failed");
                    1
                }
            },
        };
        std::process::exit(code);
    }

    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.default_filter));
        // A subscriber may already be installed, e.g. by a test harness
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Exit code for how the application finished on its own
pub fn exit_code(result: &Result<(), AppError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Application failed");
            1
        }
    }
}

/// Wait for any Unix signal (SIGINT, SIGTERM, SIGHUP) or Ctrl+C
/// Returns the exit code to use (130 for SIGINT, 143 for SIGTERM, etc.)
async fn wait_for_signal() -> Result<i32, AppError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let code = tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                143 // 128 + 15
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                130 // 128 + 2
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP");
                129 // 128 + 1
            }
        };
        Ok(code)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(130)
    }
}
