//! Cooperative shutdown.
//!
//! A [`Shutdown`] token is shared by the signal listener, the accept loop and
//! the running session.  The session polls it between receives; the accept
//! loop awaits it.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable shutdown request flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask everything holding this token to stop.  Idempotent.
    pub fn request(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once [`request`](Self::request) has been called.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }
}

/// Spawn a task that requests shutdown on SIGINT or SIGTERM.
///
/// Must be called from within a tokio runtime.
pub fn listen_for_signals(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => log::info!("Caught SIGINT, exiting"),
            _ = terminate.recv() => log::info!("Caught SIGTERM, exiting"),
        }
        shutdown.request();
    }))
}
