use tokio::signal::unix::{signal, Signal, SignalKind};

use forkrpc_common::Result;

/// SIGINT and SIGTERM listeners.
///
/// Installed eagerly so a termination request that arrives before the first
/// `recv` is still observed instead of killing the process.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl TerminationSignals {
    pub fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the next termination request and returns the signal's name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}
