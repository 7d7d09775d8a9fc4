use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use forkrpc_common::Result;

use crate::connection::serve_connection;
use crate::dispatcher::Dispatcher;
use crate::signals::TerminationSignals;

/// Pause after a failed accept, e.g. when out of descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// One worker process's accept loop.
///
/// Every worker accepts on the same listening socket; the kernel hands each
/// incoming connection to exactly one of them. A worker never talks to the
/// registry.
pub struct Worker {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_frame_len: usize,
    index: usize,
}

impl Worker {
    pub fn new(listener: TcpListener, dispatcher: Arc<Dispatcher>, max_frame_len: usize, index: usize) -> Self {
        Self {
            listener,
            dispatcher,
            max_frame_len,
            index,
        }
    }

    /// Wraps an inherited std listener. Must be called inside a tokio runtime.
    pub fn from_std(
        listener: std::net::TcpListener,
        dispatcher: Arc<Dispatcher>,
        max_frame_len: usize,
        index: usize,
    ) -> Result<Self> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        Ok(Self::new(listener, dispatcher, max_frame_len, index))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let mut signals = TerminationSignals::install()?;
        self.run_until(async move {
            let name = signals.recv().await;
            info!(signal = name, "Termination requested");
        })
        .await
    }

    /// Serves until `shutdown` completes, then stops accepting and aborts
    /// every open connection.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Worker {
            listener,
            dispatcher,
            max_frame_len,
            index,
        } = self;
        let pid = std::process::id();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        info!(pid, index, state = "serving", "Worker started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let dispatcher = dispatcher.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, dispatcher, max_frame_len).await {
                                warn!(peer = %peer, error = %e, "Connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(pid, error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(pid, error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        }

        info!(pid, index, state = "shutting_down", open = connections.len(), "Worker stopping");
        drop(listener);
        connections.shutdown().await;
        info!(pid, index, state = "terminated", "Worker stopped");
        Ok(())
    }
}
