//! The supervising process of a server group.
//!
//! ```text
//! Starting -> Spawning -> Serving -> ShuttingDown -> Terminated
//! ```
//!
//! The supervisor binds the listening socket, spawns the workers that share
//! it, registers the group in the registry and then only watches: SIGCHLD
//! triggers reaping, SIGINT or SIGTERM triggers shutdown. It never serves a
//! request itself.

use std::fmt;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use forkrpc_common::registry::Coordinator;
use forkrpc_common::{ForkrpcError, Result};

use crate::config::ServerConfig;
use crate::pool::{WorkerCommand, WorkerPool};
use crate::registration::Registration;
use crate::role::share_listener;
use crate::signals::TerminationSignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Spawning,
    Serving,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Starting => "starting",
            SupervisorState::Spawning => "spawning",
            SupervisorState::Serving => "serving",
            SupervisorState::ShuttingDown => "shutting_down",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What a completed supervisor run did.
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    /// Address the listening socket was bound to
    pub local_addr: SocketAddr,
    /// Registry node that was published and removed
    pub node_path: String,
    /// Every worker spawned during the run
    pub workers: Vec<Pid>,
}

pub struct Supervisor {
    config: ServerConfig,
    command: WorkerCommand,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(config: ServerConfig, command: WorkerCommand) -> Self {
        Self {
            config,
            command,
            state: SupervisorState::Starting,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, next: SupervisorState) {
        info!(pid = std::process::id(), from = %self.state, to = %next, "Supervisor state change");
        self.state = next;
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self, coordinator: Arc<dyn Coordinator>) -> Result<SupervisorReport> {
        let mut signals = TerminationSignals::install()?;
        self.run_until(coordinator, async move {
            let name = signals.recv().await;
            info!(signal = name, "Termination requested");
        })
        .await
    }

    /// Runs until `shutdown` completes.
    ///
    /// On return the registry node is gone, the listening socket is closed
    /// and every worker has been reaped.
    ///
    /// # Errors
    ///
    /// Binding, spawning and registration failures are fatal and returned
    /// before serving starts; workers spawned by then are stopped first.
    pub async fn run_until<F>(mut self, coordinator: Arc<dyn Coordinator>, shutdown: F) -> Result<SupervisorReport>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr())?;
        let local_addr = listener.local_addr()?;
        let listen_fd = share_listener(&listener)?;
        info!(addr = %local_addr, "Listening");

        // Subscribe before spawning so no child exit is missed.
        let mut child_exits = signal(SignalKind::child())?;

        self.transition(SupervisorState::Spawning);
        let command = self.command.clone();
        let workers = self.config.workers;
        let mut pool = tokio::task::spawn_blocking(move || WorkerPool::spawn(&command, workers, Some(listen_fd)))
            .await
            .map_err(join_error)??;
        let spawned = pool.pids();

        let addr = self.config.advertised_addr(local_addr.port());
        let root = self.config.registry.root.clone();
        let registered = tokio::task::spawn_blocking(move || Registration::register(coordinator, &root, addr))
            .await
            .map_err(join_error)?;
        let mut registration = match registered {
            Ok(registration) => registration,
            Err(e) => {
                warn!(error = %e, "Registration failed, stopping workers");
                self.stop_workers(pool).await?;
                return Err(e);
            }
        };

        self.transition(SupervisorState::Serving);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = child_exits.recv() => {
                    for (pid, status) in pool.reap() {
                        warn!(pid = %pid, status = ?status, "Worker exited");
                    }
                    if pool.is_empty() {
                        warn!("No workers left; the group accepts no connections");
                    }
                }
            }
        }

        self.transition(SupervisorState::ShuttingDown);
        let node_path = registration.node_path().to_string();
        let deregistered = tokio::task::spawn_blocking(move || registration.deregister())
            .await
            .map_err(join_error)?;
        if let Err(e) = deregistered {
            warn!(error = %e, "Continuing shutdown without deregistration");
        }
        drop(listener);
        self.stop_workers(pool).await?;

        self.transition(SupervisorState::Terminated);
        Ok(SupervisorReport {
            local_addr,
            node_path,
            workers: spawned,
        })
    }

    async fn stop_workers(&self, mut pool: WorkerPool) -> Result<()> {
        let grace = self.config.shutdown_grace;
        tokio::task::spawn_blocking(move || pool.shutdown(grace))
            .await
            .map_err(join_error)?
    }
}

fn join_error(err: tokio::task::JoinError) -> ForkrpcError {
    ForkrpcError::Io(std::io::Error::other(err))
}
