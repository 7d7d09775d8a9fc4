//! forkrpc Server
//!
//! A pre-forked RPC server. One supervisor process binds the listening socket,
//! spawns a pool of worker processes that all accept on it, and publishes the
//! group in the registry as a single instance. Workers decode requests and
//! run them through a [`Dispatcher`].
//!
//! The same binary plays both roles; [`serve`] looks at the environment once
//! ([`Role::detect`]) and runs whichever this process is.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod handlers;
pub mod pool;
pub mod registration;
pub mod role;
pub mod signals;
pub mod supervisor;
pub mod worker;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, Handler};
pub use pool::{WorkerCommand, WorkerPool};
pub use registration::Registration;
pub use role::Role;
pub use supervisor::{Supervisor, SupervisorReport, SupervisorState};
pub use worker::Worker;

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tracing::info;

use forkrpc_common::{registry, Result};

/// Runs this process as a supervisor or a worker, whichever its environment
/// says, with the built-in handlers.
pub fn serve(config: ServerConfig) -> Result<()> {
    serve_with(config, Dispatcher::with_builtin_handlers)
}

/// Like [`serve`], with the dispatcher built by `dispatcher` in each worker.
pub fn serve_with<F>(config: ServerConfig, dispatcher: F) -> Result<()>
where
    F: FnOnce() -> Dispatcher,
{
    match Role::detect()? {
        Role::Supervisor => {
            let coordinator = registry::connect(&config.registry)?;
            let command = WorkerCommand::current_exe()?;
            let report = runtime()?.block_on(Supervisor::new(config, command).run(coordinator))?;
            info!(addr = %report.local_addr, workers = report.workers.len(), "Server group stopped");
            Ok(())
        }
        Role::Worker { listen_fd, index } => {
            let listener = role::adopt_listener(listen_fd)?;
            let dispatcher = Arc::new(dispatcher());
            let runtime = runtime()?;
            let result = runtime.block_on(async move {
                Worker::from_std(listener, dispatcher, config.max_frame_len, index)?
                    .run()
                    .await
            });
            // A handler still running on the blocking pool must not keep the
            // process alive after termination.
            runtime.shutdown_background();
            result
        }
    }
}

/// Both roles run on a single thread.
fn runtime() -> Result<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}
