//! Watch-driven discovery of live server groups.
//!
//! Registry watches are one-shot. Every fetch lists the children of the root
//! and installs a fresh child watch in the same call; when it fires, the
//! watcher thread fetches again. Between the watch firing and the next fetch
//! the table may be briefly stale; it is never torn.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use forkrpc_common::registry::{child_path, Coordinator, Watch, WatchEvent};
use forkrpc_common::{ForkrpcError, InstanceAddr, Result};

use crate::table::{EndpointTable, TableDiff};

enum Notice {
    Changed(WatchEvent),
    Shutdown,
}

/// Keeps an [`EndpointTable`] in step with the registry.
///
/// Reconciliation happens on one dedicated thread, so updates are applied in
/// the order the registry reported them.
pub struct DiscoveryWatcher {
    notices: Sender<Notice>,
    thread: Option<JoinHandle<()>>,
}

impl DiscoveryWatcher {
    /// Fetches the current server set into `table` and starts watching.
    ///
    /// # Errors
    ///
    /// Returns [`ForkrpcError::RegistryUnavailable`] if the initial fetch
    /// fails. Later failures are logged and retried every `retry_interval`
    /// while the table keeps serving its last known state.
    pub fn start(
        coordinator: Arc<dyn Coordinator>,
        root: impl Into<String>,
        table: EndpointTable,
        retry_interval: Duration,
    ) -> Result<Self> {
        let (notices, received) = mpsc::channel();
        let fetcher = Fetcher {
            coordinator,
            root: root.into(),
            table,
            notices: notices.clone(),
        };

        fetcher.coordinator.ensure_path(&fetcher.root).map_err(unavailable)?;
        fetcher.fetch().map_err(unavailable)?;

        let thread = thread::Builder::new()
            .name("forkrpc-discovery".to_string())
            .spawn(move || fetcher.run(received, retry_interval))?;

        Ok(Self {
            notices,
            thread: Some(thread),
        })
    }

    /// Stops the watcher thread. The table keeps its last state.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.notices.send(Notice::Shutdown);
            if thread.join().is_err() {
                warn!("Discovery thread panicked");
            }
        }
    }
}

impl Drop for DiscoveryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Fetcher {
    coordinator: Arc<dyn Coordinator>,
    root: String,
    table: EndpointTable,
    notices: Sender<Notice>,
}

impl Fetcher {
    fn run(self, received: Receiver<Notice>, retry_interval: Duration) {
        let mut retrying = false;
        loop {
            let notice = if retrying {
                match received.recv_timeout(retry_interval) {
                    Ok(notice) => Some(notice),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            } else {
                match received.recv() {
                    Ok(notice) => Some(notice),
                    Err(_) => return,
                }
            };

            match notice {
                Some(Notice::Shutdown) => {
                    debug!("Discovery stopped");
                    return;
                }
                Some(Notice::Changed(event)) => {
                    debug!(kind = ?event.kind, path = ?event.path, "Registry changed");
                }
                None => debug!("Retrying registry fetch"),
            }

            match self.fetch() {
                Ok(_) => retrying = false,
                Err(e) => {
                    warn!(root = %self.root, error = %e, "Registry fetch failed; serving stale endpoints");
                    retrying = true;
                }
            }
        }
    }

    /// Lists the live servers, re-arms the child watch and reconciles.
    fn fetch(&self) -> Result<TableDiff> {
        let notices = self.notices.clone();
        let watch: Watch = Box::new(move |event: WatchEvent| {
            let _ = notices.send(Notice::Changed(event));
        });

        let children = self.coordinator.get_children(&self.root, Some(watch))?;
        let mut live = Vec::with_capacity(children.len());
        for child in children {
            let path = child_path(&self.root, &child);
            let addr = self
                .coordinator
                .get_data(&path)
                .and_then(|data| InstanceAddr::from_node_data(&data));
            match addr {
                Ok(addr) => live.push(addr),
                Err(e) => warn!(node = %path, error = %e, "Skipping unreadable registry node"),
            }
        }

        let changes = self.table.reconcile(&live);
        if !changes.is_empty() {
            info!(
                added = ?changes.added,
                removed = ?changes.removed,
                live = self.table.len(),
                "Endpoint table updated"
            );
        }
        Ok(changes)
    }
}

fn unavailable(err: ForkrpcError) -> ForkrpcError {
    match err {
        ForkrpcError::RegistryUnavailable(_) => err,
        other => ForkrpcError::RegistryUnavailable(other.to_string()),
    }
}
