//! In-process coordination backend.
//!
//! A [`MemoryEnsemble`] holds one node tree shared by any number of
//! [`MemorySession`]s. It reproduces the parts of ZooKeeper that forkrpc
//! relies on: persistent and ephemeral nodes, sequential naming, one-shot
//! child watches, and removal of a session's ephemeral nodes when the session
//! is closed or dropped.
//!
//! Watches fire on the thread that performed the mutation, after the tree
//! lock has been released.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{child_path, Coordinator, Watch, WatchEvent, WatchEventKind};
use crate::protocol::error::{ForkrpcError, Result};

type SessionId = u64;

struct MemoryNode {
    data: Vec<u8>,
    owner: Option<SessionId>,
}

#[derive(Default)]
struct EnsembleState {
    nodes: BTreeMap<String, MemoryNode>,
    child_watches: HashMap<String, Vec<(SessionId, Watch)>>,
    sequences: HashMap<String, u64>,
    next_session: SessionId,
}

type Fired = Vec<(Watch, WatchEvent)>;

impl EnsembleState {
    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn create(&mut self, path: &str, data: Vec<u8>, owner: Option<SessionId>, fired: &mut Fired) -> Result<()> {
        let parent = parent_of(path)?;
        if !self.exists(parent) {
            return Err(ForkrpcError::RegistryUnavailable(format!("no node {}", parent)));
        }
        if self.exists(path) {
            return Err(ForkrpcError::RegistryUnavailable(format!("node {} already exists", path)));
        }
        if self.nodes.get(parent).is_some_and(|node| node.owner.is_some()) {
            return Err(ForkrpcError::RegistryUnavailable(format!(
                "ephemeral node {} cannot have children",
                parent
            )));
        }
        self.nodes.insert(path.to_string(), MemoryNode { data, owner });
        self.take_child_watches(parent, fired);
        Ok(())
    }

    fn remove(&mut self, path: &str, fired: &mut Fired) {
        if self.nodes.remove(path).is_some() {
            if let Ok(parent) = parent_of(path) {
                self.take_child_watches(parent, fired);
            }
        }
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|candidate| parent_of(candidate).map(|p| p == path).unwrap_or(false))
            .filter_map(|candidate| candidate.rsplit('/').next().map(str::to_string))
            .collect()
    }

    fn take_child_watches(&mut self, path: &str, fired: &mut Fired) {
        if let Some(watches) = self.child_watches.remove(path) {
            for (_, watch) in watches {
                fired.push((
                    watch,
                    WatchEvent {
                        kind: WatchEventKind::NodeChildrenChanged,
                        path: Some(path.to_string()),
                    },
                ));
            }
        }
    }
}

fn parent_of(path: &str) -> Result<&str> {
    if !path.starts_with('/') || path == "/" || path.ends_with('/') {
        return Err(ForkrpcError::InvalidRequest(format!("invalid node path '{}'", path)));
    }
    match path.rfind('/') {
        Some(0) => Ok("/"),
        Some(idx) => Ok(&path[..idx]),
        None => Err(ForkrpcError::InvalidRequest(format!("invalid node path '{}'", path))),
    }
}

fn fire(fired: Fired) {
    for (watch, event) in fired {
        watch(event);
    }
}

/// A shared in-memory node tree.
#[derive(Clone, Default)]
pub struct MemoryEnsemble {
    state: Arc<Mutex<EnsembleState>>,
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session against this tree.
    pub fn connect(&self) -> MemorySession {
        let id = {
            let mut state = self.state.lock();
            state.next_session += 1;
            state.next_session
        };
        debug!(session = id, "Memory session opened");
        MemorySession {
            ensemble: self.clone(),
            id,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether a node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().exists(path)
    }

    /// Creates a persistent node outside of any session.
    pub fn create_persistent(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut fired = Vec::new();
        let result = self.state.lock().create(path, data.to_vec(), None, &mut fired);
        fire(fired);
        result
    }

    /// Deletes a node regardless of its owner.
    pub fn delete(&self, path: &str) {
        let mut fired = Vec::new();
        self.state.lock().remove(path, &mut fired);
        fire(fired);
    }

    /// Number of watches currently installed on `path`.
    pub fn pending_watches(&self, path: &str) -> usize {
        self.state
            .lock()
            .child_watches
            .get(path)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// One session against a [`MemoryEnsemble`].
///
/// Dropping the session behaves like a crashed client: its ephemeral nodes
/// are removed and watchers of their parents are notified.
pub struct MemorySession {
    ensemble: MemoryEnsemble,
    id: SessionId,
    closed: AtomicBool,
}

impl MemorySession {
    pub fn session_id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ForkrpcError::RegistryUnavailable(format!(
                "session {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    fn expire(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut fired = Vec::new();
        {
            let mut state = self.ensemble.state.lock();
            for watches in state.child_watches.values_mut() {
                watches.retain(|(owner, _)| *owner != self.id);
            }
            let owned: Vec<String> = state
                .nodes
                .iter()
                .filter(|(_, node)| node.owner == Some(self.id))
                .map(|(path, _)| path.clone())
                .collect();
            for path in owned {
                state.remove(&path, &mut fired);
            }
        }
        debug!(session = self.id, "Memory session closed");
        fire(fired);
    }
}

impl Coordinator for MemorySession {
    fn ensure_path(&self, path: &str) -> Result<()> {
        self.check_open()?;
        parent_of(path)?;

        let mut fired = Vec::new();
        let result = {
            let mut state = self.ensemble.state.lock();
            let mut current = String::new();
            let mut result = Ok(());
            for component in path.split('/').filter(|c| !c.is_empty()) {
                current = child_path(if current.is_empty() { "/" } else { &current }, component);
                if !state.exists(&current) {
                    result = state.create(&current, Vec::new(), None, &mut fired);
                    if result.is_err() {
                        break;
                    }
                }
            }
            result
        };
        // Ancestors created before a failure still notify their watchers.
        fire(fired);
        result
    }

    fn create_ephemeral_sequential(&self, path: &str, data: &[u8]) -> Result<String> {
        self.check_open()?;
        let parent = parent_of(path)?.to_string();

        let mut fired = Vec::new();
        let created = {
            let mut state = self.ensemble.state.lock();
            let seq = state.sequences.entry(parent).or_insert(0);
            let created = format!("{}{:010}", path, *seq);
            *seq += 1;
            state.create(&created, data.to_vec(), Some(self.id), &mut fired)?;
            created
        };
        fire(fired);
        Ok(created)
    }

    fn get_children(&self, path: &str, watch: Option<Watch>) -> Result<Vec<String>> {
        self.check_open()?;
        let mut state = self.ensemble.state.lock();
        if !state.exists(path) {
            return Err(ForkrpcError::RegistryUnavailable(format!("no node {}", path)));
        }
        let children = state.children(path);
        if let Some(watch) = watch {
            state
                .child_watches
                .entry(path.to_string())
                .or_default()
                .push((self.id, watch));
        }
        Ok(children)
    }

    fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.check_open()?;
        self.ensemble
            .state
            .lock()
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| ForkrpcError::RegistryUnavailable(format!("no node {}", path)))
    }

    fn close(&self) -> Result<()> {
        self.expire();
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.expire();
    }
}
