//! Coordination backend API.
//!
//! Servers publish themselves and clients discover them through a small
//! hierarchical node store with sessions, ephemeral nodes and one-shot watches
//! (ZooKeeper semantics). Everything above this module talks to the backend
//! only through the [`Coordinator`] trait:
//!
//! - [`ZkCoordinator`] talks to a real ZooKeeper ensemble
//! - [`MemoryEnsemble`] keeps the node tree in process, for tests and demos
//!
//! # Node Layout
//!
//! ```text
//! /demo                      persistent root
//! /demo/rpc0000000000        ephemeral sequential, {"host": "...", "port": ...}
//! /demo/rpc0000000001        one node per running server group
//! ```

pub mod memory;
#[cfg(feature = "zookeeper")]
pub mod zk;

pub use memory::{MemoryEnsemble, MemorySession};
#[cfg(feature = "zookeeper")]
pub use zk::ZkCoordinator;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::error::{ForkrpcError, Result};

/// Default coordination backend address
pub const DEFAULT_REGISTRY_HOSTS: &str = "127.0.0.1:2181";

/// Default root path under which instances register
pub const DEFAULT_ROOT: &str = "/demo";

/// Name prefix of each instance node; the backend appends a sequence number
pub const INSTANCE_NODE_PREFIX: &str = "rpc";

/// Default session timeout negotiated with the backend
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Host and port of one running server group.
///
/// Serialized into the registry as `{"host": ..., "port": ...}` and displayed
/// as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceAddr {
    pub host: String,
    pub port: u16,
}

impl InstanceAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Encodes the address as the value of a registry node.
    pub fn to_node_data(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes the value of a registry node.
    pub fn from_node_data(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl fmt::Display for InstanceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for InstanceAddr {
    type Err = ForkrpcError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ForkrpcError::InvalidRequest(format!("Expected host:port, got '{}'", s)))?;
        let port = port
            .parse()
            .map_err(|e| ForkrpcError::InvalidRequest(format!("Invalid port in '{}': {}", s, e)))?;
        Ok(Self::new(host, port))
    }
}

/// What a fired watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
    /// Session state change (connected, expired, closed)
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: Option<String>,
}

/// One-shot watch callback. Fires at most once; a caller that wants further
/// notifications installs a new watch when it re-reads.
pub type Watch = Box<dyn FnOnce(WatchEvent) + Send + 'static>;

/// The node API consumed from the coordination backend.
///
/// Every handle owns one session. Ephemeral nodes created through a handle
/// live exactly as long as its session.
pub trait Coordinator: Send + Sync {
    /// Creates `path` and any missing ancestors as persistent nodes.
    /// Succeeds if the path already exists.
    fn ensure_path(&self, path: &str) -> Result<()>;

    /// Creates an ephemeral node named `path` plus a backend-assigned
    /// monotonically increasing suffix, and returns the full path created.
    fn create_ephemeral_sequential(&self, path: &str, data: &[u8]) -> Result<String>;

    /// Lists the child names of `path`, optionally installing a one-shot
    /// watch that fires when the child set changes.
    fn get_children(&self, path: &str, watch: Option<Watch>) -> Result<Vec<String>>;

    /// Reads the value of the node at `path`.
    fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Ends the session, removing every ephemeral node it owns.
    fn close(&self) -> Result<()>;
}

/// Joins a parent path and a child name.
pub fn child_path(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Where the coordination backend lives and which subtree to use.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Comma separated `host:port` list of backend servers
    pub hosts: String,
    /// Root path holding one child per live server group
    pub root: String,
    /// Session timeout; ephemeral nodes of a crashed process vanish after it
    pub session_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            hosts: DEFAULT_REGISTRY_HOSTS.to_string(),
            root: DEFAULT_ROOT.to_string(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

impl RegistryConfig {
    pub fn with_hosts(mut self, hosts: impl Into<String>) -> Self {
        self.hosts = hosts.into();
        self
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Path prefix for this instance's ephemeral sequential node.
    pub fn instance_prefix(&self) -> String {
        child_path(&self.root, INSTANCE_NODE_PREFIX)
    }
}

/// Opens a session with the configured backend.
///
/// # Errors
///
/// Returns [`ForkrpcError::RegistryUnavailable`] if the backend cannot be
/// reached, or if this build has no ZooKeeper support.
pub fn connect(config: &RegistryConfig) -> Result<Arc<dyn Coordinator>> {
    #[cfg(feature = "zookeeper")]
    {
        let coordinator = ZkCoordinator::connect(config)?;
        Ok(Arc::new(coordinator))
    }

    #[cfg(not(feature = "zookeeper"))]
    {
        Err(ForkrpcError::RegistryUnavailable(format!(
            "cannot reach {}: built without the zookeeper feature",
            config.hosts
        )))
    }
}
