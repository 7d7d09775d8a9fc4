//! ZooKeeper coordination backend.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};
use zookeeper::{Acl, CreateMode, WatchedEvent, WatchedEventType, Watcher, ZooKeeper, ZooKeeperExt};

use super::{Coordinator, RegistryConfig, Watch, WatchEvent, WatchEventKind};
use crate::protocol::error::Result;

/// Session-level watcher; only logs state changes.
struct SessionWatcher;

impl Watcher for SessionWatcher {
    fn handle(&self, event: WatchedEvent) {
        let event = convert(event);
        debug!(kind = ?event.kind, path = ?event.path, "ZooKeeper session event");
    }
}

fn convert(event: WatchedEvent) -> WatchEvent {
    let kind = match event.event_type {
        WatchedEventType::NodeCreated => WatchEventKind::NodeCreated,
        WatchedEventType::NodeDeleted => WatchEventKind::NodeDeleted,
        WatchedEventType::NodeDataChanged => WatchEventKind::NodeDataChanged,
        WatchedEventType::NodeChildrenChanged => WatchEventKind::NodeChildrenChanged,
        _ => WatchEventKind::Session,
    };
    WatchEvent {
        kind,
        path: event.path,
    }
}

/// Adapts a one-shot [`Watch`] to the callback the client library expects,
/// which it may call any number of times. Only the first event is delivered.
fn one_shot(watch: Watch) -> impl Fn(WatchedEvent) + Send + 'static {
    let watch = Mutex::new(Some(watch));
    move |event: WatchedEvent| {
        let pending = watch.lock().take();
        if let Some(watch) = pending {
            watch(convert(event));
        }
    }
}

/// A session with a ZooKeeper ensemble.
pub struct ZkCoordinator {
    zk: ZooKeeper,
}

impl ZkCoordinator {
    /// Connects to the ensemble named by `config.hosts`.
    pub fn connect(config: &RegistryConfig) -> Result<Self> {
        Self::connect_with(&config.hosts, config.session_timeout)
    }

    pub fn connect_with(hosts: &str, session_timeout: Duration) -> Result<Self> {
        let zk = ZooKeeper::connect(hosts, session_timeout, SessionWatcher)?;
        info!(hosts = %hosts, "Connected to ZooKeeper");
        Ok(Self { zk })
    }
}

impl Coordinator for ZkCoordinator {
    fn ensure_path(&self, path: &str) -> Result<()> {
        Ok(self.zk.ensure_path(path)?)
    }

    fn create_ephemeral_sequential(&self, path: &str, data: &[u8]) -> Result<String> {
        let created = self.zk.create(
            path,
            data.to_vec(),
            Acl::open_unsafe().clone(),
            CreateMode::EphemeralSequential,
        )?;
        Ok(created)
    }

    fn get_children(&self, path: &str, watch: Option<Watch>) -> Result<Vec<String>> {
        let children = match watch {
            Some(watch) => self.zk.get_children_w(path, one_shot(watch))?,
            None => self.zk.get_children(path, false)?,
        };
        Ok(children)
    }

    fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        let (data, _stat) = self.zk.get_data(path, false)?;
        Ok(data)
    }

    fn close(&self) -> Result<()> {
        self.zk.close()?;
        info!("ZooKeeper session closed");
        Ok(())
    }
}
