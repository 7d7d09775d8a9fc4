use std::sync::Arc;

use tracing::{info, warn};

use forkrpc_common::registry::{child_path, Coordinator, INSTANCE_NODE_PREFIX};
use forkrpc_common::{ForkrpcError, InstanceAddr, Result};

/// This server group's entry in the registry.
///
/// The entry is an ephemeral sequential node, so it disappears on its own if
/// the supervisor dies. [`Registration::deregister`] removes it immediately
/// on a graceful shutdown.
pub struct Registration {
    coordinator: Arc<dyn Coordinator>,
    addr: InstanceAddr,
    node_path: String,
    active: bool,
}

impl Registration {
    /// Publishes `addr` under `root`, creating `root` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ForkrpcError::RegistryUnavailable`] if the backend rejects
    /// either step.
    pub fn register(coordinator: Arc<dyn Coordinator>, root: &str, addr: InstanceAddr) -> Result<Self> {
        coordinator.ensure_path(root).map_err(unavailable)?;

        let data = addr.to_node_data()?;
        let node_path = coordinator
            .create_ephemeral_sequential(&child_path(root, INSTANCE_NODE_PREFIX), &data)
            .map_err(unavailable)?;

        info!(addr = %addr, node = %node_path, "Registered instance");
        Ok(Self {
            coordinator,
            addr,
            node_path,
            active: true,
        })
    }

    /// Full path of the node this registration created.
    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    pub fn addr(&self) -> &InstanceAddr {
        &self.addr
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Ends the registry session, removing the node. Idempotent.
    pub fn deregister(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        match self.coordinator.close() {
            Ok(()) => {
                info!(node = %self.node_path, "Deregistered instance");
                Ok(())
            }
            Err(e) => {
                warn!(node = %self.node_path, error = %e, "Deregistration failed; node expires with the session");
                Err(unavailable(e))
            }
        }
    }
}

fn unavailable(err: ForkrpcError) -> ForkrpcError {
    match err {
        ForkrpcError::RegistryUnavailable(_) => err,
        other => ForkrpcError::RegistryUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkrpc_common::registry::MemoryEnsemble;

    #[test]
    fn test_register_creates_root_and_node() {
        let ensemble = MemoryEnsemble::new();
        let session = Arc::new(ensemble.connect());

        let registration =
            Registration::register(session, "/demo", InstanceAddr::new("127.0.0.1", 9000)).unwrap();

        assert!(ensemble.exists("/demo"));
        assert_eq!(registration.node_path(), "/demo/rpc0000000000");

        let observer = ensemble.connect();
        let data = observer.get_data(registration.node_path()).unwrap();
        assert_eq!(
            InstanceAddr::from_node_data(&data).unwrap(),
            InstanceAddr::new("127.0.0.1", 9000)
        );
    }

    #[test]
    fn test_registrations_get_distinct_nodes() {
        let ensemble = MemoryEnsemble::new();
        let first = Registration::register(
            Arc::new(ensemble.connect()),
            "/demo",
            InstanceAddr::new("127.0.0.1", 9000),
        )
        .unwrap();
        let second = Registration::register(
            Arc::new(ensemble.connect()),
            "/demo",
            InstanceAddr::new("127.0.0.1", 9001),
        )
        .unwrap();

        assert_ne!(first.node_path(), second.node_path());
        let children = ensemble.connect().get_children("/demo", None).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_deregister_removes_node_and_is_idempotent() {
        let ensemble = MemoryEnsemble::new();
        let mut registration = Registration::register(
            Arc::new(ensemble.connect()),
            "/demo",
            InstanceAddr::new("127.0.0.1", 9000),
        )
        .unwrap();
        let node = registration.node_path().to_string();

        registration.deregister().unwrap();
        assert!(!ensemble.exists(&node));
        assert!(!registration.is_active());

        registration.deregister().unwrap();
    }

    #[test]
    fn test_register_on_closed_session_is_unavailable() {
        let ensemble = MemoryEnsemble::new();
        let session = Arc::new(ensemble.connect());
        session.close().unwrap();

        let result = Registration::register(session, "/demo", InstanceAddr::new("h", 1));
        assert!(matches!(result, Err(ForkrpcError::RegistryUnavailable(_))));
    }
}
