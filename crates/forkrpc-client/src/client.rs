use std::sync::Arc;

use serde_json::Value;

use forkrpc_common::registry::{self, Coordinator};
use forkrpc_common::{ForkrpcError, InstanceAddr, Result};

use crate::config::ClientConfig;
use crate::discovery::DiscoveryWatcher;
use crate::endpoint::RemoteEndpoint;
use crate::table::EndpointTable;

/// forkrpc client for making RPC calls
///
/// Discovers live server groups through the registry and sends each call to
/// one picked at random. Calls block the calling thread; the client can be
/// shared between threads.
///
/// # Example
///
/// ```no_run
/// use forkrpc_client::{ClientConfig, ForkrpcClient};
/// use serde_json::json;
///
/// let client = ForkrpcClient::connect(ClientConfig::default()).unwrap();
/// let (tag, result) = client.call("fibonaqi", json!(10)).unwrap();
/// assert_eq!((tag.as_str(), result), ("fibonaqi", json!(55)));
/// ```
pub struct ForkrpcClient {
    table: EndpointTable,
    watcher: DiscoveryWatcher,
    coordinator: Arc<dyn Coordinator>,
}

impl ForkrpcClient {
    /// Opens a registry session and starts discovery.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let coordinator = registry::connect(&config.registry)?;
        Self::with_coordinator(coordinator, config)
    }

    /// Starts discovery over an existing registry session.
    pub fn with_coordinator(coordinator: Arc<dyn Coordinator>, config: ClientConfig) -> Result<Self> {
        let table = EndpointTable::new(config.transport());
        let watcher = DiscoveryWatcher::start(
            coordinator.clone(),
            config.registry.root.clone(),
            table.clone(),
            config.retry_interval,
        )?;

        Ok(Self {
            table,
            watcher,
            coordinator,
        })
    }

    /// A uniformly random live endpoint, or `None` if there is none.
    pub fn random_endpoint(&self) -> Option<Arc<RemoteEndpoint>> {
        self.table.random()
    }

    /// Calls `method` once on a random live endpoint.
    ///
    /// # Errors
    ///
    /// [`ForkrpcError::NoEndpoints`] if no server is registered, otherwise
    /// whatever [`RemoteEndpoint::call`] returns.
    pub fn call(&self, method: &str, params: Value) -> Result<(String, Value)> {
        let endpoint = self.random_endpoint().ok_or(ForkrpcError::NoEndpoints)?;
        endpoint.call(method, params)
    }

    /// Addresses of the live endpoints.
    pub fn endpoints(&self) -> Vec<InstanceAddr> {
        self.table.addrs()
    }

    pub fn table(&self) -> &EndpointTable {
        &self.table
    }

    /// Stops discovery, drops every connection and ends the registry session.
    pub fn close(mut self) -> Result<()> {
        self.watcher.stop();
        self.table.clear();
        self.coordinator.close()
    }
}
