use std::time::Duration;

use forkrpc_common::registry::RegistryConfig;
use forkrpc_common::transport::DEFAULT_MAX_FRAME_LEN;
use forkrpc_common::InstanceAddr;

/// Number of worker processes spawned by default
pub const DEFAULT_WORKERS: usize = 10;

/// How long workers get to exit after SIGTERM before they are killed
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for one server process group.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind the listening socket to
    pub host: String,
    /// Port to bind; 0 picks a free port
    pub port: u16,
    /// Worker processes sharing the listening socket
    pub workers: usize,
    /// Host published in the registry instead of `host`, e.g. when binding
    /// to `0.0.0.0`
    pub advertise_host: Option<String>,
    pub registry: RegistryConfig,
    pub max_frame_len: usize,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: DEFAULT_WORKERS,
            advertise_host: None,
            registry: RegistryConfig::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = Some(host.into());
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The address published for a listener bound to `port`.
    pub fn advertised_addr(&self, port: u16) -> InstanceAddr {
        let host = self.advertise_host.as_deref().unwrap_or(&self.host);
        InstanceAddr::new(host, port)
    }
}
