use std::time::Duration;

use forkrpc_common::registry::RegistryConfig;
use forkrpc_common::transport::{TcpTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME_LEN};

/// Delay before a failed registry fetch is retried
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Client configuration.
///
/// `io_timeout` defaults to `None`: a call against a hung server blocks until
/// the connection breaks. Set it to bound every read and write.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub registry: RegistryConfig,
    pub connect_timeout: Option<Duration>,
    pub io_timeout: Option<Duration>,
    pub max_frame_len: usize,
    pub retry_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            io_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// The transport every endpoint of this client uses.
    pub fn transport(&self) -> TcpTransport {
        TcpTransport::new()
            .with_connect_timeout(self.connect_timeout)
            .with_io_timeout(self.io_timeout)
            .with_max_frame_len(self.max_frame_len)
    }
}
