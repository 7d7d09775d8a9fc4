use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForkrpcError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Failed to open connection to {addr}: {reason}")]
    OpenFailed { addr: String, reason: String },

    #[error("RPC transport error: {0}")]
    RpcTransport(String),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker {0} already exited")]
    ReapRace(i32),

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    #[error("Frame too large: {len} bytes (max {max} bytes)")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Remote error ({kind}): {message}")]
    Remote { kind: String, message: String },

    #[error("No live endpoints")]
    NoEndpoints,

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for ForkrpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        ForkrpcError::InvalidRequest(err.to_string())
    }
}

#[cfg(feature = "zookeeper")]
impl From<zookeeper::ZkError> for ForkrpcError {
    fn from(err: zookeeper::ZkError) -> Self {
        ForkrpcError::RegistryUnavailable(err.to_string())
    }
}

impl ForkrpcError {
    /// Whether this error means the connection it happened on can no longer be
    /// trusted to be in sync with the peer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ForkrpcError::OpenFailed { .. }
                | ForkrpcError::RpcTransport(_)
                | ForkrpcError::FrameTooLarge { .. }
                | ForkrpcError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForkrpcError>;
