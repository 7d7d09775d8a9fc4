//! One remote server group as seen by the client.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use forkrpc_common::protocol::error_kind;
use forkrpc_common::transport::TcpTransport;
use forkrpc_common::{ForkrpcError, InstanceAddr, Request, Response, Result};

/// Connection held by an endpoint.
#[derive(Debug)]
enum ConnectionState {
    /// Not connected yet, or dropped after a failure.
    Absent,
    Open(TcpStream),
}

/// A lazily connected, self-healing connection to one server group.
///
/// The connection is opened on the first call. A transport failure drops it
/// and fails that call; the next call connects again. Calls are never retried
/// automatically.
///
/// Calls on one endpoint are serialized: each holds the connection for a full
/// request/response exchange.
///
/// # Example
///
/// ```no_run
/// use forkrpc_client::RemoteEndpoint;
/// use forkrpc_common::InstanceAddr;
/// use forkrpc_common::transport::TcpTransport;
///
/// let endpoint = RemoteEndpoint::new(InstanceAddr::new("127.0.0.1", 8080), TcpTransport::new());
/// assert!(!endpoint.is_connected());
///
/// let pong = endpoint.ping(serde_json::json!("hello")).unwrap();
/// assert_eq!(pong, "hello");
/// assert!(endpoint.is_connected());
/// ```
#[derive(Debug)]
pub struct RemoteEndpoint {
    addr: InstanceAddr,
    transport: TcpTransport,
    connection: Mutex<ConnectionState>,
    retired: AtomicBool,
}

impl RemoteEndpoint {
    pub fn new(addr: InstanceAddr, transport: TcpTransport) -> Self {
        Self {
            addr,
            transport,
            connection: Mutex::new(ConnectionState::Absent),
            retired: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &InstanceAddr {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.connection.lock(), ConnectionState::Open(_))
    }

    /// Whether discovery has dropped this endpoint from the table.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Drops the connection, if any. The next call reconnects.
    pub fn close(&self) {
        let mut state = self.connection.lock();
        if matches!(*state, ConnectionState::Open(_)) {
            debug!(addr = %self.addr, "Closing connection");
        }
        *state = ConnectionState::Absent;
    }

    /// Marks the endpoint dead and drops its connection.
    ///
    /// Never blocks: if a call is in flight, that call drops the connection
    /// when it finishes.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        if let Some(mut state) = self.connection.try_lock() {
            *state = ConnectionState::Absent;
        }
    }

    /// Calls `method` and returns the reply's `(tag, result)`.
    ///
    /// # Errors
    ///
    /// - [`ForkrpcError::OpenFailed`] if no connection could be opened
    /// - [`ForkrpcError::RpcTransport`] if the exchange failed; the connection
    ///   has been dropped, or the endpoint is retired
    /// - [`ForkrpcError::UnknownMethod`] or [`ForkrpcError::Remote`] if the
    ///   server answered with an error reply; the connection stays open
    pub fn call(&self, method: &str, params: Value) -> Result<(String, Value)> {
        let outcome = self.exchange(method, params);
        // A retire() that found the lock taken left the connection to us.
        if self.is_retired() {
            self.close();
        }
        outcome
    }

    fn exchange(&self, method: &str, params: Value) -> Result<(String, Value)> {
        let mut state = self.connection.lock();
        if self.is_retired() {
            *state = ConnectionState::Absent;
            return Err(ForkrpcError::RpcTransport(format!("endpoint {} retired", self.addr)));
        }

        let stream = self.ensure_open(&mut state)?;
        let request = Request::new(method, params);
        let result = self.transport.send_request(stream, &request);

        match result {
            Ok(response) if response.is_error() => Err(error_reply(method, response)),
            Ok(response) => Ok(response.into_parts()),
            Err(e) => {
                if e.is_transport() || matches!(e, ForkrpcError::InvalidResponse(_)) {
                    debug!(addr = %self.addr, method, error = %e, "Dropping broken connection");
                    *state = ConnectionState::Absent;
                }
                Err(e)
            }
        }
    }

    fn ensure_open<'a>(&self, state: &'a mut ConnectionState) -> Result<&'a mut TcpStream> {
        if matches!(state, ConnectionState::Absent) {
            let stream = self.transport.connect(&self.addr.to_string())?;
            info!(addr = %self.addr, "Connected");
            *state = ConnectionState::Open(stream);
        }
        match state {
            ConnectionState::Open(stream) => Ok(stream),
            ConnectionState::Absent => Err(ForkrpcError::RpcTransport(format!(
                "no connection to {}",
                self.addr
            ))),
        }
    }

    /// `ping(message)`; returns the echoed message.
    pub fn ping(&self, message: Value) -> Result<Value> {
        self.call_expecting("ping", message, "pong")
    }

    /// `pi(n)`; returns the approximation.
    pub fn pi(&self, n: i64) -> Result<f64> {
        let result = self.call_expecting("pi", json!(n), "pi_r")?;
        result
            .as_f64()
            .ok_or_else(|| ForkrpcError::InvalidResponse(format!("pi_r is not a number: {}", result)))
    }

    /// `fibonaqi(n)`; returns `fib(n)`.
    pub fn fibonaqi(&self, n: i64) -> Result<i64> {
        let result = self.call_expecting("fibonaqi", json!(n), "fibonaqi")?;
        result
            .as_i64()
            .ok_or_else(|| ForkrpcError::InvalidResponse(format!("fibonaqi is not an integer: {}", result)))
    }

    fn call_expecting(&self, method: &str, params: Value, tag: &str) -> Result<Value> {
        let (out, result) = self.call(method, params)?;
        if out != tag {
            return Err(ForkrpcError::InvalidResponse(format!(
                "{} replied '{}', expected '{}'",
                method, out, tag
            )));
        }
        Ok(result)
    }
}

fn error_reply(method: &str, response: Response) -> ForkrpcError {
    let kind = response.result["kind"].as_str().unwrap_or("unknown").to_string();
    let message = response.result["message"].as_str().unwrap_or_default().to_string();
    if kind == error_kind::UNKNOWN_METHOD {
        ForkrpcError::UnknownMethod(method.to_string())
    } else {
        ForkrpcError::Remote { kind, message }
    }
}
