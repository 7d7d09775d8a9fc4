use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::protocol::error::{ForkrpcError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::JsonCodec;
use crate::transport::framer::{encode_frame, DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN};

/// Default timeout for establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking TCP transport used by clients.
///
/// One request is written, then the caller blocks until the matching
/// response has been read. There is no pipelining.
///
/// # Timeouts
///
/// `connect_timeout` bounds connection establishment. `io_timeout` bounds each
/// read and write; it is `None` by default, so a hung peer blocks the caller
/// until the connection breaks.
///
/// # Example
///
/// ```no_run
/// use forkrpc_common::transport::TcpTransport;
/// use forkrpc_common::protocol::Request;
/// use serde_json::json;
///
/// let transport = TcpTransport::new();
/// let mut stream = transport.connect("127.0.0.1:8080").unwrap();
///
/// let request = Request::new("ping", json!("hello"));
/// let response = transport.send_request(&mut stream, &request).unwrap();
/// assert_eq!(response.tag, "pong");
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Creates a transport with the default connect timeout and no I/O timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            io_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
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

    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ForkrpcError::OpenFailed`] if the address cannot be resolved
    /// or no resolved address accepts the connection.
    pub fn connect(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs = addr.to_socket_addrs().map_err(|e| ForkrpcError::OpenFailed {
            addr: addr.to_string(),
            reason: format!("invalid address: {}", e),
        })?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            let attempt = match self.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout),
                None => TcpStream::connect(socket_addr),
            };
            match attempt {
                Ok(stream) => {
                    self.configure(&stream).map_err(|e| ForkrpcError::OpenFailed {
                        addr: addr.to_string(),
                        reason: e.to_string(),
                    })?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(ForkrpcError::OpenFailed {
            addr: addr.to_string(),
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "address resolved to nothing".to_string()),
        })
    }

    fn configure(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        Ok(())
    }

    /// Sends a request and waits for its response.
    pub fn send_request(&self, stream: &mut TcpStream, request: &Request) -> Result<Response> {
        let encoded = JsonCodec::encode_request(request)?;
        Self::send_message(stream, &encoded)?;

        let response_data = self.receive_message(stream)?;
        JsonCodec::decode_response(&response_data).map_err(|e| {
            ForkrpcError::InvalidResponse(format!("undecodable response payload: {}", e))
        })
    }

    /// Writes one length-prefixed message.
    pub fn send_message<W: Write>(stream: &mut W, data: &[u8]) -> Result<()> {
        let frame = encode_frame(data)?;

        stream
            .write_all(&frame)
            .map_err(|e| Self::map_io_error(e, "writing request"))?;
        stream
            .flush()
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one length-prefixed message, blocking until it is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Reading the length prefix or the payload fails
    /// - The payload exceeds the configured maximum
    pub fn receive_message<R: Read>(&self, stream: &mut R) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
        stream
            .read_exact(&mut len_buf)
            .map_err(|e| Self::map_io_error(e, "reading length prefix"))?;

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_len {
            return Err(ForkrpcError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .map_err(|e| Self::map_io_error(e, "reading response"))?;

        Ok(buf)
    }

    /// Every I/O failure on an established connection is a transport error.
    fn map_io_error(err: std::io::Error, context: &str) -> ForkrpcError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ForkrpcError::RpcTransport(format!("{}: timed out", context))
            }
            std::io::ErrorKind::UnexpectedEof => {
                ForkrpcError::RpcTransport(format!("{}: connection closed by peer", context))
            }
            _ => ForkrpcError::RpcTransport(format!("{}: {}", context, err)),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}
