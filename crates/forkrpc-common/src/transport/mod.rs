//! forkrpc Transport Layer
//!
//! This module frames protocol messages and moves them over TCP.
//!
//! # Architecture
//!
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON payload]`
//! - **Codec**: JSON serialization of [`Request`](crate::Request) and
//!   [`Response`](crate::Response)
//!
//! # Components
//!
//! - **[`Framer`]**: Incremental decoder for a byte stream that may split or
//!   coalesce messages arbitrarily (used by server workers)
//! - **[`JsonCodec`]**: Encode/decode protocol messages to JSON
//! - **[`TcpTransport`]**: Blocking request/response transport (used by clients)

pub mod codec;
pub mod framer;
pub mod tcp;

pub use codec::JsonCodec;
pub use framer::{encode_frame, Framer, DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN};
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};

#[cfg(test)]
mod tests;
