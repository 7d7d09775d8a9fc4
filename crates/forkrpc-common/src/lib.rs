//! forkrpc Common Types and Transport
//!
//! This crate provides the protocol definitions, stream framing, blocking TCP
//! transport and coordination-backend API shared by forkrpc servers and
//! clients.
//!
//! # Overview
//!
//! forkrpc is a small RPC framework with dynamic service discovery. A server
//! group (one supervisor plus a pool of pre-forked worker processes) registers
//! an ephemeral node in a ZooKeeper-style registry; clients watch the registry
//! and call a randomly chosen live server.
//!
//! # Wire Protocol
//!
//! - **Transport**: TCP, one request answered before the next is read
//! - **Serialization**: JSON
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Request**: `{"in": "<method>", "params": <any>}`
//! - **Response**: `{"out": "<tag>", "result": <any>}`
//!
//! # Components
//!
//! - [`protocol`] - Request/Response types and the error taxonomy
//! - [`transport`] - Framer, JSON codec and blocking TCP transport
//! - [`registry`] - Coordination backend trait, in-memory and ZooKeeper backends
//!
//! # Example
//!
//! ```
//! use forkrpc_common::{Request, Response};
//! use forkrpc_common::transport::{Framer, JsonCodec};
//! use serde_json::json;
//!
//! let request = Request::new("ping", json!("hello 3"));
//! let payload = JsonCodec::encode_request(&request).unwrap();
//!
//! let mut framer = Framer::new();
//! let frame = framer.encode(&payload).unwrap();
//! let decoded = framer.feed(&frame).unwrap();
//! assert_eq!(JsonCodec::decode_request(&decoded[0]).unwrap(), request);
//!
//! let reply = Response::new("pong", request.params);
//! assert_eq!(reply.tag, "pong");
//! ```

pub mod protocol;
pub mod registry;
pub mod transport;

pub use protocol::*;
pub use registry::{Coordinator, InstanceAddr, RegistryConfig};
