//! forkrpc Response Types
//!
//! This module defines the RPC response structure.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// Tag reserved for protocol-error replies.
pub const ERROR_TAG: &str = "error";

/// Error kinds carried in the `result` of an [`ERROR_TAG`] reply.
pub mod error_kind {
    pub const UNKNOWN_METHOD: &str = "unknown_method";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const HANDLER_FAILED: &str = "handler_failed";
}

/// An RPC response returned from a worker to the client.
///
/// # Wire Shape
///
/// ```text
/// {"out": "<tag>", "result": <any JSON>}
/// ```
///
/// The tag names what kind of value `result` holds (`"pong"`, `"pi_r"`, ...).
/// A tag of [`ERROR_TAG`] marks a protocol-error reply whose result is
/// `{"kind": ..., "message": ...}`.
///
/// # Example
///
/// ```
/// use forkrpc_common::protocol::responses::Response;
/// use serde_json::json;
///
/// let pong = Response::new("pong", json!("hello 3"));
/// assert_eq!(pong.tag, "pong");
///
/// let err = Response::error("unknown_method", "no handler for 'nope'");
/// assert!(err.is_error());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Result tag
    #[serde(rename = "out")]
    pub tag: String,
    /// Result value
    pub result: RpcResult,
}

impl Response {
    /// Creates a tagged result.
    pub fn new(tag: impl Into<String>, result: RpcResult) -> Self {
        Response {
            tag: tag.into(),
            result,
        }
    }

    /// Creates a protocol-error reply.
    ///
    /// # Arguments
    ///
    /// * `kind` - One of the [`error_kind`] constants
    /// * `message` - Human readable description
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Response {
            tag: ERROR_TAG.to_string(),
            result: json!({
                "kind": kind,
                "message": message.into(),
            }),
        }
    }

    /// Whether this is a protocol-error reply.
    pub fn is_error(&self) -> bool {
        self.tag == ERROR_TAG
    }

    /// Splits the response into its `(tag, result)` pair.
    pub fn into_parts(self) -> (String, RpcResult) {
        (self.tag, self.result)
    }
}
