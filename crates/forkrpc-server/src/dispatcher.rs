//! Method-name to handler dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use forkrpc_common::protocol::error_kind;
use forkrpc_common::transport::JsonCodec;
use forkrpc_common::{ForkrpcError, Request, Response, Result};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::handlers::{Fibonaqi, Ping, Pi};

/// A remote procedure.
///
/// Handlers run on the blocking pool, one request at a time per connection,
/// so a slow handler delays later requests on its own connection only.
pub trait Handler: Send + Sync {
    fn handle(&self, params: Value) -> Result<Response>;
}

impl<F> Handler for F
where
    F: Fn(Value) -> Result<Response> + Send + Sync,
{
    fn handle(&self, params: Value) -> Result<Response> {
        self(params)
    }
}

/// Routes decoded requests to registered handlers.
///
/// # Example
///
/// ```
/// use forkrpc_server::Dispatcher;
/// use forkrpc_common::{Request, Response};
/// use serde_json::json;
///
/// let mut dispatcher = Dispatcher::new();
/// dispatcher.register_fn("double", |params| {
///     Ok(Response::new("doubled", json!(params.as_i64().unwrap_or(0) * 2)))
/// });
///
/// let response = dispatcher.handle(&Request::new("double", json!(21))).unwrap();
/// assert_eq!(response.result, json!(42));
/// ```
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher serving `ping`, `pi` and `fibonaqi`.
    pub fn with_builtin_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher
            .register("ping", Ping)
            .register("pi", Pi)
            .register("fibonaqi", Fibonaqi);
        dispatcher
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Response> + Send + Sync + 'static,
    {
        self.register(name, f)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Invokes the handler registered for `request.method`.
    ///
    /// # Errors
    ///
    /// [`ForkrpcError::UnknownMethod`] if nothing is registered under that
    /// name, otherwise whatever the handler returns.
    pub fn handle(&self, request: &Request) -> Result<Response> {
        let handler = self
            .handlers
            .get(&request.method)
            .ok_or_else(|| ForkrpcError::UnknownMethod(request.method.clone()))?;
        handler.handle(request.params.clone())
    }

    /// Decodes one request payload, handles it and encodes the reply.
    ///
    /// Always produces a reply. Undecodable payloads, unknown methods and
    /// handler failures become `"error"`-tagged responses so the connection
    /// can keep serving.
    pub fn dispatch(&self, payload: &[u8]) -> Vec<u8> {
        let response = match JsonCodec::decode_request(payload) {
            Ok(request) => {
                debug!(method = %request.method, params = %request.params, "Dispatching request");
                match self.handle(&request) {
                    Ok(response) => response,
                    Err(ForkrpcError::UnknownMethod(method)) => {
                        warn!(method = %method, "Unknown method");
                        Response::error(
                            error_kind::UNKNOWN_METHOD,
                            format!("no handler registered for '{}'", method),
                        )
                    }
                    Err(e) => {
                        warn!(method = %request.method, error = %e, "Handler failed");
                        Response::error(error_kind::HANDLER_FAILED, e.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed request payload");
                Response::error(error_kind::BAD_REQUEST, e.to_string())
            }
        };

        JsonCodec::encode_response(&response).unwrap_or_else(|e| {
            error!(error = %e, "Failed to encode response");
            UNENCODABLE_REPLY.to_vec()
        })
    }
}

const UNENCODABLE_REPLY: &[u8] =
    br#"{"out":"error","result":{"kind":"handler_failed","message":"response could not be encoded"}}"#;
