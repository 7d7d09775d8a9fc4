pub mod error;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use error::{ForkrpcError, Result};
pub use requests::{MethodName, Request, RpcParams};
pub use responses::{error_kind, Response, RpcResult, ERROR_TAG};
