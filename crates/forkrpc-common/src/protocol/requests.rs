use serde::{Deserialize, Serialize};

pub type MethodName = String;
pub type RpcParams = serde_json::Value;

/// An RPC request as it travels inside one frame.
///
/// On the wire this is `{"in": <method>, "params": <value>}`. `params` is the
/// sole argument of the method and may be any JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    #[serde(rename = "in")]
    pub method: MethodName,
    pub params: RpcParams,
}

impl Request {
    pub fn new(method: impl Into<String>, params: RpcParams) -> Self {
        Request {
            method: method.into(),
            params,
        }
    }
}
