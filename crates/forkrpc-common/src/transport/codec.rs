use crate::protocol::error::Result;
use crate::protocol::{Request, Response};

/// JSON codec for request and response payloads.
///
/// This only turns protocol messages into payload bytes and back; the length
/// prefix is added by the [`Framer`](super::Framer).
///
/// # Example
///
/// ```
/// use forkrpc_common::transport::JsonCodec;
/// use forkrpc_common::protocol::{Request, Response};
/// use serde_json::json;
///
/// let request = Request::new("ping", json!("hello"));
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// assert_eq!(JsonCodec::decode_request(&encoded).unwrap(), request);
///
/// let response = Response::new("pong", json!("hello"));
/// let encoded = JsonCodec::encode_response(&response).unwrap();
/// assert_eq!(JsonCodec::decode_response(&encoded).unwrap(), response);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request to payload bytes
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    /// Decode a request from payload bytes
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a response to payload bytes
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    /// Decode a response from payload bytes
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_payload_is_utf8_json() {
        let request = Request::new("ping", json!("hello 3"));
        let encoded = JsonCodec::encode_request(&request).unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.contains(r#""in":"ping""#));
        assert!(text.contains(r#""params":"hello 3""#));
    }

    #[test]
    fn test_complex_params() {
        let request = Request::new(
            "complex_method",
            json!({
                "nested": {
                    "array": [1, 2, 3, "four", null],
                    "boolean": true,
                    "number": 42.5
                },
                "null_value": null
            }),
        );

        let encoded = JsonCodec::encode_request(&request).unwrap();
        let decoded = JsonCodec::decode_request(&encoded).unwrap();

        assert_eq!(request, decoded);
    }

    #[test]
    fn test_error_response_round_trip() {
        let response = Response::error("bad_request", "expected an object");

        let encoded = JsonCodec::encode_response(&response).unwrap();
        let decoded = JsonCodec::decode_response(&encoded).unwrap();

        assert!(decoded.is_error());
        assert_eq!(response, decoded);
    }
}
