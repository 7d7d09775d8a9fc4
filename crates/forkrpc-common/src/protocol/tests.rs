//! Tests for the protocol module
//!
//! These verify the exact JSON field names used on the wire and the
//! behavior of protocol-error replies.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;

    #[test]
    fn test_request_creation() {
        let req = Request::new("ping", json!("hello"));
        assert_eq!(req.method, "ping");
        assert_eq!(req.params, json!("hello"));
    }

    #[test]
    fn test_request_wire_field_names() {
        let req = Request::new("pi", json!(10000));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"in": "pi", "params": 10000}));
    }

    #[test]
    fn test_request_parses_from_wire_json() {
        let req: Request = serde_json::from_str(r#"{"in":"ping","params":"hello 3"}"#).unwrap();
        assert_eq!(req, Request::new("ping", json!("hello 3")));
    }

    #[test]
    fn test_request_missing_method_is_rejected() {
        let result = serde_json::from_str::<Request>(r#"{"params": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_wire_field_names() {
        let resp = Response::new("pong", json!("hello 3"));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"out": "pong", "result": "hello 3"}));
    }

    #[test]
    fn test_response_error_shape() {
        let resp = Response::error(error_kind::UNKNOWN_METHOD, "no handler for 'nope'");
        assert!(resp.is_error());
        assert_eq!(resp.tag, ERROR_TAG);
        assert_eq!(resp.result["kind"], json!("unknown_method"));
        assert_eq!(resp.result["message"], json!("no handler for 'nope'"));
    }

    #[test]
    fn test_regular_response_is_not_error() {
        let resp = Response::new("fibonaqi", json!(55));
        assert!(!resp.is_error());
        assert_eq!(resp.into_parts(), ("fibonaqi".to_string(), json!(55)));
    }

    #[test]
    fn test_transport_error_classification() {
        assert!(ForkrpcError::RpcTransport("reset".into()).is_transport());
        assert!(ForkrpcError::OpenFailed {
            addr: "127.0.0.1:1".into(),
            reason: "refused".into()
        }
        .is_transport());
        assert!(!ForkrpcError::UnknownMethod("nope".into()).is_transport());
        assert!(!ForkrpcError::NoEndpoints.is_transport());
    }

    #[test]
    fn test_error_display_messages() {
        let err = ForkrpcError::FrameTooLarge { len: 10, max: 5 };
        assert_eq!(err.to_string(), "Frame too large: 10 bytes (max 5 bytes)");

        let err = ForkrpcError::UnknownMethod("sum".into());
        assert_eq!(err.to_string(), "Unknown method: sum");
    }
}
