//! Tests that drive the framer and codec together, the way a worker
//! decodes requests coming off a socket.

#[cfg(test)]
mod tests {
    use crate::protocol::{Request, Response};
    use crate::transport::{encode_frame, Framer, JsonCodec, TcpTransport};
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_requests_survive_byte_at_a_time_delivery() {
        let requests = vec![
            Request::new("ping", json!("hello 3")),
            Request::new("pi", json!(10000)),
            Request::new("fibonaqi", json!(10)),
        ];

        let mut wire = Vec::new();
        for request in &requests {
            let payload = JsonCodec::encode_request(request).unwrap();
            wire.extend_from_slice(&encode_frame(&payload).unwrap());
        }

        let mut framer = Framer::new();
        let mut decoded = Vec::new();
        for byte in &wire {
            for frame in framer.feed(std::slice::from_ref(byte)).unwrap() {
                decoded.push(JsonCodec::decode_request(&frame).unwrap());
            }
        }

        assert_eq!(decoded, requests);
    }

    #[test]
    fn test_blocking_transport_reads_what_framer_encodes() {
        let response = Response::new("pong", json!("hello 3"));
        let payload = JsonCodec::encode_response(&response).unwrap();
        let frame = Framer::new().encode(&payload).unwrap();

        let transport = TcpTransport::new();
        let read = transport.receive_message(&mut Cursor::new(frame.to_vec())).unwrap();
        assert_eq!(JsonCodec::decode_response(&read).unwrap(), response);
    }

    #[test]
    fn test_invalid_request_payload_returns_error() {
        let invalid_data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        assert!(JsonCodec::decode_request(&invalid_data).is_err());
    }
}
