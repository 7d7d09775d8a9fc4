//! Worker accept loop over real loopback sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use forkrpc_common::transport::{encode_frame, JsonCodec, TcpTransport};
use forkrpc_common::{Request, Response};
use forkrpc_server::{Dispatcher, Worker};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct RunningWorker {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<forkrpc_common::Result<()>>,
}

impl RunningWorker {
    async fn start() -> Self {
        Self::start_with(Dispatcher::with_builtin_handlers()).await
    }

    async fn start_with(dispatcher: Dispatcher) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let worker = Worker::new(listener, Arc::new(dispatcher), 1024 * 1024, 0);
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(worker.run_until(async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, handle }
    }

    async fn stop(self) {
        self.stop.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

/// One blocking request/response exchange through the client transport.
async fn call(addr: SocketAddr, request: Request) -> Response {
    tokio::task::spawn_blocking(move || {
        let transport = TcpTransport::new();
        let mut stream = transport.connect(&addr.to_string()).unwrap();
        transport.send_request(&mut stream, &request).unwrap()
    })
    .await
    .unwrap()
}

async fn read_reply(stream: &mut TcpStream) -> Response {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut body).await.unwrap();
    JsonCodec::decode_response(&body).unwrap()
}

async fn send(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(&encode_frame(payload).unwrap()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_scenario() {
    let worker = RunningWorker::start().await;

    let response = call(worker.addr, Request::new("ping", json!("hello 3"))).await;
    assert_eq!(response, Response::new("pong", json!("hello 3")));

    worker.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pi_scenario() {
    let worker = RunningWorker::start().await;

    let response = call(worker.addr, Request::new("pi", json!(0))).await;
    assert_eq!(response.tag, "pi_r");
    assert!((response.result.as_f64().unwrap() - 2.8284271247461903).abs() < 1e-12);

    worker.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fibonaqi_scenario() {
    let worker = RunningWorker::start().await;

    let response = call(worker.addr, Request::new("fibonaqi", json!(10))).await;
    assert_eq!(response, Response::new("fibonaqi", json!(55)));

    worker.stop().await;
}

#[tokio::test]
async fn test_fragmented_and_batched_requests() {
    let worker = RunningWorker::start().await;
    let mut stream = TcpStream::connect(worker.addr).await.unwrap();
    stream.set_nodelay(true).unwrap();

    // First request split inside the prefix, the second glued to its tail.
    let mut wire = encode_frame(br#"{"in":"ping","params":"one"}"#).unwrap().to_vec();
    wire.extend_from_slice(&encode_frame(br#"{"in":"ping","params":"two"}"#).unwrap());
    for piece in [&wire[..2], &wire[2..17], &wire[17..]] {
        stream.write_all(piece).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(read_reply(&mut stream).await.result, json!("one"));
    assert_eq!(read_reply(&mut stream).await.result, json!("two"));

    drop(stream);
    worker.stop().await;
}

#[tokio::test]
async fn test_unknown_method_keeps_connection_serving() {
    let worker = RunningWorker::start().await;
    let mut stream = TcpStream::connect(worker.addr).await.unwrap();

    send(&mut stream, br#"{"in":"nope","params":null}"#).await;
    let reply = read_reply(&mut stream).await;
    assert!(reply.is_error());
    assert_eq!(reply.result["kind"], "unknown_method");

    send(&mut stream, br#"{"in":"ping","params":"after"}"#).await;
    assert_eq!(read_reply(&mut stream).await, Response::new("pong", json!("after")));

    drop(stream);
    worker.stop().await;
}

#[tokio::test]
async fn test_malformed_json_gets_bad_request_reply() {
    let worker = RunningWorker::start().await;
    let mut stream = TcpStream::connect(worker.addr).await.unwrap();

    send(&mut stream, b"{\"in\": ").await;
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply.result["kind"], "bad_request");

    drop(stream);
    worker.stop().await;
}

#[tokio::test]
async fn test_connections_are_served_concurrently() {
    let worker = RunningWorker::start().await;
    let mut idle = TcpStream::connect(worker.addr).await.unwrap();
    let mut busy = TcpStream::connect(worker.addr).await.unwrap();

    // A connection that has sent half a message does not block another one.
    idle.write_all(&[0, 0]).await.unwrap();
    send(&mut busy, br#"{"in":"ping","params":"busy"}"#).await;
    assert_eq!(read_reply(&mut busy).await.result, json!("busy"));

    drop(idle);
    drop(busy);
    worker.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let worker = RunningWorker::start().await;
    let addr = worker.addr;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, br#"{"in":"ping","params":1}"#).await;
    read_reply(&mut stream).await;

    worker.stop().await;

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_slow_handler_does_not_stall_other_connections() {
    let mut dispatcher = Dispatcher::with_builtin_handlers();
    dispatcher.register_fn("slow", |params| {
        std::thread::sleep(Duration::from_secs(2));
        Ok(Response::new("slow", params))
    });
    let worker = RunningWorker::start_with(dispatcher).await;

    let mut slow = TcpStream::connect(worker.addr).await.unwrap();
    let mut quick = TcpStream::connect(worker.addr).await.unwrap();

    send(&mut slow, br#"{"in":"slow","params":1}"#).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    send(&mut quick, br#"{"in":"ping","params":"quick"}"#).await;
    let reply = tokio::time::timeout(Duration::from_secs(1), read_reply(&mut quick))
        .await
        .expect("ping waited for the slow handler");
    assert_eq!(reply.result, json!("quick"));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(read_reply(&mut slow).await, Response::new("slow", json!(1)));

    drop(slow);
    drop(quick);
    worker.stop().await;
}
