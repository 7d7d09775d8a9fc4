use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use forkrpc_common::transport::{encode_frame, Framer, JsonCodec};
use forkrpc_common::Request;
use serde_json::json;

fn build_stream(messages: usize, payload_len: usize) -> Vec<u8> {
    let payload = vec![b'x'; payload_len];
    let mut stream = Vec::with_capacity(messages * (payload_len + 4));
    for _ in 0..messages {
        stream.extend_from_slice(&encode_frame(&payload).unwrap());
    }
    stream
}

fn bench_feed_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer_feed");

    for chunk in [64usize, 1024, 16 * 1024] {
        let stream = build_stream(256, 512);
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut framer = Framer::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += framer.feed(black_box(piece)).unwrap().len();
                }
                assert_eq!(count, 256);
            })
        });
    }

    group.finish();
}

fn bench_encode_request(c: &mut Criterion) {
    let request = Request::new("ping", json!("hello 3"));

    c.bench_function("encode_ping_request", |b| {
        b.iter(|| {
            let payload = JsonCodec::encode_request(black_box(&request)).unwrap();
            let frame: Bytes = encode_frame(&payload).unwrap();
            black_box(frame)
        })
    });
}

criterion_group!(benches, bench_feed_chunked, bench_encode_request);
criterion_main!(benches);
