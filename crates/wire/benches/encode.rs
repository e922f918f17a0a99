use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use http::header::{CONTENT_TYPE, SERVER};
use http::{HeaderMap, HeaderValue, StatusCode};
use micro_wire::codec::ResponseEncoder;
use micro_wire::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, response_head};
use std::hint::black_box;
use tokio_util::codec::Encoder;

type Item = Message<(ResponseHead, PayloadSize)>;

fn head() -> ResponseHead {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    headers.insert(SERVER, HeaderValue::from_static("micro-wire"));
    response_head(StatusCode::OK, headers)
}

fn encode(c: &mut Criterion) {
    let chunk = Bytes::from(vec![b'x'; 4096]);

    c.bench_function("encode/length", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut dst = BytesMut::with_capacity(8 * 1024);
            encoder.encode(Item::Header((head(), PayloadSize::Length(4096))), &mut dst).unwrap();
            encoder.encode(Item::Payload(PayloadItem::Chunk(chunk.clone())), &mut dst).unwrap();
            encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();
            black_box(dst)
        });
    });

    c.bench_function("encode/chunked", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut dst = BytesMut::with_capacity(32 * 1024);
            encoder.encode(Item::Header((head(), PayloadSize::Chunked)), &mut dst).unwrap();
            for _ in 0..4 {
                encoder.encode(Item::Payload(PayloadItem::Chunk(chunk.clone())), &mut dst).unwrap();
            }
            encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();
            black_box(dst)
        });
    });
}

criterion_group!(benches, encode);
criterion_main!(benches);
