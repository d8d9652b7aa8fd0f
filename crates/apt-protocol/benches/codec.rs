//! 编解码性能基准测试
//!
//! 覆盖单帧编码/解码以及带噪声的流式解包。

use apt_protocol::commands;
use apt_protocol::{EndPoint, Message, MessageId, Unpacker, Value, decode, encode};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn dc_status(position: i32) -> Message {
    Message::new(
        MessageId::MotGetDcStatusUpdate,
        EndPoint::Host,
        EndPoint::Bay0,
        [
            Value::U16(1),
            Value::I32(position),
            Value::I16(12),
            Value::U16(0),
            Value::U32(0x8000_0510),
        ],
    )
    .expect("valid status message")
}

fn bench_encode(c: &mut Criterion) {
    let short = commands::mot_move_home(EndPoint::Bay1, 1);
    let long = commands::mot_move_absolute(EndPoint::Bay1, 1, 123_456);

    c.bench_function("encode_short", |b| b.iter(|| encode(black_box(&short))));
    c.bench_function("encode_long", |b| b.iter(|| encode(black_box(&long))));
}

fn bench_decode(c: &mut Criterion) {
    let bytes = encode(&dc_status(1000)).expect("encode");
    c.bench_function("decode_dc_status", |b| b.iter(|| decode(black_box(&bytes))));
}

fn bench_unpacker(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut stream = Vec::new();
    for i in 0..1000 {
        stream.extend(encode(&dc_status(i)).expect("encode"));
        // 偶尔插入线路噪声
        if rng.gen_bool(0.05) {
            let noise: Vec<u8> = (0..rng.gen_range(1..8)).map(|_| rng.gen_range(0xF0..=0xFF)).collect();
            stream.extend(noise);
        }
    }

    let mut group = c.benchmark_group("unpacker");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("noisy_stream_64b_chunks", |b| {
        b.iter(|| {
            let mut unpacker = Unpacker::new();
            let mut count = 0usize;
            for chunk in stream.chunks(64) {
                unpacker.feed(chunk);
                count += unpacker.by_ref().count();
            }
            black_box(count)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_unpacker);
criterion_main!(benches);
