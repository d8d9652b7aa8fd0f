//! 传输层集成测试
//!
//! 使用模拟串口验证：
//! - 并发发送不会在线上交错
//! - 噪声字节被跳过后后续消息仍被正确分发
//! - 设备错误通过错误回调送达

use std::sync::Arc;
use std::time::Duration;

use apt_sdk::driver::{Addressing, ConnectionBuilder, Event, Filter, PipelineConfig};
use apt_sdk::protocol::{EndPoint, Message, MessageId, Unpacker, Value, commands, encode};
use apt_sdk::serial::MockSerial;
use crossbeam_channel::bounded;
use serial_test::serial;

fn quiet_config() -> PipelineConfig {
    PipelineConfig {
        keepalive_interval: None,
        ..PipelineConfig::default()
    }
}

#[test]
#[serial]
fn test_concurrent_sends_never_interleave() {
    const THREADS: i32 = 8;
    const PER_THREAD: i32 = 50;

    let (serial, handle) = MockSerial::new();
    let connection = ConnectionBuilder::new()
        .controller(EndPoint::Rack)
        .addressing(Addressing::rack(3))
        .pipeline_config(quiet_config())
        .build_with(serial)
        .unwrap();
    handle.take_written();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let connection = &connection;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let distance = t * 1000 + i;
                    connection
                        .send(&commands::mot_move_relative(EndPoint::Bay2, 1, distance))
                        .unwrap();
                }
            });
        }
    });

    let mut unpacker = Unpacker::new();
    unpacker.feed(&handle.take_written());
    let mut distances: Vec<i64> = unpacker
        .by_ref()
        .map(|m| {
            assert_eq!(m.kind(), Some(MessageId::MotMoveRelative));
            assert_eq!(m.dest, EndPoint::Bay2);
            m.field_i64("distance").unwrap()
        })
        .collect();
    assert_eq!(unpacker.skipped_bytes(), 0);
    assert_eq!(unpacker.buffered(), 0);

    distances.sort_unstable();
    let mut expected: Vec<i64> = (0..THREADS)
        .flat_map(|t| (0..PER_THREAD).map(move |i| i64::from(t * 1000 + i)))
        .collect();
    expected.sort_unstable();
    assert_eq!(distances, expected);
    assert_eq!(connection.metrics().tx_messages, (THREADS * PER_THREAD) as u64);
}

#[test]
#[serial]
fn test_noise_then_messages_in_fragments() {
    let (serial, handle) = MockSerial::new();
    let connection = ConnectionBuilder::new()
        .pipeline_config(quiet_config())
        .build_with(serial)
        .unwrap();

    let (seen_tx, seen_rx) = bounded(16);
    connection.subscribe(
        Filter::Kind(MessageId::MotGetPosCounter),
        Arc::new(move |event: &Event| {
            if let Event::Message(m) = event {
                let _ = seen_tx.try_send(m.field_i64("position"));
            }
        }),
    );

    let mut stream = vec![0xFF, 0x00, 0x13];
    for position in [10, -20, 30] {
        let message = Message::new(
            MessageId::MotGetPosCounter,
            EndPoint::Host,
            EndPoint::Usb,
            [Value::U16(1), Value::I32(position)],
        )
        .unwrap();
        stream.extend(encode(&message).unwrap());
    }
    for chunk in stream.chunks(5) {
        handle.inject(chunk);
    }

    let positions: Vec<_> = (0..3)
        .map(|_| seen_rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    assert_eq!(positions, vec![Some(10), Some(-20), Some(30)]);
    assert_eq!(connection.status(0, 0).unwrap().position, 30);
    assert!(connection.metrics().resync_bytes >= 3);
}

#[test]
#[serial]
fn test_error_report_reaches_error_listeners() {
    let (serial, handle) = MockSerial::new();
    let connection = ConnectionBuilder::new()
        .pipeline_config(quiet_config())
        .build_with(serial)
        .unwrap();

    let (report_tx, report_rx) = bounded(1);
    connection.subscribe(
        Filter::Error,
        Arc::new(move |event: &Event| {
            if let Event::Error(report) = event {
                let _ = report_tx.try_send(report.clone());
            }
        }),
    );

    let response = Message::new(
        MessageId::HwRichResponse,
        EndPoint::Host,
        EndPoint::Usb,
        [
            Value::U16(0x0453),
            Value::U16(7),
            Value::Text("motor stalled".into()),
        ],
    )
    .unwrap();
    handle.inject(&encode(&response).unwrap());

    let report = report_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(report.msgid, 0x0453);
    assert_eq!(report.code, 7);
    assert_eq!(report.notes, "motor stalled");
    assert_eq!(connection.metrics().device_errors, 1);
}
