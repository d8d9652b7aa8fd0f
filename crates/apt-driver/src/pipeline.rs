//! Pipeline IO 循环模块
//!
//! 一个连接运行三个后台线程：
//! - 读线程（[`rx_loop`]）：读取字节、切分消息、更新状态存储、发布事件
//! - 分发线程（[`dispatch_loop`]）：按注册顺序调用回调
//! - 保活线程（[`keepalive_loop`]）：周期性向每个 bay 发送 `MOT_ACK_DCSTATUSUPDATE`
//!
//! 发送由调用方线程直接完成，写端由互斥锁保护（[`transmit`]），
//! 并发调用不会在线路上交错。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use apt_protocol::{EndPoint, ErrorReport, Message, Unpacker, commands, encode};
use apt_serial::{RxAdapter, SerialError, TxAdapter};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::error::DriverError;
use crate::hooks::{Event, invoke_all};
use crate::mode::ConnectionState;
use crate::state::DriverContext;

/// 共享的写端
pub type SharedTx = Arc<Mutex<Box<dyn TxAdapter + Send>>>;

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use apt_driver::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     keepalive_interval: None,
///     ..PipelineConfig::default()
/// };
/// assert_eq!(config.read_buffer_size, 256);
/// assert_eq!(config.join_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// 串口单次读取的超时，决定读线程检查退出标志的频率
    pub read_timeout: Duration,
    /// 保活消息间隔；`None` 表示不发送
    ///
    /// USB 控制器在约 1 秒内收不到确认就会停止推送状态。
    pub keepalive_interval: Option<Duration>,
    /// 单次读取的缓冲区大小
    pub read_buffer_size: usize,
    /// 关闭时等待每个后台线程退出的时间
    pub join_timeout: Duration,
    /// 超过该时长没有收到任何消息即认为设备无响应
    pub monitor_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            keepalive_interval: Some(Duration::from_millis(900)),
            read_buffer_size: 256,
            join_timeout: Duration::from_secs(2),
            monitor_timeout: Duration::from_secs(2),
        }
    }
}

/// 编码并写出一条消息
///
/// 连接不处于 Open 状态时不会触碰串口。
pub fn transmit(tx: &SharedTx, ctx: &DriverContext, message: &Message) -> Result<(), DriverError> {
    match ctx.state.get(Ordering::Acquire) {
        ConnectionState::Open => {},
        ConnectionState::Closed => return Err(DriverError::NotConnected),
        ConnectionState::Lost => return Err(DriverError::ConnectionLost),
    }
    let bytes = encode(message)?;
    let result = tx.lock().write_all(&bytes);
    match result {
        Ok(()) => {
            ctx.metrics.tx_messages.fetch_add(1, Ordering::Relaxed);
            trace!("tx {}", message);
            Ok(())
        },
        Err(e) => {
            ctx.metrics.tx_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to write {}: {}", message, e);
            Err(e.into())
        },
    }
}

/// 读线程主循环
///
/// # 参数
/// - `rx`: 读端适配器
/// - `ctx`: 共享上下文（状态存储、指标、连接状态）
/// - `config`: Pipeline 配置
/// - `is_running`: 运行标志，`close()` 置为 false 后本循环在下一次读超时退出
/// - `events`: 事件通道发送端；本函数返回时随之释放，分发线程因此退出
pub fn rx_loop(
    mut rx: impl RxAdapter,
    ctx: Arc<DriverContext>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    events: Sender<Event>,
) {
    let mut unpacker = Unpacker::new();
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let n = match rx.read(&mut buf) {
            Ok(n) => n,
            Err(SerialError::Timeout) => {
                ctx.metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) if !e.is_fatal() => {
                let errors = ctx.metrics.rx_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if errors.is_power_of_two() {
                    warn!("RX thread: transient serial error ({} so far): {}", errors, e);
                }
                thread::sleep(config.read_timeout);
                continue;
            },
            Err(e) => {
                if ctx.state.transition(ConnectionState::Open, ConnectionState::Lost) {
                    error!("RX thread: serial read failed, connection lost: {}", e);
                    ctx.store.close(ConnectionState::Lost);
                    let _ = events.send(Event::Disconnected);
                } else {
                    debug!("RX thread: read error after close: {}", e);
                }
                // Release: All writes before this are visible to threads that see the false value
                is_running.store(false, Ordering::Release);
                break;
            },
        };

        ctx.metrics.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
        unpacker.feed(&buf[..n]);

        let skipped_before = unpacker.skipped_bytes();
        while let Some(message) = unpacker.next_message() {
            handle_message(message, &ctx, &events);
        }
        let skipped = unpacker.skipped_bytes() - skipped_before;
        if skipped > 0 {
            warn!("RX thread: discarded {} byte(s) while resynchronising", skipped);
            ctx.metrics.resync_bytes.fetch_add(skipped, Ordering::Relaxed);
        }
    }

    trace!("RX thread: loop exited");
}

/// 处理一条解码后的消息：先更新状态存储，再发布事件
fn handle_message(message: Message, ctx: &DriverContext, events: &Sender<Event>) {
    ctx.metrics.rx_messages.fetch_add(1, Ordering::Relaxed);
    ctx.monitor.register_message();
    trace!("rx {}", message);

    if message.is_raw() {
        ctx.metrics.rx_raw.fetch_add(1, Ordering::Relaxed);
        debug!("RX thread: passing through unrecognised message 0x{:04X}", message.id);
    }

    ctx.store.update(&message);

    let report = message
        .kind()
        .filter(|kind| kind.is_error_report())
        .and_then(|_| ErrorReport::from_message(&message));

    let _ = events.send(Event::Message(message));

    if let Some(report) = report {
        warn!("Device reported error: {}", report);
        ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
        let _ = events.send(Event::Error(report));
    }
}

/// 分发线程主循环
///
/// 所有发送端释放后（读线程退出）返回。
pub fn dispatch_loop(events: Receiver<Event>, ctx: Arc<DriverContext>) {
    for event in events.iter() {
        // 读锁只用于复制回调列表，回调在锁外执行
        let listeners = ctx.registry.read().matching(&event);
        if listeners.is_empty() {
            continue;
        }
        let panics = invoke_all(&listeners, &event);
        if panics > 0 {
            ctx.metrics.listener_panics.fetch_add(panics as u64, Ordering::Relaxed);
        }
    }
    trace!("Dispatch thread: loop exited");
}

/// 保活线程主循环
///
/// `stop` 的发送端被释放（或收到任何值）时退出。
pub fn keepalive_loop(
    tx: SharedTx,
    ctx: Arc<DriverContext>,
    bays: Vec<EndPoint>,
    interval: Duration,
    stop: Receiver<()>,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if !ctx.state.get(Ordering::Acquire).is_open() {
            break;
        }
        for bay in &bays {
            if let Err(e) = transmit(&tx, &ctx, &commands::mot_ack_dc_status_update(*bay)) {
                debug!("Keepalive to {} failed: {}", bay, e);
            }
        }
    }
    trace!("Keepalive thread: loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Filter;
    use crate::state::Addressing;
    use apt_protocol::{MessageId, Value, decode};
    use apt_serial::{MockSerial, SerialDeviceError, SerialDeviceErrorKind, SplittableAdapter};
    use crossbeam_channel::unbounded;
    use std::thread;

    fn context() -> Arc<DriverContext> {
        Arc::new(DriverContext::new(Addressing::usb(), Duration::from_secs(1)))
    }

    #[test]
    fn test_transmit_respects_state() {
        let ctx = context();
        let (serial, handle) = MockSerial::new();
        let (_rx, tx) = serial.split().unwrap();
        let tx: SharedTx = Arc::new(Mutex::new(Box::new(tx)));

        transmit(&tx, &ctx, &commands::mod_identify(EndPoint::Usb, 1)).unwrap();
        assert_eq!(handle.written(), vec![0x23, 0x02, 0x01, 0x00, 0x50, 0x01]);
        assert_eq!(ctx.metrics.snapshot().tx_messages, 1);

        ctx.state.set(ConnectionState::Closed, Ordering::Release);
        assert!(matches!(
            transmit(&tx, &ctx, &commands::mod_identify(EndPoint::Usb, 1)),
            Err(DriverError::NotConnected)
        ));
        ctx.state.set(ConnectionState::Lost, Ordering::Release);
        assert!(matches!(
            transmit(&tx, &ctx, &commands::mod_identify(EndPoint::Usb, 1)),
            Err(DriverError::ConnectionLost)
        ));
    }

    #[test]
    fn test_transmit_write_error_counted() {
        let ctx = context();
        let (serial, handle) = MockSerial::new();
        let (_rx, tx) = serial.split().unwrap();
        let tx: SharedTx = Arc::new(Mutex::new(Box::new(tx)));
        handle.fail_writes(true);
        assert!(matches!(
            transmit(&tx, &ctx, &commands::mod_identify(EndPoint::Usb, 1)),
            Err(DriverError::Serial(_))
        ));
        assert_eq!(ctx.metrics.snapshot().tx_errors, 1);
    }

    #[test]
    fn test_rx_loop_updates_store_and_publishes() {
        let ctx = context();
        let (serial, handle) = MockSerial::new();
        let (rx, _tx) = serial.split().unwrap();
        let is_running = Arc::new(AtomicBool::new(true));
        let (events_tx, events_rx) = unbounded();

        let thread_ctx = ctx.clone();
        let running = is_running.clone();
        let rx_thread =
            thread::spawn(move || rx_loop(rx, thread_ctx, PipelineConfig::default(), running, events_tx));

        let status = Message::new(
            MessageId::MotGetDcStatusUpdate,
            EndPoint::Host,
            EndPoint::Usb,
            [Value::U16(1), Value::I32(1234), Value::I16(0), Value::U16(0), Value::U32(0)],
        )
        .unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(apt_protocol::encode(&status).unwrap());
        handle.inject(&bytes[..5]);
        handle.inject(&bytes[5..]);

        let event = events_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event, Event::Message(status));
        assert_eq!(ctx.store.get(0, 0).unwrap().position, 1234);
        assert!(ctx.monitor.has_heard_from_device());

        is_running.store(false, Ordering::Release);
        rx_thread.join().unwrap();
        let snapshot = ctx.metrics.snapshot();
        assert_eq!(snapshot.rx_messages, 1);
        assert_eq!(snapshot.resync_bytes, 2);
        assert_eq!(snapshot.rx_bytes, bytes.len() as u64);
        // 读线程退出后事件通道关闭
        assert!(events_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    /// 每次读取都返回非致命设备错误
    struct BusyRx;

    impl RxAdapter for BusyRx {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, SerialError> {
            Err(SerialError::Device(SerialDeviceError::new(SerialDeviceErrorKind::Busy, "busy")))
        }
    }

    #[test]
    fn test_rx_loop_backs_off_on_transient_errors() {
        let ctx = context();
        let is_running = Arc::new(AtomicBool::new(true));
        let (events_tx, _events_rx) = unbounded();
        let config = PipelineConfig {
            read_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        };

        let thread_ctx = ctx.clone();
        let running = is_running.clone();
        let rx_thread = thread::spawn(move || rx_loop(BusyRx, thread_ctx, config, running, events_tx));
        thread::sleep(Duration::from_millis(300));
        is_running.store(false, Ordering::Release);
        rx_thread.join().unwrap();

        let errors = ctx.metrics.snapshot().rx_errors;
        assert!((1..=10).contains(&errors), "rx_errors = {errors}");
        assert_eq!(ctx.state.get(Ordering::Acquire), ConnectionState::Open);
    }

    #[test]
    fn test_rx_loop_error_report_and_disconnect() {
        let ctx = context();
        let (serial, handle) = MockSerial::new();
        let (rx, _tx) = serial.split().unwrap();
        let is_running = Arc::new(AtomicBool::new(true));
        let (events_tx, events_rx) = unbounded();

        let thread_ctx = ctx.clone();
        let running = is_running.clone();
        let rx_thread =
            thread::spawn(move || rx_loop(rx, thread_ctx, PipelineConfig::default(), running, events_tx));

        let response = Message::new(MessageId::HwResponse, EndPoint::Host, EndPoint::Usb, []).unwrap();
        handle.inject(&apt_protocol::encode(&response).unwrap());
        handle.fail();

        let first = events_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(Filter::Kind(MessageId::HwResponse).matches(&first));
        match events_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Event::Error(report) => {
                assert_eq!(report.msgid, 0);
                assert_eq!(report.code, -1);
                assert_eq!(report.notes, "unknown");
            },
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(events_rx.recv_timeout(Duration::from_secs(2)).unwrap(), Event::Disconnected);

        rx_thread.join().unwrap();
        assert!(!is_running.load(Ordering::Acquire));
        assert_eq!(ctx.state.get(Ordering::Acquire), ConnectionState::Lost);
        assert!(ctx.store.is_closed());
        assert_eq!(ctx.metrics.snapshot().device_errors, 1);
    }

    #[test]
    fn test_dispatch_loop_counts_panics() {
        let ctx = context();
        fn boom(_: &Event) {
            panic!("boom");
        }
        ctx.registry.write().subscribe(Filter::Disconnect, Arc::new(boom));
        let (events_tx, events_rx) = unbounded();
        events_tx.send(Event::Disconnected).unwrap();
        drop(events_tx);
        dispatch_loop(events_rx, ctx.clone());
        assert_eq!(ctx.metrics.snapshot().listener_panics, 1);
    }

    #[test]
    fn test_keepalive_sends_ack_to_every_bay() {
        let ctx = Arc::new(DriverContext::new(Addressing::rack(2), Duration::from_secs(1)));
        let (serial, handle) = MockSerial::new();
        let (_rx, tx) = serial.split().unwrap();
        let tx: SharedTx = Arc::new(Mutex::new(Box::new(tx)));
        let (stop_tx, stop_rx) = unbounded();

        let thread_ctx = ctx.clone();
        let bays = ctx.store.addressing().bays.clone();
        let keepalive = thread::spawn(move || keepalive_loop(tx, thread_ctx, bays, Duration::from_millis(20), stop_rx));
        thread::sleep(Duration::from_millis(70));
        drop(stop_tx);
        keepalive.join().unwrap();

        let written = handle.written();
        assert!(written.len() >= 12, "expected at least one round of acks");
        let (first, used) = decode(&written).unwrap();
        assert_eq!(first.kind(), Some(MessageId::MotAckDcStatusUpdate));
        assert_eq!(first.dest, EndPoint::Bay0);
        let (second, _) = decode(&written[used..]).unwrap();
        assert_eq!(second.dest, EndPoint::Bay1);
    }
}
