//! 连接句柄（对外 API）

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;

use apt_protocol::{EndPoint, Message, MessageId, commands};
use apt_serial::SplittableAdapter;
use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::DriverError;
use crate::heartbeat::ConnectionMonitor;
use crate::hooks::{Event, Filter, Listener, SubscriptionId};
use crate::metrics::MetricsSnapshot;
use crate::mode::ConnectionState;
use crate::pipeline::{PipelineConfig, SharedTx, dispatch_loop, keepalive_loop, rx_loop, transmit};
use crate::state::{Addressing, DeviceStatus, DriverContext, StatusStore};

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，本线程只等待结果
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<()>, DriverError>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| DriverError::IoThread(format!("failed to spawn {name}: {e}")))
}

/// 与一台 APT 控制器的连接
///
/// 持有串口的两个半边：读端移交给读线程，写端由互斥锁保护、供所有调用方共享。
/// 创建时向每个 bay 发送 `HW_START_UPDATEMSGS`；[`close`](Self::close) 或 `Drop`
/// 时发送 `HW_STOP_UPDATEMSGS` 与 `HW_DISCONNECT`，然后等待后台线程退出。
pub struct AptConnection {
    ctx: Arc<DriverContext>,
    tx: SharedTx,
    /// 控制器本身的地址（USB 控制器为 `Usb`，机架为 `Rack`）
    controller: EndPoint,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
    dispatch_thread: Option<JoinHandle<()>>,
    keepalive_thread: Option<JoinHandle<()>>,
    /// 释放即通知保活线程退出
    keepalive_stop: Option<Sender<()>>,
}

impl AptConnection {
    /// 在已打开的适配器上启动连接
    ///
    /// # Errors
    /// - `DriverError::Serial`: 拆分适配器或发送启动消息失败
    /// - `DriverError::IoThread`: 后台线程创建失败
    pub fn start<A>(
        adapter: A,
        controller: EndPoint,
        addressing: Addressing,
        config: PipelineConfig,
    ) -> Result<Self, DriverError>
    where
        A: SplittableAdapter,
        A::RxAdapter: Send + 'static,
        A::TxAdapter: Send + 'static,
    {
        let mut adapter = adapter;
        adapter.set_read_timeout(config.read_timeout)?;
        let (rx, tx) = adapter.split()?;
        let tx: SharedTx = Arc::new(Mutex::new(Box::new(tx)));
        let ctx = Arc::new(DriverContext::new(addressing, config.monitor_timeout));
        let is_running = Arc::new(AtomicBool::new(true));
        let (events_tx, events_rx) = unbounded::<Event>();

        let mut connection = Self {
            ctx: ctx.clone(),
            tx: tx.clone(),
            controller,
            config: config.clone(),
            is_running: is_running.clone(),
            rx_thread: None,
            dispatch_thread: None,
            keepalive_thread: None,
            keepalive_stop: None,
        };

        let dispatch_ctx = ctx.clone();
        connection.dispatch_thread = Some(spawn_named("apt-dispatch", move || {
            dispatch_loop(events_rx, dispatch_ctx)
        })?);

        let rx_ctx = ctx.clone();
        let rx_config = config.clone();
        connection.rx_thread = Some(spawn_named("apt-rx", move || {
            rx_loop(rx, rx_ctx, rx_config, is_running, events_tx)
        })?);

        let bays = ctx.store.addressing().bays.clone();
        for bay in &bays {
            connection.send(&commands::hw_start_update_msgs(*bay))?;
        }

        if let Some(interval) = config.keepalive_interval {
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let keepalive_ctx = ctx.clone();
            connection.keepalive_stop = Some(stop_tx);
            connection.keepalive_thread = Some(spawn_named("apt-keepalive", move || {
                keepalive_loop(tx, keepalive_ctx, bays, interval, stop_rx)
            })?);
        }

        info!("APT connection started (controller {})", controller);
        Ok(connection)
    }

    /// 发送一条消息
    ///
    /// 可从任意线程调用；写端加锁，消息整体写出后才释放。
    ///
    /// # Errors
    /// - `DriverError::NotConnected`: 已调用 `close()`
    /// - `DriverError::ConnectionLost`: 读线程检测到连接丢失
    /// - `DriverError::Encoding`: 消息与布局表不符
    /// - `DriverError::Serial`: 写失败
    pub fn send(&self, message: &Message) -> Result<(), DriverError> {
        debug!("send {}", message);
        transmit(&self.tx, &self.ctx, message)
    }

    /// 发送请求并等待下一条匹配类型、来自 `source` 的消息
    ///
    /// 协议中大多数请求/应答没有序号，这里按“同一来源的下一条同类消息”关联。
    /// 请求和应答都带通道标识时，通道也必须一致。
    pub fn request(
        &self,
        message: &Message,
        reply: MessageId,
        source: EndPoint,
        timeout: Duration,
    ) -> Result<Message, DriverError> {
        let (reply_tx, reply_rx) = bounded::<Option<Message>>(1);
        let on_reply = reply_tx.clone();
        let chan = message.chan_ident();
        let reply_id = self.subscribe(
            Filter::Kind(reply),
            Arc::new(move |event: &Event| {
                if let Event::Message(m) = event
                    && m.source == source
                    && (chan.is_none() || m.chan_ident().is_none() || m.chan_ident() == chan)
                {
                    let _ = on_reply.try_send(Some(m.clone()));
                }
            }),
        );
        let lost_id = self.subscribe(
            Filter::Disconnect,
            Arc::new(move |_: &Event| {
                let _ = reply_tx.try_send(None);
            }),
        );

        let result = self.send(message).and_then(|()| match reply_rx.recv_timeout(timeout) {
            Ok(Some(m)) => Ok(m),
            Ok(None) => Err(DriverError::ConnectionLost),
            Err(_) => match self.state() {
                ConnectionState::Lost => Err(DriverError::ConnectionLost),
                ConnectionState::Closed => Err(DriverError::NotConnected),
                ConnectionState::Open => Err(DriverError::Timeout),
            },
        });

        self.unsubscribe(reply_id);
        self.unsubscribe(lost_id);
        result
    }

    /// 注册回调
    pub fn subscribe(&self, filter: Filter, listener: Arc<dyn Listener>) -> SubscriptionId {
        self.ctx.registry.write().subscribe(filter, listener)
    }

    /// 取消订阅
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.ctx.registry.write().unsubscribe(id)
    }

    /// 单个通道的状态快照（不阻塞）
    pub fn status(&self, bay: usize, channel: usize) -> Option<DeviceStatus> {
        self.ctx.store.get(bay, channel)
    }

    /// 全部状态快照
    pub fn statuses(&self) -> Vec<Vec<DeviceStatus>> {
        self.ctx.store.all()
    }

    /// 阻塞等待某个通道的状态满足条件
    pub fn wait_for<F>(&self, bay: usize, channel: usize, predicate: F, timeout: Duration) -> Result<DeviceStatus, DriverError>
    where
        F: FnMut(&DeviceStatus) -> bool,
    {
        self.ctx.store.wait_for(bay, channel, predicate, timeout)
    }

    pub fn store(&self) -> &StatusStore {
        &self.ctx.store
    }

    pub fn addressing(&self) -> &Addressing {
        self.ctx.store.addressing()
    }

    pub fn controller(&self) -> EndPoint {
        self.controller
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state.get(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.ctx.monitor
    }

    /// 关闭连接
    ///
    /// 可重复调用。连接仍然打开时先通知控制器停止推送并断开，写失败被忽略；
    /// 之后唤醒所有等待者并在超时内等待后台线程退出。
    pub fn close(&mut self) {
        if self.state().is_open() {
            for bay in &self.ctx.store.addressing().bays {
                let _ = transmit(&self.tx, &self.ctx, &commands::hw_stop_update_msgs(*bay));
            }
            let _ = transmit(&self.tx, &self.ctx, &commands::hw_disconnect(self.controller));
            if self.ctx.state.transition(ConnectionState::Open, ConnectionState::Closed) {
                info!("APT connection closed");
            }
        }
        self.ctx.store.close(ConnectionState::Closed);

        // Release: All writes before this are visible to threads that see the false value
        self.is_running.store(false, Ordering::Release);
        self.keepalive_stop.take();

        let timeout = self.config.join_timeout;
        for (name, handle) in [
            ("keepalive", self.keepalive_thread.take()),
            ("RX", self.rx_thread.take()),
            ("dispatch", self.dispatch_thread.take()),
        ] {
            if let Some(handle) = handle
                && let Err(e) = handle.join_timeout(timeout)
            {
                error!("Failed to join {} thread: {:?}", name, e);
            }
        }
    }
}

impl Drop for AptConnection {
    fn drop(&mut self) {
        self.close();
    }
}
