//! 传输层指标
//!
//! 所有计数器都使用原子操作，可以在任何线程读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 传输层实时指标
///
/// # 使用示例
///
/// ```rust
/// use apt_driver::TransportMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = TransportMetrics::default();
/// metrics.rx_messages.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.rx_messages, 1);
/// ```
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// 从串口读到的总字节数
    pub rx_bytes: AtomicU64,

    /// 解码出的消息数（包括 raw 消息）
    pub rx_messages: AtomicU64,

    /// 未能按布局表解析、以 raw 形式透传的消息数
    pub rx_raw: AtomicU64,

    /// 重新同步时丢弃的字节数
    ///
    /// 刚上电的控制器偶尔会输出噪声，少量增长是正常的。
    pub resync_bytes: AtomicU64,

    /// 读超时次数（正常现象，无数据时会超时）
    pub rx_timeouts: AtomicU64,

    /// 非致命读错误次数（读线程退避后重试）
    pub rx_errors: AtomicU64,

    /// 设备上报的错误数（`HW_RESPONSE` / `HW_RICHRESPONSE`）
    pub device_errors: AtomicU64,

    /// 成功写出的消息数
    pub tx_messages: AtomicU64,

    /// 写失败次数
    pub tx_errors: AtomicU64,

    /// 回调 panic 次数
    pub listener_panics: AtomicU64,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器的当前值
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            rx_messages: self.rx_messages.load(Ordering::Relaxed),
            rx_raw: self.rx_raw.load(Ordering::Relaxed),
            resync_bytes: self.resync_bytes.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            tx_messages: self.tx_messages.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.rx_bytes.store(0, Ordering::Relaxed);
        self.rx_messages.store(0, Ordering::Relaxed);
        self.rx_raw.store(0, Ordering::Relaxed);
        self.resync_bytes.store(0, Ordering::Relaxed);
        self.rx_timeouts.store(0, Ordering::Relaxed);
        self.rx_errors.store(0, Ordering::Relaxed);
        self.device_errors.store(0, Ordering::Relaxed);
        self.tx_messages.store(0, Ordering::Relaxed);
        self.tx_errors.store(0, Ordering::Relaxed);
        self.listener_panics.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub rx_bytes: u64,
    pub rx_messages: u64,
    pub rx_raw: u64,
    pub resync_bytes: u64,
    pub rx_timeouts: u64,
    pub rx_errors: u64,
    pub device_errors: u64,
    pub tx_messages: u64,
    pub tx_errors: u64,
    pub listener_panics: u64,
}

impl MetricsSnapshot {
    /// 丢弃字节占接收字节的百分比
    ///
    /// 返回 0.0 到 100.0 之间的值。如果 `rx_bytes` 为 0，返回 0.0。
    pub fn noise_rate(&self) -> f64 {
        if self.rx_bytes == 0 {
            return 0.0;
        }
        (self.resync_bytes as f64 / self.rx_bytes as f64) * 100.0
    }
}
